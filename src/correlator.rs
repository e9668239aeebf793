//! Response correlation for `invoke`.
//!
//! Every outbound handler-bound request registers a pending entry keyed by its
//! [`RequestId`]. Responses carry that id in `resId` and settle the entry:
//!
//! - a success resolves the caller at once;
//! - an error spends one unit of the retry budget, and rejects the caller only
//!   when the budget is exhausted (every peer the request was fanned out to
//!   has answered with an error);
//! - when the deadline elapses first, the caller gets
//!   [`IpcError::ResponseTimeout`].
//!
//! The entry is removed by whichever of these happens first, and only the
//! remover delivers a result, so the caller sees exactly one outcome.
//!
//! The caller waits on a `may` channel with `recv_timeout`: the deadline is the
//! wait itself, so there is no separate timer to cancel.

use crate::error::{IpcError, RemoteError};
use crate::ids::RequestId;
use dashmap::DashMap;
use may::sync::mpsc;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Outcome delivered to a waiting `invoke`.
pub type Reply = Result<Value, IpcError>;

#[derive(Debug)]
struct PendingRequest {
    path: String,
    deadline: Instant,
    retries_remaining: usize,
    reply_tx: mpsc::Sender<Reply>,
}

/// Receiving half handed back by [`ResponseCorrelator::register`].
pub struct PendingReply {
    req_id: RequestId,
    timeout: Duration,
    rx: mpsc::Receiver<Reply>,
}

impl PendingReply {
    #[must_use]
    pub fn req_id(&self) -> RequestId {
        self.req_id
    }
}

/// Table of requests awaiting a response.
#[derive(Default)]
pub struct ResponseCorrelator {
    pending: DashMap<RequestId, PendingRequest>,
}

impl ResponseCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `req_id` as awaiting `budget` answers within `timeout`.
    pub fn register(
        &self,
        req_id: RequestId,
        path: &str,
        budget: usize,
        timeout: Duration,
    ) -> PendingReply {
        let (reply_tx, rx) = mpsc::channel();
        self.pending.insert(
            req_id,
            PendingRequest {
                path: path.to_string(),
                deadline: Instant::now() + timeout,
                retries_remaining: budget,
                reply_tx,
            },
        );
        debug!(req_id = %req_id, path = %path, budget = budget, "Pending request registered");
        PendingReply {
            req_id,
            timeout,
            rx,
        }
    }

    /// Apply a response to the pending entry `res_id`.
    ///
    /// Returns `false` when nothing is waiting on `res_id` (already settled,
    /// timed out, or never registered here).
    pub fn settle(&self, res_id: RequestId, error: Option<RemoteError>, value: Value) -> bool {
        let Some(error) = error else {
            return match self.pending.remove(&res_id) {
                Some((_, pending)) => {
                    debug!(req_id = %res_id, path = %pending.path, "Request resolved");
                    let _ = pending.reply_tx.send(Ok(value));
                    true
                }
                None => false,
            };
        };

        // Decrement and decide inside one shard guard; the guard must be
        // released before `remove` touches the same shard.
        let exhausted = match self.pending.get_mut(&res_id) {
            Some(mut pending) => {
                pending.retries_remaining = pending.retries_remaining.saturating_sub(1);
                debug!(
                    req_id = %res_id,
                    path = %pending.path,
                    retries_remaining = pending.retries_remaining,
                    error = %error,
                    "Error response received"
                );
                pending.retries_remaining == 0
            }
            None => return false,
        };

        if exhausted {
            if let Some((_, pending)) = self.pending.remove(&res_id) {
                let _ = pending
                    .reply_tx
                    .send(Err(error.into_ipc_error(&pending.path)));
            }
        }
        true
    }

    /// Reject `req_id` immediately with `error`.
    pub fn fail(&self, req_id: RequestId, error: IpcError) -> bool {
        match self.pending.remove(&req_id) {
            Some((_, pending)) => {
                let _ = pending.reply_tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Block the current coroutine (or thread) until `reply` settles or its
    /// deadline elapses.
    pub fn wait(&self, reply: PendingReply) -> Reply {
        let PendingReply {
            req_id,
            timeout,
            rx,
        } = reply;

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(_) => match self.pending.remove(&req_id) {
                Some((_, pending)) => {
                    warn!(
                        req_id = %req_id,
                        path = %pending.path,
                        timeout_ms = timeout.as_millis() as u64,
                        overdue_ms = pending.deadline.elapsed().as_millis() as u64,
                        "Request timed out"
                    );
                    Err(IpcError::ResponseTimeout { req_id, timeout })
                }
                // Settled between the timeout and the removal: the outcome is
                // already in the channel.
                None => rx
                    .try_recv()
                    .unwrap_or(Err(IpcError::ResponseTimeout { req_id, timeout })),
            },
        }
    }

    /// Number of requests still waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Retry budget left for `req_id`, if it is still pending.
    #[must_use]
    pub fn retries_remaining(&self, req_id: RequestId) -> Option<usize> {
        self.pending.get(&req_id).map(|p| p.retries_remaining)
    }
}
