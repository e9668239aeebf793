//! Handler registry: at most one request handler per pattern string.

use super::channels::ChannelMap;
use crate::envelope::{Headers, Params};
use crate::error::IpcError;
use crate::router::PathMatcher;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Request handler. Runs in its own coroutine, so it may block on other
/// coroutine-aware operations (including `invoke`) before returning.
pub type Handler = Arc<dyn Fn(&Headers, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// The registration stored under a pattern.
#[derive(Clone)]
pub struct HandlerSlot {
    id: u64,
    handler: Handler,
    once: Option<Arc<AtomicBool>>,
}

impl HandlerSlot {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    #[must_use]
    pub fn is_once(&self) -> bool {
        self.once.is_some()
    }

    /// See [`ListenerSlot::claim`](super::ListenerSlot::claim).
    #[must_use]
    pub fn claim(&self) -> bool {
        match &self.once {
            None => true,
            Some(fired) => !fired.swap(true, Ordering::AcqRel),
        }
    }
}

/// The handler selected for a request path.
pub struct HandlerMatch {
    pub pattern: String,
    pub params: Params,
    pub slot: HandlerSlot,
}

/// Pattern → handler table with compiled matchers.
#[derive(Default)]
pub struct HandlerRegistry {
    channels: ChannelMap<HandlerSlot>,
    matchers: HashMap<String, Arc<PathMatcher>>,
    next_slot: u64,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, pattern: &str, handler: Handler, once: bool) -> Result<u64, IpcError> {
        if self.channels.contains(pattern) {
            return Err(IpcError::DuplicateHandler {
                pattern: pattern.to_string(),
            });
        }
        let matcher = PathMatcher::compile(pattern)?;
        self.matchers.insert(pattern.to_string(), Arc::new(matcher));
        self.next_slot += 1;
        let id = self.next_slot;
        self.channels.add(
            pattern,
            HandlerSlot {
                id,
                handler,
                once: once.then(|| Arc::new(AtomicBool::new(false))),
            },
        );
        Ok(id)
    }

    /// Register `handler` under `pattern`.
    ///
    /// # Errors
    ///
    /// [`IpcError::DuplicateHandler`] if `pattern` is taken; the existing
    /// handler is kept.
    pub fn add(&mut self, pattern: &str, handler: Handler) -> Result<u64, IpcError> {
        self.insert(pattern, handler, false)
    }

    /// Register `handler` to answer one request only.
    pub fn add_once(&mut self, pattern: &str, handler: Handler) -> Result<u64, IpcError> {
        self.insert(pattern, handler, true)
    }

    /// Remove the handler under `pattern`, or every handler when `None`.
    pub fn remove(&mut self, pattern: Option<&str>) {
        match pattern {
            Some(pattern) => {
                self.channels.remove_key(pattern);
                self.matchers.remove(pattern);
            }
            None => {
                self.channels.clear();
                self.matchers.clear();
            }
        }
    }

    /// Remove the registration `id` under `pattern`, leaving any later
    /// registration of the same pattern alone.
    pub fn remove_slot(&mut self, pattern: &str, id: u64) -> bool {
        let removed = self
            .channels
            .remove_first(pattern, |slot| slot.id == id)
            .is_some();
        if !self.channels.contains(pattern) {
            self.matchers.remove(pattern);
        }
        removed
    }

    /// Registered patterns in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.channels.keys().map(str::to_string).collect()
    }

    /// First handler, in registration order, whose pattern matches `path` and
    /// which can still fire. A spent `once` handler counts as absent.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<HandlerMatch> {
        self.channels.iter().find_map(|(pattern, slots)| {
            let matcher = self.matchers.get(pattern)?;
            let params = matcher.match_path(path)?;
            let slot = slots.first()?;
            slot.claim().then(|| HandlerMatch {
                pattern: pattern.to_string(),
                params,
                slot: slot.clone(),
            })
        })
    }
}
