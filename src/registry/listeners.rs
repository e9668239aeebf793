//! Listener registry: fan-out subscriptions keyed by route pattern.
//!
//! Duplicate patterns are allowed and accumulate listeners in registration
//! order. On dispatch every pattern that matches fires, and every listener
//! under it runs.

use super::channels::ChannelMap;
use crate::envelope::{Headers, Params};
use crate::error::IpcError;
use crate::router::PathMatcher;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Callback for published messages.
///
/// Listeners under the same pattern share one `Headers` value per dispatch,
/// so a change made by one listener is visible to the ones after it.
pub type Listener = Arc<dyn Fn(&mut Headers, &[Value]) + Send + Sync>;

/// Wrap a closure as a [`Listener`].
///
/// Keep the returned `Arc` around if the listener must be removed later:
/// removal compares listener identity, not behaviour.
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&mut Headers, &[Value]) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// One registration under a pattern.
#[derive(Clone)]
pub struct ListenerSlot {
    id: u64,
    listener: Listener,
    once: Option<Arc<AtomicBool>>,
}

impl ListenerSlot {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn listener(&self) -> &Listener {
        &self.listener
    }

    #[must_use]
    pub fn is_once(&self) -> bool {
        self.once.is_some()
    }

    /// Claim the right to fire. Always succeeds for plain listeners; succeeds
    /// exactly once for `once` listeners, however many dispatches race.
    #[must_use]
    pub fn claim(&self) -> bool {
        match &self.once {
            None => true,
            Some(fired) => !fired.swap(true, Ordering::AcqRel),
        }
    }
}

/// Snapshot of one matching pattern, taken under the registry lock.
pub struct ListenerMatch {
    pub pattern: String,
    pub params: Params,
    pub slots: Vec<ListenerSlot>,
}

/// Pattern → listeners table with compiled matchers.
#[derive(Default)]
pub struct ListenerRegistry {
    channels: ChannelMap<ListenerSlot>,
    matchers: HashMap<String, Arc<PathMatcher>>,
    next_slot: u64,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, pattern: &str, listener: Listener, once: bool) -> Result<u64, IpcError> {
        if !self.matchers.contains_key(pattern) {
            let matcher = PathMatcher::compile(pattern)?;
            self.matchers.insert(pattern.to_string(), Arc::new(matcher));
        }
        self.next_slot += 1;
        let id = self.next_slot;
        self.channels.add(
            pattern,
            ListenerSlot {
                id,
                listener,
                once: once.then(|| Arc::new(AtomicBool::new(false))),
            },
        );
        Ok(id)
    }

    /// Register `listener` under `pattern`, compiling the pattern on first use.
    pub fn add(&mut self, pattern: &str, listener: Listener) -> Result<u64, IpcError> {
        self.insert(pattern, listener, false)
    }

    /// Register `listener` to fire on the first matching dispatch only.
    pub fn add_once(&mut self, pattern: &str, listener: Listener) -> Result<u64, IpcError> {
        self.insert(pattern, listener, true)
    }

    fn forget_if_gone(&mut self, pattern: &str) {
        if !self.channels.contains(pattern) {
            self.matchers.remove(pattern);
        }
    }

    /// Remove the first registration of `listener` under `pattern`.
    pub fn remove(&mut self, pattern: &str, listener: &Listener) -> bool {
        let removed = self
            .channels
            .remove_first(pattern, |slot| Arc::ptr_eq(&slot.listener, listener))
            .is_some();
        self.forget_if_gone(pattern);
        removed
    }

    /// Remove one specific registration.
    pub fn remove_slot(&mut self, pattern: &str, id: u64) -> bool {
        let removed = self
            .channels
            .remove_first(pattern, |slot| slot.id == id)
            .is_some();
        self.forget_if_gone(pattern);
        removed
    }

    /// Clear one pattern, or every pattern when `pattern` is `None`.
    pub fn remove_all(&mut self, pattern: Option<&str>) {
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

    /// Distinct registered patterns in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.channels.keys().map(str::to_string).collect()
    }

    /// Number of listeners registered under exactly `pattern`.
    #[must_use]
    pub fn listener_count(&self, pattern: &str) -> usize {
        self.channels.get(pattern).len()
    }

    /// Every pattern matching `path`, with its extracted params and a copy of
    /// its listener list.
    #[must_use]
    pub fn matching(&self, path: &str) -> Vec<ListenerMatch> {
        self.channels
            .iter()
            .filter_map(|(pattern, slots)| {
                let matcher = self.matchers.get(pattern)?;
                let params = matcher.match_path(path)?;
                Some(ListenerMatch {
                    pattern: pattern.to_string(),
                    params,
                    slots: slots.to_vec(),
                })
            })
            .collect()
    }
}
