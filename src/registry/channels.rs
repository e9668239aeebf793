//! Named-channel table: ordered callbacks stored under exact string keys.
//!
//! This is the event-emitter capability the route-aware registries are built
//! on. It knows nothing about patterns; it keeps keys in first-registration
//! order and drops a key as soon as its last entry is removed.

/// Ordered map from exact key to the entries registered under it.
#[derive(Debug, Clone)]
pub struct ChannelMap<T> {
    channels: Vec<(String, Vec<T>)>,
}

impl<T> Default for ChannelMap<T> {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
        }
    }
}

impl<T> ChannelMap<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.channels.iter().position(|(k, _)| k == key)
    }

    /// Append `entry` under `key`. Returns `true` if the key was new.
    pub fn add(&mut self, key: &str, entry: T) -> bool {
        match self.position(key) {
            Some(idx) => {
                self.channels[idx].1.push(entry);
                false
            }
            None => {
                self.channels.push((key.to_string(), vec![entry]));
                true
            }
        }
    }

    /// Remove the first entry under `key` matching `pred`.
    ///
    /// Returns the removed entry. The key disappears with its last entry.
    pub fn remove_first<F>(&mut self, key: &str, pred: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let idx = self.position(key)?;
        let entries = &mut self.channels[idx].1;
        let pos = entries.iter().position(|e| pred(e))?;
        let removed = entries.remove(pos);
        if entries.is_empty() {
            self.channels.remove(idx);
        }
        Some(removed)
    }

    /// Drop `key` and everything registered under it.
    pub fn remove_key(&mut self, key: &str) -> Vec<T> {
        match self.position(key) {
            Some(idx) => self.channels.remove(idx).1,
            None => Vec::new(),
        }
    }

    /// Drop every key.
    pub fn clear(&mut self) {
        self.channels.clear();
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Entries under `key`, in registration order.
    #[must_use]
    pub fn get(&self, key: &str) -> &[T] {
        self.position(key)
            .map(|idx| self.channels[idx].1.as_slice())
            .unwrap_or_default()
    }

    /// Keys in first-registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(k, _)| k.as_str())
    }

    /// `(key, entries)` pairs in first-registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.channels.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
