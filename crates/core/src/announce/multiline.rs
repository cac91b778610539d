//! Buffering for multi-line announcements.
//!
//! Some trackers split one announcement over several lines. Bindings are
//! accumulated under a rule-defined key until the terminal line arrives.
//! The buffer is a bounded LRU with a TTL so an announcement whose terminal
//! line never arrives cannot leak entries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    vars: HashMap<String, String>,
    inserted_at: Instant,
}

/// Bounded, TTL'd accumulation buffer keyed by the announcement join key.
pub struct MultiLineBuffer {
    entries: HashMap<String, Entry>,
    /// Insertion order for LRU eviction; stale keys are skipped on pop.
    order: Vec<String>,
    capacity: usize,
    ttl: Duration,
}

pub const DEFAULT_CAPACITY: usize = 128;
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

impl Default for MultiLineBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl MultiLineBuffer {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Merge `vars` into the entry for `key`, creating it if needed.
    pub fn accumulate(&mut self, key: &str, vars: HashMap<String, String>) {
        self.purge_expired();

        if let Some(entry) = self.entries.get_mut(key) {
            entry.vars.extend(vars);
            return;
        }

        while self.entries.len() >= self.capacity {
            self.evict_oldest();
        }

        self.entries.insert(
            key.to_string(),
            Entry {
                vars,
                inserted_at: Instant::now(),
            },
        );
        self.order.push(key.to_string());
    }

    /// Remove and return the accumulated bindings for `key`.
    pub fn take(&mut self, key: &str) -> Option<HashMap<String, String>> {
        self.purge_expired();
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry.vars)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&mut self) {
        let ttl = self.ttl;
        let now = Instant::now();
        self.entries
            .retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
    }

    fn evict_oldest(&mut self) {
        while let Some(oldest) = self.order.first().cloned() {
            self.order.remove(0);
            if self.entries.remove(&oldest).is_some() {
                return;
            }
        }
        // Order list drained; nothing left to evict.
        self.entries.clear();
    }
}
