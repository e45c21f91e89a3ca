//! Keyed accumulator storage with time-to-live eviction.
//!
//! Each pipeline task owns its store exclusively, so there is no interior
//! locking. Eviction is a pure memory bound, never a correctness mechanism:
//! a key that reappears after eviction is treated as fresh.

use std::collections::HashMap;
use std::hash::Hash;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Mutable per-group state keyed by the pipeline's group-by key.
///
/// Every mutating access stamps the entry's last-touched time; a periodic
/// [`StateStore::sweep`] drops entries idle past the TTL.
#[derive(Debug)]
pub struct StateStore<K, V> {
    ttl: ChronoDuration,
    entries: HashMap<K, Entry<V>>,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    last_touched: DateTime<Utc>,
}

impl<K: Eq + Hash, V> StateStore<K, V> {
    /// Creates a store whose entries expire after `ttl` of inactivity.
    #[must_use]
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            ttl: ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX),
            entries: HashMap::new(),
        }
    }

    /// Reads a value without refreshing its TTL.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Mutably borrows an existing value, refreshing its TTL.
    ///
    /// Returns `None` when the key is not tracked — callers retracting a
    /// prior contribution must not create state for evicted keys.
    pub fn touch_mut(&mut self, key: &K, now: DateTime<Utc>) -> Option<&mut V> {
        self.entries.get_mut(key).map(|entry| {
            entry.last_touched = now;
            &mut entry.value
        })
    }

    /// Mutably borrows the value for `key`, inserting a default first when
    /// absent. Refreshes the TTL either way.
    pub fn get_or_insert_default(&mut self, key: K, now: DateTime<Utc>) -> &mut V
    where
        V: Default,
    {
        let entry = self.entries.entry(key).or_insert_with(|| Entry {
            value: V::default(),
            last_touched: now,
        });
        entry.last_touched = now;
        &mut entry.value
    }

    /// Inserts or replaces a value, refreshing its TTL. Returns the prior
    /// value when one was tracked.
    pub fn insert(&mut self, key: K, value: V, now: DateTime<Utc>) -> Option<V> {
        self.entries
            .insert(
                key,
                Entry {
                    value,
                    last_touched: now,
                },
            )
            .map(|entry| entry.value)
    }

    /// Removes a key, returning its value when tracked.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drops entries idle for at least the TTL. Returns the evicted count.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.signed_duration_since(entry.last_touched) < ttl);
        before - self.entries.len()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn sweep_evicts_only_idle_entries() {
        let mut store: StateStore<&str, i64> = StateStore::new(Duration::from_secs(600));
        *store.get_or_insert_default("stale", at(0)) = 1;
        *store.get_or_insert_default("fresh", at(0)) = 2;

        // Touching refreshes the TTL.
        store.touch_mut(&"fresh", at(9));

        let evicted = store.sweep(at(10));
        assert_eq!(evicted, 1);
        assert_eq!(store.get(&"stale"), None);
        assert_eq!(store.get(&"fresh"), Some(&2));
    }

    #[test]
    fn touch_mut_never_creates_entries() {
        let mut store: StateStore<i64, i64> = StateStore::new(Duration::from_secs(60));
        assert!(store.touch_mut(&1, at(0)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn reappearing_key_is_fresh_after_eviction() {
        let mut store: StateStore<i64, i64> = StateStore::new(Duration::from_secs(60));
        *store.get_or_insert_default(1, at(0)) = 42;
        store.sweep(at(5));
        assert!(store.is_empty());

        assert_eq!(*store.get_or_insert_default(1, at(6)), 0);
    }

    #[test]
    fn insert_returns_prior_value() {
        let mut store: StateStore<i64, &str> = StateStore::new(Duration::from_secs(60));
        assert_eq!(store.insert(1, "a", at(0)), None);
        assert_eq!(store.insert(1, "b", at(1)), Some("a"));
        assert_eq!(store.remove(&1), Some("b"));
        assert_eq!(store.remove(&1), None);
    }
}
