//! Condition Onset Tracker

use crate::store::{DebounceStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use tracing::{debug, warn};

/// Identity of one tracked condition: a unit, a tag, and the value the
/// condition holds at. Different threshold values for the same tag are
/// tracked independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DebounceKey {
    pub unit_id: String,
    pub tag: String,
    pub value: String,
}

impl DebounceKey {
    pub fn new(
        unit_id: impl Into<String>,
        tag: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            unit_id: unit_id.into(),
            tag: tag.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for DebounceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.unit_id, self.tag, self.value)
    }
}

/// Tracks when conditions were first observed true.
///
/// A record is created the first time a key is observed and deleted the
/// moment the caller reports the condition false (`clear`), so the store
/// is self-healing with no TTL. Store failures degrade to the in-memory
/// view with a logged warning; they never abort a run.
pub struct DebounceTracker<S: DebounceStore> {
    store: S,
}

impl<S: DebounceStore> DebounceTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records the onset of a condition if not already tracked and
    /// returns the first-observed time. Idempotent: a second observation
    /// with a different `at` never moves the recorded time.
    pub fn observe(&mut self, key: &DebounceKey, at: DateTime<Utc>) -> DateTime<Utc> {
        let raw = key.to_string();
        if let Some(existing) = self.store.get(&raw) {
            return existing;
        }
        if let Err(e) = self.store.set(&raw, at) {
            self.log_store_error(&raw, "record", &e);
        }
        debug!(key = %raw, at = %at, "Started tracking condition");
        at
    }

    /// Stops tracking a condition. Idempotent.
    pub fn clear(&mut self, key: &DebounceKey) {
        let raw = key.to_string();
        if let Err(e) = self.store.remove(&raw) {
            self.log_store_error(&raw, "clear", &e);
        }
    }

    /// Time the condition has been held at `at`, if it is tracked.
    pub fn elapsed_since(&self, key: &DebounceKey, at: DateTime<Utc>) -> Option<Duration> {
        let started = self.store.get(&key.to_string())?;
        Some(at - started)
    }

    /// Observes the condition and reports whether it has held for at
    /// least `min_secs`. Callers handle the no-duration / instant cases
    /// without touching the tracker.
    pub fn is_sustained(&mut self, key: &DebounceKey, min_secs: u64, at: DateTime<Utc>) -> bool {
        let started = self.observe(key, at);
        at - started >= Duration::seconds(min_secs as i64)
    }

    pub fn tracked_count(&self) -> usize {
        self.store.len()
    }

    fn log_store_error(&self, key: &str, op: &str, e: &StoreError) {
        warn!(key, op, error = %e, "Debounce store write failed, continuing with in-memory state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn key() -> DebounceKey {
        DebounceKey::new("1001", "Tag8", "0")
    }

    #[test]
    fn test_observe_is_idempotent_on_first_time() {
        let mut tracker = DebounceTracker::new(MemoryStore::new());
        let first = tracker.observe(&key(), at(100));
        let second = tracker.observe(&key(), at(900));
        assert_eq!(first, at(100));
        assert_eq!(second, at(100));
    }

    #[test]
    fn test_clear_restarts_the_timer() {
        let mut tracker = DebounceTracker::new(MemoryStore::new());
        tracker.observe(&key(), at(100));
        tracker.clear(&key());
        let restarted = tracker.observe(&key(), at(500));
        assert_eq!(restarted, at(500));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut tracker = DebounceTracker::new(MemoryStore::new());
        tracker.clear(&key());
        tracker.clear(&key());
        assert_eq!(tracker.tracked_count(), 0);
    }

    #[test]
    fn test_elapsed_since() {
        let mut tracker = DebounceTracker::new(MemoryStore::new());
        assert!(tracker.elapsed_since(&key(), at(100)).is_none());
        tracker.observe(&key(), at(100));
        assert_eq!(
            tracker.elapsed_since(&key(), at(400)),
            Some(Duration::seconds(300))
        );
    }

    #[test]
    fn test_is_sustained_threshold() {
        let mut tracker = DebounceTracker::new(MemoryStore::new());
        // First observation starts the clock: not sustained yet.
        assert!(!tracker.is_sustained(&key(), 300, at(100)));
        assert!(!tracker.is_sustained(&key(), 300, at(399)));
        assert!(tracker.is_sustained(&key(), 300, at(400)));
    }

    #[test]
    fn test_distinct_values_tracked_independently() {
        let mut tracker = DebounceTracker::new(MemoryStore::new());
        let k0 = DebounceKey::new("1001", "Tag8", "0");
        let k1 = DebounceKey::new("1001", "Tag8", "1");
        tracker.observe(&k0, at(100));
        tracker.observe(&k1, at(200));
        assert_eq!(tracker.observe(&k0, at(999)), at(100));
        assert_eq!(tracker.observe(&k1, at(999)), at(200));
    }
}
