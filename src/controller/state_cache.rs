//! # State Cache
//!
//! Process-local debounce gate in front of the reconcile orchestrator.
//!
//! One entry per top-level object (keyed by its identifier) remembering the hash of
//! the spec that was last reconciled, when that happened, and the Fibonacci backoff
//! used for failed attempts. Nothing here is persisted: after a restart every object
//! is simply seen as "never reconciled".
//!
//! An object needs reconciliation when:
//! - it has never been registered, or
//! - its current spec hash differs from the cached one, or
//! - more than the resync window has elapsed since its last reconciliation.

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::error::ReconcilerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// SHA-256 digest of a serialized spec
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpecHash(String);

impl SpecHash {
    /// Hash any serializable value
    ///
    /// Serialization failures are returned, never swallowed: a skipped hash change
    /// would silently skip reconciliation.
    pub fn of<T: Serialize>(value: &T) -> Result<Self, ReconcilerError> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Self(format!("{:x}", Sha256::digest(&bytes))))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SpecHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cached reconcile state of one object
#[derive(Debug, Clone)]
pub struct ReconcileState {
    /// Hash of the last reconciled spec (`None` until the first success or after invalidation)
    pub spec_hash: Option<SpecHash>,
    /// Time of the last successful reconciliation (epoch when never reconciled)
    pub last_reconciliation: DateTime<Utc>,
    /// Backoff applied to the next failed attempt
    pub backoff: FibonacciBackoff,
    /// Consecutive failed attempts
    pub error_count: u32,
}

impl ReconcileState {
    fn new(backoff: FibonacciBackoff) -> Self {
        Self {
            spec_hash: None,
            last_reconciliation: DateTime::<Utc>::UNIX_EPOCH,
            backoff,
            error_count: 0,
        }
    }

    /// Backoff the next failure would be requeued with
    #[must_use]
    pub fn next_backoff(&self) -> Duration {
        Duration::from_secs(self.backoff.peek_seconds())
    }
}

/// In-memory map from object identifier to [`ReconcileState`]
///
/// The map is only reachable through methods that take the lock internally.
#[derive(Debug)]
pub struct StateCache {
    states: Mutex<HashMap<String, ReconcileState>>,
    resync_window: chrono::Duration,
    backoff_min_secs: u64,
    backoff_max_secs: u64,
}

impl StateCache {
    #[must_use]
    pub fn new(resync_window: Duration, backoff_min_secs: u64, backoff_max_secs: u64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            resync_window: chrono::Duration::from_std(resync_window)
                .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX))),
            backoff_min_secs,
            backoff_max_secs,
        }
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, ReconcileState>> {
        // Entries are plain values, a panic mid-update cannot leave one half-written
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh_state(&self) -> ReconcileState {
        ReconcileState::new(FibonacciBackoff::new(
            self.backoff_min_secs,
            self.backoff_max_secs,
        ))
    }

    /// Register `id` if it is not known yet
    ///
    /// Returns whether the entry already existed. A fresh entry carries no hash, so
    /// it always needs reconciliation.
    pub fn register_if_absent(&self, id: &str) -> bool {
        let mut states = self.states();
        if states.contains_key(id) {
            return true;
        }
        states.insert(id.to_string(), self.fresh_state());
        false
    }

    /// Whether `id` needs reconciliation given its current spec hash
    #[must_use]
    pub fn needs_reconciliation(&self, id: &str, spec_hash: &SpecHash) -> bool {
        self.needs_reconciliation_at(id, spec_hash, Utc::now())
    }

    /// [`Self::needs_reconciliation`] evaluated at `now`
    #[must_use]
    pub fn needs_reconciliation_at(&self, id: &str, spec_hash: &SpecHash, now: DateTime<Utc>) -> bool {
        let states = self.states();
        let Some(state) = states.get(id) else {
            return true;
        };
        if state.spec_hash.as_ref() != Some(spec_hash) {
            return true;
        }
        now - state.last_reconciliation > self.resync_window
    }

    /// Record a successful reconciliation of `spec_hash`, resetting the backoff
    pub fn mark_reconciled(&self, id: &str, spec_hash: SpecHash) {
        self.mark_reconciled_at(id, spec_hash, Utc::now());
    }

    /// [`Self::mark_reconciled`] at `now`
    pub fn mark_reconciled_at(&self, id: &str, spec_hash: SpecHash, now: DateTime<Utc>) {
        let fresh = self.fresh_state();
        let mut states = self.states();
        let state = states.entry(id.to_string()).or_insert(fresh);
        state.spec_hash = Some(spec_hash);
        state.last_reconciliation = now;
        state.error_count = 0;
        state.backoff.reset();
    }

    /// Record a failed attempt and return how long to wait before retrying
    pub fn record_failure(&self, id: &str) -> (Duration, u32) {
        let fresh = self.fresh_state();
        let mut states = self.states();
        let state = states.entry(id.to_string()).or_insert(fresh);
        state.error_count = state.error_count.saturating_add(1);
        (state.backoff.next_backoff(), state.error_count)
    }

    /// Drop the cached hash of `id` so its next pass always runs
    ///
    /// Returns whether the object was known.
    pub fn invalidate(&self, id: &str) -> bool {
        match self.states().get_mut(id) {
            Some(state) => {
                state.spec_hash = None;
                true
            }
            None => false,
        }
    }

    /// Remove `id` entirely (object deleted)
    pub fn forget(&self, id: &str) {
        self.states().remove(id);
    }

    /// Snapshot of the state of `id`
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ReconcileState> {
        self.states().get(id).cloned()
    }

    /// Number of tracked objects
    #[must_use]
    pub fn len(&self) -> usize {
        self.states().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache() -> StateCache {
        StateCache::new(Duration::from_secs(30), 10, 300)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(1_700_000_000 + secs)
    }

    #[test]
    fn test_spec_hash_is_stable_and_sensitive() {
        let a = SpecHash::of(&json!({"replicas": 1, "image": {"tag": "v1"}})).unwrap();
        let b = SpecHash::of(&json!({"image": {"tag": "v1"}, "replicas": 1})).unwrap();
        let c = SpecHash::of(&json!({"replicas": 2, "image": {"tag": "v1"}})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_unregistered_needs_reconciliation() {
        let cache = cache();
        let hash = SpecHash::of(&json!({"a": 1})).unwrap();
        assert!(cache.needs_reconciliation_at("web_default", &hash, at(0)));
        assert!(!cache.register_if_absent("web_default"));
        assert!(cache.register_if_absent("web_default"));
        // registered but never reconciled
        assert!(cache.needs_reconciliation_at("web_default", &hash, at(0)));
    }

    #[test]
    fn test_debounce_and_resync_window() {
        let cache = cache();
        let hash = SpecHash::of(&json!({"a": 1})).unwrap();
        cache.mark_reconciled_at("web_default", hash.clone(), at(0));

        assert!(!cache.needs_reconciliation_at("web_default", &hash, at(5)));
        assert!(!cache.needs_reconciliation_at("web_default", &hash, at(30)));
        assert!(cache.needs_reconciliation_at("web_default", &hash, at(31)));
    }

    #[test]
    fn test_hash_change_needs_reconciliation() {
        let cache = cache();
        let old = SpecHash::of(&json!({"a": 1})).unwrap();
        let new = SpecHash::of(&json!({"a": 2})).unwrap();
        cache.mark_reconciled_at("web_default", old, at(0));
        assert!(cache.needs_reconciliation_at("web_default", &new, at(1)));
    }

    #[test]
    fn test_failures_back_off_and_success_resets() {
        let cache = cache();
        assert_eq!(cache.record_failure("web_default"), (Duration::from_secs(10), 1));
        assert_eq!(cache.record_failure("web_default"), (Duration::from_secs(10), 2));
        assert_eq!(cache.record_failure("web_default"), (Duration::from_secs(20), 3));
        assert_eq!(
            cache.get("web_default").unwrap().next_backoff(),
            Duration::from_secs(30)
        );

        let hash = SpecHash::of(&json!({})).unwrap();
        cache.mark_reconciled_at("web_default", hash, at(0));
        let state = cache.get("web_default").unwrap();
        assert_eq!(state.error_count, 0);
        assert_eq!(state.next_backoff(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalidate_and_forget() {
        let cache = cache();
        let hash = SpecHash::of(&json!({"a": 1})).unwrap();
        assert!(!cache.invalidate("web_default"));

        cache.mark_reconciled_at("web_default", hash.clone(), at(0));
        assert!(cache.invalidate("web_default"));
        assert!(cache.needs_reconciliation_at("web_default", &hash, at(1)));

        cache.forget("web_default");
        assert!(cache.is_empty());
    }
}
