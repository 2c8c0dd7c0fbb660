//! Retry backoff and staleness policy
//!
//! Failure streaks are tracked per key by a [`RetryState`] value stored inside
//! the shared entry. The state only decides when events fire (first failure,
//! first recovery); how soon a key may be retried is governed by the
//! `retry_after` delay on [`ForwardMapping`].

use crate::types::SchemaId;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Consecutive failure count for one key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_failing(&self) -> bool {
        self.attempts > 0
    }

    /// Record a failure; `true` when it opens a new failure streak
    pub fn fail(self) -> (Self, bool) {
        let next = Self {
            attempts: self.attempts.saturating_add(1),
        };
        (next, self.attempts == 0)
    }

    /// Record a success; `true` when it ends a failure streak
    pub fn succeed(self) -> (Self, bool) {
        (Self::default(), self.attempts > 0)
    }
}

/// Backoff and freshness settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max_age: Duration,
}

impl RetryPolicy {
    pub fn new(base: Duration, max_age: Duration) -> Self {
        Self { base, max_age }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Delay after another consecutive failure
    ///
    /// A zero `previous` opens the streak at `base`; later failures double the
    /// delay. Both are capped at `max_age`.
    pub fn next_delay(&self, previous: Duration) -> Duration {
        let next = if previous.is_zero() {
            self.base
        } else {
            previous.saturating_mul(2)
        };
        next.min(self.max_age)
    }
}

/// Content-direction shared entry
#[derive(Debug, Clone, Default)]
pub struct CachedSchema {
    pub schema: Option<Arc<str>>,
    pub retry: RetryState,
}

impl CachedSchema {
    /// Only entries without content are ever fetched again
    pub fn refreshable(&self) -> bool {
        self.schema.is_none()
    }
}

/// Outcome of resolving a subject/version to an id
#[derive(Debug, Clone)]
pub struct ForwardMapping {
    /// Last successful resolution, or the first failed attempt if none succeeded
    pub created_at: Instant,
    /// Last registry attempt; anchors the backoff window
    pub attempted_at: Instant,
    /// `None` while the pair has never been resolved
    pub id: Option<SchemaId>,
    pub retry: RetryState,
    /// Zero after a success
    pub retry_after: Duration,
}

impl ForwardMapping {
    /// Fresh mapping after a successful resolution
    pub fn resolved(id: SchemaId, now: Instant) -> Self {
        Self {
            created_at: now,
            attempted_at: now,
            id: Some(id),
            retry: RetryState::default(),
            retry_after: Duration::ZERO,
        }
    }

    /// Mapping after a failed attempt, keeping any previous id as a stale answer
    pub fn failed(
        previous: Option<&ForwardMapping>,
        retry: RetryState,
        retry_after: Duration,
        now: Instant,
    ) -> Self {
        Self {
            created_at: previous.map_or(now, |p| p.created_at),
            attempted_at: now,
            id: previous.and_then(|p| p.id),
            retry,
            retry_after,
        }
    }

    pub fn expired(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.created_at) >= max_age
    }

    /// Whether the backoff window since the last attempt has elapsed
    pub fn retry_allowed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.attempted_at) >= self.retry_after
    }

    /// Whether a caller may start a new registry attempt for this mapping
    pub fn refreshable(&self, now: Instant, max_age: Duration) -> bool {
        self.retry_allowed(now) && (self.id.is_none() || self.expired(now, max_age))
    }

    /// Serving an id past its freshness window
    pub fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        self.id.is_some() && self.expired(now, max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(1), Duration::from_secs(10))
    }

    #[test]
    fn test_retry_state_edges() {
        let state = RetryState::default();
        let (state, first) = state.fail();
        assert!(first);
        let (state, first) = state.fail();
        assert!(!first);
        assert_eq!(state.attempts(), 2);

        let (state, recovered) = state.succeed();
        assert!(recovered);
        assert!(!state.is_failing());

        let (_, recovered) = state.succeed();
        assert!(!recovered);
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = policy();
        let mut delay = Duration::ZERO;
        let mut seen = Vec::new();
        for _ in 0..6 {
            delay = policy.next_delay(delay);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_backoff_matches_closed_form() {
        let policy = policy();
        let mut delay = Duration::ZERO;
        for k in 1..=8u32 {
            delay = policy.next_delay(delay);
            let expected = (Duration::from_secs(1) * 2u32.pow(k - 1)).min(Duration::from_secs(10));
            assert_eq!(delay, expected, "after {} failures", k);
        }
    }

    #[test]
    fn test_base_above_max_age_is_capped() {
        let policy = RetryPolicy::new(Duration::from_secs(30), Duration::from_secs(5));
        assert_eq!(policy.next_delay(Duration::ZERO), Duration::from_secs(5));
    }

    #[test]
    fn test_cached_schema_refreshable_only_when_empty() {
        assert!(CachedSchema::default().refreshable());
        let cached = CachedSchema {
            schema: Some(Arc::from("{}")),
            retry: RetryState::default(),
        };
        assert!(!cached.refreshable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_mapping_not_refreshable() {
        let now = Instant::now();
        let mapping = ForwardMapping::resolved(SchemaId::new(42), now);
        let max_age = Duration::from_secs(10);

        assert!(!mapping.refreshable(now, max_age));
        assert!(mapping.refreshable(now + max_age, max_age));
        assert!(mapping.is_stale(now + max_age, max_age));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_mapping_waits_for_backoff() {
        let now = Instant::now();
        let (retry, _) = RetryState::default().fail();
        let mapping = ForwardMapping::failed(None, retry, Duration::from_secs(2), now);
        let max_age = Duration::from_secs(10);

        assert_eq!(mapping.id, None);
        assert!(!mapping.refreshable(now + Duration::from_secs(1), max_age));
        assert!(mapping.refreshable(now + Duration::from_secs(2), max_age));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_mapping_keeps_stale_id() {
        let start = Instant::now();
        let previous = ForwardMapping::resolved(SchemaId::new(42), start);
        let later = start + Duration::from_secs(20);
        let (retry, _) = RetryState::default().fail();

        let mapping = ForwardMapping::failed(Some(&previous), retry, Duration::from_secs(1), later);
        assert_eq!(mapping.id, Some(SchemaId::new(42)));
        assert_eq!(mapping.created_at, start);
        assert_eq!(mapping.attempted_at, later);
        assert!(!mapping.retry_allowed(later));
    }
}
