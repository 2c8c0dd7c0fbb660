//! Single-flight resolution table
//!
//! Each key maps to at most one [`Flight`]. A caller that finds no flight, an
//! abandoned one, or a completed one its predicate deems replaceable installs a
//! fresh pending flight and becomes its leader; everyone else follows the
//! existing flight and waits for it to complete.
//!
//! Installation happens under the map shard lock for the key. The registry
//! call itself runs outside any lock, so different keys never wait on each
//! other.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

enum FlightState<V> {
    Pending,
    Ready(Arc<V>),
    /// Leader went away without a value
    Abandoned,
}

/// One resolution attempt, observable by any number of waiters
pub struct Flight<V> {
    state: watch::Sender<FlightState<V>>,
}

impl<V> Flight<V> {
    fn pending() -> Arc<Self> {
        let (state, _) = watch::channel(FlightState::Pending);
        Arc::new(Self { state })
    }

    fn is_pending(&self) -> bool {
        matches!(*self.state.borrow(), FlightState::Pending)
    }

    /// Completed value, if any
    pub fn peek(&self) -> Option<Arc<V>> {
        match &*self.state.borrow() {
            FlightState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Wait until the flight completes; `None` if it was abandoned
    pub async fn wait(&self) -> Option<Arc<V>> {
        let mut rx = self.state.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, FlightState::Pending))
            .await
            .ok()?;
        let value = match &*state {
            FlightState::Ready(value) => Some(value.clone()),
            _ => None,
        };
        value
    }

    fn complete(&self, state: FlightState<V>) {
        self.state.send_replace(state);
    }
}

/// Completes the leader's flight exactly once
///
/// Dropping the guard without calling [`FlightGuard::complete`] restores the
/// value the flight replaced, or marks the flight abandoned when there was none.
pub struct FlightGuard<V> {
    flight: Arc<Flight<V>>,
    previous: Option<Arc<V>>,
    done: bool,
}

impl<V> FlightGuard<V> {
    /// Value this flight replaced
    pub fn previous(&self) -> Option<&Arc<V>> {
        self.previous.as_ref()
    }

    pub fn complete(mut self, value: V) -> Arc<V> {
        let value = Arc::new(value);
        self.flight.complete(FlightState::Ready(value.clone()));
        self.done = true;
        value
    }
}

impl<V> Drop for FlightGuard<V> {
    fn drop(&mut self) {
        if !self.done {
            let state = match self.previous.take() {
                Some(previous) => FlightState::Ready(previous),
                None => FlightState::Abandoned,
            };
            self.flight.complete(state);
        }
    }
}

/// Result of claiming a key
pub enum Claim<V> {
    /// Caller must perform the registry call and complete the guard
    Leader(FlightGuard<V>),
    /// Another caller's flight, pending or completed
    Follower(Arc<Flight<V>>),
}

/// Shared table of in-flight and completed resolutions
pub struct SingleFlight<K, V> {
    flights: DashMap<K, Arc<Flight<V>>>,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self {
            flights: DashMap::new(),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Hash + Eq + Clone + std::fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    /// Completed value for `key`, without waiting
    pub fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.flights.get(key).and_then(|flight| flight.peek())
    }

    /// Install a pending flight for `key` unless a live one must be followed
    ///
    /// `replaceable` is consulted only for completed flights; pending flights
    /// are always followed.
    pub fn claim(&self, key: &K, replaceable: impl FnOnce(&V) -> bool) -> Claim<V> {
        match self.flights.entry(key.clone()) {
            Entry::Vacant(entry) => {
                let flight = Flight::pending();
                entry.insert(flight.clone());
                debug!(key = %key, "Claimed new flight");
                Claim::Leader(FlightGuard {
                    flight,
                    previous: None,
                    done: false,
                })
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get();
                if existing.is_pending() {
                    return Claim::Follower(existing.clone());
                }
                let previous = existing.peek();
                let replace = match &previous {
                    Some(value) => replaceable(value),
                    None => true,
                };
                if !replace {
                    return Claim::Follower(existing.clone());
                }
                let flight = Flight::pending();
                entry.insert(flight.clone());
                debug!(key = %key, "Replaced completed flight");
                Claim::Leader(FlightGuard {
                    flight,
                    previous,
                    done: false,
                })
            }
        }
    }

    /// Resolve `key`, running `fetch` only if this caller becomes the leader
    ///
    /// `fetch` receives the value being replaced. Followers share the
    /// leader's outcome; `None` means no value is available this round.
    pub async fn resolve<F, Fut>(
        &self,
        key: &K,
        replaceable: impl FnOnce(&V) -> bool,
        fetch: F,
    ) -> Option<Arc<V>>
    where
        F: FnOnce(Option<Arc<V>>) -> Fut,
        Fut: Future<Output = V>,
    {
        match self.claim(key, replaceable) {
            Claim::Leader(guard) => {
                let previous = guard.previous().cloned();
                let value = fetch(previous).await;
                Some(guard.complete(value))
            }
            Claim::Follower(flight) => flight.wait().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_claim_leads() {
        let table: SingleFlight<u32, &str> = SingleFlight::new();
        let value = table.resolve(&1, |_| true, |_| async { "a" }).await;
        assert_eq!(value.as_deref(), Some(&"a"));
        assert_eq!(table.peek(&1).as_deref(), Some(&"a"));
    }

    #[tokio::test]
    async fn test_completed_flight_followed_when_not_replaceable() {
        let table: SingleFlight<u32, u32> = SingleFlight::new();
        table.resolve(&1, |_| true, |_| async { 10 }).await;

        let value = table
            .resolve(&1, |_| false, |_| async { panic!("must not fetch") })
            .await;
        assert_eq!(value.as_deref(), Some(&10));
    }

    #[tokio::test]
    async fn test_replaceable_flight_sees_previous() {
        let table: SingleFlight<u32, u32> = SingleFlight::new();
        table.resolve(&1, |_| true, |_| async { 10 }).await;

        let value = table
            .resolve(&1, |v| *v == 10, |previous| async move {
                previous.map(|p| *p + 1).unwrap_or(0)
            })
            .await;
        assert_eq!(value.as_deref(), Some(&11));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_fetch() {
        let table: Arc<SingleFlight<u32, u32>> = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let table = table.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    table
                        .resolve(&7, |_| false, |_| async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            99
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().as_deref(), Some(&99));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_leader_abandons_flight() {
        let table: SingleFlight<u32, u32> = SingleFlight::new();
        let guard = match table.claim(&1, |_| true) {
            Claim::Leader(guard) => guard,
            Claim::Follower(_) => panic!("first claim must lead"),
        };
        let follower = match table.claim(&1, |_| true) {
            Claim::Follower(flight) => flight,
            Claim::Leader(_) => panic!("pending flight must be followed"),
        };

        drop(guard);
        assert!(follower.wait().await.is_none());

        // abandoned flights can be claimed again
        assert!(matches!(table.claim(&1, |_| false), Claim::Leader(_)));
    }

    #[tokio::test]
    async fn test_dropped_leader_restores_previous() {
        let table: SingleFlight<u32, u32> = SingleFlight::new();
        table.resolve(&1, |_| true, |_| async { 5 }).await;

        let guard = match table.claim(&1, |_| true) {
            Claim::Leader(guard) => guard,
            Claim::Follower(_) => panic!("replaceable flight must lead"),
        };
        assert_eq!(guard.previous().map(|v| **v), Some(5));
        drop(guard);

        assert_eq!(table.peek(&1).as_deref(), Some(&5));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let table: Arc<SingleFlight<u32, u32>> = Arc::new(SingleFlight::new());
        let _slow = match table.claim(&1, |_| true) {
            Claim::Leader(guard) => guard,
            Claim::Follower(_) => panic!("first claim must lead"),
        };

        let value = tokio::time::timeout(
            Duration::from_secs(1),
            table.resolve(&2, |_| true, |_| async { 2 }),
        )
        .await
        .expect("other key must not wait");
        assert_eq!(value.as_deref(), Some(&2));
        assert_eq!(table.len(), 2);
    }
}
