//! Keyed build-once cache.
//!
//! [`FlightCache`] memoizes the result of an async build per key and
//! guarantees at most one build per key at a time:
//!
//! 1. Fast path: a ready value is returned without building.
//! 2. Leader election: the first caller for a missing key installs a pending
//!    slot before it suspends, then runs the build.
//! 3. Waiters: later callers find the pending slot and wait on its `watch`
//!    channel, receiving the leader's result (value or error) directly.
//! 4. Completion: a successful value is stored; a failure removes the slot so
//!    the next caller builds again.
//!
//! A key invalidated while its build is pending still delivers the result to
//! the waiters already attached, but the result is not stored. If the leader
//! is dropped before finishing, the slot is removed and its waiters start over.

use std::collections::HashMap;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;

type Outcome<V, E> = Option<Result<V, E>>;

enum Slot<V, E> {
    Ready(V),
    Pending {
        generation: u64,
        rx: watch::Receiver<Outcome<V, E>>,
    },
}

struct Slots<V, E> {
    entries: HashMap<String, Slot<V, E>>,
    next_generation: u64,
}

/// Build-once cache keyed by name.
pub(crate) struct FlightCache<V, E> {
    slots: Mutex<Slots<V, E>>,
}

enum Entry<V, E> {
    Ready(V),
    Waiter(watch::Receiver<Outcome<V, E>>),
    Leader {
        tx: watch::Sender<Outcome<V, E>>,
        generation: u64,
    },
}

impl<V: Clone, E: Clone> FlightCache<V, E> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    /// Returns the cached value for `key`, building it with `build` if needed.
    ///
    /// `build` runs only when this caller is elected leader.
    pub(crate) async fn get_or_build<F, Fut>(&self, key: &str, build: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let (tx, generation) = loop {
            match self.enter(key) {
                Entry::Ready(value) => return Ok(value),
                Entry::Waiter(rx) => {
                    if let Some(outcome) = wait(rx).await {
                        return outcome;
                    }
                    // Leader abandoned the build; elect again.
                }
                Entry::Leader { tx, generation } => break (tx, generation),
            }
        };

        let guard = LeaderGuard {
            cache: self,
            key,
            generation,
            tx: Some(tx),
        };
        let outcome = build().await;
        guard.finish(outcome)
    }

    fn enter(&self, key: &str) -> Entry<V, E> {
        let mut slots = self.slots.lock();
        match slots.entries.get(key) {
            Some(Slot::Ready(value)) => Entry::Ready(value.clone()),
            Some(Slot::Pending { rx, .. }) => Entry::Waiter(rx.clone()),
            None => {
                let (tx, rx) = watch::channel(None);
                slots.next_generation += 1;
                let generation = slots.next_generation;
                slots
                    .entries
                    .insert(key.to_string(), Slot::Pending { generation, rx });
                Entry::Leader { tx, generation }
            }
        }
    }

    /// Returns the ready value for `key` without building.
    pub(crate) fn get(&self, key: &str) -> Option<V> {
        match self.slots.lock().entries.get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns true if a value is stored for `key`.
    pub(crate) fn is_ready(&self, key: &str) -> bool {
        matches!(self.slots.lock().entries.get(key), Some(Slot::Ready(_)))
    }

    /// Drops the value or pending build for `key`. Returns true if anything
    /// was removed.
    pub(crate) fn invalidate(&self, key: &str) -> bool {
        self.slots.lock().entries.remove(key).is_some()
    }

    /// Drops every value and pending build.
    pub(crate) fn clear(&self) {
        self.slots.lock().entries.clear();
    }

    /// Number of stored values, pending builds excluded.
    pub(crate) fn ready_len(&self) -> usize {
        self.slots
            .lock()
            .entries
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    fn settle(&self, key: &str, generation: u64, outcome: &Result<V, E>) {
        let mut slots = self.slots.lock();
        let current = matches!(
            slots.entries.get(key),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if !current {
            return;
        }
        match outcome {
            Ok(value) => {
                slots
                    .entries
                    .insert(key.to_string(), Slot::Ready(value.clone()));
            }
            Err(_) => {
                slots.entries.remove(key);
            }
        }
    }

    fn abandon(&self, key: &str, generation: u64) {
        let mut slots = self.slots.lock();
        let current = matches!(
            slots.entries.get(key),
            Some(Slot::Pending { generation: g, .. }) if *g == generation
        );
        if current {
            slots.entries.remove(key);
        }
    }
}

/// Waits for the leader's outcome. `None` means the leader went away without
/// publishing one.
async fn wait<V: Clone, E: Clone>(
    mut rx: watch::Receiver<Outcome<V, E>>,
) -> Option<Result<V, E>> {
    loop {
        let current = rx.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

/// Publishes the leader's outcome, or un-wedges the key if the leader is
/// dropped first.
struct LeaderGuard<'a, V: Clone, E: Clone> {
    cache: &'a FlightCache<V, E>,
    key: &'a str,
    generation: u64,
    tx: Option<watch::Sender<Outcome<V, E>>>,
}

impl<V: Clone, E: Clone> LeaderGuard<'_, V, E> {
    fn finish(mut self, outcome: Result<V, E>) -> Result<V, E> {
        self.cache.settle(self.key, self.generation, &outcome);
        if let Some(tx) = self.tx.take() {
            tx.send_replace(Some(outcome.clone()));
        }
        outcome
    }
}

impl<V: Clone, E: Clone> Drop for LeaderGuard<'_, V, E> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.cache.abandon(self.key, self.generation);
            // Dropping the sender wakes the waiters with no outcome.
            self.tx = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_builds_once_and_caches() {
        let cache: FlightCache<u32, String> = FlightCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_build("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_ready("k"));
        assert_eq!(cache.get("k"), Some(7));
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache: FlightCache<u32, String> = FlightCache::new();

        let err = cache
            .get_or_build("k", || async { Err("nope".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err, "nope");
        assert!(!cache.is_ready("k"));

        let value = cache.get_or_build("k", || async { Ok(1) }).await.unwrap();
        assert_eq!(value, 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let cache: Arc<FlightCache<u32, String>> = Arc::new(FlightCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            let release = release.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_build("k", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        release.notified().await;
                        Ok(42)
                    })
                    .await
            }));
        }

        tokio::task::yield_now().await;
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        release.notify_one();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_during_build_skips_store() {
        let cache: Arc<FlightCache<u32, String>> = Arc::new(FlightCache::new());
        let release = Arc::new(Notify::new());
        let started = Arc::new(Notify::new());

        let leader = {
            let cache = cache.clone();
            let release = release.clone();
            let started = started.clone();
            tokio::spawn(async move {
                cache
                    .get_or_build("k", || async move {
                        started.notify_one();
                        release.notified().await;
                        Ok(1)
                    })
                    .await
            })
        };

        started.notified().await;
        assert!(cache.invalidate("k"));
        release.notify_one();

        assert_eq!(leader.await.unwrap(), Ok(1));
        assert!(!cache.is_ready("k"));
    }

    #[tokio::test]
    async fn test_dropped_leader_lets_next_caller_build() {
        let cache: FlightCache<u32, String> = FlightCache::new();

        {
            let fut = cache.get_or_build("k", futures::future::pending::<Result<u32, String>>);
            // Poll once so the leader installs its pending slot, then drop it.
            let mut fut = Box::pin(fut);
            assert!(futures::poll!(fut.as_mut()).is_pending());
        }

        let value = cache.get_or_build("k", || async { Ok(5) }).await.unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_clear_and_ready_len() {
        let cache: FlightCache<u32, String> = FlightCache::new();
        futures::executor::block_on(async {
            cache.get_or_build("a", || async { Ok(1) }).await.unwrap();
            cache.get_or_build("b", || async { Ok(2) }).await.unwrap();
        });
        assert_eq!(cache.ready_len(), 2);
        cache.clear();
        assert_eq!(cache.ready_len(), 0);
        assert!(!cache.invalidate("a"));
    }
}
