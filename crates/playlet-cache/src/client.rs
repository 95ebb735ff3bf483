//! Keyed query cache with stale-while-revalidate, de-duplication, retry,
//! and observer-driven garbage collection.

use crate::{QueryError, QueryKey, QueryResult, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for cache freshness, garbage collection, and retries.
#[derive(Debug, Clone)]
pub struct QueryConfig {
    /// Entries younger than this are served without a network call.
    pub stale_after: Duration,
    /// Entries unobserved for longer than this are dropped by the sweeper.
    pub gc_after: Duration,
    /// How often the background sweeper runs.
    pub gc_interval: Duration,
    /// Retry policy shared by reads and mutations.
    pub retry: RetryPolicy,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            gc_after: Duration::from_secs(300),
            gc_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// A cached response for one key.
struct CacheEntry {
    value: Arc<Value>,
    fetched_at: Instant,
    last_used: Instant,
    /// Most recent background refetch failure, if any. The stale value is
    /// retained alongside it.
    error: Option<QueryError>,
}

type FetchOutcome = QueryResult<Arc<Value>>;

enum CacheHit {
    Fresh(Arc<Value>),
    Stale(Arc<Value>),
    Miss,
}

enum FlightRole {
    Leader,
    Waiter(oneshot::Receiver<FetchOutcome>),
}

struct ClientInner {
    config: QueryConfig,
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    /// Keys with a fetch in flight, with the waiters to notify on
    /// completion. Presence of a key claims leadership for that fetch.
    in_flight: Mutex<HashMap<QueryKey, Vec<oneshot::Sender<FetchOutcome>>>>,
    /// Active observer counts per key; observed entries survive sweeps.
    observers: Mutex<HashMap<QueryKey, usize>>,
}

impl ClientInner {
    /// Drop entries that have no observer and have been idle past the GC
    /// window.
    fn sweep(&self) {
        let observers = self.observers.lock().unwrap();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        let gc_after = self.config.gc_after;
        entries.retain(|key, entry| {
            observers.contains_key(key) || entry.last_used.elapsed() < gc_after
        });
        let dropped = before - entries.len();
        if dropped > 0 {
            debug!(dropped, "Swept idle cache entries");
        }
    }
}

/// Keyed request cache.
///
/// Cheap to clone: clones share the same cache. Values are cached as JSON
/// and handed out as `Arc<T>`; the heterogeneous cache stays simple because
/// every DTO is already serde-typed.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    /// Create a new query client.
    pub fn new(config: QueryConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                entries: Mutex::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                observers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Fetch the value for a key.
    ///
    /// Fresh cache hits return without a network call. Stale hits return the
    /// cached value immediately and trigger one background revalidation.
    /// Misses run the fetcher (with retry); concurrent callers for the same
    /// key wait on the leader's result instead of issuing their own call.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> QueryResult<Arc<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        match self.peek(&key) {
            CacheHit::Fresh(value) => decode(value),
            CacheHit::Stale(value) => {
                self.spawn_revalidate(key, fetcher);
                decode(value)
            }
            CacheHit::Miss => match self.claim_or_join(&key) {
                FlightRole::Leader => decode(self.run_fetch(key, fetcher).await?),
                FlightRole::Waiter(rx) => {
                    let outcome = rx.await.map_err(|_| QueryError::Cancelled)?;
                    decode(outcome?)
                }
            },
        }
    }

    /// Run a mutation under the shared retry policy. The caller invalidates
    /// whatever keys the write affects.
    pub async fn mutate<T, F, Fut>(&self, op: F) -> QueryResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        self.run_with_retry(op).await
    }

    /// Drop the cached entry for a key; the next read refetches.
    pub fn invalidate(&self, key: &QueryKey) {
        if self.inner.entries.lock().unwrap().remove(key).is_some() {
            debug!(key = %key, "Invalidated cache entry");
        }
    }

    /// Register an observer for a key. The entry is pinned against garbage
    /// collection until the returned guard is dropped.
    pub fn observe(&self, key: QueryKey) -> QueryObserver {
        *self
            .inner
            .observers
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert(0) += 1;
        QueryObserver {
            client: self.clone(),
            key,
        }
    }

    /// Spawn the background sweeper. The task holds a weak reference and
    /// exits once the last client handle is dropped.
    pub fn start_gc(&self) {
        let inner: Weak<ClientInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.gc_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = inner.upgrade() else { break };
                inner.sweep();
            }
        });
    }

    /// Classify the cached state of a key, touching its last-used time.
    fn peek(&self, key: &QueryKey) -> CacheHit {
        let mut entries = self.inner.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = Instant::now();
                if entry.fetched_at.elapsed() < self.inner.config.stale_after {
                    CacheHit::Fresh(entry.value.clone())
                } else {
                    CacheHit::Stale(entry.value.clone())
                }
            }
            None => CacheHit::Miss,
        }
    }

    /// Become the leader for a key's fetch, or join an existing one.
    fn claim_or_join(&self, key: &QueryKey) -> FlightRole {
        let mut in_flight = self.inner.in_flight.lock().unwrap();
        match in_flight.get_mut(key) {
            Some(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                FlightRole::Waiter(rx)
            }
            None => {
                in_flight.insert(key.clone(), Vec::new());
                FlightRole::Leader
            }
        }
    }

    /// Revalidate a stale key in the background, unless a fetch for it is
    /// already in flight.
    fn spawn_revalidate<T, F, Fut>(&self, key: QueryKey, fetcher: F)
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult<T>> + Send + 'static,
    {
        {
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if in_flight.contains_key(&key) {
                return;
            }
            in_flight.insert(key.clone(), Vec::new());
        }

        debug!(key = %key, "Revalidating stale entry");
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.run_fetch(key, fetcher).await {
                warn!(error = %e, "Background revalidation failed");
            }
        });
    }

    /// Execute a fetch as the leader: retry, store the result, notify every
    /// waiter, release the in-flight claim.
    async fn run_fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> FetchOutcome
    where
        T: Serialize,
        F: Fn() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        let outcome = self.run_with_retry(fetcher).await.and_then(|value| {
            serde_json::to_value(&value)
                .map(Arc::new)
                .map_err(|e| QueryError::Decode(e.to_string()))
        });

        {
            let mut entries = self.inner.entries.lock().unwrap();
            match &outcome {
                Ok(value) => {
                    entries.insert(
                        key.clone(),
                        CacheEntry {
                            value: value.clone(),
                            fetched_at: Instant::now(),
                            last_used: Instant::now(),
                            error: None,
                        },
                    );
                }
                Err(e) => {
                    // Keep any stale value; just record the failure on it
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.error = Some(e.clone());
                    }
                }
            }
        }

        let waiters = self
            .inner
            .in_flight
            .lock()
            .unwrap()
            .remove(&key)
            .unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }

        outcome
    }

    /// Run an operation, retrying transient failures per the policy.
    async fn run_with_retry<T, F, Fut>(&self, op: F) -> QueryResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        let policy = &self.inner.config.retry;
        let mut last_error = None;

        for attempt in 0..policy.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    last_error = Some(e);

                    if attempt + 1 < policy.max_attempts {
                        let delay = policy.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "Transient request failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(QueryError::RetriesExhausted {
            attempts: policy.max_attempts,
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

/// RAII guard pinning a key's cache entry while a consumer observes it.
pub struct QueryObserver {
    client: QueryClient,
    key: QueryKey,
}

impl QueryObserver {
    /// The observed key.
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        let mut observers = self.client.inner.observers.lock().unwrap();
        if let Some(count) = observers.get_mut(&self.key) {
            *count -= 1;
            if *count == 0 {
                observers.remove(&self.key);
            }
        }
    }
}

fn decode<T: DeserializeOwned>(value: Arc<Value>) -> QueryResult<Arc<T>> {
    serde_json::from_value((*value).clone())
        .map(Arc::new)
        .map_err(|e| QueryError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_client() -> QueryClient {
        QueryClient::new(QueryConfig::default())
    }

    /// Fetcher that sleeps briefly (so concurrent callers overlap) and
    /// returns the number of calls made so far.
    fn counting_fetcher(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = QueryResult<u64>> + Send>> + Clone {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(calls.fetch_add(1, Ordering::SeqCst) as u64 + 1)
            })
        }
    }

    #[tokio::test]
    async fn test_fresh_hit_serves_cached_value() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());
        let key = QueryKey::new("series");

        let first = client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();
        let second = client.fetch::<u64, _, _>(key, fetcher).await.unwrap();

        assert_eq!(*first, 1);
        assert_eq!(*second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_same_key_deduplicated() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());
        let key = QueryKey::new("series");

        let (a, b) = tokio::join!(
            client.fetch::<u64, _, _>(key.clone(), fetcher.clone()),
            client.fetch::<u64, _, _>(key, fetcher),
        );

        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_distinct_keys_not_deduplicated() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());

        let (a, b) = tokio::join!(
            client.fetch::<u64, _, _>(QueryKey::new("series"), fetcher.clone()),
            client.fetch::<u64, _, _>(QueryKey::new("watchlist"), fetcher),
        );

        a.unwrap();
        b.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_served_then_revalidated() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());
        let key = QueryKey::new("series");

        let first = client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();
        assert_eq!(*first, 1);

        tokio::time::advance(Duration::from_secs(31)).await;

        // Stale hit: old value comes back immediately, refetch runs behind it
        let stale = client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();
        assert_eq!(*stale, 1);

        // Let the background revalidation finish
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Now fresh again with the revalidated value
        let fresh = client.fetch::<u64, _, _>(key, fetcher).await.unwrap();
        assert_eq!(*fresh, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_revalidation_runs_once_for_concurrent_readers() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());
        let key = QueryKey::new("series");

        client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        let (a, b) = tokio::join!(
            client.fetch::<u64, _, _>(key.clone(), fetcher.clone()),
            client.fetch::<u64, _, _>(key, fetcher),
        );
        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        // One initial fetch plus exactly one revalidation
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_retried_once() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(QueryError::Request {
                            message: "connection reset".to_string(),
                            transient: true,
                        })
                    } else {
                        Ok(7u64)
                    }
                }
            }
        };

        let value = client
            .fetch::<u64, _, _>(QueryKey::new("series"), fetcher)
            .await
            .unwrap();
        assert_eq!(*value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u64, _>(QueryError::Request {
                        message: "not found".to_string(),
                        transient: false,
                    })
                }
            }
        };

        let err = client
            .fetch::<u64, _, _>(QueryKey::new("missing"), fetcher)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Request {
                transient: false,
                ..
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted_on_persistent_transient_failure() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u64, _>(QueryError::Request {
                        message: "timeout".to_string(),
                        transient: true,
                    })
                }
            }
        };

        let err = client
            .fetch::<u64, _, _>(QueryKey::new("flaky"), fetcher)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::RetriesExhausted { attempts: 2, .. }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_delivered_to_every_waiter() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<u64, _>(QueryError::Request {
                        message: "boom".to_string(),
                        transient: false,
                    })
                }
            }
        };
        let key = QueryKey::new("doomed");

        let (a, b) = tokio::join!(
            client.fetch::<u64, _, _>(key.clone(), fetcher.clone()),
            client.fetch::<u64, _, _>(key, fetcher),
        );

        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_on_one_key_preserves_others() {
        let client = test_client();
        let good_calls = Arc::new(AtomicUsize::new(0));
        let good = counting_fetcher(good_calls.clone());
        let bad = || async {
            Err::<u64, _>(QueryError::Request {
                message: "boom".to_string(),
                transient: false,
            })
        };

        client
            .fetch::<u64, _, _>(QueryKey::new("good"), good.clone())
            .await
            .unwrap();
        client
            .fetch::<u64, _, _>(QueryKey::new("bad"), bad)
            .await
            .unwrap_err();

        // The good key is still cached; no refetch
        client
            .fetch::<u64, _, _>(QueryKey::new("good"), good)
            .await
            .unwrap();
        assert_eq!(good_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());
        let key = QueryKey::new("series");

        client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();
        client.invalidate(&key);
        let value = client.fetch::<u64, _, _>(key, fetcher).await.unwrap();

        assert_eq!(*value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_idle_unobserved_entries() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());
        let key = QueryKey::new("series");

        client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        client.inner.sweep();

        // Entry gone; next read refetches
        client.fetch::<u64, _, _>(key, fetcher).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_pins_entry_against_sweep() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());
        let key = QueryKey::new("series");

        let guard = client.observe(key.clone());
        client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        client.inner.sweep();

        // Pinned: served from cache even though idle past the window
        // (stale, so a revalidation kicks off; let it finish)
        client
            .fetch::<u64, _, _>(key.clone(), fetcher.clone())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Dropped once the observer goes away
        drop(guard);
        tokio::time::advance(Duration::from_secs(301)).await;
        client.inner.sweep();
        assert!(client.inner.entries.lock().unwrap().get(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutate_retries_transient_failures() {
        let client = test_client();
        let calls = Arc::new(AtomicUsize::new(0));
        let op = {
            let calls = calls.clone();
            move || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(QueryError::Request {
                            message: "gateway timeout".to_string(),
                            transient: true,
                        })
                    } else {
                        Ok(())
                    }
                }
            }
        };

        client.mutate(op).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
