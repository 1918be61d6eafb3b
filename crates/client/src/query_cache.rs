//! Client-side query cache with freshness windows and in-flight de-duplication.
//!
//! - `read` never waits: it returns whatever is cached (possibly nothing) and
//!   starts a background fetch when the entry is absent, stale or failed
//! - `fetch` waits for the value, joining any fetch already in flight
//! - every fetch runs on its own task, so dropping a reader never cancels it
//! - a failed fetch keeps the last good value and records the error

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::{CacheState, CachedQueryResult, QueryOptions};

type InFlight = Shared<BoxFuture<'static, ()>>;

struct Entry<T> {
    value: Option<T>,
    fetched_at: Option<DateTime<Utc>>,
    last_fetch: Option<Instant>,
    last_access: Instant,
    invalidated: bool,
    /// Bumped by `invalidate`; a fetch started under an older generation does
    /// not clear the invalidation when it lands.
    generation: u64,
    error: Option<String>,
    options: QueryOptions,
    in_flight: Option<InFlight>,
}

impl<T: Clone> Entry<T> {
    fn new(options: QueryOptions, now: Instant) -> Self {
        Self {
            value: None,
            fetched_at: None,
            last_fetch: None,
            last_access: now,
            invalidated: false,
            generation: 0,
            error: None,
            options,
            in_flight: None,
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        !self.invalidated
            && self.error.is_none()
            && self
                .last_fetch
                .is_some_and(|at| now.duration_since(at) < self.options.freshness_window)
    }

    fn state(&self, now: Instant) -> CacheState {
        if self.in_flight.is_some() {
            CacheState::Refreshing
        } else if self.error.is_some() {
            CacheState::Error
        } else if self.is_fresh(now) {
            CacheState::Fresh
        } else {
            CacheState::Stale
        }
    }

    fn snapshot(&self, key: &str, state: CacheState) -> CachedQueryResult<T> {
        CachedQueryResult {
            key: key.to_string(),
            value: self.value.clone(),
            fetched_at: self.fetched_at,
            state,
            error: self.error.clone(),
        }
    }
}

/// Keyed cache of query results of one value type.
///
/// Cloning is cheap; clones share entries.
pub struct QueryCache<T> {
    entries: Arc<Mutex<HashMap<String, Entry<T>>>>,
}

impl<T> Clone for QueryCache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> core::fmt::Debug for QueryCache<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueryCache").finish_non_exhaustive()
    }
}

impl<T> QueryCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    // Entries stay consistent across a panicking holder: every mutation is a
    // plain field write.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached entry immediately, starting a background fetch when
    /// it is absent, stale or failed.
    ///
    /// The reported state describes what is served: a read that triggers a
    /// refresh of an existing value reports `Stale` (or `Error`), later reads
    /// report `Refreshing` until the fetch lands. A read with nothing cached
    /// reports `Refreshing` with no value.
    pub fn read<F, Fut, E>(&self, key: &str, fetch_fn: F, options: QueryOptions) -> CachedQueryResult<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.evict_expired();

        let now = Instant::now();
        let mut entries = self.lock();
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(options.clone(), now));
        entry.last_access = now;
        entry.options = options;

        let state = entry.state(now);
        if entry.in_flight.is_none() && !entry.is_fresh(now) {
            debug!(key, ?state, "cache miss; fetching in background");
            entry.in_flight = Some(self.spawn_fetch(key, entry.generation, fetch_fn, &entry.options));
            if entry.value.is_none() && entry.error.is_none() {
                return entry.snapshot(key, CacheState::Refreshing);
            }
        }
        entry.snapshot(key, state)
    }

    /// Wait for a settled value: returns a fresh entry as is, otherwise joins
    /// (or starts) the in-flight fetch and returns the entry after it lands.
    pub async fn fetch<F, Fut, E>(
        &self,
        key: &str,
        fetch_fn: F,
        options: QueryOptions,
    ) -> CachedQueryResult<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.evict_expired();

        let in_flight = {
            let now = Instant::now();
            let mut entries = self.lock();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(options.clone(), now));
            entry.last_access = now;
            entry.options = options;

            if entry.in_flight.is_none() && entry.is_fresh(now) {
                return entry.snapshot(key, CacheState::Fresh);
            }
            match &entry.in_flight {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let in_flight =
                        self.spawn_fetch(key, entry.generation, fetch_fn, &entry.options);
                    entry.in_flight = Some(in_flight.clone());
                    in_flight
                }
            }
        };

        in_flight.await;

        self.peek(key).unwrap_or_else(|| CachedQueryResult {
            key: key.to_string(),
            value: None,
            fetched_at: None,
            state: CacheState::Error,
            error: Some("entry evicted while fetching".to_string()),
        })
    }

    /// Current entry without touching its access time or fetching.
    pub fn peek(&self, key: &str) -> Option<CachedQueryResult<T>> {
        let now = Instant::now();
        let entries = self.lock();
        entries.get(key).map(|e| e.snapshot(key, e.state(now)))
    }

    /// Mark an entry stale regardless of its freshness window. Returns whether
    /// the key was cached.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(entry) => {
                entry.invalidated = true;
                entry.generation += 1;
                debug!(key, "cache entry invalidated");
                true
            }
            None => false,
        }
    }

    /// Invalidate every key starting with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.lock();
        let mut count = 0;
        for (key, entry) in entries.iter_mut().filter(|(k, _)| k.starts_with(prefix)) {
            entry.invalidated = true;
            entry.generation += 1;
            debug!(key = %key, "cache entry invalidated");
            count += 1;
        }
        count
    }

    /// The client regained focus: entries with `refetch_on_focus` go stale.
    pub fn on_focus(&self) -> usize {
        let mut entries = self.lock();
        let mut count = 0;
        for entry in entries.values_mut().filter(|e| e.options.refetch_on_focus) {
            entry.invalidated = true;
            entry.generation += 1;
            count += 1;
        }
        count
    }

    /// Drop idle entries older than their retention window. Entries with a
    /// fetch in flight are kept.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| {
            e.in_flight.is_some() || now.duration_since(e.last_access) <= e.options.retention_window
        });
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "evicted expired cache entries");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the fetch task. Called with the entry lock held; the task only
    /// touches the map after the caller has stored the returned handle.
    fn spawn_fetch<F, Fut, E>(
        &self,
        key: &str,
        generation: u64,
        fetch_fn: F,
        options: &QueryOptions,
    ) -> InFlight
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let cache = self.clone();
        let key = key.to_string();
        let options = options.clone();

        let task = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(fetch_with_retry(&key, &fetch_fn, &options))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err("query panicked".to_string()));
            cache.settle(&key, generation, outcome);
        });

        async move {
            if let Err(err) = task.await {
                warn!(error = %err, "query fetch task failed");
            }
        }
        .boxed()
        .shared()
    }

    fn settle(&self, key: &str, generation: u64, outcome: Result<T, String>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.in_flight = None;
        match outcome {
            Ok(value) => {
                entry.value = Some(value);
                entry.fetched_at = Some(Utc::now());
                entry.last_fetch = Some(Instant::now());
                entry.error = None;
                if entry.generation == generation {
                    entry.invalidated = false;
                }
            }
            Err(error) => {
                entry.error = Some(error);
            }
        }
    }
}

async fn fetch_with_retry<T, F, Fut, E>(key: &str, fetch_fn: &F, options: &QueryOptions) -> Result<T, String>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 0;
    loop {
        match fetch_fn().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= options.retry_count => {
                warn!(key, attempts = attempt + 1, error = %err, "query failed; retries exhausted");
                return Err(err.to_string());
            }
            Err(err) => {
                attempt += 1;
                let delay = options.backoff.delay_for_attempt(attempt);
                debug!(key, attempt, delay_ms = delay.as_millis() as u64, error = %err, "query failed; retrying");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
