//! Shared aggregate cache with request coalescing.
//!
//! One [`SharedCache`] exists per aggregate kind for the whole session. It is
//! constructed once and cloned into every consumer; clones share the same
//! entry, in-flight fetch and metrics.
//!
//! # Guarantees
//!
//! - A non-forced read of a valid entry never touches the source.
//! - At most one fetch per cache is outstanding at any instant. Every caller
//!   arriving while it runs awaits the same handle and observes the same
//!   outcome, success or failure.
//! - A failed fetch leaves the previous entry untouched.
//! - Entry replacement and in-flight clearing happen under one lock
//!   acquisition, so no reader sees a half-updated state.
//! - Fetches run on their own task: once started they complete even if
//!   every waiter has gone away.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use cohort_core::{AggregateKind, CachePolicy, FetchError};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, CacheRead, ReadSource};
use super::source::{AggregateSource, CacheMetrics, CacheStats};

type FetchOutcome<T> = Result<Arc<T>, FetchError>;
type SharedFetch<T> = Shared<BoxFuture<'static, FetchOutcome<T>>>;

struct InFlight<T> {
    generation: u64,
    handle: SharedFetch<T>,
}

struct CacheState<T> {
    entry: CacheEntry<T>,
    in_flight: Option<InFlight<T>>,
    next_generation: u64,
}

impl<T> CacheState<T> {
    fn new() -> Self {
        Self {
            entry: CacheEntry::empty(),
            in_flight: None,
            next_generation: 0,
        }
    }

    /// Drop the in-flight handle if it still belongs to `generation`.
    fn finish(&mut self, generation: u64) {
        if self
            .in_flight
            .as_ref()
            .is_some_and(|f| f.generation == generation)
        {
            self.in_flight = None;
        }
    }
}

struct Inner<S: AggregateSource> {
    source: Arc<S>,
    kind: AggregateKind,
    policy: CachePolicy,
    state: Mutex<CacheState<S::Output>>,
    metrics: CacheMetrics,
}

impl<S: AggregateSource> Inner<S> {
    // The lock is never held across an await and every critical section
    // leaves the state consistent, so a poisoned lock is still usable.
    fn state(&self) -> MutexGuard<'_, CacheState<S::Output>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Time-bounded, process-scoped cache for one expensive aggregate.
///
/// Must be used from within a tokio runtime: fetches are spawned tasks.
pub struct SharedCache<S: AggregateSource> {
    inner: Arc<Inner<S>>,
}

impl<S: AggregateSource> SharedCache<S> {
    /// Create an empty cache over `source`.
    pub fn new(source: S, policy: CachePolicy) -> Self {
        Self::from_arc(Arc::new(source), policy)
    }

    /// Create an empty cache over an already shared source.
    pub fn from_arc(source: Arc<S>, policy: CachePolicy) -> Self {
        let kind = source.kind();
        Self {
            inner: Arc::new(Inner {
                source,
                kind,
                policy,
                state: Mutex::new(CacheState::new()),
                metrics: CacheMetrics::new(),
            }),
        }
    }

    /// Create an empty cache with the default five-minute window.
    pub fn with_defaults(source: S) -> Self {
        Self::new(source, CachePolicy::default())
    }

    pub fn kind(&self) -> AggregateKind {
        self.inner.kind
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Get the aggregate, fetching it if the entry is absent, stale, or
    /// `force_refresh` is set.
    pub async fn get(&self, force_refresh: bool) -> Result<Arc<S::Output>, FetchError> {
        self.read(force_refresh).await.map(CacheRead::into_value)
    }

    /// Like [`get`](Self::get), but reports where the value came from.
    pub async fn read(&self, force_refresh: bool) -> Result<CacheRead<S::Output>, FetchError> {
        let (handle, source) = {
            let mut state = self.inner.state();
            let now = Instant::now();

            if !force_refresh && state.entry.is_valid(now, self.inner.policy.validity_window) {
                if let Some(value) = state.entry.value() {
                    CacheMetrics::incr(&self.inner.metrics.hits);
                    debug!(kind = %self.inner.kind, "Cache hit");
                    return Ok(CacheRead::new(Arc::clone(value), ReadSource::Cache));
                }
            }

            let joined = state
                .in_flight
                .as_ref()
                .map(|f| (f.generation, f.handle.clone()));
            match joined {
                Some((generation, handle)) => {
                    CacheMetrics::incr(&self.inner.metrics.coalesced);
                    debug!(
                        kind = %self.inner.kind,
                        force_refresh,
                        generation,
                        "Joining in-flight fetch"
                    );
                    (handle, ReadSource::Coalesced)
                }
                None => {
                    CacheMetrics::incr(&self.inner.metrics.misses);
                    (self.start_fetch(&mut state, force_refresh), ReadSource::Fetched)
                }
            }
        };

        let value = handle.await?;
        Ok(CacheRead::new(value, source))
    }

    /// Spawn the one fetch allowed for this cache and register its handle.
    fn start_fetch(
        &self,
        state: &mut CacheState<S::Output>,
        force_refresh: bool,
    ) -> SharedFetch<S::Output> {
        let generation = state.next_generation;
        state.next_generation += 1;

        CacheMetrics::incr(&self.inner.metrics.fetches);
        debug!(kind = %self.inner.kind, force_refresh, generation, "Starting fetch");

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = inner.source.compute(force_refresh).await.map(Arc::new);

            let mut state = inner.state();
            match &outcome {
                Ok(value) => {
                    state.entry.replace(Arc::clone(value), Instant::now());
                    info!(
                        kind = %inner.kind,
                        generation,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Aggregate fetched"
                    );
                }
                Err(err) => {
                    CacheMetrics::incr(&inner.metrics.failures);
                    warn!(kind = %inner.kind, generation, error = %err, "Aggregate fetch failed");
                }
            }
            state.finish(generation);
            outcome
        });

        let inner = Arc::clone(&self.inner);
        let handle = async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    // The task never reached its own cleanup.
                    inner.state().finish(generation);
                    warn!(kind = %inner.kind, generation, error = %join_err, "Fetch task aborted");
                    Err(FetchError::Aborted { kind: inner.kind })
                }
            }
        }
        .boxed()
        .shared();

        state.in_flight = Some(InFlight {
            generation,
            handle: handle.clone(),
        });
        handle
    }

    /// The cached value, valid or stale, without fetching.
    pub fn peek(&self) -> Option<Arc<S::Output>> {
        self.inner.state().entry.value().cloned()
    }

    /// Whether a non-forced read at `now` would be served from the entry.
    pub fn is_valid(&self, now: Instant) -> bool {
        self.inner
            .state()
            .entry
            .is_valid(now, self.inner.policy.validity_window)
    }

    pub fn is_valid_now(&self) -> bool {
        self.is_valid(Instant::now())
    }

    /// Whether a fetch is currently outstanding.
    pub fn is_fetching(&self) -> bool {
        self.inner.state().in_flight.is_some()
    }

    /// When the current value was fetched.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.inner.state().entry.fetched_at()
    }

    /// Age of the current value at `now`.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.inner.state().entry.age(now)
    }

    /// Make the next non-forced read refetch, keeping the value peekable.
    ///
    /// Does not start a fetch and does not touch one already in flight.
    pub fn mark_stale(&self) -> bool {
        let marked = self.inner.state().entry.mark_stale();
        if marked {
            debug!(kind = %self.inner.kind, "Entry marked stale");
        }
        marked
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.metrics.snapshot()
    }
}

impl<S: AggregateSource> Clone for SharedCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: AggregateSource> std::fmt::Debug for SharedCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state();
        f.debug_struct("SharedCache")
            .field("kind", &self.inner.kind)
            .field("populated", &!state.entry.is_empty())
            .field("marked_stale", &state.entry.is_marked_stale())
            .field("fetching", &state.in_flight.is_some())
            .finish()
    }
}
