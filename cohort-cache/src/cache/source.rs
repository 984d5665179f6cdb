//! Aggregate source trait and cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cohort_core::{AggregateKind, FetchError};

/// Remote computation producing one aggregate.
///
/// Implementations may be slow (seconds) and may fail, but must be safe to
/// call repeatedly: the cache calls `compute` again whenever its entry is
/// stale or a refresh is forced.
///
/// `force_refresh = true` asks the remote side to bypass any cache of its own.
#[async_trait]
pub trait AggregateSource: Send + Sync + 'static {
    /// The aggregate payload.
    type Output: Send + Sync + 'static;

    /// Which aggregate this source produces.
    fn kind(&self) -> AggregateKind;

    /// Compute (or fetch) the aggregate.
    async fn compute(&self, force_refresh: bool) -> Result<Self::Output, FetchError>;
}

#[async_trait]
impl<S: AggregateSource> AggregateSource for Arc<S> {
    type Output = S::Output;

    fn kind(&self) -> AggregateKind {
        (**self).kind()
    }

    async fn compute(&self, force_refresh: bool) -> Result<Self::Output, FetchError> {
        (**self).compute(force_refresh).await
    }
}

/// Counters describing how a shared cache has been used.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// Reads served from a valid entry.
    pub hits: AtomicU64,
    /// Reads that found the entry absent, stale, or bypassed it.
    pub misses: AtomicU64,
    /// Reads that joined an already in-flight fetch.
    pub coalesced: AtomicU64,
    /// Calls made to the source.
    pub fetches: AtomicU64,
    /// Source calls that failed.
    pub failures: AtomicU64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`CacheMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub fetches: u64,
    pub failures: u64,
}

impl CacheStats {
    /// Hit rate as a percentage (0.0 - 100.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}
