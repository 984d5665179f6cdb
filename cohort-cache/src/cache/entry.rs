//! Cache entry and read metadata.
//!
//! A [`CacheEntry`] holds at most one value together with the monotonic
//! instant it was fetched. The two are stored as a single unit so a value
//! without a timestamp cannot be represented.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
struct Stored<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

impl<T> Clone for Stored<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
        }
    }
}

/// The single cached value for one aggregate kind.
///
/// Created empty, populated by the first successful fetch and replaced
/// wholesale by every later one. Staleness is evaluated at read time; an
/// entry is never evicted.
#[derive(Debug)]
pub struct CacheEntry<T> {
    stored: Option<Stored<T>>,
    /// Set by an explicit invalidation; cleared by the next replacement.
    marked_stale: bool,
}

impl<T> CacheEntry<T> {
    /// An entry with no value.
    pub fn empty() -> Self {
        Self {
            stored: None,
            marked_stale: false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_none()
    }

    /// The cached value, valid or not.
    pub fn value(&self) -> Option<&Arc<T>> {
        self.stored.as_ref().map(|s| &s.value)
    }

    /// When the current value was fetched. `Some` exactly when a value exists.
    pub fn fetched_at(&self) -> Option<Instant> {
        self.stored.as_ref().map(|s| s.fetched_at)
    }

    /// Time elapsed since the value was fetched.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.fetched_at()
            .map(|fetched_at| now.saturating_duration_since(fetched_at))
    }

    pub fn is_marked_stale(&self) -> bool {
        self.marked_stale
    }

    /// `true` when a value exists, has not been marked stale, and is younger
    /// than `window` at `now`.
    pub fn is_valid(&self, now: Instant, window: Duration) -> bool {
        match &self.stored {
            Some(stored) if !self.marked_stale => {
                now.saturating_duration_since(stored.fetched_at) < window
            }
            _ => false,
        }
    }

    /// Replace value and timestamp together.
    pub fn replace(&mut self, value: Arc<T>, fetched_at: Instant) {
        self.stored = Some(Stored { value, fetched_at });
        self.marked_stale = false;
    }

    /// Force the next read to refetch while keeping the value readable.
    /// Returns `false` when there was nothing to mark.
    pub fn mark_stale(&mut self) -> bool {
        if self.stored.is_none() {
            return false;
        }
        self.marked_stale = true;
        true
    }
}

impl<T> Default for CacheEntry<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            stored: self.stored.clone(),
            marked_stale: self.marked_stale,
        }
    }
}

/// Where a successful read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSource {
    /// Served from a valid entry without touching the source.
    Cache,
    /// This caller started the fetch that produced the value.
    Fetched,
    /// This caller joined a fetch someone else had already started.
    Coalesced,
}

/// Result of a cache read, carrying provenance metadata.
#[derive(Debug)]
pub struct CacheRead<T> {
    value: Arc<T>,
    source: ReadSource,
}

impl<T> CacheRead<T> {
    pub fn new(value: Arc<T>, source: ReadSource) -> Self {
        Self { value, source }
    }

    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub fn into_value(self) -> Arc<T> {
        self.value
    }

    pub fn source(&self) -> ReadSource {
        self.source
    }

    pub fn was_cache_hit(&self) -> bool {
        self.source == ReadSource::Cache
    }
}

impl<T> Clone for CacheRead<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_secs(300);

    #[test]
    fn test_empty_entry_is_invalid() {
        let entry: CacheEntry<u32> = CacheEntry::empty();
        assert!(entry.is_empty());
        assert!(entry.fetched_at().is_none());
        assert!(!entry.is_valid(Instant::now(), WINDOW));
    }

    #[test]
    fn test_value_and_timestamp_set_together() {
        let mut entry = CacheEntry::empty();
        let t0 = Instant::now();
        entry.replace(Arc::new("clusters"), t0);
        assert_eq!(**entry.value().unwrap(), "clusters");
        assert_eq!(entry.fetched_at(), Some(t0));
    }

    #[test]
    fn test_window_boundary_is_exclusive() {
        let mut entry = CacheEntry::empty();
        let t0 = Instant::now();
        entry.replace(Arc::new(1u8), t0);
        assert!(entry.is_valid(t0 + WINDOW - Duration::from_millis(1), WINDOW));
        assert!(!entry.is_valid(t0 + WINDOW, WINDOW));
    }

    #[test]
    fn test_mark_stale_keeps_value_and_replace_clears_flag() {
        let mut entry = CacheEntry::empty();
        assert!(!entry.mark_stale());

        let t0 = Instant::now();
        entry.replace(Arc::new(7u32), t0);
        assert!(entry.mark_stale());
        assert!(!entry.is_valid(t0, WINDOW));
        assert_eq!(**entry.value().unwrap(), 7);

        entry.replace(Arc::new(8u32), t0);
        assert!(!entry.is_marked_stale());
        assert!(entry.is_valid(t0, WINDOW));
    }

    #[test]
    fn test_age_saturates_for_earlier_now() {
        let mut entry = CacheEntry::empty();
        let t0 = Instant::now() + Duration::from_secs(10);
        entry.replace(Arc::new(()), t0);
        assert_eq!(entry.age(Instant::now()), Some(Duration::ZERO));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// is_valid == value present && elapsed < window
        #[test]
        fn prop_validity_matches_definition(
            window_ms in 1u64..1_000_000,
            elapsed_ms in 0u64..2_000_000,
            populated in any::<bool>(),
        ) {
            let window = Duration::from_millis(window_ms);
            let t0 = Instant::now();
            let mut entry = CacheEntry::empty();
            if populated {
                entry.replace(Arc::new(0u8), t0);
            }
            let now = t0 + Duration::from_millis(elapsed_ms);
            prop_assert_eq!(entry.is_valid(now, window), populated && elapsed_ms < window_ms);
            prop_assert_eq!(entry.value().is_some(), entry.fetched_at().is_some());
        }
    }
}
