//! Shared aggregate cache.
//!
//! Staleness is explicit: an entry is valid for a fixed window after it was
//! fetched, and reads through [`SharedCache::read`] report whether the value
//! came from the entry, from a fetch the caller started, or from a fetch it
//! joined.
//!
//! # Example
//!
//! ```ignore
//! // `ClustersSource` lives in cohort-client and reads `/api/student-clusters`
//! let clusters = SharedCache::new(ClustersSource::new(backend), CachePolicy::default());
//!
//! // Served from the entry while it is younger than the validity window
//! let value = clusters.get(false).await?;
//!
//! // Always goes to the source (joining any fetch already in flight)
//! let value = clusters.get(true).await?;
//!
//! // Render whatever is there, stale or not, without fetching
//! if let Some(stale) = clusters.peek() {
//!     render(&stale);
//! }
//! ```

pub mod entry;
pub mod shared;
pub mod source;

pub use entry::{CacheEntry, CacheRead, ReadSource};
pub use shared::SharedCache;
pub use source::{AggregateSource, CacheMetrics, CacheStats};
