//! COHORT Cache - Shared aggregate cache for the analytics client
//!
//! Expensive server-side aggregates (student clustering, rankings, dashboard
//! statistics) are fetched through a [`SharedCache`] that every consumer in
//! the process shares. On top of it:
//!
//! - [`PrecomputeScheduler`] warms a cache in the background after a delay.
//! - [`CacheConsumerBinding`] adapts a cache to one view's mount/unmount
//!   lifecycle and never writes to a view after it has detached.
//! - [`InvalidationPolicy`] wires invalidation events to the caches they
//!   make stale.

pub mod binding;
pub mod cache;
pub mod policy;
pub mod precompute;

pub use binding::{CacheConsumerBinding, ConsumerPhase, ConsumerSnapshot, StateSink};
pub use cache::{
    AggregateSource, CacheEntry, CacheMetrics, CacheRead, CacheStats, ReadSource, SharedCache,
};
pub use policy::InvalidationPolicy;
pub use precompute::PrecomputeScheduler;
