//! Cohort Events - Invalidation Bus
//!
//! This crate decouples the parts of the client that change data
//! (create/delete prediction, batch upload, demo reset, retrain) from the
//! parts that display derived data.
//!
//! # Architecture
//!
//! ```text
//! MutationService ──publish(predictionCreated)──▶ InvalidationBus
//!                                                   │
//!                       ┌───────────────────────────┼──────────────────────┐
//!                       ▼                           ▼                      ▼
//!              prediction history          dashboard recent list    teacher table
//!              (reload immediately)        (reload immediately)     (reload immediately)
//! ```
//!
//! The clustering aggregate deliberately does NOT listen to prediction
//! events: recomputing it on every write would cause a recompute storm. It
//! refreshes on explicit user action, TTL expiry, or `modelTrained`.
//!
//! # Key Types
//!
//! - [`InvalidationEvent`]: named change token
//! - [`MutationKind`]: producer-side operation, mapped to exactly one event
//! - [`InvalidationBus`]: synchronous fan-out to registered handlers
//! - [`Subscription`]: RAII registration handle

mod bus;
mod event;

pub use bus::{InvalidationBus, Subscription, DEFAULT_STREAM_CAPACITY};
pub use event::{InvalidationEvent, MutationKind, UnknownEventError};
