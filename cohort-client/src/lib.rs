//! COHORT Client - Analytics client for the student-risk backend
//!
//! Screens read expensive aggregates through shared, time-bounded caches,
//! cheap lists reload on every prediction change, and mutations announce
//! themselves on an invalidation bus.

pub mod api_client;
pub mod config;
pub mod error;
pub mod mutations;
pub mod poller;
pub mod session;
pub mod sources;
pub mod views;

pub use api_client::{AnalyticsBackend, ApiClientError, ResetReport, RestClient, TrainReport};
pub use config::{AlertSettings, CacheSettings, ClientConfig, CONFIG_ENV_VAR};
pub use error::ClientError;
pub use mutations::{BatchDeleteReport, MutationService};
pub use poller::{AlertPoller, AlertState};
pub use session::AnalyticsSession;
pub use sources::{
    AggregatePayload, BackendSource, ClustersSource, DashboardSource, RankingsSource,
};
pub use views::{
    ClusterView, DashboardView, ListQuery, ListState, ListView, PredictionHistoryQuery,
};
