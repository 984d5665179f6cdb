//! Cohort Core - Entity Types
//!
//! Pure data structures shared by every other crate in the workspace:
//! aggregate payloads returned by the analytics backend, prediction records
//! shown in list views, cache policy configuration and the error taxonomy.
//! This crate contains no I/O and no async code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod aggregate;
mod config;
mod error;
mod prediction;

pub use aggregate::{
    ClusterCard, ClusterPoint, ClusterValidation, DashboardStats, RankedStudent, Rankings,
    RiskDistribution, StudentClusters,
};
pub use config::{CachePolicy, DEFAULT_PRECOMPUTE_DELAY, DEFAULT_VALIDITY_WINDOW};
pub use error::{CohortError, CohortResult, ConfigError, FetchError, ValidationError};
pub use prediction::{
    AlertList, AlertStudent, BatchProgress, BatchStatus, BatchUploadReceipt, PredictionPage,
    PredictionRecord, RiskLevel, StudentInput,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Wall-clock timestamp in UTC, used for records returned by the backend.
pub type Timestamp = DateTime<Utc>;

/// Identifier of a stored prediction row.
pub type PredictionId = String;

/// Identifier of a student, as entered by a teacher (alphanumeric, `-`, `_`).
pub type StudentId = String;

/// Identifier of an asynchronous batch upload job.
pub type BatchId = String;

// ============================================================================
// AGGREGATE KINDS
// ============================================================================

/// Discriminator for the expensive, derived aggregates the client caches.
///
/// Exactly one shared cache exists per kind for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateKind {
    /// t-SNE + KMeans behavioural clustering over the full dataset.
    StudentClusters,
    /// Composite-score ranking of every student's latest prediction.
    Rankings,
    /// Headline dashboard statistics.
    DashboardStats,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 3] = [
        AggregateKind::StudentClusters,
        AggregateKind::Rankings,
        AggregateKind::DashboardStats,
    ];

    /// Stable name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateKind::StudentClusters => "student_clusters",
            AggregateKind::Rankings => "rankings",
            AggregateKind::DashboardStats => "dashboard_stats",
        }
    }

    /// REST path serving this aggregate.
    pub fn endpoint(&self) -> &'static str {
        match self {
            AggregateKind::StudentClusters => "/api/student-clusters",
            AggregateKind::Rankings => "/api/rankings",
            AggregateKind::DashboardStats => "/api/dashboard",
        }
    }

    /// Whether the backend honours a `refresh` flag for this aggregate.
    pub fn supports_server_refresh(&self) -> bool {
        matches!(self, AggregateKind::StudentClusters)
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
