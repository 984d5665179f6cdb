//! Aggregate payloads.
//!
//! These are the immutable values held by the shared caches. Once fetched
//! they are wrapped in an `Arc` and never mutated in place; a refresh
//! replaces the whole value.

use serde::{Deserialize, Serialize};

use crate::prediction::{PredictionRecord, RiskLevel};

// ============================================================================
// STUDENT CLUSTERS
// ============================================================================

/// Result of the behavioural clustering analysis (t-SNE projection + KMeans).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentClusters {
    pub total_students: u32,
    pub optimal_k: u32,
    pub validation: ClusterValidation,
    pub clusters: Vec<ClusterCard>,
    #[serde(default)]
    pub points: Vec<ClusterPoint>,
}

impl StudentClusters {
    /// Find a cluster summary card by id.
    pub fn cluster(&self, cluster_id: u32) -> Option<&ClusterCard> {
        self.clusters.iter().find(|c| c.cluster_id == cluster_id)
    }

    /// Scatter points belonging to one cluster.
    pub fn points_in(&self, cluster_id: u32) -> impl Iterator<Item = &ClusterPoint> {
        self.points.iter().filter(move |p| p.cluster == cluster_id)
    }

    /// Sum of `student_count` across cards. Equals `total_students` for a
    /// well-formed result.
    pub fn assigned_students(&self) -> u32 {
        self.clusters.iter().map(|c| c.student_count).sum()
    }
}

/// Elbow and silhouette metrics used to pick `optimal_k`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterValidation {
    pub k_values: Vec<u32>,
    pub inertias: Vec<f64>,
    pub silhouette_scores: Vec<f64>,
    pub optimal_k: u32,
    pub optimal_silhouette: f64,
    pub selection_method: String,
}

/// Summary card for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterCard {
    pub cluster_id: u32,
    pub student_count: u32,
    pub avg_attendance: f64,
    pub avg_marks: f64,
    pub avg_assignments: f64,
    pub avg_study_hours: f64,
    pub interpretation: String,
    #[serde(default)]
    pub insight: String,
}

/// One projected student in the 2-D scatter plot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub x: f64,
    pub y: f64,
    pub cluster: u32,
}

// ============================================================================
// RANKINGS
// ============================================================================

/// Every student's latest prediction ranked by composite score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rankings {
    pub total: u32,
    pub rankings: Vec<RankedStudent>,
}

impl Rankings {
    pub fn top(&self, n: usize) -> &[RankedStudent] {
        &self.rankings[..n.min(self.rankings.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedStudent {
    pub rank: u32,
    pub student_id: String,
    pub student_name: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub composite_score: f64,
}

// ============================================================================
// DASHBOARD
// ============================================================================

/// Headline statistics for the teacher dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_students: u32,
    pub risk_distribution: RiskDistribution,
    pub average_attendance: f64,
    pub average_internal_marks: f64,
    pub average_assignment_score: f64,
    pub average_study_hours: f64,
    #[serde(default)]
    pub recent_predictions: Vec<PredictionRecord>,
}

/// Count of predictions per risk level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    #[serde(rename = "Good", default)]
    pub good: u32,
    #[serde(rename = "Average", default)]
    pub average: u32,
    #[serde(rename = "At Risk", default)]
    pub at_risk: u32,
}

impl RiskDistribution {
    pub fn total(&self) -> u32 {
        self.good + self.average + self.at_risk
    }

    pub fn count(&self, level: RiskLevel) -> u32 {
        match level {
            RiskLevel::Good => self.good,
            RiskLevel::Average => self.average,
            RiskLevel::AtRisk => self.at_risk,
        }
    }
}
