//! COHORT Test Utilities
//!
//! Centralized test infrastructure for the COHORT workspace:
//! - Scripted aggregate sources with call counters and release gates
//! - A spy sink recording every state write a consumer binding makes
//! - Test fixtures for common payloads
//! - Proptest generators for events and inputs

pub use cohort_cache::{
    AggregateSource, CacheConsumerBinding, ConsumerPhase, ConsumerSnapshot, SharedCache, StateSink,
};
pub use cohort_core::{
    AggregateKind, CachePolicy, ClusterCard, ClusterValidation, DashboardStats, FetchError,
    PredictionRecord, RankedStudent, Rankings, RiskDistribution, RiskLevel, StudentClusters,
    StudentInput,
};
pub use cohort_events::{InvalidationBus, InvalidationEvent, MutationKind};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

// ============================================================================
// MOCK SOURCES
// ============================================================================

/// Aggregate source returning queued outcomes in order.
///
/// When the queue runs dry the last outcome is repeated. A source built
/// with [`gated`](Self::gated) blocks every `compute` until
/// [`release`](Self::release) is called, which lets tests hold a fetch
/// in flight deterministically.
pub struct ScriptedSource<T> {
    kind: AggregateKind,
    outcomes: Mutex<VecDeque<Result<T, FetchError>>>,
    last: Mutex<Option<Result<T, FetchError>>>,
    latency: Duration,
    gate: Option<(watch::Sender<bool>, watch::Receiver<bool>)>,
    calls: AtomicUsize,
    forced_calls: AtomicUsize,
}

impl<T: Clone + Send + Sync + 'static> ScriptedSource<T> {
    pub fn new(kind: AggregateKind) -> Self {
        Self {
            kind,
            outcomes: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            latency: Duration::ZERO,
            gate: None,
            calls: AtomicUsize::new(0),
            forced_calls: AtomicUsize::new(0),
        }
    }

    /// A source that always succeeds with `value`.
    pub fn always(kind: AggregateKind, value: T) -> Self {
        Self::new(kind).then_ok(value)
    }

    /// A source whose computations wait for [`release`](Self::release).
    pub fn gated(kind: AggregateKind) -> Self {
        let mut source = Self::new(kind);
        source.gate = Some(watch::channel(false));
        source
    }

    /// Simulated remote latency (honours paused tokio time).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn then_ok(self, value: T) -> Self {
        self.push(Ok(value));
        self
    }

    pub fn then_err(self, error: FetchError) -> Self {
        self.push(Err(error));
        self
    }

    /// Queue another outcome on a shared source.
    pub fn push(&self, outcome: Result<T, FetchError>) {
        lock(&self.outcomes).push_back(outcome);
    }

    /// Let every pending and future computation proceed.
    pub fn release(&self) {
        if let Some((tx, _)) = &self.gate {
            tx.send_replace(true);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls made with `force_refresh = true`.
    pub fn forced_calls(&self) -> usize {
        self.forced_calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<T, FetchError> {
        let queued = lock(&self.outcomes).pop_front();
        let mut last = lock(&self.last);
        match queued {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(FetchError::Unavailable {
                    reason: "no scripted outcome".to_string(),
                })),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> AggregateSource for ScriptedSource<T> {
    type Output = T;

    fn kind(&self) -> AggregateKind {
        self.kind
    }

    async fn compute(&self, force_refresh: bool) -> Result<T, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if force_refresh {
            self.forced_calls.fetch_add(1, Ordering::SeqCst);
        }
        if let Some((_, rx)) = &self.gate {
            let mut rx = rx.clone();
            // The sender lives in `self`, so this cannot observe a closed channel.
            let _ = rx.wait_for(|open| *open).await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.next_outcome()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// SPY SINK
// ============================================================================

/// State sink that records every snapshot it receives.
///
/// Clones share the same log, so a test keeps one handle while the binding
/// owns the other.
pub struct SpySink<T> {
    writes: Arc<Mutex<Vec<ConsumerSnapshot<T>>>>,
}

impl<T> SpySink<T> {
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    pub fn last(&self) -> Option<ConsumerSnapshot<T>> {
        lock(&self.writes).last().cloned()
    }

    pub fn phases(&self) -> Vec<ConsumerPhase> {
        lock(&self.writes).iter().map(|s| s.phase).collect()
    }

    pub fn snapshots(&self) -> Vec<ConsumerSnapshot<T>> {
        lock(&self.writes).clone()
    }
}

impl<T> Default for SpySink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for SpySink<T> {
    fn clone(&self) -> Self {
        Self {
            writes: Arc::clone(&self.writes),
        }
    }
}

impl<T: Send + Sync + 'static> StateSink<T> for SpySink<T> {
    fn apply(&self, snapshot: &ConsumerSnapshot<T>) {
        lock(&self.writes).push(snapshot.clone());
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built payloads for common testing scenarios.

    use super::*;

    /// Clustering result with one card per label, interpreted as `label`.
    pub fn clusters_labelled(labels: &[&str]) -> StudentClusters {
        let clusters: Vec<ClusterCard> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| ClusterCard {
                cluster_id: i as u32,
                student_count: 10,
                avg_attendance: 80.0,
                avg_marks: 70.0,
                avg_assignments: 75.0,
                avg_study_hours: 3.0,
                interpretation: (*label).to_string(),
                insight: String::new(),
            })
            .collect();
        let k = clusters.len() as u32;
        StudentClusters {
            total_students: 10 * k,
            optimal_k: k,
            validation: ClusterValidation {
                k_values: vec![k],
                inertias: vec![1.0],
                silhouette_scores: vec![0.5],
                optimal_k: k,
                optimal_silhouette: 0.5,
                selection_method: "silhouette".to_string(),
            },
            clusters,
            points: Vec::new(),
        }
    }

    /// Labels of a clustering result, in card order.
    pub fn cluster_labels(clusters: &StudentClusters) -> Vec<String> {
        clusters
            .clusters
            .iter()
            .map(|c| c.interpretation.clone())
            .collect()
    }

    pub fn prediction_record(id: &str, risk_level: RiskLevel) -> PredictionRecord {
        PredictionRecord {
            id: id.to_string(),
            student_id: format!("S-{id}"),
            student_name: "Test Student".to_string(),
            risk_level,
            confidence: 0.9,
            timestamp: "2026-01-15T10:30:00".to_string(),
            batch_id: None,
            section: None,
        }
    }

    pub fn rankings(n: u32) -> Rankings {
        Rankings {
            total: n,
            rankings: (1..=n)
                .map(|rank| RankedStudent {
                    rank,
                    student_id: format!("S{rank:03}"),
                    student_name: format!("Student {}", char::from(b'A' + (rank % 26) as u8)),
                    risk_level: RiskLevel::Good,
                    confidence: 0.8,
                    composite_score: 100.0 - rank as f64,
                })
                .collect(),
        }
    }

    pub fn dashboard(good: u32, average: u32, at_risk: u32) -> DashboardStats {
        DashboardStats {
            total_students: good + average + at_risk,
            risk_distribution: RiskDistribution {
                good,
                average,
                at_risk,
            },
            average_attendance: 82.5,
            average_internal_marks: 68.0,
            average_assignment_score: 74.0,
            average_study_hours: 3.5,
            recent_predictions: Vec::new(),
        }
    }

    pub fn valid_student_input() -> StudentInput {
        StudentInput {
            student_id: "STU_001".to_string(),
            student_name: "Ada Lovelace".to_string(),
            attendance_percentage: 92.0,
            internal_marks: 81.0,
            assignment_score: 88.0,
            study_hours_per_day: 4.0,
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for COHORT types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_aggregate_kind() -> impl Strategy<Value = AggregateKind> {
        prop::sample::select(AggregateKind::ALL.to_vec())
    }

    pub fn arb_event() -> impl Strategy<Value = InvalidationEvent> {
        prop::sample::select(InvalidationEvent::ALL.to_vec())
    }

    pub fn arb_mutation_kind() -> impl Strategy<Value = MutationKind> {
        prop_oneof![
            Just(MutationKind::SingleCreate),
            Just(MutationKind::SingleDelete),
            Just(MutationKind::BatchDelete),
            Just(MutationKind::BatchUpload),
            Just(MutationKind::DemoReset),
            Just(MutationKind::Retrain),
        ]
    }

    pub fn arb_risk_level() -> impl Strategy<Value = RiskLevel> {
        prop_oneof![
            Just(RiskLevel::Good),
            Just(RiskLevel::Average),
            Just(RiskLevel::AtRisk),
        ]
    }

    /// Student input that passes validation.
    pub fn arb_valid_student_input() -> impl Strategy<Value = StudentInput> {
        (
            "[A-Za-z0-9_-]{1,20}",
            "[A-Za-z][A-Za-z ]{1,40}[A-Za-z]",
            0.0f64..=100.0,
            0.0f64..=100.0,
            0.0f64..=100.0,
            0.0f64..=12.0,
        )
            .prop_map(
                |(student_id, student_name, attendance, marks, assignments, hours)| StudentInput {
                    student_id,
                    student_name,
                    attendance_percentage: attendance,
                    internal_marks: marks,
                    assignment_score: assignments,
                    study_hours_per_day: hours,
                },
            )
    }

    /// Naive ISO-8601 timestamps as the backend formats them.
    pub fn arb_naive_timestamp() -> impl Strategy<Value = String> {
        (1_577_836_800i64..1_893_456_000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0)
                .unwrap_or_default()
                .naive_utc()
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string()
        })
    }

    pub fn arb_prediction_record() -> impl Strategy<Value = PredictionRecord> {
        ("[a-f0-9]{8}", arb_risk_level(), 0.0f64..=1.0, arb_naive_timestamp()).prop_map(
            |(id, risk_level, confidence, timestamp)| PredictionRecord {
                student_id: format!("S-{id}"),
                id,
                student_name: "Generated Student".to_string(),
                risk_level,
                confidence,
                timestamp,
                batch_id: None,
                section: None,
            },
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_scripted_source_repeats_last_outcome() {
        let source = ScriptedSource::new(AggregateKind::Rankings)
            .then_ok(1u32)
            .then_err(FetchError::Timeout);

        assert_eq!(source.compute(false).await, Ok(1));
        assert_eq!(source.compute(true).await, Err(FetchError::Timeout));
        assert_eq!(source.compute(false).await, Err(FetchError::Timeout));
        assert_eq!(source.calls(), 3);
        assert_eq!(source.forced_calls(), 1);
    }

    #[tokio::test]
    async fn test_gated_source_waits_for_release() {
        let source = Arc::new(ScriptedSource::gated(AggregateKind::Rankings).then_ok(7u32));
        let task = tokio::spawn({
            let source = Arc::clone(&source);
            async move { source.compute(false).await }
        });
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        source.release();
        assert_eq!(task.await.unwrap(), Ok(7));
    }

    #[test]
    fn test_spy_sink_shares_log() {
        let spy = SpySink::<u32>::new();
        let handle = spy.clone();
        spy.apply(&ConsumerSnapshot::idle());
        assert_eq!(handle.write_count(), 1);
        assert_eq!(handle.phases(), vec![ConsumerPhase::Idle]);
    }

    #[test]
    fn test_clusters_fixture_is_well_formed() {
        let clusters = clusters_labelled(&["A", "B", "C"]);
        assert_eq!(clusters.assigned_students(), clusters.total_students);
        assert_eq!(cluster_labels(&clusters), vec!["A", "B", "C"]);
    }

    proptest! {
        #[test]
        fn prop_generated_inputs_validate(input in arb_valid_student_input()) {
            prop_assert!(input.validate().is_ok());
        }

        #[test]
        fn prop_generated_timestamps_parse(record in arb_prediction_record()) {
            prop_assert!(record.recorded_at().is_some());
        }
    }
}
