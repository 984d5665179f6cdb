//! In-memory analytics backend for client tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cohort_client::{AnalyticsBackend, ApiClientError, ResetReport, TrainReport};
use cohort_core::{
    AggregateKind, AlertList, BatchProgress, BatchStatus, BatchUploadReceipt, PredictionPage,
    PredictionRecord, RiskLevel, StudentInput,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
struct BackendState {
    predictions: Vec<PredictionRecord>,
    aggregates: HashMap<AggregateKind, serde_json::Value>,
    failures: HashMap<&'static str, (u16, String)>,
    batch_progress: VecDeque<BatchProgress>,
    alerts: AlertList,
    calls: HashMap<&'static str, usize>,
    next_id: u32,
}

#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_aggregate<T: serde::Serialize>(self, kind: AggregateKind, value: &T) -> Self {
        self.set_aggregate(kind, value);
        self
    }

    pub fn set_aggregate<T: serde::Serialize>(&self, kind: AggregateKind, value: &T) {
        let json = serde_json::to_value(value).expect("fixture serializes");
        self.lock().aggregates.insert(kind, json);
    }

    pub fn with_prediction(self, record: PredictionRecord) -> Self {
        self.lock().predictions.push(record);
        self
    }

    /// Make every call to `op` fail with `status`.
    pub fn fail(&self, op: &'static str, status: u16, message: &str) {
        self.lock().failures.insert(op, (status, message.to_string()));
    }

    pub fn script_batch(&self, steps: Vec<BatchProgress>) {
        self.lock().batch_progress = steps.into();
    }

    pub fn set_alerts(&self, alerts: AlertList) {
        self.lock().alerts = alerts;
    }

    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn prediction_count(&self) -> usize {
        self.lock().predictions.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    fn enter(
        &self,
        op: &'static str,
    ) -> Result<std::sync::MutexGuard<'_, BackendState>, ApiClientError> {
        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;
        if let Some((status, message)) = state.failures.get(op).cloned() {
            return Err(ApiClientError::Status { status, message });
        }
        Ok(state)
    }
}

pub fn progress(processed: u32, total: u32, status: BatchStatus) -> BatchProgress {
    BatchProgress {
        batch_id: "batch-1".to_string(),
        total,
        processed,
        failed: 0,
        status,
    }
}

#[async_trait]
impl AnalyticsBackend for InMemoryBackend {
    async fn fetch_aggregate(
        &self,
        kind: AggregateKind,
        _refresh: bool,
    ) -> Result<serde_json::Value, ApiClientError> {
        let state = self.enter(kind.as_str())?;
        state
            .aggregates
            .get(&kind)
            .cloned()
            .ok_or_else(|| ApiClientError::Status {
                status: 503,
                message: "Dataset not available. Please train the model first".to_string(),
            })
    }

    async fn list_predictions(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<PredictionPage, ApiClientError> {
        let state = self.enter("list_predictions")?;
        let start = ((page.max(1) - 1) * limit) as usize;
        let items = state
            .predictions
            .iter()
            .rev()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(PredictionPage {
            items,
            total: state.predictions.len() as u32,
        })
    }

    async fn predict(&self, input: &StudentInput) -> Result<PredictionRecord, ApiClientError> {
        let mut state = self.enter("predict")?;
        state.next_id += 1;
        let record = PredictionRecord {
            id: format!("pred-{}", state.next_id),
            student_id: input.student_id.clone(),
            student_name: input.student_name.clone(),
            risk_level: RiskLevel::Average,
            confidence: 0.75,
            timestamp: "2026-03-01T09:00:00".to_string(),
            batch_id: None,
            section: None,
        };
        state.predictions.push(record.clone());
        Ok(record)
    }

    async fn delete_prediction(&self, id: &str) -> Result<(), ApiClientError> {
        let mut state = self.enter("delete_prediction")?;
        let before = state.predictions.len();
        state.predictions.retain(|p| p.id != id);
        if state.predictions.len() == before {
            return Err(ApiClientError::Status {
                status: 404,
                message: "Prediction not found".to_string(),
            });
        }
        Ok(())
    }

    async fn upload_batch(
        &self,
        filename: &str,
        csv: Vec<u8>,
    ) -> Result<BatchUploadReceipt, ApiClientError> {
        let _state = self.enter("upload_batch")?;
        let rows = String::from_utf8_lossy(&csv).lines().count().saturating_sub(1);
        Ok(BatchUploadReceipt {
            batch_id: "batch-1".to_string(),
            filename: filename.to_string(),
            total: rows as u32,
            status: BatchStatus::Processing,
        })
    }

    async fn batch_progress(&self, _batch_id: &str) -> Result<BatchProgress, ApiClientError> {
        let mut state = self.enter("batch_progress")?;
        let step = if state.batch_progress.len() > 1 {
            state.batch_progress.pop_front()
        } else {
            state.batch_progress.front().cloned()
        };
        step.ok_or_else(|| ApiClientError::Status {
            status: 404,
            message: "Batch job not found".to_string(),
        })
    }

    async fn reset_demo(&self) -> Result<ResetReport, ApiClientError> {
        let mut state = self.enter("reset_demo")?;
        state.predictions.clear();
        Ok(ResetReport {
            message: "Demo data reset successfully".to_string(),
            students_seeded: 25,
        })
    }

    async fn train(&self) -> Result<TrainReport, ApiClientError> {
        let _state = self.enter("train")?;
        Ok(TrainReport {
            message: "Model trained successfully".to_string(),
            accuracy: 0.91,
            dataset_rows: 1000,
        })
    }

    async fn alerts(&self, _min_consecutive: u32) -> Result<AlertList, ApiClientError> {
        let state = self.enter("alerts")?;
        Ok(state.alerts.clone())
    }
}
