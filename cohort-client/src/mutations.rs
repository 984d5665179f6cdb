//! Data-changing operations and their invalidation announcements.
//!
//! Every successful operation publishes exactly one event on the bus, batch
//! operations included. A failed operation publishes nothing.

use crate::api_client::{AnalyticsBackend, ApiClientError, ResetReport, TrainReport};
use cohort_core::{BatchProgress, BatchStatus, BatchUploadReceipt, PredictionRecord, StudentInput};
use cohort_events::{InvalidationBus, MutationKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Outcome of deleting several predictions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteReport {
    pub deleted: Vec<String>,
    /// `(id, error message)` for every row that could not be deleted.
    pub failed: Vec<(String, String)>,
}

impl BatchDeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct MutationService {
    backend: Arc<dyn AnalyticsBackend>,
    bus: InvalidationBus,
}

impl MutationService {
    pub fn new(backend: Arc<dyn AnalyticsBackend>, bus: InvalidationBus) -> Self {
        Self { backend, bus }
    }

    fn announce(&self, mutation: MutationKind) {
        let event = mutation.event();
        let delivered = self.bus.publish(event);
        info!(?mutation, event = %event, delivered, "Mutation announced");
    }

    /// Validate locally, then create one prediction.
    pub async fn create_prediction(
        &self,
        input: &StudentInput,
    ) -> Result<PredictionRecord, ApiClientError> {
        input.validate()?;
        let record = self.backend.predict(input).await?;
        self.announce(MutationKind::SingleCreate);
        Ok(record)
    }

    pub async fn delete_prediction(&self, id: &str) -> Result<(), ApiClientError> {
        self.backend.delete_prediction(id).await?;
        self.announce(MutationKind::SingleDelete);
        Ok(())
    }

    /// Delete rows one by one. Announces once if anything was deleted.
    pub async fn delete_predictions(&self, ids: &[String]) -> BatchDeleteReport {
        let mut report = BatchDeleteReport::default();
        for id in ids {
            match self.backend.delete_prediction(id).await {
                Ok(()) => report.deleted.push(id.clone()),
                Err(err) => {
                    warn!(id = %id, error = %err, "Failed to delete prediction");
                    report.failed.push((id.clone(), err.to_string()));
                }
            }
        }
        if !report.deleted.is_empty() {
            self.announce(MutationKind::BatchDelete);
        }
        report
    }

    /// Submit a CSV for background processing.
    ///
    /// Nothing is announced yet: rows only exist once the job has run. See
    /// [`wait_for_batch`](Self::wait_for_batch).
    pub async fn upload_batch(
        &self,
        filename: &str,
        csv: Vec<u8>,
    ) -> Result<BatchUploadReceipt, ApiClientError> {
        let receipt = self.backend.upload_batch(filename, csv).await?;
        info!(batch_id = %receipt.batch_id, total = receipt.total, "Batch accepted");
        Ok(receipt)
    }

    /// Poll a batch until it finishes. Announces once when it completed.
    pub async fn wait_for_batch(
        &self,
        batch_id: &str,
        poll_interval: Duration,
    ) -> Result<BatchProgress, ApiClientError> {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let progress = self.backend.batch_progress(batch_id).await?;
            if !progress.is_finished() {
                continue;
            }
            if progress.status == BatchStatus::Done {
                self.announce(MutationKind::BatchUpload);
            } else {
                warn!(batch_id, failed = progress.failed, "Batch job failed");
            }
            return Ok(progress);
        }
    }

    pub async fn reset_demo(&self) -> Result<ResetReport, ApiClientError> {
        let report = self.backend.reset_demo().await?;
        self.announce(MutationKind::DemoReset);
        Ok(report)
    }

    /// Retrain the model. Invalidates the clustering aggregate.
    pub async fn retrain(&self) -> Result<TrainReport, ApiClientError> {
        let report = self.backend.train().await?;
        self.announce(MutationKind::Retrain);
        Ok(report)
    }
}
