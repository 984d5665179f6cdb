//! REST client for the analytics backend.
//!
//! [`AnalyticsBackend`] is the seam the rest of the client talks to;
//! [`RestClient`] implements it over reqwest. Tests substitute an in-memory
//! backend.

use crate::config::ClientConfig;
use async_trait::async_trait;
use cohort_core::{
    AggregateKind, AlertList, BatchProgress, BatchUploadReceipt, FetchError, PredictionPage,
    PredictionRecord, StudentInput, ValidationError,
};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Config error: {0}")]
    Config(String),
}

impl ApiClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<ApiClientError> for FetchError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::Status {
                status: 503,
                message,
            } => FetchError::Unavailable { reason: message },
            ApiClientError::Status { status, message } => FetchError::Remote { status, message },
            ApiClientError::Http(err) if err.is_timeout() => FetchError::Timeout,
            ApiClientError::Http(err) if err.is_decode() => FetchError::Decode {
                reason: err.to_string(),
            },
            ApiClientError::Http(err) => match err.status() {
                Some(status) => FetchError::Remote {
                    status: status.as_u16(),
                    message: err.to_string(),
                },
                None => FetchError::Transport {
                    reason: err.to_string(),
                },
            },
            ApiClientError::Serde(err) => FetchError::Decode {
                reason: err.to_string(),
            },
            // Rejected before sending; reported the way the server rejects input.
            ApiClientError::Validation(err) => FetchError::Remote {
                status: 422,
                message: err.to_string(),
            },
            ApiClientError::Config(reason) => FetchError::Transport { reason },
        }
    }
}

/// Response of `POST /api/train`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainReport {
    pub message: String,
    pub accuracy: f64,
    pub dataset_rows: u32,
}

/// Response of `POST /api/demo/reset`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResetReport {
    pub message: String,
    pub students_seeded: u32,
}

/// Operations the client performs against the backend.
#[async_trait]
pub trait AnalyticsBackend: Send + Sync + 'static {
    /// Raw JSON of an aggregate. `refresh` asks the server to recompute.
    async fn fetch_aggregate(
        &self,
        kind: AggregateKind,
        refresh: bool,
    ) -> Result<serde_json::Value, ApiClientError>;

    async fn list_predictions(&self, page: u32, limit: u32)
        -> Result<PredictionPage, ApiClientError>;

    async fn predict(&self, input: &StudentInput) -> Result<PredictionRecord, ApiClientError>;

    async fn delete_prediction(&self, id: &str) -> Result<(), ApiClientError>;

    async fn upload_batch(
        &self,
        filename: &str,
        csv: Vec<u8>,
    ) -> Result<BatchUploadReceipt, ApiClientError>;

    async fn batch_progress(&self, batch_id: &str) -> Result<BatchProgress, ApiClientError>;

    async fn reset_demo(&self) -> Result<ResetReport, ApiClientError>;

    async fn train(&self) -> Result<TrainReport, ApiClientError>;

    async fn alerts(&self, min_consecutive: u32) -> Result<AlertList, ApiClientError>;
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T, Q>(&self, path: &str, query: Option<&Q>) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
        Q: serde::Serialize + ?Sized,
    {
        let mut request = self.client.get(self.url(path));
        if let Some(query) = query {
            request = request.query(query);
        }
        debug!(path, "GET");
        let response = request.send().await?;
        parse_response(response).await
    }

    async fn post_json<T, B>(&self, path: &str, body: Option<&B>) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize + ?Sized,
    {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        debug!(path, "POST");
        let response = request.send().await?;
        parse_response(response).await
    }
}

#[async_trait]
impl AnalyticsBackend for RestClient {
    async fn fetch_aggregate(
        &self,
        kind: AggregateKind,
        refresh: bool,
    ) -> Result<serde_json::Value, ApiClientError> {
        if kind.supports_server_refresh() {
            let query = [("refresh", refresh)];
            self.get_json(kind.endpoint(), Some(&query)).await
        } else {
            self.get_json::<_, ()>(kind.endpoint(), None).await
        }
    }

    async fn list_predictions(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<PredictionPage, ApiClientError> {
        let query = [("page", page), ("limit", limit)];
        self.get_json("/api/predictions", Some(&query)).await
    }

    async fn predict(&self, input: &StudentInput) -> Result<PredictionRecord, ApiClientError> {
        self.post_json("/api/predict", Some(input)).await
    }

    async fn delete_prediction(&self, id: &str) -> Result<(), ApiClientError> {
        let path = format!("/api/predictions/{id}");
        debug!(path = %path, "DELETE");
        let response = self.client.delete(self.url(&path)).send().await?;
        parse_response::<serde_json::Value>(response).await?;
        Ok(())
    }

    async fn upload_batch(
        &self,
        filename: &str,
        csv: Vec<u8>,
    ) -> Result<BatchUploadReceipt, ApiClientError> {
        let part = Part::bytes(csv)
            .file_name(filename.to_string())
            .mime_str("text/csv")?;
        let form = Form::new().part("file", part);
        debug!(filename, "POST /api/batch-upload");
        let response = self
            .client
            .post(self.url("/api/batch-upload"))
            .multipart(form)
            .send()
            .await?;
        parse_response(response).await
    }

    async fn batch_progress(&self, batch_id: &str) -> Result<BatchProgress, ApiClientError> {
        let path = format!("/api/batch/{batch_id}/progress");
        self.get_json::<_, ()>(&path, None).await
    }

    async fn reset_demo(&self) -> Result<ResetReport, ApiClientError> {
        self.post_json::<_, ()>("/api/demo/reset", None).await
    }

    async fn train(&self) -> Result<TrainReport, ApiClientError> {
        self.post_json::<_, ()>("/api/train", None).await
    }

    async fn alerts(&self, min_consecutive: u32) -> Result<AlertList, ApiClientError> {
        let query = [("min_consecutive", min_consecutive)];
        self.get_json("/api/alerts", Some(&query)).await
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiClientError> {
    let status = response.status();
    if status.is_success() {
        Ok(response.json::<T>().await?)
    } else {
        let text = response.text().await?;
        Err(ApiClientError::Status {
            status: status.as_u16(),
            message: error_detail(&text),
        })
    }
}

/// Extract `detail` from an error body, falling back to the raw text.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => match map.get("detail") {
            Some(serde_json::Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_extraction() {
        assert_eq!(error_detail(r#"{"detail":"Prediction not found"}"#), "Prediction not found");
        assert_eq!(error_detail(r#"{"detail":[{"loc":["x"]}]}"#), r#"[{"loc":["x"]}]"#);
        assert_eq!(error_detail("Internal Server Error"), "Internal Server Error");
    }

    #[test]
    fn test_status_503_maps_to_unavailable() {
        let err = ApiClientError::Status {
            status: 503,
            message: "Dataset not available".to_string(),
        };
        assert_eq!(
            FetchError::from(err),
            FetchError::Unavailable {
                reason: "Dataset not available".to_string()
            }
        );
    }

    #[test]
    fn test_other_status_maps_to_remote() {
        let err = ApiClientError::Status {
            status: 500,
            message: "Clustering error".to_string(),
        };
        let fetch = FetchError::from(err);
        assert!(matches!(fetch, FetchError::Remote { status: 500, .. }));
        assert!(fetch.is_transient());
    }

    #[test]
    fn test_validation_error_maps_to_unprocessable() {
        let err = ApiClientError::from(ValidationError::RequiredFieldMissing {
            field: "student_id".to_string(),
        });
        let fetch = FetchError::from(err);
        assert!(matches!(fetch, FetchError::Remote { status: 422, .. }));
        assert!(!fetch.is_transient());
    }

    #[test]
    fn test_serde_error_maps_to_decode() {
        let err = serde_json::from_str::<PredictionPage>("{").unwrap_err();
        assert!(matches!(
            FetchError::from(ApiClientError::from(err)),
            FetchError::Decode { .. }
        ));
    }
}
