//! Error types for the client.

use crate::api_client::ApiClientError;
use cohort_core::{ConfigError, FetchError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("View failed to load: {0}")]
    View(String),
}
