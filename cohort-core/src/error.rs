//! Error types for Cohort operations

use crate::AggregateKind;
use thiserror::Error;

/// Failure of a remote aggregate computation.
///
/// `Clone` because a single coalesced fetch surfaces the same error to every
/// caller awaiting it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Remote returned status {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Aggregate unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Failed to decode response: {reason}")]
    Decode { reason: String },

    #[error("Fetch for {kind} aborted before completion")]
    Aborted { kind: AggregateKind },
}

impl FetchError {
    /// Whether a manual retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Transport { .. } | FetchError::Aborted { .. } => true,
            FetchError::Remote { status, .. } => *status >= 500,
            FetchError::Unavailable { .. } | FetchError::Decode { .. } => false,
        }
    }
}

/// Validation errors for client-side input checks.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Value {value} for {field} is outside 0..={max}")]
    OutOfRange { field: String, value: f64, max: f64 },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or COHORT_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file: {reason}")]
    Io { reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for all Cohort errors.
#[derive(Debug, Clone, Error)]
pub enum CohortError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Cohort operations.
pub type CohortResult<T> = Result<T, CohortError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_display_remote() {
        let err = FetchError::Remote {
            status: 500,
            message: "Clustering error".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("500"));
        assert!(msg.contains("Clustering error"));
    }

    #[test]
    fn test_fetch_error_display_aborted_names_kind() {
        let err = FetchError::Aborted {
            kind: AggregateKind::StudentClusters,
        };
        assert!(err.to_string().contains("student_clusters"));
    }

    #[test]
    fn test_fetch_error_transience() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Remote {
            status: 502,
            message: String::new()
        }
        .is_transient());
        assert!(!FetchError::Remote {
            status: 404,
            message: String::new()
        }
        .is_transient());
        assert!(!FetchError::Unavailable {
            reason: "train first".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "api_base_url".to_string(),
            reason: "must not be empty".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("api_base_url"));
        assert!(msg.contains("must not be empty"));
    }

    #[test]
    fn test_cohort_error_from_variants() {
        let fetch = CohortError::from(FetchError::Timeout);
        assert!(matches!(fetch, CohortError::Fetch(_)));

        let validation = CohortError::from(ValidationError::RequiredFieldMissing {
            field: "student_id".to_string(),
        });
        assert!(matches!(validation, CohortError::Validation(_)));

        let config = CohortError::from(ConfigError::MissingConfigPath);
        assert!(matches!(config, CohortError::Config(_)));
    }
}
