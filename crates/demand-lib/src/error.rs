//! Error taxonomy for the forecasting pipeline

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the forecasting core
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Request parameters rejected before any forecasting work starts
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// `start` could not be resolved to a UTC instant
    #[error("invalid timestamp {value:?}: expected ISO-8601")]
    InvalidTimestamp { value: String },

    /// The opaque model call failed; never retried
    #[error("predictor failed: {0:#}")]
    Predictor(anyhow::Error),

    /// Metadata, dataset or model file missing or malformed
    #[error("failed to load {}: {reason}", path.display())]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ForecastError {
    /// True for errors caused by the caller's request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ForecastError::InvalidInput(_) | ForecastError::InvalidTimestamp { .. }
        )
    }

    /// Stable machine-readable code for API error bodies
    pub fn code(&self) -> &'static str {
        match self {
            ForecastError::InvalidInput(_) => "invalid_input",
            ForecastError::InvalidTimestamp { .. } => "invalid_timestamp",
            ForecastError::Predictor(_) => "predictor_failure",
            ForecastError::ConfigLoad { .. } => "config_load_failure",
            ForecastError::Serialization(_) => "serialization_failure",
        }
    }
}

pub type ForecastResult<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(ForecastError::InvalidInput("horizon".into()).is_client_error());
        assert!(ForecastError::InvalidTimestamp { value: "x".into() }.is_client_error());
        assert!(!ForecastError::Predictor(anyhow::anyhow!("boom")).is_client_error());
    }

    #[test]
    fn test_predictor_error_message_includes_cause() {
        let err = ForecastError::Predictor(anyhow::anyhow!("tensor shape mismatch"));
        assert!(err.to_string().contains("tensor shape mismatch"));
        assert_eq!(err.code(), "predictor_failure");
    }
}
