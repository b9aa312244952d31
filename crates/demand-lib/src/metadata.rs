//! Model metadata bundle
//!
//! The metadata JSON shipped next to the model declares the feature column
//! order and the residual quantiles used for the uncertainty band. It is read
//! once at startup; a missing or malformed file falls back to defaults.

use crate::error::{ForecastError, ForecastResult};
use crate::predictor::{FeatureSchema, IntervalEstimator, Q05_FALLBACK, Q95_FALLBACK};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Model family reported when the metadata does not name one
pub const DEFAULT_MODEL_TYPE: &str = "XGBRegressor";

/// On-disk layout of the metadata file
#[derive(Debug, Deserialize)]
struct MetadataFile {
    feature_columns: Option<Vec<String>>,
    q05: Option<f64>,
    q95: Option<f64>,
    created_at_utc: Option<String>,
    model_type: Option<String>,
    model_sha256: Option<String>,
}

/// Immutable, process-wide model description
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub feature_schema: FeatureSchema,
    pub q05: f64,
    pub q95: f64,
    pub model_descriptor: String,
    pub created_at: Option<String>,
    /// Expected hex SHA-256 of the model file, if declared
    pub model_sha256: Option<String>,
}

/// Where the active metadata came from
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataSource {
    File(PathBuf),
    Fallback { reason: String },
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            feature_schema: FeatureSchema::default(),
            q05: Q05_FALLBACK,
            q95: Q95_FALLBACK,
            model_descriptor: DEFAULT_MODEL_TYPE.to_string(),
            created_at: None,
            model_sha256: None,
        }
    }
}

impl ModelMetadata {
    /// Parse metadata JSON; absent keys take their defaults
    pub fn from_json(json: &str) -> ForecastResult<Self> {
        let file: MetadataFile = serde_json::from_str(json)?;

        let feature_schema = match file.feature_columns {
            Some(columns) => FeatureSchema::from_names(&columns)?,
            None => FeatureSchema::default(),
        };

        Ok(Self {
            feature_schema,
            q05: file.q05.unwrap_or(Q05_FALLBACK),
            q95: file.q95.unwrap_or(Q95_FALLBACK),
            model_descriptor: file
                .model_type
                .unwrap_or_else(|| DEFAULT_MODEL_TYPE.to_string()),
            created_at: file.created_at_utc,
            model_sha256: file.model_sha256,
        })
    }

    pub fn load(path: &Path) -> ForecastResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ForecastError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content).map_err(|e| ForecastError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Load from `path`, recovering with defaults on any failure
    pub fn load_or_default(path: Option<&Path>) -> (Self, MetadataSource) {
        let Some(path) = path else {
            return (
                Self::default(),
                MetadataSource::Fallback {
                    reason: "no metadata path configured".to_string(),
                },
            );
        };

        match Self::load(path) {
            Ok(meta) => {
                if meta.q05 > meta.q95 {
                    warn!(
                        q05 = meta.q05,
                        q95 = meta.q95,
                        "Metadata quantile offsets are inverted; intervals will be inverted too"
                    );
                }
                info!(
                    path = %path.display(),
                    features = ?meta.feature_schema.names(),
                    q05 = meta.q05,
                    q95 = meta.q95,
                    "Loaded model metadata"
                );
                (meta, MetadataSource::File(path.to_path_buf()))
            }
            Err(e) => {
                warn!(error = %e, "Falling back to default model metadata");
                (
                    Self::default(),
                    MetadataSource::Fallback {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }

    pub fn interval_estimator(&self) -> IntervalEstimator {
        IntervalEstimator::new(self.q05, self.q95)
    }
}
