//! ONNX regression inference using tract
//!
//! The trained demand regressor is exported to ONNX and evaluated with
//! tract-onnx: a single `[1, n_features]` f32 input, a single scalar output.

use super::Predictor;
use crate::error::{ForecastError, ForecastResult};
use crate::models::{FeatureSlot, FeatureVector};
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Inference latency above which a warning is logged
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based demand regressor
pub struct OnnxPredictor {
    model: TractModel,
    num_features: usize,
    model_type: String,
}

impl OnnxPredictor {
    /// Build a predictor from ONNX model bytes
    pub fn new(model_bytes: &[u8], num_features: usize, model_type: impl Into<String>) -> Result<Self> {
        let model = Self::load_model(model_bytes, num_features)?;
        Ok(Self {
            model,
            num_features,
            model_type: model_type.into(),
        })
    }

    /// Load a model file, verifying its SHA-256 when a checksum is declared
    pub fn from_file(
        path: &Path,
        expected_sha256: Option<&str>,
        num_features: usize,
        model_type: impl Into<String>,
    ) -> ForecastResult<Self> {
        let load_err = |reason: String| ForecastError::ConfigLoad {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = std::fs::read(path).map_err(|e| load_err(e.to_string()))?;

        if let Some(expected) = expected_sha256 {
            let computed = compute_checksum(&bytes);
            if !computed.eq_ignore_ascii_case(expected.trim()) {
                return Err(load_err(format!(
                    "checksum mismatch: expected {}, got {}",
                    expected, computed
                )));
            }
            debug!(checksum = %computed, "Model checksum validated");
        }

        let predictor =
            Self::new(&bytes, num_features, model_type).map_err(|e| load_err(format!("{:#}", e)))?;
        info!(
            path = %path.display(),
            size = bytes.len(),
            num_features,
            "Loaded ONNX demand model"
        );
        Ok(predictor)
    }

    fn load_model(model_bytes: &[u8], num_features: usize) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, num_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    fn features_to_tensor(&self, features: &FeatureVector) -> Result<Tensor> {
        if features.len() != self.num_features {
            anyhow::bail!(
                "Model expects {} features, got {}",
                self.num_features,
                features.len()
            );
        }
        let data: Vec<f32> = features.values().map(|v| v as f32).collect();
        let array = tract_ndarray::Array2::from_shape_vec((1, self.num_features), data)
            .context("Failed to shape feature tensor")?;
        Ok(array.into())
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let start = Instant::now();
        let input = self.features_to_tensor(features)?;

        let result = self.model.run(tvec!(input.into()))?;
        let output = result.first().context("No output from model")?;
        let value = output
            .to_array_view::<f32>()?
            .iter()
            .next()
            .copied()
            .context("Model produced an empty output tensor")?;

        let elapsed = start.elapsed();
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            warn!(elapsed_ms = elapsed.as_millis(), "Inference exceeded {}ms target", MAX_INFERENCE_MS);
        }

        Ok(value as f64)
    }

    fn model_type(&self) -> &str {
        &self.model_type
    }
}

/// Persistence forecast used when no model file can be loaded: next hour equals the lag
#[derive(Debug, Clone, Copy, Default)]
pub struct PersistencePredictor;

impl Predictor for PersistencePredictor {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        features
            .get(FeatureSlot::Lag)
            .context("Feature schema has no lag column")
    }

    fn model_type(&self) -> &str {
        "persistence"
    }
}

/// Hex-encoded SHA-256 of a byte slice
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::FeatureBuilder;
    use chrono::{TimeZone, Utc};
    use std::io::Write;

    #[test]
    fn test_persistence_returns_lag() {
        let fv = FeatureBuilder::default()
            .build(37.5, Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap())
            .unwrap();
        assert_eq!(PersistencePredictor.predict(&fv).unwrap(), 37.5);
        assert_eq!(PersistencePredictor.model_type(), "persistence");
    }

    #[test]
    fn test_persistence_without_lag_column_fails() {
        let fv = FeatureVector::from_entries(vec![(FeatureSlot::HourOfDay, 4.0)]);
        assert!(PersistencePredictor.predict(&fv).is_err());
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        assert_eq!(
            compute_checksum(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_missing_model_file_is_config_error() {
        let err = OnnxPredictor::from_file(Path::new("/nonexistent/model.onnx"), None, 3, "XGBRegressor")
            .err()
            .unwrap();
        assert!(matches!(err, ForecastError::ConfigLoad { .. }));
    }

    #[test]
    fn test_checksum_mismatch_rejected_before_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really an onnx model").unwrap();

        let err = OnnxPredictor::from_file(file.path(), Some("deadbeef"), 3, "XGBRegressor")
            .err()
            .unwrap();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_garbage_model_bytes_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"not really an onnx model").unwrap();
        let checksum = compute_checksum(b"not really an onnx model");

        let err = OnnxPredictor::from_file(file.path(), Some(&checksum), 3, "XGBRegressor")
            .err()
            .unwrap();
        assert!(matches!(err, ForecastError::ConfigLoad { .. }));
    }
}
