//! Demand prediction engine

mod features;
mod forecaster;
mod inference;
mod interval;

pub use features::{FeatureBuilder, FeatureSchema, DEFAULT_FEATURES};
pub use forecaster::{ForecastRun, RecursiveForecaster};
pub use inference::{compute_checksum, OnnxPredictor, PersistencePredictor};
pub use interval::{IntervalEstimator, Q05_FALLBACK, Q95_FALLBACK};

use crate::models::FeatureVector;
use anyhow::Result;

/// Opaque one-step demand regressor
pub trait Predictor: Send + Sync {
    /// Point estimate of next-hour demand for one feature row
    fn predict(&self, features: &FeatureVector) -> Result<f64>;

    /// Short model family name, e.g. `XGBRegressor`
    fn model_type(&self) -> &str;
}
