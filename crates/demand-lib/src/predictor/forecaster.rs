//! Recursive one-step-ahead forecasting
//!
//! Each step predicts the next hour from the previous step's own point
//! estimate. Ground truth is never substituted, so errors compound across
//! the horizon exactly as the model would see them in production.

use super::{FeatureBuilder, IntervalEstimator, Predictor};
use crate::error::{ForecastError, ForecastResult};
use crate::models::{ForecastPoint, ForecastState};
use crate::observability::ForecastMetrics;
use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Drives the autoregressive predict → band → carry loop
#[derive(Clone)]
pub struct RecursiveForecaster {
    predictor: Arc<dyn Predictor>,
    features: FeatureBuilder,
    interval: IntervalEstimator,
    metrics: ForecastMetrics,
}

impl RecursiveForecaster {
    pub fn new(
        predictor: Arc<dyn Predictor>,
        features: FeatureBuilder,
        interval: IntervalEstimator,
    ) -> Self {
        Self {
            predictor,
            features,
            interval,
            metrics: ForecastMetrics::new(),
        }
    }

    pub fn predictor(&self) -> &dyn Predictor {
        self.predictor.as_ref()
    }

    pub fn interval(&self) -> &IntervalEstimator {
        &self.interval
    }

    /// Start a step-wise run; nothing is computed until [`ForecastRun::step`]
    pub fn start(&self, seed: f64, origin: DateTime<Utc>) -> ForecastRun<'_> {
        ForecastRun {
            forecaster: self,
            state: ForecastState::new(seed, origin),
        }
    }

    /// Run `horizon` steps to completion
    pub fn run(
        &self,
        seed: f64,
        origin: DateTime<Utc>,
        horizon: u32,
    ) -> ForecastResult<Vec<ForecastPoint>> {
        if horizon == 0 {
            return Err(ForecastError::InvalidInput(
                "horizon must be at least 1".to_string(),
            ));
        }

        let mut run = self.start(seed, origin);
        (0..horizon).map(|_| run.step()).collect()
    }

    fn predict_at(&self, carry: f64, at: DateTime<Utc>) -> ForecastResult<ForecastPoint> {
        let features = self.features.build(carry, at)?;

        let start = Instant::now();
        let point = match self.predictor.predict(&features) {
            Ok(p) if p.is_finite() => p,
            Ok(p) => {
                self.metrics.inc_prediction_errors();
                return Err(ForecastError::Predictor(anyhow!("non-finite prediction {}", p)));
            }
            Err(e) => {
                self.metrics.inc_prediction_errors();
                return Err(ForecastError::Predictor(e));
            }
        };
        self.metrics.observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_predictions();

        let (lower, upper) = self.interval.estimate(point);
        Ok(ForecastPoint {
            timestamp: at,
            point_estimate: point,
            interval_lower: lower,
            interval_upper: upper,
        })
    }
}

/// One in-flight forecast: owns its state, borrows the shared forecaster
pub struct ForecastRun<'a> {
    forecaster: &'a RecursiveForecaster,
    state: ForecastState,
}

impl ForecastRun<'_> {
    pub fn state(&self) -> &ForecastState {
        &self.state
    }

    /// Steps produced so far
    pub fn step_index(&self) -> u32 {
        self.state.step_index
    }

    /// Produce the next hour and carry its point estimate forward
    ///
    /// On failure the state is left untouched.
    pub fn step(&mut self) -> ForecastResult<ForecastPoint> {
        let k = self.state.step_index + 1;
        let at = self
            .state
            .origin
            .checked_add_signed(Duration::hours(i64::from(k)))
            .ok_or_else(|| ForecastError::InvalidTimestamp {
                value: self.state.origin.to_rfc3339(),
            })?;
        let point = self.forecaster.predict_at(self.state.carry_value, at)?;

        debug!(
            step = k,
            lag = self.state.carry_value,
            p50 = point.point_estimate,
            "Forecast step"
        );

        self.state.carry_value = point.point_estimate;
        self.state.step_index = k;
        Ok(point)
    }
}
