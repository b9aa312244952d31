//! Forecast engine: the read-only state shared by every request and stream
//!
//! Built once at startup from the loaded metadata, the predictor handle, the
//! history seed and the decision layer. Nothing in here is mutated after
//! construction, so it is shared as `Arc<ForecastEngine>` without locks.

use crate::decision::{demo_zone_forecast, DecisionLayer, DecisionPolicy};
use crate::error::{ForecastError, ForecastResult};
use crate::metadata::ModelMetadata;
use crate::models::{DecisionPayload, ForecastPoint, ZoneForecastRow};
use crate::predictor::{FeatureBuilder, Predictor, RecursiveForecaster};
use crate::seed::{resolve_origin, HistorySeed};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upper bound for `/forecast` and `/decision_layer`
pub const MAX_FORECAST_HORIZON: u32 = 168;

/// Upper bound for `/forecast_zones`
pub const MAX_ZONE_HORIZON: u32 = 24;

/// Resolved starting conditions of one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunParams {
    pub seed: f64,
    pub origin: DateTime<Utc>,
}

/// Body of `GET /meta`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaInfo {
    pub model_type: String,
    pub features: Vec<String>,
    pub q05: f64,
    pub q95: f64,
    pub created_at_utc: Option<String>,
}

/// Reject horizons outside `1..=max`
pub fn validate_horizon(horizon: u32, max: u32) -> ForecastResult<u32> {
    if (1..=max).contains(&horizon) {
        Ok(horizon)
    } else {
        Err(ForecastError::InvalidInput(format!(
            "horizon must be between 1 and {}, got {}",
            max, horizon
        )))
    }
}

pub struct ForecastEngine {
    metadata: ModelMetadata,
    forecaster: RecursiveForecaster,
    history: HistorySeed,
    decisions: DecisionLayer,
    batch_policy: DecisionPolicy,
    stream_policy: DecisionPolicy,
}

impl ForecastEngine {
    pub fn new(
        metadata: ModelMetadata,
        predictor: Arc<dyn Predictor>,
        history: HistorySeed,
        decisions: DecisionLayer,
    ) -> Self {
        let forecaster = RecursiveForecaster::new(
            predictor,
            FeatureBuilder::new(metadata.feature_schema.clone()),
            metadata.interval_estimator(),
        );
        Self {
            metadata,
            forecaster,
            history,
            decisions,
            batch_policy: DecisionPolicy::batch_default(),
            stream_policy: DecisionPolicy::stream_default(),
        }
    }

    /// Replace the batch and stream decision policies
    pub fn with_policies(mut self, batch: DecisionPolicy, stream: DecisionPolicy) -> Self {
        self.batch_policy = batch;
        self.stream_policy = stream;
        self
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn forecaster(&self) -> &RecursiveForecaster {
        &self.forecaster
    }

    pub fn decisions(&self) -> &DecisionLayer {
        &self.decisions
    }

    pub fn meta(&self) -> MetaInfo {
        MetaInfo {
            model_type: self.metadata.model_descriptor.clone(),
            features: self.metadata.feature_schema.names().to_vec(),
            q05: self.metadata.q05,
            q95: self.metadata.q95,
            created_at_utc: self.metadata.created_at.clone(),
        }
    }

    /// Resolve seed and origin for a bounded run, validating caller input
    pub fn resolve(
        &self,
        last_y: Option<f64>,
        start: Option<&str>,
        now: DateTime<Utc>,
    ) -> ForecastResult<RunParams> {
        self.resolve_within(last_y, start, now, MAX_FORECAST_HORIZON)
    }

    /// Resolve seed and origin for a run of up to `reach` hourly steps
    ///
    /// The origin is rejected when its last step would not be a representable
    /// instant.
    pub fn resolve_within(
        &self,
        last_y: Option<f64>,
        start: Option<&str>,
        now: DateTime<Utc>,
        reach: u32,
    ) -> ForecastResult<RunParams> {
        if let Some(v) = last_y {
            if !v.is_finite() {
                return Err(ForecastError::InvalidInput(format!(
                    "last_y must be finite, got {}",
                    v
                )));
            }
        }
        let origin = resolve_origin(start, now)?;
        if origin
            .checked_add_signed(Duration::hours(i64::from(reach)))
            .is_none()
        {
            return Err(ForecastError::InvalidTimestamp {
                value: start.unwrap_or_default().to_string(),
            });
        }
        Ok(RunParams {
            seed: self.history.resolve(last_y),
            origin,
        })
    }

    /// Bounded forecast, computed to completion
    pub fn forecast(
        &self,
        horizon: u32,
        last_y: Option<f64>,
        start: Option<&str>,
        now: DateTime<Utc>,
    ) -> ForecastResult<Vec<ForecastPoint>> {
        validate_horizon(horizon, MAX_FORECAST_HORIZON)?;
        let params = self.resolve(last_y, start, now)?;
        self.forecast_from(params, horizon)
    }

    /// Bounded forecast from already resolved run parameters
    pub fn forecast_from(
        &self,
        params: RunParams,
        horizon: u32,
    ) -> ForecastResult<Vec<ForecastPoint>> {
        let horizon = validate_horizon(horizon, MAX_FORECAST_HORIZON)?;
        self.forecaster.run(params.seed, params.origin, horizon)
    }

    /// Bounded decision layer over a full forecast trajectory
    pub fn decision(
        &self,
        horizon: u32,
        last_y: Option<f64>,
        start: Option<&str>,
        now: DateTime<Utc>,
    ) -> ForecastResult<DecisionPayload> {
        validate_horizon(horizon, MAX_FORECAST_HORIZON)?;
        let params = self.resolve(last_y, start, now)?;
        self.decision_from(params, horizon)
    }

    pub fn decision_from(&self, params: RunParams, horizon: u32) -> ForecastResult<DecisionPayload> {
        let trajectory = self.forecast_from(params, horizon)?;
        Ok(self.decisions.decide(&self.batch_policy, &trajectory, 0))
    }

    /// Decision for one live stream step
    pub fn stream_decision(&self, point: &ForecastPoint, step_index: u32) -> DecisionPayload {
        self.decisions
            .decide(&self.stream_policy, std::slice::from_ref(point), step_index)
    }

    /// Model-independent per-zone demo numbers
    pub fn zone_forecast(
        &self,
        horizon: u32,
        now: DateTime<Utc>,
    ) -> ForecastResult<Vec<ZoneForecastRow>> {
        let horizon = validate_horizon(horizon, MAX_ZONE_HORIZON)?;
        let origin = resolve_origin(None, now)?;
        demo_zone_forecast(self.decisions.zones(), origin, horizon)
    }
}
