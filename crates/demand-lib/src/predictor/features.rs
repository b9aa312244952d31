//! Feature construction for one-step demand inference
//!
//! Maps the carried lag value and the target hour onto the column order the
//! model was trained with. Calendar features are always taken in UTC so the
//! hour and weekday cannot drift between steps of one run.

use crate::error::{ForecastError, ForecastResult};
use crate::models::{FeatureSlot, FeatureVector};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Column names used when the model metadata does not declare any
pub const DEFAULT_FEATURES: [&str; 3] = ["lag1", "dow", "hour"];

/// Ordered model input schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    names: Vec<String>,
    slots: Vec<FeatureSlot>,
}

impl FeatureSchema {
    /// Resolve declared column names to feature slots
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> ForecastResult<Self> {
        if names.is_empty() {
            return Err(ForecastError::InvalidInput(
                "feature schema is empty".to_string(),
            ));
        }

        let mut slots = Vec::with_capacity(names.len());
        for name in names {
            let slot = slot_for_name(name.as_ref()).ok_or_else(|| {
                ForecastError::InvalidInput(format!("unknown feature column {:?}", name.as_ref()))
            })?;
            if slots.contains(&slot) {
                return Err(ForecastError::InvalidInput(format!(
                    "feature column {:?} maps to an already declared slot",
                    name.as_ref()
                )));
            }
            slots.push(slot);
        }

        Ok(Self {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            slots,
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            names: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
            slots: vec![FeatureSlot::Lag, FeatureSlot::DayOfWeek, FeatureSlot::HourOfDay],
        }
    }
}

fn slot_for_name(name: &str) -> Option<FeatureSlot> {
    match name.trim().to_ascii_lowercase().as_str() {
        "lag1" | "lag" | "lag_value" | "last_y" => Some(FeatureSlot::Lag),
        "dow" | "day_of_week" | "weekday" => Some(FeatureSlot::DayOfWeek),
        "hour" | "hour_of_day" => Some(FeatureSlot::HourOfDay),
        _ => None,
    }
}

/// Builds feature vectors for the recursive forecaster
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder {
    schema: FeatureSchema,
}

impl FeatureBuilder {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Build the features for the hour starting at `at`, with `carry` as the lag
    pub fn build(&self, carry: f64, at: DateTime<Utc>) -> ForecastResult<FeatureVector> {
        if !carry.is_finite() {
            return Err(ForecastError::InvalidInput(format!(
                "lag value must be finite, got {}",
                carry
            )));
        }

        let entries = self
            .schema
            .slots
            .iter()
            .map(|slot| {
                let value = match slot {
                    FeatureSlot::Lag => carry,
                    FeatureSlot::DayOfWeek => at.weekday().num_days_from_monday() as f64,
                    FeatureSlot::HourOfDay => at.hour() as f64,
                };
                (*slot, value)
            })
            .collect();

        Ok(FeatureVector::from_entries(entries))
    }
}
