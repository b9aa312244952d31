//! Service zone catalog and the demo per-zone forecast

use crate::error::{ForecastError, ForecastResult};
use crate::models::{round_to, ZoneForecastRow};
use chrono::{DateTime, Duration, Utc};

/// Zones served when none are configured
pub const DEFAULT_ZONES: [&str; 6] = [
    "Downtown",
    "IT Park",
    "Mall",
    "Hospital",
    "University",
    "Residential Area",
];

/// Ordered list of zone names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneCatalog {
    names: Vec<String>,
}

impl ZoneCatalog {
    /// Blank and duplicate names are dropped; an empty result falls back to defaults
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut cleaned: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            if !name.is_empty() && !cleaned.iter().any(|n| n == name) {
                cleaned.push(name.to_string());
            }
        }
        if cleaned.is_empty() {
            return Self::default();
        }
        Self { names: cleaned }
    }

    /// Parse a comma separated list, e.g. from an environment variable
    pub fn parse(list: &str) -> Self {
        Self::new(&list.split(',').collect::<Vec<_>>())
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for ZoneCatalog {
    fn default() -> Self {
        Self {
            names: DEFAULT_ZONES.iter().map(|z| z.to_string()).collect(),
        }
    }
}

/// Placeholder per-zone demand, independent of the model: `20 + 5i + 0.8k`
pub fn demo_zone_forecast(
    zones: &ZoneCatalog,
    origin: DateTime<Utc>,
    horizon: u32,
) -> ForecastResult<Vec<ZoneForecastRow>> {
    (1..=horizon)
        .map(|k| {
            let time = origin
                .checked_add_signed(Duration::hours(i64::from(k)))
                .ok_or_else(|| ForecastError::InvalidTimestamp {
                    value: origin.to_rfc3339(),
                })?;
            Ok(ZoneForecastRow {
                time,
                zones: zones
                    .names()
                    .iter()
                    .enumerate()
                    .map(|(i, z)| (z.clone(), round_to(20.0 + 5.0 * i as f64 + k as f64 * 0.8, 2)))
                    .collect(),
            })
        })
        .collect()
}
