//! Core data models for the demand forecast service

use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

/// One forecast step with its uncertainty band
///
/// Serialized in the wire form `{ "time", "p50", "p90_range": [lower, upper] }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "DemandForecast", from = "DemandForecast")]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub point_estimate: f64,
    pub interval_lower: f64,
    pub interval_upper: f64,
}

/// Wire representation of a [`ForecastPoint`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DemandForecast {
    pub time: DateTime<Utc>,
    pub p50: f64,
    pub p90_range: [f64; 2],
}

impl From<ForecastPoint> for DemandForecast {
    fn from(p: ForecastPoint) -> Self {
        Self {
            time: p.timestamp,
            p50: p.point_estimate,
            p90_range: [p.interval_lower, p.interval_upper],
        }
    }
}

impl From<DemandForecast> for ForecastPoint {
    fn from(d: DemandForecast) -> Self {
        Self {
            timestamp: d.time,
            point_estimate: d.p50,
            interval_lower: d.p90_range[0],
            interval_upper: d.p90_range[1],
        }
    }
}

/// Per-run autoregressive state. Lives for one request or one stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastState {
    /// Lag value fed to the next step; the previous point estimate after step 1
    pub carry_value: f64,
    /// Number of steps produced so far
    pub step_index: u32,
    pub origin: DateTime<Utc>,
}

impl ForecastState {
    pub fn new(seed: f64, origin: DateTime<Utc>) -> Self {
        Self {
            carry_value: seed,
            step_index: 0,
            origin,
        }
    }
}

/// Semantic role of one position in the model's input schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureSlot {
    /// Most recent observed or predicted demand
    Lag,
    /// 0 = Monday .. 6 = Sunday
    DayOfWeek,
    /// 0..=23, UTC
    HourOfDay,
}

/// Feature vector for one inference call, ordered per the model schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    entries: Vec<(FeatureSlot, f64)>,
}

impl FeatureVector {
    pub(crate) fn from_entries(entries: Vec<(FeatureSlot, f64)>) -> Self {
        Self { entries }
    }

    /// Value of a slot, if the schema declares it
    pub fn get(&self, slot: FeatureSlot) -> Option<f64> {
        self.entries
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, v)| *v)
    }

    /// Values in schema order
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Allocation decision for a single zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneAllocation {
    pub zone: String,
    #[serde(serialize_with = "round_2dp")]
    pub demand: f64,
    pub alloc_ev: u32,
    pub alloc_ice: u32,
    pub alloc_total: u32,
    #[serde(serialize_with = "round_1dp")]
    pub capacity_est: f64,
    #[serde(serialize_with = "round_1dp")]
    pub unserved: f64,
}

/// Planned transfer of vehicles between zones
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositionMove {
    pub from: String,
    pub to: String,
    pub count: u32,
}

impl RepositionMove {
    pub fn new(from: impl Into<String>, to: impl Into<String>, count: u32) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            count,
        }
    }
}

/// Combined decision-layer output, one per batch request or stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub zone_alloc: Vec<ZoneAllocation>,
    pub reposition_ev: Vec<RepositionMove>,
    pub reposition_ice: Vec<RepositionMove>,
}

/// Per-zone demo forecast row, serialized as `{ "time": .., "<zone>": value, .. }`
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneForecastRow {
    pub time: DateTime<Utc>,
    /// Zone values in catalog order
    pub zones: Vec<(String, f64)>,
}

impl Serialize for ZoneForecastRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.zones.len() + 1))?;
        map.serialize_entry("time", &self.time)?;
        for (zone, value) in &self.zones {
            map.serialize_entry(zone, value)?;
        }
        map.end()
    }
}

/// Round half away from zero to `places` decimals
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn round_2dp<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 2))
}

fn round_1dp<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to(*value, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_forecast_point_wire_format() {
        let point = ForecastPoint {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            point_estimate: 51.0,
            interval_lower: 39.0,
            interval_upper: 63.0,
        };
        let json = serde_json::to_value(point).unwrap();
        assert_eq!(json["time"], "2024-01-01T01:00:00Z");
        assert_eq!(json["p50"], 51.0);
        assert_eq!(json["p90_range"], serde_json::json!([39.0, 63.0]));

        let back: ForecastPoint = serde_json::from_value(json).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn test_zone_allocation_rounds_on_the_wire_only() {
        let alloc = ZoneAllocation {
            zone: "Mall".to_string(),
            demand: 61.23456,
            alloc_ev: 12,
            alloc_ice: 20,
            alloc_total: 32,
            capacity_est: 67.2000001,
            unserved: 0.0,
        };
        let json = serde_json::to_value(&alloc).unwrap();
        assert_eq!(json["demand"], 61.23);
        assert_eq!(json["capacity_est"], 67.2);
        assert_eq!(alloc.demand, 61.23456);
    }

    #[test]
    fn test_zone_forecast_row_keeps_catalog_order() {
        let row = ZoneForecastRow {
            time: Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            zones: vec![("Mall".to_string(), 30.8), ("Downtown".to_string(), 20.8)],
        };
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(
            json,
            r#"{"time":"2024-01-01T01:00:00Z","Mall":30.8,"Downtown":20.8}"#
        );
    }

    #[test]
    fn test_feature_vector_lookup() {
        let fv = FeatureVector::from_entries(vec![
            (FeatureSlot::HourOfDay, 3.0),
            (FeatureSlot::Lag, 42.0),
        ]);
        assert_eq!(fv.get(FeatureSlot::Lag), Some(42.0));
        assert_eq!(fv.get(FeatureSlot::DayOfWeek), None);
        assert_eq!(fv.values().collect::<Vec<_>>(), vec![3.0, 42.0]);
        assert_eq!(fv.len(), 2);
    }
}
