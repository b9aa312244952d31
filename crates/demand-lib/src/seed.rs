//! Seed and origin resolution for forecast runs
//!
//! The historical dataset contributes only one number: the row count of its
//! latest hourly bucket, used as the lag when the caller gives none.

use crate::error::{ForecastError, ForecastResult};
use chrono::{DateTime, Duration, DurationRound, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::path::Path;
use tracing::{debug, warn};

/// Lag used when neither the caller nor the dataset provides one
pub const DEFAULT_SEED: f64 = 50.0;

/// Column names accepted as the dataset time column (case-insensitive)
const TIME_COLUMNS: [&str; 3] = ["time", "timestamp", "datetime"];

/// Latest observed demand derived from the historical dataset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HistorySeed {
    latest: Option<f64>,
}

impl HistorySeed {
    pub fn unavailable() -> Self {
        Self { latest: None }
    }

    pub fn with_value(value: f64) -> Self {
        Self {
            latest: Some(value),
        }
    }

    /// Read the dataset once; any failure yields an unavailable seed
    pub fn from_csv_path(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let latest = latest_hourly_count(&content);
                debug!(path = %path.display(), latest = ?latest, "Derived seed from history");
                Self { latest }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "History dataset unavailable");
                Self::unavailable()
            }
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.latest
    }

    /// Explicit value, else history, else [`DEFAULT_SEED`]
    pub fn resolve(&self, explicit: Option<f64>) -> f64 {
        explicit.or(self.latest).unwrap_or(DEFAULT_SEED)
    }
}

/// Number of rows in the most recent hour bucket of a CSV with a time column
///
/// Rows are split on bare commas, so no field up to and including the time
/// column may contain a quoted comma.
pub fn latest_hourly_count(csv: &str) -> Option<f64> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next()?;
    let time_idx = header.split(',').position(|col| {
        let col = col.trim().trim_matches('"');
        TIME_COLUMNS.iter().any(|t| col.eq_ignore_ascii_case(t))
    })?;

    let mut latest: Option<(DateTime<Utc>, u64)> = None;
    for line in lines {
        let Some(raw) = line.split(',').nth(time_idx) else {
            continue;
        };
        let Some(ts) = parse_timestamp(raw.trim().trim_matches('"')) else {
            continue;
        };
        let bucket = truncate_to_hour(ts);
        latest = match latest {
            Some((b, n)) if b == bucket => Some((b, n + 1)),
            Some((b, n)) if b > bucket => Some((b, n)),
            _ => Some((bucket, 1)),
        };
    }

    latest.map(|(_, count)| count as f64)
}

/// Resolve the run origin: explicit ISO-8601 `start`, else `now` truncated to the hour
pub fn resolve_origin(start: Option<&str>, now: DateTime<Utc>) -> ForecastResult<DateTime<Utc>> {
    match start {
        Some(raw) => parse_timestamp(raw.trim()).ok_or_else(|| ForecastError::InvalidTimestamp {
            value: raw.to_string(),
        }),
        None => Ok(truncate_to_hour(now)),
    }
}

/// Parse RFC 3339 or naive ISO-8601 (naive values are taken as UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::hours(1)).unwrap_or_else(|_| {
        ts.with_nanosecond(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_minute(0))
            .unwrap_or(ts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    #[test]
    fn test_seed_precedence() {
        let history = HistorySeed::with_value(17.0);
        assert_eq!(history.resolve(Some(3.5)), 3.5);
        assert_eq!(history.resolve(None), 17.0);
        assert_eq!(HistorySeed::unavailable().resolve(None), DEFAULT_SEED);
    }

    #[test]
    fn test_explicit_zero_seed_is_used() {
        assert_eq!(HistorySeed::with_value(17.0).resolve(Some(0.0)), 0.0);
    }

    #[test]
    fn test_latest_hourly_count() {
        let csv = "trip_id,Timestamp,zone\n\
                   1,2024-05-01 09:10:00,Mall\n\
                   2,2024-05-01 10:05:00,Mall\n\
                   3,2024-05-01 10:45:00,Downtown\n\
                   4,2024-05-01 09:59:00,Hospital\n\
                   5,not-a-date,Mall\n\
                   6,2024-05-01T10:30:00Z,IT Park\n";
        assert_eq!(latest_hourly_count(csv), Some(3.0));
    }

    #[test]
    fn test_csv_without_time_column() {
        assert_eq!(latest_hourly_count("id,zone\n1,Mall\n"), None);
        assert_eq!(latest_hourly_count(""), None);
    }

    #[test]
    fn test_history_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "datetime,demand").unwrap();
        writeln!(file, "2024-05-01T08:00:00,4").unwrap();
        writeln!(file, "2024-05-01T08:20:00,4").unwrap();

        assert_eq!(HistorySeed::from_csv_path(file.path()).latest(), Some(2.0));
        assert_eq!(
            HistorySeed::from_csv_path(Path::new("/nonexistent.csv")).latest(),
            None
        );
    }

    #[test]
    fn test_origin_defaults_to_current_hour() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 13, 47, 12).unwrap();
        assert_eq!(
            resolve_origin(None, now).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 1, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_origin_accepts_iso_variants() {
        let now = Utc::now();
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for raw in [
            "2024-01-01T00:00:00Z",
            "2024-01-01T00:00:00+00:00",
            "2024-01-01T02:00:00+02:00",
            "2024-01-01T00:00:00",
            "2024-01-01T00:00",
            "2024-01-01",
        ] {
            assert_eq!(resolve_origin(Some(raw), now).unwrap(), expected, "{}", raw);
        }
    }

    #[test]
    fn test_origin_rejects_garbage() {
        let err = resolve_origin(Some("yesterday"), Utc::now()).unwrap_err();
        assert!(matches!(err, ForecastError::InvalidTimestamp { .. }));
    }
}
