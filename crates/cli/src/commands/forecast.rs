//! Forecast commands

use anyhow::Result;
use colored::Colorize;
use tabled::{builder::Builder, settings::Style, Tabled};

use crate::client::{ApiClient, ForecastPoint, Query, ZoneForecastRow};
use crate::output::{format_demand, format_range, format_time, print_json, print_table, OutputFormat};

/// Row for the hourly forecast table
#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Hour (UTC)")]
    time: String,
    #[tabled(rename = "P50")]
    p50: String,
    #[tabled(rename = "90% Range")]
    range: String,
}

impl From<&ForecastPoint> for ForecastRow {
    fn from(p: &ForecastPoint) -> Self {
        Self {
            time: format_time(&p.time),
            p50: format_demand(p.p50),
            range: format_range(p.p90_range),
        }
    }
}

/// Query parameters shared by forecast-style commands
pub fn run_query(horizon: Option<u32>, last_y: Option<f64>, start: Option<String>) -> Query {
    let mut query = Query::new();
    if let Some(h) = horizon {
        query.push(("horizon", h.to_string()));
    }
    if let Some(y) = last_y {
        query.push(("last_y", y.to_string()));
    }
    if let Some(s) = start {
        query.push(("start", s));
    }
    query
}

/// Show the hourly forecast
pub async fn show_forecast(
    client: &ApiClient,
    horizon: Option<u32>,
    last_y: Option<f64>,
    start: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let points: Vec<ForecastPoint> = client
        .get("forecast", &run_query(horizon, last_y, start))
        .await?;

    match format {
        OutputFormat::Json => print_json(&points)?,
        OutputFormat::Table => {
            println!("{} ({} hours)", "Demand Forecast".bold(), points.len());
            print_table(points.iter().map(ForecastRow::from).collect());
        }
    }

    Ok(())
}

/// Show the per-zone demo forecast, one column per zone
pub async fn show_zones(client: &ApiClient, horizon: Option<u32>, format: OutputFormat) -> Result<()> {
    let rows: Vec<ZoneForecastRow> = client
        .get("forecast_zones", &run_query(horizon, None, None))
        .await?;

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            let Some(first) = rows.first() else {
                println!("{}", "No items found".yellow());
                return Ok(());
            };
            let zones: Vec<String> = first.zones.iter().map(|(z, _)| z.clone()).collect();

            let mut builder = Builder::default();
            builder.push_record(std::iter::once("Hour (UTC)".to_string()).chain(zones.iter().cloned()));
            for row in &rows {
                builder.push_record(std::iter::once(format_time(&row.time)).chain(
                    zones.iter().map(|z| {
                        row.value(z).map(format_demand).unwrap_or_default()
                    }),
                ));
            }

            println!("{}", "Zone Forecast".bold());
            let table = builder.build().with(Style::rounded()).to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_query_only_includes_given_params() {
        assert!(run_query(None, None, None).is_empty());

        let query = run_query(Some(6), Some(0.0), Some("2024-01-01T00:00:00Z".to_string()));
        assert_eq!(
            query,
            vec![
                ("horizon", "6".to_string()),
                ("last_y", "0".to_string()),
                ("start", "2024-01-01T00:00:00Z".to_string()),
            ]
        );
    }

    #[test]
    fn test_forecast_row_formatting() {
        let row = ForecastRow::from(&ForecastPoint {
            time: "2024-01-01T01:00:00Z".to_string(),
            p50: 51.0,
            p90_range: [39.0, 63.0],
        });
        assert_eq!(row.time, "2024-01-01 01:00");
        assert_eq!(row.p50, "51.00");
        assert_eq!(row.range, "[39.00, 63.00]");
    }
}
