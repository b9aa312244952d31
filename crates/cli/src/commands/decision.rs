//! Decision layer commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, DecisionPayload, RepositionMove, ZoneAllocation};
use crate::commands::forecast::run_query;
use crate::output::{color_unserved, format_demand, print_json, print_table, OutputFormat};

/// Row for the zone allocation table
#[derive(Tabled)]
struct AllocationRow {
    #[tabled(rename = "Zone")]
    zone: String,
    #[tabled(rename = "Demand")]
    demand: String,
    #[tabled(rename = "EV")]
    ev: u32,
    #[tabled(rename = "ICE")]
    ice: u32,
    #[tabled(rename = "Total")]
    total: u32,
    #[tabled(rename = "Capacity")]
    capacity: String,
    #[tabled(rename = "Unserved")]
    unserved: String,
}

impl From<&ZoneAllocation> for AllocationRow {
    fn from(a: &ZoneAllocation) -> Self {
        Self {
            zone: a.zone.clone(),
            demand: format_demand(a.demand),
            ev: a.alloc_ev,
            ice: a.alloc_ice,
            total: a.alloc_total,
            capacity: format!("{:.1}", a.capacity_est),
            unserved: color_unserved(a.unserved),
        }
    }
}

/// Row for reposition tables
#[derive(Tabled)]
struct MoveRow {
    #[tabled(rename = "Fleet")]
    fleet: &'static str,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Vehicles")]
    count: u32,
}

fn move_rows<'a>(
    fleet: &'static str,
    moves: &'a [RepositionMove],
) -> impl Iterator<Item = MoveRow> + 'a {
    moves.iter().map(move |m| MoveRow {
        fleet,
        from: m.from.clone(),
        to: m.to.clone(),
        count: m.count,
    })
}

/// Render a decision payload as allocation and reposition tables
pub fn print_decision(payload: &DecisionPayload) {
    println!("{}", "Zone Allocation".bold());
    print_table(payload.zone_alloc.iter().map(AllocationRow::from).collect());

    println!("{}", "Repositioning".bold());
    print_table(
        move_rows("EV", &payload.reposition_ev)
            .chain(move_rows("ICE", &payload.reposition_ice))
            .collect(),
    );
}

/// Show the batch decision layer
pub async fn show_decision(
    client: &ApiClient,
    horizon: Option<u32>,
    last_y: Option<f64>,
    start: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let payload: DecisionPayload = client
        .get("decision_layer", &run_query(horizon, last_y, start))
        .await?;

    match format {
        OutputFormat::Json => print_json(&payload)?,
        OutputFormat::Table => print_decision(&payload),
    }

    Ok(())
}
