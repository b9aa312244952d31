//! Live stream commands

use anyhow::Result;
use colored::Colorize;

use crate::client::{ApiClient, ClientError, DecisionPayload, ForecastPoint};
use crate::commands::decision::print_decision;
use crate::commands::forecast::run_query;
use crate::output::{format_range, format_time, print_info, print_success, OutputFormat};

/// Which server stream to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamTarget {
    Forecast,
    Decision,
}

impl StreamTarget {
    fn path(&self) -> &'static str {
        match self {
            StreamTarget::Forecast => "stream",
            StreamTarget::Decision => "decision_stream",
        }
    }
}

/// Follow a live stream, printing each event as it arrives.
/// Stops after `count` events when given, otherwise when the server closes.
pub async fn follow(
    client: &ApiClient,
    target: StreamTarget,
    count: Option<usize>,
    last_y: Option<f64>,
    start: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    print_info(&format!(
        "Following {} (Ctrl-C to stop)",
        client.base_url().join(target.path())?
    ));

    let mut seen = 0usize;
    let delivered = client
        .stream(target.path(), &run_query(None, last_y, start), |event| {
            seen += 1;
            render_event(target, seen, event, format)?;
            Ok(count.map_or(true, |limit| seen < limit))
        })
        .await?;

    print_success(&format!("Received {} events", delivered));
    Ok(())
}

fn render_event(
    target: StreamTarget,
    index: usize,
    event: &str,
    format: OutputFormat,
) -> Result<(), ClientError> {
    if format == OutputFormat::Json {
        println!("{}", event);
        return Ok(());
    }

    match target {
        StreamTarget::Forecast => {
            let points: Vec<ForecastPoint> = serde_json::from_str(event)?;
            for p in &points {
                println!(
                    "{} {}  p50 {:>8.2}  range {}",
                    format!("#{:<4}", index).dimmed(),
                    format_time(&p.time),
                    p.p50,
                    format_range(p.p90_range)
                );
            }
        }
        StreamTarget::Decision => {
            let payload: DecisionPayload = serde_json::from_str(event)?;
            println!("{}", format!("Decision #{}", index).bold());
            print_decision(&payload);
        }
    }
    Ok(())
}
