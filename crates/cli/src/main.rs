//! Fleet Demand Forecast CLI
//!
//! A command-line tool for querying forecasts and fleet decisions and for
//! following the live streams of the demand forecast service.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{decision, forecast, status, stream};

/// Fleet Demand Forecast CLI
#[derive(Parser)]
#[command(name = "dfc")]
#[command(author, version, about = "CLI for the Fleet Demand Forecast API", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via DFC_API_URL env var)
    #[arg(long, env = "DFC_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show service health
    Health,

    /// Show model metadata
    Meta,

    /// Get the hourly demand forecast
    Forecast {
        /// Hours ahead (1-168)
        #[arg(long)]
        horizon: Option<u32>,

        /// Last observed hourly demand used as the seed
        #[arg(long)]
        last_y: Option<f64>,

        /// Forecast origin (ISO-8601, UTC when no offset is given)
        #[arg(long)]
        start: Option<String>,
    },

    /// Get the per-zone demo forecast
    Zones {
        /// Hours ahead (1-24)
        #[arg(long)]
        horizon: Option<u32>,
    },

    /// Get zone allocations and reposition moves
    Decision {
        /// Hours of forecast to allocate from (1-168)
        #[arg(long)]
        horizon: Option<u32>,

        #[arg(long)]
        last_y: Option<f64>,

        #[arg(long)]
        start: Option<String>,
    },

    /// Follow a live stream
    Stream {
        /// Follow the decision stream instead of raw forecasts
        #[arg(long)]
        decision: bool,

        /// Stop after this many events
        #[arg(long, short = 'n')]
        count: Option<usize>,

        #[arg(long)]
        last_y: Option<f64>,

        #[arg(long)]
        start: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let file_config = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| output::OutputFormat::from_config(file_config.default_format.as_deref()))
        .unwrap_or_default();
    let api_url = file_config.resolve_api_url(cli.api_url.as_deref());

    // Initialize client
    let client = client::ApiClient::new(&api_url)?;

    // Execute command
    match cli.command {
        Commands::Health => status::show_health(&client, format).await?,
        Commands::Meta => status::show_meta(&client, format).await?,
        Commands::Forecast {
            horizon,
            last_y,
            start,
        } => {
            let horizon = horizon.or(file_config.default_horizon);
            forecast::show_forecast(&client, horizon, last_y, start, format).await?;
        }
        Commands::Zones { horizon } => forecast::show_zones(&client, horizon, format).await?,
        Commands::Decision {
            horizon,
            last_y,
            start,
        } => {
            let horizon = horizon.or(file_config.default_horizon);
            decision::show_decision(&client, horizon, last_y, start, format).await?;
        }
        Commands::Stream {
            decision,
            count,
            last_y,
            start,
        } => {
            let target = if decision {
                stream::StreamTarget::Decision
            } else {
                stream::StreamTarget::Forecast
            };
            stream::follow(&client, target, count, last_y, start, format).await?;
        }
    }

    Ok(())
}
