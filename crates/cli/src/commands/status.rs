//! Service status commands: health and model metadata

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthStatus, MetaInfo, Query};
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show service health and per-component status
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: HealthStatus = client.get("healthz", &Query::new()).await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            let overall = health
                .status
                .clone()
                .unwrap_or_else(|| (if health.ok { "ok" } else { "unhealthy" }).to_string());
            println!("{} {}", "Service:".bold(), color_status(&overall));

            let rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, c)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&c.status),
                    message: c.message.clone().unwrap_or_default(),
                })
                .collect();
            if !rows.is_empty() {
                print_table(rows);
            }
            if !health.ok {
                print_warning("Service reports a critical component failure");
            }
        }
    }

    Ok(())
}

/// Show the loaded model metadata
pub async fn show_meta(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let meta: MetaInfo = client.get("meta", &Query::new()).await?;

    match format {
        OutputFormat::Json => print_json(&meta)?,
        OutputFormat::Table => {
            println!("{}", "Model Metadata".bold());
            println!("{}", "=".repeat(50));
            println!("Model type:             {}", meta.model_type.cyan());
            println!("Features:               {}", meta.features.join(", "));
            println!("Residual q05:           {:.3}", meta.q05);
            println!("Residual q95:           {:.3}", meta.q95);
            println!(
                "Trained at:             {}",
                meta.created_at_utc.as_deref().unwrap_or("unknown").dimmed()
            );
            if meta.q05 > meta.q95 {
                print_warning("q05 is above q95; uncertainty bands are inverted");
            }
        }
    }

    Ok(())
}
