//! Service configuration

use anyhow::{Context, Result};
use demand_lib::decision::ZoneCatalog;
use demand_lib::stream::StreamConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration, read from `DEMAND_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// HTTP listen port
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// ONNX regression model
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Metadata JSON (feature order, quantiles)
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    /// Historical dataset used to derive the default seed
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,

    /// Events per streaming connection
    #[serde(default = "default_stream_steps")]
    pub stream_steps: u32,

    #[serde(default = "default_stream_interval")]
    pub stream_interval_secs: u64,

    #[serde(default = "default_decision_interval")]
    pub decision_interval_secs: u64,

    /// Comma-separated zone names
    #[serde(default)]
    pub zones: Option<String>,

    /// Comma-separated origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_api_port() -> u16 {
    8000
}

fn default_model_path() -> PathBuf {
    PathBuf::from("demand_model_bundle/xgb_demand_model.onnx")
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("demand_model_bundle/xgb_demand_model.json")
}

fn default_history_path() -> PathBuf {
    PathBuf::from("Synthetic_Fleet_Demand_Dataset.csv")
}

fn default_stream_steps() -> u32 {
    499
}

fn default_stream_interval() -> u64 {
    2
}

fn default_decision_interval() -> u64 {
    5
}

fn default_cors_origins() -> String {
    "http://localhost:9002".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            model_path: default_model_path(),
            metadata_path: default_metadata_path(),
            history_path: default_history_path(),
            stream_steps: default_stream_steps(),
            stream_interval_secs: default_stream_interval(),
            decision_interval_secs: default_decision_interval(),
            zones: None,
            cors_origins: default_cors_origins(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("DEMAND").try_parsing(true))
            .build()?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        config
            .try_deserialize()
            .context("invalid DEMAND_* configuration")
    }

    pub fn zone_catalog(&self) -> ZoneCatalog {
        match &self.zones {
            Some(list) => ZoneCatalog::parse(list),
            None => ZoneCatalog::default(),
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            max_steps: self.stream_steps,
            forecast_interval: Duration::from_secs(self.stream_interval_secs),
            decision_interval: Duration::from_secs(self.decision_interval_secs),
        }
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}
