//! Demand forecasting library for fleet operations
//!
//! This crate provides the core functionality for:
//! - Autoregressive hourly demand forecasts with uncertainty bands
//! - Zone-level fleet allocation and reposition planning
//! - Paced streaming of forecasts and decisions
//! - Health checks and observability

pub mod decision;
pub mod engine;
pub mod error;
pub mod health;
pub mod metadata;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod seed;
pub mod stream;

pub use engine::{ForecastEngine, MetaInfo, RunParams};
pub use error::{ForecastError, ForecastResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ForecastMetrics, StructuredLogger};
pub use stream::{CloseReason, StreamConfig, StreamEmitter, StreamHandle, StreamKind};
