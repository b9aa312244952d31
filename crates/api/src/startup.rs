//! Startup wiring: metadata, predictor, history seed and shared state
//!
//! Every missing or malformed input is recovered with a fallback and marks its
//! health component degraded; nothing here fails the process.

use crate::api::AppState;
use crate::config::ServiceConfig;
use demand_lib::{
    decision::{DecisionLayer, ZoneAllocator},
    health::{components, HealthRegistry},
    metadata::{MetadataSource, ModelMetadata},
    observability::{ForecastMetrics, StructuredLogger},
    predictor::{OnnxPredictor, PersistencePredictor, Predictor},
    seed::HistorySeed,
    stream::StreamEmitter,
    ForecastEngine,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Where the active predictor came from
#[derive(Debug, Clone, PartialEq)]
pub enum PredictorSource {
    Onnx,
    Persistence { reason: String },
}

impl PredictorSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictorSource::Onnx => "onnx",
            PredictorSource::Persistence { .. } => "persistence",
        }
    }
}

/// Load the ONNX model, falling back to persistence on any failure
pub fn load_predictor(
    config: &ServiceConfig,
    metadata: &ModelMetadata,
) -> (Arc<dyn Predictor>, PredictorSource) {
    match OnnxPredictor::from_file(
        &config.model_path,
        metadata.model_sha256.as_deref(),
        metadata.feature_schema.len(),
        metadata.model_descriptor.clone(),
    ) {
        Ok(predictor) => (Arc::new(predictor), PredictorSource::Onnx),
        Err(e) => (
            Arc::new(PersistencePredictor),
            PredictorSource::Persistence {
                reason: e.to_string(),
            },
        ),
    }
}

/// Build the shared application state from configuration
pub async fn build_state(
    config: &ServiceConfig,
    health_registry: HealthRegistry,
    logger: StructuredLogger,
    shutdown: broadcast::Sender<()>,
) -> Arc<AppState> {
    health_registry.register(components::METADATA).await;
    health_registry.register(components::PREDICTOR).await;
    health_registry.register(components::HISTORY).await;

    let (metadata, metadata_source) = ModelMetadata::load_or_default(Some(config.metadata_path.as_path()));
    if let MetadataSource::Fallback { reason } = &metadata_source {
        logger.log_fallback(components::METADATA, reason);
        health_registry
            .set_degraded(components::METADATA, format!("using default metadata: {}", reason))
            .await;
    }

    let (predictor, predictor_source) = load_predictor(config, &metadata);
    if let PredictorSource::Persistence { reason } = &predictor_source {
        logger.log_fallback(components::PREDICTOR, reason);
        health_registry
            .set_degraded(components::PREDICTOR, format!("using persistence forecast: {}", reason))
            .await;
    }

    let history = HistorySeed::from_csv_path(&config.history_path);
    if history.latest().is_none() {
        let reason = format!("no seed derivable from {}", config.history_path.display());
        logger.log_fallback(components::HISTORY, &reason);
        health_registry.set_degraded(components::HISTORY, reason).await;
    }

    let model_type = predictor.model_type().to_string();
    ForecastMetrics::new().set_model_info(&model_type, predictor_source.as_str());
    info!(
        model_type = %model_type,
        source = predictor_source.as_str(),
        history_seed = ?history.latest(),
        zones = ?config.zone_catalog().names(),
        "Forecast engine configured"
    );

    let decisions = DecisionLayer::new(ZoneAllocator::default(), config.zone_catalog());
    let engine = Arc::new(ForecastEngine::new(metadata, predictor, history, decisions));
    let streams = StreamEmitter::new(
        engine.clone(),
        config.stream_config(),
        shutdown,
        logger.clone(),
    );

    Arc::new(AppState::new(engine, streams, health_registry, logger))
}
