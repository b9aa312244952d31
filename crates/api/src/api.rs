//! HTTP API: forecasts, decisions, live streams, health and metrics

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderName, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use chrono::Utc;
use demand_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::{ForecastMetrics, StructuredLogger},
    stream::{StreamEmitter, StreamHandle, StreamKind},
    ForecastEngine, ForecastError,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const DEFAULT_FORECAST_HORIZON: u32 = 24;
const DEFAULT_ZONE_HORIZON: u32 = 6;
const DEFAULT_DECISION_HORIZON: u32 = 12;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ForecastEngine>,
    pub streams: StreamEmitter,
    pub health_registry: HealthRegistry,
    pub metrics: ForecastMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        engine: Arc<ForecastEngine>,
        streams: StreamEmitter,
        health_registry: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            engine,
            streams,
            health_registry,
            metrics: ForecastMetrics::new(),
            logger,
        }
    }
}

/// Error body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum ApiError {
    Forecast(ForecastError),
    Query(QueryRejection),
}

impl From<ForecastError> for ApiError {
    fn from(e: ForecastError) -> Self {
        ApiError::Forecast(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::Query(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Forecast(e) => {
                let status = if e.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    warn!(error = %e, "Request failed");
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (
                    status,
                    ErrorBody {
                        error: e.to_string(),
                        code: e.code().to_string(),
                    },
                )
            }
            ApiError::Query(e) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: e.body_text(),
                    code: "invalid_query".to_string(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    pub horizon: Option<u32>,
    pub last_y: Option<f64>,
    pub start: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ZonesQuery {
    pub horizon: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    pub last_y: Option<f64>,
    pub start: Option<String>,
}

/// Record the outcome of a batch request and pass it through
fn track<T>(state: &AppState, endpoint: &str, result: Result<T, ApiError>) -> Result<T, ApiError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(ApiError::Forecast(e)) if !e.is_client_error() => "error",
        Err(_) => "rejected",
    };
    state.metrics.inc_requests(endpoint, outcome);
    result
}

/// Health check response - 200 while operational (degraded included), 503 otherwise
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}

async fn meta(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.meta())
}

async fn forecast(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let result = query.map_err(ApiError::from).and_then(|Query(q)| {
        let horizon = q.horizon.unwrap_or(DEFAULT_FORECAST_HORIZON);
        let params = state
            .engine
            .resolve(q.last_y, q.start.as_deref(), Utc::now())?;
        let points = state.engine.forecast_from(params, horizon)?;
        state
            .logger
            .log_forecast_served("forecast", horizon, params.seed);
        Ok(points)
    });
    track(&state, "forecast", result).map(Json)
}

async fn forecast_zones(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ZonesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let result = query.map_err(ApiError::from).and_then(|Query(q)| {
        let horizon = q.horizon.unwrap_or(DEFAULT_ZONE_HORIZON);
        Ok(state.engine.zone_forecast(horizon, Utc::now())?)
    });
    track(&state, "forecast_zones", result).map(Json)
}

async fn decision_layer(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let result = query.map_err(ApiError::from).and_then(|Query(q)| {
        let horizon = q.horizon.unwrap_or(DEFAULT_DECISION_HORIZON);
        let params = state
            .engine
            .resolve(q.last_y, q.start.as_deref(), Utc::now())?;
        let payload = state.engine.decision_from(params, horizon)?;
        state
            .logger
            .log_forecast_served("decision_layer", horizon, params.seed);
        Ok(payload)
    });
    track(&state, "decision_layer", result).map(Json)
}

async fn stream(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    open_stream(&state, StreamKind::Forecast, query)
}

async fn decision_stream(
    State(state): State<Arc<AppState>>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    open_stream(&state, StreamKind::Decision, query)
}

fn open_stream(
    state: &AppState,
    kind: StreamKind,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(q) = query?;
    let params = state.engine.resolve_within(
        q.last_y,
        q.start.as_deref(),
        Utc::now(),
        state.streams.config().max_steps,
    )?;
    Ok(sse_response(state.streams.open(kind, params)))
}

/// Wrap a stream handle as `text/event-stream`, one `data:` frame per event
fn sse_response(handle: StreamHandle) -> Response {
    let events = handle
        .into_stream()
        .map(|data| Ok::<_, Infallible>(Event::default().data(data)));

    (
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        Sse::new(events),
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/meta", get(meta))
        .route("/forecast", get(forecast))
        .route("/forecast_zones", get(forecast_zones))
        .route("/decision_layer", get(decision_layer))
        .route("/stream", get(stream))
        .route("/decision_stream", get(decision_stream))
        .with_state(state)
}

/// CORS policy for the configured browser origins
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

/// Start the API server; returns once `shutdown` fires and connections drain
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    cors_origins: &[String],
    shutdown: broadcast::Sender<()>,
) -> anyhow::Result<()> {
    let app = create_router(state)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let mut shutdown_rx = shutdown.subscribe();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    Ok(())
}
