//! Observability for the forecast service
//!
//! Provides:
//! - Prometheus metrics (prediction latency, request and stream counters, model info)
//! - Structured JSON logging events with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for single-step inference latency (seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ForecastMetricsInner> = OnceLock::new();

/// Prometheus collectors behind every [`ForecastMetrics`] handle
struct ForecastMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounter,
    prediction_errors_total: IntCounter,
    requests_total: IntCounterVec,
    active_streams: IntGauge,
    stream_events_total: IntCounterVec,
    model_info: GaugeVec,
}

impl ForecastMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "demand_forecast_prediction_latency_seconds",
                "Time spent in one predictor call",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter!(
                "demand_forecast_predictions_total",
                "Total number of one-step predictions"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter!(
                "demand_forecast_prediction_errors_total",
                "Total number of failed predictor calls"
            )
            .expect("Failed to register prediction_errors_total"),

            requests_total: register_int_counter_vec!(
                "demand_forecast_requests_total",
                "Batch requests served, by endpoint and outcome",
                &["endpoint", "outcome"]
            )
            .expect("Failed to register requests_total"),

            active_streams: register_int_gauge!(
                "demand_forecast_active_streams",
                "Number of open streaming connections"
            )
            .expect("Failed to register active_streams"),

            stream_events_total: register_int_counter_vec!(
                "demand_forecast_stream_events_total",
                "Events pushed to streaming connections, by stream kind",
                &["kind"]
            )
            .expect("Failed to register stream_events_total"),

            model_info: register_gauge_vec!(
                "demand_forecast_model_info",
                "Currently loaded model",
                &["model_type", "source"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics; clones share one registry entry
#[derive(Clone)]
pub struct ForecastMetrics {
    _private: (),
}

impl Default for ForecastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastMetrics {
    /// Create a metrics handle (registers the collectors on first use)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ForecastMetricsInner {
        GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new)
    }

    /// Record one predictor call latency
    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Increment successful predictions counter
    pub fn inc_predictions(&self) {
        self.inner().predictions_total.inc();
    }

    /// Increment prediction errors counter
    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors_total.inc();
    }

    /// Count a batch request by endpoint and outcome (`ok`, `rejected` or `error`)
    pub fn inc_requests(&self, endpoint: &str, outcome: &str) {
        self.inner()
            .requests_total
            .with_label_values(&[endpoint, outcome])
            .inc();
    }

    /// Track a newly opened streaming connection
    pub fn stream_opened(&self) {
        self.inner().active_streams.inc();
    }

    /// Release a streaming connection
    pub fn stream_closed(&self) {
        self.inner().active_streams.dec();
    }

    /// Currently open streaming connections
    pub fn active_streams(&self) -> i64 {
        self.inner().active_streams.get()
    }

    /// Increment events sent counter for a stream kind
    pub fn inc_stream_events(&self, kind: &str) {
        self.inner().stream_events_total.with_label_values(&[kind]).inc();
    }

    /// Update loaded model info; only one label set is live at a time
    pub fn set_model_info(&self, model_type: &str, source: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[model_type, source])
            .set(1.0);
    }
}

/// Structured logger for service lifecycle and stream events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model_type: &str, model_source: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            model_type = %model_type,
            model_source = %model_source,
            "Demand forecast service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Demand forecast service shutting down"
        );
    }

    /// Log a startup fallback; these never surface to API callers
    pub fn log_fallback(&self, component: &str, reason: &str) {
        warn!(
            event = "startup_fallback",
            service = %self.service,
            component = %component,
            reason = %reason,
            "Using fallback configuration"
        );
    }

    /// Log a streaming connection being accepted
    pub fn log_stream_opened(&self, stream_id: u64, kind: &str, seed: f64) {
        info!(
            event = "stream_opened",
            service = %self.service,
            stream_id = stream_id,
            kind = %kind,
            seed = seed,
            "Streaming connection opened"
        );
    }

    /// Log a streaming connection ending, with its close reason
    pub fn log_stream_closed(&self, stream_id: u64, kind: &str, events: u32, reason: &str) {
        info!(
            event = "stream_closed",
            service = %self.service,
            stream_id = stream_id,
            kind = %kind,
            events = events,
            reason = %reason,
            "Streaming connection closed"
        );
    }

    /// Log a completed batch forecast or decision request
    pub fn log_forecast_served(&self, endpoint: &str, horizon: u32, seed: f64) {
        info!(
            event = "forecast_served",
            service = %self.service,
            endpoint = %endpoint,
            horizon = horizon,
            seed = seed,
            "Served batch forecast"
        );
    }
}
