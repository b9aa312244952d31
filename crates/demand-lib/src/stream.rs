//! Paced server-push forecast streams
//!
//! Every connection runs its own task with its own [`ForecastRun`]:
//!
//! ```text
//! Open -> (Emit -> Wait)* -> Closed
//! ```
//!
//! Emit reserves a slot in the connection's channel before computing the
//! next step, so no step is ever produced ahead of the consumer. Wait races
//! the pacing sleep against consumer disconnect and process shutdown.

use crate::engine::{ForecastEngine, RunParams};
use crate::error::ForecastResult;
use crate::observability::{ForecastMetrics, StructuredLogger};
use crate::predictor::ForecastRun;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Steps per stream before it closes on its own
pub const DEFAULT_STREAM_STEPS: u32 = 499;

/// Pacing of the raw forecast stream
pub const DEFAULT_FORECAST_INTERVAL: Duration = Duration::from_secs(2);

/// Pacing of the decision stream
pub const DEFAULT_DECISION_INTERVAL: Duration = Duration::from_secs(5);

/// Which payload a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// One-element JSON array of forecast points per event
    Forecast,
    /// One decision payload per event
    Decision,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Forecast => "forecast",
            StreamKind::Decision => "decision",
        }
    }
}

/// Stream pacing and length
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub max_steps: u32,
    pub forecast_interval: Duration,
    pub decision_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_STREAM_STEPS,
            forecast_interval: DEFAULT_FORECAST_INTERVAL,
            decision_interval: DEFAULT_DECISION_INTERVAL,
        }
    }
}

impl StreamConfig {
    pub fn interval(&self, kind: StreamKind) -> Duration {
        match kind {
            StreamKind::Forecast => self.forecast_interval,
            StreamKind::Decision => self.decision_interval,
        }
    }
}

/// Why a stream task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Disconnected,
    Exhausted,
    Shutdown,
    PredictorFailed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Disconnected => "disconnected",
            CloseReason::Exhausted => "exhausted",
            CloseReason::Shutdown => "shutdown",
            CloseReason::PredictorFailed => "predictor_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamPhase {
    Open,
    Emit,
    Wait,
    Closed(CloseReason),
}

/// One open stream: serialized events plus the task producing them
pub struct StreamHandle {
    pub id: u64,
    pub events: mpsc::Receiver<String>,
    pub task: JoinHandle<CloseReason>,
}

impl StreamHandle {
    /// Event stream for the HTTP body; dropping it disconnects the producer
    pub fn into_stream(self) -> ReceiverStream<String> {
        ReceiverStream::new(self.events)
    }
}

/// Spawns per-connection stream tasks
#[derive(Clone)]
pub struct StreamEmitter {
    engine: Arc<ForecastEngine>,
    config: StreamConfig,
    shutdown: broadcast::Sender<()>,
    metrics: ForecastMetrics,
    logger: StructuredLogger,
    next_id: Arc<AtomicU64>,
}

impl StreamEmitter {
    pub fn new(
        engine: Arc<ForecastEngine>,
        config: StreamConfig,
        shutdown: broadcast::Sender<()>,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            engine,
            config,
            shutdown,
            metrics: ForecastMetrics::new(),
            logger,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open a stream with fresh state; the first event is emitted immediately
    pub fn open(&self, kind: StreamKind, params: RunParams) -> StreamHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(1);

        let task = tokio::spawn(run_stream(
            id,
            kind,
            params,
            self.engine.clone(),
            self.config.clone(),
            tx,
            self.shutdown.subscribe(),
            self.metrics.clone(),
            self.logger.clone(),
        ));

        StreamHandle {
            id,
            events: rx,
            task,
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_stream(
    id: u64,
    kind: StreamKind,
    params: RunParams,
    engine: Arc<ForecastEngine>,
    config: StreamConfig,
    tx: mpsc::Sender<String>,
    mut shutdown: broadcast::Receiver<()>,
    metrics: ForecastMetrics,
    logger: StructuredLogger,
) -> CloseReason {
    let mut run = engine.forecaster().start(params.seed, params.origin);
    let interval = config.interval(kind);
    let mut emitted = 0u32;
    let mut phase = StreamPhase::Open;

    let reason = loop {
        phase = match phase {
            StreamPhase::Open => {
                metrics.stream_opened();
                logger.log_stream_opened(id, kind.as_str(), params.seed);
                StreamPhase::Emit
            }
            StreamPhase::Emit => {
                if run.step_index() >= config.max_steps {
                    StreamPhase::Closed(CloseReason::Exhausted)
                } else {
                    let permit = tokio::select! {
                        permit = tx.reserve() => permit.ok(),
                        _ = shutdown.recv() => None,
                    };
                    match permit {
                        None if tx.is_closed() => StreamPhase::Closed(CloseReason::Disconnected),
                        None => StreamPhase::Closed(CloseReason::Shutdown),
                        Some(permit) => match render_event(kind, &engine, &mut run) {
                            Ok(event) => {
                                permit.send(event);
                                emitted += 1;
                                metrics.inc_stream_events(kind.as_str());
                                if run.step_index() >= config.max_steps {
                                    StreamPhase::Closed(CloseReason::Exhausted)
                                } else {
                                    StreamPhase::Wait
                                }
                            }
                            Err(e) => {
                                warn!(stream_id = id, error = %e, "Stream step failed, closing");
                                StreamPhase::Closed(CloseReason::PredictorFailed)
                            }
                        },
                    }
                }
            }
            StreamPhase::Wait => {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => StreamPhase::Emit,
                    _ = tx.closed() => StreamPhase::Closed(CloseReason::Disconnected),
                    _ = shutdown.recv() => StreamPhase::Closed(CloseReason::Shutdown),
                }
            }
            StreamPhase::Closed(reason) => break reason,
        };
    };

    metrics.stream_closed();
    logger.log_stream_closed(id, kind.as_str(), emitted, reason.as_str());
    debug!(stream_id = id, step = run.step_index(), "Stream task finished");
    reason
}

fn render_event(
    kind: StreamKind,
    engine: &ForecastEngine,
    run: &mut ForecastRun<'_>,
) -> ForecastResult<String> {
    let point = run.step()?;
    let json = match kind {
        StreamKind::Forecast => serde_json::to_string(&[point])?,
        StreamKind::Decision => {
            serde_json::to_string(&engine.stream_decision(&point, run.step_index()))?
        }
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionLayer;
    use crate::metadata::ModelMetadata;
    use crate::models::{DecisionPayload, FeatureSlot, FeatureVector, ForecastPoint};
    use crate::predictor::Predictor;
    use crate::seed::HistorySeed;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::AtomicU32;

    /// `lag + 1`, failing from call `fail_at` onwards
    struct CountingPredictor {
        calls: AtomicU32,
        fail_at: u32,
    }

    impl CountingPredictor {
        fn new(fail_at: u32) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_at,
            }
        }
    }

    impl Predictor for CountingPredictor {
        fn predict(&self, features: &FeatureVector) -> anyhow::Result<f64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.fail_at {
                anyhow::bail!("model unavailable");
            }
            Ok(features.get(FeatureSlot::Lag).unwrap() + 1.0)
        }

        fn model_type(&self) -> &str {
            "counting"
        }
    }

    fn emitter(predictor: Arc<CountingPredictor>, max_steps: u32) -> (StreamEmitter, broadcast::Sender<()>) {
        let engine = Arc::new(ForecastEngine::new(
            ModelMetadata::default(),
            predictor,
            HistorySeed::unavailable(),
            DecisionLayer::default(),
        ));
        let (shutdown, _) = broadcast::channel(1);
        let config = StreamConfig {
            max_steps,
            ..StreamConfig::default()
        };
        (
            StreamEmitter::new(engine, config, shutdown.clone(), StructuredLogger::new("test")),
            shutdown,
        )
    }

    fn params() -> RunParams {
        RunParams {
            seed: 50.0,
            origin: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_forecast_stream_emits_chained_points_until_exhausted() {
        let (emitter, _shutdown) = emitter(Arc::new(CountingPredictor::new(u32::MAX)), 3);
        let mut handle = emitter.open(StreamKind::Forecast, params());

        let mut p50s = Vec::new();
        while let Some(event) = handle.events.recv().await {
            let points: Vec<ForecastPoint> = serde_json::from_str(&event).unwrap();
            assert_eq!(points.len(), 1);
            p50s.push(points[0].point_estimate);
        }

        assert_eq!(p50s, vec![51.0, 52.0, 53.0]);
        assert_eq!(handle.task.await.unwrap(), CloseReason::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_are_paced_by_interval() {
        let (emitter, _shutdown) = emitter(Arc::new(CountingPredictor::new(u32::MAX)), 10);
        let mut handle = emitter.open(StreamKind::Forecast, params());

        let start = tokio::time::Instant::now();
        handle.events.recv().await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
        handle.events.recv().await.unwrap();
        assert!(start.elapsed() >= DEFAULT_FORECAST_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_production() {
        let predictor = Arc::new(CountingPredictor::new(u32::MAX));
        let (emitter, _shutdown) = emitter(predictor.clone(), 499);
        let StreamHandle { mut events, task, .. } = emitter.open(StreamKind::Forecast, params());

        events.recv().await.unwrap();
        drop(events);

        assert_eq!(task.await.unwrap(), CloseReason::Disconnected);
        let calls = predictor.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(predictor.calls.load(Ordering::SeqCst), calls);
        assert!(calls <= 2, "producer ran ahead: {} predictions", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predictor_failure_ends_stream_without_event() {
        let (emitter, _shutdown) = emitter(Arc::new(CountingPredictor::new(3)), 499);
        let mut handle = emitter.open(StreamKind::Forecast, params());

        let mut received = 0;
        while handle.events.recv().await.is_some() {
            received += 1;
        }
        assert_eq!(received, 2);
        assert_eq!(handle.task.await.unwrap(), CloseReason::PredictorFailed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_closes_open_streams() {
        let (emitter, shutdown) = emitter(Arc::new(CountingPredictor::new(u32::MAX)), 499);
        let mut handle = emitter.open(StreamKind::Decision, params());

        handle.events.recv().await.unwrap();
        shutdown.send(()).unwrap();

        assert_eq!(handle.task.await.unwrap(), CloseReason::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_stream_payload() {
        let (emitter, _shutdown) = emitter(Arc::new(CountingPredictor::new(u32::MAX)), 2);
        let mut handle = emitter.open(StreamKind::Decision, params());

        let first: DecisionPayload =
            serde_json::from_str(&handle.events.recv().await.unwrap()).unwrap();
        let second: DecisionPayload =
            serde_json::from_str(&handle.events.recv().await.unwrap()).unwrap();

        // step 1: p50 51, Downtown multiplier 0.8
        assert!((first.zone_alloc[0].demand - 40.8).abs() < 1e-9);
        assert_eq!(first.zone_alloc.len(), 6);
        assert_eq!(first.reposition_ev[0].count, 2);
        assert_eq!(first.reposition_ice[0].count, 3);
        assert_eq!(second.reposition_ev[0].count, 3);
        assert_eq!(second.reposition_ice[0].count, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_streams_are_independent() {
        let (emitter, _shutdown) = emitter(Arc::new(CountingPredictor::new(u32::MAX)), 3);
        let mut a = emitter.open(StreamKind::Forecast, params());
        let mut b = emitter.open(
            StreamKind::Forecast,
            RunParams {
                seed: 10.0,
                ..params()
            },
        );
        assert_ne!(a.id, b.id);

        let first_a: Vec<ForecastPoint> = serde_json::from_str(&a.events.recv().await.unwrap()).unwrap();
        let first_b: Vec<ForecastPoint> = serde_json::from_str(&b.events.recv().await.unwrap()).unwrap();
        let second_a: Vec<ForecastPoint> = serde_json::from_str(&a.events.recv().await.unwrap()).unwrap();

        assert_eq!(first_a[0].point_estimate, 51.0);
        assert_eq!(first_b[0].point_estimate, 11.0);
        assert_eq!(second_a[0].point_estimate, 52.0);
    }
}
