//! Streaming service: lifecycle, tick-driven ingestion, metrics, pub/sub.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;

use pulse_core::buffer::StreamBuffer;
use pulse_core::config::{ConfigUpdate, StreamingConfig, StreamingMetrics};
use pulse_core::point::DataPoint;
use pulse_core::types::{DataScenario, StreamingStatus, ValidationError};

use crate::generator::ScenarioGenerator;
use crate::scheduler::{self, TaskHandle};
use crate::subscribe::{Registry, Subscription};

/// Simulated transport handshake latency.
const HANDSHAKE_LATENCY: Duration = Duration::from_millis(50);
/// Bound on how long `connect` waits while connecting.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Cadence of metrics recomputation, independent of the tick interval.
const METRICS_INTERVAL: Duration = Duration::from_secs(1);
/// EWMA weight given to the newest rate sample.
const RATE_ALPHA: f64 = 0.3;
/// Rough per-point footprint used for the memory gauge.
const APPROX_POINT_BYTES: f64 = 224.0;

/// Errors surfaced by the connection lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connect timeout elapsed while still connecting.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),
    /// The simulated transport dropped while connected.
    #[error("streaming transport lost")]
    TransportLost,
    /// The service has been shut down and accepts no further connects.
    #[error("streaming service is shut down")]
    ShutDown,
    /// A `disconnect` (or newer `connect`) superseded this attempt while
    /// its handshake was pending.
    #[error("connect attempt superseded")]
    Superseded,
}

struct Inner {
    config: StreamingConfig,
    buffer: StreamBuffer,
    status: StreamingStatus,
    generator: ScenarioGenerator,
    metrics: StreamingMetrics,
    /// Points ingested since the last metrics tick; O(1) per batch.
    ingested_since_metrics: u64,
    last_metrics_at: Option<Instant>,
    tick_task: Option<TaskHandle>,
    metrics_task: Option<TaskHandle>,
    /// Bumped by every connect start, disconnect and shutdown; a pending
    /// connect only completes if its captured value is still current.
    conn_seq: u64,
    spike: Option<SpikeState>,
    spike_seq: u64,
    fail_next_connect: bool,
    shut_down: bool,
}

struct SpikeState {
    /// `points_per_tick` captured when the spike started; restored at
    /// expiry regardless of config changes made in between.
    baseline: usize,
    seq: u64,
    _revert: TaskHandle,
}

/// Drives synthetic ingestion into a bounded buffer and fans out data,
/// status and metrics events to subscribers.
///
/// The service is cheap to clone; clones share state. Construct one at
/// composition time and hand clones to consumers, then call
/// [`StreamingService::shutdown`] when tearing the process down.
#[derive(Clone)]
pub struct StreamingService {
    inner: Arc<Mutex<Inner>>,
    data_subs: Registry<Vec<DataPoint>>,
    status_subs: Registry<StreamingStatus>,
    metrics_subs: Registry<StreamingMetrics>,
}

impl std::fmt::Debug for StreamingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("StreamingService")
            .field("status", &inner.status)
            .field("buffered", &inner.buffer.len())
            .finish_non_exhaustive()
    }
}

impl StreamingService {
    /// Creates a disconnected service with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: StreamingConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        let buffer = StreamBuffer::new(config.max_buffer_size)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                config,
                buffer,
                status: StreamingStatus::Disconnected,
                generator: ScenarioGenerator::new(),
                metrics: StreamingMetrics::default(),
                ingested_since_metrics: 0,
                last_metrics_at: None,
                tick_task: None,
                metrics_task: None,
                conn_seq: 0,
                spike: None,
                spike_seq: 0,
                fail_next_connect: false,
                shut_down: false,
            })),
            data_subs: Registry::new(),
            status_subs: Registry::new(),
            metrics_subs: Registry::new(),
        })
    }

    /// Creates a service with a deterministic generator, for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_seed(config: StreamingConfig, seed: u64) -> Result<Self, ValidationError> {
        let service = Self::new(config)?;
        service.lock().generator = ScenarioGenerator::seeded(seed);
        Ok(service)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: StreamingStatus) {
        let changed = Self::store_status(&mut self.lock(), status);
        self.publish_status(status, changed);
    }

    fn store_status(inner: &mut Inner, status: StreamingStatus) -> bool {
        let changed = inner.status != status;
        inner.status = status;
        changed
    }

    fn publish_status(&self, status: StreamingStatus, changed: bool) {
        if changed {
            tracing::info!(%status, "streaming status changed");
            self.status_subs.emit(&status);
        }
    }

    /// Connects the service and starts the ingestion cadence.
    ///
    /// Resolves once the status reaches `Connected`. Calling while already
    /// connected is a no-op that resolves immediately. A timeout while
    /// connecting surfaces as [`ConnectionError::Timeout`] and leaves the
    /// service in the `Error` state; calling `connect` again recovers. A
    /// `disconnect` (or newer `connect`) issued while the handshake is
    /// still pending wins: this attempt resolves to
    /// [`ConnectionError::Superseded`] without touching the status it
    /// would otherwise have set.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let (seq, failure_injected, changed) = {
            let mut inner = self.lock();
            if inner.shut_down {
                return Err(ConnectionError::ShutDown);
            }
            if inner.status.is_connected() {
                return Ok(());
            }
            inner.conn_seq += 1;
            let failure_injected = std::mem::take(&mut inner.fail_next_connect);
            let changed = Self::store_status(&mut inner, StreamingStatus::Connecting);
            (inner.conn_seq, failure_injected, changed)
        };
        self.publish_status(StreamingStatus::Connecting, changed);

        // Simulated transport establishment; an injected failure hangs the
        // handshake so the timeout path is exercised.
        let handshake = async {
            if failure_injected {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(HANDSHAKE_LATENCY).await;
        };
        if tokio::time::timeout(CONNECT_TIMEOUT, handshake).await.is_err() {
            let changed = {
                let mut inner = self.lock();
                if inner.conn_seq != seq {
                    return Err(ConnectionError::Superseded);
                }
                Self::store_status(&mut inner, StreamingStatus::Error)
            };
            self.publish_status(StreamingStatus::Error, changed);
            return Err(ConnectionError::Timeout(CONNECT_TIMEOUT));
        }

        let (tick_task, metrics_task) = self.build_tasks();
        let changed = {
            let mut inner = self.lock();
            if inner.shut_down {
                return Err(ConnectionError::ShutDown);
            }
            if inner.conn_seq != seq {
                return Err(ConnectionError::Superseded);
            }
            inner.tick_task = Some(tick_task);
            inner.metrics_task = Some(metrics_task);
            Self::store_status(&mut inner, StreamingStatus::Connected)
        };
        self.publish_status(StreamingStatus::Connected, changed);
        Ok(())
    }

    fn build_tasks(&self) -> (TaskHandle, TaskHandle) {
        let tick_task = {
            let inner = Arc::clone(&self.inner);
            let delay_source = {
                let inner = Arc::clone(&inner);
                move || {
                    inner
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .config
                        .tick_interval
                }
            };
            let data_subs = self.data_subs.clone();
            scheduler::repeat(delay_source, move || {
                let batch = {
                    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    if !inner.status.is_connected() {
                        return;
                    }
                    let scenario = inner.config.scenario;
                    let points = inner.config.points_per_tick;
                    let batch = inner.generator.next_batch(scenario, points, Utc::now());
                    if batch.is_empty() {
                        return;
                    }
                    let outcome = inner.buffer.push(batch.clone());
                    inner.ingested_since_metrics += outcome.appended as u64;
                    if outcome.trimmed > 0 {
                        tracing::debug!(trimmed = outcome.trimmed, "buffer trimmed oldest points");
                    }
                    batch
                };
                data_subs.emit(&batch);
            })
        };

        let metrics_task = {
            let inner = Arc::clone(&self.inner);
            let metrics_subs = self.metrics_subs.clone();
            scheduler::repeat(
                || METRICS_INTERVAL,
                move || {
                    let metrics = {
                        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
                        compute_metrics(&mut inner)
                    };
                    metrics_subs.emit(&metrics);
                },
            )
        };

        (tick_task, metrics_task)
    }

    /// Stops the ingestion cadence without clearing buffered history.
    ///
    /// Idempotent and synchronous: always lands on `Disconnected`, from
    /// any state, including while a `connect` handshake is still pending
    /// (that attempt then resolves to [`ConnectionError::Superseded`]).
    /// An already-dispatched notification completes normally.
    pub fn disconnect(&self) {
        let changed = {
            let mut inner = self.lock();
            inner.conn_seq += 1;
            inner.tick_task = None;
            inner.metrics_task = None;
            Self::store_status(&mut inner, StreamingStatus::Disconnected)
        };
        self.publish_status(StreamingStatus::Disconnected, changed);
    }

    /// Drops the simulated transport: status goes to `Error` and ticks stop.
    pub fn simulate_transport_loss(&self) {
        {
            let mut inner = self.lock();
            if !inner.status.is_connected() {
                return;
            }
            inner.tick_task = None;
            inner.metrics_task = None;
        }
        tracing::warn!("simulated transport loss");
        self.set_status(StreamingStatus::Error);
    }

    /// Makes the next `connect` attempt hang until its timeout.
    pub fn inject_connect_failure(&self) {
        self.lock().fail_next_connect = true;
    }

    /// Swaps the generation profile without losing buffered history.
    /// Takes effect on the next tick.
    pub fn change_scenario(&self, scenario: DataScenario) {
        self.lock().config.scenario = scenario;
        tracing::info!(%scenario, "scenario changed");
    }

    /// Merges a partial configuration update.
    ///
    /// Buffer capacity changes apply immediately (and may trim); cadence
    /// changes apply on the next scheduled tick.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged configuration is invalid; the
    /// current configuration is unchanged in that case.
    pub fn update_config(&self, update: &ConfigUpdate) -> Result<(), ValidationError> {
        let mut inner = self.lock();
        let merged = inner.config.merged(update)?;
        if merged.max_buffer_size != inner.buffer.capacity() {
            let trimmed = inner.buffer.set_capacity(merged.max_buffer_size)?;
            if trimmed > 0 {
                tracing::debug!(trimmed, "capacity change trimmed buffer");
            }
        }
        inner.config = merged;
        Ok(())
    }

    /// Empties the buffer and notifies data subscribers with an
    /// empty-batch marker.
    pub fn clear_buffer(&self) {
        self.lock().buffer.clear();
        self.data_subs.emit(&Vec::new());
    }

    /// Scales `points_per_tick` by `multiplier` for `duration`.
    ///
    /// The baseline captured at call time is restored at expiry, even if
    /// other config changes happen in between. A newer spike supersedes a
    /// pending revert without ratcheting the baseline.
    pub fn simulate_data_spike(&self, duration: Duration, multiplier: usize) {
        let mut inner = self.lock();
        let baseline = inner
            .spike
            .as_ref()
            .map_or(inner.config.points_per_tick, |spike| spike.baseline);
        inner.spike_seq += 1;
        let seq = inner.spike_seq;
        inner.config.points_per_tick = baseline.saturating_mul(multiplier.max(1));
        tracing::info!(
            baseline,
            multiplier,
            ?duration,
            "data spike started"
        );

        let revert_target = Arc::clone(&self.inner);
        let revert = scheduler::delay(duration, move || {
            let mut inner = revert_target.lock().unwrap_or_else(PoisonError::into_inner);
            // A newer spike owns the revert now.
            if inner.spike.as_ref().is_some_and(|spike| spike.seq == seq) {
                inner.config.points_per_tick = baseline;
                inner.spike = None;
                tracing::info!(baseline, "data spike reverted");
            }
        });
        // Replacing the state drops (and thereby cancels) any older revert.
        inner.spike = Some(SpikeState {
            baseline,
            seq,
            _revert: revert,
        });
    }

    /// Appends points directly, bypassing the generator and cadence.
    ///
    /// The data notification fires synchronously before this returns.
    pub fn inject_test_data(&self, points: Vec<DataPoint>) {
        let batch = {
            let mut inner = self.lock();
            let outcome = inner.buffer.push(points.clone());
            inner.ingested_since_metrics += outcome.appended as u64;
            points
        };
        self.data_subs.emit(&batch);
    }

    /// Immutable snapshot of the buffered data, oldest first.
    #[must_use]
    pub fn buffered_data(&self) -> Vec<DataPoint> {
        self.lock().buffer.snapshot()
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> StreamingStatus {
        self.lock().status
    }

    /// Most recently computed metrics.
    #[must_use]
    pub fn metrics(&self) -> StreamingMetrics {
        self.lock().metrics
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn config(&self) -> StreamingConfig {
        self.lock().config.clone()
    }

    /// Buffered points in the given category.
    #[must_use]
    pub fn data_by_category(&self, category: &str) -> Vec<DataPoint> {
        self.lock().buffer.by_category(category)
    }

    /// Buffered points from the given source.
    #[must_use]
    pub fn data_by_source(&self, source: &str) -> Vec<DataPoint> {
        self.lock().buffer.by_source(source)
    }

    /// Buffered points within an inclusive time range.
    #[must_use]
    pub fn data_by_time_range(
        &self,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Vec<DataPoint> {
        self.lock().buffer.by_time_range(start, end)
    }

    /// The most recent `count` buffered points, in arrival order.
    #[must_use]
    pub fn latest_data_points(&self, count: usize) -> Vec<DataPoint> {
        self.lock().buffer.latest(count)
    }

    /// Records the duration of the latest filter recompute, in ms.
    pub fn report_filter_time(&self, millis: f64) {
        self.lock().metrics.filter_time = millis.max(0.0);
    }

    /// Subscribes to new data batches (empty batch marks a clear).
    pub fn on_data<F>(&self, listener: F) -> Subscription<Vec<DataPoint>>
    where
        F: Fn(&Vec<DataPoint>) + Send + Sync + 'static,
    {
        self.data_subs.subscribe(listener)
    }

    /// Subscribes to status transitions.
    pub fn on_status_change<F>(&self, listener: F) -> Subscription<StreamingStatus>
    where
        F: Fn(&StreamingStatus) + Send + Sync + 'static,
    {
        self.status_subs.subscribe(listener)
    }

    /// Subscribes to periodic metrics updates.
    pub fn on_metrics_update<F>(&self, listener: F) -> Subscription<StreamingMetrics>
    where
        F: Fn(&StreamingMetrics) + Send + Sync + 'static,
    {
        self.metrics_subs.subscribe(listener)
    }

    /// Tears the service down: stops all tasks, silences all listeners.
    ///
    /// Subsequent `connect` calls fail with [`ConnectionError::ShutDown`].
    pub fn shutdown(&self) {
        {
            let mut inner = self.lock();
            inner.conn_seq += 1;
            inner.tick_task = None;
            inner.metrics_task = None;
            inner.spike = None;
            inner.status = StreamingStatus::Disconnected;
            inner.shut_down = true;
        }
        self.data_subs.clear();
        self.status_subs.clear();
        self.metrics_subs.clear();
        tracing::debug!("streaming service shut down");
    }
}

#[expect(
    clippy::cast_precision_loss,
    reason = "metric gauges are approximations; precision loss is immaterial"
)]
fn compute_metrics(inner: &mut Inner) -> StreamingMetrics {
    let now = Instant::now();
    let elapsed = inner
        .last_metrics_at
        .map_or(METRICS_INTERVAL, |at| now.duration_since(at))
        .as_secs_f64()
        .max(f64::EPSILON);
    let sample = inner.ingested_since_metrics as f64 / elapsed;
    inner.ingested_since_metrics = 0;
    inner.last_metrics_at = Some(now);

    let previous = inner.metrics.data_points_per_second;
    let rate = if previous == 0.0 {
        sample
    } else {
        RATE_ALPHA * sample + (1.0 - RATE_ALPHA) * previous
    };

    let tick_millis = inner.config.tick_interval.as_secs_f64() * 1000.0;
    inner.metrics = StreamingMetrics {
        fps: (1000.0 / tick_millis.max(1.0)).min(60.0),
        memory_usage: inner.buffer.len() as f64 * APPROX_POINT_BYTES,
        data_points_per_second: rate,
        render_time: (inner.config.points_per_tick as f64 * 0.05).min(tick_millis),
        filter_time: inner.metrics.filter_time,
    };
    inner.metrics
}
