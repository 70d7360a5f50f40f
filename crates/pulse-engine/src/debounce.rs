//! Debounced, single-flight filter recomputation.
//!
//! Rapid criteria or dataset changes coalesce into one recompute per
//! settled burst. The coordinator owns its own index and evaluator built
//! from the snapshot it was given; concurrent coordinators never share
//! index state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use pulse_core::filter::{FilterCriteria, FilterEvaluator, FilterIndex, FilterStats};
use pulse_core::point::DataPoint;

use crate::scheduler::{self, TaskHandle};
use crate::subscribe::{Registry, Subscription};

/// Default settle window after the last triggering change.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(300);

/// Consumer-visible filtering state.
#[derive(Debug, Clone)]
pub struct FilterState {
    /// True while a recompute is scheduled or executing.
    pub is_filtering: bool,
    /// Result of the latest completed recompute, original dataset order.
    pub filtered_data: Arc<Vec<DataPoint>>,
    pub filtered_data_count: usize,
    pub total_data_count: usize,
}

/// Published after each completed recompute.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub filtered_data: Arc<Vec<DataPoint>>,
    pub filtered_data_count: usize,
    pub total_data_count: usize,
    /// Whether another recompute is already scheduled or running.
    pub is_filtering: bool,
    /// How long the recompute took.
    pub elapsed: Duration,
}

struct Inner {
    criteria: FilterCriteria,
    data: Arc<Vec<DataPoint>>,
    /// Bumped on every wholesale dataset reset; appended batches keep it.
    data_version: u64,
    /// Index and evaluator are taken out for the duration of a recompute
    /// so evaluation never runs under this lock.
    index: Option<FilterIndex>,
    index_version: u64,
    evaluator: Option<FilterEvaluator>,
    stats: FilterStats,
    filtered: Arc<Vec<DataPoint>>,
    is_filtering: bool,
    pending: Option<TaskHandle>,
    /// A queued immediate follow-up recompute; only teardown cancels it
    /// (a settle timer superseding it would strand `running`).
    follow_up: Option<TaskHandle>,
    /// Supersession token for settle timers.
    generation: u64,
    running: bool,
    rerun_requested: bool,
    torn_down: bool,
}

/// Coalesces criteria/dataset changes into debounced, single-flight
/// filter recomputes.
///
/// Triggers restart a settle window; when it elapses without further
/// triggers, exactly one recompute runs against the then-current criteria
/// and dataset. A trigger arriving mid-recompute does not cancel it: the
/// in-flight result is still published (it reflects its start inputs) and
/// one follow-up recompute starts immediately after.
#[derive(Clone)]
pub struct DebounceCoordinator {
    inner: Arc<Mutex<Inner>>,
    results: Registry<FilterOutcome>,
    window: Duration,
}

impl std::fmt::Debug for DebounceCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("DebounceCoordinator")
            .field("window", &self.window)
            .field("is_filtering", &inner.is_filtering)
            .field("total_data_count", &inner.data.len())
            .finish_non_exhaustive()
    }
}

impl Default for DebounceCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE_WINDOW)
    }
}

impl DebounceCoordinator {
    /// Creates a coordinator with the given settle window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                criteria: FilterCriteria::identity(),
                data: Arc::new(Vec::new()),
                data_version: 0,
                index: None,
                index_version: 0,
                evaluator: Some(FilterEvaluator::new()),
                stats: FilterStats {
                    data_size: 0,
                    index_size: 0,
                    cache_size: 0,
                    indexed_fields: Vec::new(),
                },
                filtered: Arc::new(Vec::new()),
                is_filtering: false,
                pending: None,
                follow_up: None,
                generation: 0,
                running: false,
                rerun_requested: false,
                torn_down: false,
            })),
            results: Registry::new(),
            window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the filter criteria and schedules a debounced recompute.
    pub fn set_criteria(&self, criteria: FilterCriteria) {
        let mut inner = self.lock();
        inner.criteria = criteria;
        self.schedule(&mut inner);
    }

    /// Replaces the dataset wholesale; the index will be fully rebuilt.
    pub fn reset_data(&self, snapshot: Vec<DataPoint>) {
        let mut inner = self.lock();
        inner.data = Arc::new(snapshot);
        inner.data_version += 1;
        inner.index = None;
        self.schedule(&mut inner);
    }

    /// Appends a batch to the dataset; the index extends incrementally.
    pub fn append_data(&self, batch: Vec<DataPoint>) {
        if batch.is_empty() {
            return;
        }
        let mut inner = self.lock();
        Arc::make_mut(&mut inner.data).extend(batch);
        self.schedule(&mut inner);
    }

    /// Consumer-visible state snapshot.
    #[must_use]
    pub fn state(&self) -> FilterState {
        let inner = self.lock();
        FilterState {
            is_filtering: inner.is_filtering,
            filtered_data: Arc::clone(&inner.filtered),
            filtered_data_count: inner.filtered.len(),
            total_data_count: inner.data.len(),
        }
    }

    /// Diagnostics from the latest completed recompute, with the data
    /// size refreshed to the current dataset.
    #[must_use]
    pub fn filter_stats(&self) -> FilterStats {
        let inner = self.lock();
        FilterStats {
            data_size: inner.data.len(),
            ..inner.stats.clone()
        }
    }

    /// Subscribes to recompute publications.
    pub fn on_results<F>(&self, listener: F) -> Subscription<FilterOutcome>
    where
        F: Fn(&FilterOutcome) + Send + Sync + 'static,
    {
        self.results.subscribe(listener)
    }

    /// Cancels any pending timer and silences all listeners. No further
    /// notifications are delivered after this returns.
    pub fn shutdown(&self) {
        {
            let mut inner = self.lock();
            inner.torn_down = true;
            inner.pending = None;
            inner.follow_up = None;
            inner.rerun_requested = false;
        }
        self.results.clear();
        tracing::debug!("debounce coordinator shut down");
    }

    /// (Re)starts the settle window. Any previously pending timer is
    /// superseded: its handle is dropped (aborting the task) and its
    /// generation token goes stale.
    fn schedule(&self, inner: &mut Inner) {
        if inner.torn_down {
            return;
        }
        inner.is_filtering = true;
        inner.generation += 1;
        let generation = inner.generation;
        let coordinator = self.clone();
        inner.pending = Some(scheduler::delay(self.window, move || {
            coordinator.on_window_elapsed(generation);
        }));
    }

    fn on_window_elapsed(&self, generation: u64) {
        {
            let mut inner = self.lock();
            if inner.torn_down || generation != inner.generation {
                return;
            }
            inner.pending = None;
            if inner.running {
                // Single-flight: let the in-flight recompute finish, then
                // run once more with the newer inputs.
                inner.rerun_requested = true;
                return;
            }
            inner.running = true;
        }
        self.run_recompute();
    }

    /// Executes one recompute. Runs inside a scheduler task; the inner
    /// lock is held only to move state in and out, never during
    /// evaluation, so triggers stay cheap while a recompute is running.
    fn run_recompute(&self) {
        let (criteria, data, version, index, evaluator) = {
            let mut inner = self.lock();
            let index = match inner.index.take() {
                Some(index) if inner.index_version == inner.data_version => Some(index),
                _ => None,
            };
            (
                inner.criteria.clone(),
                Arc::clone(&inner.data),
                inner.data_version,
                index,
                inner.evaluator.take(),
            )
        };

        let started = Instant::now();
        let mut index = index.map_or_else(
            || FilterIndex::build_default(&data),
            |mut index| {
                // Cover any batches appended since the last recompute.
                index.extend(&data[index.covered()..]);
                index
            },
        );
        let mut evaluator = evaluator.unwrap_or_default();
        let filtered: Arc<Vec<DataPoint>> =
            Arc::new(evaluator.apply(&criteria, &data, &mut index));
        let elapsed = started.elapsed();
        let stats = evaluator.stats(data.len(), &index);

        let outcome = {
            let mut inner = self.lock();
            inner.running = false;
            if inner.torn_down {
                return;
            }
            // Only reinstall the index if the dataset was not reset while
            // we were evaluating; an index never mixes two snapshots.
            if inner.data_version == version {
                inner.index = Some(index);
                inner.index_version = version;
            }
            inner.evaluator = Some(evaluator);
            inner.stats = stats;
            inner.filtered = Arc::clone(&filtered);

            let follow_up = std::mem::take(&mut inner.rerun_requested);
            if follow_up {
                inner.running = true;
            } else {
                inner.is_filtering = inner.pending.is_some();
            }

            let outcome = FilterOutcome {
                filtered_data: filtered,
                filtered_data_count: inner.filtered.len(),
                total_data_count: data.len(),
                is_filtering: inner.is_filtering,
                elapsed,
            };

            if follow_up {
                let coordinator = self.clone();
                // Replacing the slot drops the handle of the task running
                // this very function; harmless, since abort cannot stop
                // synchronous code already past its last await point.
                inner.follow_up = Some(scheduler::immediate(move || {
                    coordinator.run_recompute();
                }));
            }
            outcome
        };

        // Publish outside the lock; the in-flight result is published even
        // when a follow-up is queued, since it faithfully reflects the
        // inputs at its start.
        self.results.emit(&outcome);
    }
}
