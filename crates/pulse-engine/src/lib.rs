//! Streaming runtime for pulse.
//!
//! Drives the `pulse-core` engine from tokio tasks:
//! - [`StreamingService`]: lifecycle, tick-driven ingestion, metrics and
//!   data/status/metrics subscriptions
//! - [`DebounceCoordinator`]: debounced, single-flight filter recomputes
//! - [`scheduler`]: cancellable tick/delay tasks shared by both
//! - [`subscribe`]: the listener registry behind every `on_*` surface

pub mod debounce;
pub mod generator;
pub mod scheduler;
pub mod service;
pub mod subscribe;

pub use debounce::{DEFAULT_DEBOUNCE_WINDOW, DebounceCoordinator, FilterOutcome, FilterState};
pub use generator::ScenarioGenerator;
pub use service::{ConnectionError, StreamingService};
pub use subscribe::{Registry, Subscription};
