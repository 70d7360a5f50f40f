//! Core domain logic for the pulse streaming filter engine.
//!
//! This crate contains the fundamental types and algorithms for:
//! - Observations: time-stamped metric data points with open metadata
//! - Buffering: bounded, insertion-ordered storage with FIFO trimming
//! - Filtering: compound condition chains evaluated over a per-field index
//!
//! Everything here is synchronous and runtime-free; the `pulse-engine`
//! crate drives it from tokio tasks.

pub mod buffer;
pub mod config;
pub mod filter;
pub mod point;
pub mod types;

pub use buffer::{PushOutcome, StreamBuffer};
pub use config::{ConfigUpdate, StreamingConfig, StreamingMetrics};
pub use filter::{
    FilterCondition, FilterCriteria, FilterEvaluator, FilterIndex, FilterOperator, FilterStats,
    FilterValue, LogicalOperator, RelativeWindow, ScalarLiteral,
};
pub use point::{DataPoint, FieldValue};
pub use types::{ConditionId, DataScenario, PointId, StreamingStatus, ValidationError};
