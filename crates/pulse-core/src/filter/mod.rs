//! Indexed filter engine: conditions, per-field index, chain evaluation.

pub mod condition;
pub mod evaluate;
pub mod index;

pub use condition::{
    FilterCondition, FilterCriteria, FilterGroup, FilterOperator, FilterValue, LogicalOperator,
    RelativeWindow, ScalarLiteral, UnknownOperator, categorical_filter, date_range_filter,
    relative_date_filter, single_category_filter,
};
pub use evaluate::{FilterEvaluator, FilterStats};
pub use index::{DEFAULT_INDEXED_FIELDS, FilterIndex};
