//! Filter conditions, criteria and builder helpers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::point::FieldValue;
use crate::types::ConditionId;

/// Comparison operator for a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    In,
    NotIn,
    Between,
    Gt,
    Lt,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::Between => "between",
            Self::Gt => "gt",
            Self::Lt => "lt",
        };
        f.pad(s)
    }
}

impl FromStr for FilterOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eq" => Ok(Self::Eq),
            "in" => Ok(Self::In),
            "not_in" => Ok(Self::NotIn),
            "between" => Ok(Self::Between),
            "gt" => Ok(Self::Gt),
            "lt" => Ok(Self::Lt),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

/// Error type for unknown operator strings.
#[derive(Debug, Clone)]
pub struct UnknownOperator(String);

impl fmt::Display for UnknownOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown filter operator: {}", self.0)
    }
}

impl std::error::Error for UnknownOperator {}

/// How a condition combines with the accumulated result of the chain so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    /// Narrow the running result (intersection). The default.
    #[default]
    And,
    /// Widen the running result (union).
    Or,
}

/// The value carried by a condition; shape must suit the operator.
///
/// `Eq`/`Gt`/`Lt` take a `Scalar`; `In`/`NotIn` a `List`; `Between` a
/// `List` of exactly two bounds, `[low, high]`. The two shapes are
/// unambiguous on the wire (scalar vs array), so any JSON array is a
/// `List` regardless of length; arity is checked per operator at
/// evaluation. A mismatched shape or arity makes the condition
/// malformed; it then matches nothing rather than erroring (see the
/// evaluator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(ScalarLiteral),
    List(Vec<ScalarLiteral>),
}

/// A scalar literal as it appears in a condition.
///
/// Dates travel as ISO-8601 strings and are promoted to instants when the
/// compared field is an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarLiteral {
    Number(f64),
    Text(String),
    Bool(bool),
}

impl ScalarLiteral {
    /// Converts to the evaluator's value type.
    #[must_use]
    pub fn to_field_value(&self) -> FieldValue {
        match self {
            Self::Number(n) => FieldValue::Number(*n),
            Self::Text(s) => FieldValue::Text(s.clone()),
            Self::Bool(b) => FieldValue::Bool(*b),
        }
    }
}

impl From<f64> for ScalarLiteral {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ScalarLiteral {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ScalarLiteral {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for ScalarLiteral {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// One predicate over a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// Unique within a criteria object, stable for the condition's lifetime.
    pub id: ConditionId,
    /// Field path; dotted paths reach into metadata (`metadata.status`).
    pub field: String,
    pub operator: FilterOperator,
    pub value: FilterValue,
    /// Connector to the preceding condition in the chain; `None` means And.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

impl FilterCondition {
    /// Creates a condition with a fresh generated ID.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            id: fresh_id(),
            field: field.into(),
            operator,
            value,
            logical_operator: None,
        }
    }

    /// Sets the connector to the preceding condition.
    #[must_use]
    pub fn with_logical_operator(mut self, op: LogicalOperator) -> Self {
        self.logical_operator = Some(op);
        self
    }

    /// The effective connector (And when unset).
    #[must_use]
    pub fn connector(&self) -> LogicalOperator {
        self.logical_operator.unwrap_or_default()
    }
}

/// Reserved nested grouping: an independent sub-chain of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub id: ConditionId,
    pub conditions: Vec<FilterCondition>,
    /// Connector combining this group's result into the top-level chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_operator: Option<LogicalOperator>,
}

impl FilterGroup {
    /// Creates a group with a fresh generated ID.
    #[must_use]
    pub fn new(conditions: Vec<FilterCondition>) -> Self {
        Self {
            id: fresh_id(),
            conditions,
            logical_operator: None,
        }
    }

    /// The effective connector (And when unset).
    #[must_use]
    pub fn connector(&self) -> LogicalOperator {
        self.logical_operator.unwrap_or_default()
    }
}

/// The full filter definition: an ordered chain plus optional groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub conditions: Vec<FilterCondition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub grouping: Vec<FilterGroup>,
}

impl FilterCriteria {
    /// Criteria that matches every observation.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Whether this criteria filters nothing out.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.conditions.is_empty() && self.grouping.is_empty()
    }

    /// Field paths referenced by any condition, including inside groups.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .map(|c| c.field.as_str())
            .chain(
                self.grouping
                    .iter()
                    .flat_map(|g| g.conditions.iter().map(|c| c.field.as_str())),
            )
    }
}

/// Relative date window options for [`relative_date_filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeWindow {
    LastHour,
    LastDay,
    LastWeek,
    LastMonth,
}

impl RelativeWindow {
    /// The span covered by this window.
    #[must_use]
    pub fn span(self) -> Duration {
        match self {
            Self::LastHour => Duration::hours(1),
            Self::LastDay => Duration::hours(24),
            Self::LastWeek => Duration::days(7),
            Self::LastMonth => Duration::days(30),
        }
    }
}

fn fresh_id() -> ConditionId {
    // A v4 UUID is never empty, so construction cannot fail.
    ConditionId::new(Uuid::new_v4().to_string()).unwrap_or_else(|_| unreachable!())
}

/// Builds a `Between` condition with ISO-8601 string bounds.
#[must_use]
pub fn date_range_filter(
    field: impl Into<String>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    logical_op: Option<LogicalOperator>,
) -> FilterCondition {
    let mut condition = FilterCondition::new(
        field,
        FilterOperator::Between,
        FilterValue::List(vec![
            ScalarLiteral::Text(start.to_rfc3339()),
            ScalarLiteral::Text(end.to_rfc3339()),
        ]),
    );
    condition.logical_operator = logical_op;
    condition
}

/// Builds a `Between` condition covering `[now - window, now]` at call time.
#[must_use]
pub fn relative_date_filter(field: impl Into<String>, window: RelativeWindow) -> FilterCondition {
    let now = Utc::now();
    date_range_filter(field, now - window.span(), now, None)
}

/// Builds a set-membership condition (`In` by default, or `NotIn`).
#[must_use]
pub fn categorical_filter(
    field: impl Into<String>,
    values: Vec<ScalarLiteral>,
    operator: FilterOperator,
    logical_op: Option<LogicalOperator>,
) -> FilterCondition {
    let mut condition = FilterCondition::new(field, operator, FilterValue::List(values));
    condition.logical_operator = logical_op;
    condition
}

/// Builds an `Eq` condition for a single category value.
#[must_use]
pub fn single_category_filter(
    field: impl Into<String>,
    value: impl Into<ScalarLiteral>,
    logical_op: Option<LogicalOperator>,
) -> FilterCondition {
    let mut condition =
        FilterCondition::new(field, FilterOperator::Eq, FilterValue::Scalar(value.into()));
    condition.logical_operator = logical_op;
    condition
}
