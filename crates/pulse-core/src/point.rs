//! Time-stamped metric observations and field access.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::PointId;

/// A single time-stamped metric observation.
///
/// Points are immutable once created: components exchange owned copies,
/// never aliases into another component's buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPoint {
    /// Unique identifier for this observation.
    pub id: PointId,
    /// When the observation was taken.
    pub timestamp: DateTime<Utc>,
    /// The measured value.
    pub value: f64,
    /// Metric category (e.g. "cpu", "memory").
    pub category: String,
    /// Origin of the observation (e.g. a node name).
    pub source: String,
    /// Open-ended extra context; keys are irrelevant to ordering.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl DataPoint {
    /// Resolves a (possibly dotted) field path against this point.
    ///
    /// Top-level fields are `id`, `timestamp`, `value`, `category` and
    /// `source`. A path starting with `metadata.` traverses into the
    /// metadata object (e.g. `metadata.status`, `metadata.geo.region`).
    /// Returns `None` when the path does not resolve; an absent field
    /// never matches any filter condition.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<FieldValue> {
        match path {
            "id" => Some(FieldValue::Text(self.id.as_str().to_string())),
            "timestamp" => Some(FieldValue::Instant(self.timestamp)),
            "value" => Some(FieldValue::Number(self.value)),
            "category" => Some(FieldValue::Text(self.category.clone())),
            "source" => Some(FieldValue::Text(self.source.clone())),
            _ => {
                let rest = path.strip_prefix("metadata.")?;
                let mut keys = rest.split('.');
                let mut current = self.metadata.get(keys.next()?)?;
                for key in keys {
                    current = current.as_object()?.get(key)?;
                }
                FieldValue::from_json(current)
            }
        }
    }
}

/// A scalar value read from a point field or carried by a condition.
///
/// Numbers compare with `f64::total_cmp` so the type admits a total order
/// and can key hash maps and sorted index vectors. Values of different
/// variants order by variant; conditions comparing across variants never
/// match, so the cross-variant order only matters for index layout.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Instant(DateTime<Utc>),
    Bool(bool),
}

impl FieldValue {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(Self::Number),
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Whether two values are the same variant (and thus comparable).
    #[must_use]
    pub const fn variant_matches(&self, other: &Self) -> bool {
        self.variant_rank() == other.variant_rank()
    }

    pub(crate) const fn variant_rank(&self) -> u8 {
        match self {
            Self::Number(_) => 0,
            Self::Text(_) => 1,
            Self::Instant(_) => 2,
            Self::Bool(_) => 3,
        }
    }

    /// Reinterprets an ISO-8601 text value as an instant.
    ///
    /// Filter conditions carry date bounds as ISO strings; when the compared
    /// field is an instant, the bound is promoted so the comparison happens
    /// between instants rather than between a string and a date.
    #[must_use]
    pub fn promote_to_instant(&self) -> Option<Self> {
        match self {
            Self::Instant(_) => Some(self.clone()),
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| Self::Instant(dt.with_timezone(&Utc))),
            Self::Number(_) | Self::Bool(_) => None,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Instant(a), Self::Instant(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl Hash for FieldValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            Self::Number(n) => n.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Instant(t) => t.timestamp_nanos_opt().unwrap_or(i64::MAX).hash(state),
            Self::Bool(b) => b.hash(state),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Instant(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Instant(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_point() -> DataPoint {
        let mut metadata = Map::new();
        metadata.insert("status".to_string(), json!("healthy"));
        metadata.insert("geo".to_string(), json!({ "region": "eu-west" }));
        metadata.insert("tags".to_string(), json!(["a", "b"]));
        DataPoint {
            id: PointId::new("p1").unwrap(),
            timestamp: "2024-03-01T12:00:00Z".parse().unwrap(),
            value: 42.5,
            category: "cpu".to_string(),
            source: "node-a".to_string(),
            metadata,
        }
    }

    #[test]
    fn resolves_builtin_fields() {
        let point = sample_point();
        assert_eq!(point.field("value"), Some(FieldValue::Number(42.5)));
        assert_eq!(point.field("category"), Some(FieldValue::Text("cpu".into())));
        assert_eq!(point.field("source"), Some(FieldValue::Text("node-a".into())));
        assert_eq!(
            point.field("timestamp"),
            Some(FieldValue::Instant(point.timestamp))
        );
    }

    #[test]
    fn resolves_dotted_metadata_paths() {
        let point = sample_point();
        assert_eq!(
            point.field("metadata.status"),
            Some(FieldValue::Text("healthy".into()))
        );
        assert_eq!(
            point.field("metadata.geo.region"),
            Some(FieldValue::Text("eu-west".into()))
        );
    }

    #[test]
    fn unresolved_paths_are_absent() {
        let point = sample_point();
        assert_eq!(point.field("metadata.missing"), None);
        assert_eq!(point.field("nonexistent"), None);
        assert_eq!(point.field("metadata.geo.missing"), None);
        // Containers are not scalar field values.
        assert_eq!(point.field("metadata.tags"), None);
        assert_eq!(point.field("metadata.geo"), None);
    }

    #[test]
    fn number_ordering_is_total() {
        let mut values = vec![
            FieldValue::Number(3.0),
            FieldValue::Number(f64::NEG_INFINITY),
            FieldValue::Number(-1.5),
            FieldValue::Number(f64::NAN),
        ];
        values.sort();
        assert_eq!(values[0], FieldValue::Number(f64::NEG_INFINITY));
        assert_eq!(values[1], FieldValue::Number(-1.5));
        assert_eq!(values[2], FieldValue::Number(3.0));
    }

    #[test]
    fn iso_text_promotes_to_instant() {
        let bound = FieldValue::Text("2024-03-01T00:00:00Z".to_string());
        let promoted = bound.promote_to_instant().unwrap();
        let expected: DateTime<Utc> = "2024-03-01T00:00:00Z".parse().unwrap();
        assert_eq!(promoted, FieldValue::Instant(expected));

        assert!(FieldValue::Text("not a date".to_string())
            .promote_to_instant()
            .is_none());
    }

    #[test]
    fn point_serde_roundtrip() {
        let point = sample_point();
        let json = serde_json::to_string(&point).unwrap();
        let parsed: DataPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, point.id);
        assert_eq!(parsed.category, point.category);
        assert_eq!(parsed.metadata, point.metadata);
    }
}
