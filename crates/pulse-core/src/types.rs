//! Core type definitions with validation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// Buffer capacity must be at least one.
    #[error("buffer capacity must be greater than zero")]
    ZeroCapacity,

    /// Tick interval must be non-zero.
    #[error("tick interval must be greater than zero")]
    ZeroTickInterval,

    /// Invalid streaming status string.
    #[error("invalid streaming status: {value}")]
    InvalidStatus { value: String },

    /// Invalid data scenario string.
    #[error("invalid data scenario: {value}")]
    InvalidScenario { value: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated data point identifier.
    ///
    /// Point IDs must be non-empty strings and should be unique within the
    /// buffer; the generator guarantees uniqueness, injected test data is
    /// the caller's responsibility.
    PointId, "point ID"
);

define_string_id!(
    /// A validated filter condition identifier.
    ///
    /// Condition IDs must be non-empty and unique within a criteria object.
    /// The builder helpers generate fresh UUIDs.
    ConditionId, "condition ID"
);

/// Connection state of the streaming service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamingStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl StreamingStatus {
    /// Whether the service is actively producing data in this state.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for StreamingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.pad(s)
    }
}

impl FromStr for StreamingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disconnected" => Ok(Self::Disconnected),
            "connecting" => Ok(Self::Connecting),
            "connected" => Ok(Self::Connected),
            "error" => Ok(Self::Error),
            _ => Err(ValidationError::InvalidStatus {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for StreamingStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StreamingStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Named ingestion profile controlling rate and shape of generated data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataScenario {
    /// Noise around a stable baseline.
    #[default]
    Steady,
    /// Intermittent multi-x bursts over a quiet floor.
    Burst,
    /// Baseline that drifts upward over time.
    Ramp,
    /// Sparse, low-value traffic.
    Quiet,
}

impl DataScenario {
    /// All scenarios, for CLI listings and exhaustive tests.
    pub const ALL: [Self; 4] = [Self::Steady, Self::Burst, Self::Ramp, Self::Quiet];
}

impl fmt::Display for DataScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Steady => "steady",
            Self::Burst => "burst",
            Self::Ramp => "ramp",
            Self::Quiet => "quiet",
        };
        f.pad(s)
    }
}

impl FromStr for DataScenario {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "steady" => Ok(Self::Steady),
            "burst" => Ok(Self::Burst),
            "ramp" => Ok(Self::Ramp),
            "quiet" => Ok(Self::Quiet),
            _ => Err(ValidationError::InvalidScenario {
                value: s.to_string(),
            }),
        }
    }
}

impl Serialize for DataScenario {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DataScenario {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_rejects_empty() {
        assert!(PointId::new("").is_err());
        assert!(PointId::new("point-1").is_ok());
    }

    #[test]
    fn condition_id_serde_roundtrip() {
        let id = ConditionId::new("cond-123").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"cond-123\"");
        let parsed: ConditionId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn point_id_serde_rejects_empty() {
        let result: Result<PointId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn status_roundtrip_all_variants() {
        for status in [
            StreamingStatus::Disconnected,
            StreamingStatus::Connecting,
            StreamingStatus::Connected,
            StreamingStatus::Error,
        ] {
            let s = status.to_string();
            let parsed: StreamingStatus = s.parse().expect("should parse");
            assert_eq!(parsed, status, "roundtrip failed for {status:?}");
        }
    }

    #[test]
    fn scenario_roundtrip_all_variants() {
        for scenario in DataScenario::ALL {
            let s = scenario.to_string();
            let parsed: DataScenario = s.parse().expect("should parse");
            assert_eq!(parsed, scenario, "roundtrip failed for {scenario:?}");
        }
    }

    #[test]
    fn unknown_scenario_errors() {
        let result: Result<DataScenario, _> = "flood".parse();
        assert_eq!(
            result.unwrap_err(),
            ValidationError::InvalidScenario {
                value: "flood".to_string()
            }
        );
    }

    #[test]
    fn status_serde_uses_snake_case_strings() {
        let json = serde_json::to_string(&StreamingStatus::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
    }

    #[test]
    fn display_honors_width_and_alignment() {
        assert_eq!(format!("{:<8}", DataScenario::Steady), "steady  ");
        assert_eq!(format!("{:>9}", StreamingStatus::Error), "    error");
        assert_eq!(format!("{:<6}", PointId::new("p1").unwrap()), "p1    ");
    }
}
