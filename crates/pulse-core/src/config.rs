//! Streaming service configuration and throughput metrics.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{DataScenario, ValidationError};

/// Configuration for the streaming service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Maximum number of buffered points; overflow trims oldest-first.
    /// Default: 10000.
    pub max_buffer_size: usize,

    /// Interval between ingestion ticks.
    /// Default: 100 ms.
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,

    /// How many points each tick generates before scenario shaping.
    /// Default: 10.
    pub points_per_tick: usize,

    /// Active generation profile.
    pub scenario: DataScenario,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 10_000,
            tick_interval: Duration::from_millis(100),
            points_per_tick: 10,
            scenario: DataScenario::Steady,
        }
    }
}

impl StreamingConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer capacity or tick interval is zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_buffer_size == 0 {
            return Err(ValidationError::ZeroCapacity);
        }
        if self.tick_interval.is_zero() {
            return Err(ValidationError::ZeroTickInterval);
        }
        Ok(())
    }

    /// Applies a partial update, returning the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the merged result fails validation; `self` is
    /// unchanged in that case.
    pub fn merged(&self, update: &ConfigUpdate) -> Result<Self, ValidationError> {
        let merged = Self {
            max_buffer_size: update.max_buffer_size.unwrap_or(self.max_buffer_size),
            tick_interval: update.tick_interval.unwrap_or(self.tick_interval),
            points_per_tick: update.points_per_tick.unwrap_or(self.points_per_tick),
            scenario: update.scenario.unwrap_or(self.scenario),
        };
        merged.validate()?;
        Ok(merged)
    }
}

/// A partial configuration update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub max_buffer_size: Option<usize>,
    #[serde(default, with = "option_duration_millis")]
    pub tick_interval: Option<Duration>,
    pub points_per_tick: Option<usize>,
    pub scenario: Option<DataScenario>,
}

/// Throughput metrics published on a fixed cadence.
///
/// Values are never retroactively corrected: each publication reflects the
/// state at its computation instant. `fps` and `render_time` exist for the
/// dashboard feed shape; with no renderer in this engine they are derived
/// from the tick cadence rather than measured frame timings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamingMetrics {
    /// Approximate update rate the dashboard would redraw at.
    pub fps: f64,
    /// Approximate buffer footprint in bytes.
    pub memory_usage: f64,
    /// Exponentially-weighted ingestion rate.
    pub data_points_per_second: f64,
    /// Derived per-update cost in milliseconds.
    pub render_time: f64,
    /// Duration of the most recent filter recompute in milliseconds.
    pub filter_time: f64,
}

impl Default for StreamingMetrics {
    fn default() -> Self {
        Self {
            fps: 0.0,
            memory_usage: 0.0,
            data_points_per_second: 0.0,
            render_time: 0.0,
            filter_time: 0.0,
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

mod option_duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::duration_millis::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let millis = Option::<u64>::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(StreamingConfig::default().validate().is_ok());
    }

    #[test]
    fn merge_keeps_unset_fields() {
        let config = StreamingConfig::default();
        let update = ConfigUpdate {
            points_per_tick: Some(50),
            ..ConfigUpdate::default()
        };
        let merged = config.merged(&update).unwrap();
        assert_eq!(merged.points_per_tick, 50);
        assert_eq!(merged.max_buffer_size, config.max_buffer_size);
        assert_eq!(merged.tick_interval, config.tick_interval);
        assert_eq!(merged.scenario, config.scenario);
    }

    #[test]
    fn merge_rejects_invalid_result() {
        let config = StreamingConfig::default();
        let update = ConfigUpdate {
            max_buffer_size: Some(0),
            ..ConfigUpdate::default()
        };
        assert!(config.merged(&update).is_err());

        let update = ConfigUpdate {
            tick_interval: Some(Duration::ZERO),
            ..ConfigUpdate::default()
        };
        assert!(config.merged(&update).is_err());
    }

    #[test]
    fn config_serde_uses_millis() {
        let config = StreamingConfig {
            tick_interval: Duration::from_millis(250),
            ..StreamingConfig::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["tick_interval"], 250);
        let parsed: StreamingConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }
}
