//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use pulse_core::config::StreamingConfig;
use pulse_core::types::DataScenario;
use pulse_engine::DEFAULT_DEBOUNCE_WINDOW;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum number of points kept in the stream buffer.
    pub max_buffer_size: usize,
    /// Interval between generated batches, in milliseconds.
    pub tick_interval_ms: u64,
    /// Points generated per tick.
    pub points_per_tick: usize,
    /// Data generation scenario.
    pub scenario: DataScenario,
    /// Settle window before filter recomputes, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let streaming = StreamingConfig::default();
        Self {
            max_buffer_size: streaming.max_buffer_size,
            tick_interval_ms: u64::try_from(streaming.tick_interval.as_millis())
                .unwrap_or(u64::MAX),
            points_per_tick: streaming.points_per_tick,
            scenario: streaming.scenario,
            debounce_ms: u64::try_from(DEFAULT_DEBOUNCE_WINDOW.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (PULSE_*)
        figment = figment.merge(Env::prefixed("PULSE_"));

        figment.extract()
    }

    /// Translates the flat file/env config into the engine config.
    #[must_use]
    pub fn streaming(&self) -> StreamingConfig {
        StreamingConfig {
            max_buffer_size: self.max_buffer_size,
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            points_per_tick: self.points_per_tick,
            scenario: self.scenario,
        }
    }

    /// Settle window for the debounce coordinator.
    #[must_use]
    pub const fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Returns the platform-specific config directory for pulse.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("pulse"))
}
