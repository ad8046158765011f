//! Configuration loading using Figment.
//!
//! Values are merged in this order, later sources winning:
//! 1. Built-in defaults (5 minute window, 30000 samples, 115200 baud)
//! 2. `config/volta.toml`, or the file passed with `--config`
//! 3. Environment variables prefixed with `VOLTA_DAQ_`, nested keys separated by `__`
//!
//! # Example
//! ```no_run
//! use volta_daq::config::AppConfig;
//!
//! // VOLTA_DAQ_ACQUISITION__TARGET_COUNT=1000 overrides the file value
//! let config = AppConfig::load()?;
//! config.validate()?;
//! let plan = config.acquisition.plan()?;
//! # Ok::<(), volta_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use crate::pacing::AcquisitionPlan;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/volta.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Acquisition window and sample count
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    /// Serial transport settings
    #[serde(default)]
    pub serial: SerialConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Acquisition plan configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Total measurement window in minutes
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,
    /// Number of samples to collect within the window
    #[serde(default = "default_target_count")]
    pub target_count: usize,
}

/// Serial transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port path; discovered automatically when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Communication speed
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// How long the consumer waits for a line before giving up on this round
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// How long stale input is drained after opening the port
    #[serde(default = "default_discard_timeout")]
    pub discard_timeout_ms: u64,
    /// Lines buffered between the reader task and the session
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Poll interval while waiting for a port to appear
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_ms: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_window_minutes() -> u64 {
    5
}

fn default_target_count() -> usize {
    30_000
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_read_timeout() -> u64 {
    1000
}

fn default_discard_timeout() -> u64 {
    50
}

fn default_channel_capacity() -> usize {
    100
}

fn default_discovery_interval() -> u64 {
    2000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            target_count: default_target_count(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
            discard_timeout_ms: default_discard_timeout(),
            channel_capacity: default_channel_capacity(),
            discovery_interval_ms: default_discovery_interval(),
        }
    }
}

impl AcquisitionConfig {
    /// Build the validated acquisition plan.
    pub fn plan(&self) -> AppResult<AcquisitionPlan> {
        AcquisitionPlan::from_minutes(self.window_minutes, self.target_count)
    }
}

impl SerialConfig {
    /// Read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Drain timeout as a `Duration`.
    pub fn discard_timeout(&self) -> Duration {
        Duration::from_millis(self.discard_timeout_ms)
    }

    /// Discovery poll interval as a `Duration`.
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }
}

impl AppConfig {
    /// Load configuration from the default file and environment variables.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path and environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("VOLTA_DAQ_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = self.application.log_level.to_lowercase();
        if !valid_levels.contains(&level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.acquisition.plan()?;

        if self.serial.baud_rate == 0 {
            return Err(DaqError::Configuration("baud_rate must be non-zero".into()));
        }
        if self.serial.channel_capacity == 0 {
            return Err(DaqError::Configuration(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.serial.port.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(DaqError::Configuration("serial port must not be empty".into()));
        }

        Ok(())
    }
}
