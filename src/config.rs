//! Dashboard configuration using Figment
//!
//! Configuration is loaded from:
//! 1. Built-in defaults (every section is optional)
//! 2. `config/dashboard.toml` (or an explicit path)
//! 3. Environment variables prefixed with `CIRCUIT_DAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use circuit_daq::config::DashboardConfig;
//!
//! let config = DashboardConfig::load()?;
//! config.validate()?;
//! println!("Backend: {}", config.backend.base_url);
//! # Ok::<(), circuit_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use crate::measurement::{MeasurementBounds, MeasurementSettings};
use crate::relay_map::RelayTable;
use crate::validation::{is_not_empty, is_valid_url};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/dashboard.toml";

/// Prefix for environment overrides, e.g. `CIRCUIT_DAQ_BACKEND__BASE_URL`.
pub const ENV_PREFIX: &str = "CIRCUIT_DAQ_";

/// Top-level dashboard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Relay/ADC control service
    pub backend: BackendConfig,
    /// Accepted ranges for measurement settings
    pub bounds: MeasurementBounds,
    /// Component and circuit relay mapping
    pub relays: RelayTable,
    /// Capacitor discharge routine
    pub discharge: DischargeConfig,
    /// Initial measurement settings
    pub measurement: MeasurementSettings,
    /// Capture export
    pub export: ExportConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Circuit DAQ Console".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Control service connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the service, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl BackendConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Capacitor discharge routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DischargeConfig {
    /// Capacitor slots discharged before every run, in order
    pub capacitor_slots: Vec<String>,
    /// Resistor used when none is selected, and for every unselected capacitor
    pub default_resistor: String,
    /// Duration of each discharge in seconds
    pub duration_secs: f64,
}

impl Default for DischargeConfig {
    fn default() -> Self {
        Self {
            capacitor_slots: ["cs1", "cs2", "cs3", "cs4"]
                .iter()
                .map(|slot| slot.to_string())
                .collect(),
            default_resistor: "rz1".to_string(),
            duration_secs: 0.5,
        }
    }
}

/// Capture export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory export files are written to
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

impl DashboardConfig {
    /// Load configuration from `config/dashboard.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `CIRCUIT_DAQ_`.
    /// Example: `CIRCUIT_DAQ_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    ///
    /// A `[relays]` section in the file replaces the built-in relay table rather than
    /// merging into it, so a rewired board can drop components and the bypass rule.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path = path.as_ref();
        let mut config: DashboardConfig = Self::figment(path).extract()?;

        if Figment::from(Toml::file(path)).contains("relays") {
            config.relays = Self::overrides(path).extract_inner("relays")?;
        }
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(DashboardConfig::default())).merge(Self::overrides(path))
    }

    fn overrides(path: &Path) -> Figment {
        Figment::from(Toml::file(path)).merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(DaqError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if let Err(msg) = is_valid_url(&self.backend.base_url) {
            return invalid(format!(
                "Invalid backend.base_url '{}': {}",
                self.backend.base_url, msg
            ));
        }
        if self.backend.request_timeout_ms == 0 {
            return invalid("backend.request_timeout_ms must be positive".to_string());
        }

        let bounds = &self.bounds;
        if !bounds.samples.is_ordered()
            || !bounds.sample_rate.is_ordered()
            || !bounds.duration_secs.is_ordered()
        {
            return invalid("Every bound must satisfy min <= max".to_string());
        }
        if bounds.samples.min == 0 || bounds.sample_rate.min == 0 || bounds.duration_secs.min <= 0.0 {
            return invalid("Bounds must be positive".to_string());
        }

        if self.discharge.capacitor_slots.is_empty() {
            return invalid("discharge.capacitor_slots must not be empty".to_string());
        }
        if is_not_empty(&self.discharge.default_resistor).is_err() {
            return invalid("discharge.default_resistor must be set".to_string());
        }
        if !(self.discharge.duration_secs.is_finite() && self.discharge.duration_secs > 0.0) {
            return invalid(format!(
                "Invalid discharge.duration_secs {}. Must be positive",
                self.discharge.duration_secs
            ));
        }

        let relays = &self.relays;
        let mut required = vec![
            ("relays.power", &relays.power),
            ("relays.circuits.rl", &relays.circuits.rl),
            ("relays.circuits.rc", &relays.circuits.rc),
            ("relays.circuits.rlc", &relays.circuits.rlc),
        ];
        if let Some(bypass) = relays.bypass.as_ref().filter(|rule| rule.enabled) {
            required.push(("relays.bypass.relay", &bypass.relay));
        }
        for (key, relay) in required {
            if is_not_empty(relay.as_str()).is_err() {
                return invalid(format!("{} must name a relay", key));
            }
        }

        Ok(())
    }
}
