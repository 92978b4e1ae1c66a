//! Dashboard configuration.
//!
//! Loaded from `~/.config/ivi-dash/config.toml` (or an explicit path), then
//! overridden by environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `IVI_SIGNAL_URL` | `signal.url` |
//! | `IVI_AGENT_URL` | `agent.base_url` |
//! | `IVI_LOG_LEVEL` | `log_level` |

use crate::error::{IviError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "ivi-dash";
const CONFIG_FILE: &str = "config.toml";

/// Signals the dashboard subscribes to when none are configured.
pub const DEFAULT_SUBSCRIPTIONS: &[&str] = &[
    "Vehicle.Speed",
    "Vehicle.Powertrain.CombustionEngine.Speed",
    "Vehicle.Powertrain.CombustionEngine.ECT",
    "Vehicle.Powertrain.TractionBattery.StateOfCharge.Current",
    "Vehicle.Powertrain.TractionBattery.CurrentVoltage",
    "Vehicle.Powertrain.TractionBattery.Temperature.Average",
    "Vehicle.Cabin.HVAC.AmbientAirTemperature",
    "Vehicle.TraveledDistance",
    "Vehicle.OBD.DTCList",
];

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DashboardConfig {
    pub signal: SignalConfig,
    pub agent: AgentConfig,
    pub render: RenderConfig,
    pub subscriptions: Vec<String>,
    pub log_level: String,
}

/// Signal server (VISS websocket) connection settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SignalConfig {
    pub url: String,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

/// Vehicle agent HTTP endpoint settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    pub base_url: String,
    pub connect_timeout_ms: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Minimum spacing between two store flushes.
    pub frame_interval_ms: u64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            signal: SignalConfig::default(),
            agent: AgentConfig::default(),
            render: RenderConfig::default(),
            subscriptions: DEFAULT_SUBSCRIPTIONS.iter().map(|s| s.to_string()).collect(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8090".to_string(),
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl SignalConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl AgentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 16,
        }
    }
}

impl RenderConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl DashboardConfig {
    /// Default config file location (`<config_dir>/ivi-dash/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Loads configuration from `path` (or the default location) and applies
    /// environment overrides. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut config = match path {
            Some(ref path) if path.exists() => Self::from_file(path)?,
            Some(ref path) => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file without applying overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Applies environment-style overrides through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("IVI_SIGNAL_URL") {
            self.signal.url = url;
        }
        if let Some(url) = lookup("IVI_AGENT_URL") {
            self.agent.base_url = url;
        }
        if let Some(level) = lookup("IVI_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.signal.url.trim().is_empty() {
            return Err(IviError::config("signal.url must not be empty"));
        }
        if self.agent.base_url.trim().is_empty() {
            return Err(IviError::config("agent.base_url must not be empty"));
        }
        if self.signal.initial_backoff_ms == 0 {
            return Err(IviError::config("signal.initial_backoff_ms must be > 0"));
        }
        if self.signal.max_backoff_ms < self.signal.initial_backoff_ms {
            return Err(IviError::config(
                "signal.max_backoff_ms must be >= signal.initial_backoff_ms",
            ));
        }
        if self.render.frame_interval_ms == 0 {
            return Err(IviError::config("render.frame_interval_ms must be > 0"));
        }
        Ok(())
    }
}
