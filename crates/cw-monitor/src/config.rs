//! Monitor configuration, loadable from TOML with an environment override
//! for the port.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use cw_stream::ControllerSettings;

use crate::port::PortSettings;

/// Default config location when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/canwatch/monitor.toml";

/// Environment variable that overrides `port`.
pub const PORT_ENV: &str = "CANWATCH_PORT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no port configured (set `port` or CANWATCH_PORT)")]
    MissingPort,
}

/// How each refresh is written to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Redrawn fixed-width table.
    #[default]
    Table,
    /// One JSON object per refresh.
    Json,
}

/// Log line format on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

/// Top-level configuration for the monitor.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Device or file to read, e.g. `/dev/ttyACM0`. `-` reads stdin.
    #[serde(default)]
    pub port: String,
    /// Serial line speed. Ignored for capture files and stdin.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Upper bound on one blocking serial read. Also bounds how long the
    /// reader takes to notice a stop request on a quiet bus.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Presentation refresh cadence in milliseconds.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,
    /// Frame channel capacity. Unbounded when absent.
    #[serde(default)]
    pub channel_capacity: Option<usize>,
    /// How long shutdown waits for the reader to release the port.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_ms: u64,
    /// Exit once the reader stops instead of showing the last rows until
    /// interrupted.
    #[serde(default)]
    pub exit_when_stopped: bool,
    #[serde(default)]
    pub output: OutputMode,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_baud() -> u32 {
    115200
}

fn default_read_timeout() -> u64 {
    500
}

fn default_refresh_interval() -> u64 {
    100
}

fn default_stop_timeout() -> u64 {
    1000
}

impl MonitorConfig {
    /// Load config from a TOML file path, falling back to defaults when the
    /// file does not exist, then apply the environment override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    message: e.to_string(),
                });
            }
        };
        let port_override = std::env::var(PORT_ENV).ok();
        Self::from_toml(&contents, port_override)
    }

    /// Parse config text, letting `port_override` replace `port`.
    pub fn from_toml(contents: &str, port_override: Option<String>) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(contents)?;
        if let Some(port) = port_override.filter(|p| !p.trim().is_empty()) {
            config.port = port;
        }
        if config.port.trim().is_empty() {
            return Err(ConfigError::MissingPort);
        }
        Ok(config)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }

    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            port: self.port.clone(),
            baud: self.baud,
            read_timeout: Duration::from_millis(self.read_timeout_ms.max(1)),
        }
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            channel_capacity: self.channel_capacity,
            stop_timeout: Duration::from_millis(self.stop_timeout_ms),
        }
    }
}
