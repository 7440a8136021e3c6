//! SDK configuration
//!
//! Transport settings and the named timeouts used by every capability call.
//! Stored as pretty-printed JSON; any field missing from the file takes its
//! default.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::protocol::{
    DEFAULT_BAUD_RATE, DEFAULT_EXIT_TIMEOUT_MS, DEFAULT_INFERENCE_IDLE_TIMEOUT_MS,
    DEFAULT_MODEL_SETUP_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_SETUP_TIMEOUT_MS,
    DEFAULT_SYS_TIMEOUT_MS,
};

/// Errors that can occur while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved
        path: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// How to reach the module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Serial port name; empty picks the first likely port
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Per-read timeout on the port
    pub read_timeout_ms: u64,
    /// `host[:port]` of the StackFlow TCP service; used instead of the serial port when set.
    /// The port defaults to 10001.
    pub tcp_address: Option<String>,
    /// TCP connect timeout
    pub connect_timeout_ms: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: 10,
            tcp_address: None,
            connect_timeout_ms: 3000,
        }
    }
}

/// Named wait durations, overridable per call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Fixed wait for `exit` replies
    pub exit_ms: u64,
    /// Fixed wait for setup of units without a model
    pub setup_ms: u64,
    /// Fixed wait for setup of units that load a model
    pub model_setup_ms: u64,
    /// Idle window between streamed fragments
    pub inference_idle_ms: u64,
    /// Fixed wait for `sys` requests
    pub sys_ms: u64,
    /// Pause between two polls of the transport
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            exit_ms: DEFAULT_EXIT_TIMEOUT_MS,
            setup_ms: DEFAULT_SETUP_TIMEOUT_MS,
            model_setup_ms: DEFAULT_MODEL_SETUP_TIMEOUT_MS,
            inference_idle_ms: DEFAULT_INFERENCE_IDLE_TIMEOUT_MS,
            sys_ms: DEFAULT_SYS_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Timeouts {
    /// [`exit_ms`](Self::exit_ms) as a duration
    pub fn exit(&self) -> Duration {
        Duration::from_millis(self.exit_ms)
    }

    /// [`setup_ms`](Self::setup_ms) as a duration
    pub fn setup(&self) -> Duration {
        Duration::from_millis(self.setup_ms)
    }

    /// [`model_setup_ms`](Self::model_setup_ms) as a duration
    pub fn model_setup(&self) -> Duration {
        Duration::from_millis(self.model_setup_ms)
    }

    /// [`inference_idle_ms`](Self::inference_idle_ms) as a duration
    pub fn inference_idle(&self) -> Duration {
        Duration::from_millis(self.inference_idle_ms)
    }

    /// [`sys_ms`](Self::sys_ms) as a duration
    pub fn sys(&self) -> Duration {
        Duration::from_millis(self.sys_ms)
    }

    /// [`poll_interval_ms`](Self::poll_interval_ms) as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level SDK configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    /// How to reach the module
    pub transport: TransportSettings,
    /// Default waits
    pub timeouts: Timeouts,
    /// Protocol version to assume instead of asking the module, e.g. "v1.6"
    pub protocol_version: Option<String>,
}

impl ModuleConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_protocol_constants() {
        let t = Timeouts::default();
        assert_eq!(t.exit(), Duration::from_millis(100));
        assert_eq!(t.setup(), Duration::from_millis(5000));
        assert_eq!(t.model_setup(), Duration::from_millis(30000));
        assert_eq!(TransportSettings::default().baud_rate, 115200);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.json");
        fs::write(
            &path,
            r#"{"transport": {"port_name": "/dev/ttyS1"}, "timeouts": {"exit_ms": 250}}"#,
        )
        .unwrap();

        let config = ModuleConfig::load(&path).unwrap();
        assert_eq!(config.transport.port_name, "/dev/ttyS1");
        assert_eq!(config.transport.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.timeouts.exit_ms, 250);
        assert_eq!(config.timeouts.setup_ms, DEFAULT_SETUP_TIMEOUT_MS);
        assert_eq!(config.protocol_version, None);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.json");
        let mut config = ModuleConfig::default();
        config.transport.tcp_address = Some("192.168.20.24:10001".into());
        config.protocol_version = Some("v1.6".into());
        config.save(&path).unwrap();

        assert_eq!(ModuleConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ModuleConfig::load("/nonexistent/module.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/module.json"));
    }
}
