//! Configuration types for a supervised driver session.
//!
//! [`DriverConfig`] describes how to launch and talk to one driver
//! executable: the binary path, model and platform selectors, extra
//! environment, the stop grace period, and an opaque block of multimodal
//! options forwarded to the process without interpretation.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors from loading or saving a driver configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid driver config: {0}")]
    Parse(String),
}

/// Target platform the driver should assume when planning OS actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Mac,
    Linux,
}

impl Platform {
    /// The snake_case wire form carried in the `start` command.
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Linux => "linux",
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Mac
        } else {
            Platform::Linux
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_stop_grace_ms() -> u64 {
    1000
}

/// Configuration for one driver supervisor instance.
///
/// Loaded from TOML or built in code. The `executable` is the already
/// resolved driver binary path; locating it (platform/arch search paths)
/// is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Path to the driver executable.
    pub executable: PathBuf,
    /// Model selector forwarded in the `start` command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Platform selector forwarded in the `start` command.
    #[serde(default)]
    pub platform: Platform,
    /// Extra environment variables for the spawned process.
    #[serde(default)]
    pub env: Vec<(String, String)>,
    /// How long `stop()` waits for a voluntary exit before force-killing.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
    /// Opaque multimodal options (audio/video/speech/tool settings)
    /// forwarded in the `start` command without interpretation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl DriverConfig {
    /// Create a configuration for an executable with all defaults.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            model: None,
            platform: Platform::default(),
            env: Vec::new(),
            stop_grace_ms: default_stop_grace_ms(),
            options: None,
        }
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The stop grace period as a [`Duration`].
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
