//! Configuration module
//!
//! Handles loading and saving VoxLink configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::session::SessionConfig;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// USB device selection
    #[serde(default)]
    pub usb: UsbConfig,

    /// Protocol timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Download behavior
    #[serde(default)]
    pub download: DownloadConfig,
}

/// USB device selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsbConfig {
    /// Restrict to one product id (any supported model if unset)
    pub product_id: Option<u16>,
}

/// Protocol timeouts, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Deadline for one command/response exchange
    #[serde(default = "default_command_timeout_ms")]
    pub command_ms: u64,

    /// Per-chunk deadline during file downloads
    #[serde(default = "default_chunk_timeout_ms")]
    pub chunk_ms: u64,
}

fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_chunk_timeout_ms() -> u64 {
    10_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command_ms: default_command_timeout_ms(),
            chunk_ms: default_chunk_timeout_ms(),
        }
    }
}

/// Download behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory downloaded recordings are written to
    pub output_dir: Option<PathBuf>,

    /// Overwrite existing files instead of failing
    #[serde(default)]
    pub overwrite: bool,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            overwrite: false,
        }
    }
}

impl Config {
    /// Default config file location (`~/.config/voxlink/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxlink").join("config.toml"))
    }

    /// Load configuration from a specific path
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load from the default location
    pub fn load_default() -> ConfigResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Timeouts in the form the session consumes
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            command_timeout: Duration::from_millis(self.timeouts.command_ms),
            chunk_timeout: Duration::from_millis(self.timeouts.chunk_ms),
        }
    }
}

/// Generate a commented sample configuration
pub fn generate_sample_config() -> String {
    let sample = Config::default();
    let body = toml::to_string_pretty(&sample).unwrap_or_default();
    format!(
        "# VoxLink configuration\n\
         # Timeouts are in milliseconds.\n\n{}",
        body
    )
}
