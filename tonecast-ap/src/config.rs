//! Configuration loading and resolution
//!
//! Settings come from a TOML file resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TONECAST_CONFIG` environment variable
//! 3. OS config directory (`~/.config/tonecast/config.toml` on Linux)
//! 4. Compiled defaults (no file required)
//!
//! Example config:
//!
//! ```toml
//! port = 4750
//!
//! [playback]
//! desired_latency_ms = 300
//! buffer_count = 2
//!
//! [[channels]]
//! index = 0
//! name = "Kitchen"
//!
//! [[channels]]
//! index = 1
//! name = "Living Room"
//!
//! [catalog]
//! base_url = "https://catalog.example.com/api"
//! token = "secret"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Default HTTP port for the audio player daemon
pub const DEFAULT_PORT: u16 = 4750;

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen port
    pub port: u16,

    /// Playback engine settings
    pub playback: PlaybackConfig,

    /// Display names for sound cards, keyed by backend ordinal
    pub channels: Vec<ChannelName>,

    /// Remote catalogue endpoint, absent when catalogue players are unused
    pub catalog: Option<CatalogConfig>,
}

/// Engine buffering settings
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Total buffered latency across all slots, in milliseconds
    pub desired_latency_ms: u32,

    /// Number of pool slots the latency is divided across
    pub buffer_count: usize,
}

/// Display name for one sound card
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelName {
    /// Backend ordinal of the device
    pub index: usize,
    /// Name shown to clients
    pub name: String,
}

/// Remote catalogue endpoint settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Base URL of the catalogue API
    pub base_url: String,
    /// Bearer token sent with catalogue requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            playback: PlaybackConfig::default(),
            channels: Vec::new(),
            catalog: None,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            desired_latency_ms: 300,
            buffer_count: 2,
        }
    }
}

impl Config {
    /// Load configuration following the priority order in the module docs.
    ///
    /// A path given explicitly (CLI or environment) must exist and parse;
    /// a missing file at the OS default location falls back to defaults.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        // Priority 1: command-line argument
        if let Some(path) = cli_path {
            info!("Loading config from {} (command line)", path.display());
            return Self::from_file(path);
        }

        // Priority 2: environment variable
        if let Ok(path) = std::env::var("TONECAST_CONFIG") {
            info!("Loading config from {} (TONECAST_CONFIG)", path);
            return Self::from_file(Path::new(&path));
        }

        // Priority 3: OS config directory
        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        // Priority 4: compiled defaults
        warn!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Parse and validate a specific config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the playback engine cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.playback.buffer_count == 0 {
            return Err(Error::Config(
                "playback.buffer_count must be at least 1".to_string(),
            ));
        }
        if self.playback.desired_latency_ms == 0 {
            return Err(Error::Config(
                "playback.desired_latency_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured display name for a sound card, if any.
    pub fn channel_name(&self, index: usize) -> Option<&str> {
        self.channels
            .iter()
            .find(|c| c.index == index)
            .map(|c| c.name.as_str())
    }
}

/// OS-dependent default config file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tonecast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.playback.desired_latency_ms, 300);
        assert_eq!(config.playback.buffer_count, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
            port = 9000

            [playback]
            desired_latency_ms = 100
            buffer_count = 3

            [[channels]]
            index = 0
            name = "Kitchen"

            [[channels]]
            index = 2
            name = "Bedroom"

            [catalog]
            base_url = "https://catalog.example.com/api"
            token = "secret"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.playback.desired_latency_ms, 100);
        assert_eq!(config.playback.buffer_count, 3);
        assert_eq!(config.channel_name(0), Some("Kitchen"));
        assert_eq!(config.channel_name(1), None);
        assert_eq!(config.channel_name(2), Some("Bedroom"));
        let catalog = config.catalog.unwrap();
        assert_eq!(catalog.base_url, "https://catalog.example.com/api");
        assert_eq!(catalog.token.as_deref(), Some("secret"));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: Config = toml::from_str("port = 8080").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.playback.buffer_count, 2);
        assert!(config.channels.is_empty());
        assert!(config.catalog.is_none());
    }

    #[test]
    fn zero_buffer_count_is_rejected() {
        let config: Config = toml::from_str("[playback]\nbuffer_count = 0").unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = Config::from_file(Path::new("/nonexistent/tonecast.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
