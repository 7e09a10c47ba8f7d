//! Configuration management for ddm
//!
//! Config file location:
//! - Linux: ~/.config/ddm/config.toml
//!
//! You can override the config location by setting `DDM_CONFIG_PATH`.
//! A missing file is not an error: every field has a default matching a stock
//! Debian-style layout.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Where logs and media assets live
    #[serde(default)]
    pub paths: PathsConfig,

    /// Loaded-driver probe settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Display settings for the hardware list
    #[serde(default)]
    pub display: DisplayConfig,

    /// Connectivity precondition for installs
    #[serde(default)]
    pub network: NetworkConfig,
}

impl Config {
    /// Load configuration from file or fall back to defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("DDM_CONFIG_PATH") {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(PathBuf::from(trimmed));
            }
        }

        let proj_dirs =
            ProjectDirs::from("org", "solydxk", "ddm").context("Could not determine project directories")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Effective configuration rendered as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding Xorg.*.log and syslog* files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Directory holding `images/<vendor>.png` logos
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            media_dir: default_media_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log")
}

fn default_media_dir() -> PathBuf {
    PathBuf::from("/usr/share/ddm")
}

/// Loaded-driver probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Number of bytes read from the start of each X server log
    #[serde(default = "default_xorg_banner_bytes")]
    pub xorg_banner_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            xorg_banner_bytes: default_xorg_banner_bytes(),
        }
    }
}

fn default_xorg_banner_bytes() -> usize {
    20
}

/// Display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Character budget for device labels
    #[serde(default = "default_label_width")]
    pub label_width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            label_width: default_label_width(),
        }
    }
}

fn default_label_width() -> usize {
    50
}

/// Connectivity check configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// URL probed before any install action
    #[serde(default = "default_check_url")]
    pub check_url: String,

    /// Connectivity probe timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            check_url: default_check_url(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_check_url() -> String {
    "http://www.google.com".to_string()
}

fn default_timeout() -> u64 {
    5
}
