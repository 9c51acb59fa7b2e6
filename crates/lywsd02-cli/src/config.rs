//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::warn;

use crate::cli::{Cli, OutputFormat};

/// Connection timeout when neither flag nor config sets one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default device address
    pub device: Option<String>,

    /// Connection timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Seconds to wait for each live-data or history notification
    pub notification_timeout_secs: Option<u64>,

    /// Minimum seconds between live-data fetches
    pub min_interval_secs: Option<u64>,

    /// Timezone offset in hours written when syncing the clock
    pub tz_offset: Option<i8>,

    /// Default output format ("text" or "json")
    pub format: Option<String>,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lywsd02")
            .join("config.toml")
    }

    /// Load config from the default path, or return default if it is missing
    /// or unreadable.
    pub fn load() -> Self {
        let path = Self::path();
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config file: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load config from `path`. A missing file yields the default config.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}

/// Effective settings after applying command-line flags over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub device: Option<String>,
    pub timeout: Duration,
    pub notification_timeout: Option<Duration>,
    pub min_interval: Option<Duration>,
    pub tz_offset: Option<i8>,
    pub format: OutputFormat,
    pub quiet: bool,
}

impl Settings {
    /// Merge flags and config. Flags win.
    pub fn resolve(cli: &Cli, config: &Config) -> Self {
        let format = cli.format.unwrap_or_else(|| {
            config
                .format
                .as_deref()
                .and_then(|name| {
                    let format = OutputFormat::from_name(name);
                    if format.is_none() {
                        warn!(format = name, "Unknown format in config, using text");
                    }
                    format
                })
                .unwrap_or_default()
        });

        Self {
            device: cli.device.clone().or_else(|| config.device.clone()),
            timeout: Duration::from_secs(
                cli.timeout
                    .or(config.timeout_secs)
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            notification_timeout: cli
                .notification_timeout
                .or(config.notification_timeout_secs)
                .map(Duration::from_secs),
            min_interval: config.min_interval_secs.map(Duration::from_secs),
            tz_offset: config.tz_offset,
            format,
            quiet: cli.quiet,
        }
    }

    /// The device address, or an error telling the user how to supply one.
    pub fn require_device(&self) -> Result<&str> {
        match self.device.as_deref() {
            Some(device) if !device.trim().is_empty() => Ok(device),
            _ => bail!(
                "No device specified. Use --device, set LYWSD02_DEVICE, or add `device` to {}",
                Config::path().display()
            ),
        }
    }
}
