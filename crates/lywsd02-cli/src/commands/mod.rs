//! Command implementations for the CLI.
//!
//! Each command drives a [`SensorSession`] and returns the rendered output,
//! so the commands run the same against the mock transport in tests.

mod battery;
mod clock;
mod history;
mod read;
mod status;
mod units;

use anyhow::{Context, Result};
use lywsd02_core::{BleConfig, BleTransport, SensorSession, SessionConfig};

use lywsd02_cli::cli::OutputFormat;
use lywsd02_cli::config::Settings;

pub use battery::cmd_battery;
pub use clock::cmd_clock;
pub use history::cmd_history;
pub use read::cmd_read;
pub use status::cmd_status;
pub use units::cmd_units;

/// Build a session for the configured device over the system adapter.
pub async fn open_session(settings: &Settings) -> Result<SensorSession<BleTransport>> {
    let device = settings.require_device()?;

    if !settings.quiet && settings.format == OutputFormat::Text {
        eprintln!("Using device {}", device);
    }

    let transport =
        BleTransport::with_config(BleConfig::default().connect_timeout(settings.timeout))
            .await
            .context("Failed to open Bluetooth adapter")?;

    Ok(SensorSession::with_config(
        device,
        transport,
        session_config(settings),
    ))
}

/// Session settings from the merged flags and config file.
fn session_config(settings: &Settings) -> SessionConfig {
    let mut config = SessionConfig::default().tz_offset_override(settings.tz_offset);
    if let Some(timeout) = settings.notification_timeout {
        config = config.notification_timeout(timeout);
    }
    if let Some(interval) = settings.min_interval {
        config = config.min_fetch_interval(interval);
    }
    config
}
