//! Battery command implementation.

use anyhow::{Context, Result};
use lywsd02_core::{GattTransport, SensorSession};

use lywsd02_cli::cli::OutputFormat;
use lywsd02_cli::format::format_battery;

pub async fn cmd_battery<T: GattTransport>(
    session: &mut SensorSession<T>,
    format: OutputFormat,
) -> Result<String> {
    let level = session
        .get_battery()
        .await
        .context("Failed to read battery")?;
    format_battery(level, format)
}
