//! Read command implementation.

use anyhow::{Context, Result};
use lywsd02_core::{GattTransport, SensorSession};

use lywsd02_cli::cli::OutputFormat;
use lywsd02_cli::format::format_sample;

pub async fn cmd_read<T: GattTransport>(
    session: &mut SensorSession<T>,
    format: OutputFormat,
) -> Result<String> {
    let sample = session
        .get_current_sample()
        .await
        .context("Failed to read current values")?;
    format_sample(&sample, format)
}
