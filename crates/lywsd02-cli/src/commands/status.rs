//! Status command implementation.

use anyhow::{Context, Result};
use lywsd02_core::{GattTransport, SensorSession};

use lywsd02_cli::cli::OutputFormat;
use lywsd02_cli::format::{DeviceStatus, format_status};

/// Read battery, units, clock and record counts over a single connection.
pub async fn cmd_status<T: GattTransport>(
    session: &mut SensorSession<T>,
    format: OutputFormat,
) -> Result<String> {
    session.connect().await.context("Failed to connect")?;

    // Collect everything first so the link is released even if a read fails.
    let battery = session.get_battery().await;
    let units = session.get_units().await;
    let clock = session.get_clock().await;
    let records = session.record_counts().await;
    let disconnected = session.disconnect().await;

    let (clock, tz_offset) = clock.context("Failed to read clock")?;
    let status = DeviceStatus {
        battery: battery.context("Failed to read battery")?,
        units: units.context("Failed to read units")?,
        clock,
        tz_offset,
        records: records.context("Failed to read record counts")?,
    };
    disconnected.context("Failed to disconnect")?;

    format_status(&status, format)
}
