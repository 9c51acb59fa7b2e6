//! Clock command implementation.

use anyhow::{Context, Result};
use lywsd02_core::{GattTransport, SensorSession};
use time::OffsetDateTime;

use lywsd02_cli::cli::{ClockAction, OutputFormat};
use lywsd02_cli::format::{format_clock, format_device_time};

pub async fn cmd_clock<T: GattTransport>(
    session: &mut SensorSession<T>,
    action: Option<ClockAction>,
    format: OutputFormat,
) -> Result<String> {
    match action {
        None => {
            let (time, offset) = session.get_clock().await.context("Failed to read clock")?;
            format_clock(time, offset, format)
        }
        Some(ClockAction::Sync { tz_offset }) => {
            if tz_offset.is_some() {
                session.set_tz_offset(tz_offset);
            }
            let now = OffsetDateTime::now_utc();
            let offset = session.tz_offset();
            session
                .set_clock(now)
                .await
                .context("Failed to set clock")?;
            match format {
                OutputFormat::Text => Ok(format!(
                    "Clock set to {} (UTC{:+})\n",
                    format_device_time(now, offset),
                    offset
                )),
                OutputFormat::Json => format_clock(now, offset, format),
            }
        }
    }
}
