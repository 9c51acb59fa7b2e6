//! Units command implementation.

use anyhow::{Context, Result};
use lywsd02_core::{Error, GattTransport, SensorSession, UnitPreference};

use lywsd02_cli::cli::{OutputFormat, UnitsAction};
use lywsd02_cli::format::format_units;

pub async fn cmd_units<T: GattTransport>(
    session: &mut SensorSession<T>,
    action: Option<UnitsAction>,
    format: OutputFormat,
) -> Result<String> {
    match action {
        None => {
            let unit = session.get_units().await.context("Failed to read units")?;
            format_units(unit, format)
        }
        Some(UnitsAction::Set { unit }) => {
            let unit = unit.parse::<UnitPreference>().map_err(Error::from)?;
            session
                .set_units(unit)
                .await
                .context("Failed to set units")?;
            match format {
                OutputFormat::Text => Ok(format!("Units set to {}\n", unit)),
                OutputFormat::Json => format_units(unit, format),
            }
        }
    }
}
