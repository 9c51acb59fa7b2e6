//! History command implementation.

use anyhow::{Context, Result};
use lywsd02_core::{GattTransport, HistoryLog, SensorSession};
use tracing::info;

use lywsd02_cli::cli::OutputFormat;
use lywsd02_cli::format::format_history;

pub async fn cmd_history<T: GattTransport>(
    session: &mut SensorSession<T>,
    from: Option<u32>,
    format: OutputFormat,
) -> Result<String> {
    let history = match from {
        Some(index) => download_from(session, index).await?,
        None => session
            .fetch_history()
            .await
            .context("Failed to download history")?,
    };
    format_history(&history, format)
}

/// Move the cursor and download on the same connection.
async fn download_from<T: GattTransport>(
    session: &mut SensorSession<T>,
    index: u32,
) -> Result<HistoryLog> {
    session.connect().await.context("Failed to connect")?;

    info!(index, "Starting history download from index");
    let result = match session.set_history_cursor(index).await {
        Ok(()) => session
            .fetch_history()
            .await
            .context("Failed to download history"),
        Err(e) => Err(e).context("Failed to set history cursor"),
    };

    let disconnected = session.disconnect().await;
    let history = result?;
    disconnected.context("Failed to disconnect")?;
    Ok(history)
}
