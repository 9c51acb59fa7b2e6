//! Example: Downloading History
//!
//! Optionally moves the history cursor, then downloads every record the
//! device sends.
//!
//! Run with: `cargo run --example download_history -- <DEVICE_ADDRESS> [FROM_INDEX]`

use std::env;

use lywsd02_core::{BleTransport, SensorSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let Some(address) = args.get(1) else {
        eprintln!("Usage: {} <DEVICE_ADDRESS> [FROM_INDEX]", args[0]);
        std::process::exit(1);
    };
    let from: Option<u32> = args.get(2).map(|s| s.parse()).transpose()?;

    let transport = BleTransport::new().await?;
    let mut session = SensorSession::new(address.as_str(), transport);

    session.connect().await?;
    let result = async {
        let counts = session.record_counts().await?;
        println!(
            "Device holds {} records ({} written in total)",
            counts.current, counts.total
        );
        if let Some(index) = from {
            session.set_history_cursor(index).await?;
        }
        session.fetch_history().await
    }
    .await;
    session.disconnect().await?;

    let history = result?;
    println!("Downloaded {} records:", history.len());
    for record in &history {
        println!(
            "  #{:<6} {}  min {:6.2} °C {:3}%  max {:6.2} °C {:3}%",
            record.index,
            record.timestamp,
            record.min_temperature,
            record.min_humidity,
            record.max_temperature,
            record.max_humidity
        );
    }

    Ok(())
}
