//! Example: Reading Current Sensor Values
//!
//! Connects to a LYWSD02 once and reads the live sample, battery, units and
//! clock over the same link.
//!
//! Run with: `cargo run --example read_sensor -- <DEVICE_ADDRESS>`

use std::env;

use lywsd02_core::{BleTransport, SensorSession};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let address = if args.len() > 1 {
        &args[1]
    } else {
        eprintln!("Usage: {} <DEVICE_ADDRESS>", args[0]);
        eprintln!();
        eprintln!("Example:");
        eprintln!("  {} E7:2E:00:B1:38:96", args[0]);
        std::process::exit(1);
    };

    let transport = BleTransport::new().await?;
    let mut session = SensorSession::new(address.as_str(), transport);

    println!("Connecting to {}...", address);
    session.connect().await?;

    // Collect results first so the link is released even if one read fails.
    let sample = session.get_current_sample().await;
    let battery = session.get_battery().await;
    let units = session.get_units().await;
    let clock = session.get_clock().await;
    session.disconnect().await?;

    let sample = sample?;
    println!();
    println!("Current Readings:");
    println!("  Temperature: {:.2} °C", sample.temperature);
    println!("  Humidity:    {}%", sample.humidity);
    if let Some(mv) = sample.voltage_mv {
        println!("  Voltage:     {} mV", mv);
    }
    println!("  Battery:     {}%", battery?);
    println!("  Units:       {}", units?);

    let (time, offset) = clock?;
    println!("  Clock:       {} (UTC{:+})", time, offset);

    Ok(())
}
