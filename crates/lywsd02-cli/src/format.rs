//! Output formatting for text and JSON.

use anyhow::Result;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use lywsd02_types::{HistoryLog, RecordCounts, SensorSample, UnitPreference};

use crate::cli::OutputFormat;

/// Everything the `status` command gathers in one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    pub battery: u8,
    pub units: UnitPreference,
    pub clock: OffsetDateTime,
    pub tz_offset: i8,
    pub records: RecordCounts,
}

fn as_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)? + "\n")
}

/// Render a device timestamp in the device's own timezone.
///
/// Offsets the `time` crate cannot represent fall back to UTC.
#[must_use]
pub fn format_device_time(time: OffsetDateTime, tz_offset: i8) -> String {
    let local = UtcOffset::from_hms(tz_offset, 0, 0)
        .map(|offset| time.to_offset(offset))
        .unwrap_or(time);
    local
        .format(&Rfc3339)
        .unwrap_or_else(|_| time.unix_timestamp().to_string())
}

fn rfc3339(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| time.unix_timestamp().to_string())
}

pub fn format_sample(sample: &SensorSample, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => as_json(sample),
        OutputFormat::Text => {
            let mut output = format!(
                "Temperature: {:>6.2} °C\nHumidity:    {:>6} %\n",
                sample.temperature, sample.humidity
            );
            if let Some(mv) = sample.voltage_mv {
                output.push_str(&format!("Voltage:     {:>6} mV\n", mv));
            }
            if let Some(level) = sample.battery_level {
                output.push_str(&format!("Battery:     {:>6} %\n", level));
            }
            Ok(output)
        }
    }
}

pub fn format_history(history: &HistoryLog, format: OutputFormat) -> Result<String> {
    #[derive(Serialize)]
    struct HistoryRecordJson {
        index: u32,
        timestamp: String,
        min_temperature: f64,
        min_humidity: u8,
        max_temperature: f64,
        max_humidity: u8,
    }

    match format {
        OutputFormat::Json => {
            let records: Vec<HistoryRecordJson> = history
                .iter()
                .map(|r| HistoryRecordJson {
                    index: r.index,
                    timestamp: rfc3339(r.timestamp),
                    min_temperature: r.min_temperature,
                    min_humidity: r.min_humidity,
                    max_temperature: r.max_temperature,
                    max_humidity: r.max_humidity,
                })
                .collect();
            as_json(&records)
        }
        OutputFormat::Text => {
            if history.is_empty() {
                return Ok("No history records found.\n".to_string());
            }
            let mut output = format!("History ({} records):\n\n", history.len());
            output.push_str(&format!(
                "{:>8}  {:<25}  {:>8}  {:>5}  {:>8}  {:>5}\n",
                "Index", "Timestamp", "Min °C", "Min %", "Max °C", "Max %"
            ));
            for r in history {
                output.push_str(&format!(
                    "{:>8}  {:<25}  {:>8.2}  {:>5}  {:>8.2}  {:>5}\n",
                    r.index,
                    rfc3339(r.timestamp),
                    r.min_temperature,
                    r.min_humidity,
                    r.max_temperature,
                    r.max_humidity
                ));
            }
            Ok(output)
        }
    }
}

pub fn format_units(unit: UnitPreference, format: OutputFormat) -> Result<String> {
    #[derive(Serialize)]
    struct UnitsJson {
        units: &'static str,
    }

    match format {
        OutputFormat::Json => as_json(&UnitsJson {
            units: unit.symbol(),
        }),
        OutputFormat::Text => Ok(format!("Units: {}\n", unit)),
    }
}

pub fn format_clock(time: OffsetDateTime, tz_offset: i8, format: OutputFormat) -> Result<String> {
    #[derive(Serialize)]
    struct ClockJson {
        time: String,
        epoch: i64,
        tz_offset: i8,
    }

    match format {
        OutputFormat::Json => as_json(&ClockJson {
            time: rfc3339(time),
            epoch: time.unix_timestamp(),
            tz_offset,
        }),
        OutputFormat::Text => Ok(format!(
            "Clock: {} (UTC{:+})\n",
            format_device_time(time, tz_offset),
            tz_offset
        )),
    }
}

pub fn format_battery(level: u8, format: OutputFormat) -> Result<String> {
    #[derive(Serialize)]
    struct BatteryJson {
        battery: u8,
    }

    match format {
        OutputFormat::Json => as_json(&BatteryJson { battery: level }),
        OutputFormat::Text => Ok(format!("Battery: {}%\n", level)),
    }
}

pub fn format_status(status: &DeviceStatus, format: OutputFormat) -> Result<String> {
    #[derive(Serialize)]
    struct StatusJson {
        battery: u8,
        units: &'static str,
        clock: String,
        tz_offset: i8,
        records_total: u32,
        records_current: u32,
    }

    match format {
        OutputFormat::Json => as_json(&StatusJson {
            battery: status.battery,
            units: status.units.symbol(),
            clock: rfc3339(status.clock),
            tz_offset: status.tz_offset,
            records_total: status.records.total,
            records_current: status.records.current,
        }),
        OutputFormat::Text => Ok(format!(
            "Battery: {}%\nUnits:   {}\nClock:   {} (UTC{:+})\nRecords: {} stored, {} total\n",
            status.battery,
            status.units,
            format_device_time(status.clock, status.tz_offset),
            status.tz_offset,
            status.records.current,
            status.records.total
        )),
    }
}
