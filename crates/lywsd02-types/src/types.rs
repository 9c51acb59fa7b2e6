//! Core types for LYWSD02 sensor data.

use core::fmt;
use core::str::FromStr;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::UnknownUnit;

/// Convert whole seconds since the Unix epoch to a UTC timestamp.
///
/// Infallible for the full `u32` range the device uses.
#[must_use]
pub fn timestamp_from_epoch(epoch_seconds: u32) -> OffsetDateTime {
    OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(i64::from(epoch_seconds))
}

/// A live temperature/humidity sample.
///
/// Older firmware sends only temperature and humidity; newer firmware
/// appends the cell voltage. When the voltage is absent both power fields
/// are `None` rather than zero.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorSample {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: u8,
    /// Cell voltage in millivolts, if the firmware reports it.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub voltage_mv: Option<u16>,
    /// Battery level (0-100) derived from `voltage_mv`.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub battery_level: Option<u8>,
}

impl SensorSample {
    /// Whether this sample carries voltage and battery information.
    #[must_use]
    pub fn has_power_info(&self) -> bool {
        self.voltage_mv.is_some()
    }
}

/// A min/max aggregate retained by the device for one history interval.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistoryRecord {
    /// Device-assigned record index.
    pub index: u32,
    /// Start of the aggregation interval (device clock, UTC).
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Minimum temperature in degrees Celsius.
    pub min_temperature: f64,
    /// Minimum relative humidity percentage.
    pub min_humidity: u8,
    /// Maximum temperature in degrees Celsius.
    pub max_temperature: f64,
    /// Maximum relative humidity percentage.
    pub max_humidity: u8,
}

/// History records keyed by index, in arrival order.
///
/// Re-inserting an index replaces the stored value but keeps its original
/// position, so iteration order is the order in which each index was first
/// seen. The device sends records in ascending index order in practice, but
/// nothing here depends on it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryLog {
    records: Vec<HistoryRecord>,
    positions: HashMap<u32, usize>,
}

impl HistoryLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the record it replaced if the index was
    /// already present.
    pub fn insert(&mut self, record: HistoryRecord) -> Option<HistoryRecord> {
        match self.positions.get(&record.index) {
            Some(&pos) => Some(std::mem::replace(&mut self.records[pos], record)),
            None => {
                self.positions.insert(record.index, self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    /// Look up a record by index.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&HistoryRecord> {
        self.positions.get(&index).map(|&pos| &self.records[pos])
    }

    /// Whether a record with this index is present.
    #[must_use]
    pub fn contains(&self, index: u32) -> bool {
        self.positions.contains_key(&index)
    }

    /// Number of distinct indices held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the log holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in arrival order.
    pub fn iter(&self) -> std::slice::Iter<'_, HistoryRecord> {
        self.records.iter()
    }

    /// Iterate over indices in arrival order.
    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.records.iter().map(|r| r.index)
    }

    /// The highest index held, if any.
    #[must_use]
    pub fn max_index(&self) -> Option<u32> {
        self.indices().max()
    }
}

impl<'a> IntoIterator for &'a HistoryLog {
    type Item = &'a HistoryRecord;
    type IntoIter = std::slice::Iter<'a, HistoryRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl Extend<HistoryRecord> for HistoryLog {
    fn extend<I: IntoIterator<Item = HistoryRecord>>(&mut self, iter: I) {
        for record in iter {
            self.insert(record);
        }
    }
}

impl FromIterator<HistoryRecord> for HistoryLog {
    fn from_iter<I: IntoIterator<Item = HistoryRecord>>(iter: I) -> Self {
        let mut log = Self::new();
        log.extend(iter);
        log
    }
}

#[cfg(feature = "serde")]
impl Serialize for HistoryLog {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.records)
    }
}

/// Device clock as stored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClockSetting {
    /// Seconds since the Unix epoch.
    pub epoch_seconds: u32,
    /// Timezone offset in whole hours.
    pub tz_offset_hours: i8,
    /// Whether the payload carried the offset byte (5-byte form).
    pub offset_present: bool,
}

impl ClockSetting {
    /// Create a clock setting carrying an explicit offset.
    #[must_use]
    pub fn new(epoch_seconds: u32, tz_offset_hours: i8) -> Self {
        Self {
            epoch_seconds,
            tz_offset_hours,
            offset_present: true,
        }
    }

    /// The clock value as a UTC timestamp.
    #[must_use]
    pub fn time(&self) -> OffsetDateTime {
        timestamp_from_epoch(self.epoch_seconds)
    }
}

/// Temperature unit shown on the device display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UnitPreference {
    /// Degrees Celsius.
    Celsius,
    /// Degrees Fahrenheit.
    Fahrenheit,
}

impl UnitPreference {
    /// Short symbol, `"C"` or `"F"`.
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            UnitPreference::Celsius => "C",
            UnitPreference::Fahrenheit => "F",
        }
    }
}

impl fmt::Display for UnitPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for UnitPreference {
    type Err = UnknownUnit;

    /// Parse `C`/`F` or `celsius`/`fahrenheit`, ignoring case.
    ///
    /// ```
    /// use lywsd02_types::UnitPreference;
    ///
    /// assert_eq!("c".parse(), Ok(UnitPreference::Celsius));
    /// assert_eq!("Fahrenheit".parse(), Ok(UnitPreference::Fahrenheit));
    /// assert!("K".parse::<UnitPreference>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "C" | "CELSIUS" => Ok(UnitPreference::Celsius),
            "F" | "FAHRENHEIT" => Ok(UnitPreference::Fahrenheit),
            _ => Err(UnknownUnit(s.to_string())),
        }
    }
}

/// History record counts reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecordCounts {
    /// Records written since the device was reset.
    pub total: u32,
    /// Records currently retained.
    pub current: u32,
}
