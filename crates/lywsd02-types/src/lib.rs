//! Platform-agnostic types for the Xiaomi LYWSD02 BLE clock/hygrometer.
//!
//! This crate holds the data model, the characteristic UUID table and the
//! wire codec. It performs no I/O; the BLE session lives in `lywsd02-core`.
//!
//! # Example
//!
//! ```
//! use lywsd02_types::{codec, UnitPreference};
//!
//! let sample = codec::decode_live_sample(&[0xE8, 0x03, 0x32]).unwrap();
//! assert_eq!(sample.temperature, 10.0);
//!
//! assert_eq!(codec::encode_unit(UnitPreference::Celsius), 0xFF);
//! ```

pub mod codec;
pub mod error;
pub mod types;
pub mod uuid;

pub use error::{DecodeError, DecodeResult, UnknownUnit};
pub use types::{
    ClockSetting, HistoryLog, HistoryRecord, RecordCounts, SensorSample, UnitPreference,
    timestamp_from_epoch,
};
pub use uuid as uuids;
