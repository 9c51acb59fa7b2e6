//! Core BLE library for the Xiaomi LYWSD02 clock/hygrometer.
//!
//! This crate turns GATT reads, writes and notifications into typed values.
//!
//! # Features
//!
//! - **Live data**: Temperature, humidity and (on newer firmware) cell voltage,
//!   with a fetch throttle that serves a cached sample between device updates
//! - **History**: Download min/max records; the stream ends when the device
//!   goes quiet
//! - **Clock and units**: Read and set the device clock, timezone offset and
//!   display units
//! - **Nested connections**: Batch several operations on one BLE link
//! - **Testable**: A [`GattTransport`] trait with an in-memory [`MockTransport`]
//!
//! # Quick Start
//!
//! ```no_run
//! use lywsd02_core::{BleTransport, SensorSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = BleTransport::new().await?;
//!     let mut session = SensorSession::new("E7:2E:00:B1:38:96", transport);
//!
//!     let sample = session.get_current_sample().await?;
//!     println!("{:.2} C, {}%", sample.temperature, sample.humidity);
//!
//!     let history = session.fetch_history().await?;
//!     println!("{} history records", history.len());
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
pub mod error;
pub mod mock;
pub mod router;
pub mod scope;
pub mod session;
pub mod timezone;
pub mod transport;

// Re-export types and uuid modules from lywsd02-types
pub use lywsd02_types::codec;
pub use lywsd02_types::types;
pub use lywsd02_types::uuid;

// Core exports
pub use ble::{BleConfig, BleTransport};
pub use error::{Error, ErrorKind, Result};
pub use mock::{MockTransport, RecordedWrite};
pub use router::{NotificationRouter, Routed, Subscription};
pub use scope::{ConnectionScope, ScopeEntry};
pub use session::{
    DEFAULT_MIN_FETCH_INTERVAL, DEFAULT_NOTIFICATION_TIMEOUT, SensorSession, SessionConfig,
    SharedSession,
};
pub use timezone::{FixedUtcOffset, HostUtcOffset, UtcOffsetSource};
pub use transport::{CharacteristicHandle, GattTransport, Notification, WriteMode};

// Re-export from lywsd02-types
pub use lywsd02_types::uuid as uuids;
pub use lywsd02_types::{
    ClockSetting, DecodeError, HistoryLog, HistoryRecord, RecordCounts, SensorSample,
    UnitPreference,
};
