//! Error types for lywsd02-core.
//!
//! Every failure a session operation can surface falls into one of four
//! kinds, reported by [`Error::kind`]:
//!
//! | Kind | Variants | Typical cause |
//! |------|----------|---------------|
//! | [`ErrorKind::Transport`] | `Bluetooth`, `AdapterUnavailable`, `DeviceNotFound`, `NotConnected`, `CharacteristicNotFound`, `UnknownHandle`, `Timeout`, `NotificationStreamClosed` | BLE link or GATT failure |
//! | [`ErrorKind::DeviceUnresponsive`] | `DeviceUnresponsive` | No live-data notification within the timeout |
//! | [`ErrorKind::Decode`] | `Decode` | Payload length or unit byte not recognised |
//! | [`ErrorKind::InvalidArgument`] | `InvalidArgument` | Caller input rejected before any I/O |
//!
//! The session never retries. Whatever the error, the connection scope is
//! released before the error reaches the caller.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use lywsd02_types::{DecodeError, UnknownUnit};

use crate::transport::CharacteristicHandle;

/// Errors that can occur when talking to a LYWSD02.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth adapter is available on this host.
    #[error("No Bluetooth adapter available")]
    AdapterUnavailable,

    /// The device could not be located by address.
    #[error("Device not found: {address}")]
    DeviceNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Operation attempted while not connected to the device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required characteristic not present on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: Uuid,
    },

    /// A handle that the current link never issued, such as one kept across
    /// a reconnect.
    #[error("Unknown characteristic handle {handle}")]
    UnknownHandle {
        /// The stale or foreign handle.
        handle: CharacteristicHandle,
    },

    /// A transport operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The platform's notification stream ended while connected.
    #[error("Notification stream closed")]
    NotificationStreamClosed,

    /// No live-data notification arrived within the configured timeout.
    #[error("Device did not respond within {timeout:?}")]
    DeviceUnresponsive {
        /// How long the session waited.
        timeout: Duration,
    },

    /// A payload did not decode.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Caller-supplied value rejected before any I/O.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// BLE link or GATT failure.
    Transport,
    /// The device did not answer a live-data subscription.
    DeviceUnresponsive,
    /// A payload did not match any known layout.
    Decode,
    /// Caller input was rejected.
    InvalidArgument,
}

impl Error {
    /// Create a device not found error for an address.
    pub fn device_not_found(address: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            address: address.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DeviceUnresponsive { .. } => ErrorKind::DeviceUnresponsive,
            Error::Decode(_) => ErrorKind::Decode,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Bluetooth(_)
            | Error::AdapterUnavailable
            | Error::DeviceNotFound { .. }
            | Error::NotConnected
            | Error::CharacteristicNotFound { .. }
            | Error::UnknownHandle { .. }
            | Error::Timeout { .. }
            | Error::NotificationStreamClosed => ErrorKind::Transport,
        }
    }

    /// Whether this is a BLE-layer failure.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}

impl From<UnknownUnit> for Error {
    fn from(err: UnknownUnit) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

/// Result type alias using lywsd02-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
