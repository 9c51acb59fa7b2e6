//! Error types for record decoding in lywsd02-types.

use thiserror::Error;

/// Errors that can occur when decoding LYWSD02 characteristic payloads.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in lywsd02-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The payload length matches none of the known layouts for this record.
    #[error("{record} payload has unexpected length {actual} (expected one of {expected:?})")]
    UnexpectedLength {
        /// Name of the record being decoded.
        record: &'static str,
        /// Lengths accepted for this record.
        expected: &'static [usize],
        /// Length actually received.
        actual: usize,
    },

    /// The display-unit byte is outside the known code table.
    #[error("Invalid unit code: 0x{0:02X}")]
    InvalidUnitCode(u8),
}

impl DecodeError {
    /// Create an unexpected-length error.
    pub fn unexpected_length(
        record: &'static str,
        expected: &'static [usize],
        actual: usize,
    ) -> Self {
        Self::UnexpectedLength {
            record,
            expected,
            actual,
        }
    }
}

/// A textual unit name that is neither Celsius nor Fahrenheit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown unit {0:?}, expected one of C, F")]
pub struct UnknownUnit(pub String);

/// Result type alias using lywsd02-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
