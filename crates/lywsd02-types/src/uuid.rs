//! Bluetooth UUIDs for the LYWSD02.
//!
//! The device exposes all of its data through one vendor service whose
//! characteristics share the `EBE0CCxx-7A0A-4B0C-8A1A-6FF2997DA3A6` base.
//! These values are fixed by the firmware.

use uuid::{Uuid, uuid};

// --- Characteristic UUIDs ---

/// Display units (read/write). One byte, see [`crate::UnitPreference`].
pub const UNITS: Uuid = uuid!("EBE0CCBE-7A0A-4B0C-8A1A-6FF2997DA3A6");

/// History record stream (read/notify). 14-byte records.
pub const HISTORY: Uuid = uuid!("EBE0CCBC-7A0A-4B0C-8A1A-6FF2997DA3A6");

/// Device clock (read/write). 4 or 5 bytes.
pub const CLOCK: Uuid = uuid!("EBE0CCB7-7A0A-4B0C-8A1A-6FF2997DA3A6");

/// Live temperature/humidity data (read/notify). 3 or 5 bytes.
pub const LIVE_DATA: Uuid = uuid!("EBE0CCC1-7A0A-4B0C-8A1A-6FF2997DA3A6");

/// Battery percentage (read). One byte.
pub const BATTERY: Uuid = uuid!("EBE0CCC4-7A0A-4B0C-8A1A-6FF2997DA3A6");

/// Stored history record counts (read). 8 bytes.
pub const RECORD_COUNT: Uuid = uuid!("EBE0CCB9-7A0A-4B0C-8A1A-6FF2997DA3A6");

/// History record index cursor (read/write). 4 bytes.
pub const RECORD_INDEX: Uuid = uuid!("EBE0CCBA-7A0A-4B0C-8A1A-6FF2997DA3A6");

// --- Standard GATT descriptors ---

/// Client Characteristic Configuration Descriptor.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

/// CCCD value that enables notifications (0x0001, little-endian).
pub const NOTIFY_ENABLE: [u8; 2] = 0x0001u16.to_le_bytes();

/// CCCD value that disables notifications and indications.
pub const NOTIFY_DISABLE: [u8; 2] = 0x0000u16.to_le_bytes();

/// Descriptor value to write for the requested notification state.
#[must_use]
pub const fn notify_descriptor_value(enable: bool) -> [u8; 2] {
    if enable { NOTIFY_ENABLE } else { NOTIFY_DISABLE }
}
