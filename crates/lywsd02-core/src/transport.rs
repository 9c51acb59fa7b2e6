//! GATT transport abstraction.
//!
//! [`GattTransport`] is the seam between the session and the BLE stack. The
//! btleplug implementation lives in [`crate::ble`]; [`crate::mock`] provides
//! an in-memory one for tests.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Opaque per-connection handle for a characteristic.
///
/// Handles are only meaningful for the physical connection that issued them;
/// after a disconnect they must not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacteristicHandle(pub u16);

impl fmt::Display for CharacteristicHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

/// Whether a write waits for the device to acknowledge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Write request; the device acknowledges.
    #[default]
    WithResponse,
    /// Write command; no acknowledgement.
    WithoutResponse,
}

/// One value pushed by the device on a subscribed characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Handle of the characteristic that notified.
    pub handle: CharacteristicHandle,
    /// Raw payload.
    pub value: Vec<u8>,
}

/// Operations the session needs from a BLE GATT stack.
///
/// Implementations hold at most one physical connection. All methods other
/// than [`connect`](GattTransport::connect) and
/// [`is_connected`](GattTransport::is_connected) fail with
/// [`Error::NotConnected`](crate::Error::NotConnected) when there is none.
#[async_trait]
pub trait GattTransport: Send + Sync {
    /// Open the physical connection to the device at `address`.
    async fn connect(&mut self, address: &str) -> Result<()>;

    /// Close the physical connection and forget all handles.
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether a physical connection is currently open.
    async fn is_connected(&self) -> bool;

    /// Resolve a characteristic UUID to a handle on the current connection.
    async fn find_characteristic(&mut self, uuid: Uuid) -> Result<CharacteristicHandle>;

    /// Read a characteristic value.
    async fn read(&mut self, handle: CharacteristicHandle) -> Result<Vec<u8>>;

    /// Write a characteristic value.
    async fn write(
        &mut self,
        handle: CharacteristicHandle,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<()>;

    /// Write the characteristic's client configuration descriptor, enabling
    /// or disabling notifications.
    async fn write_notify_descriptor(
        &mut self,
        handle: CharacteristicHandle,
        enable: bool,
    ) -> Result<()>;

    /// Wait up to `timeout` for the next notification.
    ///
    /// Returns `Ok(None)` when the timeout elapses without one. At most one
    /// notification is returned per call, in delivery order.
    async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Notification>>;
}
