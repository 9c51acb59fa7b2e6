//! In-memory transport for testing.
//!
//! [`MockTransport`] implements [`GattTransport`] without BLE hardware. It
//! holds scripted characteristic values, queues notifications, and records
//! every call the session makes so tests can assert on connection and
//! subscription behaviour.
//!
//! Clones share state, so a test can keep one clone for inspection after
//! moving another into a [`SensorSession`](crate::SensorSession).
//!
//! # Features
//!
//! - **Scripted values**: Set the bytes returned by reads of each characteristic
//! - **Device pushes**: Payloads emitted whenever notifications are enabled
//! - **Failure injection**: Fail connect, disconnect or reads on demand
//! - **Call recording**: Connect/disconnect counts, writes and descriptor writes

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use lywsd02_types::uuids;

use crate::error::{Error, Result};
use crate::transport::{CharacteristicHandle, GattTransport, Notification, WriteMode};

/// Characteristics the mock exposes by default, in handle order.
const DEFAULT_CHARACTERISTICS: [Uuid; 7] = [
    uuids::CLOCK,
    uuids::RECORD_COUNT,
    uuids::RECORD_INDEX,
    uuids::HISTORY,
    uuids::UNITS,
    uuids::LIVE_DATA,
    uuids::BATTERY,
];

/// A recorded characteristic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    /// Characteristic written.
    pub uuid: Uuid,
    /// Bytes written.
    pub value: Vec<u8>,
    /// Requested write mode.
    pub mode: WriteMode,
}

#[derive(Debug, Default)]
struct MockState {
    connected: bool,
    last_address: Option<String>,
    handles: HashMap<Uuid, CharacteristicHandle>,
    values: HashMap<Uuid, Vec<u8>>,
    on_subscribe: HashMap<Uuid, Vec<Vec<u8>>>,
    queue: VecDeque<(Uuid, Vec<u8>)>,
    writes: Vec<RecordedWrite>,
    descriptor_writes: Vec<(Uuid, bool)>,
    reads: Vec<Uuid>,
    connect_count: u32,
    disconnect_count: u32,
    fail_connect: bool,
    fail_disconnect: bool,
    fail_reads: bool,
    panic_reads: bool,
}

impl MockState {
    fn check_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn uuid_for(&self, handle: CharacteristicHandle) -> Result<Uuid> {
        self.handles
            .iter()
            .find_map(|(uuid, h)| (*h == handle).then_some(*uuid))
            .ok_or(Error::UnknownHandle { handle })
    }
}

/// A scripted LYWSD02 for tests.
///
/// # Example
///
/// ```
/// use lywsd02_core::{GattTransport, MockTransport};
/// use lywsd02_types::uuids;
///
/// #[tokio::main]
/// async fn main() {
///     let mut transport = MockTransport::new();
///     transport.set_value(uuids::BATTERY, vec![87]);
///
///     transport.connect("E7:2E:00:B1:38:96").await.unwrap();
///     let handle = transport.find_characteristic(uuids::BATTERY).await.unwrap();
///     assert_eq!(transport.read(handle).await.unwrap(), vec![87]);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock exposing every LYWSD02 characteristic with empty values.
    pub fn new() -> Self {
        let handles = DEFAULT_CHARACTERISTICS
            .iter()
            .zip(0u16..)
            .map(|(uuid, i)| (*uuid, CharacteristicHandle(0x30 + i * 3)))
            .collect();

        Self {
            state: Arc::new(Mutex::new(MockState {
                handles,
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the recorded calls from others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- Scripting ---

    /// Set the value returned by reads of `uuid`.
    pub fn set_value(&self, uuid: Uuid, value: Vec<u8>) {
        self.state().values.insert(uuid, value);
    }

    /// Current stored value of `uuid` (reflects writes).
    pub fn value(&self, uuid: Uuid) -> Option<Vec<u8>> {
        self.state().values.get(&uuid).cloned()
    }

    /// Remove a characteristic so lookups for it fail.
    pub fn remove_characteristic(&self, uuid: Uuid) {
        self.state().handles.remove(&uuid);
    }

    /// Payloads the device pushes each time notifications on `uuid` are
    /// enabled.
    pub fn on_subscribe(&self, uuid: Uuid, payloads: Vec<Vec<u8>>) {
        self.state().on_subscribe.insert(uuid, payloads);
    }

    /// Queue one notification on `uuid`, delivered regardless of subscription.
    pub fn queue_notification(&self, uuid: Uuid, value: Vec<u8>) {
        self.state().queue.push_back((uuid, value));
    }

    /// Number of notifications waiting to be delivered.
    pub fn pending_notifications(&self) -> usize {
        self.state().queue.len()
    }

    // --- Failure injection ---

    /// Make connect attempts fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    /// Make disconnects fail. The link is still torn down.
    pub fn set_fail_disconnect(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    /// Make characteristic reads fail.
    pub fn set_fail_reads(&self, fail: bool) {
        self.state().fail_reads = fail;
    }

    /// Make characteristic reads panic, as a faulty backend might.
    pub fn set_panic_reads(&self, panic: bool) {
        self.state().panic_reads = panic;
    }

    // --- Inspection ---

    /// Whether the mock link is up.
    pub fn is_connected_now(&self) -> bool {
        self.state().connected
    }

    /// Address passed to the last connect.
    pub fn last_address(&self) -> Option<String> {
        self.state().last_address.clone()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u32 {
        self.state().connect_count
    }

    /// Number of disconnects performed.
    pub fn disconnect_count(&self) -> u32 {
        self.state().disconnect_count
    }

    /// All characteristic writes, in order.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.state().writes.clone()
    }

    /// All descriptor writes as `(uuid, enable)`, in order.
    pub fn descriptor_writes(&self) -> Vec<(Uuid, bool)> {
        self.state().descriptor_writes.clone()
    }

    /// All characteristic reads, in order.
    pub fn reads(&self) -> Vec<Uuid> {
        self.state().reads.clone()
    }
}

#[async_trait]
impl GattTransport for MockTransport {
    async fn connect(&mut self, address: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_connect {
            return Err(Error::device_not_found(address));
        }
        state.connected = true;
        state.connect_count += 1;
        state.last_address = Some(address.to_string());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state();
        state.check_connected()?;
        state.connected = false;
        state.disconnect_count += 1;
        if state.fail_disconnect {
            return Err(Error::timeout("disconnect", Duration::from_secs(10)));
        }
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn find_characteristic(&mut self, uuid: Uuid) -> Result<CharacteristicHandle> {
        let state = self.state();
        state.check_connected()?;
        state
            .handles
            .get(&uuid)
            .copied()
            .ok_or(Error::CharacteristicNotFound { uuid })
    }

    async fn read(&mut self, handle: CharacteristicHandle) -> Result<Vec<u8>> {
        let mut state = self.state();
        if state.panic_reads {
            drop(state);
            panic!("mock read of {handle:?} panicked");
        }
        state.check_connected()?;
        let uuid = state.uuid_for(handle)?;
        state.reads.push(uuid);
        if state.fail_reads {
            return Err(Error::timeout(
                format!("read characteristic {uuid}"),
                Duration::from_secs(10),
            ));
        }
        Ok(state.values.get(&uuid).cloned().unwrap_or_default())
    }

    async fn write(
        &mut self,
        handle: CharacteristicHandle,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let mut state = self.state();
        state.check_connected()?;
        let uuid = state.uuid_for(handle)?;
        state.writes.push(RecordedWrite {
            uuid,
            value: value.to_vec(),
            mode,
        });
        state.values.insert(uuid, value.to_vec());
        Ok(())
    }

    async fn write_notify_descriptor(
        &mut self,
        handle: CharacteristicHandle,
        enable: bool,
    ) -> Result<()> {
        let mut state = self.state();
        state.check_connected()?;
        let uuid = state.uuid_for(handle)?;
        state.descriptor_writes.push((uuid, enable));
        if enable && let Some(payloads) = state.on_subscribe.get(&uuid).cloned() {
            state
                .queue
                .extend(payloads.into_iter().map(|value| (uuid, value)));
        }
        Ok(())
    }

    async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Notification>> {
        let next = {
            let mut state = self.state();
            state.check_connected()?;
            match state.queue.pop_front() {
                Some((uuid, value)) => {
                    // Unknown UUIDs get a handle no subscription can hold.
                    let handle = state
                        .handles
                        .get(&uuid)
                        .copied()
                        .unwrap_or(CharacteristicHandle(u16::MAX));
                    Some(Notification { handle, value })
                }
                None => None,
            }
        };

        if next.is_none() {
            tokio::time::sleep(timeout).await;
        }
        Ok(next)
    }
}
