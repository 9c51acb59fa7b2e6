//! btleplug-backed transport.
//!
//! [`BleTransport`] implements [`GattTransport`] for a real LYWSD02. It finds
//! the peripheral by address, connects and discovers services under
//! timeouts, and hands out handles in characteristic discovery order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::{Stream, StreamExt};
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{CharacteristicHandle, GattTransport, Notification, WriteMode};

/// Default time spent scanning for a peripheral the adapter does not know yet.
const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for BLE connection operations.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for reads, writes and subscription changes.
const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the peripheral list is re-checked while scanning.
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Timeouts for [`BleTransport`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use lywsd02_core::BleConfig;
///
/// let config = BleConfig::default()
///     .scan_timeout(Duration::from_secs(20))
///     .connect_timeout(Duration::from_secs(25));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleConfig {
    /// How long to scan for a peripheral that is not already known.
    pub scan_timeout: Duration,
    /// Timeout for establishing the connection.
    pub connect_timeout: Duration,
    /// Timeout for service discovery after connecting.
    pub discovery_timeout: Duration,
    /// Timeout for each read, write or subscription change.
    pub operation_timeout: Duration,
}

impl Default for BleConfig {
    fn default() -> Self {
        Self {
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl BleConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the per-operation timeout.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// State of one physical connection.
struct Link {
    peripheral: Peripheral,
    /// Indexed by `handle - 1`.
    characteristics: Vec<Characteristic>,
    handles: HashMap<Uuid, CharacteristicHandle>,
    // Wrapped so the transport stays `Sync`; only accessed through `&mut`.
    notifications: tokio::sync::Mutex<NotificationStream>,
}

impl Link {
    fn characteristic(&self, handle: CharacteristicHandle) -> Result<&Characteristic> {
        by_handle(&self.characteristics, handle)
    }
}

/// Handles count from 1 in discovery order.
fn by_handle<C>(entries: &[C], handle: CharacteristicHandle) -> Result<&C> {
    usize::from(handle.0)
        .checked_sub(1)
        .and_then(|i| entries.get(i))
        .ok_or(Error::UnknownHandle { handle })
}

/// A [`GattTransport`] over the host's Bluetooth adapter.
pub struct BleTransport {
    adapter: Adapter,
    config: BleConfig,
    link: Option<Link>,
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("config", &self.config)
            .field("connected", &self.link.is_some())
            .field(
                "characteristics",
                &self.link.as_ref().map(|l| l.characteristics.len()),
            )
            .finish_non_exhaustive()
    }
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or(Error::AdapterUnavailable)
}

/// Format a peripheral ID as a bare string.
///
/// On macOS peripheral IDs are UUIDs; elsewhere they wrap the MAC address.
fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{id:?}")
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Normalise an address for comparison: lowercase, no separators.
fn normalize_address(address: &str) -> String {
    address
        .chars()
        .filter(|c| *c != ':' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

async fn with_timeout<R>(
    operation: impl Into<String>,
    duration: Duration,
    fut: impl Future<Output = std::result::Result<R, btleplug::Error>>,
) -> Result<R> {
    Ok(timeout(duration, fut)
        .await
        .map_err(|_| Error::timeout(operation, duration))??)
}

impl BleTransport {
    /// Use the first Bluetooth adapter with default timeouts.
    pub async fn new() -> Result<Self> {
        Self::with_config(BleConfig::default()).await
    }

    /// Use the first Bluetooth adapter with custom timeouts.
    pub async fn with_config(config: BleConfig) -> Result<Self> {
        Ok(Self::from_adapter(get_adapter().await?, config))
    }

    /// Use a specific adapter.
    pub fn from_adapter(adapter: Adapter, config: BleConfig) -> Self {
        Self {
            adapter,
            config,
            link: None,
        }
    }

    /// Transport timeouts.
    pub fn config(&self) -> &BleConfig {
        &self.config
    }

    fn link(&self) -> Result<&Link> {
        self.link.as_ref().ok_or(Error::NotConnected)
    }

    fn link_mut(&mut self) -> Result<&mut Link> {
        self.link.as_mut().ok_or(Error::NotConnected)
    }

    /// Search the adapter's known peripherals for `address`.
    async fn known_peripheral(&self, wanted: &str) -> Result<Option<Peripheral>> {
        for peripheral in self.adapter.peripherals().await? {
            if normalize_address(&format_peripheral_id(&peripheral.id())) == wanted {
                debug!("Matched by peripheral ID");
                return Ok(Some(peripheral));
            }
            if let Ok(Some(props)) = peripheral.properties().await
                && normalize_address(&props.address.to_string()) == wanted
            {
                debug!(address = %props.address, "Matched by address");
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// Locate the peripheral, scanning for up to the scan timeout if the
    /// adapter has not seen it yet.
    async fn find_peripheral(&self, address: &str) -> Result<Peripheral> {
        let wanted = normalize_address(address);

        if let Some(peripheral) = self.known_peripheral(&wanted).await? {
            debug!(address, "Found device in cache (no scan needed)");
            return Ok(peripheral);
        }

        info!(
            address,
            scan_secs = self.config.scan_timeout.as_secs(),
            "Scanning for device..."
        );
        self.adapter.start_scan(ScanFilter::default()).await?;
        let deadline = Instant::now() + self.config.scan_timeout;
        let found = loop {
            match self.known_peripheral(&wanted).await {
                Ok(Some(peripheral)) => break Ok(Some(peripheral)),
                Ok(None) if Instant::now() >= deadline => break Ok(None),
                Ok(None) => sleep(SCAN_POLL_INTERVAL).await,
                Err(e) => break Err(e),
            }
        };
        if let Err(e) = self.adapter.stop_scan().await {
            warn!(error = %e, "Failed to stop scan");
        }

        found?.ok_or_else(|| {
            warn!(address, "Device not found");
            Error::device_not_found(address)
        })
    }

    async fn open_link(&self, peripheral: Peripheral) -> Result<Link> {
        with_timeout(
            "connect to device",
            self.config.connect_timeout,
            peripheral.connect(),
        )
        .await?;

        with_timeout(
            "discover services",
            self.config.discovery_timeout,
            peripheral.discover_services(),
        )
        .await?;

        let characteristics: Vec<Characteristic> = peripheral.characteristics().into_iter().collect();
        let mut handles = HashMap::with_capacity(characteristics.len());
        for (handle, characteristic) in (1u16..).zip(&characteristics) {
            debug!(uuid = %characteristic.uuid, handle, "Characteristic");
            handles
                .entry(characteristic.uuid)
                .or_insert(CharacteristicHandle(handle));
        }
        debug!(count = characteristics.len(), "Cached characteristics");

        let notifications = peripheral.notifications().await?;

        Ok(Link {
            peripheral,
            characteristics,
            handles,
            notifications: tokio::sync::Mutex::new(notifications),
        })
    }
}

#[async_trait]
impl GattTransport for BleTransport {
    async fn connect(&mut self, address: &str) -> Result<()> {
        if self.link.is_some() {
            debug!("Already connected");
            return Ok(());
        }

        let peripheral = self.find_peripheral(address).await?;
        match self.open_link(peripheral.clone()).await {
            Ok(link) => {
                self.link = Some(link);
                Ok(())
            }
            Err(e) => {
                // Do not leave a half-open link behind.
                if let Err(disconnect_err) = peripheral.disconnect().await {
                    debug!(error = %disconnect_err, "Cleanup disconnect failed");
                }
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(link) = self.link.take() else {
            return Err(Error::NotConnected);
        };
        with_timeout(
            "disconnect",
            self.config.operation_timeout,
            link.peripheral.disconnect(),
        )
        .await
    }

    async fn is_connected(&self) -> bool {
        match &self.link {
            Some(link) => link.peripheral.is_connected().await.unwrap_or(false),
            None => false,
        }
    }

    async fn find_characteristic(&mut self, uuid: Uuid) -> Result<CharacteristicHandle> {
        self.link()?
            .handles
            .get(&uuid)
            .copied()
            .ok_or(Error::CharacteristicNotFound { uuid })
    }

    async fn read(&mut self, handle: CharacteristicHandle) -> Result<Vec<u8>> {
        let link = self.link()?;
        let characteristic = link.characteristic(handle)?;
        with_timeout(
            format!("read characteristic {}", characteristic.uuid),
            self.config.operation_timeout,
            link.peripheral.read(characteristic),
        )
        .await
    }

    async fn write(
        &mut self,
        handle: CharacteristicHandle,
        value: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let link = self.link()?;
        let characteristic = link.characteristic(handle)?;
        let write_type = match mode {
            WriteMode::WithResponse => WriteType::WithResponse,
            WriteMode::WithoutResponse => WriteType::WithoutResponse,
        };
        with_timeout(
            format!("write characteristic {}", characteristic.uuid),
            self.config.operation_timeout,
            link.peripheral.write(characteristic, value, write_type),
        )
        .await
    }

    async fn write_notify_descriptor(
        &mut self,
        handle: CharacteristicHandle,
        enable: bool,
    ) -> Result<()> {
        let link = self.link()?;
        let characteristic = link.characteristic(handle)?;
        let duration = self.config.operation_timeout;
        // The platform stack writes the CCCD (0x0001 / 0x0000) for us.
        if enable {
            with_timeout(
                format!("subscribe {}", characteristic.uuid),
                duration,
                link.peripheral.subscribe(characteristic),
            )
            .await
        } else {
            with_timeout(
                format!("unsubscribe {}", characteristic.uuid),
                duration,
                link.peripheral.unsubscribe(characteristic),
            )
            .await
        }
    }

    async fn wait_for_notification(&mut self, timeout: Duration) -> Result<Option<Notification>> {
        let link = self.link_mut()?;
        let stream = link.notifications.get_mut();
        let deadline = Instant::now() + timeout;

        loop {
            match timeout_at(deadline, stream.next()).await {
                Err(_) => return Ok(None),
                Ok(None) => return Err(Error::NotificationStreamClosed),
                Ok(Some(notification)) => match link.handles.get(&notification.uuid) {
                    Some(&handle) => {
                        return Ok(Some(Notification {
                            handle,
                            value: notification.value,
                        }));
                    }
                    None => debug!(uuid = %notification.uuid, "Ignoring notification"),
                },
            }
        }
    }
}

// Dropping a connected transport spawns a best-effort disconnect. The session
// normally disconnects through its connection scope before this matters.
impl Drop for BleTransport {
    fn drop(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };
        warn!("BleTransport dropped while connected - performing best-effort disconnect");

        let peripheral = link.peripheral;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(error = %e, "Best-effort disconnect failed");
                }
            });
        }
    }
}
