//! LYWSD02 session.
//!
//! [`SensorSession`] owns the device address, one transport, and the values
//! decoded so far. Every public operation runs inside the connection scope,
//! so a standalone call connects and disconnects around itself, while calls
//! made between [`SensorSession::connect`] and [`SensorSession::disconnect`]
//! share one link.

use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use lywsd02_types::codec::{
    decode_battery, decode_clock, decode_history_cursor, decode_record_counts,
    decode_unit_payload, encode_clock, encode_history_cursor, encode_unit,
};
use lywsd02_types::{
    HistoryLog, RecordCounts, SensorSample, UnitPreference, timestamp_from_epoch, uuids,
};

use crate::error::{Error, Result};
use crate::router::{NotificationRouter, Routed, Subscription};
use crate::scope::{ConnectionScope, ScopeEntry};
use crate::timezone::{HostUtcOffset, UtcOffsetSource};
use crate::transport::{GattTransport, WriteMode};

/// Default time to wait for a notification.
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Default minimum interval between live-data fetches.
pub const DEFAULT_MIN_FETCH_INTERVAL: Duration = Duration::from_secs(10);

/// Session behaviour settings.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use lywsd02_core::SessionConfig;
///
/// let config = SessionConfig::default()
///     .notification_timeout(Duration::from_secs(8))
///     .tz_offset_override(Some(2));
/// assert_eq!(config.min_fetch_interval, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long to wait for each notification. For live data, silence past
    /// this is an error; for history it ends the stream.
    pub notification_timeout: Duration,
    /// Live-data fetches closer together than this return the cached sample.
    pub min_fetch_interval: Duration,
    /// Timezone offset written with the clock. `None` uses the host offset.
    pub tz_offset_override: Option<i8>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            notification_timeout: DEFAULT_NOTIFICATION_TIMEOUT,
            min_fetch_interval: DEFAULT_MIN_FETCH_INTERVAL,
            tz_offset_override: None,
        }
    }
}

impl SessionConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the notification timeout.
    #[must_use]
    pub fn notification_timeout(mut self, timeout: Duration) -> Self {
        self.notification_timeout = timeout;
        self
    }

    /// Set the minimum interval between live-data fetches.
    #[must_use]
    pub fn min_fetch_interval(mut self, interval: Duration) -> Self {
        self.min_fetch_interval = interval;
        self
    }

    /// Set the timezone offset override.
    #[must_use]
    pub fn tz_offset_override(mut self, offset: Option<i8>) -> Self {
        self.tz_offset_override = offset;
        self
    }
}

/// A client session for one LYWSD02.
///
/// The session is driven by one caller at a time; all operations take
/// `&mut self`. To share it between tasks use [`SharedSession`].
///
/// # Cleanup
///
/// Operations release the link themselves. An operation whose future is
/// dropped before it finishes gives its scope level back at once, and the
/// link it held is disconnected by the next operation or
/// [`disconnect`](Self::disconnect). Only an explicit
/// [`connect`](Self::connect) must be paired with
/// [`disconnect`](Self::disconnect); dropping a session that is still
/// connected logs a warning.
///
/// # Example
///
/// ```no_run
/// use lywsd02_core::{BleTransport, SensorSession};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = BleTransport::new().await?;
///     let mut session = SensorSession::new("E7:2E:00:B1:38:96", transport);
///
///     session.connect().await?;
///     let sample = session.get_current_sample().await;
///     let battery = session.get_battery().await;
///     session.disconnect().await?;
///
///     println!("{:.2} C, battery {}%", sample?.temperature, battery?);
///     Ok(())
/// }
/// ```
pub struct SensorSession<T: GattTransport> {
    address: String,
    transport: T,
    router: NotificationRouter,
    scope: ConnectionScope,
    config: SessionConfig,
    offset_source: Box<dyn UtcOffsetSource>,
    current: Option<SensorSample>,
    last_fetch: Option<Instant>,
    history: HistoryLog,
}

impl<T: GattTransport> std::fmt::Debug for SensorSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSession")
            .field("address", &self.address)
            .field("depth", &self.scope.depth())
            .field("config", &self.config)
            .field("current", &self.current)
            .field("history_len", &self.history.len())
            .finish_non_exhaustive()
    }
}

/// A session shared across tasks. The mutex serializes operations.
pub type SharedSession<T> = std::sync::Arc<tokio::sync::Mutex<SensorSession<T>>>;

impl<T: GattTransport> SensorSession<T> {
    /// Create a session with default settings and the host timezone.
    pub fn new(address: impl Into<String>, transport: T) -> Self {
        Self::with_config(address, transport, SessionConfig::default())
    }

    /// Create a session with custom settings.
    pub fn with_config(address: impl Into<String>, transport: T, config: SessionConfig) -> Self {
        Self {
            address: address.into(),
            transport,
            router: NotificationRouter::new(),
            scope: ConnectionScope::new(),
            config,
            offset_source: Box::new(HostUtcOffset),
            current: None,
            last_fetch: None,
            history: HistoryLog::new(),
        }
    }

    /// Replace the source used for the host timezone offset.
    #[must_use]
    pub fn with_offset_source(mut self, source: impl UtcOffsetSource + 'static) -> Self {
        self.offset_source = Box::new(source);
        self
    }

    /// Wrap the session for sharing across tasks.
    pub fn into_shared(self) -> SharedSession<T> {
        std::sync::Arc::new(tokio::sync::Mutex::new(self))
    }

    /// Device address this session connects to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Session settings.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // --- Connection scope ---

    /// Open (or re-enter) the connection scope.
    ///
    /// Operations called before the matching [`disconnect`](Self::disconnect)
    /// reuse the link.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn connect(&mut self) -> Result<()> {
        self.enter().await?.disarm();
        Ok(())
    }

    /// Leave the connection scope entered by [`connect`](Self::connect),
    /// disconnecting when no other entry remains.
    ///
    /// With no entry open this still disconnects a link left up by an
    /// operation that was cancelled mid-flight.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn disconnect(&mut self) -> Result<()> {
        self.scope.exit(&mut self.transport, &mut self.router).await
    }

    /// Whether an open scope entry is holding the link.
    pub fn is_connected(&self) -> bool {
        self.scope.is_open()
    }

    /// Current connection scope depth.
    pub fn connection_depth(&self) -> u32 {
        self.scope.depth()
    }

    async fn enter(&mut self) -> Result<ScopeEntry> {
        self.scope
            .enter(&mut self.transport, &mut self.router, &self.address)
            .await
    }

    async fn close<R>(&mut self, entry: ScopeEntry, result: Result<R>) -> Result<R> {
        self.scope
            .close(&mut self.transport, &mut self.router, entry, result)
            .await
    }

    async fn read_characteristic(&mut self, uuid: Uuid) -> Result<Vec<u8>> {
        let handle = self.transport.find_characteristic(uuid).await?;
        let data = self.transport.read(handle).await?;
        debug!(%uuid, len = data.len(), "Read characteristic");
        Ok(data)
    }

    async fn write_characteristic(&mut self, uuid: Uuid, value: &[u8]) -> Result<()> {
        let handle = self.transport.find_characteristic(uuid).await?;
        self.transport
            .write(handle, value, WriteMode::WithResponse)
            .await?;
        debug!(%uuid, len = value.len(), "Wrote characteristic");
        Ok(())
    }

    async fn scoped_read(&mut self, uuid: Uuid) -> Result<Vec<u8>> {
        let entry = self.enter().await?;
        let result = self.read_characteristic(uuid).await;
        self.close(entry, result).await
    }

    async fn scoped_write(&mut self, uuid: Uuid, value: &[u8]) -> Result<()> {
        let entry = self.enter().await?;
        let result = self.write_characteristic(uuid, value).await;
        self.close(entry, result).await
    }

    // --- Live data ---

    fn throttled_sample(&self) -> Option<SensorSample> {
        let last = self.last_fetch?;
        if Instant::now() < last + self.config.min_fetch_interval {
            self.current
        } else {
            None
        }
    }

    /// Current temperature and humidity.
    ///
    /// Within [`SessionConfig::min_fetch_interval`] of the last successful
    /// fetch the cached sample is returned without touching the transport.
    /// Otherwise the session subscribes to live data and waits for one
    /// sample.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceUnresponsive`] if no sample arrives within the
    /// notification timeout.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn get_current_sample(&mut self) -> Result<SensorSample> {
        if let Some(sample) = self.throttled_sample() {
            debug!("Returning cached sample");
            return Ok(sample);
        }

        let entry = self.enter().await?;
        let result = self.acquire_live_sample().await;
        self.close(entry, result).await
    }

    async fn acquire_live_sample(&mut self) -> Result<SensorSample> {
        self.router
            .subscribe(&mut self.transport, uuids::LIVE_DATA, Subscription::LiveSample)
            .await?;

        let timeout = self.config.notification_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::DeviceUnresponsive { timeout });
            }
            let Some(notification) = self.transport.wait_for_notification(remaining).await? else {
                warn!(?timeout, "No live data from device");
                return Err(Error::DeviceUnresponsive { timeout });
            };

            match self
                .router
                .dispatch(notification.handle, &notification.value)?
            {
                Some(Routed::Sample(sample)) => {
                    self.current = Some(sample);
                    self.last_fetch = Some(Instant::now());
                    return Ok(sample);
                }
                Some(Routed::History(record)) => {
                    self.history.insert(record);
                }
                None => {}
            }
        }
    }

    /// Temperature in degrees Celsius (throttled, see
    /// [`get_current_sample`](Self::get_current_sample)).
    pub async fn temperature(&mut self) -> Result<f64> {
        Ok(self.get_current_sample().await?.temperature)
    }

    /// Relative humidity percentage.
    pub async fn humidity(&mut self) -> Result<u8> {
        Ok(self.get_current_sample().await?.humidity)
    }

    /// Cell voltage in millivolts, if the firmware reports it.
    pub async fn voltage_mv(&mut self) -> Result<Option<u16>> {
        Ok(self.get_current_sample().await?.voltage_mv)
    }

    /// Battery level derived from the live-data voltage, if reported.
    pub async fn battery_level(&mut self) -> Result<Option<u8>> {
        Ok(self.get_current_sample().await?.battery_level)
    }

    /// Last decoded sample, without I/O.
    pub fn current_sample(&self) -> Option<SensorSample> {
        self.current
    }

    // --- History ---

    /// Download history records until the device stops sending.
    ///
    /// Records are merged into the session's log by index; a repeated index
    /// overwrites the earlier value. A notification timeout marks the end of
    /// the stream and is not an error. Returns the whole accumulated log.
    #[tracing::instrument(level = "info", skip(self), fields(address = %self.address))]
    pub async fn fetch_history(&mut self) -> Result<HistoryLog> {
        let entry = self.enter().await?;
        let result = self.receive_history().await;
        self.close(entry, result).await
    }

    async fn receive_history(&mut self) -> Result<HistoryLog> {
        self.router
            .subscribe(&mut self.transport, uuids::HISTORY, Subscription::HistoryStream)
            .await?;

        let timeout = self.config.notification_timeout;
        let mut received = 0usize;
        while let Some(notification) = self.transport.wait_for_notification(timeout).await? {
            match self
                .router
                .dispatch(notification.handle, &notification.value)?
            {
                Some(Routed::History(record)) => {
                    self.history.insert(record);
                    received += 1;
                }
                Some(Routed::Sample(sample)) => self.current = Some(sample),
                None => {}
            }
        }

        info!(received, total = self.history.len(), "History stream ended");
        Ok(self.history.clone())
    }

    /// History accumulated so far, without I/O.
    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    /// Read the stored record counts.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn record_counts(&mut self) -> Result<RecordCounts> {
        let data = self.scoped_read(uuids::RECORD_COUNT).await?;
        Ok(decode_record_counts(&data)?)
    }

    /// Read the history cursor. A device that never had it set reports 0.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn history_cursor(&mut self) -> Result<u32> {
        let data = self.scoped_read(uuids::RECORD_INDEX).await?;
        Ok(decode_history_cursor(&data)?)
    }

    /// Set the index from which the next history download starts.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn set_history_cursor(&mut self, index: u32) -> Result<()> {
        self.scoped_write(uuids::RECORD_INDEX, &encode_history_cursor(index))
            .await
    }

    // --- Units ---

    /// Read the display units.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn get_units(&mut self) -> Result<UnitPreference> {
        let data = self.scoped_read(uuids::UNITS).await?;
        Ok(decode_unit_payload(&data)?)
    }

    /// Set the display units.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn set_units(&mut self, unit: UnitPreference) -> Result<()> {
        self.scoped_write(uuids::UNITS, &[encode_unit(unit)]).await
    }

    /// Set the display units from a name such as `"C"` or `"fahrenheit"`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] for any other name, before any I/O.
    pub async fn set_units_by_name(&mut self, name: &str) -> Result<()> {
        let unit: UnitPreference = name.parse()?;
        self.set_units(unit).await
    }

    // --- Clock ---

    /// Read the device clock and its timezone offset in hours.
    ///
    /// Firmware that stores no offset reports 0.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn get_clock(&mut self) -> Result<(OffsetDateTime, i8)> {
        let data = self.scoped_read(uuids::CLOCK).await?;
        let clock = decode_clock(&data)?;
        Ok((timestamp_from_epoch(clock.epoch_seconds), clock.tz_offset_hours))
    }

    /// Write `time` to the device clock along with the effective timezone
    /// offset (see [`tz_offset`](Self::tz_offset)).
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `time` is before 1970 or past the
    /// device's 32-bit epoch range.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn set_clock(&mut self, time: OffsetDateTime) -> Result<()> {
        let epoch = u32::try_from(time.unix_timestamp()).map_err(|_| {
            Error::invalid_argument(format!("{time} is outside the device clock range"))
        })?;
        let offset = self.tz_offset();
        debug!(epoch, offset, "Setting device clock");
        self.scoped_write(uuids::CLOCK, &encode_clock(epoch, offset))
            .await
    }

    /// Effective timezone offset: the override if set, otherwise the host's
    /// current offset.
    pub fn tz_offset(&self) -> i8 {
        self.config
            .tz_offset_override
            .unwrap_or_else(|| self.offset_source.current_utc_offset_hours())
    }

    /// Set or clear the timezone offset override.
    pub fn set_tz_offset(&mut self, offset: Option<i8>) {
        self.config.tz_offset_override = offset;
    }

    // --- Battery ---

    /// Read the battery percentage characteristic.
    #[tracing::instrument(level = "debug", skip(self), fields(address = %self.address))]
    pub async fn get_battery(&mut self) -> Result<u8> {
        let data = self.scoped_read(uuids::BATTERY).await?;
        Ok(decode_battery(&data)?)
    }
}

impl<T: GattTransport> Drop for SensorSession<T> {
    fn drop(&mut self) {
        if self.scope.has_stale_link() {
            warn!(
                device_address = %self.address,
                "SensorSession dropped with a link left by a cancelled operation"
            );
        } else if self.scope.is_open() {
            warn!(
                device_address = %self.address,
                depth = self.scope.depth(),
                "SensorSession dropped while connected. Call disconnect() for each connect()."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;
    use crate::timezone::FixedUtcOffset;

    const ADDR: &str = "E7:2E:00:B1:38:96";

    fn session(transport: &MockTransport) -> SensorSession<MockTransport> {
        SensorSession::new(ADDR, transport.clone()).with_offset_source(FixedUtcOffset(3))
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new()
            .notification_timeout(Duration::from_secs(1))
            .min_fetch_interval(Duration::ZERO)
            .tz_offset_override(Some(-5));
        assert_eq!(config.notification_timeout, Duration::from_secs(1));
        assert_eq!(config.min_fetch_interval, Duration::ZERO);
        assert_eq!(config.tz_offset_override, Some(-5));
    }

    #[test]
    fn test_tz_offset_prefers_override() {
        let transport = MockTransport::new();
        let mut session = session(&transport);
        assert_eq!(session.tz_offset(), 3);

        session.set_tz_offset(Some(-2));
        assert_eq!(session.tz_offset(), -2);

        session.set_tz_offset(None);
        assert_eq!(session.tz_offset(), 3);
    }

    #[tokio::test]
    async fn test_set_clock_rejects_out_of_range() {
        let transport = MockTransport::new();
        let mut session = session(&transport);

        let before_epoch = OffsetDateTime::UNIX_EPOCH - time::Duration::seconds(1);
        let err = session.set_clock(before_epoch).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_set_units_by_name_rejects_before_io() {
        let transport = MockTransport::new();
        let mut session = session(&transport);

        let err = session.set_units_by_name("kelvin").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(transport.connect_count(), 0);
    }

    #[tokio::test]
    async fn test_explicit_connect_is_reported() {
        let transport = MockTransport::new();
        let mut session = session(&transport);

        session.connect().await.unwrap();
        assert!(session.is_connected());
        assert_eq!(session.connection_depth(), 1);
        session.disconnect().await.unwrap();
        assert!(!session.is_connected());
    }

    #[test]
    fn test_debug_output() {
        let transport = MockTransport::new();
        let session = session(&transport);
        let debug = format!("{session:?}");
        assert!(debug.contains(ADDR));
        assert!(debug.contains("depth"));
    }
}
