//! Notification routing.
//!
//! The device only ever pushes two record shapes, so instead of a callback
//! registry the router keeps a map from handle to [`Subscription`] and decodes
//! each notification according to the kind registered for its handle.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use lywsd02_types::codec::{decode_history_record, decode_live_sample};
use lywsd02_types::{HistoryRecord, SensorSample};

use crate::error::Result;
use crate::transport::{CharacteristicHandle, GattTransport};

/// What a subscribed handle delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscription {
    /// Live temperature/humidity samples.
    LiveSample,
    /// History records, streamed until the device goes quiet.
    HistoryStream,
}

/// A decoded notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// A live sample arrived on a [`Subscription::LiveSample`] handle.
    Sample(SensorSample),
    /// A history record arrived on a [`Subscription::HistoryStream`] handle.
    History(HistoryRecord),
}

/// Maps characteristic handles to the kind of record they carry.
///
/// Entries are only valid for one physical connection and are cleared when
/// the connection scope closes.
#[derive(Debug, Default)]
pub struct NotificationRouter {
    routes: HashMap<CharacteristicHandle, Subscription>,
}

impl NotificationRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `uuid`, register its handle under `kind`, then enable
    /// notifications on it.
    ///
    /// If enabling fails the registration is rolled back.
    pub async fn subscribe<T>(
        &mut self,
        transport: &mut T,
        uuid: Uuid,
        kind: Subscription,
    ) -> Result<CharacteristicHandle>
    where
        T: GattTransport + ?Sized,
    {
        let handle = transport.find_characteristic(uuid).await?;
        self.routes.insert(handle, kind);

        if let Err(e) = transport.write_notify_descriptor(handle, true).await {
            self.routes.remove(&handle);
            return Err(e);
        }

        debug!(%handle, %uuid, ?kind, "Subscribed");
        Ok(handle)
    }

    /// Decode a notification according to its handle's subscription.
    ///
    /// Notifications on handles with no subscription are dropped and yield
    /// `Ok(None)`; some stacks deliver a few after the link was torn down.
    pub fn dispatch(&self, handle: CharacteristicHandle, value: &[u8]) -> Result<Option<Routed>> {
        let Some(kind) = self.routes.get(&handle) else {
            warn!(%handle, len = value.len(), "Dropping notification for unsubscribed handle");
            return Ok(None);
        };

        debug!(%handle, ?kind, len = value.len(), "Dispatching notification");
        let routed = match kind {
            Subscription::LiveSample => Routed::Sample(decode_live_sample(value)?),
            Subscription::HistoryStream => Routed::History(decode_history_record(value)?),
        };
        Ok(Some(routed))
    }

    /// The subscription registered for `handle`, if any.
    pub fn subscription(&self, handle: CharacteristicHandle) -> Option<Subscription> {
        self.routes.get(&handle).copied()
    }

    /// Forget all subscriptions.
    pub fn clear(&mut self) {
        if !self.routes.is_empty() {
            debug!(count = self.routes.len(), "Clearing notification routes");
        }
        self.routes.clear();
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no subscriptions are active.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
