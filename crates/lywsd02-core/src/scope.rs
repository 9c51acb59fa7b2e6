//! Reentrant connection scope.
//!
//! One physical link is shared by every nested operation on a session. The
//! scope counts entries: the first [`enter`](ConnectionScope::enter) connects,
//! the matching last [`exit`](ConnectionScope::exit) clears the notification
//! routes and disconnects.
//!
//! Each entry hands out a [`ScopeEntry`]. An operation that completes disarms
//! it and exits normally. An operation whose future is dropped first, by a
//! timeout or a panic for instance, leaves an armed entry behind, and its
//! drop marks the depth as abandoned. The next `enter` or `exit` reconciles
//! the depth and, if the link was left up with nobody inside, disconnects it
//! before doing anything else.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::router::NotificationRouter;
use crate::transport::GattTransport;

/// Depth counter around a single physical connection.
#[derive(Debug, Default)]
pub struct ConnectionScope {
    depth: u32,
    link_open: bool,
    abandoned: Arc<AtomicU32>,
}

/// Token for one level of a [`ConnectionScope`].
///
/// Dropping an armed entry gives its level back to the scope; the link is
/// released on the next use of the scope. Call [`disarm`](Self::disarm) once
/// the level will be left through [`ConnectionScope::exit`].
#[must_use = "dropping the entry immediately abandons the scope level"]
#[derive(Debug)]
pub struct ScopeEntry {
    abandoned: Arc<AtomicU32>,
    armed: bool,
}

impl ScopeEntry {
    /// Keep the level; the caller exits the scope itself.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ScopeEntry {
    fn drop(&mut self) {
        if self.armed {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
            warn!("Operation dropped inside connection scope; the link will be released on next use");
        }
    }
}

impl ConnectionScope {
    /// Create a closed scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth, not counting abandoned entries.
    pub fn depth(&self) -> u32 {
        self.depth.saturating_sub(self.abandoned.load(Ordering::SeqCst))
    }

    /// Whether an entry is holding the link.
    pub fn is_open(&self) -> bool {
        self.depth() > 0
    }

    /// Whether the link is up with no entry left to release it.
    pub fn has_stale_link(&self) -> bool {
        self.link_open && !self.is_open()
    }

    fn reconcile(&mut self) {
        let abandoned = self.abandoned.swap(0, Ordering::SeqCst);
        if abandoned > 0 {
            self.depth = self.depth.saturating_sub(abandoned);
            debug!(abandoned, depth = self.depth, "Reclaimed abandoned scope levels");
        }
    }

    async fn release<T>(&mut self, transport: &mut T, router: &mut NotificationRouter) -> Result<()>
    where
        T: GattTransport + ?Sized,
    {
        router.clear();
        info!("Disconnecting from device...");
        let result = transport.disconnect().await;
        // Only cleared once the disconnect has run; a cancelled disconnect is
        // retried on the next use.
        self.link_open = false;
        result
    }

    /// Enter the scope, connecting to `address` if this is the outermost
    /// entry.
    ///
    /// A link left up by an abandoned operation is disconnected first. A
    /// failed connect leaves the depth unchanged.
    pub async fn enter<T>(
        &mut self,
        transport: &mut T,
        router: &mut NotificationRouter,
        address: &str,
    ) -> Result<ScopeEntry>
    where
        T: GattTransport + ?Sized,
    {
        self.reconcile();
        if self.depth == 0 {
            if self.link_open {
                warn!(address, "Releasing link left open by a dropped operation");
                if let Err(e) = self.release(transport, router).await {
                    warn!(error = %e, "Disconnect of stale link failed");
                }
            }
            info!(address, "Connecting to device...");
            self.link_open = true;
            if let Err(e) = transport.connect(address).await {
                self.link_open = false;
                return Err(e);
            }
            info!(address, "Connected");
        }
        self.depth += 1;
        debug!(depth = self.depth, "Entered connection scope");
        Ok(ScopeEntry {
            abandoned: Arc::clone(&self.abandoned),
            armed: true,
        })
    }

    /// Leave the scope. When the depth drops to 0 the router is cleared and
    /// the transport disconnected.
    ///
    /// The depth is decremented before disconnecting, so a failed disconnect
    /// still leaves the scope closed. Exiting a closed scope only releases a
    /// link left up by an abandoned operation; otherwise it is a no-op.
    pub async fn exit<T>(&mut self, transport: &mut T, router: &mut NotificationRouter) -> Result<()>
    where
        T: GattTransport + ?Sized,
    {
        self.reconcile();
        if self.depth == 0 {
            if self.link_open {
                return self.release(transport, router).await;
            }
            warn!("Connection scope exited more times than entered");
            return Ok(());
        }

        self.depth -= 1;
        debug!(depth = self.depth, "Left connection scope");
        if self.depth > 0 {
            return Ok(());
        }

        self.release(transport, router).await
    }

    /// Exit the scope after an operation and merge the outcomes.
    ///
    /// The operation's error wins over a disconnect error; the latter is
    /// logged. On success, a disconnect error is returned instead.
    pub async fn close<T, R>(
        &mut self,
        transport: &mut T,
        router: &mut NotificationRouter,
        entry: ScopeEntry,
        result: Result<R>,
    ) -> Result<R>
    where
        T: GattTransport + ?Sized,
    {
        entry.disarm();
        let closed = self.exit(transport, router).await;
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(disconnect_err)) => {
                warn!(error = %disconnect_err, "Disconnect failed while unwinding an error");
                Err(e)
            }
        }
    }
}
