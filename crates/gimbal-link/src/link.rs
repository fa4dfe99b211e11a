//! GimbalLink -- the shared handle to one serial link.
//!
//! [`GimbalLink`] ties a [`Session`] to an [`ExclusiveAccess`] scheduler.
//! Lifecycle calls go straight to the session. Every wire operation runs
//! inside [`run_exclusive`](GimbalLink::run_exclusive), so a one-off command
//! never shares the wire with a telemetry poll tick or with another one-off
//! operation.
//!
//! The handle is cheap to clone; all clones drive the same session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use gimbal_core::error::{Error, Result};
use gimbal_core::events::{LinkEvent, LinkState};
use gimbal_core::observer::LinkObserver;
use gimbal_core::transport::{PortInfo, PortOpener};

use crate::codec::encode_command;
use crate::config::LinkConfig;
use crate::exclusive::ExclusiveAccess;
use crate::registers::{parse_pairs, response_matches, RegisterPair};
use crate::session::Session;

/// Cloneable handle to a gimbal serial link.
#[derive(Clone)]
pub struct GimbalLink {
    session: Arc<Mutex<Session>>,
    access: ExclusiveAccess,
    config: Arc<LinkConfig>,
    event_tx: broadcast::Sender<LinkEvent>,
    observer: Arc<dyn LinkObserver>,
}

impl GimbalLink {
    /// Create a link in the `Disconnected` state.
    ///
    /// Most callers should use [`GimbalLinkBuilder`](crate::builder::GimbalLinkBuilder).
    pub fn new(
        opener: Box<dyn PortOpener>,
        config: LinkConfig,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let session = Session::new(opener, config.clone(), event_tx.clone(), observer.clone());
        GimbalLink {
            session: Arc::new(Mutex::new(session)),
            access: ExclusiveAccess::new(),
            config: Arc::new(config),
            event_tx,
            observer,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Ask the port opener for a port and open it.
    pub async fn open(&self) -> Result<()> {
        self.session.lock().await.open().await
    }

    /// Close the connection. Always succeeds.
    pub async fn close(&self) {
        self.session.lock().await.close().await;
    }

    /// Reopen the previously granted port.
    pub async fn reconnect(&self) -> Result<()> {
        self.session.lock().await.reconnect().await
    }

    pub async fn state(&self) -> LinkState {
        self.session.lock().await.state()
    }

    pub async fn is_open(&self) -> bool {
        self.session.lock().await.is_open()
    }

    /// The currently granted port, if any.
    pub async fn port(&self) -> Option<PortInfo> {
        self.session.lock().await.port().cloned()
    }

    /// Subscribe to link events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: LinkEvent) {
        let _ = self.event_tx.send(event);
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn observer(&self) -> &Arc<dyn LinkObserver> {
        &self.observer
    }

    /// The scheduler gating this link's wire.
    pub fn access(&self) -> &ExclusiveAccess {
        &self.access
    }

    // -----------------------------------------------------------------------
    // Exclusive wire operations
    // -----------------------------------------------------------------------

    /// Run a multi-step procedure with exclusive use of the wire.
    ///
    /// Link operations called from inside `op` join this hold instead of
    /// waiting for it.
    ///
    /// ```no_run
    /// # use std::time::Duration;
    /// # async fn example(link: gimbal_link::GimbalLink) -> gimbal_core::Result<()> {
    /// let reading = link
    ///     .run_exclusive(|| async {
    ///         link.send_msg("R1[20]=1").await?;
    ///         link.pause(Duration::from_millis(50)).await;
    ///         link.query_registers("R1[21]", Duration::from_millis(100), 3).await
    ///     })
    ///     .await?;
    /// println!("{reading:?}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_exclusive<F, Fut, T>(&self, op: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.access.run_exclusive(op).await
    }

    /// Send a fire-and-forget command.
    ///
    /// Sending with no open connection is a logged no-op.
    pub async fn send_msg(&self, command: &str) -> Result<()> {
        let bytes = encode_command(command)?;
        let session = &self.session;
        self.run_exclusive(move || async move { session.lock().await.write(&bytes).await })
            .await
    }

    /// Send a command and read one response frame.
    ///
    /// Returns an empty string if nothing arrived within `timeout`.
    pub async fn request(&self, command: &str, timeout: Duration) -> Result<String> {
        let bytes = encode_command(command)?;
        let session = &self.session;
        self.run_exclusive(move || async move {
            let mut session = session.lock().await;
            session.write(&bytes).await?;
            Ok::<_, Error>(session.read_once(timeout).await)
        })
        .await
    }

    /// Read one frame without sending anything.
    pub async fn read_frame(&self, timeout: Duration) -> String {
        let session = &self.session;
        self.run_exclusive(move || async move { session.lock().await.read_once(timeout).await })
            .await
    }

    /// Discard stale input until the line stays quiet for `timeout`.
    pub async fn flush(&self, timeout: Duration) {
        let session = &self.session;
        self.run_exclusive(move || async move { session.lock().await.flush(timeout).await })
            .await;
    }

    /// Hold the wire idle for `duration`, e.g. while an axis settles.
    pub async fn pause(&self, duration: Duration) {
        self.run_exclusive(move || tokio::time::sleep(duration)).await;
    }

    /// Read registers with a bounded retry.
    ///
    /// Flushes stale input, then sends `command` up to `attempts` times
    /// until a response carries every register index the command names.
    /// Returns [`Error::Timeout`] if no attempt produced a matching
    /// response.
    pub async fn query_registers(
        &self,
        command: &str,
        timeout: Duration,
        attempts: usize,
    ) -> Result<Vec<RegisterPair>> {
        let bytes = encode_command(command)?;
        let flush_timeout = self.config.flush_timeout;
        let session = &self.session;
        self.run_exclusive(move || async move {
            let mut session = session.lock().await;
            session.flush(flush_timeout).await;
            query_session(&mut session, command, &bytes, timeout, attempts).await
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Poller entry
    // -----------------------------------------------------------------------

    /// One telemetry poll exchange through the poller's entry point.
    ///
    /// Returns `None` when the tick was skipped, either because a one-off
    /// operation holds the wire, a cycle is already in flight, or the link
    /// is not open. Otherwise returns the response frame, which is empty on
    /// timeout.
    pub(crate) async fn poll_cycle(&self, command: &[u8], timeout: Duration) -> Option<String> {
        let session = &self.session;
        self.access
            .direct_access(move || async move {
                let mut session = session.lock().await;
                if !session.is_open() {
                    return None;
                }
                if let Err(e) = session.write(command).await {
                    debug!(error = %e, "poll write failed");
                    return None;
                }
                Some(session.read_once(timeout).await)
            })
            .await
            .flatten()
    }
}

async fn query_session(
    session: &mut Session,
    command: &str,
    bytes: &[u8],
    timeout: Duration,
    attempts: usize,
) -> Result<Vec<RegisterPair>> {
    for attempt in 1..=attempts.max(1) {
        session.write(bytes).await?;
        let frame = session.read_once(timeout).await;
        if frame.is_empty() {
            debug!(command, attempt, "no response to register query");
            continue;
        }
        let pairs = parse_pairs(&frame);
        if response_matches(command, &pairs) {
            return Ok(pairs);
        }
        debug!(command, attempt, response = %frame, "response does not match query");
    }
    Err(Error::Timeout)
}
