//! Transport session: the single connection slot.
//!
//! A [`Session`] owns the port grant and the open [`Transport`], and is the
//! only place either is mutated. Everything above it goes through the
//! primitives here: [`open`](Session::open), [`close`](Session::close),
//! [`reconnect`](Session::reconnect), [`write`](Session::write),
//! [`read_once`](Session::read_once) and [`flush`](Session::flush).
//!
//! Benign conditions degrade softly instead of failing:
//!
//! - writing with no connection logs a warning and does nothing;
//! - a read that times out returns an empty frame;
//! - flushing never fails.
//!
//! Only connection establishment reports errors to the caller. A lost
//! connection (device unplugged) tears the session down to
//! [`LinkState::Disconnected`] and keeps the port grant so the user can
//! reconnect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use gimbal_core::error::{Error, Result};
use gimbal_core::events::{LinkEvent, LinkState};
use gimbal_core::observer::LinkObserver;
use gimbal_core::transport::{PortInfo, PortOpener, Transport};

use crate::codec::{FrameDecoder, FrameTerminator};
use crate::config::LinkConfig;

/// Maximum accumulated text before a frame is abandoned as noise.
const MAX_FRAME: usize = 8192;

/// Owner of the connection slot.
pub struct Session {
    opener: Box<dyn PortOpener>,
    config: LinkConfig,
    port: Option<PortInfo>,
    transport: Option<Box<dyn Transport>>,
    state: LinkState,
    decoder: FrameDecoder,
    /// Text received after the end of the last frame.
    backlog: String,
    event_tx: broadcast::Sender<LinkEvent>,
    observer: Arc<dyn LinkObserver>,
}

impl Session {
    pub fn new(
        opener: Box<dyn PortOpener>,
        config: LinkConfig,
        event_tx: broadcast::Sender<LinkEvent>,
        observer: Arc<dyn LinkObserver>,
    ) -> Self {
        Session {
            opener,
            config,
            port: None,
            transport: None,
            state: LinkState::Disconnected,
            decoder: FrameDecoder::new(),
            backlog: String::new(),
            event_tx,
            observer,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open() && self.transport.is_some()
    }

    /// Whether a transport handle is held, whatever the state.
    pub fn has_connection(&self) -> bool {
        self.transport.is_some()
    }

    /// The current port grant.
    pub fn port(&self) -> Option<&PortInfo> {
        self.port.as_ref()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, "link state change");
        self.state = state;
        let _ = self.event_tx.send(LinkEvent::StateChanged(state));
        self.observer.on_connection_state_change(state);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Ask for a port and open it.
    ///
    /// Any existing connection is closed first. On failure the session is
    /// left [`Disconnected`](LinkState::Disconnected).
    pub async fn open(&mut self) -> Result<()> {
        if self.transport.is_some() || self.port.is_some() {
            self.close().await;
        }

        self.set_state(LinkState::Connecting);

        let port = match self.opener.request_port().await {
            Ok(port) => port,
            Err(e) => {
                info!(error = %e, "no port granted");
                self.set_state(LinkState::Disconnected);
                return Err(as_connection_error(e));
            }
        };

        match self.opener.open(&port, self.config.baud_rate).await {
            Ok(transport) => {
                self.install(port, transport);
                Ok(())
            }
            Err(e) => {
                warn!(port = %port, error = %e, "failed to open port");
                self.set_state(LinkState::Disconnected);
                Err(as_connection_error(e))
            }
        }
    }

    /// Release the connection and forget the port grant. Always succeeds.
    pub async fn close(&mut self) {
        let had_connection = self.release().await;
        self.port = None;
        self.set_state(LinkState::Disconnected);
        if had_connection {
            let _ = self.event_tx.send(LinkEvent::Disconnected);
        }
    }

    /// Close and reopen the granted port at the same settings.
    ///
    /// On failure the session ends fully disconnected: no transport and no
    /// port grant.
    pub async fn reconnect(&mut self) -> Result<()> {
        let Some(port) = self.port.clone() else {
            return Err(Error::Connection("no port to reconnect".into()));
        };

        self.set_state(LinkState::Reconnecting);
        self.release().await;

        match self.opener.open(&port, self.config.baud_rate).await {
            Ok(transport) => {
                info!(port = %port, "reconnected");
                self.install(port, transport);
                Ok(())
            }
            Err(e) => {
                warn!(port = %port, error = %e, "reconnect failed");
                self.port = None;
                self.set_state(LinkState::Disconnected);
                let _ = self.event_tx.send(LinkEvent::Disconnected);
                Err(as_connection_error(e))
            }
        }
    }

    fn install(&mut self, port: PortInfo, transport: Box<dyn Transport>) {
        info!(port = %port, baud_rate = self.config.baud_rate, "link open");
        self.decoder.reset();
        self.backlog.clear();
        self.transport = Some(transport);
        self.port = Some(port.clone());
        self.set_state(LinkState::Open);
        let _ = self.event_tx.send(LinkEvent::Connected { port });
    }

    /// Close and drop the transport, if any. Returns whether one was held.
    async fn release(&mut self) -> bool {
        self.decoder.reset();
        self.backlog.clear();
        match self.transport.take() {
            Some(mut transport) => {
                if let Err(e) = transport.close().await {
                    debug!(error = %e, "error closing transport (ignored)");
                }
                true
            }
            None => false,
        }
    }

    async fn connection_lost(&mut self) {
        warn!(port = ?self.port.as_ref().map(|p| p.name.as_str()), "connection lost");
        self.release().await;
        self.set_state(LinkState::Disconnected);
        let _ = self.event_tx.send(LinkEvent::Disconnected);
    }

    // -----------------------------------------------------------------------
    // Wire primitives
    // -----------------------------------------------------------------------

    /// Transmit `data`.
    ///
    /// With no open connection this logs a warning and returns `Ok(())`.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let Some(transport) = self.transport.as_mut() else {
            warn!(bytes = data.len(), "write without an open connection, dropped");
            return Ok(());
        };

        match transport.send(data).await {
            Ok(()) => Ok(()),
            Err(Error::NotConnected) => {
                warn!(bytes = data.len(), "write on a closed transport, dropped");
                Ok(())
            }
            Err(Error::ConnectionLost) => {
                self.connection_lost().await;
                Err(Error::ConnectionLost)
            }
            Err(e) => Err(e),
        }
    }

    /// Read one frame, waiting at most `timeout`.
    ///
    /// Returns the trimmed frame text, or an empty string if no complete
    /// frame arrived in time. Text received after the frame terminator is
    /// kept for the next call.
    pub async fn read_once(&mut self, timeout: Duration) -> String {
        let terminator = self.config.terminator.clone();
        let mut text = std::mem::take(&mut self.backlog);
        if let Some(frame) = self.take_frame(&terminator, &text) {
            return frame;
        }

        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 256];

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let Some(transport) = self.transport.as_mut() else {
                break;
            };

            match transport.receive(&mut buf, deadline - now).await {
                Ok(0) => {
                    debug!("end of stream while reading frame");
                    break;
                }
                Ok(n) => {
                    text.push_str(&self.decoder.push(&buf[..n]));
                    if text.len() > MAX_FRAME {
                        warn!(len = text.len(), "frame buffer overflow, resyncing");
                        text.clear();
                        continue;
                    }
                    if let Some(frame) = self.take_frame(&terminator, &text) {
                        return frame;
                    }
                }
                Err(Error::Timeout) => break,
                Err(Error::ConnectionLost) => {
                    self.connection_lost().await;
                    return String::new();
                }
                Err(e) => {
                    debug!(error = %e, "read failed");
                    break;
                }
            }
        }

        if !text.is_empty() {
            debug!(partial = %text.escape_debug(), "read timed out mid-frame, discarding");
        } else {
            trace!(timeout_ms = timeout.as_millis() as u64, "read timed out");
        }
        String::new()
    }

    fn take_frame(&mut self, terminator: &FrameTerminator, text: &str) -> Option<String> {
        let (frame, rest) = terminator.split_frame(text)?;
        self.backlog = rest.to_string();
        Some(frame.trim().to_string())
    }

    /// Discard stale input until the line stays quiet for `timeout`.
    ///
    /// Stops on a stall, end-of-stream, or any read error. Never fails.
    pub async fn flush(&mut self, timeout: Duration) {
        self.decoder.reset();
        self.backlog.clear();

        let mut buf = [0u8; 256];
        let mut discarded = 0usize;

        while let Some(transport) = self.transport.as_mut() {
            match transport.receive(&mut buf, timeout).await {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(Error::ConnectionLost) => {
                    self.connection_lost().await;
                    break;
                }
                Err(_) => break,
            }
        }

        if discarded > 0 {
            debug!(discarded, "flushed stale input");
        }
    }
}

fn as_connection_error(e: Error) -> Error {
    match e {
        Error::Connection(_) => e,
        other => Error::Connection(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gimbal_core::observer::NullObserver;
    use gimbal_test_harness::{MockPortOpener, MockTransport};

    fn session_with(mock: &MockTransport) -> (Session, MockPortOpener) {
        let opener = MockPortOpener::new(mock.clone());
        let (event_tx, _) = broadcast::channel(16);
        let session = Session::new(
            Box::new(opener.clone()),
            LinkConfig::default(),
            event_tx,
            Arc::new(NullObserver),
        );
        (session, opener)
    }

    async fn open_session(mock: &MockTransport) -> (Session, MockPortOpener) {
        let (mut session, opener) = session_with(mock);
        session.open().await.unwrap();
        (session, opener)
    }

    // =======================================================================
    // Lifecycle
    // =======================================================================

    #[tokio::test]
    async fn open_moves_to_open() {
        let mock = MockTransport::new();
        let (session, opener) = open_session(&mock).await;
        assert_eq!(session.state(), LinkState::Open);
        assert!(session.is_open());
        assert_eq!(opener.open_count(), 1);
        assert_eq!(opener.last_baud_rate(), Some(115_200));
    }

    #[tokio::test]
    async fn open_cancelled_chooser_is_connection_error() {
        let mock = MockTransport::new();
        let (mut session, opener) = session_with(&mock);
        opener.set_cancel_chooser(true);

        let err = session.open().await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(!session.has_connection());
    }

    #[tokio::test]
    async fn open_failure_leaves_disconnected() {
        let mock = MockTransport::new();
        let (mut session, opener) = session_with(&mock);
        opener.set_fail_open(true);

        assert!(matches!(session.open().await, Err(Error::Connection(_))));
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(session.port().is_none());
    }

    #[tokio::test]
    async fn open_twice_replaces_connection() {
        let mock = MockTransport::new();
        let (mut session, opener) = open_session(&mock).await;
        session.open().await.unwrap();
        assert_eq!(opener.open_count(), 2);
        assert_eq!(mock.close_count(), 1);
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mock = MockTransport::new();
        let (mut session, _) = open_session(&mock).await;
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(!session.has_connection());
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn close_never_opened_is_fine() {
        let mock = MockTransport::new();
        let (mut session, _) = session_with(&mock);
        session.close().await;
        assert_eq!(session.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn reconnect_reopens_same_port() {
        let mock = MockTransport::new();
        let (mut session, opener) = open_session(&mock).await;
        let port = session.port().cloned();

        session.reconnect().await.unwrap();
        assert!(session.is_open());
        assert_eq!(session.port().cloned(), port);
        assert_eq!(opener.request_count(), 1);
        assert_eq!(opener.open_count(), 2);
    }

    #[tokio::test]
    async fn reconnect_failure_drops_everything() {
        let mock = MockTransport::new();
        let (mut session, opener) = open_session(&mock).await;
        opener.set_fail_open(true);

        assert!(matches!(
            session.reconnect().await,
            Err(Error::Connection(_))
        ));
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(!session.has_connection());
        assert!(session.port().is_none());
        assert!(!mock.is_connected());

        opener.set_fail_open(false);
        session.open().await.unwrap();
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn reconnect_without_grant_fails() {
        let mock = MockTransport::new();
        let (mut session, _) = session_with(&mock);
        assert!(matches!(
            session.reconnect().await,
            Err(Error::Connection(_))
        ));
        assert_eq!(session.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn state_changes_are_broadcast() {
        let mock = MockTransport::new();
        let (mut session, _) = session_with(&mock);
        let mut rx = session.event_tx.subscribe();

        session.open().await.unwrap();
        session.close().await;

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert_eq!(events[0], LinkEvent::StateChanged(LinkState::Connecting));
        assert_eq!(events[1], LinkEvent::StateChanged(LinkState::Open));
        assert!(matches!(events[2], LinkEvent::Connected { .. }));
        assert_eq!(events[3], LinkEvent::StateChanged(LinkState::Disconnected));
        assert_eq!(events[4], LinkEvent::Disconnected);
    }

    // =======================================================================
    // Wire primitives
    // =======================================================================

    #[tokio::test]
    async fn write_without_connection_is_soft() {
        let mock = MockTransport::new();
        let (mut session, _) = session_with(&mock);
        assert!(session.write(b"R1[1]=1\r").await.is_ok());
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn write_sends_bytes() {
        let mock = MockTransport::new();
        let (mut session, _) = open_session(&mock).await;
        session.write(b"R1[1]=1\r").await.unwrap();
        assert_eq!(mock.sent_data(), vec![b"R1[1]=1\r".to_vec()]);
    }

    #[tokio::test]
    async fn write_connection_lost_tears_down() {
        let mock = MockTransport::new();
        let (mut session, _) = open_session(&mock).await;
        mock.set_connection_lost(true);

        assert!(matches!(
            session.write(b"R1[1]=1\r").await,
            Err(Error::ConnectionLost)
        ));
        assert_eq!(session.state(), LinkState::Disconnected);
        assert!(!session.has_connection());
        // The grant survives a device error.
        assert!(session.port().is_some());
    }

    #[tokio::test]
    async fn read_once_single_chunk() {
        let mock = MockTransport::new();
        mock.expect(b"R1[10]\r", b"R1[10];0;;");
        let (mut session, _) = open_session(&mock).await;

        session.write(b"R1[10]\r").await.unwrap();
        let frame = session.read_once(Duration::from_millis(100)).await;
        assert_eq!(frame, "R1[10];0;;");
    }

    #[tokio::test]
    async fn read_once_accumulates_chunks() {
        let mock = MockTransport::new();
        mock.set_chunk_size(Some(3));
        mock.expect(b"TLM\r", b"1;2;3;4;5;6;7;;\r\n");
        let (mut session, _) = open_session(&mock).await;

        session.write(b"TLM\r").await.unwrap();
        let frame = session.read_once(Duration::from_millis(100)).await;
        assert_eq!(frame, "1;2;3;4;5;6;7;;");
    }

    #[tokio::test]
    async fn read_once_timeout_is_empty() {
        let mock = MockTransport::new();
        let (mut session, _) = open_session(&mock).await;
        let frame = session.read_once(Duration::from_millis(20)).await;
        assert_eq!(frame, "");
    }

    #[tokio::test]
    async fn read_once_partial_frame_is_discarded() {
        let mock = MockTransport::new();
        mock.push_incoming(b"R1[10];0;");
        let (mut session, _) = open_session(&mock).await;

        assert_eq!(session.read_once(Duration::from_millis(20)).await, "");

        // The next frame is not polluted by the discarded partial.
        mock.push_incoming(b"R1[11];5;;");
        assert_eq!(
            session.read_once(Duration::from_millis(20)).await,
            "R1[11];5;;"
        );
    }

    #[tokio::test]
    async fn read_once_keeps_backlog_after_terminator() {
        let mock = MockTransport::new();
        mock.push_incoming(b"R1[1];1;;R1[2];2;;");
        let (mut session, _) = open_session(&mock).await;

        assert_eq!(session.read_once(Duration::from_millis(20)).await, "R1[1];1;;");
        assert_eq!(session.read_once(Duration::from_millis(20)).await, "R1[2];2;;");
    }

    #[tokio::test]
    async fn read_once_trailing_terminator_rule() {
        let mock = MockTransport::new();
        mock.push_incoming(b"OK\r");
        let opener = MockPortOpener::new(mock.clone());
        let (event_tx, _) = broadcast::channel(16);
        let config = LinkConfig {
            terminator: FrameTerminator::line_or_semicolon(),
            ..LinkConfig::default()
        };
        let mut session = Session::new(Box::new(opener), config, event_tx, Arc::new(NullObserver));
        session.open().await.unwrap();

        assert_eq!(session.read_once(Duration::from_millis(20)).await, "OK");
    }

    #[tokio::test]
    async fn read_once_recovers_after_overflow() {
        let mock = MockTransport::new();
        // Terminator-free noise that overruns the frame limit on a read
        // boundary, followed by a real frame.
        let noise = vec![b'x'; (MAX_FRAME / 256 + 1) * 256];
        mock.push_incoming(&noise);
        mock.push_incoming(b"R1[5];9;;");
        let (mut session, _) = open_session(&mock).await;

        let frame = session.read_once(Duration::from_millis(50)).await;
        assert_eq!(frame, "R1[5];9;;");
        assert_eq!(mock.pending_incoming(), 0);
    }

    #[tokio::test]
    async fn read_once_overflow_never_returns_oversized_frame() {
        let mock = MockTransport::new();
        mock.push_incoming(&vec![b'x'; 3 * MAX_FRAME]);
        mock.push_incoming(b";;");
        let (mut session, _) = open_session(&mock).await;

        let frame = session.read_once(Duration::from_millis(50)).await;
        assert!(frame.len() <= MAX_FRAME, "frame of {} bytes", frame.len());
        assert!(frame.ends_with(";;"));
    }

    #[tokio::test(start_paused = true)]
    async fn read_once_stops_at_end_of_stream() {
        let mock = MockTransport::new();
        mock.push_incoming(b"R1[10];0;");
        let (mut session, _) = open_session(&mock).await;
        mock.set_eof(true);

        let start = Instant::now();
        assert_eq!(session.read_once(Duration::from_secs(5)).await, "");
        assert!(start.elapsed() < Duration::from_secs(5));
        // End-of-stream is not a lost device.
        assert!(session.is_open());

        mock.set_eof(false);
        mock.push_incoming(b"R1[11];5;;");
        assert_eq!(
            session.read_once(Duration::from_millis(20)).await,
            "R1[11];5;;"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn flush_stops_at_end_of_stream() {
        let mock = MockTransport::new();
        mock.push_incoming(b"stale;junk;;");
        let (mut session, _) = open_session(&mock).await;
        mock.set_eof(true);

        let start = Instant::now();
        session.flush(Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(mock.pending_incoming(), 0);
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn read_once_without_connection_is_empty() {
        let mock = MockTransport::new();
        let (mut session, _) = session_with(&mock);
        assert_eq!(session.read_once(Duration::from_millis(10)).await, "");
    }

    #[tokio::test]
    async fn read_once_connection_lost_tears_down() {
        let mock = MockTransport::new();
        let (mut session, _) = open_session(&mock).await;
        mock.set_connection_lost(true);

        assert_eq!(session.read_once(Duration::from_millis(10)).await, "");
        assert_eq!(session.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn flush_discards_stale_input() {
        let mock = MockTransport::new();
        mock.push_incoming(b"stale;junk;;more");
        let (mut session, _) = open_session(&mock).await;

        session.flush(Duration::from_millis(10)).await;
        assert_eq!(mock.pending_incoming(), 0);
        assert_eq!(session.read_once(Duration::from_millis(10)).await, "");
    }

    #[tokio::test]
    async fn flush_without_connection_is_noop() {
        let mock = MockTransport::new();
        let (mut session, _) = session_with(&mock);
        session.flush(Duration::from_millis(10)).await;
        assert_eq!(session.state(), LinkState::Disconnected);
    }
}
