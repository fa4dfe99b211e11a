//! Mock transport for deterministic testing of the link.
//!
//! [`MockTransport`] implements the [`Transport`] trait over a scripted
//! controller. It answers requests from two sources:
//!
//! - an ordered queue of one-shot expectations ([`MockTransport::expect`]);
//! - standing rules that answer every matching request
//!   ([`MockTransport::respond_to`]), for repeating traffic such as the
//!   telemetry poll.
//!
//! Clones share state, so a test keeps one handle for inspection while the
//! session owns another.
//!
//! # Example
//!
//! ```
//! use gimbal_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! mock.expect(b"R1[10]\r", b"R1[10];0;;");
//! mock.respond_to(b"TLM\r", b"1;0;0;0;0;0;0;;");
//! assert_eq!(mock.remaining_expectations(), 1);
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gimbal_core::error::{Error, Result};
use gimbal_core::transport::Transport;

/// A request and the bytes the mock controller answers it with.
#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug)]
struct MockState {
    /// One-shot expectations, consumed in order.
    expectations: VecDeque<Expectation>,
    /// Standing rules, checked after the next expectation.
    rules: Vec<Expectation>,
    /// Bytes waiting to be read.
    incoming: VecDeque<u8>,
    /// Largest chunk handed out per `receive()`, if limited.
    chunk_size: Option<usize>,
    connected: bool,
    lost: bool,
    /// Report end-of-stream once `incoming` is drained.
    eof: bool,
    sent_log: Vec<Vec<u8>>,
    close_count: usize,
}

/// A scripted [`Transport`] for tests that need no hardware.
///
/// `send()` records the bytes and matches them against, in order: the next
/// queued expectation, then the standing rules. A match queues the response
/// for reading. A request that matches nothing is accepted silently when no
/// expectations are queued, and rejected with [`Error::Protocol`] otherwise.
///
/// `receive()` returns queued bytes immediately. With nothing queued it
/// waits for the full timeout, then reports [`Error::Timeout`] unless bytes
/// arrived in the meantime.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            state: Arc::new(Mutex::new(MockState {
                expectations: VecDeque::new(),
                rules: Vec::new(),
                incoming: VecDeque::new(),
                chunk_size: None,
                connected: true,
                lost: false,
                eof: false,
                sent_log: Vec::new(),
                close_count: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a one-shot request/response pair.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.state().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Answer every `request` with `response` until the test ends.
    pub fn respond_to(&self, request: &[u8], response: &[u8]) {
        self.state().rules.push(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Make bytes available to read without any request, as if the
    /// controller sent them on its own.
    pub fn push_incoming(&self, bytes: &[u8]) {
        self.state().incoming.extend(bytes);
    }

    /// Number of bytes queued for reading.
    pub fn pending_incoming(&self) -> usize {
        self.state().incoming.len()
    }

    /// Limit how many bytes one `receive()` returns, to exercise frame
    /// reassembly. `None` removes the limit.
    pub fn set_chunk_size(&self, size: Option<usize>) {
        self.state().chunk_size = size.map(|n| n.max(1));
    }

    /// Everything sent so far, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state().sent_log.clone()
    }

    /// Return the number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.state().expectations.len()
    }

    /// Set the connected state.
    ///
    /// While disconnected, `send()` and `receive()` return
    /// [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Simulate the device disappearing.
    ///
    /// While set, `send()` and `receive()` return [`Error::ConnectionLost`].
    pub fn set_connection_lost(&self, lost: bool) {
        self.state().lost = lost;
    }

    /// Simulate the far end closing its side of the stream.
    ///
    /// While set, `receive()` hands out any queued bytes and then returns
    /// `Ok(0)` without waiting.
    pub fn set_eof(&self, eof: bool) {
        self.state().eof = eof;
    }

    /// How many times `close()` has been called.
    pub fn close_count(&self) -> usize {
        self.state().close_count
    }

    /// Bring the mock back up after a close or a simulated loss.
    pub fn reopen(&self) {
        let mut state = self.state();
        state.connected = true;
        state.lost = false;
    }

    fn check_link(state: &MockState) -> Result<()> {
        if state.lost {
            Err(Error::ConnectionLost)
        } else if !state.connected {
            Err(Error::NotConnected)
        } else {
            Ok(())
        }
    }

    /// Hand out queued bytes, if any.
    fn try_read(&self, buf: &mut [u8]) -> Option<Result<usize>> {
        let mut state = self.state();
        if let Err(e) = Self::check_link(&state) {
            return Some(Err(e));
        }
        if state.incoming.is_empty() {
            return state.eof.then_some(Ok(0));
        }

        let limit = state.chunk_size.unwrap_or(usize::MAX);
        let n = state.incoming.len().min(buf.len()).min(limit);
        for (slot, byte) in buf.iter_mut().zip(state.incoming.drain(..n)) {
            *slot = byte;
        }
        Some(Ok(n))
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut guard = self.state();
        let state = &mut *guard;
        Self::check_link(state)?;

        state.sent_log.push(data.to_vec());

        let next_matches = state
            .expectations
            .front()
            .is_some_and(|e| e.request == data);
        if next_matches {
            if let Some(expectation) = state.expectations.pop_front() {
                state.incoming.extend(expectation.response);
            }
            return Ok(());
        }

        if let Some(rule) = state.rules.iter().find(|r| r.request == data) {
            state.incoming.extend(&rule.response);
            return Ok(());
        }

        match state.expectations.front() {
            Some(expectation) => Err(Error::Protocol(format!(
                "unexpected send data: expected {:?}, got {:?}",
                String::from_utf8_lossy(&expectation.request),
                String::from_utf8_lossy(data)
            ))),
            None => Ok(()),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        if let Some(result) = self.try_read(buf) {
            return result;
        }
        tokio::time::sleep(timeout).await;
        self.try_read(buf).unwrap_or(Err(Error::Timeout))
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.connected = false;
        state.incoming.clear();
        state.close_count += 1;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let state = self.state();
        state.connected && !state.lost
    }
}
