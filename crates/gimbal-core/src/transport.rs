//! Transport and port-opener traits for gimbal communication.
//!
//! The [`Transport`] trait abstracts over the physical byte channel to the
//! gimbal controller. One `Transport` value owns both directions of the
//! channel: the writer and the reader are released together by
//! [`Transport::close`].
//!
//! [`PortOpener`] abstracts the "device chooser" step: granting access to a
//! physical port and opening it at the configured settings. The session
//! keeps the granted [`PortInfo`] so that a reconnect can reopen the same
//! port without asking again.
//!
//! Both traits are implemented for real serial hardware in
//! `gimbal-transport` and for deterministic tests in `gimbal-test-harness`.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Baud rate of current controller firmware, used when none is configured.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Asynchronous byte-level transport to the gimbal controller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the device.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying channel.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the device into the provided buffer.
    ///
    /// Returns the number of bytes read. `Ok(0)` means the channel reported
    /// end-of-stream. Waits up to `timeout` for data to arrive; returns
    /// [`Error::Timeout`](crate::error::Error::Timeout) if nothing arrives
    /// within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Release the writer and reader and close the channel.
    ///
    /// Must be idempotent: closing an already-closed transport succeeds.
    /// After `close()`, `send()` and `receive()` return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}

/// Identity of a physical port granted by the device chooser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// OS path or name of the port (e.g. `/dev/ttyACM0`, `COM4`).
    pub name: String,
    /// Optional human-readable description (USB product string).
    pub description: Option<String>,
}

impl PortInfo {
    pub fn new(name: impl Into<String>) -> Self {
        PortInfo {
            name: name.into(),
            description: None,
        }
    }
}

impl fmt::Display for PortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{} ({})", self.name, desc),
            None => f.write_str(&self.name),
        }
    }
}

/// Grants and opens physical ports.
#[async_trait]
pub trait PortOpener: Send + Sync {
    /// Ask for a port to use.
    ///
    /// Returns [`Error::Connection`](crate::error::Error::Connection) when
    /// the chooser is cancelled or no port is available.
    async fn request_port(&mut self) -> Result<PortInfo>;

    /// Open the granted port at `baud_rate`.
    ///
    /// Returns [`Error::Connection`](crate::error::Error::Connection) when
    /// the port cannot be opened.
    async fn open(&mut self, port: &PortInfo, baud_rate: u32) -> Result<Box<dyn Transport>>;
}
