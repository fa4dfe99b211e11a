//! GimbalLinkBuilder -- fluent builder for [`GimbalLink`] instances.
//!
//! Separates configuration from construction so that callers can set the
//! baud rate, timeouts, and framing rule before any port is requested.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use gimbal_link::builder::GimbalLinkBuilder;
//! use gimbal_transport::SerialPortOpener;
//!
//! # async fn example() -> gimbal_core::Result<()> {
//! let link = GimbalLinkBuilder::new()
//!     .baud_rate(230_400)
//!     .read_timeout(Duration::from_millis(300))
//!     .build_and_open(SerialPortOpener::with_port("/dev/ttyACM0"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use gimbal_core::error::Result;
use gimbal_core::observer::{LinkObserver, NullObserver};
use gimbal_core::transport::PortOpener;

use crate::codec::FrameTerminator;
use crate::config::LinkConfig;
use crate::link::GimbalLink;

/// Fluent builder for [`GimbalLink`].
///
/// Every setting has a default, so the simplest usage is:
///
/// ```ignore
/// let link = GimbalLinkBuilder::new().build(opener);
/// ```
pub struct GimbalLinkBuilder {
    config: LinkConfig,
    observer: Arc<dyn LinkObserver>,
}

impl GimbalLinkBuilder {
    pub fn new() -> Self {
        GimbalLinkBuilder {
            config: LinkConfig::default(),
            observer: Arc::new(NullObserver),
        }
    }

    /// Baud rate used for open and reconnect (default: 115200).
    pub fn baud_rate(mut self, baud: u32) -> Self {
        self.config.baud_rate = baud;
        self
    }

    /// Read timeout for one-off requests (default: 200ms).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Stall time that ends a flush (default: 30ms).
    pub fn flush_timeout(mut self, timeout: Duration) -> Self {
        self.config.flush_timeout = timeout;
        self
    }

    /// Frame-completion rule (default: [`FrameTerminator::DoubleSemicolon`]).
    pub fn frame_terminator(mut self, terminator: FrameTerminator) -> Self {
        self.config.terminator = terminator;
        self
    }

    /// Capacity of the event broadcast channel (default: 64).
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// UI/recording collaborator (default: [`NullObserver`]).
    pub fn observer(mut self, observer: Arc<dyn LinkObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Build a disconnected link around `opener`.
    pub fn build(self, opener: impl PortOpener + 'static) -> GimbalLink {
        GimbalLink::new(Box::new(opener), self.config, self.observer)
    }

    /// Build a link and open it.
    pub async fn build_and_open(self, opener: impl PortOpener + 'static) -> Result<GimbalLink> {
        let link = self.build(opener);
        link.open().await?;
        Ok(link)
    }
}

impl Default for GimbalLinkBuilder {
    fn default() -> Self {
        Self::new()
    }
}
