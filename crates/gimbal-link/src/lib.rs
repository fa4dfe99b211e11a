//! gimbal-link: serial command/response transport for a two-axis gimbal
//! controller.
//!
//! One half-duplex byte stream is shared between fire-and-forget control
//! commands, request/response register reads, and a continuous telemetry
//! poll. This crate keeps them off each other's bytes:
//!
//! - **Wire codec** ([`codec`]) -- command encoding, permissive chunked
//!   decoding, and frame-completion rules.
//! - **Register parser** ([`registers`]) -- splits responses into ordered
//!   key/value pairs.
//! - **Session** ([`session`]) -- the single connection slot with open,
//!   close, reconnect, and timeout-bounded read/write primitives.
//! - **Exclusive access** ([`exclusive`]) -- cooperative scheduling between
//!   the poller and one-off operations.
//! - **Link handle** ([`link`]) -- [`GimbalLink`], the cloneable entry point
//!   for gated wire operations.
//! - **Telemetry poller** ([`poller`]) -- the repeating, cancellable poll
//!   with UI throttling and recording.
//! - **Builder** ([`builder`]) and [`config`] -- link and poller settings.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use gimbal_link::{GimbalLinkBuilder, PollerConfig, TelemetryPoller};
//! use gimbal_transport::SerialPortOpener;
//!
//! # async fn example() -> gimbal_core::Result<()> {
//! let link = GimbalLinkBuilder::new()
//!     .build_and_open(SerialPortOpener::new())
//!     .await?;
//!
//! let mut poller = TelemetryPoller::new(link.clone(), PollerConfig::new());
//! poller.start().await?;
//!
//! // Pauses the poll for the duration of the exchange.
//! let pairs = link
//!     .query_registers("R1[10];R1[31]", Duration::from_millis(100), 3)
//!     .await?;
//! println!("{pairs:?}");
//!
//! poller.stop().await?;
//! link.close().await;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod codec;
pub mod config;
pub mod exclusive;
pub mod link;
pub mod poller;
pub mod registers;
pub mod session;

pub use builder::GimbalLinkBuilder;
pub use codec::{encode_command, FrameDecoder, FrameTerminator};
pub use config::{LinkConfig, PollerConfig};
pub use exclusive::ExclusiveAccess;
pub use link::GimbalLink;
pub use poller::{PollerStats, TelemetryPoller};
pub use registers::{RegisterKey, RegisterPair, RegisterValue};
