//! # gimbal -- serial control for two-axis gimbal controllers
//!
//! `gimbal` is an asynchronous Rust library for driving a motorized pan/tilt
//! gimbal over its serial register protocol. One half-duplex link carries
//! control commands (`R1[n]=v`), register reads for setup procedures, and a
//! continuous telemetry poll; this library keeps them from interleaving.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use gimbal::{GimbalLinkBuilder, PollerConfig, TelemetryPoller};
//! use gimbal::serial::SerialPortOpener;
//!
//! #[tokio::main]
//! async fn main() -> gimbal::Result<()> {
//!     let link = GimbalLinkBuilder::new()
//!         .baud_rate(115_200)
//!         .build_and_open(SerialPortOpener::with_port("/dev/ttyACM0"))
//!         .await?;
//!
//!     let mut poller = TelemetryPoller::new(link.clone(), PollerConfig::new());
//!     poller.start().await?;
//!
//!     link.send_msg("R1[1]=1").await?;
//!     let pairs = link
//!         .query_registers("R1[10];R1[31]", Duration::from_millis(100), 3)
//!         .await?;
//!     println!("{pairs:?}");
//!
//!     poller.stop().await?;
//!     link.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! | Crate                 | Purpose                                              |
//! |-----------------------|------------------------------------------------------|
//! | `gimbal-core`         | Errors, transport traits, events, telemetry sample   |
//! | `gimbal-transport`    | tokio-serial transport and port chooser              |
//! | `gimbal-link`         | Codec, register parser, session, scheduler, poller   |
//! | **`gimbal`**          | This facade crate -- re-exports everything           |
//!
//! ## Feature Flags
//!
//! | Feature  | Enables                                   | Default |
//! |----------|-------------------------------------------|---------|
//! | `serial` | [`serial`] module (tokio-serial backend)  | yes     |
//!
//! Without `serial`, bring your own [`Transport`] and [`PortOpener`].

pub use gimbal_core::*;

pub use gimbal_link::{
    builder, codec, config, exclusive, link, poller, registers, session, encode_command,
    ExclusiveAccess, FrameDecoder, FrameTerminator, GimbalLink, GimbalLinkBuilder, LinkConfig,
    PollerConfig, PollerStats, RegisterKey, RegisterPair, RegisterValue, TelemetryPoller,
};

/// Serial port backend.
///
/// Provides [`SerialTransport`](serial::SerialTransport) and
/// [`SerialPortOpener`](serial::SerialPortOpener), plus
/// [`list_ports`](serial::list_ports) for building a device chooser.
#[cfg(feature = "serial")]
pub mod serial {
    pub use gimbal_transport::*;
}
