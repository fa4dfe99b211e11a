//! Transport implementations for the gimbal link.
//!
//! - [`SerialTransport`]: USB CDC virtual COM ports and RS-232 connections
//!   to the gimbal controller
//! - [`SerialPortOpener`]: the device chooser, granting a port by name or
//!   picking the first USB serial device found
//!
//! # Example
//!
//! ```no_run
//! use gimbal_transport::SerialTransport;
//! use gimbal_core::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> gimbal_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyACM0", 115_200).await?;
//! transport.send(b"R1[1]=1\r").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_millis(50)).await?;
//! # Ok(())
//! # }
//! ```

pub mod opener;
pub mod serial;

pub use opener::{SerialPortOpener, list_ports};
pub use serial::{SerialConfig, SerialTransport};
