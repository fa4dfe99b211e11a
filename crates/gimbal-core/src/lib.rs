//! gimbal-core: Core traits, types, and error definitions for the gimbal
//! serial link.
//!
//! This crate defines the hardware-agnostic abstractions the rest of the
//! workspace builds on. UI and recording collaborators depend on these types
//! without pulling in a serial backend.
//!
//! # Key types
//!
//! - [`Transport`] / [`PortOpener`] -- byte channel and device chooser
//! - [`TelemetrySample`] -- one validated telemetry frame
//! - [`LinkObserver`] -- callbacks into the UI/recording collaborator
//! - [`LinkEvent`] / [`LinkState`] -- connection lifecycle notifications
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod observer;
pub mod telemetry;
pub mod transport;

pub use error::{Error, Result};
pub use events::{LinkEvent, LinkState};
pub use observer::{LinkObserver, NullObserver};
pub use telemetry::TelemetrySample;
pub use transport::{PortInfo, PortOpener, Transport};
