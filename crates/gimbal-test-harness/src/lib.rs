//! gimbal-test-harness: Test utilities and mock collaborators for the gimbal
//! link.
//!
//! This crate provides [`MockTransport`] for deterministic testing of the
//! session, scheduler, and poller without a controller attached,
//! [`MockPortOpener`] for driving the connection lifecycle, and
//! [`RecordingObserver`] for asserting on what reaches the UI and recording
//! collaborators.

pub mod mock_serial;
pub mod observer;
pub mod opener;

pub use mock_serial::MockTransport;
pub use observer::RecordingObserver;
pub use opener::MockPortOpener;
