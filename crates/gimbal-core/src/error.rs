//! Error types for the gimbal link.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Connection, transport, and protocol
//! failures are all captured here.
//!
//! Several conditions are not errors at the API surface:
//! a read that times out yields an empty frame, and a write with no open
//! connection is logged and dropped. See `gimbal-link`'s session module.

/// The error type for all gimbal link operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Establishing the connection failed: the device chooser was
    /// cancelled, or the port could not be opened or reopened.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transport-level error (serial port, USB CDC).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (unexpected response shape).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A telemetry frame failed field-count or numeric validation.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// A command contained a byte that cannot be framed (CR or NUL).
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A configuration value the link cannot run with.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timed out waiting for a matching response from the device.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the device has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the device was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
