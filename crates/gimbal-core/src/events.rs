//! Link state and event types.
//!
//! Events are emitted by the link through a [`tokio::sync::broadcast`]
//! channel when the connection state changes or the poller starts and
//! stops. UI collaborators subscribe to them instead of polling the link.
//!
//! [`tokio::sync::broadcast`]: https://docs.rs/tokio/latest/tokio/sync/broadcast/index.html

use std::fmt;

use crate::transport::PortInfo;

/// Connection lifecycle state of a transport session.
///
/// `Disconnected -> Connecting -> Open -> Disconnected`, with
/// `Open -> Reconnecting -> Open` when the same port is reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Open,
    Reconnecting,
}

impl LinkState {
    pub fn is_open(self) -> bool {
        self == LinkState::Open
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Open => "open",
            LinkState::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// An event emitted by the link.
///
/// Delivered on a best-effort basis through a bounded broadcast channel;
/// slow subscribers may miss events.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// The session moved to a new lifecycle state.
    StateChanged(LinkState),

    /// A port was opened successfully.
    Connected {
        /// The port that was opened.
        port: PortInfo,
    },

    /// The connection was closed or lost.
    Disconnected,

    /// The telemetry poller started.
    PollingStarted,

    /// The telemetry poller stopped.
    PollingStopped,
}
