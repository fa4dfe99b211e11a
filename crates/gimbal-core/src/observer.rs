//! Collaborator interface consumed by the link.
//!
//! The UI and the recorder live outside this workspace. The link calls into
//! them through [`LinkObserver`]; every method has a no-op default so a
//! collaborator only implements what it cares about.

use std::time::Duration;

use crate::events::LinkState;
use crate::telemetry::TelemetrySample;

/// Receives samples and state changes from the link.
///
/// Methods are called from the poller task and from whichever task drives
/// the session, so implementations must be cheap and must not block.
pub trait LinkObserver: Send + Sync + 'static {
    /// A validated sample passed the UI throttle.
    fn on_sample(&self, _sample: &TelemetrySample) {}

    /// The session changed lifecycle state.
    fn on_connection_state_change(&self, _state: LinkState) {}

    /// Whether accepted samples should be appended to the recording sink.
    fn is_recording(&self) -> bool {
        false
    }

    /// Append an accepted sample to the recording sink. `elapsed` is the
    /// time since polling started.
    fn append_record(&self, _sample: &TelemetrySample, _elapsed: Duration) {}

    /// Polling stopped; drop per-session tracking such as the last-seen
    /// angle.
    fn reset_transient(&self) {}
}

/// Observer that ignores everything.
pub struct NullObserver;

impl LinkObserver for NullObserver {}
