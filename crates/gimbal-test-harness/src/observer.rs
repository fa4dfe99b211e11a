//! Observer that records every callback for later assertions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use gimbal_core::events::LinkState;
use gimbal_core::observer::LinkObserver;
use gimbal_core::telemetry::TelemetrySample;

#[derive(Debug, Default)]
struct Recorded {
    recording: bool,
    samples: Vec<TelemetrySample>,
    records: Vec<(TelemetrySample, Duration)>,
    states: Vec<LinkState>,
    reset_count: usize,
}

/// A [`LinkObserver`] that stores what it is told.
///
/// Clones share storage; hand one clone to the link and inspect another.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Recorded> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Toggle the value reported by `is_recording()`.
    pub fn set_recording(&self, recording: bool) {
        self.inner().recording = recording;
    }

    /// Samples forwarded through `on_sample`.
    pub fn samples(&self) -> Vec<TelemetrySample> {
        self.inner().samples.clone()
    }

    /// Samples appended through `append_record`, with their elapsed time.
    pub fn records(&self) -> Vec<(TelemetrySample, Duration)> {
        self.inner().records.clone()
    }

    /// States reported through `on_connection_state_change`.
    pub fn states(&self) -> Vec<LinkState> {
        self.inner().states.clone()
    }

    pub fn reset_count(&self) -> usize {
        self.inner().reset_count
    }
}

impl LinkObserver for RecordingObserver {
    fn on_sample(&self, sample: &TelemetrySample) {
        self.inner().samples.push(*sample);
    }

    fn on_connection_state_change(&self, state: LinkState) {
        self.inner().states.push(state);
    }

    fn is_recording(&self) -> bool {
        self.inner().recording
    }

    fn append_record(&self, sample: &TelemetrySample, elapsed: Duration) {
        self.inner().records.push((*sample, elapsed));
    }

    fn reset_transient(&self) {
        self.inner().reset_count += 1;
    }
}
