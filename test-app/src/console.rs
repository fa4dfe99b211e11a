// Console collaborator: prints forwarded samples and counts recorded ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gimbal::{LinkObserver, LinkState, TelemetrySample};

pub struct ConsoleObserver {
    recording: bool,
    recorded: AtomicU64,
}

impl ConsoleObserver {
    pub fn new(recording: bool) -> Self {
        ConsoleObserver {
            recording,
            recorded: AtomicU64::new(0),
        }
    }

    pub fn recorded(&self) -> u64 {
        self.recorded.load(Ordering::Relaxed)
    }
}

impl LinkObserver for ConsoleObserver {
    fn on_sample(&self, s: &TelemetrySample) {
        println!(
            "mode={:<3} pos={:>9.1} {:>9.1}  vel={:>8.1} {:>8.1}  cur={:>7.1} {:>7.1}",
            s.system_mode, s.pos_tr, s.pos_el, s.vel_tr, s.vel_el, s.cur_tr, s.cur_el
        );
    }

    fn on_connection_state_change(&self, state: LinkState) {
        eprintln!("[link] {state}");
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn append_record(&self, _sample: &TelemetrySample, _elapsed: Duration) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }
}
