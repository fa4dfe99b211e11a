//! Telemetry poller.
//!
//! A [`TelemetryPoller`] runs a repeating tick task on its own tokio task.
//! Each tick sends the telemetry read command through the link's
//! [`direct_access`](crate::exclusive::ExclusiveAccess::direct_access)
//! entry and waits a short time for one frame. Ticks are dropped, never
//! queued, while a one-off operation holds the wire.
//!
//! Accepted samples take two independent routes:
//!
//! - to [`LinkObserver::on_sample`], at most once per UI interval;
//! - to [`LinkObserver::append_record`], every one, while the observer
//!   reports that it is recording.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use gimbal_core::error::{Error, Result};
use gimbal_core::events::LinkEvent;
use gimbal_core::observer::LinkObserver;
use gimbal_core::telemetry::TelemetrySample;

use crate::codec::encode_command;
use crate::config::PollerConfig;
use crate::link::GimbalLink;

/// Counter snapshot for a poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Ticks that exchanged a command with the device.
    pub ticks: u64,
    /// Ticks dropped because the wire was held or the link was closed.
    pub skipped: u64,
    /// Frames that parsed into a valid sample.
    pub accepted: u64,
    /// Frames that failed validation.
    pub rejected: u64,
    /// Samples forwarded to the UI after throttling.
    pub forwarded: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    skipped: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    forwarded: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PollerStats {
        PollerStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Repeating, cancellable telemetry poll over a [`GimbalLink`].
pub struct TelemetryPoller {
    link: GimbalLink,
    config: PollerConfig,
    running: Option<Running>,
    counters: Arc<Counters>,
}

impl TelemetryPoller {
    pub fn new(link: GimbalLink, config: PollerConfig) -> Self {
        TelemetryPoller {
            link,
            config,
            running: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn stats(&self) -> PollerStats {
        self.counters.snapshot()
    }

    /// Enable streaming on the device and start ticking.
    ///
    /// A no-op if already running. Fails if the period is zero, if one of
    /// the configured commands cannot be encoded, or if the streaming
    /// directive hits a lost connection.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("poller already running");
            return Ok(());
        }

        if self.config.period.is_zero() {
            return Err(Error::InvalidConfig("poll period must be non-zero".into()));
        }

        let read_command = encode_command(&self.config.read_command)?;
        if let Some(directive) = &self.config.stream_on {
            self.link.send_msg(directive).await?;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            self.link.clone(),
            read_command,
            self.config.clone(),
            self.counters.clone(),
            cancel.clone(),
        ));
        self.running = Some(Running { cancel, task });

        info!(
            period_ms = self.config.period.as_millis() as u64,
            ui_interval_ms = self.config.ui_interval.as_millis() as u64,
            "telemetry polling started"
        );
        self.link.emit(LinkEvent::PollingStarted);
        Ok(())
    }

    /// Stop ticking, disable streaming, and clear the observer's transient
    /// state.
    ///
    /// Waits for an in-flight tick to finish; its read is bounded by the
    /// poll read timeout. A no-op if not running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };

        running.cancel.cancel();
        if let Err(e) = running.task.await {
            warn!(error = %e, "poll task ended abnormally");
        }

        let result = match &self.config.stream_off {
            Some(directive) => self.link.send_msg(directive).await,
            None => Ok(()),
        };
        self.link.observer().reset_transient();

        info!(stats = ?self.stats(), "telemetry polling stopped");
        self.link.emit(LinkEvent::PollingStopped);
        result
    }
}

impl Drop for TelemetryPoller {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}

async fn poll_loop(
    link: GimbalLink,
    read_command: Vec<u8>,
    config: PollerConfig,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let mut router = SampleRouter::new(link.observer().clone(), config.ui_interval, Instant::now());
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("poll task cancelled");
                break;
            }

            _ = ticker.tick() => {}
        }

        let Some(frame) = link.poll_cycle(&read_command, config.read_timeout).await else {
            Counters::bump(&counters.skipped);
            trace!("poll tick skipped");
            continue;
        };
        Counters::bump(&counters.ticks);

        if frame.is_empty() {
            trace!("no telemetry frame");
            continue;
        }

        match TelemetrySample::parse(&frame) {
            Ok(sample) => {
                Counters::bump(&counters.accepted);
                if router.route(&sample, Instant::now()) {
                    Counters::bump(&counters.forwarded);
                }
            }
            Err(e) => {
                Counters::bump(&counters.rejected);
                trace!(error = %e, frame = %frame.escape_debug(), "telemetry frame rejected");
            }
        }
    }
}

/// Minimum-interval gate.
#[derive(Debug)]
pub(crate) struct Throttle {
    interval: Duration,
    last: Option<Instant>,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Throttle {
            interval,
            last: None,
        }
    }

    /// Whether an event at `now` may pass. A pass restarts the interval.
    pub(crate) fn ready(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Sends accepted samples to the recording sink and, throttled, to the UI.
pub(crate) struct SampleRouter {
    observer: Arc<dyn LinkObserver>,
    throttle: Throttle,
    started: Instant,
}

impl SampleRouter {
    pub(crate) fn new(observer: Arc<dyn LinkObserver>, ui_interval: Duration, started: Instant) -> Self {
        SampleRouter {
            observer,
            throttle: Throttle::new(ui_interval),
            started,
        }
    }

    /// Route one accepted sample. Returns whether it went to the UI.
    pub(crate) fn route(&mut self, sample: &TelemetrySample, now: Instant) -> bool {
        if self.observer.is_recording() {
            self.observer
                .append_record(sample, now.saturating_duration_since(self.started));
        }
        let forward = self.throttle.ready(now);
        if forward {
            self.observer.on_sample(sample);
        }
        forward
    }
}
