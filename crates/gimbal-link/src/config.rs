//! Link and poller configuration.
//!
//! Everything here is deployment configuration: baud rate, framing rule,
//! timeouts, and the telemetry command set differ between controller
//! firmware revisions.

use std::time::Duration;

use crate::codec::FrameTerminator;

pub use gimbal_core::transport::DEFAULT_BAUD_RATE;

/// Session-level settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Serial baud rate used for open and reconnect.
    pub baud_rate: u32,
    /// Read timeout for one-off requests.
    pub read_timeout: Duration,
    /// Stall time that ends a flush.
    pub flush_timeout: Duration,
    /// Frame-completion rule.
    pub terminator: FrameTerminator,
    /// Capacity of the [`LinkEvent`](gimbal_core::LinkEvent) broadcast channel.
    pub event_capacity: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_millis(200),
            flush_timeout: Duration::from_millis(30),
            terminator: FrameTerminator::default(),
            event_capacity: 64,
        }
    }
}

/// Telemetry poller settings.
///
/// The command defaults match current firmware. Override them with the
/// fluent setters for other revisions.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wire polling period.
    pub period: Duration,
    /// Minimum spacing between samples forwarded to the UI.
    pub ui_interval: Duration,
    /// Read timeout for one poll response. Keep it below `period`.
    pub read_timeout: Duration,
    /// Multi-register read command answered with a telemetry frame.
    pub read_command: String,
    /// Directive sent before polling starts, if any.
    pub stream_on: Option<String>,
    /// Directive sent after polling stops, if any.
    pub stream_off: Option<String>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        PollerConfig {
            period: Duration::from_millis(20),
            ui_interval: Duration::from_millis(100),
            read_timeout: Duration::from_millis(15),
            read_command: "TLM".into(),
            stream_on: Some("STREAM=1".into()),
            stream_off: Some("STREAM=0".into()),
        }
    }
}

impl PollerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the polling period. The poll read timeout is clamped to stay
    /// below it.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = period;
        if self.read_timeout >= period {
            self.read_timeout = period.mul_f32(0.75);
        }
        self
    }

    pub fn ui_interval(mut self, interval: Duration) -> Self {
        self.ui_interval = interval;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn read_command(mut self, command: &str) -> Self {
        self.read_command = command.to_string();
        self
    }

    pub fn stream_on(mut self, command: Option<&str>) -> Self {
        self.stream_on = command.map(str::to_string);
        self
    }

    pub fn stream_off(mut self, command: Option<&str>) -> Self {
        self.stream_off = command.map(str::to_string);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_config_defaults() {
        let c = LinkConfig::default();
        assert_eq!(c.baud_rate, 115_200);
        assert_eq!(c.terminator, FrameTerminator::DoubleSemicolon);
        assert!(c.flush_timeout < c.read_timeout);
    }

    #[test]
    fn link_and_serial_defaults_share_one_baud_rate() {
        let serial = gimbal_transport::SerialConfig::default();
        assert_eq!(LinkConfig::default().baud_rate, serial.baud_rate);
        assert_eq!(DEFAULT_BAUD_RATE, gimbal_transport::serial::DEFAULT_BAUD_RATE);
    }

    #[test]
    fn poller_read_timeout_below_period() {
        let c = PollerConfig::default();
        assert!(c.read_timeout < c.period);
    }

    #[test]
    fn shortening_period_clamps_read_timeout() {
        let c = PollerConfig::new().period(Duration::from_millis(10));
        assert_eq!(c.period, Duration::from_millis(10));
        assert!(c.read_timeout < c.period);
    }

    #[test]
    fn stream_directives_can_be_disabled() {
        let c = PollerConfig::new().stream_on(None).stream_off(None);
        assert!(c.stream_on.is_none());
        assert!(c.stream_off.is_none());
    }
}
