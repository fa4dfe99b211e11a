//! Mock device chooser.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use gimbal_core::error::{Error, Result};
use gimbal_core::transport::{PortInfo, PortOpener, Transport};

use crate::mock_serial::MockTransport;

#[derive(Debug)]
struct OpenerState {
    port: PortInfo,
    cancel_chooser: bool,
    fail_open: bool,
    request_count: usize,
    open_count: usize,
    last_baud_rate: Option<u32>,
}

/// A [`PortOpener`] that always grants the same port and hands out clones
/// of one shared [`MockTransport`].
///
/// The chooser can be made to cancel and the open to fail, so tests can
/// drive every connection-establishment path.
#[derive(Debug, Clone)]
pub struct MockPortOpener {
    mock: MockTransport,
    state: Arc<Mutex<OpenerState>>,
}

impl MockPortOpener {
    pub fn new(mock: MockTransport) -> Self {
        MockPortOpener {
            mock,
            state: Arc::new(Mutex::new(OpenerState {
                port: PortInfo {
                    name: "/dev/mock-gimbal".into(),
                    description: Some("Mock gimbal controller".into()),
                },
                cancel_chooser: false,
                fail_open: false,
                request_count: 0,
                open_count: 0,
                last_baud_rate: None,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, OpenerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The transport handed out by `open()`.
    pub fn transport(&self) -> MockTransport {
        self.mock.clone()
    }

    /// Make `request_port()` behave as if the user dismissed the chooser.
    pub fn set_cancel_chooser(&self, cancel: bool) {
        self.state().cancel_chooser = cancel;
    }

    /// Make `open()` fail, as if the device were unplugged.
    pub fn set_fail_open(&self, fail: bool) {
        self.state().fail_open = fail;
    }

    /// How many times a port was requested.
    pub fn request_count(&self) -> usize {
        self.state().request_count
    }

    /// How many opens succeeded.
    pub fn open_count(&self) -> usize {
        self.state().open_count
    }

    /// Baud rate of the most recent open attempt.
    pub fn last_baud_rate(&self) -> Option<u32> {
        self.state().last_baud_rate
    }
}

#[async_trait]
impl PortOpener for MockPortOpener {
    async fn request_port(&mut self) -> Result<PortInfo> {
        let mut state = self.state();
        state.request_count += 1;
        if state.cancel_chooser {
            return Err(Error::Connection("port selection cancelled".into()));
        }
        Ok(state.port.clone())
    }

    async fn open(&mut self, port: &PortInfo, baud_rate: u32) -> Result<Box<dyn Transport>> {
        {
            let mut state = self.state();
            state.last_baud_rate = Some(baud_rate);
            if state.fail_open {
                return Err(Error::Connection(format!("failed to open {}", port.name)));
            }
            state.open_count += 1;
        }
        self.mock.reopen();
        Ok(Box::new(self.mock.clone()))
    }
}
