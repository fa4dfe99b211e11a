//! Serial port transport for the gimbal controller.
//!
//! The controller enumerates as a USB CDC virtual COM port. Baud rate is a
//! deployment setting; firmware revisions have used 9600, 115200, and
//! 230400. Framing is always 8N1 without flow control unless overridden.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use gimbal_core::error::{Error, Result};
use gimbal_core::transport::Transport;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};

pub use gimbal_core::transport::DEFAULT_BAUD_RATE;

/// Line settings applied when the port is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
}

impl SerialConfig {
    /// 8N1 without flow control at `baud_rate`.
    pub fn with_baud(baud_rate: u32) -> Self {
        SerialConfig {
            baud_rate,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::with_baud(DEFAULT_BAUD_RATE)
    }
}

/// A connected gimbal serial port.
///
/// Owns the open [`SerialStream`]; dropping or closing it releases both
/// the reading and writing side of the port.
pub struct SerialTransport {
    stream: Option<SerialStream>,
    path: String,
}

impl SerialTransport {
    /// Open `path` at `baud_rate` with 8N1 framing.
    pub async fn open(path: &str, baud_rate: u32) -> Result<Self> {
        Self::open_with_config(path, SerialConfig::with_baud(baud_rate)).await
    }

    /// Open `path` with explicit line settings.
    pub async fn open_with_config(path: &str, config: SerialConfig) -> Result<Self> {
        tracing::debug!(port = %path, settings = ?config, "opening gimbal port");

        let builder = tokio_serial::new(path, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control);
        let mut stream = match builder.open_native_async() {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(port = %path, error = %e, "gimbal port refused to open");
                return Err(Error::Connection(format!("cannot open {path}: {e}")));
            }
        };

        // Some controller boards reset on DTR assertion; hold both lines low.
        let lines = [
            ("DTR", stream.write_data_terminal_ready(false)),
            ("RTS", stream.write_request_to_send(false)),
        ];
        for (line, outcome) in lines {
            if let Err(e) = outcome {
                tracing::warn!(port = %path, line, error = %e, "could not lower modem line");
            }
        }

        tracing::info!(port = %path, baud_rate = config.baud_rate, "gimbal port open");
        Ok(SerialTransport {
            stream: Some(stream),
            path: path.to_owned(),
        })
    }

    /// Device path this transport was opened on.
    pub fn port_name(&self) -> &str {
        &self.path
    }

    fn stream(&mut self) -> Result<&mut SerialStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

/// Unplugging a USB CDC device surfaces as one of a few I/O kinds; those
/// become [`Error::ConnectionLost`] so the session can tear down.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            Error::ConnectionLost
        }
        _ => Error::Io(e),
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let path = self.path.clone();
        let stream = self.stream()?;
        tracing::trace!(
            port = %path,
            len = data.len(),
            tx = %String::from_utf8_lossy(data).escape_debug(),
            "tx"
        );

        if let Err(e) = stream.write_all(data).await {
            tracing::error!(port = %path, error = %e, "write to gimbal port failed");
            return Err(map_io_error(e));
        }
        stream.flush().await.map_err(map_io_error)
    }

    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let path = self.path.clone();
        let stream = self.stream()?;
        let n = tokio::time::timeout(timeout, stream.read(buf))
            .await
            .map_err(|_| Error::Timeout)?
            .map_err(|e| {
                tracing::debug!(port = %path, error = %e, "read from gimbal port failed");
                map_io_error(e)
            })?;
        tracing::trace!(
            port = %path,
            len = n,
            rx = %String::from_utf8_lossy(&buf[..n]).escape_debug(),
            "rx"
        );
        Ok(n)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if let Err(e) = stream.flush().await {
            tracing::warn!(port = %self.path, error = %e, "flush on close failed");
        }
        tracing::info!(port = %self.path, "gimbal port closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(port = %self.path, "releasing gimbal port on drop");
        }
    }
}
