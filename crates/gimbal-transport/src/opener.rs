//! Device chooser for serial ports.
//!
//! On a desktop there is no browser permission prompt; "granting" a port
//! means either taking the name the user passed on the command line or
//! picking the first USB serial device the OS enumerates.

use async_trait::async_trait;
use gimbal_core::error::{Error, Result};
use gimbal_core::transport::{PortInfo, PortOpener, Transport};
use tokio_serial::SerialPortType;

use crate::serial::{SerialConfig, SerialTransport};

/// List the serial ports the OS currently reports.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports()
        .map_err(|e| Error::Transport(format!("failed to enumerate serial ports: {e}")))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(usb) => usb
                    .product
                    .or(usb.manufacturer)
                    .or_else(|| Some(format!("{:04x}:{:04x}", usb.vid, usb.pid))),
                _ => None,
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}

/// [`PortOpener`] backed by `tokio-serial`.
pub struct SerialPortOpener {
    preferred: Option<String>,
    config: SerialConfig,
}

impl SerialPortOpener {
    /// Chooser that auto-selects the first USB serial device.
    pub fn new() -> Self {
        SerialPortOpener {
            preferred: None,
            config: SerialConfig::default(),
        }
    }

    /// Chooser that always grants `port`.
    pub fn with_port(port: &str) -> Self {
        SerialPortOpener {
            preferred: Some(port.to_string()),
            config: SerialConfig::default(),
        }
    }

    /// Override framing settings. The baud rate is still taken from the
    /// session at open time.
    pub fn serial_config(mut self, config: SerialConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for SerialPortOpener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PortOpener for SerialPortOpener {
    async fn request_port(&mut self) -> Result<PortInfo> {
        if let Some(name) = &self.preferred {
            return Ok(PortInfo::new(name.clone()));
        }

        let ports = list_ports().map_err(|e| Error::Connection(e.to_string()))?;
        let chosen = ports
            .iter()
            .find(|p| p.description.is_some())
            .or_else(|| ports.first())
            .cloned();

        match chosen {
            Some(port) => {
                tracing::info!(port = %port, "Selected serial port");
                Ok(port)
            }
            None => Err(Error::Connection("no serial port selected".into())),
        }
    }

    async fn open(&mut self, port: &PortInfo, baud_rate: u32) -> Result<Box<dyn Transport>> {
        let config = SerialConfig {
            baud_rate,
            ..self.config.clone()
        };
        let transport = SerialTransport::open_with_config(&port.name, config).await?;
        Ok(Box::new(transport))
    }
}
