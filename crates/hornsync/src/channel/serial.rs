use std::time::Duration;

use async_trait::async_trait;
use hornsync_config::SerialConfig;
use serde::Serialize;
use tokio_serial::SerialPortBuilderExt;
use tokio_serial::SerialPortType;

use super::CommandChannel;
use super::ConnectionError;
use super::Connector;
use super::WriterChannel;

/// Opens the configured serial port.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port: Option<String>,
    baud_rate: u32,
    write_timeout: Duration,
    settle: Duration,
}

impl SerialConnector {
    pub fn new(config: &SerialConfig) -> Self {
        Self {
            port: config.port.clone(),
            baud_rate: config.baud_rate,
            write_timeout: config.write_timeout,
            settle: config.settle,
        }
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> Result<Box<dyn CommandChannel>, ConnectionError> {
        let port = self.port.as_deref().ok_or(ConnectionError::NoPort)?;
        tracing::info!("Opening serial port {} at {} baud", port, self.baud_rate);

        let stream = tokio_serial::new(port, self.baud_rate)
            .timeout(self.write_timeout)
            .open_native_async()
            .map_err(|e| ConnectionError::Open {
                port: port.to_string(),
                source: e.into(),
            })?;

        // Opening the port resets most microcontroller boards; commands sent
        // before the firmware is up are lost.
        if !self.settle.is_zero() {
            tracing::debug!("Waiting {:?} for the controller to settle", self.settle);
            tokio::time::sleep(self.settle).await;
        }

        Ok(Box::new(WriterChannel::new(
            port,
            stream,
            self.write_timeout,
        )))
    }
}

/// A serial port found on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// Enumerates serial ports, for choosing `serial.port`.
pub fn list_ports() -> Result<Vec<PortInfo>, std::io::Error> {
    let ports = tokio_serial::available_ports().map_err(std::io::Error::from)?;
    Ok(ports
        .into_iter()
        .map(|port| PortInfo {
            description: describe_port(&port.port_type),
            name: port.port_name,
        })
        .collect())
}

fn describe_port(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let mut description = format!("USB {:04x}:{:04x}", usb.vid, usb.pid);
            for part in [&usb.manufacturer, &usb.product].into_iter().flatten() {
                description.push(' ');
                description.push_str(part);
            }
            description
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}
