//! Command channel to the horn controller.
//!
//! The firmware accepts a single ASCII byte per command (`'1'` for ON, `'0'`
//! for OFF) and sends nothing back, so a successful write is the only
//! confirmation available.

#[cfg(test)]
pub(crate) mod mock;
mod serial;
mod writer;

use std::time::Duration;

use async_trait::async_trait;

pub use serial::list_ports;
pub use serial::PortInfo;
pub use serial::SerialConnector;
pub use writer::WriterChannel;

use crate::horn::HornState;

/// Errors writing to an open channel
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel is not open")]
    NotConnected,

    #[error("write did not complete within {0:?}")]
    Timeout(Duration),

    #[error("channel closed: {0}")]
    Closed(#[from] std::io::Error),
}

/// Errors opening a channel
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("no serial port configured")]
    NoPort,

    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },
}

/// An open, write-only link to the horn controller.
///
/// Callers must not issue overlapping sends; the synchronizer serializes
/// all access.
#[async_trait]
pub trait CommandChannel: Send {
    /// Human readable endpoint, e.g. the port path
    fn describe(&self) -> String;

    /// Sends one command and waits until it has been handed to the device.
    async fn send(&mut self, state: HornState) -> Result<(), ChannelError>;

    async fn close(&mut self) -> Result<(), ChannelError>;
}

/// Opens command channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn CommandChannel>, ConnectionError>;
}
