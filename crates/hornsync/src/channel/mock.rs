use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::ChannelError;
use super::CommandChannel;
use super::ConnectionError;
use super::Connector;
use crate::horn::HornState;

/// How the mock channel should fail its sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Io,
}

#[derive(Debug, Default)]
struct Shared {
    /// Raw command bytes, as they would reach the firmware
    sent: Mutex<Vec<u8>>,
    failure: Mutex<Option<MockFailure>>,
    delay: Mutex<Duration>,
    refuse_connect: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
    in_flight: AtomicBool,
    overlaps: AtomicUsize,
    open: AtomicBool,
}

/// Test handle shared by a [`MockConnector`] and every channel it opens.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    shared: Arc<Shared>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> MockConnector {
        MockConnector {
            device: self.clone(),
        }
    }

    /// Commands the device has accepted, in order
    pub fn sent(&self) -> Vec<HornState> {
        self.shared
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|&byte| HornState::from_command_byte(byte).unwrap())
            .collect()
    }

    pub fn clear_sent(&self) {
        self.shared.sent.lock().unwrap().clear();
    }

    pub fn fail_sends(&self, failure: Option<MockFailure>) {
        *self.shared.failure.lock().unwrap() = failure;
    }

    /// Makes each send take this long, widening any race window
    pub fn set_delay(&self, delay: Duration) {
        *self.shared.delay.lock().unwrap() = delay;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// Number of sends that started while another was still in flight
    pub fn overlaps(&self) -> usize {
        self.shared.overlaps.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }
}

pub struct MockConnector {
    device: MockDevice,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn CommandChannel>, ConnectionError> {
        let shared = &self.device.shared;
        if shared.refuse_connect.load(Ordering::SeqCst) {
            return Err(ConnectionError::Open {
                port: "mock".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
            });
        }
        shared.connects.fetch_add(1, Ordering::SeqCst);
        shared.open.store(true, Ordering::SeqCst);
        Ok(Box::new(MockChannel {
            device: self.device.clone(),
            open: true,
        }))
    }
}

pub struct MockChannel {
    device: MockDevice,
    open: bool,
}

#[async_trait]
impl CommandChannel for MockChannel {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    async fn send(&mut self, state: HornState) -> Result<(), ChannelError> {
        if !self.open {
            return Err(ChannelError::NotConnected);
        }

        let shared = &self.device.shared;
        if shared.in_flight.swap(true, Ordering::SeqCst) {
            shared.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let delay = *shared.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failure = *shared.failure.lock().unwrap();
        let result = match failure {
            Some(MockFailure::Timeout) => Err(ChannelError::Timeout(Duration::from_secs(1))),
            Some(MockFailure::Io) => Err(ChannelError::Closed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "device unplugged",
            ))),
            None => {
                shared.sent.lock().unwrap().push(state.command_byte());
                Ok(())
            }
        };

        shared.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.open {
            self.open = false;
            self.device.shared.open.store(false, Ordering::SeqCst);
            self.device.shared.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
