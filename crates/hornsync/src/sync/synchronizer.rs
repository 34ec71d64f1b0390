use std::sync::Arc;
use std::time::Duration;

use hornsync_config::ConnectPolicy;
use hornsync_config::SyncConfig;
use tokio::sync::Mutex;

use super::auto_sync::AutoSync;
use super::outcome::Side;
use super::outcome::SyncError;
use super::outcome::SyncMode;
use super::outcome::SyncOutcome;
use super::outcome::SyncStatus;
use crate::channel::CommandChannel;
use crate::channel::Connector;
use crate::horn::HornState;
use crate::store::TwinStore;

/// Everything behind the hardware lock.
#[derive(Default)]
struct Hardware {
    channel: Option<Box<dyn CommandChannel>>,
    /// Last state successfully commanded (or assumed at connect)
    observed: Option<HornState>,
}

impl Hardware {
    async fn send(&mut self, state: HornState) -> Result<(), SyncError> {
        let channel = self.channel.as_mut().ok_or(SyncError::NotConnected)?;
        channel.send(state).await?;
        self.observed = Some(state);
        Ok(())
    }
}

/// State shared with the auto-sync task.
///
/// Every operation that touches the hardware, or reads the twin in order to
/// decide what to send, holds the hardware lock for its whole duration. This
/// is what keeps manual operations and periodic reconciles from
/// interleaving.
pub(crate) struct SyncCore {
    thing_id: String,
    store: Arc<dyn TwinStore>,
    hardware: Mutex<Hardware>,
}

impl SyncCore {
    pub(crate) async fn reconcile(&self) -> SyncOutcome {
        let mut hardware = self.hardware.lock().await;
        if hardware.channel.is_none() {
            return SyncOutcome::failed(SyncError::NotConnected);
        }

        let Some(twin) = self.store.get_state(&self.thing_id).await else {
            return SyncOutcome::failed(self.unknown_twin());
        };

        if hardware.observed == Some(twin) {
            tracing::trace!("Twin and hardware agree on {}", twin);
            return SyncOutcome::InSync {
                state: twin,
                pushed: false,
            };
        }

        tracing::info!(
            "Twin is {} but hardware is {}; pushing twin state",
            twin,
            describe(hardware.observed)
        );
        match hardware.send(twin).await {
            Ok(()) => SyncOutcome::InSync {
                state: twin,
                pushed: true,
            },
            Err(e) => SyncOutcome::failed(e),
        }
    }

    fn unknown_twin(&self) -> SyncError {
        SyncError::UnknownTwinState {
            thing_id: self.thing_id.clone(),
        }
    }
}

fn describe(state: Option<HornState>) -> &'static str {
    state.map(<&'static str>::from).unwrap_or("unknown")
}

/// Keeps one twin and one horn controller in agreement.
pub struct Synchronizer {
    core: Arc<SyncCore>,
    connector: Arc<dyn Connector>,
    policy: ConnectPolicy,
    interval: Duration,
    auto_sync: Mutex<Option<AutoSync>>,
}

impl Synchronizer {
    pub fn new(
        thing_id: impl Into<String>,
        store: Arc<dyn TwinStore>,
        connector: Arc<dyn Connector>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            core: Arc::new(SyncCore {
                thing_id: thing_id.into(),
                store,
                hardware: Mutex::new(Hardware::default()),
            }),
            connector,
            policy: config.connect_policy,
            interval: config.interval,
            auto_sync: Mutex::new(None),
        }
    }

    pub fn thing_id(&self) -> &str {
        &self.core.thing_id
    }

    pub fn store(&self) -> &Arc<dyn TwinStore> {
        &self.core.store
    }

    /// Opens the hardware channel and establishes its state.
    ///
    /// With the `push` policy the twin's state is sent so both sides are
    /// known to agree. With `assume` the hardware is taken to already match
    /// the twin and nothing is sent. If the twin state is unknown the
    /// channel stays open but the hardware state is left unknown.
    pub async fn connect(&self) -> SyncOutcome {
        let mut hardware = self.core.hardware.lock().await;
        if hardware.channel.is_some() {
            return SyncOutcome::failed(SyncError::AlreadyConnected);
        }

        let channel = match self.connector.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!("Failed to connect to hardware: {}", e);
                return SyncOutcome::failed(e);
            }
        };
        tracing::info!("Connected to hardware on {}", channel.describe());
        hardware.channel = Some(channel);
        hardware.observed = None;

        let Some(twin) = self.core.store.get_state(&self.core.thing_id).await else {
            tracing::warn!(
                "Twin {} has no known horn state; hardware state not established",
                self.core.thing_id
            );
            return SyncOutcome::failed(self.core.unknown_twin());
        };

        match self.policy {
            ConnectPolicy::Assume => {
                tracing::info!("Assuming hardware matches twin state {}", twin);
                hardware.observed = Some(twin);
                SyncOutcome::InSync {
                    state: twin,
                    pushed: false,
                }
            }
            ConnectPolicy::Push => match hardware.send(twin).await {
                Ok(()) => {
                    tracing::info!("Pushed twin state {} to hardware", twin);
                    SyncOutcome::InSync {
                        state: twin,
                        pushed: true,
                    }
                }
                Err(e) => {
                    tracing::warn!("Connected, but initial push of {} failed: {}", twin, e);
                    SyncOutcome::partial(twin, Side::Hardware, e)
                }
            },
        }
    }

    /// Stops auto-sync (if running) and closes the channel.
    ///
    /// The last observed hardware state is kept for reporting.
    pub async fn disconnect(&self) -> Result<(), SyncError> {
        let mut auto_sync = self.auto_sync.lock().await;
        if let Some(task) = auto_sync.take() {
            task.stop().await;
        }

        let mut hardware = self.core.hardware.lock().await;
        let mut channel = hardware.channel.take().ok_or(SyncError::NotConnected)?;
        if let Err(e) = channel.close().await {
            tracing::warn!("Error closing {}: {}", channel.describe(), e);
        }
        tracing::info!("Disconnected from {}", channel.describe());
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.core.hardware.lock().await.channel.is_some()
    }

    /// Starts periodic reconciliation. Does nothing if already running.
    pub async fn enable_auto_sync(&self) -> Result<(), SyncError> {
        let mut auto_sync = self.auto_sync.lock().await;
        if auto_sync.is_some() {
            return Ok(());
        }
        if !self.is_connected().await {
            return Err(SyncError::NotConnected);
        }

        *auto_sync = Some(AutoSync::spawn(self.core.clone(), self.interval));
        Ok(())
    }

    /// Stops periodic reconciliation and waits for an in-flight reconcile to
    /// finish. Returns whether auto-sync was running.
    pub async fn disable_auto_sync(&self) -> bool {
        match self.auto_sync.lock().await.take() {
            Some(task) => {
                task.stop().await;
                true
            }
            None => false,
        }
    }

    /// Writes `desired` to the twin, then commands the hardware.
    ///
    /// A failed store write aborts before the hardware is touched. A failed
    /// (or impossible, while disconnected) hardware command leaves the twin
    /// written and reports the hardware as stale.
    pub async fn set_twin_and_push(&self, desired: HornState) -> SyncOutcome {
        let mut hardware = self.core.hardware.lock().await;

        if let Err(e) = self
            .core
            .store
            .set_horn_state(&self.core.thing_id, desired)
            .await
        {
            tracing::warn!("Failed to set twin horn state to {}: {}", desired, e);
            return SyncOutcome::failed(e);
        }

        match hardware.send(desired).await {
            Ok(()) => SyncOutcome::InSync {
                state: desired,
                pushed: true,
            },
            Err(e) => {
                tracing::warn!("Twin set to {}, but hardware was not updated: {}", desired, e);
                SyncOutcome::partial(desired, Side::Hardware, e)
            }
        }
    }

    /// Commands the hardware, then records the new state in the twin.
    ///
    /// Requires a connection. A failed store write after a successful
    /// command reports the twin as stale.
    pub async fn set_hardware_and_pull(&self, desired: HornState) -> SyncOutcome {
        let mut hardware = self.core.hardware.lock().await;

        if let Err(e) = hardware.send(desired).await {
            tracing::warn!("Failed to set hardware to {}: {}", desired, e);
            return SyncOutcome::failed(e);
        }

        match self
            .core
            .store
            .set_horn_state(&self.core.thing_id, desired)
            .await
        {
            Ok(_) => SyncOutcome::InSync {
                state: desired,
                pushed: true,
            },
            Err(e) => {
                tracing::warn!("Hardware set to {}, but twin was not updated: {}", desired, e);
                SyncOutcome::partial(desired, Side::Twin, e)
            }
        }
    }

    /// Pushes the twin's state to the hardware if they differ.
    pub async fn reconcile(&self) -> SyncOutcome {
        self.core.reconcile().await
    }

    /// Copies the hardware's last known state into the twin.
    pub async fn adopt_hardware_state(&self) -> SyncOutcome {
        let hardware = self.core.hardware.lock().await;
        if hardware.channel.is_none() {
            return SyncOutcome::failed(SyncError::NotConnected);
        }
        let Some(observed) = hardware.observed else {
            return SyncOutcome::failed(SyncError::UnknownHardwareState);
        };

        match self
            .core
            .store
            .set_horn_state(&self.core.thing_id, observed)
            .await
        {
            Ok(_) => {
                tracing::info!("Twin updated to hardware state {}", observed);
                SyncOutcome::InSync {
                    state: observed,
                    pushed: false,
                }
            }
            Err(e) => SyncOutcome::failed(e),
        }
    }

    pub async fn mode(&self) -> SyncMode {
        if !self.is_connected().await {
            return SyncMode::Disconnected;
        }
        if self.auto_sync.lock().await.is_some() {
            SyncMode::ConnectedAuto
        } else {
            SyncMode::ConnectedManual
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let mode = self.mode().await;
        let twin = self.core.store.get_state(&self.core.thing_id).await;
        let hardware = self.core.hardware.lock().await.observed;
        SyncStatus::new(self.core.thing_id.clone(), mode, twin, hardware)
    }

    /// Disconnects if connected. Used on process exit.
    pub async fn shutdown(&self) {
        match self.disconnect().await {
            Ok(()) | Err(SyncError::NotConnected) => {}
            Err(e) => tracing::warn!("Error during synchronizer shutdown: {}", e),
        }
    }
}
