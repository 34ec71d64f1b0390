use serde::Serialize;

use crate::channel::ChannelError;
use crate::channel::ConnectionError;
use crate::horn::HornState;
use crate::store::StoreError;

/// Why a synchronizer operation did not reach a fully synchronized state
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("hardware is not connected")]
    NotConnected,

    #[error("hardware is already connected")]
    AlreadyConnected,

    #[error("twin {thing_id} has no known horn state")]
    UnknownTwinState { thing_id: String },

    #[error("hardware state is unknown")]
    UnknownHardwareState,

    #[error("could not connect to hardware: {0}")]
    Connection(#[from] ConnectionError),

    #[error("hardware write failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("twin store write failed: {0}")]
    Store(#[from] StoreError),
}

/// One side of the synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Twin,
    Hardware,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Twin => Side::Hardware,
            Side::Hardware => Side::Twin,
        }
    }
}

/// One side holds `state`, the other could not be brought along.
#[derive(Debug)]
pub struct PartialSync {
    pub state: HornState,
    pub stale: Side,
    pub cause: SyncError,
}

impl PartialSync {
    pub fn store_ok(&self) -> bool {
        self.stale != Side::Twin
    }

    pub fn hardware_ok(&self) -> bool {
        self.stale != Side::Hardware
    }
}

/// Result of a synchronizer operation.
///
/// A partial result is not a failure of the operation as a whole: the side
/// that was written stays written.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Both sides hold `state`. `pushed` is set when a hardware command was
    /// sent to get there.
    InSync { state: HornState, pushed: bool },
    Partial(PartialSync),
    Failed(SyncError),
}

impl SyncOutcome {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, SyncOutcome::InSync { .. })
    }

    pub(crate) fn partial(state: HornState, stale: Side, cause: impl Into<SyncError>) -> Self {
        SyncOutcome::Partial(PartialSync {
            state,
            stale,
            cause: cause.into(),
        })
    }

    pub(crate) fn failed(cause: impl Into<SyncError>) -> Self {
        SyncOutcome::Failed(cause.into())
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncOutcome::InSync {
                state,
                pushed: true,
            } => write!(f, "in sync at {} (hardware updated)", state),
            SyncOutcome::InSync { state, .. } => write!(f, "in sync at {}", state),
            SyncOutcome::Partial(p) => write!(
                f,
                "partially synced: {} is {}, {} is stale ({})",
                p.stale.other(),
                p.state,
                p.stale,
                p.cause
            ),
            SyncOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Operating mode of the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncMode {
    Disconnected,
    ConnectedManual,
    ConnectedAuto,
}

/// Summary indicator shown to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SyncIndicator {
    Synchronized,
    OutOfSync,
    HardwareOffline,
    Unknown,
}

/// Snapshot of both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub thing_id: String,
    pub mode: SyncMode,
    pub twin: Option<HornState>,
    /// Last state known to be on the hardware. Kept across a disconnect,
    /// but then only a historical value.
    pub hardware: Option<HornState>,
    pub indicator: SyncIndicator,
}

impl SyncStatus {
    pub(crate) fn new(
        thing_id: String,
        mode: SyncMode,
        twin: Option<HornState>,
        hardware: Option<HornState>,
    ) -> Self {
        let indicator = match (mode, twin, hardware) {
            (SyncMode::Disconnected, _, _) => SyncIndicator::HardwareOffline,
            (_, Some(twin), Some(hardware)) if twin == hardware => SyncIndicator::Synchronized,
            (_, Some(_), Some(_)) => SyncIndicator::OutOfSync,
            _ => SyncIndicator::Unknown,
        };
        Self {
            thing_id,
            mode,
            twin,
            hardware,
            indicator,
        }
    }
}
