use serde::Deserialize;
use serde::Serialize;

/// On/off state of the horn, as stored in the twin and commanded to the
/// hardware.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HornState {
    On,
    Off,
}

impl HornState {
    /// The single byte the firmware expects for this state.
    pub fn command_byte(self) -> u8 {
        match self {
            HornState::On => b'1',
            HornState::Off => b'0',
        }
    }

    pub fn from_command_byte(byte: u8) -> Option<Self> {
        match byte {
            b'1' => Some(HornState::On),
            b'0' => Some(HornState::Off),
            _ => None,
        }
    }

    pub fn is_on(self) -> bool {
        self == HornState::On
    }
}

/// Horn statistics kept in the twin under
/// `features.horn.properties.status`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HornStatus {
    /// `None` when the twin has no readable state
    pub state: Option<HornState>,
    pub activation_count: u64,
    pub last_activated: Option<String>,
}
