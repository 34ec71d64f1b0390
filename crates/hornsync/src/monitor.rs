//! Live monitor: polls the twin and reports horn activity as it happens.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::horn::HornState;
use crate::horn::HornStatus;
use crate::report::render_status;
use crate::store::TwinStore;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("monitor interval must be greater than zero")]
    ZeroInterval,
}

/// Something worth telling the operator about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The twin is (again) readable
    Found(HornStatus),
    /// The twin disappeared or could not be read
    Missing,
    NewActivations { from: u64, to: u64 },
    StateChanged {
        from: Option<HornState>,
        to: Option<HornState>,
    },
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = |s: &Option<HornState>| s.map(<&'static str>::from).unwrap_or("UNKNOWN");
        match self {
            WatchEvent::Found(status) => write!(f, "twin found: {}", render_status(status)),
            WatchEvent::Missing => write!(f, "twin not available"),
            WatchEvent::NewActivations { from, to } => {
                write!(f, "new activation detected: count {} -> {}", from, to)
            }
            WatchEvent::StateChanged { from, to } => {
                write!(f, "state changed: {} -> {}", state(from), state(to))
            }
        }
    }
}

/// Change detector over successive twin reads.
#[derive(Debug, Default)]
pub struct HornWatch {
    /// `None` before the first observation
    last: Option<Option<HornStatus>>,
}

impl HornWatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, current: Option<HornStatus>) -> Vec<WatchEvent> {
        let previous = self.last.replace(current.clone());

        let mut events = Vec::new();
        match (previous, current) {
            (None, Some(status)) | (Some(None), Some(status)) => {
                events.push(WatchEvent::Found(status));
            }
            (None, None) | (Some(Some(_)), None) => events.push(WatchEvent::Missing),
            (Some(None), None) => {}
            (Some(Some(before)), Some(after)) => {
                if after.activation_count > before.activation_count {
                    events.push(WatchEvent::NewActivations {
                        from: before.activation_count,
                        to: after.activation_count,
                    });
                }
                if after.state != before.state {
                    events.push(WatchEvent::StateChanged {
                        from: before.state,
                        to: after.state,
                    });
                }
            }
        }
        events
    }
}

/// Polls `thing_id` every `interval` until the returned future is dropped,
/// handing each event to `report`. Only returns on a zero interval.
pub async fn run(
    store: Arc<dyn TwinStore>,
    thing_id: String,
    interval: Duration,
    mut report: impl FnMut(WatchEvent),
) -> Result<(), MonitorError> {
    if interval.is_zero() {
        return Err(MonitorError::ZeroInterval);
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut watch = HornWatch::new();

    loop {
        ticker.tick().await;
        let status = match store.get(&thing_id).await {
            Ok(doc) => doc.map(|d| d.horn_status()),
            Err(e) => {
                tracing::debug!("Monitor read of {} failed: {}", thing_id, e);
                None
            }
        };
        for event in watch.observe(status) {
            report(event);
        }
    }
}
