use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::outcome::SyncOutcome;
use super::synchronizer::SyncCore;

/// Handle to the periodic reconcile task
pub(crate) struct AutoSync {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutoSync {
    pub(crate) fn spawn(core: Arc<SyncCore>, period: Duration) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(core, period, stop_rx));
        Self { stop_tx, handle }
    }

    /// Signals the task and waits for it to exit. A reconcile already in
    /// progress runs to completion first.
    pub(crate) async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!("Auto-sync task ended abnormally: {}", e);
        }
    }
}

async fn run(core: Arc<SyncCore>, period: Duration, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    // A reconcile that overruns the period must not cause a burst of
    // catch-up ticks afterwards.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!("Auto-sync started (every {:?})", period);
    let mut last_failure: Option<String> = None;

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }
        if *stop_rx.borrow() {
            break;
        }

        match core.reconcile().await {
            SyncOutcome::InSync { pushed, state } => {
                if last_failure.take().is_some() {
                    tracing::info!("Auto-sync recovered; in sync at {}", state);
                } else if pushed {
                    tracing::debug!("Auto-sync pushed {}", state);
                }
            }
            outcome => {
                // Log each distinct failure once rather than every tick.
                let message = outcome.to_string();
                if last_failure.as_deref() != Some(message.as_str()) {
                    tracing::warn!("Auto-sync: {}", message);
                } else {
                    tracing::debug!("Auto-sync: {}", message);
                }
                last_failure = Some(message);
            }
        }
    }

    tracing::info!("Auto-sync stopped");
}
