//! Periodic retention cleanup for status histories.
//!
//! Owned explicitly by the caller: `spawn` starts the loop, `destroy`
//! cancels it. No ambient global timers, so tests drive time through the
//! tracker's injected clock and call `run_retention_cycle` directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::tracker::StatusTracker;

/// Handle to the running retention loop.
#[derive(Debug)]
pub struct RetentionTask {
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RetentionTask {
    /// Start the retention loop at the tracker's configured interval.
    pub fn spawn(tracker: Arc<StatusTracker>) -> Self {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let interval = Duration::from_millis(tracker.config().cleanup_interval_ms);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it so a freshly
            // started service does not purge before anything is recorded.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel_rx.changed() => {
                        if *cancel_rx.borrow() {
                            info!("Retention task stopped");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = tracker.run_retention_cycle().await {
                            error!(error = %e, "Retention cycle failed");
                        }
                    }
                }
            }
        });

        Self { cancel_tx, handle }
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn destroy(self) {
        let _ = self.cancel_tx.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use photoflow_core::clock::{Clock, ManualClock};
    use photoflow_core::config::TrackerConfig;
    use photoflow_core::types::BatchStatus;

    use crate::store::MemoryStatusStore;

    #[tokio::test]
    async fn destroy_stops_the_loop() {
        let clock = ManualClock::starting_at(0);
        let tracker = Arc::new(StatusTracker::new(
            Arc::new(MemoryStatusStore::new()),
            TrackerConfig {
                cleanup_interval_ms: 10,
                ..TrackerConfig::default()
            },
            clock as Arc<dyn Clock>,
        ));
        tracker
            .track_status_change("b1", None, BatchStatus::Queued, None)
            .await
            .unwrap();

        let task = RetentionTask::spawn(Arc::clone(&tracker));
        task.destroy().await;
        // Records within the retention window survive.
        assert_eq!(tracker.status_history("b1", None).await.unwrap().len(), 1);
    }
}
