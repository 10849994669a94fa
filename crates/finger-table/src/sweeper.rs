//! Background failure sweep.
//!
//! Periodically calls `FingerTable::remove_failured_entries`. The sweeper is
//! owned by whoever started it: stop it explicitly with `stop()`, or drop it.

use crate::table::FingerTable;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

pub struct Sweeper {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Start sweeping `table` every `table.sweep_interval()`.
    ///
    /// The first sweep runs one full interval after spawning. The task holds
    /// only a weak reference and ends once the table is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(table: &Arc<FingerTable>) -> Self {
        let period = table.sweep_interval();
        let table = Arc::downgrade(table);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(table) = table.upgrade() else {
                            break;
                        };
                        let failed = table.remove_failured_entries();
                        debug!(evicted = failed.len(), remaining = table.len(), "Failure sweep");
                    }
                }
            }

            debug!("Failure sweeper stopped");
        });

        info!(?period, "Failure sweeper started");

        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop sweeping and wait for the task to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            // Err means the task already exited
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
