//! TTL Reaper
//!
//! A background task that periodically sweeps dead entries out of the
//! storage engine. Lookups already hide dead entries; the reaper is what
//! reclaims memory for keys nobody touches again.
//!
//! ## Design
//!
//! The reaper runs as a Tokio task and:
//! 1. Sleeps for the configured sweep interval
//! 2. Locks the engine and drops every entry at or past its death time
//! 3. Logs how many entries were removed
//!
//! A stop signal is watched during the sleep, so the task ends as soon as
//! it is signalled instead of finishing its current pause.
//!
//! Each sweep scans every entry of every user. That is linear in the number
//! of stored entries, which is fine at the scale a single node holds.
// TODO: keep a death-time ordered index (BinaryHeap of (Instant, user, key))
// so a sweep only visits entries that are actually due.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// A handle to the running reaper.
///
/// When this handle is dropped, the reaper task is signalled to stop.
/// Use [`ExpirySweeper::stop`] to signal and wait for it to finish.
#[derive(Debug)]
pub struct ExpirySweeper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    /// The reaper task, taken by `stop`
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    /// Starts the reaper as a background task.
    ///
    /// # Arguments
    ///
    /// * `engine` - The storage engine to sweep
    /// * `interval` - Pause between two sweeps
    pub fn start(engine: Arc<StorageEngine>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(sweeper_loop(engine, interval, shutdown_rx));

        info!(interval_ms = interval.as_millis() as u64, "TTL reaper started");

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the reaper to stop and waits until the task has finished.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("TTL reaper stopped");
    }

    /// Whether the reaper task has finished.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The main reaper loop.
async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("TTL reaper received shutdown signal");
                    return;
                }
            }
        }

        let expired = engine.cleanup_expired();

        if expired > 0 {
            debug!(
                expired = expired,
                entries_remaining = engine.len(),
                "Expired entries swept"
            );
        } else {
            trace!("Sweep found nothing to expire");
        }
    }
}

/// Starts the reaper for `engine`.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>, interval: Duration) -> ExpirySweeper {
    ExpirySweeper::start(engine, interval)
}
