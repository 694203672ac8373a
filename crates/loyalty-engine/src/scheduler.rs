//! Unresolved-order discovery loop.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tracing::{debug, error, info};

use crate::pending::PendingSet;
use crate::stats::EngineStats;
use crate::store::Store;

/// Periodically claims unresolved orders into the pending set.
///
/// Idle: scan the store every `scan_interval`. Active: once the pending set
/// is non-empty, stop scanning, wake the worker, and wait for its drained
/// signal before resuming. Claims are atomic in the store, so a scan never
/// returns an order that another scan already handed out.
pub struct Scheduler {
    store: Arc<dyn Store>,
    pending: PendingSet,
    stats: Arc<EngineStats>,
    work_ready: Arc<Notify>,
    drained: Arc<Notify>,
    scan_interval: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn Store>,
        pending: PendingSet,
        stats: Arc<EngineStats>,
        work_ready: Arc<Notify>,
        drained: Arc<Notify>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            store,
            pending,
            stats,
            work_ready,
            drained,
            scan_interval,
        }
    }

    /// Run the scan loop until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(scan_interval = ?self.scan_interval, "scheduler started");

        loop {
            self.stats.scans.fetch_add(1, Ordering::Relaxed);
            match self.store.scan_unresolved().await {
                Ok(numbers) => {
                    if !numbers.is_empty() {
                        let mut added = 0u64;
                        for number in &numbers {
                            if self.pending.insert(number) {
                                added += 1;
                            }
                        }
                        self.stats.orders_claimed.fetch_add(added, Ordering::Relaxed);
                        debug!(
                            claimed = numbers.len(),
                            pending = self.pending.len(),
                            "claimed unresolved orders"
                        );
                    }
                }
                Err(e) => {
                    error!("order scan failed: {}", e);
                    self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
                }
            }

            if self.pending.is_empty() {
                tokio::select! {
                    _ = tokio::time::sleep(self.scan_interval) => {}
                    _ = shutdown.recv() => {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
            } else {
                // Hand the batch to the worker and hold scans until it
                // finishes; new uploads wait for the next idle phase.
                self.work_ready.notify_one();
                tokio::select! {
                    _ = self.drained.notified() => {
                        debug!("worker drained, resuming scans");
                    }
                    _ = shutdown.recv() => {
                        info!("scheduler received shutdown signal");
                        break;
                    }
                }
            }
        }
    }
}
