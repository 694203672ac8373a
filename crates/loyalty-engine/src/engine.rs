//! Engine wiring: store, accrual source, scheduler, and worker.

use std::sync::Arc;

use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::info;

use crate::accrual::AccrualSource;
use crate::config::EngineConfig;
use crate::pending::PendingSet;
use crate::scheduler::Scheduler;
use crate::stats::EngineStats;
use crate::store::{Store, StoreError};
use crate::worker::Worker;

/// Join handles for the spawned engine tasks.
pub struct EngineHandles {
    pub scheduler: JoinHandle<()>,
    pub worker: JoinHandle<()>,
}

/// The reconciliation engine: everything between the store and the accrual
/// service.
pub struct Engine {
    store: Arc<dyn Store>,
    source: Arc<dyn AccrualSource>,
    pending: PendingSet,
    stats: Arc<EngineStats>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, source: Arc<dyn AccrualSource>, config: EngineConfig) -> Self {
        Self {
            store,
            source,
            pending: PendingSet::new(),
            stats: Arc::new(EngineStats::default()),
            config,
        }
    }

    /// Shared counters, for health logging.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Release claims left over from a previous process, then spawn the
    /// scheduler and worker loops.
    pub async fn spawn(&self, shutdown: &broadcast::Sender<()>) -> Result<EngineHandles, StoreError> {
        self.store.release_all_claims().await?;
        info!("released stale order claims");

        let work_ready = Arc::new(Notify::new());
        let drained = Arc::new(Notify::new());

        let scheduler = Scheduler::new(
            Arc::clone(&self.store),
            self.pending.clone(),
            Arc::clone(&self.stats),
            Arc::clone(&work_ready),
            Arc::clone(&drained),
            self.config.scan_interval,
        );
        let worker = Worker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.source),
            self.pending.clone(),
            Arc::clone(&self.stats),
            work_ready,
            drained,
            self.config.poll_interval,
        );

        let scheduler_rx = shutdown.subscribe();
        let worker_rx = shutdown.subscribe();
        Ok(EngineHandles {
            scheduler: tokio::spawn(async move { scheduler.run(scheduler_rx).await }),
            worker: tokio::spawn(async move { worker.run(worker_rx).await }),
        })
    }
}
