//! Accrual polling worker.
//!
//! Drains the pending set: one request in flight at a time, paced by the
//! configured poll interval, applying each verdict to the store before the
//! order leaves the set. A rate-limited reply pauses the whole loop.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tracing::{debug, error, info, warn};

use loyalty_common::OrderStatus;

use crate::accrual::{AccrualError, AccrualSource, AccrualVerdict};
use crate::pending::PendingSet;
use crate::stats::EngineStats;
use crate::store::{CreditOutcome, Store, StoreError};

pub struct Worker {
    store: Arc<dyn Store>,
    source: Arc<dyn AccrualSource>,
    pending: PendingSet,
    stats: Arc<EngineStats>,
    work_ready: Arc<Notify>,
    drained: Arc<Notify>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        store: Arc<dyn Store>,
        source: Arc<dyn AccrualSource>,
        pending: PendingSet,
        stats: Arc<EngineStats>,
        work_ready: Arc<Notify>,
        drained: Arc<Notify>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            source,
            pending,
            stats,
            work_ready,
            drained,
            poll_interval,
        }
    }

    /// Run the polling loop until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(poll_interval = ?self.poll_interval, "worker started");

        loop {
            if self.pending.is_empty() {
                tokio::select! {
                    _ = self.work_ready.notified() => {}
                    _ = shutdown.recv() => {
                        info!("worker received shutdown signal");
                        break;
                    }
                }
            }

            if self.drain_pass(&mut shutdown).await {
                info!("worker received shutdown signal");
                break;
            }

            if self.pending.is_empty() {
                self.drained.notify_one();
            }
        }
    }

    /// One pass over a snapshot of the pending set. Returns true when a
    /// shutdown signal interrupted it.
    async fn drain_pass(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        for number in self.pending.snapshot() {
            if shutdown.try_recv().is_ok() {
                return true;
            }

            self.stats.polls.fetch_add(1, Ordering::Relaxed);
            match self.source.get_status(&number).await {
                Ok(verdict) => {
                    if let Err(e) = self.apply_verdict(&number, verdict).await {
                        error!(order = %number, "failed to persist verdict: {}", e);
                        self.stats.store_errors.fetch_add(1, Ordering::Relaxed);
                        // Hand the order back to the scheduler: next scan
                        // re-claims it and the poll is retried.
                        self.pending.remove(&number);
                        if let Err(e) = self.store.release_claim(&number).await {
                            error!(order = %number, "failed to release claim: {}", e);
                        }
                    }
                }
                Err(AccrualError::RateLimited { retry_after }) => {
                    self.stats.rate_limit_pauses.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        order = %number,
                        pause = ?retry_after,
                        "accrual rate limit hit, pausing all polling"
                    );
                    if sleep_or_shutdown(retry_after, shutdown).await {
                        return true;
                    }
                }
                Err(e) => {
                    // Transient: the order stays pending for the next cycle
                    self.stats.poll_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(order = %number, "accrual poll failed: {}", e);
                }
            }

            if sleep_or_shutdown(self.poll_interval, shutdown).await {
                return true;
            }
        }
        false
    }

    /// Persist one verdict, then update the pending set.
    async fn apply_verdict(&self, number: &str, verdict: AccrualVerdict) -> Result<(), StoreError> {
        match verdict {
            AccrualVerdict::Registered | AccrualVerdict::Processing => {
                let applied = self
                    .store
                    .update_order_status(number, OrderStatus::Processing, None)
                    .await?;
                if applied {
                    debug!(order = %number, "order still processing");
                } else {
                    // Terminal in the store; nothing left to poll for
                    self.pending.remove(number);
                    debug!(order = %number, "order already terminal, dropped from pending");
                }
            }
            AccrualVerdict::Invalid => {
                self.store
                    .update_order_status(number, OrderStatus::Invalid, None)
                    .await?;
                self.pending.remove(number);
                self.stats.orders_invalid.fetch_add(1, Ordering::Relaxed);
                info!(order = %number, "order rejected by accrual system");
            }
            AccrualVerdict::Processed(amount) => {
                match self.store.credit_balance(number, amount).await? {
                    CreditOutcome::Applied { owner } => {
                        self.stats.orders_credited.fetch_add(1, Ordering::Relaxed);
                        info!(order = %number, owner = %owner, accrual = %amount, "accrual credited");
                    }
                    CreditOutcome::AlreadyResolved => {
                        debug!(order = %number, "credit skipped, order already resolved");
                    }
                }
                self.pending.remove(number);
            }
        }
        Ok(())
    }
}

/// Sleep unless shutdown arrives first. Returns true on shutdown.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.recv() => true,
    }
}
