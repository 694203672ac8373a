//! Engine counters for health monitoring.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

/// Monotonic counters shared by the scheduler and the worker.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub scans: AtomicU64,
    pub orders_claimed: AtomicU64,
    pub polls: AtomicU64,
    pub poll_errors: AtomicU64,
    pub orders_credited: AtomicU64,
    pub orders_invalid: AtomicU64,
    pub rate_limit_pauses: AtomicU64,
    pub store_errors: AtomicU64,
}

impl EngineStats {
    pub fn log_stats(&self) {
        info!(
            "Health: scans={}, claimed={}, polls={}, credited={}, invalid={}, poll_errors={}, rate_limit_pauses={}, store_errors={}",
            self.scans.load(Ordering::Relaxed),
            self.orders_claimed.load(Ordering::Relaxed),
            self.polls.load(Ordering::Relaxed),
            self.orders_credited.load(Ordering::Relaxed),
            self.orders_invalid.load(Ordering::Relaxed),
            self.poll_errors.load(Ordering::Relaxed),
            self.rate_limit_pauses.load(Ordering::Relaxed),
            self.store_errors.load(Ordering::Relaxed),
        );
    }
}
