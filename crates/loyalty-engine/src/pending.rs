//! Pending order set shared by the scheduler and the worker.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

/// Deduplicating set of order numbers awaiting an accrual verdict.
///
/// The scheduler inserts claimed numbers; the worker removes them once the
/// order reaches a terminal state. Every method takes the lock for one short
/// operation and the lock is never held across an await point. The store,
/// not this set, is the source of truth for order state.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    inner: Arc<Mutex<HashSet<String>>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a number. Returns false when it was already pending.
    pub fn insert(&self, number: &str) -> bool {
        self.inner.lock().insert(number.to_string())
    }

    /// Remove a resolved number. Returns true when it was present.
    pub fn remove(&self, number: &str) -> bool {
        self.inner.lock().remove(number)
    }

    pub fn contains(&self, number: &str) -> bool {
        self.inner.lock().contains(number)
    }

    /// Copy of the current membership, taken once per polling pass.
    pub fn snapshot(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
