//! Loyalty points engine: order/accrual reconciliation and balance ledger.
//!
//! This crate contains:
//! - `ledger`: user-facing order submission, balances, withdrawals
//! - `store`: persistence seam plus the bundled in-memory implementation
//! - `accrual`: client for the external accrual service
//! - `scheduler`, `pending`, `worker`: the reconciliation loop
//! - `engine`: wiring that spawns the loop as tokio tasks

pub mod accrual;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod pending;
pub mod scheduler;
pub mod stats;
pub mod store;
pub mod worker;

pub use engine::{Engine, EngineHandles};
pub use ledger::{Ledger, LedgerError, SubmitOutcome};
