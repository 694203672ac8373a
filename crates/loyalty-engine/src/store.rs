//! Order and balance persistence abstraction.
//!
//! The engine talks to storage only through the [`Store`] trait so the same
//! ledger and reconciliation code runs against any backend. This crate ships
//! [`memory::MemoryStore`]; a database-backed implementation plugs in behind
//! the same trait.
//!
//! Every method is atomic from the caller's point of view: concurrent
//! callers never observe a half-applied withdrawal or credit, and a scan
//! never hands the same order to two claimants.

pub mod memory;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use loyalty_common::{Balance, Order, OrderStatus, UserId, Withdrawal};

/// Errors surfaced by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert hit an existing row for the same order number.
    #[error("order {number} already exists")]
    DuplicateOrder { number: String },

    #[error("order {number} not found")]
    OrderNotFound { number: String },

    /// Withdrawal exceeds the available balance.
    #[error("insufficient funds: balance={balance}, requested={requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    /// Backend failure (connection, query, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Outcome of the conditional credit applied when an order is PROCESSED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// The order moved to `Processed` and the owner's balance was credited.
    Applied { owner: UserId },
    /// The order was already terminal; the balance is untouched. Seen when
    /// a PROCESSED verdict is delivered more than once.
    AlreadyResolved,
}

/// Persistence seam for orders, balances, and withdrawals.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new order with status `New` for `owner`.
    ///
    /// Fails with [`StoreError::DuplicateOrder`] when the number exists,
    /// regardless of who owns it; the caller classifies ownership through
    /// [`Store::get_order`].
    async fn add_order(&self, number: &str, owner: UserId) -> Result<(), StoreError>;

    /// Fetch one order by number.
    async fn get_order(&self, number: &str) -> Result<Option<Order>, StoreError>;

    /// All orders for `owner`, oldest upload first.
    async fn list_orders(&self, owner: UserId) -> Result<Vec<Order>, StoreError>;

    /// Current and withdrawn totals for `owner`. Unknown owners read as zero.
    async fn get_balance(&self, owner: UserId) -> Result<Balance, StoreError>;

    /// Record a withdrawal and debit the balance in one atomic step.
    ///
    /// Fails with [`StoreError::InsufficientFunds`] when `sum` exceeds the
    /// current balance; the account is left untouched on failure.
    async fn withdraw(&self, owner: UserId, number: &str, sum: Decimal) -> Result<(), StoreError>;

    /// All withdrawals for `owner`, oldest first.
    async fn list_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>, StoreError>;

    /// Claim and return every unresolved order not yet claimed.
    ///
    /// An order is unresolved while its status is `New` or `Processing`.
    /// Claimed orders are skipped by later scans until released, so two
    /// scans never hand out the same order.
    async fn scan_unresolved(&self) -> Result<Vec<String>, StoreError>;

    /// Release one claim so the next scan picks the order up again.
    async fn release_claim(&self, number: &str) -> Result<(), StoreError>;

    /// Release every claim. Runs at startup to recover orders claimed by a
    /// previous process.
    async fn release_all_claims(&self) -> Result<(), StoreError>;

    /// Move an order to `status`, recording `accrual` when given.
    ///
    /// Returns whether the transition applied; terminal orders never change
    /// and yield `false`.
    async fn update_order_status(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> Result<bool, StoreError>;

    /// Move an order to `Processed` and credit its owner in one atomic step.
    ///
    /// Idempotent: an already-terminal order yields
    /// [`CreditOutcome::AlreadyResolved`] and no balance change.
    async fn credit_balance(&self, number: &str, amount: Decimal)
        -> Result<CreditOutcome, StoreError>;
}
