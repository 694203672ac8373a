//! User-facing order and balance operations.
//!
//! The ledger validates order numbers, classifies duplicate submissions, and
//! delegates every atomic step to the store. Callers (typically an HTTP
//! layer in front of this crate) map [`LedgerError`] variants onto their
//! transport's response codes.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info};

use loyalty_common::{Balance, Order, UserId, Withdrawal, luhn};

use crate::store::{Store, StoreError};

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The number is empty, non-numeric, or fails its checksum.
    #[error("invalid order number: {number}")]
    InvalidOrderNumber { number: String },

    /// The number was already uploaded by a different user.
    #[error("order {number} already added by another user")]
    AddedByAnotherOwner { number: String },

    #[error("insufficient funds: balance={balance}, requested={requested}")]
    InsufficientFunds { balance: Decimal, requested: Decimal },

    /// Withdrawal amounts must be positive.
    #[error("withdrawal amount must be positive: {requested}")]
    NonPositiveWithdrawal { requested: Decimal },

    /// Storage failure; the operation may be retried.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of submitting an order number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The order was recorded and queued for accrual evaluation.
    Accepted,
    /// The same owner already submitted this number. Not an error; the
    /// stored row is untouched.
    AlreadyAdded,
}

/// Entry point for everything users do with orders and points.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn Store>,
}

impl Ledger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Submit an order number for accrual evaluation.
    ///
    /// Resubmission by the same owner is an idempotent success; the same
    /// number from another owner is [`LedgerError::AddedByAnotherOwner`].
    pub async fn submit_order(
        &self,
        owner: UserId,
        number: &str,
    ) -> Result<SubmitOutcome, LedgerError> {
        if luhn::validate(number).is_err() {
            return Err(LedgerError::InvalidOrderNumber {
                number: number.to_string(),
            });
        }

        match self.store.add_order(number, owner).await {
            Ok(()) => {
                info!(order = %number, owner = %owner, "order accepted");
                Ok(SubmitOutcome::Accepted)
            }
            Err(StoreError::DuplicateOrder { .. }) => {
                let existing = self.store.get_order(number).await?.ok_or_else(|| {
                    StoreError::Backend(format!("duplicate order {number} has no row"))
                })?;
                if existing.owner == owner {
                    debug!(order = %number, owner = %owner, "order resubmitted by its owner");
                    Ok(SubmitOutcome::AlreadyAdded)
                } else {
                    Err(LedgerError::AddedByAnotherOwner {
                        number: number.to_string(),
                    })
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Spend points against an order number.
    ///
    /// The number lives in its own Luhn-validated namespace; it does not
    /// have to exist as a submitted order.
    pub async fn withdraw(
        &self,
        owner: UserId,
        number: &str,
        sum: Decimal,
    ) -> Result<(), LedgerError> {
        if luhn::validate(number).is_err() {
            return Err(LedgerError::InvalidOrderNumber {
                number: number.to_string(),
            });
        }
        if sum <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveWithdrawal { requested: sum });
        }

        match self.store.withdraw(owner, number, sum).await {
            Ok(()) => {
                info!(order = %number, owner = %owner, sum = %sum, "withdrawal recorded");
                Ok(())
            }
            Err(StoreError::InsufficientFunds { balance, requested }) => {
                Err(LedgerError::InsufficientFunds { balance, requested })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All orders uploaded by `owner`, oldest first.
    pub async fn list_orders(&self, owner: UserId) -> Result<Vec<Order>, LedgerError> {
        Ok(self.store.list_orders(owner).await?)
    }

    /// Current and withdrawn point totals for `owner`.
    pub async fn get_balance(&self, owner: UserId) -> Result<Balance, LedgerError> {
        Ok(self.store.get_balance(owner).await?)
    }

    /// All withdrawals by `owner`, oldest first.
    pub async fn list_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        Ok(self.store.list_withdrawals(owner).await?)
    }
}
