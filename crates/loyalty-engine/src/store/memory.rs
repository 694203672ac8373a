//! In-memory store used by the engine binary and the test suite.
//!
//! Not durable. Atomicity comes from DashMap's per-entry locking: each order
//! row and each account entry is mutated while its shard guard is held, so
//! the trait's atomicity contract holds without a global lock.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;

use loyalty_common::{Balance, Order, OrderStatus, UserId, Withdrawal};

use super::{CreditOutcome, Store, StoreError};

/// One stored order row.
#[derive(Debug, Clone)]
struct OrderRow {
    order: Order,
    /// Set while a scheduler scan holds the order.
    claimed: bool,
}

/// One user's account: totals plus withdrawal history.
#[derive(Debug, Clone, Default)]
struct AccountRow {
    balance: Decimal,
    withdrawn: Decimal,
    withdrawals: Vec<Withdrawal>,
}

/// DashMap-backed [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: DashMap<String, OrderRow>,
    accounts: DashMap<UserId, AccountRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders (for debugging/metrics).
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn add_order(&self, number: &str, owner: UserId) -> Result<(), StoreError> {
        match self.orders.entry(number.to_string()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateOrder {
                number: number.to_string(),
            }),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                slot.insert(OrderRow {
                    order: Order {
                        number: number.to_string(),
                        owner,
                        status: OrderStatus::New,
                        accrual: None,
                        uploaded_at: now,
                        updated_at: now,
                    },
                    claimed: false,
                });
                Ok(())
            }
        }
    }

    async fn get_order(&self, number: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.orders.get(number).map(|row| row.order.clone()))
    }

    async fn list_orders(&self, owner: UserId) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|row| row.order.owner == owner)
            .map(|row| row.order.clone())
            .collect();
        orders.sort_by_key(|order| order.uploaded_at);
        Ok(orders)
    }

    async fn get_balance(&self, owner: UserId) -> Result<Balance, StoreError> {
        Ok(self
            .accounts
            .get(&owner)
            .map(|account| Balance {
                current: account.balance,
                withdrawn: account.withdrawn,
            })
            .unwrap_or_default())
    }

    async fn withdraw(&self, owner: UserId, number: &str, sum: Decimal) -> Result<(), StoreError> {
        // The entry guard serializes all mutations of this account, so the
        // funds check and the debit form one atomic step.
        let mut account = self.accounts.entry(owner).or_default();
        if sum > account.balance {
            return Err(StoreError::InsufficientFunds {
                balance: account.balance,
                requested: sum,
            });
        }
        account.balance -= sum;
        account.withdrawn += sum;
        account.withdrawals.push(Withdrawal {
            owner,
            order_number: number.to_string(),
            sum,
            processed_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_withdrawals(&self, owner: UserId) -> Result<Vec<Withdrawal>, StoreError> {
        // Appends happen under the entry guard, so the history is already in
        // processed order.
        Ok(self
            .accounts
            .get(&owner)
            .map(|account| account.withdrawals.clone())
            .unwrap_or_default())
    }

    async fn scan_unresolved(&self) -> Result<Vec<String>, StoreError> {
        let mut claimed = Vec::new();
        for mut row in self.orders.iter_mut() {
            if !row.claimed && !row.order.status.is_terminal() {
                row.claimed = true;
                claimed.push(row.key().clone());
            }
        }
        Ok(claimed)
    }

    async fn release_claim(&self, number: &str) -> Result<(), StoreError> {
        if let Some(mut row) = self.orders.get_mut(number) {
            row.claimed = false;
        }
        Ok(())
    }

    async fn release_all_claims(&self) -> Result<(), StoreError> {
        for mut row in self.orders.iter_mut() {
            row.claimed = false;
        }
        Ok(())
    }

    async fn update_order_status(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> Result<bool, StoreError> {
        let mut row = self
            .orders
            .get_mut(number)
            .ok_or_else(|| StoreError::OrderNotFound {
                number: number.to_string(),
            })?;
        if !row.order.status.can_transition(status) {
            return Ok(false);
        }
        row.order.status = status;
        if accrual.is_some() {
            row.order.accrual = accrual;
        }
        row.order.updated_at = Utc::now();
        Ok(true)
    }

    async fn credit_balance(
        &self,
        number: &str,
        amount: Decimal,
    ) -> Result<CreditOutcome, StoreError> {
        let mut row = self
            .orders
            .get_mut(number)
            .ok_or_else(|| StoreError::OrderNotFound {
                number: number.to_string(),
            })?;
        if row.order.status.is_terminal() {
            return Ok(CreditOutcome::AlreadyResolved);
        }

        row.order.status = OrderStatus::Processed;
        row.order.accrual = Some(amount);
        row.order.updated_at = Utc::now();
        let owner = row.order.owner;

        // Credit while the order guard is held: nobody can observe a
        // PROCESSED order whose balance is not yet applied.
        let mut account = self.accounts.entry(owner).or_default();
        account.balance += amount;

        Ok(CreditOutcome::Applied { owner })
    }
}
