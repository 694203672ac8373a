//! Shared types for the loyalty points engine.
//!
//! CRITICAL: All point amounts use `rust_decimal::Decimal`.
//! NEVER use f64 for financial math.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier of a registered user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an uploaded order.
///
/// Transitions are monotonic: `New -> Processing -> {Processed, Invalid}`,
/// with `New` allowed to jump straight to a terminal state. Terminal states
/// never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Uploaded, not yet seen by the accrual system.
    New,
    /// The accrual system is evaluating the order.
    Processing,
    /// Evaluation finished; points were credited.
    Processed,
    /// The accrual system rejected the order.
    Invalid,
}

impl OrderStatus {
    /// Returns the wire/display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    /// Terminal statuses absorb all later verdicts.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    /// Whether a stored order may move from `self` to `next`.
    ///
    /// `Processing -> Processing` counts as a transition so each poll can
    /// refresh the row's update time.
    pub fn can_transition(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next != OrderStatus::New
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "NEW" => Ok(OrderStatus::New),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "PROCESSED" => Ok(OrderStatus::Processed),
            "INVALID" => Ok(OrderStatus::Invalid),
            _ => Err(format!("Unknown order status: {}", s)),
        }
    }
}

/// A purchase order submitted for accrual evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    /// Order number (digit string, Luhn-valid).
    pub number: String,
    /// User who uploaded the order.
    #[serde(skip)]
    pub owner: UserId,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Points awarded; set once the order reaches `Processed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    /// When the user uploaded the order.
    pub uploaded_at: DateTime<Utc>,
    /// When the status last changed.
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

/// Point totals for one user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Balance {
    /// Points currently available to spend.
    pub current: Decimal,
    /// Lifetime total of withdrawn points.
    pub withdrawn: Decimal,
}

/// A completed withdrawal of points against an order number.
#[derive(Debug, Clone, Serialize)]
pub struct Withdrawal {
    /// User who spent the points.
    #[serde(skip)]
    pub owner: UserId,
    /// Order number the points were spent on.
    #[serde(rename = "order")]
    pub order_number: String,
    /// Points spent.
    pub sum: Decimal,
    /// When the withdrawal was recorded.
    pub processed_at: DateTime<Utc>,
}
