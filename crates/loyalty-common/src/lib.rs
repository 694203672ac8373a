//! Shared types and validation for the loyalty points engine.
//!
//! This crate contains:
//! - Domain types (UserId, OrderStatus, Order, Balance, Withdrawal)
//! - Order number validation (Luhn checksum)

pub mod luhn;
pub mod types;

pub use types::*;
