//! Order number validation.
//!
//! Order numbers are non-empty digit strings carrying a Luhn check digit.
//! Validation is total and deterministic; it never touches storage.

use thiserror::Error;

/// The number is empty, contains a non-digit, or fails its checksum.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid order number")]
pub struct InvalidOrderNumber;

/// Validate an order number with the Luhn checksum.
///
/// Walking digits right to left, every second digit is doubled and 9 is
/// subtracted when the double exceeds 9; the number is valid when the total
/// is divisible by 10.
pub fn validate(number: &str) -> Result<(), InvalidOrderNumber> {
    if number.is_empty() {
        return Err(InvalidOrderNumber);
    }

    let mut checksum: u64 = 0;
    for (i, byte) in number.bytes().rev().enumerate() {
        let digit = match byte {
            b'0'..=b'9' => u64::from(byte - b'0'),
            _ => return Err(InvalidOrderNumber),
        };
        // Positions count from 1 at the rightmost digit; even positions double.
        if i % 2 == 1 {
            let doubled = digit * 2;
            checksum += if doubled > 9 { doubled - 9 } else { doubled };
        } else {
            checksum += digit;
        }
    }

    if checksum % 10 == 0 {
        Ok(())
    } else {
        Err(InvalidOrderNumber)
    }
}

/// Convenience predicate over [`validate`].
pub fn is_valid(number: &str) -> bool {
    validate(number).is_ok()
}
