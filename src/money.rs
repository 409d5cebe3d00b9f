//! Money Module
//!
//! Fixed-point currency amounts and interest arithmetic.
//! All balance and interest values MUST go through this module.
//!
//! ## Design Principles
//! 1. Integer minor units: amounts are `i64` counts of the smallest currency unit
//! 2. Explicit Error Handling: overflow is reported, never wrapped or saturated
//! 3. Interest rounds DOWN to the smallest unit, never up
//!
//! ## Usage
//! ```rust
//! use savings_scheduler::money::{Amount, format_amount};
//!
//! let amount = Amount::from_minor(1250);
//! assert_eq!(format_amount(amount, 2), "12.50");
//! assert_eq!(amount.checked_neg(), Some(Amount::from_minor(-1250)));
//! ```

use std::fmt;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_types::MinorUnits;

// ============================================================================
// Error Types
// ============================================================================

/// Money arithmetic errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Amount too large, would overflow")]
    Overflow,

    #[error("Interest rate must not be negative")]
    NegativeRate,
}

impl MoneyError {
    pub fn code(&self) -> &'static str {
        match self {
            MoneyError::Overflow => "OVERFLOW",
            MoneyError::NegativeRate => "NEGATIVE_RATE",
        }
    }
}

// ============================================================================
// Amount
// ============================================================================

/// Signed currency amount in minor units.
///
/// # Invariants:
/// - Never built from floating point
/// - Arithmetic is checked; overflow is an error, not a wrap
///
/// Serializes as a bare integer (`1250` for 12.50 at 2 decimals).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(MinorUnits);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    #[inline]
    pub const fn from_minor(units: MinorUnits) -> Self {
        Self(units)
    }

    #[inline]
    pub const fn minor(&self) -> MinorUnits {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// `None` for `i64::MIN`, which has no positive counterpart
    pub fn checked_neg(self) -> Option<Amount> {
        self.0.checked_neg().map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<MinorUnits> for Amount {
    fn from(units: MinorUnits) -> Self {
        Amount(units)
    }
}

// ============================================================================
// Format: Internal → Client (Amount → String)
// ============================================================================

/// Convert an internal amount to a display string with `decimals` places.
pub fn format_amount(amount: Amount, decimals: u32) -> String {
    let mut value = Decimal::from(amount.minor());
    // Out-of-range scale leaves the raw minor units visible rather than failing
    if value.set_scale(decimals).is_err() {
        return amount.minor().to_string();
    }
    value.to_string()
}

// ============================================================================
// Interest
// ============================================================================

/// Simple interest over `days` days at an annual `rate`, rounded down.
///
/// `floor(balance * rate * days / basis)`. Non-positive balances and
/// non-positive day counts earn nothing.
pub fn simple_interest(
    balance: Amount,
    rate: Decimal,
    days: i64,
    basis: u32,
) -> Result<Amount, MoneyError> {
    if rate.is_sign_negative() {
        return Err(MoneyError::NegativeRate);
    }
    if !balance.is_positive() || days <= 0 || basis == 0 {
        return Ok(Amount::ZERO);
    }

    let interest = Decimal::from(balance.minor())
        .checked_mul(rate)
        .and_then(|v| v.checked_mul(Decimal::from(days)))
        .and_then(|v| v.checked_div(Decimal::from(basis)))
        .ok_or(MoneyError::Overflow)?;

    interest
        .floor()
        .to_i64()
        .map(Amount::from_minor)
        .ok_or(MoneyError::Overflow)
}

/// One day of simple interest, rounded down.
pub fn daily_interest(balance: Amount, rate: Decimal, basis: u32) -> Result<Amount, MoneyError> {
    simple_interest(balance, rate, 1, basis)
}
