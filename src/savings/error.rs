//! Accrual Error Types

use chrono::NaiveDate;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::money::MoneyError;
use crate::status::TransitionError;

/// Savings engine errors
///
/// Everything except `Storage` is scoped to one account.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccrualError {
    #[error("Unsupported savings type: {0}")]
    UnsupportedSavingsType(String),

    #[error("Term account {0} has no maturity date")]
    MissingMaturityDate(String),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Interest calculation failed: {0}")]
    Money(#[from] MoneyError),

    #[error("Ledger rejected post: {0}")]
    Ledger(LedgerError),

    #[error("Date overflow after {0}")]
    DateOverflow(NaiveDate),

    // === Commands ===
    #[error("Invalid savings account: {0}")]
    InvalidAccount(String),

    #[error("Savings account not found: {0}")]
    AccountNotFound(String),

    #[error("Savings account {0} is not active")]
    AccountNotActive(String),

    #[error("Savings account {0} kept changing while being updated")]
    ConcurrentUpdate(String),

    // === Fatal to the tick ===
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AccrualError {
    pub fn code(&self) -> &'static str {
        match self {
            AccrualError::UnsupportedSavingsType(_) => "UNSUPPORTED_SAVINGS_TYPE",
            AccrualError::MissingMaturityDate(_) => "MISSING_MATURITY_DATE",
            AccrualError::InvalidTransition(_) => "INVALID_TRANSITION",
            AccrualError::Money(e) => e.code(),
            AccrualError::Ledger(e) => e.code(),
            AccrualError::DateOverflow(_) => "DATE_OVERFLOW",
            AccrualError::InvalidAccount(_) => "INVALID_ACCOUNT",
            AccrualError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            AccrualError::AccountNotActive(_) => "ACCOUNT_NOT_ACTIVE",
            AccrualError::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            AccrualError::Storage(_) => "STORAGE_ERROR",
        }
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, AccrualError::Storage(_))
    }
}

impl From<LedgerError> for AccrualError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Storage(msg) => AccrualError::Storage(msg),
            other => AccrualError::Ledger(other),
        }
    }
}

impl From<anyhow::Error> for AccrualError {
    fn from(e: anyhow::Error) -> Self {
        AccrualError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AccrualError::UnsupportedSavingsType("X".into()).code(),
            "UNSUPPORTED_SAVINGS_TYPE"
        );
        assert_eq!(AccrualError::from(MoneyError::NegativeRate).code(), "NEGATIVE_RATE");
        assert!(AccrualError::from(LedgerError::Storage("down".into())).is_fatal());
        assert!(!AccrualError::from(LedgerError::AccountNotFound("s".into())).is_fatal());
    }
}
