//! Ledger Error Types

use thiserror::Error;

use crate::core_types::AccountId;
use crate::money::Amount;

use super::IdempotencyKey;

/// Posting errors
///
/// `DuplicatePost` is an idempotency signal, not a failure: callers treat it
/// as "already applied".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds on {account_id}: balance {balance}, delta {delta}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        delta: Amount,
    },

    #[error("Duplicate post on {account_id} (key {key})")]
    DuplicatePost {
        account_id: AccountId,
        key: IdempotencyKey,
    },

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Account already exists: {0}")]
    AccountExists(AccountId),

    #[error("Balance would overflow on {0}")]
    Overflow(AccountId),

    /// Failure of the backing store; fatal to the current tick
    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::DuplicatePost { .. } => "DUPLICATE_POST",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::AccountExists(_) => "ACCOUNT_EXISTS",
            LedgerError::Overflow(_) => "OVERFLOW",
            LedgerError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Only storage failures abort a whole tick
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_error_codes() {
        let key = IdempotencyKey::transfer("t-1", NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        let dup = LedgerError::DuplicatePost {
            account_id: "acc-1".into(),
            key,
        };
        assert_eq!(dup.code(), "DUPLICATE_POST");
        assert_eq!(dup.to_string(), "Duplicate post on acc-1 (key transfer:t-1:2024-01-08)");
        assert!(!dup.is_fatal());
        assert!(LedgerError::Storage("disk full".into()).is_fatal());
    }
}
