//! Scheduler Error Types

use chrono::NaiveDate;
use thiserror::Error;

use crate::core_types::AccountId;
use crate::ledger::LedgerError;
use crate::money::Amount;
use crate::status::TransitionError;

/// Transfer scheduling errors
///
/// Everything except `Storage` is scoped to one transfer and never stops
/// the rest of a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    // === Per-transfer, entity unchanged ===
    #[error("Unsupported frequency: {0}")]
    UnsupportedFrequency(String),

    #[error("Insufficient funds on {account_id}: balance {balance}, required {required}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Amount,
        required: Amount,
    },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Ledger rejected post: {0}")]
    Ledger(LedgerError),

    #[error("Run date overflow after {0}")]
    DateOverflow(NaiveDate),

    // === Commands ===
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    #[error("Transfer {0} kept changing while being updated")]
    ConcurrentUpdate(String),

    // === Fatal to the tick ===
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ScheduleError {
    pub fn code(&self) -> &'static str {
        match self {
            ScheduleError::UnsupportedFrequency(_) => "UNSUPPORTED_FREQUENCY",
            ScheduleError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            ScheduleError::InvalidTransition(_) => "INVALID_TRANSITION",
            ScheduleError::Ledger(e) => e.code(),
            ScheduleError::DateOverflow(_) => "DATE_OVERFLOW",
            ScheduleError::InvalidTransfer(_) => "INVALID_TRANSFER",
            ScheduleError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            ScheduleError::ConcurrentUpdate(_) => "CONCURRENT_UPDATE",
            ScheduleError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Retried automatically on the next tick (run date not advanced)
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScheduleError::InsufficientFunds { .. })
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScheduleError::Storage(_))
    }
}

impl From<LedgerError> for ScheduleError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientFunds {
                account_id,
                balance,
                delta,
            } => match delta.checked_neg() {
                Some(required) => ScheduleError::InsufficientFunds {
                    account_id,
                    balance,
                    required,
                },
                None => ScheduleError::Ledger(LedgerError::InsufficientFunds {
                    account_id,
                    balance,
                    delta,
                }),
            },
            LedgerError::Storage(msg) => ScheduleError::Storage(msg),
            other => ScheduleError::Ledger(other),
        }
    }
}

impl From<anyhow::Error> for ScheduleError {
    fn from(e: anyhow::Error) -> Self {
        ScheduleError::Storage(e.to_string())
    }
}
