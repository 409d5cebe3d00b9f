//! Ledger Poster
//!
//! The only component allowed to mutate monetary balances.
//!
//! # Safety Invariants
//!
//! 1. **Per-Account Serialization**: two posts to the same account never interleave
//! 2. **No Overdraft**: accounts with `OverdraftPolicy::Disallowed` never go negative
//! 3. **Idempotency**: a key is applied at most once per account; replays return
//!    `DuplicatePost` and change nothing
//! 4. **Deterministic Keys**: keys are built from `(scope, entity id, logical date)` only,
//!    never from the wall clock of the worker doing the post

pub mod error;
pub mod journal;
pub mod memory;

pub use error::LedgerError;
pub use journal::JournalWriter;
pub use memory::InMemoryLedger;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::AccountId;
use crate::money::Amount;

/// What kind of entity a key belongs to
///
/// Transfer and savings ids live in separate namespaces, so the scope keeps
/// a transfer run from colliding with an accrual on the same account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyScope {
    Transfer,
    Accrual,
    /// Deposits and corrections posted outside the engines
    Adjustment,
}

impl KeyScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScope::Transfer => "transfer",
            KeyScope::Accrual => "accrual",
            KeyScope::Adjustment => "adjustment",
        }
    }
}

/// Idempotency key for a balance mutation
///
/// Rendered as `scope:entity_id:YYYY-MM-DD`. Built from a calendar date only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey {
    scope: KeyScope,
    entity_id: String,
    logical_date: NaiveDate,
}

impl IdempotencyKey {
    pub fn new(scope: KeyScope, entity_id: impl Into<String>, logical_date: NaiveDate) -> Self {
        Self {
            scope,
            entity_id: entity_id.into(),
            logical_date,
        }
    }

    pub fn transfer(transfer_id: impl Into<String>, run_date: NaiveDate) -> Self {
        Self::new(KeyScope::Transfer, transfer_id, run_date)
    }

    pub fn accrual(savings_id: impl Into<String>, day: NaiveDate) -> Self {
        Self::new(KeyScope::Accrual, savings_id, day)
    }

    pub fn scope(&self) -> KeyScope {
        self.scope
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn logical_date(&self) -> NaiveDate {
        self.logical_date
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.scope.as_str(),
            self.entity_id,
            self.logical_date.format("%Y-%m-%d")
        )
    }
}

/// Ledger entry id - ULID, sortable by posting time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(ulid::Ulid);

impl EntryId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether an account may go below zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverdraftPolicy {
    /// Savings and transfer-source accounts
    #[default]
    Disallowed,
    Allowed,
}

/// One applied balance change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostedEntry {
    pub entry_id: EntryId,
    pub account_id: AccountId,
    pub delta: Amount,
    pub balance_after: Amount,
    pub key: IdempotencyKey,
    pub posted_at: DateTime<Utc>,
}

impl PostedEntry {
    /// "credit" or "debit", for the journal
    pub fn op(&self) -> &'static str {
        if self.delta.is_negative() {
            "debit"
        } else {
            "credit"
        }
    }
}

/// Balance mutation port
///
/// Implementations MUST serialize posts per account and MUST make
/// `post` idempotent per `(account_id, key)`.
#[async_trait]
pub trait LedgerPoster: Send + Sync {
    /// Apply a signed delta to an account
    ///
    /// # Errors
    /// - `InsufficientFunds` if the result would be negative and overdraft is disallowed
    /// - `DuplicatePost` if `key` was already applied to this account
    /// - `AccountNotFound`, `Overflow`, `Storage`
    async fn post(
        &self,
        account_id: &str,
        delta: Amount,
        key: &IdempotencyKey,
    ) -> Result<PostedEntry, LedgerError>;

    /// Current balance of an account
    async fn balance(&self, account_id: &str) -> Result<Amount, LedgerError>;

    /// Entries applied to an account, in posting order
    async fn history(&self, account_id: &str) -> Result<Vec<PostedEntry>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idempotency_key_format() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let key = IdempotencyKey::transfer("tr-42", day);
        assert_eq!(key.to_string(), "transfer:tr-42:2024-03-01");
        assert_eq!(key.entity_id(), "tr-42");
        assert_eq!(key.scope(), KeyScope::Transfer);
        assert_eq!(key, IdempotencyKey::new(KeyScope::Transfer, "tr-42".to_string(), day));

        assert_eq!(IdempotencyKey::accrual("s-1", day).to_string(), "accrual:s-1:2024-03-01");
    }

    #[test]
    fn test_same_id_in_different_scopes_is_a_different_key() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_ne!(IdempotencyKey::transfer("x-1", day), IdempotencyKey::accrual("x-1", day));
    }

    #[test]
    fn test_entry_ids_are_unique() {
        assert_ne!(EntryId::new(), EntryId::new());
    }
}
