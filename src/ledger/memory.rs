//! In-memory ledger
//!
//! Per-account books stored in a DashMap. A post holds the account's
//! shard write guard for the whole check-and-apply, which serializes
//! concurrent posts to the same account.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::core_types::AccountId;
use crate::money::Amount;

use super::{EntryId, IdempotencyKey, LedgerError, LedgerPoster, OverdraftPolicy, PostedEntry};

/// Book for a single account
#[derive(Debug)]
struct AccountBook {
    balance: Amount,
    overdraft: OverdraftPolicy,
    applied_keys: HashSet<IdempotencyKey>,
    entries: Vec<PostedEntry>,
}

impl AccountBook {
    fn new(opening_balance: Amount, overdraft: OverdraftPolicy) -> Self {
        Self {
            balance: opening_balance,
            overdraft,
            applied_keys: HashSet::new(),
            entries: Vec::new(),
        }
    }
}

/// Thread-safe in-memory ledger
pub struct InMemoryLedger {
    books: DashMap<AccountId, AccountBook>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
        }
    }

    /// Register an account with an opening balance
    pub fn open_account(
        &self,
        account_id: impl Into<AccountId>,
        opening_balance: Amount,
        overdraft: OverdraftPolicy,
    ) -> Result<(), LedgerError> {
        let account_id = account_id.into();
        if opening_balance.is_negative() && overdraft == OverdraftPolicy::Disallowed {
            return Err(LedgerError::InsufficientFunds {
                account_id,
                balance: Amount::ZERO,
                delta: opening_balance,
            });
        }

        match self.books.entry(account_id) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                Err(LedgerError::AccountExists(e.key().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(AccountBook::new(opening_balance, overdraft));
                Ok(())
            }
        }
    }

    /// All entries across accounts, ordered by entry id (posting order)
    pub fn all_entries(&self) -> Vec<PostedEntry> {
        let mut entries: Vec<PostedEntry> = self
            .books
            .iter()
            .flat_map(|book| book.entries.clone())
            .collect();
        entries.sort_by_key(|e| e.entry_id);
        entries
    }

    /// `(account, balance, overdraft)` for every account, ordered by id
    pub fn accounts(&self) -> Vec<(AccountId, Amount, OverdraftPolicy)> {
        let mut accounts: Vec<(AccountId, Amount, OverdraftPolicy)> = self
            .books
            .iter()
            .map(|book| (book.key().clone(), book.balance, book.overdraft))
            .collect();
        accounts.sort_by(|a, b| a.0.cmp(&b.0));
        accounts
    }

    pub fn account_count(&self) -> usize {
        self.books.len()
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerPoster for InMemoryLedger {
    async fn post(
        &self,
        account_id: &str,
        delta: Amount,
        key: &IdempotencyKey,
    ) -> Result<PostedEntry, LedgerError> {
        // Exclusive guard for the account: check and apply are one step
        let mut book = self
            .books
            .get_mut(account_id)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        if book.applied_keys.contains(key) {
            debug!(account_id, key = %key, "Post already applied");
            return Err(LedgerError::DuplicatePost {
                account_id: account_id.to_string(),
                key: key.clone(),
            });
        }

        let balance_after = book
            .balance
            .checked_add(delta)
            .ok_or_else(|| LedgerError::Overflow(account_id.to_string()))?;

        if balance_after.is_negative() && book.overdraft == OverdraftPolicy::Disallowed {
            warn!(
                account_id,
                key = %key,
                balance = %book.balance,
                delta = %delta,
                "Post rejected: insufficient funds"
            );
            return Err(LedgerError::InsufficientFunds {
                account_id: account_id.to_string(),
                balance: book.balance,
                delta,
            });
        }

        let entry = PostedEntry {
            entry_id: EntryId::new(),
            account_id: account_id.to_string(),
            delta,
            balance_after,
            key: key.clone(),
            posted_at: Utc::now(),
        };

        book.balance = balance_after;
        book.applied_keys.insert(key.clone());
        book.entries.push(entry.clone());

        debug!(
            account_id,
            key = %key,
            delta = %delta,
            balance_after = %balance_after,
            "Posted"
        );
        Ok(entry)
    }

    async fn balance(&self, account_id: &str) -> Result<Amount, LedgerError> {
        self.books
            .get(account_id)
            .map(|book| book.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }

    async fn history(&self, account_id: &str) -> Result<Vec<PostedEntry>, LedgerError> {
        self.books
            .get(account_id)
            .map(|book| book.entries.clone())
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))
    }
}
