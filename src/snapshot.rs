//! State snapshot
//!
//! JSON file holding ledger balances, scheduled transfers and savings
//! accounts. The binary loads one, ticks the in-memory stores and writes
//! the result back.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core_types::AccountId;
use crate::ledger::{InMemoryLedger, OverdraftPolicy};
use crate::money::Amount;
use crate::savings::{InMemorySavingsRepository, SavingsAccount, SavingsRepository};
use crate::transfer::{InMemoryTransferRepository, ScheduledTransfer, TransferRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccountState {
    pub account_id: AccountId,
    pub balance: Amount,
    #[serde(default)]
    pub overdraft: OverdraftPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    #[serde(default)]
    pub ledger_accounts: Vec<LedgerAccountState>,
    #[serde(default)]
    pub transfers: Vec<ScheduledTransfer>,
    #[serde(default)]
    pub savings_accounts: Vec<SavingsAccount>,
}

/// In-memory stores built from a snapshot
pub struct Stores {
    pub ledger: Arc<InMemoryLedger>,
    pub transfers: Arc<InMemoryTransferRepository>,
    pub savings: Arc<InMemorySavingsRepository>,
}

impl StateSnapshot {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read state file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file {}", path.display()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write state file {}", path.display()))
    }

    /// Savings accounts without a listed ledger account get one opened at
    /// their recorded balance.
    pub fn into_stores(self) -> Result<Stores> {
        let ledger = InMemoryLedger::new();
        for account in &self.ledger_accounts {
            ledger
                .open_account(account.account_id.clone(), account.balance, account.overdraft)
                .with_context(|| format!("Failed to open ledger account {}", account.account_id))?;
        }
        for savings in &self.savings_accounts {
            if self.ledger_accounts.iter().any(|a| a.account_id == savings.id) {
                continue;
            }
            ledger
                .open_account(savings.id.clone(), savings.balance, OverdraftPolicy::Disallowed)
                .with_context(|| format!("Failed to open ledger account {}", savings.id))?;
        }

        Ok(Stores {
            ledger: Arc::new(ledger),
            transfers: Arc::new(InMemoryTransferRepository::with_transfers(self.transfers)),
            savings: Arc::new(InMemorySavingsRepository::with_accounts(self.savings_accounts)),
        })
    }

    pub async fn capture(stores: &Stores) -> Result<Self> {
        let ledger_accounts = stores
            .ledger
            .accounts()
            .into_iter()
            .map(|(account_id, balance, overdraft)| LedgerAccountState {
                account_id,
                balance,
                overdraft,
            })
            .collect();

        Ok(Self {
            ledger_accounts,
            transfers: stores.transfers.list().await?,
            savings_accounts: stores.savings.list().await?,
        })
    }
}
