//! Savings account repository

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::core_types::SavingsId;

use super::types::SavingsAccount;

#[async_trait]
pub trait SavingsRepository: Send + Sync {
    /// Accounts whose status accrues interest (ACTIVE)
    async fn fetch_accruing(&self) -> Result<Vec<SavingsAccount>>;

    async fn get(&self, id: &str) -> Result<Option<SavingsAccount>>;

    /// Replace `expected` with `updated` only if the stored account still
    /// equals `expected`; `false` means nothing was written
    async fn save_if(&self, expected: &SavingsAccount, updated: &SavingsAccount) -> Result<bool>;

    async fn list(&self) -> Result<Vec<SavingsAccount>>;
}

#[derive(Default)]
pub struct InMemorySavingsRepository {
    accounts: DashMap<SavingsId, SavingsAccount>,
}

impl InMemorySavingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: impl IntoIterator<Item = SavingsAccount>) -> Self {
        let repo = Self::new();
        for account in accounts {
            repo.insert(account);
        }
        repo
    }

    pub fn insert(&self, account: SavingsAccount) {
        self.accounts.insert(account.id.clone(), account);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl SavingsRepository for InMemorySavingsRepository {
    async fn fetch_accruing(&self) -> Result<Vec<SavingsAccount>> {
        let mut accruing: Vec<SavingsAccount> = self
            .accounts
            .iter()
            .filter(|a| a.status.accrues())
            .map(|a| a.value().clone())
            .collect();
        accruing.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(accruing)
    }

    async fn get(&self, id: &str) -> Result<Option<SavingsAccount>> {
        Ok(self.accounts.get(id).map(|a| a.value().clone()))
    }

    async fn save_if(&self, expected: &SavingsAccount, updated: &SavingsAccount) -> Result<bool> {
        match self.accounts.get_mut(&expected.id) {
            Some(mut stored) if *stored == *expected => {
                *stored = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<SavingsAccount>> {
        let mut all: Vec<SavingsAccount> = self.accounts.iter().map(|a| a.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}
