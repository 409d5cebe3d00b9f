//! Transfer repository
//!
//! The scheduler never holds a process-wide list of transfers; it asks the
//! repository for candidates on every tick.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::core_types::TransferId;

use super::types::ScheduledTransfer;

/// Repository trait for scheduled transfer storage
#[async_trait]
pub trait TransferRepository: Send + Sync {
    /// ACTIVE transfers with `next_run_date <= today`
    ///
    /// A coarse pre-filter; the scheduler re-checks the full due predicate.
    async fn fetch_due_before(&self, today: NaiveDate) -> Result<Vec<ScheduledTransfer>>;

    async fn get(&self, id: &str) -> Result<Option<ScheduledTransfer>>;

    /// Replace `expected` with `updated` in one write
    ///
    /// Writes nothing and returns `false` when the stored transfer no longer
    /// equals `expected` (changed or removed since it was read).
    async fn save_if(
        &self,
        expected: &ScheduledTransfer,
        updated: &ScheduledTransfer,
    ) -> Result<bool>;

    async fn list(&self) -> Result<Vec<ScheduledTransfer>>;
}

/// DashMap-backed repository
#[derive(Default)]
pub struct InMemoryTransferRepository {
    transfers: DashMap<TransferId, ScheduledTransfer>,
}

impl InMemoryTransferRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_transfers(transfers: impl IntoIterator<Item = ScheduledTransfer>) -> Self {
        let repo = Self::new();
        for transfer in transfers {
            repo.insert(transfer);
        }
        repo
    }

    /// Store `transfer`, replacing any entity with the same id
    pub fn insert(&self, transfer: ScheduledTransfer) {
        self.transfers.insert(transfer.id.clone(), transfer);
    }

    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }
}

#[async_trait]
impl TransferRepository for InMemoryTransferRepository {
    async fn fetch_due_before(&self, today: NaiveDate) -> Result<Vec<ScheduledTransfer>> {
        Ok(self
            .transfers
            .iter()
            .filter(|t| t.status.is_executable() && t.next_run_date <= today)
            .map(|t| t.value().clone())
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledTransfer>> {
        Ok(self.transfers.get(id).map(|t| t.value().clone()))
    }

    async fn save_if(
        &self,
        expected: &ScheduledTransfer,
        updated: &ScheduledTransfer,
    ) -> Result<bool> {
        // Entry guard holds the shard lock across compare and replace
        match self.transfers.get_mut(&expected.id) {
            Some(mut stored) if *stored == *expected => {
                *stored = updated.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(&self) -> Result<Vec<ScheduledTransfer>> {
        let mut all: Vec<ScheduledTransfer> =
            self.transfers.iter().map(|t| t.value().clone()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::types::fixtures::{date, weekly};

    #[tokio::test]
    async fn test_fetch_due_before_prefilters() {
        let mut paused = weekly("t-paused");
        paused.pause().unwrap();
        let mut later = weekly("t-later");
        later.next_run_date = date(2024, 2, 1);

        let repo = InMemoryTransferRepository::with_transfers([weekly("t-due"), paused, later]);
        let due = repo.fetch_due_before(date(2024, 1, 8)).await.unwrap();

        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "t-due");
    }

    #[tokio::test]
    async fn test_insert_replaces_entity() {
        let repo = InMemoryTransferRepository::new();
        let mut t = weekly("t-1");
        repo.insert(t.clone());

        t.run_count = 3;
        repo.insert(t);

        assert_eq!(repo.len(), 1);
        assert_eq!(repo.get("t-1").await.unwrap().unwrap().run_count, 3);
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_if_rejects_changed_entity() {
        let t = weekly("t-1");
        let repo = InMemoryTransferRepository::with_transfers([t.clone()]);

        let mut paused = t.clone();
        paused.pause().unwrap();
        assert!(repo.save_if(&t, &paused).await.unwrap());

        // A writer still holding the pre-pause copy loses
        let mut advanced = t.clone();
        advanced.run_count = 1;
        assert!(!repo.save_if(&t, &advanced).await.unwrap());
        assert_eq!(repo.get("t-1").await.unwrap().unwrap(), paused);

        assert!(!repo.save_if(&weekly("missing"), &weekly("missing")).await.unwrap());
        assert!(repo.get("missing").await.unwrap().is_none());
    }
}
