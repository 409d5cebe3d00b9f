//! Tick Driver
//!
//! Periodic loop that runs the transfer scheduler and then the savings
//! engine once per tick. A failed tick is logged and retried on the next
//! interval; idempotency keys make the retry safe.

use std::fs::File;
use std::future::Future;
use std::io::BufWriter;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span};

use crate::config::DriverConfig;
use crate::ledger::{JournalWriter, PostedEntry};
use crate::logging::TRACE_TARGET;
use crate::savings::{Accrual, AccrualError, SavingsAccrualEngine, TickOutcome, TickSummary};
use crate::transfer::{ExecutionOutcome, ExecutionResult, RunSummary, ScheduleError, TransferScheduler};

#[derive(Error, Debug)]
pub enum TickError {
    #[error("Transfer run aborted: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Savings tick aborted: {0}")]
    Accrual(#[from] AccrualError),

    #[error("Journal write failed: {0}")]
    Journal(String),
}

impl TickError {
    pub fn code(&self) -> &'static str {
        match self {
            TickError::Schedule(e) => e.code(),
            TickError::Accrual(e) => e.code(),
            TickError::Journal(_) => "JOURNAL_ERROR",
        }
    }
}

/// Everything one tick did
#[derive(Debug, Clone)]
pub struct TickReport {
    pub date: NaiveDate,
    pub transfers: Vec<ExecutionResult>,
    pub savings: Vec<TickOutcome>,
}

impl TickReport {
    pub fn transfer_summary(&self) -> RunSummary {
        RunSummary::from_results(&self.transfers)
    }

    pub fn savings_summary(&self) -> TickSummary {
        TickSummary::from_outcomes(&self.savings)
    }

    /// Ledger entries created by this tick, transfers first
    pub fn posted_entries(&self) -> Vec<&PostedEntry> {
        let debits = self.transfers.iter().filter_map(|r| match &r.outcome {
            ExecutionOutcome::Executed(entry) => Some(entry),
            _ => None,
        });
        let credits = self.savings.iter().filter_map(|o| match &o.accrual {
            Ok(Accrual::Posted(entry)) => Some(entry),
            _ => None,
        });
        debits.chain(credits).collect()
    }
}

pub struct TickDriver {
    scheduler: Arc<TransferScheduler>,
    engine: Arc<SavingsAccrualEngine>,
    config: DriverConfig,
    journal: Option<Mutex<JournalWriter<BufWriter<File>>>>,
}

impl TickDriver {
    pub fn new(
        scheduler: Arc<TransferScheduler>,
        engine: Arc<SavingsAccrualEngine>,
        config: DriverConfig,
    ) -> Self {
        Self {
            scheduler,
            engine,
            config,
            journal: None,
        }
    }

    /// Append every entry posted by a tick to `journal`
    pub fn with_journal(mut self, journal: JournalWriter<BufWriter<File>>) -> Self {
        self.journal = Some(Mutex::new(journal));
        self
    }

    /// Run the tick loop until `after_tick` breaks
    ///
    /// `after_tick` is awaited after every tick, failed ones included, so the
    /// caller can persist whatever the tick changed.
    pub async fn run<F, Fut>(&self, mut after_tick: F)
    where
        F: FnMut(DateTime<Utc>) -> Fut,
        Fut: Future<Output = ControlFlow<()>>,
    {
        let period = Duration::from_secs(self.config.tick_interval_secs.max(1));
        info!(tick_interval_secs = period.as_secs(), "Starting tick driver");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let now = Utc::now();
            if let Err(e) = self.tick_once(now).await {
                error!(error = %e, code = e.code(), "Tick failed");
            }
            if after_tick(now).await.is_break() {
                info!("Tick driver stopped");
                return;
            }
        }
    }

    /// Transfers, then savings, at `now`
    pub async fn tick_once(&self, now: DateTime<Utc>) -> Result<TickReport, TickError> {
        let date = now.date_naive();
        let span = info_span!(target: TRACE_TARGET, "tick", date = %date);

        async {
            let transfers = self.scheduler.run_due(now).await?;
            let savings = self.engine.tick(now).await?;
            let report = TickReport {
                date,
                transfers,
                savings,
            };

            self.append_journal(&report)?;

            let transfer_summary = report.transfer_summary();
            let savings_summary = report.savings_summary();
            info!(
                date = %date,
                transfers_executed = transfer_summary.executed,
                transfers_rejected = transfer_summary.rejected,
                transfers_ended = transfer_summary.ended,
                savings_accrued = savings_summary.accrued,
                savings_renewed = savings_summary.renewed,
                savings_completed = savings_summary.completed,
                "Tick complete"
            );
            Ok::<_, TickError>(report)
        }
        .instrument(span)
        .await
    }

    fn append_journal(&self, report: &TickReport) -> Result<(), TickError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let entries = report.posted_entries();
        if entries.is_empty() {
            return Ok(());
        }

        let mut journal = journal
            .lock()
            .map_err(|_| TickError::Journal("journal lock poisoned".into()))?;
        journal
            .write_all(entries.iter().copied())
            .map_err(|e| TickError::Journal(e.to_string()))?;
        journal.flush().map_err(|e| TickError::Journal(e.to_string()))?;
        debug!(entries = journal.entry_count(), "Journal appended");
        Ok(())
    }
}
