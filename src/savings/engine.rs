//! Savings Accrual Engine
//!
//! Daily cycle per account:
//!
//! ```text
//! ACTIVE ──accrue: post floor(balance * rate / basis), key accrual:id:today──→ ACTIVE
//!        ──maturity <= today, autoRenew──→ ACTIVE (new term)
//!        ──maturity <= today──────────────→ COMPLETED
//! ```
//!
//! Accrual runs before the maturity check, so the last day of a term is paid
//! before the account completes. Each account is re-read before its tick and
//! saved with `save_if`; a close that lands mid-tick always wins.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info, warn};

use crate::config::AccrualConfig;
use crate::ledger::{IdempotencyKey, LedgerError, LedgerPoster, PostedEntry};
use crate::money;
use crate::status::{self, SavingsStatus};

use super::error::AccrualError;
use super::repository::SavingsRepository;
use super::types::{Accrual, MaturityOutcome, SavingsAccount, TickOutcome};

const MAX_SAVE_ATTEMPTS: usize = 3;

/// Tally of one savings tick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub accrued: usize,
    pub renewed: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TickSummary {
    pub fn from_outcomes(outcomes: &[TickOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            match &outcome.accrual {
                Ok(Accrual::Posted(_)) => summary.accrued += 1,
                Ok(_) => {}
                Err(_) => summary.failed += 1,
            }
            match outcome.maturity {
                MaturityOutcome::Renewed { .. } => summary.renewed += 1,
                MaturityOutcome::Completed { .. } => summary.completed += 1,
                MaturityOutcome::Rejected(_) => summary.failed += 1,
                _ => {}
            }
        }
        summary
    }
}

pub struct SavingsAccrualEngine {
    ledger: Arc<dyn LedgerPoster>,
    repository: Arc<dyn SavingsRepository>,
    config: AccrualConfig,
}

impl SavingsAccrualEngine {
    pub fn new(
        ledger: Arc<dyn LedgerPoster>,
        repository: Arc<dyn SavingsRepository>,
        config: AccrualConfig,
    ) -> Self {
        Self {
            ledger,
            repository,
            config,
        }
    }

    /// Post one day of interest for `account`
    ///
    /// Keyed by `accrual:id:today`; a second call on the same day posts nothing and
    /// re-reads the balance from the ledger. On error the account is left
    /// as it was.
    pub async fn accrue_daily(
        &self,
        account: &mut SavingsAccount,
        now: DateTime<Utc>,
    ) -> Result<Accrual, AccrualError> {
        if !account.status.accrues() {
            return Ok(Accrual::Nothing);
        }

        let interest = money::daily_interest(
            account.balance,
            account.interest_rate,
            self.config.day_count_basis,
        )?;
        if interest.is_zero() {
            debug!(savings_id = %account.id, balance = %account.balance, "Interest below one unit");
            return Ok(Accrual::Nothing);
        }

        let key = IdempotencyKey::accrual(account.id.clone(), now.date_naive());
        match self.ledger.post(&account.id, interest, &key).await {
            Ok(entry) => {
                account.balance = entry.balance_after;
                debug!(
                    savings_id = %account.id,
                    interest = %interest,
                    balance = %account.balance,
                    "Interest posted"
                );
                Ok(Accrual::Posted(entry))
            }
            Err(LedgerError::DuplicatePost { .. }) => {
                account.balance = self.ledger.balance(&account.id).await?;
                debug!(savings_id = %account.id, key = %key, "Interest already posted today");
                Ok(Accrual::AlreadyPosted)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Renew or complete `account` if its maturity date has been reached
    pub fn check_maturity(&self, account: &mut SavingsAccount, now: DateTime<Utc>) -> MaturityOutcome {
        let today = now.date_naive();
        if !account.status.accrues() {
            return MaturityOutcome::Inactive;
        }
        if account.savings_type.is_flexible() {
            return MaturityOutcome::NeverMatures;
        }
        if account.savings_type.term_months().is_none() {
            let e = AccrualError::UnsupportedSavingsType(account.savings_type.to_string());
            warn!(savings_id = %account.id, error = %e, "Maturity check skipped");
            return MaturityOutcome::Rejected(e);
        }
        let Some(maturity) = account.maturity_date else {
            let e = AccrualError::MissingMaturityDate(account.id.clone());
            warn!(savings_id = %account.id, error = %e, "Maturity check skipped");
            return MaturityOutcome::Rejected(e);
        };
        if maturity > today {
            return MaturityOutcome::NotMatured {
                days_remaining: maturity.signed_duration_since(today).num_days(),
            };
        }

        if account.renews() {
            return match self.renew(account, maturity, today) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(savings_id = %account.id, error = %e, "Renewal failed");
                    MaturityOutcome::Rejected(e)
                }
            };
        }

        match status::apply(account, SavingsStatus::Completed) {
            Ok(()) => {
                info!(savings_id = %account.id, maturity_date = %maturity, "Savings account completed");
                MaturityOutcome::Completed {
                    maturity_date: maturity,
                }
            }
            Err(e) => MaturityOutcome::Rejected(e.into()),
        }
    }

    /// Roll whole terms forward until the maturity date is in the future
    fn renew(
        &self,
        account: &mut SavingsAccount,
        previous_maturity: NaiveDate,
        today: NaiveDate,
    ) -> Result<MaturityOutcome, AccrualError> {
        let mut start = previous_maturity;
        let mut end = account.savings_type.term_end(start)?;
        let mut terms = 1u32;
        while end <= today {
            start = end;
            end = account.savings_type.term_end(start)?;
            terms += 1;
        }

        account.start_date = start;
        account.maturity_date = Some(end);
        info!(
            savings_id = %account.id,
            previous_maturity = %previous_maturity,
            maturity_date = %end,
            terms,
            "Savings account renewed"
        );
        Ok(MaturityOutcome::Renewed {
            previous_maturity,
            start_date: start,
            maturity_date: end,
            terms,
        })
    }

    /// Accrue then check maturity for one account, without persisting
    ///
    /// # Errors
    /// Only `AccrualError::Storage`.
    pub async fn tick_account(
        &self,
        account: &SavingsAccount,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, AccrualError> {
        let mut updated = account.clone();
        let accrual = match self.accrue_daily(&mut updated, now).await {
            Err(e) if e.is_fatal() => {
                error!(savings_id = %account.id, error = %e, "Ledger storage failure");
                return Err(e);
            }
            Err(e) => {
                warn!(savings_id = %account.id, error = %e, "Interest not accrued");
                Err(e)
            }
            Ok(accrual) => Ok(accrual),
        };

        // An unpaid day would be lost if the account completed now
        let maturity = if accrual.is_ok() {
            self.check_maturity(&mut updated, now)
        } else {
            MaturityOutcome::Deferred
        };

        Ok(TickOutcome {
            accrual,
            maturity,
            account: updated,
        })
    }

    /// Tick every account in `accounts`, saving the ones that changed
    ///
    /// Outcomes keep input order.
    pub async fn tick_accounts(
        &self,
        now: DateTime<Utc>,
        accounts: &[SavingsAccount],
    ) -> Result<Vec<TickOutcome>, AccrualError> {
        if accounts.is_empty() {
            debug!("No accruing savings accounts");
            return Ok(Vec::new());
        }

        let outcomes: Vec<TickOutcome> = stream::iter(accounts)
            .map(|account| self.tick_and_save(account, now))
            .buffered(self.config.max_concurrency.max(1))
            .try_collect()
            .await?;

        let summary = TickSummary::from_outcomes(&outcomes);
        info!(
            accounts = outcomes.len(),
            accrued = summary.accrued,
            renewed = summary.renewed,
            completed = summary.completed,
            failed = summary.failed,
            "Savings tick finished"
        );
        Ok(outcomes)
    }

    /// Load accruing accounts from the repository and tick them
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<TickOutcome>, AccrualError> {
        let accounts = self.repository.fetch_accruing().await?;
        self.tick_accounts(now, &accounts).await
    }

    async fn tick_and_save(
        &self,
        candidate: &SavingsAccount,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, AccrualError> {
        let mut posted: Option<PostedEntry> = None;
        let mut last = candidate.clone();

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let Some(current) = self.repository.get(&candidate.id).await? else {
                warn!(savings_id = %candidate.id, "Savings account removed before its tick");
                return Ok(TickOutcome {
                    accrual: Err(AccrualError::AccountNotFound(candidate.id.clone())),
                    maturity: MaturityOutcome::Deferred,
                    account: candidate.clone(),
                });
            };

            let mut outcome = self.tick_account(&current, now).await?;

            // Interest credited by an earlier attempt, before a close landed,
            // still belongs in the stored balance
            if posted.is_some()
                && !outcome.account.status.accrues()
                && let Ok(balance) = self.ledger.balance(&current.id).await
            {
                outcome.account.balance = balance;
            }

            let saved = outcome.account == current
                || self.repository.save_if(&current, &outcome.account).await?;
            if saved {
                if let Some(entry) = posted
                    && !matches!(outcome.accrual, Ok(Accrual::Posted(_)))
                {
                    warn!(
                        savings_id = %current.id,
                        key = %entry.key,
                        status = %current.status,
                        "Interest posted while the account changed"
                    );
                    outcome.accrual = Ok(Accrual::Posted(entry));
                }
                return Ok(outcome);
            }

            if let Ok(Accrual::Posted(entry)) = outcome.accrual {
                posted = Some(entry);
            }
            warn!(savings_id = %current.id, attempt, "Savings account changed during tick, re-reading");
            last = current;
        }

        error!(savings_id = %candidate.id, attempts = MAX_SAVE_ATTEMPTS, "Savings tick not saved");
        Ok(TickOutcome {
            accrual: Err(AccrualError::ConcurrentUpdate(candidate.id.clone())),
            maturity: MaturityOutcome::Deferred,
            account: last,
        })
    }

    // === Manual commands ===

    /// ACTIVE → CLOSED
    pub async fn close(&self, id: &str) -> Result<SavingsAccount, AccrualError> {
        let (previous, account) = self
            .update(id, |account| account.close().map_err(AccrualError::from))
            .await?;
        info!(savings_id = id, from = %previous.status, to = %account.status, "Savings status changed");
        Ok(account)
    }

    /// Toggle renewal at maturity; ACTIVE accounts only
    pub async fn set_auto_renew(&self, id: &str, auto_renew: bool) -> Result<SavingsAccount, AccrualError> {
        let (_, account) = self
            .update(id, |account| {
                if !account.status.accrues() {
                    return Err(AccrualError::AccountNotActive(account.id.clone()));
                }
                account.auto_renew = Some(auto_renew);
                Ok(())
            })
            .await?;
        info!(savings_id = id, auto_renew, "Savings auto-renew updated");
        Ok(account)
    }

    /// Apply `command` to the stored account and save it conditionally,
    /// returning the account before and after
    async fn update<F>(&self, id: &str, command: F) -> Result<(SavingsAccount, SavingsAccount), AccrualError>
    where
        F: Fn(&mut SavingsAccount) -> Result<(), AccrualError>,
    {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let current = self.load(id).await?;
            let mut account = current.clone();
            command(&mut account)?;
            if self.repository.save_if(&current, &account).await? {
                return Ok((current, account));
            }
            debug!(savings_id = id, attempt, "Savings account changed during command, re-reading");
        }
        Err(AccrualError::ConcurrentUpdate(id.to_string()))
    }

    async fn load(&self, id: &str) -> Result<SavingsAccount, AccrualError> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| AccrualError::AccountNotFound(id.to_string()))
    }
}
