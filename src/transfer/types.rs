//! Scheduled Transfer Types

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, TransferId};
use crate::ledger::{IdempotencyKey, PostedEntry};
use crate::money::Amount;
use crate::status::{self, HasStatus, StatusMachine, TransferStatus, TransitionError};

use super::error::ScheduleError;
use super::schedule;

/// Recurrence of a scheduled transfer (open set on the wire)
///
/// Unrecognized values load fine and are only rejected when the transfer
/// is executed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Unknown(String),
}

impl Frequency {
    pub fn as_str(&self) -> &str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Unknown(raw) => raw,
        }
    }

    #[inline]
    pub fn is_supported(&self) -> bool {
        !matches!(self, Frequency::Unknown(_))
    }
}

impl From<String> for Frequency {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "DAILY" => Frequency::Daily,
            "WEEKLY" => Frequency::Weekly,
            "MONTHLY" => Frequency::Monthly,
            _ => Frequency::Unknown(raw),
        }
    }
}

impl From<Frequency> for String {
    fn from(frequency: Frequency) -> Self {
        match frequency {
            Frequency::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recurring transfer entity
///
/// # Invariants:
/// - `next_run_date >= start_date`
/// - `next_run_date >= last_run_at.date()` when both are set
/// - `run_count` only ever grows, by one per successful execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTransfer {
    pub id: TransferId,
    pub frequency: Frequency,
    pub amount: Amount,
    pub source_account_id: AccountId,
    /// External destination, never validated here
    pub destination_name: String,
    pub destination_account_number: String,
    pub status: TransferStatus,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub next_run_date: NaiveDate,
    #[serde(default)]
    pub run_count: u64,
    /// When the latest run was recorded, never later than midnight of
    /// `next_run_date`
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Account-opening command for a scheduled transfer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTransfer {
    pub id: TransferId,
    pub frequency: Frequency,
    pub amount: Amount,
    pub source_account_id: AccountId,
    pub destination_name: String,
    pub destination_account_number: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Defaults to `start_date`
    #[serde(default)]
    pub first_run_date: Option<NaiveDate>,
}

impl ScheduledTransfer {
    /// Validate an opening command and build an ACTIVE transfer
    pub fn open(cmd: OpenTransfer) -> Result<Self, ScheduleError> {
        if !cmd.amount.is_positive() {
            return Err(ScheduleError::InvalidTransfer(format!(
                "{}: amount must be positive",
                cmd.id
            )));
        }
        let next_run_date = cmd.first_run_date.unwrap_or(cmd.start_date);
        if next_run_date < cmd.start_date {
            return Err(ScheduleError::InvalidTransfer(format!(
                "{}: first run {} is before start {}",
                cmd.id, next_run_date, cmd.start_date
            )));
        }
        if let Some(end) = cmd.end_date
            && end < cmd.start_date
        {
            return Err(ScheduleError::InvalidTransfer(format!(
                "{}: end {} is before start {}",
                cmd.id, end, cmd.start_date
            )));
        }

        Ok(Self {
            id: cmd.id,
            frequency: cmd.frequency,
            amount: cmd.amount,
            source_account_id: cmd.source_account_id,
            destination_name: cmd.destination_name,
            destination_account_number: cmd.destination_account_number,
            status: TransferStatus::Active,
            start_date: cmd.start_date,
            end_date: cmd.end_date,
            next_run_date,
            run_count: 0,
            last_run_at: None,
        })
    }

    /// Due iff ACTIVE, `next_run_date <= today` and the end date has not passed
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status.is_executable()
            && self.next_run_date <= today
            && self.end_date.is_none_or(|end| today <= end)
    }

    /// ACTIVE with a pending run dated on or before an end date that has
    /// already passed; `is_due` will never select it again
    pub fn is_ended(&self, today: NaiveDate) -> bool {
        self.status.is_executable() && self.end_date.is_some_and(|end| today > end)
    }

    /// Key of the pending run: `transfer:id:next_run_date`
    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::transfer(self.id.clone(), self.next_run_date)
    }

    /// Run date following the pending one (monthly runs anchor on `start_date`)
    pub fn following_run_date(&self) -> Result<NaiveDate, ScheduleError> {
        schedule::next_run_anchored(&self.frequency, self.next_run_date, self.start_date)
    }

    /// Record one successful run and move to the next date
    ///
    /// Completes the transfer when `next` falls after the end date. A late
    /// run catches up one period at a time, so `last_run_at` is clamped to
    /// midnight of `next` to keep it from overtaking the schedule.
    pub(crate) fn record_run(
        &mut self,
        now: DateTime<Utc>,
        next: NaiveDate,
    ) -> Result<(), ScheduleError> {
        let completes = self.end_date.is_some_and(|end| next > end);
        if completes {
            self.status.check_transition(&TransferStatus::Completed)?;
        }

        self.run_count = self.run_count.saturating_add(1);
        self.last_run_at = Some(now.min(next.and_time(NaiveTime::MIN).and_utc()));
        self.next_run_date = next;
        if completes {
            status::apply(self, TransferStatus::Completed)?;
        }
        Ok(())
    }

    /// Complete a transfer whose end date passed with a run still pending
    pub(crate) fn end(&mut self) -> Result<(), TransitionError> {
        status::apply(self, TransferStatus::Completed)
    }

    pub fn pause(&mut self) -> Result<(), TransitionError> {
        status::apply(self, TransferStatus::Paused)
    }

    pub fn resume(&mut self) -> Result<(), TransitionError> {
        status::apply(self, TransferStatus::Active)
    }

    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        status::apply(self, TransferStatus::Cancelled)
    }
}

impl HasStatus for ScheduledTransfer {
    type Status = TransferStatus;

    fn status(&self) -> &TransferStatus {
        &self.status
    }

    fn set_status(&mut self, status: TransferStatus) {
        self.status = status;
    }
}

/// Outcome of executing one transfer
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Balance debited, transfer advanced
    Executed(PostedEntry),
    /// Key already applied by an earlier attempt; transfer advanced, no balance change
    AlreadyExecuted,
    /// Not selected: inactive, not yet due, or past its end date
    NotDue,
    /// End date passed with this run unpaid; transfer completed without posting
    Ended,
    /// Entity unchanged; see the error for whether it is retried
    Rejected(ScheduleError),
}

impl ExecutionOutcome {
    /// Executed or already executed
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Executed(_) | ExecutionOutcome::AlreadyExecuted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionOutcome::Executed(_) => "EXECUTED",
            ExecutionOutcome::AlreadyExecuted => "ALREADY_EXECUTED",
            ExecutionOutcome::NotDue => "NOT_DUE",
            ExecutionOutcome::Ended => "ENDED",
            ExecutionOutcome::Rejected(e) => e.code(),
        }
    }
}

/// Result of `TransferScheduler::execute`
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Run date the attempt was for
    pub run_date: NaiveDate,
    pub outcome: ExecutionOutcome,
    /// Transfer state after the attempt (unchanged unless the outcome is a success)
    pub transfer: ScheduledTransfer,
}

impl ExecutionResult {
    pub fn transfer_id(&self) -> &str {
        &self.transfer.id
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_frequency_wire_values() {
        let f: Frequency = serde_json::from_str("\"MONTHLY\"").unwrap();
        assert_eq!(f, Frequency::Monthly);
        let f: Frequency = serde_json::from_str("\"QUARTERLY\"").unwrap();
        assert_eq!(f, Frequency::Unknown("QUARTERLY".into()));
        assert!(!f.is_supported());
        assert_eq!(serde_json::to_string(&f).unwrap(), "\"QUARTERLY\"");
    }

    #[test]
    fn test_open_validation() {
        let base = OpenTransfer {
            id: "t-1".into(),
            frequency: Frequency::Daily,
            amount: Amount::from_minor(100),
            source_account_id: "acc".into(),
            destination_name: "x".into(),
            destination_account_number: "1".into(),
            start_date: date(2024, 1, 10),
            end_date: None,
            first_run_date: None,
        };

        let t = ScheduledTransfer::open(base.clone()).unwrap();
        assert_eq!(t.next_run_date, date(2024, 1, 10));
        assert_eq!(t.status, TransferStatus::Active);

        let zero = OpenTransfer {
            amount: Amount::ZERO,
            ..base.clone()
        };
        assert!(ScheduledTransfer::open(zero).is_err());

        let early = OpenTransfer {
            first_run_date: Some(date(2024, 1, 9)),
            ..base.clone()
        };
        assert!(ScheduledTransfer::open(early).is_err());

        let ended = OpenTransfer {
            end_date: Some(date(2024, 1, 1)),
            ..base
        };
        assert!(ScheduledTransfer::open(ended).is_err());
    }

    #[test]
    fn test_is_due() {
        let mut t = weekly("t-1");
        assert!(!t.is_due(date(2024, 1, 7)));
        assert!(t.is_due(date(2024, 1, 8)));
        assert!(t.is_due(date(2024, 1, 20)));

        t.end_date = Some(date(2024, 1, 10));
        assert!(t.is_due(date(2024, 1, 10)));
        assert!(!t.is_due(date(2024, 1, 11)));

        t.end_date = None;
        t.pause().unwrap();
        assert!(!t.is_due(date(2024, 1, 8)));
    }

    #[test]
    fn test_record_run_completes_past_end_date() {
        let mut t = weekly("t-1");
        t.end_date = Some(date(2024, 1, 14));
        let now = date(2024, 1, 8).and_hms_opt(6, 0, 0).unwrap().and_utc();

        t.record_run(now, date(2024, 1, 15)).unwrap();
        assert_eq!(t.run_count, 1);
        assert_eq!(t.status, TransferStatus::Completed);
        assert_eq!(t.last_run_at, Some(now));
    }

    #[test]
    fn test_late_run_keeps_last_run_behind_next_date() {
        let mut t = weekly("t-1");
        let now = date(2024, 1, 22).and_hms_opt(1, 0, 0).unwrap().and_utc();

        t.record_run(now, date(2024, 1, 15)).unwrap();
        assert_eq!(t.next_run_date, date(2024, 1, 15));
        let last = t.last_run_at.unwrap();
        assert_eq!(last, date(2024, 1, 15).and_hms_opt(0, 0, 0).unwrap().and_utc());
        assert!(t.next_run_date >= last.date_naive());
    }

    #[test]
    fn test_is_ended_only_after_end_date() {
        let mut t = weekly("t-1");
        assert!(!t.is_ended(date(2030, 1, 1)));

        t.end_date = Some(date(2024, 1, 10));
        assert!(!t.is_ended(date(2024, 1, 10)));
        assert!(t.is_ended(date(2024, 1, 11)));

        t.pause().unwrap();
        assert!(!t.is_ended(date(2024, 1, 11)));
    }

    #[test]
    fn test_manual_commands() {
        let mut t = weekly("t-1");
        t.pause().unwrap();
        assert!(t.cancel().is_err());
        t.resume().unwrap();
        t.cancel().unwrap();
        assert!(t.resume().is_err());
        assert_eq!(t.status, TransferStatus::Cancelled);
    }

    #[test]
    fn test_camel_case_wire_format() {
        let t = weekly("t-1");
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["nextRunDate"], "2024-01-08");
        assert_eq!(json["sourceAccountId"], "acc-src");
        assert_eq!(json["runCount"], 0);
        assert!(json["lastRunAt"].is_null());

        let back: ScheduledTransfer = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }
}
