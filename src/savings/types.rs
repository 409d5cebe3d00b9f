//! Savings Account Types

use std::fmt;

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::SavingsId;
use crate::ledger::PostedEntry;
use crate::money::Amount;
use crate::status::{self, HasStatus, SavingsStatus, TransitionError};

use super::error::AccrualError;

/// Savings product term (open set on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SavingsType {
    /// No term, never matures
    Flexible,
    OneMonth,
    ThreeMonths,
    SixMonths,
    TwelveMonths,
    TwentyFourMonths,
    Unknown(String),
}

impl SavingsType {
    pub fn as_str(&self) -> &str {
        match self {
            SavingsType::Flexible => "FLEXIBLE",
            SavingsType::OneMonth => "ONE_MONTH",
            SavingsType::ThreeMonths => "THREE_MONTHS",
            SavingsType::SixMonths => "SIX_MONTHS",
            SavingsType::TwelveMonths => "TWELVE_MONTHS",
            SavingsType::TwentyFourMonths => "TWENTY_FOUR_MONTHS",
            SavingsType::Unknown(raw) => raw,
        }
    }

    /// Term length in calendar months; `None` for flexible and unknown types
    pub fn term_months(&self) -> Option<u32> {
        match self {
            SavingsType::OneMonth => Some(1),
            SavingsType::ThreeMonths => Some(3),
            SavingsType::SixMonths => Some(6),
            SavingsType::TwelveMonths => Some(12),
            SavingsType::TwentyFourMonths => Some(24),
            SavingsType::Flexible | SavingsType::Unknown(_) => None,
        }
    }

    #[inline]
    pub fn is_flexible(&self) -> bool {
        matches!(self, SavingsType::Flexible)
    }

    /// End of a term starting at `start`, clamped to month end
    pub fn term_end(&self, start: NaiveDate) -> Result<NaiveDate, AccrualError> {
        let months = self
            .term_months()
            .ok_or_else(|| AccrualError::UnsupportedSavingsType(self.as_str().to_string()))?;
        start
            .checked_add_months(Months::new(months))
            .ok_or(AccrualError::DateOverflow(start))
    }
}

impl From<String> for SavingsType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "FLEXIBLE" => SavingsType::Flexible,
            "ONE_MONTH" => SavingsType::OneMonth,
            "THREE_MONTHS" => SavingsType::ThreeMonths,
            "SIX_MONTHS" => SavingsType::SixMonths,
            "TWELVE_MONTHS" => SavingsType::TwelveMonths,
            "TWENTY_FOUR_MONTHS" => SavingsType::TwentyFourMonths,
            _ => SavingsType::Unknown(raw),
        }
    }
}

impl From<SavingsType> for String {
    fn from(savings_type: SavingsType) -> Self {
        match savings_type {
            SavingsType::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SavingsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Savings account entity
///
/// # Invariants:
/// - `maturity_date` is `None` iff the type is `FLEXIBLE`
/// - CLOSED and COMPLETED accounts accrue nothing
/// - `balance` mirrors the ledger account with the same id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsAccount {
    pub id: SavingsId,
    pub savings_type: SavingsType,
    /// Annual rate as a fraction (0.06 = 6%)
    pub interest_rate: Decimal,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub maturity_date: Option<NaiveDate>,
    pub status: SavingsStatus,
    pub balance: Amount,
    /// Absent means "do not renew"
    #[serde(default)]
    pub auto_renew: Option<bool>,
}

/// Account-opening command for a savings account
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSavings {
    pub id: SavingsId,
    pub savings_type: SavingsType,
    pub interest_rate: Decimal,
    pub start_date: NaiveDate,
    pub opening_balance: Amount,
    #[serde(default)]
    pub auto_renew: Option<bool>,
}

impl SavingsAccount {
    /// Validate an opening command and build an ACTIVE account
    pub fn open(cmd: OpenSavings) -> Result<Self, AccrualError> {
        if cmd.interest_rate.is_sign_negative() {
            return Err(AccrualError::InvalidAccount(format!(
                "{}: interest rate must not be negative",
                cmd.id
            )));
        }
        if cmd.opening_balance.is_negative() {
            return Err(AccrualError::InvalidAccount(format!(
                "{}: opening balance must not be negative",
                cmd.id
            )));
        }

        let maturity_date = if cmd.savings_type.is_flexible() {
            None
        } else {
            Some(cmd.savings_type.term_end(cmd.start_date)?)
        };

        Ok(Self {
            id: cmd.id,
            savings_type: cmd.savings_type,
            interest_rate: cmd.interest_rate,
            start_date: cmd.start_date,
            maturity_date,
            status: SavingsStatus::Active,
            balance: cmd.opening_balance,
            auto_renew: cmd.auto_renew,
        })
    }

    #[inline]
    pub fn renews(&self) -> bool {
        self.auto_renew.unwrap_or(false)
    }

    /// Days until maturity floored at zero; `None` without a maturity date
    pub fn days_remaining(&self, today: NaiveDate) -> Option<i64> {
        self.maturity_date
            .map(|maturity| maturity.signed_duration_since(today).num_days().max(0))
    }

    pub fn close(&mut self) -> Result<(), TransitionError> {
        status::apply(self, SavingsStatus::Closed)
    }
}

impl HasStatus for SavingsAccount {
    type Status = SavingsStatus;

    fn status(&self) -> &SavingsStatus {
        &self.status
    }

    fn set_status(&mut self, status: SavingsStatus) {
        self.status = status;
    }
}

/// Result of a maturity check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaturityOutcome {
    /// Status is not ACTIVE
    Inactive,
    /// FLEXIBLE accounts have no maturity
    NeverMatures,
    NotMatured { days_remaining: i64 },
    /// New term(s) started; status stays ACTIVE
    Renewed {
        previous_maturity: NaiveDate,
        start_date: NaiveDate,
        maturity_date: NaiveDate,
        terms: u32,
    },
    /// ACTIVE → COMPLETED
    Completed { maturity_date: NaiveDate },
    /// Not evaluated because the day's accrual failed
    Deferred,
    /// Entity unchanged
    Rejected(AccrualError),
}

impl MaturityOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaturityOutcome::Inactive => "INACTIVE",
            MaturityOutcome::NeverMatures => "NEVER_MATURES",
            MaturityOutcome::NotMatured { .. } => "NOT_MATURED",
            MaturityOutcome::Renewed { .. } => "RENEWED",
            MaturityOutcome::Completed { .. } => "COMPLETED",
            MaturityOutcome::Deferred => "DEFERRED",
            MaturityOutcome::Rejected(e) => e.code(),
        }
    }
}

/// Interest posted for one account on one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accrual {
    Posted(PostedEntry),
    /// Already paid for this day by an earlier attempt
    AlreadyPosted,
    /// Inactive account or interest below one minor unit
    Nothing,
}

impl Accrual {
    /// Balance change made by this call
    pub fn delta(&self) -> Amount {
        match self {
            Accrual::Posted(entry) => entry.delta,
            Accrual::AlreadyPosted | Accrual::Nothing => Amount::ZERO,
        }
    }
}

/// Per-account result of `SavingsAccrualEngine::tick`
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub accrual: Result<Accrual, AccrualError>,
    pub maturity: MaturityOutcome,
    /// Account state after the tick
    pub account: SavingsAccount,
}

impl TickOutcome {
    pub fn account_id(&self) -> &str {
        &self.account.id
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use std::str::FromStr;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// ONE_MONTH account, 1_000_000 at 6%, maturing 2024-01-10
    pub fn term_account(id: &str, auto_renew: Option<bool>) -> SavingsAccount {
        SavingsAccount::open(OpenSavings {
            id: id.to_string(),
            savings_type: SavingsType::OneMonth,
            interest_rate: Decimal::from_str("0.06").unwrap(),
            start_date: date(2023, 12, 10),
            opening_balance: Amount::from_minor(1_000_000),
            auto_renew,
        })
        .unwrap()
    }

    pub fn flexible_account(id: &str) -> SavingsAccount {
        SavingsAccount::open(OpenSavings {
            id: id.to_string(),
            savings_type: SavingsType::Flexible,
            interest_rate: Decimal::from_str("0.02").unwrap(),
            start_date: date(2023, 1, 1),
            opening_balance: Amount::from_minor(500_000),
            auto_renew: Some(true),
        })
        .unwrap()
    }
}
