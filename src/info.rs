//! Read models
//!
//! Immutable snapshots for display. Amounts are carried in minor units plus
//! a formatted string.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::money::{self, Amount};
use crate::savings::{SavingsAccount, SavingsType};
use crate::status::{SavingsStatus, TransferStatus};
use crate::transfer::{Frequency, ScheduledTransfer};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavingsAccountInfo {
    pub id: String,
    pub savings_type: SavingsType,
    pub interest_rate: Decimal,
    pub start_date: NaiveDate,
    pub maturity_date: Option<NaiveDate>,
    pub status: SavingsStatus,
    pub balance: Amount,
    pub balance_display: String,
    pub auto_renew: bool,
    /// `max(0, maturity - today)`; `None` without a maturity date
    pub days_remaining: Option<i64>,
    /// `floor(balance * rate * days_remaining / basis)`
    pub estimated_interest: Option<Amount>,
    pub estimated_interest_display: Option<String>,
}

impl SavingsAccountInfo {
    pub fn project(account: &SavingsAccount, now: DateTime<Utc>, basis: u32, decimals: u32) -> Self {
        let days_remaining = account.days_remaining(now.date_naive());
        let estimated_interest = days_remaining.map(|days| {
            if !account.status.accrues() {
                return Amount::ZERO;
            }
            // A negative rate never accrues, so it projects nothing
            money::simple_interest(account.balance, account.interest_rate, days, basis)
                .unwrap_or(Amount::ZERO)
        });

        Self {
            id: account.id.clone(),
            savings_type: account.savings_type.clone(),
            interest_rate: account.interest_rate,
            start_date: account.start_date,
            maturity_date: account.maturity_date,
            status: account.status.clone(),
            balance: account.balance,
            balance_display: money::format_amount(account.balance, decimals),
            auto_renew: account.renews(),
            days_remaining,
            estimated_interest,
            estimated_interest_display: estimated_interest.map(|a| money::format_amount(a, decimals)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTransferInfo {
    pub id: String,
    pub frequency: Frequency,
    pub amount: Amount,
    pub amount_display: String,
    pub source_account_id: String,
    pub destination_name: String,
    pub destination_account_number: String,
    pub status: TransferStatus,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_run_date: NaiveDate,
    pub run_count: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ScheduledTransferInfo {
    pub fn project(transfer: &ScheduledTransfer, decimals: u32) -> Self {
        Self {
            id: transfer.id.clone(),
            frequency: transfer.frequency.clone(),
            amount: transfer.amount,
            amount_display: money::format_amount(transfer.amount, decimals),
            source_account_id: transfer.source_account_id.clone(),
            destination_name: transfer.destination_name.clone(),
            destination_account_number: transfer.destination_account_number.clone(),
            status: transfer.status.clone(),
            start_date: transfer.start_date,
            end_date: transfer.end_date,
            next_run_date: transfer.next_run_date,
            run_count: transfer.run_count,
            last_run_at: transfer.last_run_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::savings::types::fixtures::{date, flexible_account, term_account};
    use crate::transfer::types::fixtures::weekly;
    use chrono::TimeZone;

    fn at(d: NaiveDate) -> DateTime<Utc> {
        Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).unwrap())
    }

    #[test]
    fn test_savings_projection() {
        let info = SavingsAccountInfo::project(&term_account("s-1", None), at(date(2024, 1, 1)), 365, 2);
        assert_eq!(info.days_remaining, Some(9));
        // 1_000_000 * 0.06 * 9 / 365 = 1479.45
        assert_eq!(info.estimated_interest, Some(Amount::from_minor(1479)));
        assert_eq!(info.estimated_interest_display.as_deref(), Some("14.79"));
        assert_eq!(info.balance_display, "10000.00");
        assert!(!info.auto_renew);
    }

    #[test]
    fn test_savings_projection_edges() {
        let past = SavingsAccountInfo::project(&term_account("s-1", None), at(date(2025, 1, 1)), 365, 2);
        assert_eq!(past.days_remaining, Some(0));
        assert_eq!(past.estimated_interest, Some(Amount::ZERO));

        let flexible = SavingsAccountInfo::project(&flexible_account("s-2"), at(date(2024, 1, 1)), 365, 2);
        assert_eq!(flexible.days_remaining, None);
        assert_eq!(flexible.estimated_interest, None);

        let mut closed = term_account("s-3", None);
        closed.close().unwrap();
        let closed = SavingsAccountInfo::project(&closed, at(date(2024, 1, 1)), 365, 2);
        assert_eq!(closed.estimated_interest, Some(Amount::ZERO));
    }

    #[test]
    fn test_camel_case_json() {
        let info = SavingsAccountInfo::project(&flexible_account("s-2"), at(date(2024, 1, 1)), 365, 2);
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["savingsType"], "FLEXIBLE");
        assert_eq!(json["daysRemaining"], serde_json::Value::Null);
        assert_eq!(json["balance"], 500_000);

        let transfer = ScheduledTransferInfo::project(&weekly("t-1"), 2);
        let json = serde_json::to_value(&transfer).unwrap();
        assert_eq!(json["nextRunDate"], "2024-01-08");
        assert_eq!(json["runCount"], 0);
        assert_eq!(json["amountDisplay"], "1.00");
    }
}
