//! Run date arithmetic
//!
//! - `DAILY`   → +1 day
//! - `WEEKLY`  → +7 days
//! - `MONTHLY` → same day-of-month next calendar month, clamped to the
//!   month's last day (Jan 31 → Feb 28/29)

use chrono::{Datelike, Days, Months, NaiveDate};

use super::error::ScheduleError;
use super::types::Frequency;

/// Next run date after `from`
///
/// Always strictly later than `from`.
///
/// # Errors
/// - `UnsupportedFrequency` for values this build does not know
/// - `DateOverflow` past the end of the calendar
pub fn compute_next_run(frequency: &Frequency, from: NaiveDate) -> Result<NaiveDate, ScheduleError> {
    next_run(frequency, from, from.day())
}

/// Like [`compute_next_run`], but monthly runs target the day-of-month of
/// `anchor` instead of `from`, so a short month does not pull every later
/// run earlier (Jan 31 → Feb 29 → Mar 31).
pub fn next_run_anchored(
    frequency: &Frequency,
    from: NaiveDate,
    anchor: NaiveDate,
) -> Result<NaiveDate, ScheduleError> {
    next_run(frequency, from, anchor.day())
}

fn next_run(frequency: &Frequency, from: NaiveDate, day: u32) -> Result<NaiveDate, ScheduleError> {
    let next = match frequency {
        Frequency::Daily => from.checked_add_days(Days::new(1)),
        Frequency::Weekly => from.checked_add_days(Days::new(7)),
        Frequency::Monthly => add_month_clamped(from, day),
        Frequency::Unknown(raw) => return Err(ScheduleError::UnsupportedFrequency(raw.clone())),
    };
    next.ok_or(ScheduleError::DateOverflow(from))
}

/// `day` of the month after `from`, clamped to that month's length
fn add_month_clamped(from: NaiveDate, day: u32) -> Option<NaiveDate> {
    let first_of_next = from.with_day(1)?.checked_add_months(Months::new(1))?;
    let day = day.min(days_in_month(first_of_next)?);
    first_of_next.with_day(day)
}

/// Number of days in the month containing `date`
pub fn days_in_month(date: NaiveDate) -> Option<u32> {
    let first = date.with_day(1)?;
    let next_first = first.checked_add_months(Months::new(1))?;
    Some(next_first.signed_duration_since(first).num_days() as u32)
}
