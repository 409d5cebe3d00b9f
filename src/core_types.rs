//! Core types used throughout the system
//!
//! Identifier aliases shared by the ledger, the scheduler and the accrual engine.
//! Identifiers arrive from the account-opening side as opaque strings.

/// Ledger account identifier (savings accounts and transfer source accounts).
pub type AccountId = String;

/// Scheduled transfer identifier.
///
/// # Ordering:
/// Used as the tie-break when two transfers share a `next_run_date`,
/// so due lists are deterministic across runs.
pub type TransferId = String;

/// Savings account identifier.
///
/// A savings account is also a ledger account: interest is posted
/// to the ledger account with the same id.
pub type SavingsId = String;

/// Smallest currency unit (e.g. cents). Balances are signed so that
/// overdraft-enabled accounts can be represented.
pub type MinorUnits = i64;
