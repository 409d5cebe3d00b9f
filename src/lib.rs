//! Savings Scheduler - recurring transfers and savings interest
//!
//! Daily batch engine over an idempotent ledger.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier aliases (AccountId, TransferId, SavingsId)
//! - [`money`] - Minor-unit amounts and interest arithmetic
//! - [`status`] - Transition tables for transfer and savings statuses
//! - [`ledger`] - Idempotent balance posting and the CSV journal
//! - [`transfer`] - Recurring transfer scheduling and execution
//! - [`savings`] - Daily accrual and maturity handling
//! - [`info`] - Read models
//! - [`driver`] - Periodic tick loop
//! - [`snapshot`] - JSON state file

// Core types - must be first!
pub mod core_types;

pub mod config;
pub mod driver;
pub mod info;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod savings;
pub mod snapshot;
pub mod status;
pub mod transfer;

// Convenient re-exports at crate root
pub use core_types::{AccountId, MinorUnits, SavingsId, TransferId};
pub use driver::{TickDriver, TickError, TickReport};
pub use info::{SavingsAccountInfo, ScheduledTransferInfo};
pub use ledger::{IdempotencyKey, InMemoryLedger, KeyScope, LedgerError, LedgerPoster, OverdraftPolicy, PostedEntry};
pub use money::Amount;
pub use savings::{AccrualError, SavingsAccount, SavingsAccrualEngine, SavingsType};
pub use status::{SavingsStatus, TransferStatus, TransitionError};
pub use transfer::{Frequency, ScheduleError, ScheduledTransfer, TransferScheduler};
