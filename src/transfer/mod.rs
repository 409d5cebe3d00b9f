//! Recurring transfers
//!
//! # State Machine
//!
//! ```text
//! ACTIVE ⇄ PAUSED
//!   ├──→ COMPLETED   (next run past end date, or end date passed unpaid)
//!   └──→ CANCELLED
//! ```
//!
//! Every debit is posted under `transfer:transfer_id:run_date`, so a run can
//! be retried any number of times and pays at most once.

pub mod error;
pub mod repository;
pub mod schedule;
pub mod scheduler;
pub mod types;

pub use error::ScheduleError;
pub use repository::{InMemoryTransferRepository, TransferRepository};
pub use schedule::compute_next_run;
pub use scheduler::{RunSummary, TransferScheduler};
pub use types::{ExecutionOutcome, ExecutionResult, Frequency, OpenTransfer, ScheduledTransfer};
