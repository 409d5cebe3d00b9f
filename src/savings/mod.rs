//! Savings accounts: daily interest accrual and term maturity

pub mod engine;
pub mod error;
pub mod repository;
pub mod types;

pub use engine::{SavingsAccrualEngine, TickSummary};
pub use error::AccrualError;
pub use repository::{InMemorySavingsRepository, SavingsRepository};
pub use types::{Accrual, MaturityOutcome, OpenSavings, SavingsAccount, SavingsType, TickOutcome};
