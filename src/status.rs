//! Status State Machine
//!
//! Legal status transitions for scheduled transfers and savings accounts.
//!
//! # Transfer
//!
//! ```text
//! ACTIVE ⇄ PAUSED
//!   │
//!   ├──→ COMPLETED
//!   └──→ CANCELLED
//! ```
//!
//! # Savings
//!
//! ```text
//! ACTIVE ──→ CLOSED
//!   └─────→ COMPLETED
//! ```
//!
//! Identity transitions always succeed. Status values the code does not know
//! (`Unknown`) are preserved on load but cannot transition anywhere.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected status change. The entity is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {entity} status transition: {current} -> {target}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub current: String,
    pub target: String,
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        "INVALID_TRANSITION"
    }
}

/// A status enum with a fixed transition table.
pub trait StatusMachine: Clone + PartialEq + fmt::Display {
    /// Entity name used in diagnostics
    const ENTITY: &'static str;

    /// Non-identity edges of the transition table
    fn has_edge(&self, target: &Self) -> bool;

    /// `true` for identity transitions and for table edges
    fn can_transition(&self, target: &Self) -> bool {
        self == target || self.has_edge(target)
    }

    fn check_transition(&self, target: &Self) -> Result<(), TransitionError> {
        if self.can_transition(target) {
            Ok(())
        } else {
            Err(TransitionError {
                entity: Self::ENTITY,
                current: self.to_string(),
                target: target.to_string(),
            })
        }
    }
}

/// Entities carrying a status field.
pub trait HasStatus {
    type Status: StatusMachine;

    fn status(&self) -> &Self::Status;
    fn set_status(&mut self, status: Self::Status);
}

/// Move `entity` to `target`, touching nothing but the status field.
pub fn apply<E: HasStatus>(entity: &mut E, target: E::Status) -> Result<(), TransitionError> {
    entity.status().check_transition(&target)?;
    if *entity.status() != target {
        entity.set_status(target);
    }
    Ok(())
}

// ============================================================================
// Transfer Status
// ============================================================================

/// Scheduled transfer status (open set on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransferStatus {
    Active,
    Paused,
    /// Terminal: end date reached
    Completed,
    /// Terminal: cancelled by the owner
    Cancelled,
    Unknown(String),
}

impl TransferStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TransferStatus::Active => "ACTIVE",
            TransferStatus::Paused => "PAUSED",
            TransferStatus::Completed => "COMPLETED",
            TransferStatus::Cancelled => "CANCELLED",
            TransferStatus::Unknown(raw) => raw,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }

    /// Only ACTIVE transfers are ever selected for execution
    #[inline]
    pub fn is_executable(&self) -> bool {
        matches!(self, TransferStatus::Active)
    }
}

impl StatusMachine for TransferStatus {
    const ENTITY: &'static str = "transfer";

    fn has_edge(&self, target: &Self) -> bool {
        use TransferStatus::*;
        matches!(
            (self, target),
            (Active, Paused) | (Paused, Active) | (Active, Completed) | (Active, Cancelled)
        )
    }
}

impl From<String> for TransferStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ACTIVE" => TransferStatus::Active,
            "PAUSED" => TransferStatus::Paused,
            "COMPLETED" => TransferStatus::Completed,
            "CANCELLED" => TransferStatus::Cancelled,
            _ => TransferStatus::Unknown(raw),
        }
    }
}

impl From<TransferStatus> for String {
    fn from(status: TransferStatus) -> Self {
        match status {
            TransferStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Savings Status
// ============================================================================

/// Savings account status (open set on the wire)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SavingsStatus {
    Active,
    /// Terminal: closed manually before maturity
    Closed,
    /// Terminal: matured without auto-renew
    Completed,
    Unknown(String),
}

impl SavingsStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SavingsStatus::Active => "ACTIVE",
            SavingsStatus::Closed => "CLOSED",
            SavingsStatus::Completed => "COMPLETED",
            SavingsStatus::Unknown(raw) => raw,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SavingsStatus::Closed | SavingsStatus::Completed)
    }

    /// Only ACTIVE accounts accrue interest
    #[inline]
    pub fn accrues(&self) -> bool {
        matches!(self, SavingsStatus::Active)
    }
}

impl StatusMachine for SavingsStatus {
    const ENTITY: &'static str = "savings";

    fn has_edge(&self, target: &Self) -> bool {
        use SavingsStatus::*;
        matches!((self, target), (Active, Closed) | (Active, Completed))
    }
}

impl From<String> for SavingsStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "ACTIVE" => SavingsStatus::Active,
            "CLOSED" => SavingsStatus::Closed,
            "COMPLETED" => SavingsStatus::Completed,
            _ => SavingsStatus::Unknown(raw),
        }
    }
}

impl From<SavingsStatus> for String {
    fn from(status: SavingsStatus) -> Self {
        match status {
            SavingsStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for SavingsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
