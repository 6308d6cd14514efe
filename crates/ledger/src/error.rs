use thiserror::Error;

use jobportal_core::DomainError;

use crate::amount::Amount;
use crate::registry::{JobId, JobStatus};

/// Why the ledger rejected a command.
///
/// Every rejection leaves the ledger untouched: the aggregate only emits
/// events once all checks for a command have passed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("caller is not authorized for this operation")]
    Unauthorized,

    #[error("insufficient payment: required {required}, offered {offered}")]
    InsufficientPayment { required: Amount, offered: Amount },

    #[error("overpayment rejected: required exactly {required}, offered {offered}")]
    OverPayment { required: Amount, offered: Amount },

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("ledger has not been deployed")]
    NotDeployed,

    #[error("ledger is already deployed")]
    AlreadyDeployed,

    #[error("no outstanding withdrawal {0}")]
    UnknownWithdrawal(uuid::Uuid),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => Self::Validation(msg),
            DomainError::InvariantViolation(msg) => Self::InvariantViolation(msg),
        }
    }
}
