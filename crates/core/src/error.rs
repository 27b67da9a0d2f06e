//! Ledger error model.

use thiserror::Error;

use crate::id::{TransactionId, UserId};

/// Result type used across the ledger.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Every failure path of the client maps onto exactly one of these kinds, so
/// callers can match exhaustively (e.g. `InsufficientFunds` -> "payment required").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed input. Raised before any store round trip; never worth retrying.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The balance could not cover a deduction. Nothing was written.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: i64, available: i64 },

    /// The atomic mutation failed for a reason other than insufficiency
    /// (network, store fault, malformed script reply).
    #[error("transaction failed: {message}")]
    TransactionFailure {
        message: String,
        user_id: Option<UserId>,
        transaction_id: Option<TransactionId>,
    },

    /// A rebuild did not converge. Operators should be alerted.
    #[error(
        "reconciliation failed for user {user_id}: cached {cached}, calculated {calculated}"
    )]
    ReconciliationFailure {
        user_id: UserId,
        cached: i64,
        calculated: i64,
    },
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn insufficient_funds(required: i64, available: i64) -> Self {
        Self::InsufficientFunds {
            required,
            available,
        }
    }

    pub fn transaction_failure(
        msg: impl Into<String>,
        user_id: Option<UserId>,
        transaction_id: Option<TransactionId>,
    ) -> Self {
        Self::TransactionFailure {
            message: msg.into(),
            user_id,
            transaction_id,
        }
    }

    /// Whether this error is caused by caller input rather than the store.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Transaction id attached to a failed mutation, if any.
    pub fn transaction_id(&self) -> Option<TransactionId> {
        match self {
            Self::TransactionFailure { transaction_id, .. } => *transaction_id,
            _ => None,
        }
    }
}
