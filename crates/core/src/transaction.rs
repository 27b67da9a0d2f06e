//! Transaction records: the authoritative, append-only history of a ledger.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::id::TransactionId;

/// Action tag of the genesis entry. Exactly one may exist per user.
pub const USER_INITIALIZED: &str = "user_initialized";

/// Scalar metadata value. Opaque to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Ordered, string-keyed metadata map.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// One immutable ledger entry.
///
/// `amount` is positive for credits and negative for debits, never zero.
/// `timestamp` is milliseconds since the Unix epoch and doubles as the
/// ordering score in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: i64,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub timestamp: i64,
}

impl Transaction {
    pub fn new(
        id: TransactionId,
        amount: i64,
        action: impl Into<String>,
        metadata: Option<Metadata>,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            amount,
            action: action.into(),
            metadata,
            timestamp,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.action == USER_INITIALIZED
    }

    pub fn is_credit(&self) -> bool {
        self.amount > 0
    }

    /// Wall-clock time of the entry, if the timestamp is representable.
    pub fn occurred_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Encode as the member stored in the log.
    pub fn encode(&self) -> Result<String, LedgerError> {
        serde_json::to_string(self).map_err(|e| {
            LedgerError::transaction_failure(
                format!("transaction serialization failed: {e}"),
                None,
                Some(self.id),
            )
        })
    }

    /// Decode a log member.
    pub fn decode(member: &str) -> Result<Self, LedgerError> {
        serde_json::from_str(member).map_err(|e| {
            LedgerError::transaction_failure(
                format!("malformed log entry: {e}"),
                None,
                None,
            )
        })
    }
}
