//! Strongly-typed identifiers used across the ledger.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LedgerError;

/// Maximum accepted length of a user identifier, in characters.
pub const MAX_USER_ID_LEN: usize = 256;

/// Identifier of a ledger owner.
///
/// Opaque to the ledger, but validated on construction because it is spliced
/// into store keys (`balance:{id}`, `txs:{id}`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a raw identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, LedgerError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(LedgerError::validation("user id must not be empty"));
        }
        if raw.chars().count() > MAX_USER_ID_LEN {
            return Err(LedgerError::validation(format!(
                "user id exceeds {MAX_USER_ID_LEN} characters"
            )));
        }
        if raw.chars().any(|c| matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')) {
            return Err(LedgerError::validation(
                "user id must not contain line breaks",
            ));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Scalar key holding the cached balance.
    pub fn balance_key(&self) -> String {
        format!("balance:{}", self.0)
    }

    /// Ordered-multimap key holding the transaction log.
    pub fn log_key(&self) -> String {
        format!("txs:{}", self.0)
    }
}

impl core::fmt::Display for UserId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

/// Identifier of a ledger transaction.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Create a new identifier.
    ///
    /// Uses UUIDv7 (time-ordered), so ids sharing a millisecond still sort in
    /// creation order within one process.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Sentinel returned when an operation wrote nothing.
    pub const fn noop() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_noop(&self) -> bool {
        self.0.is_nil()
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for TransactionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for TransactionId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s)
            .map_err(|e| LedgerError::validation(format!("TransactionId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn user_id_builds_stable_keys() {
        let user = UserId::parse("user_42").unwrap();
        assert_eq!(user.balance_key(), "balance:user_42");
        assert_eq!(user.log_key(), "txs:user_42");
    }

    #[test]
    fn user_id_rejects_empty_long_and_multiline() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("a".repeat(MAX_USER_ID_LEN + 1)).is_err());
        assert!(UserId::parse("a".repeat(MAX_USER_ID_LEN)).is_ok());
        assert!(UserId::parse("evil\nFLUSHALL").is_err());
        assert!(UserId::parse("evil\r").is_err());
    }

    #[test]
    fn user_id_length_counts_characters_not_bytes() {
        let id = "é".repeat(MAX_USER_ID_LEN);
        assert!(UserId::parse(id).is_ok());
    }

    #[test]
    fn user_id_deserialization_is_validated() {
        let ok: UserId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }

    #[test]
    fn noop_transaction_id_is_nil() {
        assert!(TransactionId::noop().is_noop());
        assert!(!TransactionId::new().is_noop());
    }

    proptest! {
        /// Property: any accepted id round-trips through its keys unchanged.
        #[test]
        fn accepted_ids_embed_verbatim_in_keys(raw in "[^\n\r\u{2028}\u{2029}]{1,64}") {
            let user = UserId::parse(raw.clone()).unwrap();
            prop_assert_eq!(user.balance_key(), format!("balance:{raw}"));
            prop_assert_eq!(user.log_key(), format!("txs:{raw}"));
            prop_assert_eq!(user.to_string(), raw);
        }
    }
}
