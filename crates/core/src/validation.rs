//! Input checks performed before any store round trip.

use crate::error::{LedgerError, LedgerResult};
use crate::transaction::{Metadata, MetadataValue, USER_INITIALIZED};

/// A mutation amount must be strictly positive.
pub fn ensure_positive_amount(amount: i64) -> LedgerResult<()> {
    if amount <= 0 {
        return Err(LedgerError::validation(format!(
            "amount must be positive, got {amount}"
        )));
    }
    Ok(())
}

pub fn ensure_starting_balance(balance: i64) -> LedgerResult<()> {
    if balance < 0 {
        return Err(LedgerError::validation(format!(
            "starting balance must not be negative, got {balance}"
        )));
    }
    Ok(())
}

/// Action tags must be non-blank, and the genesis tag is reserved.
pub fn ensure_action(action: &str) -> LedgerResult<()> {
    if action.trim().is_empty() {
        return Err(LedgerError::validation("action must not be empty"));
    }
    if action == USER_INITIALIZED {
        return Err(LedgerError::validation(format!(
            "action '{USER_INITIALIZED}' is reserved for initialization"
        )));
    }
    Ok(())
}

pub fn ensure_metadata(metadata: Option<&Metadata>) -> LedgerResult<()> {
    let Some(metadata) = metadata else {
        return Ok(());
    };
    for (key, value) in metadata {
        if key.is_empty() {
            return Err(LedgerError::validation("metadata keys must not be empty"));
        }
        if let MetadataValue::Float(f) = value {
            if !f.is_finite() {
                return Err(LedgerError::validation(format!(
                    "metadata value for '{key}' is not finite"
                )));
            }
        }
    }
    Ok(())
}

/// Query limits must be positive; the cap is applied by the caller.
pub fn ensure_limit(limit: usize) -> LedgerResult<()> {
    if limit == 0 {
        return Err(LedgerError::validation("limit must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_must_be_positive() {
        assert!(ensure_positive_amount(1).is_ok());
        assert!(ensure_positive_amount(0).is_err());
        assert!(ensure_positive_amount(-5).is_err());
    }

    #[test]
    fn starting_balance_may_be_zero() {
        assert!(ensure_starting_balance(0).is_ok());
        assert!(ensure_starting_balance(-1).is_err());
    }

    #[test]
    fn blank_and_reserved_actions_are_rejected() {
        assert!(ensure_action("chat").is_ok());
        assert!(ensure_action("").is_err());
        assert!(ensure_action("   ").is_err());
        assert!(ensure_action(USER_INITIALIZED).is_err());
    }

    #[test]
    fn non_finite_metadata_is_rejected() {
        let mut metadata = Metadata::new();
        metadata.insert("ratio".into(), MetadataValue::Float(f64::NAN));
        assert!(ensure_metadata(Some(&metadata)).is_err());
        assert!(ensure_metadata(None).is_ok());
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(ensure_limit(0).is_err());
        assert!(ensure_limit(5).is_ok());
    }
}
