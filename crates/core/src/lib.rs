//! `creditledger-core`: ledger domain building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod transaction;
pub mod validation;

pub use error::{LedgerError, LedgerResult};
pub use id::{TransactionId, UserId, MAX_USER_ID_LEN};
pub use transaction::{Metadata, MetadataValue, Transaction, USER_INITIALIZED};
