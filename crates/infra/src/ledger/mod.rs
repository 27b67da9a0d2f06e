//! Ledger client: atomic balance mutation, history queries and reconciliation.
//!
//! The cached balance (`balance:{user}`) is derived; the transaction log
//! (`txs:{user}`) is the source of truth. Mutations update both in one atomic
//! script, and reconciliation recomputes the former from the latter.

pub mod client;
pub mod query;
pub mod reconcile;

pub use client::{InitOutcome, LedgerClient, MutationOutcome};
pub use query::TransactionQuery;
pub use reconcile::{BalanceMismatch, BalanceVerification, ReconcileMode, ReconciliationReport};
