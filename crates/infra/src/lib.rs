//! Infrastructure layer: remote atomic store, ledger client, config.

pub mod clock;
pub mod config;
pub mod ledger;
pub mod store;


pub use clock::{Clock, SteppingClock, SystemClock};
pub use config::{ConfigError, LedgerConfig};
pub use ledger::{
    BalanceVerification, InitOutcome, LedgerClient, MutationOutcome, ReconcileMode,
    ReconciliationReport, TransactionQuery,
};
pub use store::{AtomicStore, InMemoryAtomicStore, StoreError};
