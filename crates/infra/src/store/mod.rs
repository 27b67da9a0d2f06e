//! Remote atomic store boundary.
//!
//! This module defines the capability surface the ledger requires from its
//! backing key-value store, independent of any transport, plus the versioned
//! scripts that run inside it.

pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis_atomic;
pub mod script;
pub mod r#trait;

pub use in_memory::InMemoryAtomicStore;
#[cfg(feature = "redis")]
pub use redis_atomic::RedisAtomicStore;
pub use r#trait::{AtomicStore, StoreError, StoreResult};
pub use script::{LedgerScript, ScriptReply};
