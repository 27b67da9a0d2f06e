//! Versioned atomic scripts executed by the store.
//!
//! Each script lives in `scripts/*.lua` and receives every input through
//! `KEYS`/`ARGV`; nothing is spliced into the source. All three share one
//! contract:
//!
//! - `KEYS = [balance:{user}, txs:{user}]`
//! - `ARGV = [amount, timestamp_ms, encoded_entry]`
//! - reply `[status, balance]` where status `1` means the entry was written
//!   and `0` means nothing changed

use super::r#trait::{StoreError, StoreResult};

/// A named, versioned script resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerScript {
    pub name: &'static str,
    pub version: u32,
    pub source: &'static str,
}

impl LedgerScript {
    /// `name@vN`, used in logs and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}@v{}", self.name, self.version)
    }
}

pub const INITIALIZE: LedgerScript = LedgerScript {
    name: "initialize",
    version: 1,
    source: include_str!("../../scripts/initialize.lua"),
};

pub const DEDUCT: LedgerScript = LedgerScript {
    name: "deduct",
    version: 1,
    source: include_str!("../../scripts/deduct.lua"),
};

pub const ADD: LedgerScript = LedgerScript {
    name: "add",
    version: 1,
    source: include_str!("../../scripts/add.lua"),
};

/// Every script the ledger ships.
pub const ALL: [LedgerScript; 3] = [INITIALIZE, DEDUCT, ADD];

/// Decoded `[status, balance]` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptReply {
    pub applied: bool,
    pub balance: i64,
}

impl ScriptReply {
    /// Parse a flattened reply strictly.
    ///
    /// An unparsable balance is an error, never zero: it means the cached
    /// value was tampered with or the script misbehaved.
    pub fn parse(script: &LedgerScript, reply: &[String]) -> StoreResult<Self> {
        let [status, balance] = reply else {
            return Err(StoreError::Malformed(format!(
                "{} replied with {} values, expected 2",
                script.qualified_name(),
                reply.len()
            )));
        };

        let applied = match status.as_str() {
            "1" => true,
            "0" => false,
            other => {
                return Err(StoreError::Malformed(format!(
                    "{} replied with unknown status {other:?}",
                    script.qualified_name()
                )));
            }
        };

        let balance = balance.parse::<i64>().map_err(|_| {
            StoreError::Malformed(format!(
                "{} replied with non-integer balance {balance:?}",
                script.qualified_name()
            ))
        })?;

        Ok(Self { applied, balance })
    }
}
