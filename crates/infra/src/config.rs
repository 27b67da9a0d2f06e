//! Ledger configuration.
//!
//! Defaults suit local development; production values come from the
//! environment via [`LedgerConfig::from_env`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Hard cap on transactions returned by one query.
pub const DEFAULT_MAX_QUERY_LIMIT: usize = 1000;

pub const ENV_REDIS_URL: &str = "CREDIT_LEDGER_REDIS_URL";
pub const ENV_DEFAULT_BALANCE: &str = "CREDIT_LEDGER_DEFAULT_BALANCE";
pub const ENV_MAX_QUERY_LIMIT: &str = "CREDIT_LEDGER_MAX_QUERY_LIMIT";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: {value:?}")]
    Unparsable {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub redis_url: String,
    /// Balance granted by `initialize` when the caller gives none.
    pub default_starting_balance: i64,
    pub max_query_limit: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            default_starting_balance: 0,
            max_query_limit: DEFAULT_MAX_QUERY_LIMIT,
        }
    }
}

impl LedgerConfig {
    /// Load from `CREDIT_LEDGER_*` variables (`REDIS_URL` is honoured as a
    /// fallback for the connection string).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let redis_url = lookup(ENV_REDIS_URL)
            .or_else(|| lookup("REDIS_URL"))
            .unwrap_or_else(|| {
                warn!("{ENV_REDIS_URL} not set; using {DEFAULT_REDIS_URL}");
                defaults.redis_url.clone()
            });

        let default_starting_balance = match lookup(ENV_DEFAULT_BALANCE) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Unparsable {
                var: ENV_DEFAULT_BALANCE,
                expected: "integer",
                value: raw,
            })?,
            None => defaults.default_starting_balance,
        };

        let max_query_limit = match lookup(ENV_MAX_QUERY_LIMIT) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Unparsable {
                var: ENV_MAX_QUERY_LIMIT,
                expected: "positive integer",
                value: raw,
            })?,
            None => defaults.max_query_limit,
        };

        let config = Self {
            redis_url,
            default_starting_balance,
            max_query_limit,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_starting_balance < 0 {
            return Err(ConfigError::Invalid(format!(
                "default_starting_balance must not be negative, got {}",
                self.default_starting_balance
            )));
        }
        if self.max_query_limit == 0 {
            return Err(ConfigError::Invalid(
                "max_query_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_default_starting_balance(mut self, balance: i64) -> Self {
        self.default_starting_balance = balance;
        self
    }
}
