use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::script::LedgerScript;

/// Result type of store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Remote store operation error.
///
/// These are **infrastructure errors** (transport, command, script) as opposed
/// to ledger errors (validation, insufficiency). The ledger client wraps them
/// into `LedgerError::TransactionFailure` with user and transaction context.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store command error: {0}")]
    Command(String),

    #[error("script {script} failed: {message}")]
    Script {
        script: &'static str,
        message: String,
    },

    #[error("malformed store reply: {0}")]
    Malformed(String),
}

/// Remote key-value store with atomic script execution.
///
/// The capability surface the ledger needs, independent of any transport:
///
/// - scalar `get`/`set`
/// - a score-ordered multimap per key (`ordered_append`, `range_by_rank`,
///   `range_by_score`); members with equal scores order by member bytes
/// - `execute_atomic`: run a named script against exactly the listed keys,
///   with all of its reads and writes indivisible relative to any other
///   script touching those keys
///
/// Ranks follow sorted-set conventions: `0` is the first element, negative
/// ranks count from the end (`-1` is the last), and both ends are inclusive.
#[async_trait]
pub trait AtomicStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    async fn ordered_append(&self, key: &str, score: i64, member: &str) -> StoreResult<()>;

    /// Members between two ranks. With `reverse`, rank 0 is the highest score.
    async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        reverse: bool,
    ) -> StoreResult<Vec<String>>;

    /// Members with `min <= score <= max`, at most `limit` of them when given.
    /// With `reverse`, highest scores come first (and the limit keeps those).
    async fn range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        reverse: bool,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>>;

    /// Execute a ledger script. The reply is flattened to strings.
    async fn execute_atomic(
        &self,
        script: &LedgerScript,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<Vec<String>>;
}

#[async_trait]
impl<S> AtomicStore for Arc<S>
where
    S: AtomicStore + ?Sized,
{
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        (**self).set(key, value).await
    }

    async fn ordered_append(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        (**self).ordered_append(key, score, member).await
    }

    async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        reverse: bool,
    ) -> StoreResult<Vec<String>> {
        (**self).range_by_rank(key, start, stop, reverse).await
    }

    async fn range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        reverse: bool,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>> {
        (**self).range_by_score(key, min, max, reverse, limit).await
    }

    async fn execute_atomic(
        &self,
        script: &LedgerScript,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<Vec<String>> {
        (**self).execute_atomic(script, keys, args).await
    }
}
