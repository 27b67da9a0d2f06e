use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use creditledger_core::validation;
use creditledger_core::{
    LedgerError, LedgerResult, Metadata, Transaction, TransactionId, UserId, USER_INITIALIZED,
};

use super::query::TransactionQuery;
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::store::script::{self, LedgerScript, ScriptReply};
use crate::store::{AtomicStore, StoreError};

/// Result of [`LedgerClient::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    /// Genesis transaction id, or [`TransactionId::noop`] if the ledger existed.
    pub transaction_id: TransactionId,
    pub balance: i64,
    pub already_existed: bool,
}

/// Result of a committed `deduct` or `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    pub transaction_id: TransactionId,
    pub balance: i64,
}

/// Per-user credit ledger over a remote atomic store.
///
/// Every mutation is exactly one round trip running one atomic script, so
/// cross-process serialization (no overdraft, single genesis) is delegated to
/// the store. Reads are single round trips with no atomicity against
/// concurrent writers. Nothing is retried here.
///
/// Construct once and share by reference (or `Arc`); there is no global
/// instance.
pub struct LedgerClient<S> {
    store: S,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
}

impl<S> std::fmt::Debug for LedgerClient<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> LedgerClient<S>
where
    S: AtomicStore,
{
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the ledger with its genesis entry, or report the existing one.
    ///
    /// Concurrent calls for the same user produce exactly one genesis entry;
    /// every other caller sees `already_existed` and the current balance.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn initialize(
        &self,
        user_id: &UserId,
        starting_balance: Option<i64>,
    ) -> LedgerResult<InitOutcome> {
        let balance = starting_balance.unwrap_or(self.config.default_starting_balance);
        validation::ensure_starting_balance(balance)?;

        let genesis = self.entry(balance, USER_INITIALIZED, None);
        let reply = self.run(&script::INITIALIZE, user_id, &genesis).await?;

        if reply.applied {
            info!(transaction_id = %genesis.id, balance = reply.balance, "ledger initialized");
            Ok(InitOutcome {
                transaction_id: genesis.id,
                balance: reply.balance,
                already_existed: false,
            })
        } else {
            debug!(balance = reply.balance, "ledger already initialized");
            Ok(InitOutcome {
                transaction_id: TransactionId::noop(),
                balance: reply.balance,
                already_existed: true,
            })
        }
    }

    /// Remove `amount` credits, failing without any change if the balance
    /// (absent counts as zero) cannot cover it.
    #[instrument(skip(self, metadata), fields(user_id = %user_id), err)]
    pub async fn deduct(
        &self,
        user_id: &UserId,
        amount: i64,
        action: &str,
        metadata: Option<Metadata>,
    ) -> LedgerResult<MutationOutcome> {
        Self::check_mutation(amount, action, metadata.as_ref())?;

        let entry = self.entry(-amount, action, metadata);
        let reply = self.run(&script::DEDUCT, user_id, &entry).await?;

        if !reply.applied {
            return Err(LedgerError::insufficient_funds(amount, reply.balance));
        }
        debug!(transaction_id = %entry.id, balance = reply.balance, "credits deducted");
        Ok(MutationOutcome {
            transaction_id: entry.id,
            balance: reply.balance,
        })
    }

    /// Grant `amount` credits unconditionally.
    #[instrument(skip(self, metadata), fields(user_id = %user_id), err)]
    pub async fn add(
        &self,
        user_id: &UserId,
        amount: i64,
        action: &str,
        metadata: Option<Metadata>,
    ) -> LedgerResult<MutationOutcome> {
        Self::check_mutation(amount, action, metadata.as_ref())?;

        let entry = self.entry(amount, action, metadata);
        let reply = self.run(&script::ADD, user_id, &entry).await?;

        if !reply.applied {
            return Err(LedgerError::transaction_failure(
                format!("{} reported no change", script::ADD.qualified_name()),
                Some(user_id.clone()),
                Some(entry.id),
            ));
        }
        debug!(transaction_id = %entry.id, balance = reply.balance, "credits added");
        Ok(MutationOutcome {
            transaction_id: entry.id,
            balance: reply.balance,
        })
    }

    /// Cached balance. A ledger that was never initialized reads as zero.
    pub async fn get_balance(&self, user_id: &UserId) -> LedgerResult<i64> {
        let raw = self
            .store
            .get(&user_id.balance_key())
            .await
            .map_err(|e| Self::store_failure(e, user_id, None))?;

        match raw {
            None => Ok(0),
            Some(raw) => raw.parse().map_err(|_| {
                LedgerError::transaction_failure(
                    format!("cached balance is not an integer: {raw:?}"),
                    Some(user_id.clone()),
                    None,
                )
            }),
        }
    }

    /// Transaction history, newest first.
    ///
    /// `limit` must be positive and is clamped to the configured cap. The
    /// time-bounded path asks the store for at most `limit` entries, so a
    /// wide window costs no more than a narrow one.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn get_transactions(
        &self,
        user_id: &UserId,
        query: TransactionQuery,
    ) -> LedgerResult<Vec<Transaction>> {
        validation::ensure_limit(query.limit)?;
        // A zero cap (possible via a hand-built or deserialized config) still returns one entry.
        let limit = query.limit.min(self.config.max_query_limit.max(1));
        let key = user_id.log_key();

        let fetched = if query.is_time_bounded() {
            let start = query.start_time.unwrap_or(0);
            let end = query.end_time.unwrap_or_else(|| self.clock.now_millis());
            if start > end {
                return Err(LedgerError::validation(format!(
                    "start_time {start} is after end_time {end}"
                )));
            }
            self.store
                .range_by_score(&key, start, end, true, Some(limit))
                .await
        } else {
            let stop = isize::try_from(limit.saturating_sub(1)).unwrap_or(isize::MAX);
            self.store.range_by_rank(&key, 0, stop, true).await
        };
        let members = fetched.map_err(|e| Self::store_failure(e, user_id, None))?;

        members
            .iter()
            .map(|m| Transaction::decode(m).map_err(|e| with_user(e, user_id)))
            .collect()
    }

    fn check_mutation(amount: i64, action: &str, metadata: Option<&Metadata>) -> LedgerResult<()> {
        validation::ensure_positive_amount(amount)?;
        validation::ensure_action(action)?;
        validation::ensure_metadata(metadata)
    }

    fn entry(&self, amount: i64, action: &str, metadata: Option<Metadata>) -> Transaction {
        Transaction::new(
            TransactionId::new(),
            amount,
            action,
            metadata,
            self.clock.now_millis(),
        )
    }

    /// One round trip: run `script` for `entry` against the user's keys.
    async fn run(
        &self,
        script: &LedgerScript,
        user_id: &UserId,
        entry: &Transaction,
    ) -> LedgerResult<ScriptReply> {
        let member = entry.encode().map_err(|e| with_user(e, user_id))?;
        let keys = [user_id.balance_key(), user_id.log_key()];
        let args = [
            entry.amount.unsigned_abs().to_string(),
            entry.timestamp.to_string(),
            member,
        ];

        let reply = self
            .store
            .execute_atomic(script, &keys, &args)
            .await
            .map_err(|e| Self::store_failure(e, user_id, Some(entry.id)))?;

        ScriptReply::parse(script, &reply)
            .map_err(|e| Self::store_failure(e, user_id, Some(entry.id)))
    }

    pub(crate) fn store_failure(
        error: StoreError,
        user_id: &UserId,
        transaction_id: Option<TransactionId>,
    ) -> LedgerError {
        LedgerError::transaction_failure(error.to_string(), Some(user_id.clone()), transaction_id)
    }
}

/// Attach the user to a failure raised below the client.
pub(crate) fn with_user(error: LedgerError, user_id: &UserId) -> LedgerError {
    match error {
        LedgerError::TransactionFailure {
            message,
            user_id: None,
            transaction_id,
        } => LedgerError::TransactionFailure {
            message,
            user_id: Some(user_id.clone()),
            transaction_id,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppingClock;
    use crate::store::InMemoryAtomicStore;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn client() -> LedgerClient<Arc<InMemoryAtomicStore>> {
        LedgerClient::new(InMemoryAtomicStore::arc(), LedgerConfig::default())
            .with_clock(SteppingClock::new(1_700_000_000_000, 1))
    }

    #[tokio::test]
    async fn initialize_writes_genesis_once() {
        let client = client();
        let u = user("alice");

        let first = client.initialize(&u, Some(100)).await.unwrap();
        assert!(!first.already_existed);
        assert!(!first.transaction_id.is_noop());
        assert_eq!(first.balance, 100);

        let second = client.initialize(&u, Some(999)).await.unwrap();
        assert!(second.already_existed);
        assert!(second.transaction_id.is_noop());
        assert_eq!(second.balance, 100);

        let log = client.get_transactions(&u, TransactionQuery::latest(10)).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].is_genesis());
        assert_eq!(log[0].id, first.transaction_id);
        assert_eq!(log[0].amount, 100);
    }

    #[tokio::test]
    async fn initialize_uses_configured_default() {
        let client = LedgerClient::new(
            InMemoryAtomicStore::arc(),
            LedgerConfig::default().with_default_starting_balance(25),
        );
        let outcome = client.initialize(&user("bob"), None).await.unwrap();
        assert_eq!(outcome.balance, 25);
    }

    #[tokio::test]
    async fn deduct_then_add_updates_balance() {
        let client = client();
        let u = user("carol");
        client.initialize(&u, Some(100)).await.unwrap();

        let deducted = client.deduct(&u, 10, "x", None).await.unwrap();
        assert_eq!(deducted.balance, 90);
        let added = client.add(&u, 50, "y", None).await.unwrap();
        assert_eq!(added.balance, 140);
        assert_eq!(client.get_balance(&u).await.unwrap(), 140);

        let log = client.get_transactions(&u, TransactionQuery::latest(10)).await.unwrap();
        let amounts: Vec<i64> = log.iter().map(|t| t.amount).collect();
        assert_eq!(amounts, vec![50, -10, 100]);
        assert_eq!(log[1].id, deducted.transaction_id);
    }

    #[tokio::test]
    async fn overdraft_is_rejected_without_change() {
        let client = client();
        let u = user("dave");
        client.initialize(&u, Some(100)).await.unwrap();

        let err = client.deduct(&u, 200, "x", None).await.unwrap_err();
        assert_eq!(err, LedgerError::insufficient_funds(200, 100));
        assert_eq!(client.get_balance(&u).await.unwrap(), 100);
        assert_eq!(client.store().ordered_len(&u.log_key()), 1);
    }

    #[tokio::test]
    async fn deduct_from_missing_ledger_sees_zero() {
        let client = client();
        let err = client.deduct(&user("ghost"), 1, "x", None).await.unwrap_err();
        assert_eq!(err, LedgerError::insufficient_funds(1, 0));
        assert_eq!(client.get_balance(&user("ghost")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_store() {
        let client = client();
        let u = user("erin");
        client.store().set_unavailable(true);

        for err in [
            client.deduct(&u, 0, "x", None).await.unwrap_err(),
            client.deduct(&u, -4, "x", None).await.unwrap_err(),
            client.add(&u, 5, "", None).await.unwrap_err(),
            client.add(&u, 5, USER_INITIALIZED, None).await.unwrap_err(),
            client.initialize(&u, Some(-1)).await.unwrap_err(),
            client
                .get_transactions(&u, TransactionQuery::latest(0))
                .await
                .unwrap_err(),
        ] {
            assert!(err.is_validation(), "{err:?}");
        }
    }

    #[tokio::test]
    async fn store_faults_carry_attempted_transaction_id() {
        let client = client();
        let u = user("frank");
        client.store().set_unavailable(true);

        let err = client.add(&u, 5, "grant", None).await.unwrap_err();
        match err {
            LedgerError::TransactionFailure {
                user_id,
                transaction_id,
                ..
            } => {
                assert_eq!(user_id, Some(u.clone()));
                assert!(transaction_id.is_some());
            }
            other => panic!("expected TransactionFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tampered_balance_is_flagged_not_zeroed() {
        let client = client();
        let u = user("grace");
        client.initialize(&u, Some(10)).await.unwrap();
        client.store().set(&u.balance_key(), "ten").await.unwrap();

        assert!(matches!(
            client.get_balance(&u).await,
            Err(LedgerError::TransactionFailure { .. })
        ));
        assert!(matches!(
            client.deduct(&u, 1, "x", None).await,
            Err(LedgerError::TransactionFailure { .. })
        ));
    }

    #[tokio::test]
    async fn add_overflow_is_a_transaction_failure() {
        let client = client();
        let u = user("heidi");
        client.initialize(&u, Some(i64::MAX - 1)).await.unwrap();

        let err = client.add(&u, 2, "grant", None).await.unwrap_err();
        assert!(matches!(err, LedgerError::TransactionFailure { .. }));
        assert_eq!(client.get_balance(&u).await.unwrap(), i64::MAX - 1);
    }
}
