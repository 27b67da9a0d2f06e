//! Reconciliation: recompute balances from the log and repair the cache.
//!
//! These are maintenance operations. The full-log scan scales with history
//! size, so they belong in out-of-band jobs, never on the request path.

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use tracing::{error, info, instrument, warn};

use creditledger_core::{LedgerError, LedgerResult, Transaction, UserId};

use super::client::{with_user, LedgerClient};
use crate::store::AtomicStore;

/// Log entries fetched per round trip during a full scan.
const PAGE_SIZE: isize = 1000;

/// Outcome of comparing the cached balance with the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceVerification {
    pub valid: bool,
    pub cached: i64,
    pub calculated: i64,
    /// `cached - calculated`.
    pub difference: i64,
}

impl BalanceVerification {
    fn new(cached: i64, calculated: i64) -> Self {
        let difference = cached.saturating_sub(calculated);
        Self {
            valid: cached == calculated,
            cached,
            calculated,
            difference,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Report mismatches only.
    VerifyOnly,
    /// Rebuild every mismatched balance.
    Repair,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceMismatch {
    pub user_id: UserId,
    pub cached: i64,
    pub calculated: i64,
}

/// Summary of a reconciliation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub checked: usize,
    pub mismatched: Vec<BalanceMismatch>,
    pub repaired: Vec<UserId>,
    /// Serialized as `{ "user_id", "error" }` objects.
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<(UserId, LedgerError)>,
}

#[derive(Serialize)]
struct FailureEntry<'a> {
    user_id: &'a UserId,
    error: String,
}

fn serialize_failures<S>(failures: &[(UserId, LedgerError)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(failures.len()))?;
    for (user_id, error) in failures {
        seq.serialize_element(&FailureEntry {
            user_id,
            error: error.to_string(),
        })?;
    }
    seq.end()
}

impl ReconciliationReport {
    /// True when every user verified (or was repaired) without error.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.mismatched.len() == self.repaired.len()
    }
}

impl<S> LedgerClient<S>
where
    S: AtomicStore,
{
    /// Sum of every amount in the user's log.
    ///
    /// Pages through the log by rank and accumulates in `i128`, so only the
    /// final total needs to fit a balance.
    pub async fn calculate_balance(&self, user_id: &UserId) -> LedgerResult<i64> {
        let key = user_id.log_key();
        let mut total: i128 = 0;
        let mut start: isize = 0;

        loop {
            let page = self
                .store()
                .range_by_rank(&key, start, start + PAGE_SIZE - 1, false)
                .await
                .map_err(|e| Self::store_failure(e, user_id, None))?;

            for member in &page {
                let tx = Transaction::decode(member).map_err(|e| with_user(e, user_id))?;
                total += i128::from(tx.amount);
            }

            if (page.len() as isize) < PAGE_SIZE {
                break;
            }
            start += PAGE_SIZE;
        }

        i64::try_from(total).map_err(|_| {
            LedgerError::transaction_failure(
                format!("log total {total} does not fit in a balance"),
                Some(user_id.clone()),
                None,
            )
        })
    }

    /// Compare the cached balance against the log, exactly.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn verify_balance(&self, user_id: &UserId) -> LedgerResult<BalanceVerification> {
        let cached = self.get_balance(user_id).await?;
        let calculated = self.calculate_balance(user_id).await?;
        let verification = BalanceVerification::new(cached, calculated);

        if !verification.valid {
            warn!(
                cached,
                calculated,
                difference = verification.difference,
                "cached balance diverges from log"
            );
        }
        Ok(verification)
    }

    /// Overwrite the cached balance with the log total, then re-verify.
    ///
    /// A write landing between the overwrite and the re-check makes this
    /// fail with `ReconciliationFailure`; that is reported, not retried.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn rebuild_balance(&self, user_id: &UserId) -> LedgerResult<i64> {
        let calculated = self.calculate_balance(user_id).await?;

        self.store()
            .set(&user_id.balance_key(), &calculated.to_string())
            .await
            .map_err(|e| Self::store_failure(e, user_id, None))?;

        let check = self.verify_balance(user_id).await?;
        if !check.valid {
            error!(
                cached = check.cached,
                calculated = check.calculated,
                "balance rebuild did not converge"
            );
            return Err(LedgerError::ReconciliationFailure {
                user_id: user_id.clone(),
                cached: check.cached,
                calculated: check.calculated,
            });
        }

        info!(balance = calculated, "balance rebuilt from log");
        Ok(calculated)
    }

    /// Verify (and optionally repair) a batch of users, one at a time.
    ///
    /// Per-user failures are collected in the report rather than aborting
    /// the sweep.
    pub async fn reconcile_users(
        &self,
        users: &[UserId],
        mode: ReconcileMode,
    ) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        for user_id in users {
            report.checked += 1;

            let verification = match self.verify_balance(user_id).await {
                Ok(v) => v,
                Err(e) => {
                    report.failures.push((user_id.clone(), e));
                    continue;
                }
            };
            if verification.valid {
                continue;
            }

            report.mismatched.push(BalanceMismatch {
                user_id: user_id.clone(),
                cached: verification.cached,
                calculated: verification.calculated,
            });

            if mode == ReconcileMode::Repair {
                match self.rebuild_balance(user_id).await {
                    Ok(_) => report.repaired.push(user_id.clone()),
                    Err(e) => report.failures.push((user_id.clone(), e)),
                }
            }
        }

        info!(
            checked = report.checked,
            mismatched = report.mismatched.len(),
            repaired = report.repaired.len(),
            failed = report.failures.len(),
            "reconciliation sweep finished"
        );
        report
    }
}
