use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::r#trait::{AtomicStore, StoreError, StoreResult};
use super::script::LedgerScript;

#[derive(Debug, Default)]
struct State {
    scalars: HashMap<String, String>,
    /// `(score, member)` pairs; tuple order gives sorted-set ordering.
    ordered: HashMap<String, BTreeSet<(i64, String)>>,
}

/// In-memory atomic store.
///
/// Intended for tests/dev. Scripts are executed natively with the same
/// semantics as their Lua sources, under a single write lock, so concurrent
/// mutations serialize exactly as they would on the remote store.
#[derive(Debug, Default)]
pub struct InMemoryAtomicStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl InMemoryAtomicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every subsequent call fail with a connection error (or recover).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of members under an ordered key.
    pub fn ordered_len(&self, key: &str) -> usize {
        self.state
            .read()
            .map(|s| s.ordered.get(key).map_or(0, BTreeSet::len))
            .unwrap_or(0)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("store unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, State>> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|_| StoreError::Command("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| StoreError::Command("lock poisoned".to_string()))
    }
}

/// Resolve inclusive sorted-set ranks against a length.
fn rank_window(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

struct ScriptArgs<'a> {
    balance_key: &'a str,
    log_key: &'a str,
    amount: i64,
    score: i64,
    member: &'a str,
}

impl<'a> ScriptArgs<'a> {
    fn parse(script: &LedgerScript, keys: &'a [String], args: &'a [String]) -> StoreResult<Self> {
        let fail = |message: String| StoreError::Script {
            script: script.name,
            message,
        };
        let [balance_key, log_key] = keys else {
            return Err(fail(format!("expected 2 keys, got {}", keys.len())));
        };
        let [amount, score, member] = args else {
            return Err(fail(format!("expected 3 args, got {}", args.len())));
        };
        Ok(Self {
            balance_key,
            log_key,
            amount: amount
                .parse()
                .map_err(|_| fail(format!("amount is not an integer: {amount:?}")))?,
            score: score
                .parse()
                .map_err(|_| fail(format!("score is not an integer: {score:?}")))?,
            member,
        })
    }
}

impl State {
    fn balance(&self, script: &LedgerScript, key: &str) -> StoreResult<Option<i64>> {
        match self.scalars.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| StoreError::Script {
                script: script.name,
                message: format!("malformed balance: {raw}"),
            }),
        }
    }

    fn append(&mut self, key: &str, score: i64, member: &str) {
        self.ordered
            .entry(key.to_string())
            .or_default()
            .insert((score, member.to_string()));
    }

    fn initialize(&mut self, a: &ScriptArgs<'_>) -> StoreResult<Vec<String>> {
        if let Some(existing) = self.scalars.get(a.balance_key) {
            return Ok(vec!["0".to_string(), existing.clone()]);
        }
        self.scalars
            .insert(a.balance_key.to_string(), a.amount.to_string());
        self.append(a.log_key, a.score, a.member);
        Ok(vec!["1".to_string(), a.amount.to_string()])
    }

    fn deduct(&mut self, script: &LedgerScript, a: &ScriptArgs<'_>) -> StoreResult<Vec<String>> {
        let current = self.balance(script, a.balance_key)?.unwrap_or(0);
        if current < a.amount {
            return Ok(vec!["0".to_string(), current.to_string()]);
        }
        let balance = current - a.amount;
        self.scalars
            .insert(a.balance_key.to_string(), balance.to_string());
        self.append(a.log_key, a.score, a.member);
        Ok(vec!["1".to_string(), balance.to_string()])
    }

    fn add(&mut self, script: &LedgerScript, a: &ScriptArgs<'_>) -> StoreResult<Vec<String>> {
        let current = self.balance(script, a.balance_key)?.unwrap_or(0);
        let balance = current.checked_add(a.amount).ok_or_else(|| StoreError::Script {
            script: script.name,
            message: "increment or decrement would overflow".to_string(),
        })?;
        self.scalars
            .insert(a.balance_key.to_string(), balance.to_string());
        self.append(a.log_key, a.score, a.member);
        Ok(vec!["1".to_string(), balance.to_string()])
    }
}

#[async_trait]
impl AtomicStore for InMemoryAtomicStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.read()?.scalars.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.write()?
            .scalars
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn ordered_append(&self, key: &str, score: i64, member: &str) -> StoreResult<()> {
        self.write()?.append(key, score, member);
        Ok(())
    }

    async fn range_by_rank(
        &self,
        key: &str,
        start: isize,
        stop: isize,
        reverse: bool,
    ) -> StoreResult<Vec<String>> {
        let state = self.read()?;
        let Some(set) = state.ordered.get(key) else {
            return Ok(vec![]);
        };
        let Some((start, stop)) = rank_window(set.len(), start, stop) else {
            return Ok(vec![]);
        };
        let take = stop - start + 1;
        let members: Vec<String> = if reverse {
            set.iter().rev().skip(start).take(take).map(|(_, m)| m.clone()).collect()
        } else {
            set.iter().skip(start).take(take).map(|(_, m)| m.clone()).collect()
        };
        Ok(members)
    }

    async fn range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        reverse: bool,
        limit: Option<usize>,
    ) -> StoreResult<Vec<String>> {
        let state = self.read()?;
        let Some(set) = state.ordered.get(key) else {
            return Ok(vec![]);
        };
        let limit = limit.unwrap_or(usize::MAX);
        let in_range = |(score, _): &&(i64, String)| *score >= min && *score <= max;
        let members: Vec<String> = if reverse {
            set.iter().rev().filter(in_range).take(limit).map(|(_, m)| m.clone()).collect()
        } else {
            set.iter().filter(in_range).take(limit).map(|(_, m)| m.clone()).collect()
        };
        Ok(members)
    }

    async fn execute_atomic(
        &self,
        script: &LedgerScript,
        keys: &[String],
        args: &[String],
    ) -> StoreResult<Vec<String>> {
        let parsed = ScriptArgs::parse(script, keys, args)?;
        let mut state = self.write()?;
        match script.name {
            "initialize" => state.initialize(&parsed),
            "deduct" => state.deduct(script, &parsed),
            "add" => state.add(script, &parsed),
            other => Err(StoreError::Script {
                script: script.name,
                message: format!("unknown script {other}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::script::{ADD, DEDUCT, INITIALIZE};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn rank_window_follows_sorted_set_rules() {
        assert_eq!(rank_window(5, 0, -1), Some((0, 4)));
        assert_eq!(rank_window(5, 0, 2), Some((0, 2)));
        assert_eq!(rank_window(5, -2, -1), Some((3, 4)));
        assert_eq!(rank_window(5, 3, 100), Some((3, 4)));
        assert_eq!(rank_window(5, 5, 10), None);
        assert_eq!(rank_window(5, 3, 1), None);
        assert_eq!(rank_window(0, 0, -1), None);
    }

    #[tokio::test]
    async fn rank_ranges_respect_direction() {
        let store = InMemoryAtomicStore::new();
        for (score, member) in [(3, "c"), (1, "a"), (2, "b")] {
            store.ordered_append("k", score, member).await.unwrap();
        }
        assert_eq!(store.range_by_rank("k", 0, -1, false).await.unwrap(), strings(&["a", "b", "c"]));
        assert_eq!(store.range_by_rank("k", 0, 1, true).await.unwrap(), strings(&["c", "b"]));
        assert!(store.range_by_rank("missing", 0, -1, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn score_ranges_are_inclusive_and_limited_from_the_requested_end() {
        let store = InMemoryAtomicStore::new();
        for score in 1..=10 {
            store.ordered_append("k", score, &format!("m{score:02}")).await.unwrap();
        }
        assert_eq!(
            store.range_by_score("k", 3, 5, false, None).await.unwrap(),
            strings(&["m03", "m04", "m05"])
        );
        assert_eq!(
            store.range_by_score("k", 3, 8, true, Some(2)).await.unwrap(),
            strings(&["m08", "m07"])
        );
    }

    #[tokio::test]
    async fn scripts_follow_their_lua_contracts() {
        let store = InMemoryAtomicStore::new();
        let keys = strings(&["balance:u", "txs:u"]);

        let created = store
            .execute_atomic(&INITIALIZE, &keys, &strings(&["100", "1", "genesis"]))
            .await
            .unwrap();
        assert_eq!(created, strings(&["1", "100"]));

        let again = store
            .execute_atomic(&INITIALIZE, &keys, &strings(&["500", "2", "genesis-2"]))
            .await
            .unwrap();
        assert_eq!(again, strings(&["0", "100"]));

        let rejected = store
            .execute_atomic(&DEDUCT, &keys, &strings(&["101", "3", "d1"]))
            .await
            .unwrap();
        assert_eq!(rejected, strings(&["0", "100"]));

        let deducted = store
            .execute_atomic(&DEDUCT, &keys, &strings(&["40", "4", "d2"]))
            .await
            .unwrap();
        assert_eq!(deducted, strings(&["1", "60"]));

        let added = store
            .execute_atomic(&ADD, &keys, &strings(&["5", "5", "a1"]))
            .await
            .unwrap();
        assert_eq!(added, strings(&["1", "65"]));

        assert_eq!(store.ordered_len("txs:u"), 3);
    }

    #[tokio::test]
    async fn add_overflow_aborts_without_appending() {
        let store = InMemoryAtomicStore::new();
        store.set("balance:u", &i64::MAX.to_string()).await.unwrap();
        let err = store
            .execute_atomic(&ADD, &strings(&["balance:u", "txs:u"]), &strings(&["1", "1", "a"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Script { script: "add", .. }));
        assert_eq!(store.ordered_len("txs:u"), 0);
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = InMemoryAtomicStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.get("k").await, Err(StoreError::Connection(_))));
        store.set_unavailable(false);
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
