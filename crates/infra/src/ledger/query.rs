use serde::{Deserialize, Serialize};

/// Transaction history query.
///
/// Without time bounds the newest `limit` entries are returned by rank.
/// With either bound the window `[start_time, end_time]` (milliseconds,
/// inclusive) is searched by score; a missing `start_time` means the epoch
/// and a missing `end_time` means now. Results are newest first either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub limit: usize,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            start_time: None,
            end_time: None,
        }
    }
}

impl TransactionQuery {
    /// Newest `limit` transactions.
    pub fn latest(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Transactions stamped within `[start, end]`.
    pub fn between(start: i64, end: i64) -> Self {
        Self {
            start_time: Some(start),
            end_time: Some(end),
            ..Default::default()
        }
    }

    pub fn since(start: i64) -> Self {
        Self {
            start_time: Some(start),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn is_time_bounded(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}
