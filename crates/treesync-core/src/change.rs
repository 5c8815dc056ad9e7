//! Stamped change records exchanged between replicas.

use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use uuid::Uuid;

/// An edit script stamped with its origin and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// The edit script
    pub diff: Vec<Operation>,
    /// Id of the producing document instance
    pub cid: String,
    /// Wall-clock milliseconds on the producing replica
    pub ts: i64,
    /// Process-wide sequence number, tie-break only
    pub seq: u64,
    /// Globally unique id used for deduplication
    pub gid: String,
}

impl ChangeSet {
    /// Create a change with a fresh `gid`.
    #[must_use]
    pub fn new(diff: Vec<Operation>, cid: impl Into<String>, ts: i64, seq: u64) -> Self {
        Self {
            diff,
            cid: cid.into(),
            ts,
            seq,
            gid: new_gid(),
        }
    }

    /// Whether this change must be rewound before a change stamped
    /// `(ts, cid)` is applied.
    ///
    /// Later timestamps sort after; equal timestamps are ordered by `cid`.
    #[must_use]
    pub fn sorts_after(&self, ts: i64, cid: &str) -> bool {
        self.ts > ts || (self.ts == ts && self.cid.as_str() > cid)
    }

    /// Total order used to interleave two histories.
    #[must_use]
    pub fn merge_order(&self, other: &ChangeSet) -> Ordering {
        (self.ts, self.seq, &self.cid, &self.gid).cmp(&(other.ts, other.seq, &other.cid, &other.gid))
    }

    /// Whether the script is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diff.is_empty()
    }
}

/// Random change id in the compact uuid form.
#[must_use]
pub fn new_gid() -> String {
    Uuid::new_v4().simple().to_string()
}
