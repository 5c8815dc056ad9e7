//! Documents and the change pipeline.
//!
//! A [`Document`] owns a value together with a bounded history of the
//! changes that built it. An incoming change is applied by rewinding the
//! newer local changes, applying it, then replaying what was rewound. Two
//! replicas that receive the same set of changes therefore end with the same
//! value whatever the arrival order, as long as their history windows still
//! overlap.
//!
//! Failures while handling an incoming change never abort the call: the
//! phase that failed is recorded in [`Document::warning`] and the document
//! stays in its last consistent state.

use crate::change::ChangeSet;
use crate::context::SyncContext;
use crate::diff::diff;
use crate::error::{Result, SyncError};
use crate::identity::validate_unique_identities;
use crate::operation::Operation;
use crate::patch::{apply_rebased, patched};
use crate::path::Path;
use crate::reverse::reverse;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// A value plus the causal history needed to reconcile it with replicas.
#[derive(Debug, Clone)]
pub struct Document {
    ctx: Arc<SyncContext>,
    cid: String,
    value: Value,
    history: Vec<ChangeSet>,
    stash: Vec<ChangeSet>,
    warning: Option<String>,
    gids: HashSet<String>,
}

/// Persisted form: `{meta: {history, stash, warning, gids}, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDocument {
    /// Pipeline state
    pub meta: PersistedMeta,
    /// The document value
    pub data: Value,
}

/// Pipeline state of a persisted document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedMeta {
    /// Retained change sets, oldest first
    #[serde(default)]
    pub history: Vec<ChangeSet>,
    /// Rewound change sets awaiting replay
    #[serde(default)]
    pub stash: Vec<ChangeSet>,
    /// Last pipeline warning
    #[serde(default)]
    pub warning: Option<String>,
    /// Applied gids, stored as `{gid: 1}`
    #[serde(default)]
    pub gids: BTreeMap<String, u8>,
}

impl Document {
    /// Empty map document with an empty initial change.
    ///
    /// The initial change is stamped at time zero so that every later change
    /// sorts after it.
    #[must_use]
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        let cid = ctx.replica_id().to_string();
        let initial = ChangeSet::new(vec![], cid.clone(), 0, ctx.next_seq());
        Self::with_initial(ctx, cid, Value::Object(Map::new()), initial)
    }

    /// Document built from `value`, using the context's replica id as `cid`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DuplicateIdentity`] if two maps in one array share
    /// an identity.
    pub fn from_value(ctx: Arc<SyncContext>, value: Value) -> Result<Self> {
        let cid = ctx.replica_id().to_string();
        Self::from_value_with_cid(ctx, cid, value)
    }

    /// Document built from `value` with an explicit `cid`.
    ///
    /// # Errors
    ///
    /// Same as [`Document::from_value`].
    pub fn from_value_with_cid(
        ctx: Arc<SyncContext>,
        cid: impl Into<String>,
        value: Value,
    ) -> Result<Self> {
        let cid = cid.into();
        validate_unique_identities(ctx.config(), &value)?;
        let script = initial_diff(&ctx, &value)?;
        let initial = ChangeSet::new(script, cid.clone(), 0, ctx.next_seq());
        Ok(Self::with_initial(ctx, cid, value, initial))
    }

    fn with_initial(ctx: Arc<SyncContext>, cid: String, value: Value, initial: ChangeSet) -> Self {
        let gids = HashSet::from([initial.gid.clone()]);
        Self {
            ctx,
            cid,
            value,
            history: vec![initial],
            stash: vec![],
            warning: None,
            gids,
        }
    }

    /// Replace the document instance id.
    #[must_use]
    pub fn with_cid(mut self, cid: impl Into<String>) -> Self {
        self.cid = cid.into();
        self
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Consume the document, keeping only its value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Id stamped on changes produced here.
    #[must_use]
    pub fn cid(&self) -> &str {
        &self.cid
    }

    /// Retained change sets in application order.
    #[must_use]
    pub fn history(&self) -> &[ChangeSet] {
        &self.history
    }

    /// Change sets rewound and not yet replayed.
    #[must_use]
    pub fn stash(&self) -> &[ChangeSet] {
        &self.stash
    }

    /// Warning left by the last [`Document::apply_change_in_place`] call.
    #[must_use]
    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    /// Gids of the retained history.
    #[must_use]
    pub fn gids(&self) -> &HashSet<String> {
        &self.gids
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    /// Stamp the edit script from the current value to `mutated`.
    ///
    /// The document itself is not modified. The stamp is the clock reading,
    /// raised past the newest history entry when the clock lags behind it, so
    /// a produced change never needs to rewind local history.
    ///
    /// # Errors
    ///
    /// Propagates diff errors, and [`SyncError::DuplicateIdentity`] if
    /// `mutated` repeats an identity within one array.
    pub fn produce(&self, mutated: &Value) -> Result<ChangeSet> {
        let config = self.ctx.config();
        let script = diff(config, &self.value, mutated)?;
        validate_unique_identities(config, mutated)?;
        let change = ChangeSet::new(script, self.cid.clone(), self.next_ts(), self.ctx.next_seq());
        tracing::debug!(
            cid = %change.cid,
            gid = %change.gid,
            ts = change.ts,
            ops = change.diff.len(),
            "Produced change"
        );
        Ok(change)
    }

    /// Mutate a copy of the value, then produce and commit the change.
    ///
    /// The change sorts after the whole history, so it is applied directly
    /// without rewinding.
    ///
    /// # Errors
    ///
    /// Same as [`Document::produce`], plus patch errors. On error the
    /// document is unchanged.
    pub fn change<F>(&mut self, mutate: F) -> Result<ChangeSet>
    where
        F: FnOnce(&mut Value),
    {
        let mut draft = self.value.clone();
        mutate(&mut draft);
        let change = self.produce(&draft)?;
        let (value, applied) = self.rebased(&change)?;
        self.value = value;
        self.warning = None;
        self.gids.insert(applied.gid.clone());
        self.reinsert(applied);
        tracing::debug!(
            gid = %change.gid,
            ts = change.ts,
            history_len = self.history.len(),
            "Committed local change"
        );
        Ok(change)
    }

    fn next_ts(&self) -> i64 {
        let now = self.ctx.now_ms();
        match self.history.last() {
            Some(tail) if tail.sorts_after(now, &self.cid) => tail.ts.saturating_add(1),
            _ => now,
        }
    }

    /// Apply `change` to a fork of this document.
    #[must_use]
    pub fn apply_change(&self, change: &ChangeSet) -> Document {
        let mut target = self.fork();
        target.apply_change_in_place(change);
        target
    }

    /// Apply `change` here: rewind, apply, fast-forward, reinsert.
    ///
    /// A change whose gid was already applied is ignored.
    pub fn apply_change_in_place(&mut self, change: &ChangeSet) {
        self.warning = None;
        if self.gids.contains(&change.gid) {
            tracing::debug!(gid = %change.gid, "Change already applied");
            return;
        }

        if let Err(err) = self.rewind(change.ts, &change.cid) {
            self.record_warning("rewind failed", &err);
        }

        let applied = match self.apply_incoming(change) {
            Ok(applied) => {
                self.gids.insert(applied.gid.clone());
                Some(applied)
            }
            Err(err) => {
                self.record_warning("patch failed", &err);
                None
            }
        };

        while let Err(err) = self.fast_forward() {
            self.record_warning("forward failed", &err);
        }

        if let Some(applied) = applied {
            self.reinsert(applied);
        }
        tracing::debug!(
            cid = %change.cid,
            gid = %change.gid,
            ts = change.ts,
            history_len = self.history.len(),
            "Applied change"
        );
    }

    /// Drop the oldest entries beyond `capacity`, with their gids.
    pub fn prune_history(&mut self, capacity: usize) {
        if self.history.len() <= capacity {
            return;
        }
        let excess = self.history.len() - capacity;
        for entry in self.history.drain(..excess) {
            self.gids.remove(&entry.gid);
        }
        tracing::debug!(evicted = excess, capacity, "Pruned history");
    }

    /// Deep copy pruned to the configured capacity.
    #[must_use]
    pub fn fork(&self) -> Document {
        self.fork_with_capacity(self.ctx.config().history_capacity)
    }

    /// Deep copy pruned to `capacity`.
    ///
    /// The copy takes the context's replica id as its `cid`.
    #[must_use]
    pub fn fork_with_capacity(&self, capacity: usize) -> Document {
        let mut copy = Document {
            cid: self.ctx.replica_id().to_string(),
            ..self.clone()
        };
        copy.prune_history(capacity);
        copy
    }

    /// Fold every entry older than `before_ts` into a single snapshot entry.
    ///
    /// The snapshot rebuilds the value from an empty map and inherits the
    /// stamp of the newest folded entry. The first history entry is always
    /// folded.
    ///
    /// # Errors
    ///
    /// Propagates rewind and replay failures; the document is left untouched.
    pub fn compact_history(&mut self, before_ts: i64) -> Result<()> {
        if self.history.len() <= 1 {
            return Ok(());
        }
        let mut work = self.clone();
        work.stash.clear();
        work.rewind(before_ts, "")?;
        let Some(newest) = work.history.last() else {
            return Ok(());
        };
        let snapshot = ChangeSet {
            diff: initial_diff(&work.ctx, &work.value)?,
            cid: newest.cid.clone(),
            ts: newest.ts,
            seq: newest.seq,
            gid: newest.gid.clone(),
        };
        work.history = vec![snapshot];
        work.fast_forward()?;
        work.gids = work.history.iter().map(|entry| entry.gid.clone()).collect();
        tracing::debug!(
            before_ts,
            from = self.history.len(),
            to = work.history.len(),
            "Compacted history"
        );
        *self = work;
        Ok(())
    }

    /// Merge with another document; see [`crate::merge::merge`].
    #[must_use]
    pub fn merge(&self, other: &Document) -> Document {
        crate::merge::merge(self, other)
    }

    /// Snapshot of the persisted form. The `cid` is not part of it.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedDocument {
        PersistedDocument {
            meta: PersistedMeta {
                history: self.history.clone(),
                stash: self.stash.clone(),
                warning: self.warning.clone(),
                gids: self.gids.iter().map(|gid| (gid.clone(), 1)).collect(),
            },
            data: self.value.clone(),
        }
    }

    /// Serialize the persisted form to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Codec`] if encoding fails.
    pub fn save(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_persisted())?)
    }

    /// Restore a document; it takes the context's replica id and capacity.
    #[must_use]
    pub fn from_persisted(ctx: Arc<SyncContext>, persisted: PersistedDocument) -> Self {
        let capacity = ctx.config().history_capacity;
        let mut doc = Self {
            cid: ctx.replica_id().to_string(),
            ctx,
            value: persisted.data,
            history: persisted.meta.history,
            stash: persisted.meta.stash,
            warning: persisted.meta.warning,
            gids: persisted.meta.gids.into_keys().collect(),
        };
        doc.prune_history(capacity);
        doc
    }

    /// Parse and restore a document saved with [`Document::save`].
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Codec`] for malformed input.
    pub fn load(ctx: Arc<SyncContext>, text: &str) -> Result<Self> {
        let persisted: PersistedDocument = serde_json::from_str(text)?;
        Ok(Self::from_persisted(ctx, persisted))
    }

    /// Undo history entries that sort after `(ts, cid)`, newest first,
    /// keeping at least one entry.
    fn rewind(&mut self, ts: i64, cid: &str) -> Result<()> {
        while self.history.len() > 1 {
            let Some(tail) = self.history.last() else {
                break;
            };
            if !tail.sorts_after(ts, cid) {
                break;
            }
            let undo = reverse(self.ctx.config(), &tail.diff);
            self.value = patched(self.ctx.config(), &self.value, &undo)?;
            if let Some(entry) = self.history.pop() {
                self.gids.remove(&entry.gid);
                tracing::debug!(gid = %entry.gid, ts = entry.ts, "Rewound change");
                self.stash.push(entry);
            }
        }
        Ok(())
    }

    /// Replay stashed entries, last rewound first.
    ///
    /// Stops at the first entry that fails; that entry is dropped.
    fn fast_forward(&mut self) -> Result<()> {
        while let Some(entry) = self.stash.pop() {
            let (value, replayed) = self.rebased(&entry)?;
            validate_unique_identities(self.ctx.config(), &value)?;
            self.value = value;
            self.gids.insert(replayed.gid.clone());
            tracing::debug!(gid = %replayed.gid, ts = replayed.ts, "Fast-forwarded change");
            self.history.push(replayed);
        }
        Ok(())
    }

    fn apply_incoming(&mut self, change: &ChangeSet) -> Result<ChangeSet> {
        let (value, applied) = self.rebased(change)?;
        validate_unique_identities(self.ctx.config(), &value)?;
        self.value = value;
        Ok(applied)
    }

    /// Apply to a working copy; returns it with the refreshed change.
    fn rebased(&self, change: &ChangeSet) -> Result<(Value, ChangeSet)> {
        let mut working = self.value.clone();
        let diff = apply_rebased(self.ctx.config(), &mut working, &change.diff)?;
        let replayed = ChangeSet {
            diff,
            cid: change.cid.clone(),
            ts: change.ts,
            seq: change.seq,
            gid: change.gid.clone(),
        };
        Ok((working, replayed))
    }

    fn reinsert(&mut self, change: ChangeSet) {
        let mut idx = self.history.len();
        while idx > 1 && self.history[idx - 1].sorts_after(change.ts, &change.cid) {
            idx -= 1;
        }
        self.history.insert(idx, change);
    }

    fn record_warning(&mut self, phase: &str, err: &SyncError) {
        tracing::warn!(cid = %self.cid, phase, error = %err, "Change pipeline phase failed");
        self.warning = Some(format!("{phase}: {err}"));
    }
}

/// Script that builds `value` from an empty map.
fn initial_diff(ctx: &SyncContext, value: &Value) -> Result<Vec<Operation>> {
    match value {
        Value::Object(_) => diff(ctx.config(), &Value::Object(Map::new()), value),
        other => Ok(vec![Operation::add(Path::root(), other.clone())]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SyncConfig;
    use crate::patch::apply;
    use serde_json::json;

    fn ctx_at(ms: i64) -> (Arc<ManualClock>, Arc<SyncContext>) {
        let clock = Arc::new(ManualClock::new(ms));
        let ctx = SyncContext::with_clock(SyncConfig::default(), clock.clone())
            .with_replica_id("local")
            .shared();
        (clock, ctx)
    }

    fn replayed(doc: &Document) -> Value {
        let mut value = json!({});
        for change in doc.history() {
            apply(doc.context().config(), &mut value, &change.diff).unwrap();
        }
        value
    }

    fn assert_gids_in_lockstep(doc: &Document) {
        let from_history: HashSet<String> = doc.history().iter().map(|c| c.gid.clone()).collect();
        assert_eq!(doc.gids(), &from_history);
    }

    #[test]
    fn new_document_is_an_empty_map() {
        let (_, ctx) = ctx_at(1000);
        let doc = Document::new(ctx);
        assert_eq!(doc.value(), &json!({}));
        assert_eq!(doc.history().len(), 1);
        assert!(doc.history()[0].is_empty());
        assert_eq!(doc.cid(), "local");
        assert_gids_in_lockstep(&doc);
    }

    #[test]
    fn initial_change_rebuilds_the_value() {
        let (_, ctx) = ctx_at(1000);
        let value = json!({"title": "t", "items": [{"id": "a"}]});
        let doc = Document::from_value(ctx.clone(), value.clone()).unwrap();
        assert_eq!(replayed(&doc), value);

        let leaf = Document::from_value(ctx, json!([1, 2])).unwrap();
        assert_eq!(
            leaf.history()[0].diff,
            vec![Operation::add(Path::root(), json!([1, 2]))]
        );
    }

    #[test]
    fn duplicate_identities_are_rejected() {
        let (_, ctx) = ctx_at(1000);
        let err = Document::from_value(ctx, json!({"l": [{"id": 1}, {"id": 1}]})).unwrap_err();
        assert!(matches!(err, SyncError::DuplicateIdentity { .. }));
    }

    #[test]
    fn change_produces_and_applies() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"id": "0", "name": "Test"})).unwrap();
        clock.set(2000);
        let change = doc.change(|v| v["name"] = json!("Foo")).unwrap();
        assert_eq!(change.ts, 2000);
        assert_eq!(change.cid, "local");
        assert_eq!(doc.value(), &json!({"id": "0", "name": "Foo"}));
        assert_eq!(doc.history().len(), 2);
        assert_eq!(replayed(&doc), *doc.value());
        assert_gids_in_lockstep(&doc);
    }

    #[test]
    fn produce_leaves_document_untouched() {
        let (_, ctx) = ctx_at(1000);
        let doc = Document::from_value(ctx, json!({"a": 1})).unwrap();
        let change = doc.produce(&json!({"a": 2})).unwrap();
        assert_eq!(change.diff.len(), 1);
        assert_eq!(doc.value(), &json!({"a": 1}));
    }

    #[test]
    fn apply_is_idempotent() {
        let (clock, ctx) = ctx_at(1000);
        let base = Document::from_value(ctx, json!({"n": 0})).unwrap();
        clock.set(2000);
        let change = base.produce(&json!({"n": 1})).unwrap();
        let mut doc = base.fork();
        doc.apply_change_in_place(&change);
        let once = doc.clone();
        doc.apply_change_in_place(&change);
        assert_eq!(doc.value(), once.value());
        assert_eq!(doc.history(), once.history());
        assert!(doc.warning().is_none());
    }

    #[test]
    fn apply_change_returns_a_new_document() {
        let (clock, ctx) = ctx_at(1000);
        let base = Document::from_value(ctx, json!({"n": 0})).unwrap();
        clock.set(2000);
        let change = base.produce(&json!({"n": 1})).unwrap();
        let next = base.apply_change(&change);
        assert_eq!(base.value(), &json!({"n": 0}));
        assert_eq!(next.value(), &json!({"n": 1}));
    }

    #[test]
    fn concurrent_replaces_converge() {
        let (clock, ctx) = ctx_at(1000);
        let base = Document::from_value(ctx, json!({"x": 1})).unwrap();
        let mut a = base.fork().with_cid("a");
        let mut b = base.fork().with_cid("b");

        clock.set(2000);
        let from_a = a.change(|v| v["x"] = json!(2)).unwrap();
        clock.set(1500);
        let from_b = b.change(|v| v["x"] = json!(3)).unwrap();

        a.apply_change_in_place(&from_b);
        b.apply_change_in_place(&from_a);

        assert_eq!(a.value(), &json!({"x": 2}));
        assert_eq!(a.value(), b.value());
        assert!(a.warning().is_none());
        // The replayed change now remembers the value it overwrote.
        let last = a.history().last().unwrap();
        assert_eq!(last.gid, from_a.gid);
        assert_eq!(
            last.diff,
            vec![Operation::replace(Path::parse("/x"), json!(2), json!(3))]
        );
        assert_eq!(a.history(), b.history());
        assert_gids_in_lockstep(&a);
    }

    #[test]
    fn equal_timestamps_order_by_cid() {
        let (_, ctx) = ctx_at(1000);
        let base = Document::from_value(ctx, json!({"list": []})).unwrap();
        let mut a = base.fork().with_cid("a");
        let mut b = base.fork().with_cid("b");
        let from_a = a.change(|v| v["from_a"] = json!(true)).unwrap();
        let from_b = b.change(|v| v["from_b"] = json!(true)).unwrap();
        a.apply_change_in_place(&from_b);
        b.apply_change_in_place(&from_a);
        assert_eq!(a.value(), b.value());
        let order: Vec<&str> = b.history().iter().skip(1).map(|c| c.cid.as_str()).collect();
        assert_eq!(order, ["a", "b"]);
    }

    #[test]
    fn local_change_lands_after_newer_remote_entries() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"items": []})).unwrap();
        let mut remote = doc.fork().with_cid("remote");
        clock.set(5000);
        let added = remote
            .change(|v| v["items"] = json!([{"id": "x"}]))
            .unwrap();
        doc.apply_change_in_place(&added);

        clock.set(2000);
        let edit = doc.change(|v| v["items"][0]["name"] = json!("n")).unwrap();
        assert_eq!(edit.ts, 5001);
        assert!(doc.warning().is_none());
        assert_eq!(doc.value(), &json!({"items": [{"id": "x", "name": "n"}]}));
        assert_eq!(doc.history().last().unwrap().gid, edit.gid);
        assert_eq!(replayed(&doc), *doc.value());
        assert_gids_in_lockstep(&doc);
    }

    #[test]
    fn initial_change_is_stamped_at_zero() {
        let (_, ctx) = ctx_at(9000);
        assert_eq!(Document::new(ctx.clone()).history()[0].ts, 0);
        let doc = Document::from_value(ctx, json!({"a": 1})).unwrap();
        assert_eq!(doc.history()[0].ts, 0);
    }

    #[test]
    fn duplicate_identity_is_rejected_in_either_order() {
        let (clock, ctx) = ctx_at(1000);
        let base = Document::from_value(ctx, json!({"rows": [{"id": "r2"}]})).unwrap();
        let mut a = base.fork().with_cid("a");
        let mut b = base.fork().with_cid("b");
        clock.set(2000);
        let prepend = a
            .change(|v| v["rows"] = json!([{"id": "r5"}, {"id": "r2"}]))
            .unwrap();
        clock.set(2100);
        let swap = b.change(|v| v["rows"] = json!([{"id": "r5"}])).unwrap();

        let mut first = base.fork();
        first.apply_change_in_place(&prepend);
        first.apply_change_in_place(&swap);
        assert!(first.warning().unwrap().starts_with("patch failed: "));

        let mut second = base.fork();
        second.apply_change_in_place(&swap);
        second.apply_change_in_place(&prepend);
        assert!(second.warning().unwrap().starts_with("forward failed: "));

        let expected = json!({"rows": [{"id": "r5"}, {"id": "r2"}]});
        assert_eq!(first.value(), &expected);
        assert_eq!(second.value(), &expected);
        assert_eq!(first.history(), second.history());
        assert!(!second.gids().contains(&swap.gid));
        assert_gids_in_lockstep(&second);
    }

    #[test]
    fn concurrent_adds_of_one_key_rewind_cleanly() {
        let (clock, ctx) = ctx_at(1000);
        let base = Document::from_value(ctx, json!({})).unwrap();
        let mut a = base.fork().with_cid("a");
        let mut b = base.fork().with_cid("b");
        clock.set(2000);
        let from_a = a.change(|v| v["k"] = json!(1)).unwrap();
        clock.set(2100);
        let from_b = b.change(|v| v["k"] = json!(2)).unwrap();

        a.apply_change_in_place(&from_b);
        b.apply_change_in_place(&from_a);
        assert!(a.warning().is_none());
        assert!(b.warning().is_none());
        assert_eq!(a.value(), &json!({"k": 2}));
        assert_eq!(a.history(), b.history());
        // The later add overwrote a value and is kept as a replace.
        assert_eq!(
            a.history().last().unwrap().diff,
            vec![Operation::replace(Path::parse("/k"), json!(2), json!(1))]
        );

        // Rewinding past the overwrite restores the earlier value.
        let older = ChangeSet::new(
            vec![Operation::add(Path::parse("/other"), json!(true))],
            "c",
            1500,
            0,
        );
        a.apply_change_in_place(&older);
        assert!(a.warning().is_none());
        assert_eq!(a.value(), &json!({"k": 2, "other": true}));
        assert_eq!(replayed(&a), *a.value());
    }

    #[test]
    fn failed_patch_sets_warning() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx.clone(), json!({"a": 1})).unwrap();
        clock.set(2000);
        let bad = ChangeSet::new(
            vec![Operation::remove(Path::parse("/missing"), Value::Null)],
            "remote",
            2000,
            ctx.next_seq(),
        );
        doc.apply_change_in_place(&bad);
        assert!(doc.warning().unwrap().starts_with("patch failed: "));
        assert_eq!(doc.value(), &json!({"a": 1}));
        assert_eq!(doc.history().len(), 1);
        assert!(!doc.gids().contains(&bad.gid));

        // The warning is cleared by the next call.
        let good = doc.produce(&json!({"a": 2})).unwrap();
        doc.apply_change_in_place(&good);
        assert!(doc.warning().is_none());
    }

    #[test]
    fn failed_forward_drops_the_stale_change() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx.clone(), json!({"a": {"x": 1}})).unwrap();
        clock.set(3000);
        let local = doc.change(|v| v["a"]["x"] = json!(2)).unwrap();
        let older = ChangeSet::new(
            vec![Operation::remove(Path::parse("/a"), json!({"x": 1}))],
            "remote",
            2000,
            ctx.next_seq(),
        );
        doc.apply_change_in_place(&older);
        assert!(doc.warning().unwrap().starts_with("forward failed: "));
        assert_eq!(doc.value(), &json!({}));
        assert!(!doc.gids().contains(&local.gid));
        assert!(doc.gids().contains(&older.gid));
        assert!(doc.stash().is_empty());
        assert_gids_in_lockstep(&doc);
    }

    #[test]
    fn rewind_keeps_the_first_entry() {
        let (_, ctx) = ctx_at(5000);
        let mut doc = Document::from_value(ctx.clone(), json!({"a": 1})).unwrap();
        let older = ChangeSet::new(
            vec![Operation::add(Path::parse("/b"), json!(2))],
            "remote",
            10,
            ctx.next_seq(),
        );
        doc.apply_change_in_place(&older);
        assert_eq!(doc.value(), &json!({"a": 1, "b": 2}));
        assert_eq!(doc.history()[1].gid, older.gid);
        assert_eq!(replayed(&doc), *doc.value());
    }

    #[test]
    fn prune_keeps_gids_in_lockstep() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"n": 0})).unwrap();
        for n in 1..=5 {
            clock.advance(10);
            doc.change(|v| v["n"] = json!(n)).unwrap();
        }
        doc.prune_history(2);
        assert_eq!(doc.history().len(), 2);
        assert_gids_in_lockstep(&doc);
        doc.prune_history(10);
        assert_eq!(doc.history().len(), 2);
    }

    #[test]
    fn fork_prunes_and_takes_replica_id() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"n": 0}))
            .unwrap()
            .with_cid("origin");
        for n in 1..=3 {
            clock.advance(10);
            doc.change(|v| v["n"] = json!(n)).unwrap();
        }
        let copy = doc.fork_with_capacity(2);
        assert_eq!(copy.cid(), "local");
        assert_eq!(copy.value(), doc.value());
        assert_eq!(copy.history().len(), 2);
        assert_eq!(doc.history().len(), 4);
        assert_gids_in_lockstep(&copy);
    }

    #[test]
    fn save_and_load() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"items": [{"id": "a"}]})).unwrap();
        clock.set(2000);
        let change = doc
            .change(|v| v["items"].as_array_mut().unwrap().push(json!({"id": "b"})))
            .unwrap();

        let saved = doc.save().unwrap();
        let raw: Value = serde_json::from_str(&saved).unwrap();
        assert_eq!(&raw["data"], doc.value());
        assert_eq!(raw["meta"]["gids"][change.gid.as_str()], json!(1));
        assert!(raw.get("cid").is_none());
        assert!(raw["meta"].get("cid").is_none());

        let remote = SyncContext::default().with_replica_id("remote").shared();
        let loaded = Document::load(remote, &saved).unwrap();
        assert_eq!(loaded.value(), doc.value());
        assert_eq!(loaded.history(), doc.history());
        assert_eq!(loaded.gids(), doc.gids());
        assert_eq!(loaded.cid(), "remote");
    }

    #[test]
    fn load_prunes_to_capacity() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"n": 0})).unwrap();
        for n in 1..=4 {
            clock.advance(1);
            doc.change(|v| v["n"] = json!(n)).unwrap();
        }
        let small = SyncContext::new(SyncConfig::default().with_history_capacity(3)).shared();
        let loaded = Document::load(small, &doc.save().unwrap()).unwrap();
        assert_eq!(loaded.history().len(), 3);
        assert_gids_in_lockstep(&loaded);
    }

    #[test]
    fn load_rejects_malformed_input() {
        let err = Document::load(SyncContext::default().shared(), "{\"meta\": 1}").unwrap_err();
        assert!(matches!(err, SyncError::Codec(_)));
    }

    #[test]
    fn compact_history_folds_old_entries() {
        let (clock, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"n": 0})).unwrap();
        let mut changes = vec![];
        for n in 1..=3 {
            clock.set(1000 + n * 1000);
            changes.push(doc.change(|v| v["n"] = json!(n)).unwrap());
        }
        doc.compact_history(3000).unwrap();

        assert_eq!(doc.value(), &json!({"n": 3}));
        assert_eq!(doc.history().len(), 3);
        let snapshot = &doc.history()[0];
        assert_eq!(snapshot.gid, changes[0].gid);
        assert_eq!(snapshot.ts, 2000);
        assert_eq!(snapshot.diff, vec![Operation::add(Path::parse("/n"), json!(1))]);
        assert_eq!(doc.history()[1].gid, changes[1].gid);
        assert_eq!(replayed(&doc), *doc.value());
        assert_gids_in_lockstep(&doc);
    }

    #[test]
    fn compact_single_entry_is_a_no_op() {
        let (_, ctx) = ctx_at(1000);
        let mut doc = Document::from_value(ctx, json!({"n": 0})).unwrap();
        let before = doc.history().to_vec();
        doc.compact_history(0).unwrap();
        assert_eq!(doc.history(), before.as_slice());
    }
}
