//! Two-history merge.
//!
//! Both histories are interleaved into one global order and replayed through
//! the change pipeline onto a fresh document. The interleaving compares heads
//! by `(ts, seq, cid, gid)`, a total order, so the result does not depend on
//! which document is passed first.

use crate::change::ChangeSet;
use crate::document::Document;
use std::cmp::Ordering;
use std::sync::Arc;

/// Replay the union of both histories onto an empty document.
///
/// Entries present in both histories are applied once. The result uses the
/// context of `a`.
#[must_use]
pub fn merge(a: &Document, b: &Document) -> Document {
    let mut merged = Document::new(Arc::clone(a.context()));
    let (left, right) = (a.history(), b.history());
    let (mut i, mut j) = (0, 0);
    loop {
        let next: &ChangeSet = match (left.get(i), right.get(j)) {
            (Some(l), Some(r)) if l.gid == r.gid => {
                i += 1;
                j += 1;
                l
            }
            (Some(l), Some(r)) if l.merge_order(r) == Ordering::Greater => {
                j += 1;
                r
            }
            (Some(l), _) => {
                i += 1;
                l
            }
            (None, Some(r)) => {
                j += 1;
                r
            }
            (None, None) => break,
        };
        merged.apply_change_in_place(next);
    }
    tracing::debug!(
        left = a.history().len(),
        right = b.history().len(),
        merged = merged.history().len(),
        "Merged histories"
    );
    merged
}
