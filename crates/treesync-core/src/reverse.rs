//! Inversion of edit scripts.

use crate::config::SyncConfig;
use crate::identity::object_identity;
use crate::operation::Operation;
use crate::path::{Path, PathStep};
use serde_json::Value;

/// Compute the script that undoes `ops`.
///
/// Applying `ops` and then the result restores the original value for any
/// script produced by [`crate::diff::diff`] or refreshed by
/// [`crate::patch::apply_rebased`].
#[must_use]
pub fn reverse(config: &SyncConfig, ops: &[Operation]) -> Vec<Operation> {
    ops.iter().rev().map(|op| invert(config, op)).collect()
}

fn invert(config: &SyncConfig, op: &Operation) -> Operation {
    match op {
        Operation::Add { path, value, .. } if path.is_root() => {
            Operation::replace(Path::root(), Value::Null, value.clone())
        }
        Operation::Add { path, value, index } => {
            let addressed_in_array = index.is_some() || matches!(path.last(), Some(PathStep::Id(_)));
            let path = if addressed_in_array {
                match (object_identity(config, value), index) {
                    (Ok(Some(id)), _) => path.with_last(PathStep::Id(id)),
                    (_, Some(index)) => path.with_last(PathStep::Index(*index)),
                    (_, None) => path.clone(),
                }
            } else {
                path.clone()
            };
            Operation::Remove {
                path,
                prev: value.clone(),
                index: *index,
            }
        }
        Operation::Remove { path, prev, index } => {
            let path = match path.last() {
                Some(PathStep::Id(_)) => path.with_last(PathStep::Index(index.unwrap_or(0))),
                _ => path.clone(),
            };
            Operation::Add {
                path,
                value: prev.clone(),
                index: *index,
            }
        }
        Operation::Replace { path, value, prev } => {
            Operation::replace(path.clone(), prev.clone(), value.clone())
        }
        Operation::Move { from, path, index } => match (index, path.last()) {
            (Some(origin), Some(PathStep::Index(landed))) => {
                let back_from = match from.last() {
                    Some(PathStep::Id(_)) => from.clone(),
                    _ => path.clone(),
                };
                Operation::Move {
                    from: back_from,
                    path: from.with_last(PathStep::Index(*origin)),
                    index: Some(*landed),
                }
            }
            _ => Operation::Move {
                from: path.clone(),
                path: from.clone(),
                index: None,
            },
        },
    }
}
