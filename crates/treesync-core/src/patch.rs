//! Patch engine: applies an edit script to a value in place.
//!
//! Identity steps are resolved when they are reached, by a linear search of
//! the current array for the element with that identity. The first failing
//! operation aborts the script; operations before it stay applied, so
//! callers that need atomicity apply to a copy.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::identity::{object_identity, shape_name, Identity};
use crate::operation::Operation;
use crate::path::{Path, PathStep};
use serde_json::Value;
use tracing::trace;

/// Apply `ops` to `value` in order.
///
/// # Errors
///
/// Returns [`SyncError::PathResolution`] for the first operation whose
/// target cannot be located.
pub fn apply(config: &SyncConfig, value: &mut Value, ops: &[Operation]) -> Result<()> {
    for op in ops {
        apply_one(config, value, op)?;
    }
    Ok(())
}

/// Apply `ops` and return them with `prev` and `index` refreshed from the
/// tree as it was when each operation ran.
///
/// Used when replaying changes onto a tree that has moved on since they were
/// computed, so that a later reversal restores what was actually there.
///
/// # Errors
///
/// Same as [`apply`].
pub fn apply_rebased(
    config: &SyncConfig,
    value: &mut Value,
    ops: &[Operation],
) -> Result<Vec<Operation>> {
    ops.iter().map(|op| apply_one(config, value, op)).collect()
}

/// Apply `ops` to a copy of `value`.
///
/// # Errors
///
/// Same as [`apply`].
pub fn patched(config: &SyncConfig, value: &Value, ops: &[Operation]) -> Result<Value> {
    let mut copy = value.clone();
    apply(config, &mut copy, ops)?;
    Ok(copy)
}

fn apply_one(config: &SyncConfig, root: &mut Value, op: &Operation) -> Result<Operation> {
    trace!(op = %op, "Applying operation");
    Ok(match op {
        Operation::Add { path, value, index } => {
            match insert_at(config, root, path, value.clone())? {
                // An add onto an existing map key is recorded as the replace it was.
                Inserted::Displaced(prev) => Operation::replace(path.clone(), value.clone(), prev),
                Inserted::At(position) => Operation::Add {
                    path: path.clone(),
                    value: value.clone(),
                    index: position.or(*index),
                },
            }
        }
        Operation::Remove { path, index, .. } => {
            let (prev, position) = take_at(config, root, path)?;
            Operation::Remove {
                path: path.clone(),
                prev,
                index: position.or(*index),
            }
        }
        Operation::Replace { path, value, .. } => {
            let prev = replace_at(config, root, path, value.clone())?;
            Operation::replace(path.clone(), value.clone(), prev)
        }
        Operation::Move { from, path, index } => {
            let (moved, position) = take_at(config, root, from)?;
            insert_at(config, root, path, moved)?;
            Operation::Move {
                from: from.clone(),
                path: path.clone(),
                index: position.or(*index),
            }
        }
    })
}

/// Where an inserted value went.
enum Inserted {
    /// New slot; the array position, if the parent is an array
    At(Option<usize>),
    /// Existing map key or root, with the value it held before
    Displaced(Value),
}

/// Insert `value` at `path`.
fn insert_at(config: &SyncConfig, root: &mut Value, path: &Path, value: Value) -> Result<Inserted> {
    let Some((last, parents)) = path.steps().split_last() else {
        return Ok(Inserted::Displaced(std::mem::replace(root, value)));
    };
    match resolve_mut(config, root, parents, path)? {
        Value::Object(map) => Ok(match map.insert(map_key(last), value) {
            Some(prev) => Inserted::Displaced(prev),
            None => Inserted::At(None),
        }),
        Value::Array(items) => {
            let position = match last {
                // Insert before the anchor element.
                PathStep::Id(id) => find_identity(config, items, id)
                    .ok_or_else(|| id_not_found(path, id))?,
                step => array_index(step, path)?.min(items.len()),
            };
            items.insert(position, value);
            Ok(Inserted::At(Some(position)))
        }
        leaf => Err(SyncError::path_resolution(
            path,
            format!("cannot add into {}", shape_name(leaf)),
        )),
    }
}

/// Remove and return the value at `path` with its array position, if any.
fn take_at(config: &SyncConfig, root: &mut Value, path: &Path) -> Result<(Value, Option<usize>)> {
    let Some((last, parents)) = path.steps().split_last() else {
        return Err(SyncError::path_resolution(path, "cannot remove the root"));
    };
    match resolve_mut(config, root, parents, path)? {
        Value::Object(map) => {
            let key = map_key(last);
            let removed = map
                .remove(&key)
                .ok_or_else(|| SyncError::path_resolution(path, format!("key `{key}` not found")))?;
            Ok((removed, None))
        }
        Value::Array(items) => {
            let position = existing_position(config, items, last, path)?;
            Ok((items.remove(position), Some(position)))
        }
        leaf => Err(SyncError::path_resolution(
            path,
            format!("cannot remove from {}", shape_name(leaf)),
        )),
    }
}

/// Overwrite the value at `path` and return what was there.
fn replace_at(config: &SyncConfig, root: &mut Value, path: &Path, value: Value) -> Result<Value> {
    let Some((last, parents)) = path.steps().split_last() else {
        return Ok(std::mem::replace(root, value));
    };
    match resolve_mut(config, root, parents, path)? {
        Value::Object(map) => Ok(map.insert(map_key(last), value).unwrap_or(Value::Null)),
        Value::Array(items) => {
            let position = existing_position(config, items, last, path)?;
            Ok(std::mem::replace(&mut items[position], value))
        }
        leaf => Err(SyncError::path_resolution(
            path,
            format!("cannot replace inside {}", shape_name(leaf)),
        )),
    }
}

fn resolve_mut<'a>(
    config: &SyncConfig,
    root: &'a mut Value,
    steps: &[PathStep],
    path: &Path,
) -> Result<&'a mut Value> {
    let mut node = root;
    for step in steps {
        node = match node {
            Value::Object(map) => {
                let key = map_key(step);
                map.get_mut(&key).ok_or_else(|| {
                    SyncError::path_resolution(path, format!("key `{key}` not found"))
                })?
            }
            Value::Array(items) => {
                let position = existing_position(config, items, step, path)?;
                &mut items[position]
            }
            leaf => {
                return Err(SyncError::path_resolution(
                    path,
                    format!("cannot descend into {}", shape_name(leaf)),
                ))
            }
        };
    }
    Ok(node)
}

fn map_key(step: &PathStep) -> String {
    match step {
        PathStep::Key(key) => key.clone(),
        PathStep::Index(index) => index.to_string(),
        // A bracketed key reads back as an identity step.
        PathStep::Id(id) => format!("[{id}]"),
    }
}

fn array_index(step: &PathStep, path: &Path) -> Result<usize> {
    match step {
        PathStep::Index(index) => Ok(*index),
        PathStep::Key(key) => key.parse().map_err(|_| {
            SyncError::path_resolution(path, format!("`{key}` is not an array index"))
        }),
        PathStep::Id(id) => Err(id_not_found(path, id)),
    }
}

fn existing_position(
    config: &SyncConfig,
    items: &[Value],
    step: &PathStep,
    path: &Path,
) -> Result<usize> {
    if let PathStep::Id(id) = step {
        return find_identity(config, items, id).ok_or_else(|| id_not_found(path, id));
    }
    let index = array_index(step, path)?;
    if index < items.len() {
        Ok(index)
    } else {
        Err(SyncError::path_resolution(
            path,
            format!("index {index} out of range for length {}", items.len()),
        ))
    }
}

fn find_identity(config: &SyncConfig, items: &[Value], id: &Identity) -> Option<usize> {
    items
        .iter()
        .position(|item| object_identity(config, item).ok().flatten().as_ref() == Some(id))
}

fn id_not_found(path: &Path, id: &Identity) -> SyncError {
    SyncError::path_resolution(path, format!("id `{id}` not found"))
}
