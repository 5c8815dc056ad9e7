//! Structural diff producing identity-aware edit scripts.
//!
//! Maps are compared key by key. Arrays of leaves are replaced whole when
//! anything differs. Other arrays are reconciled element by element: old and
//! new elements are paired by [`entangled`], and the script then removes the
//! unpaired old elements, moves the paired ones into their final order and
//! adds the unpaired new ones.
//!
//! Array script layout, in emission order:
//!
//! | Block | Order | Addressing |
//! |-------|-------|------------|
//! | removes | descending old index | identity for maps, else index |
//! | moves (+ nested diffs) | ascending new index | identity source, index destination |
//! | adds | ascending new index | index, or identity of the next paired map |

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::identity::{entangled, is_primitive, object_identity, shape_name};
use crate::operation::Operation;
use crate::path::{Path, PathStep};
use serde_json::{Map, Value};
use tracing::debug;

/// Compute the edit script turning `old` into `new`.
///
/// # Errors
///
/// - [`SyncError::TypeMismatch`] when the roots are containers of different
///   shapes, or a container and a leaf.
/// - [`SyncError::Identity`] when a compared map has no identity under
///   strict mode.
/// - [`SyncError::UnsupportedComparison`] when nested arrays must be paired
///   under strict mode.
pub fn diff(config: &SyncConfig, old: &Value, new: &Value) -> Result<Vec<Operation>> {
    let root = Path::root();
    let mut ops = Vec::new();
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_object(config, a, b, &root, &mut ops)?,
        (Value::Array(a), Value::Array(b)) => diff_array(config, a, b, &root, &mut ops)?,
        (a, b) if is_primitive(a) && is_primitive(b) => {
            if a != b {
                ops.push(Operation::replace(root, b.clone(), a.clone()));
            }
        }
        (a, b) => {
            return Err(SyncError::TypeMismatch {
                left: shape_name(a),
                right: shape_name(b),
            })
        }
    }
    debug!(ops = ops.len(), "Computed edit script");
    Ok(ops)
}

fn diff_value(
    config: &SyncConfig,
    old: &Value,
    new: &Value,
    path: &Path,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    if old == new {
        return Ok(());
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => diff_object(config, a, b, path, ops),
        (Value::Array(a), Value::Array(b)) => diff_array(config, a, b, path, ops),
        // Leaves, or a change of shape.
        (a, b) => {
            ops.push(Operation::replace(path.clone(), b.clone(), a.clone()));
            Ok(())
        }
    }
}

fn diff_object(
    config: &SyncConfig,
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    path: &Path,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    let mut removed = 0;
    for (key, old_value) in old {
        let child = path.child(PathStep::key(key.as_str()));
        match new.get(key) {
            Some(new_value) => diff_value(config, old_value, new_value, &child, ops)?,
            None => {
                ops.push(Operation::remove(child, old_value.clone()));
                removed += 1;
            }
        }
    }
    // Added keys are only looked for when the key counts leave room for them.
    if new.len() > old.len() - removed {
        for (key, new_value) in new {
            if !old.contains_key(key) {
                ops.push(Operation::add(
                    path.child(PathStep::key(key.as_str())),
                    new_value.clone(),
                ));
            }
        }
    }
    Ok(())
}

fn diff_array(
    config: &SyncConfig,
    old: &[Value],
    new: &[Value],
    path: &Path,
    ops: &mut Vec<Operation>,
) -> Result<()> {
    if old.iter().all(is_primitive) {
        let differs = !new.iter().all(is_primitive)
            || old.len() != new.len()
            || old.iter().zip(new).any(|(a, b)| a != b);
        if differs {
            ops.push(Operation::replace(
                path.clone(),
                Value::Array(new.to_vec()),
                Value::Array(old.to_vec()),
            ));
        }
        return Ok(());
    }

    let pairs = pair_elements(config, old, new)?;
    let mut new_of_old: Vec<Option<usize>> = vec![None; old.len()];
    for (o, c) in pairs.iter().enumerate() {
        if let Some(c) = c {
            new_of_old[*c] = Some(o);
        }
    }

    for (c, element) in old.iter().enumerate().rev() {
        if new_of_old[c].is_none() {
            ops.push(Operation::Remove {
                path: path.child(element_step(config, element, c)),
                prev: element.clone(),
                index: Some(c),
            });
        }
    }

    // Old indices of the surviving elements, in their current order.
    let mut current: Vec<usize> = (0..old.len()).filter(|c| new_of_old[*c].is_some()).collect();
    let mut rank = 0;
    for (o, pair) in pairs.iter().enumerate() {
        let Some(c) = *pair else { continue };
        let q = current.iter().position(|x| *x == c).unwrap_or(rank);
        if q != rank {
            ops.push(Operation::Move {
                from: path.child(element_step(config, &old[c], q)),
                path: path.child(PathStep::Index(rank)),
                index: Some(q),
            });
            let moved = current.remove(q);
            current.insert(rank, moved);
        }
        match (&old[c], &new[o]) {
            (Value::Object(a), Value::Object(b)) => {
                if let Some(id) = object_identity(config, &old[c])? {
                    diff_object(config, a, b, &path.child(PathStep::Id(id)), ops)?;
                }
            }
            // Only paired through the same-position rule; no adds have landed yet.
            (Value::Array(a), Value::Array(b)) => {
                diff_array(config, a, b, &path.child(PathStep::Index(rank)), ops)?;
            }
            _ => {}
        }
        rank += 1;
    }

    for (o, element) in new.iter().enumerate() {
        if pairs[o].is_some() {
            continue;
        }
        let anchor = match (element, new.get(o + 1)) {
            (Value::Object(_), Some(next @ Value::Object(_))) if pairs[o + 1].is_some() => {
                object_identity(config, next)?
            }
            _ => None,
        };
        let step = anchor.map_or(PathStep::Index(o), PathStep::Id);
        ops.push(Operation::Add {
            path: path.child(step),
            value: element.clone(),
            index: Some(o),
        });
    }
    Ok(())
}

/// Pair every new element with at most one old element, first fit.
///
/// Returns, per new index, the paired old index.
fn pair_elements(config: &SyncConfig, old: &[Value], new: &[Value]) -> Result<Vec<Option<usize>>> {
    let mut pairs: Vec<Option<usize>> = vec![None; new.len()];
    let mut old_taken = vec![false; old.len()];
    for (c, old_element) in old.iter().enumerate() {
        for (o, new_element) in new.iter().enumerate() {
            if pairs[o].is_some() || old_taken[c] {
                continue;
            }
            let relaxed = !config.strict && c == o && old_element.is_array() && new_element.is_array();
            if relaxed || entangled(config, old_element, new_element)? {
                pairs[o] = Some(c);
                old_taken[c] = true;
            }
        }
    }
    Ok(pairs)
}

fn element_step(config: &SyncConfig, element: &Value, index: usize) -> PathStep {
    match object_identity(config, element) {
        Ok(Some(id)) => PathStep::Id(id),
        _ => PathStep::Index(index),
    }
}
