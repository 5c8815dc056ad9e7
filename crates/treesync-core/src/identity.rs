//! Element identity and canonical serialization.
//!
//! Array elements are matched across versions by identity rather than by
//! position. A map's identity comes from the configured accessors; when none
//! applies and strict mode is off, it falls back to a hash of the map's
//! canonical serialization.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::path::{Path, PathStep};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Stable key of a map-typed element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap an identity string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Name of a value's shape, as used in error messages.
#[must_use]
pub fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether the value is a leaf (null, boolean, number or string).
#[must_use]
pub fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Whether the value is an array holding only leaves.
#[must_use]
pub fn is_primitive_array(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(is_primitive),
        _ => false,
    }
}

/// Deterministic text form: map keys sorted, nested values canonicalized.
#[must_use]
pub fn canonical_serialize(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Canonical form of any serializable type.
///
/// The type's `Serialize` impl is applied first, which lets opaque types
/// choose their own structural representation.
///
/// # Errors
///
/// Returns error if the type cannot be represented as a JSON value.
pub fn canonical_serialize_with<T: Serialize>(value: &T) -> Result<String> {
    Ok(canonical_serialize(&serde_json::to_value(value)?))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// Rolling hash over UTF-16 code units, folded to a non-negative integer.
///
/// Not cryptographic; collisions only degrade the fallback identity.
#[must_use]
pub fn hash(input: &str) -> u64 {
    let acc = input.encode_utf16().fold(0_i64, |acc, unit| {
        // The shift operates on the low 32 bits, the subtraction does not.
        #[allow(clippy::cast_possible_truncation)]
        let shifted = i64::from((acc as i32).wrapping_shl(5));
        shifted - acc + i64::from(unit)
    });
    acc.unsigned_abs()
}

/// Identity of a value under the configured policy.
///
/// Non-map values have no identity.
///
/// # Errors
///
/// Returns [`SyncError::Identity`] for a map without identity under strict mode.
pub fn object_identity(config: &SyncConfig, value: &Value) -> Result<Option<Identity>> {
    let Value::Object(map) = value else {
        return Ok(None);
    };
    if let Some(id) = config.identity.extract(map) {
        return Ok(Some(id));
    }
    let canonical = canonical_serialize(value);
    if config.strict {
        return Err(SyncError::Identity { object: canonical });
    }
    Ok(Some(Identity::new(hash(&canonical).to_string())))
}

/// Whether two values denote the same logical element.
///
/// # Errors
///
/// Returns [`SyncError::UnsupportedComparison`] when both are arrays, and
/// propagates identity errors.
pub fn entangled(config: &SyncConfig, a: &Value, b: &Value) -> Result<bool> {
    match (a, b) {
        (Value::Array(_), Value::Array(_)) => Err(SyncError::UnsupportedComparison),
        (Value::Array(_), _) | (_, Value::Array(_)) => Ok(false),
        (Value::Object(_), _) => Ok(object_identity(config, a)? == object_identity(config, b)?),
        (leaf, _) => Ok(leaf == b),
    }
}

/// Reject trees where two maps in the same array share an identity.
///
/// Only identities produced by the configured accessors are checked; maps
/// without one are skipped.
///
/// # Errors
///
/// Returns [`SyncError::DuplicateIdentity`] naming the second occurrence.
pub fn validate_unique_identities(config: &SyncConfig, value: &Value) -> Result<()> {
    let mut path = Path::root();
    walk_unique(config, value, &mut path)
}

fn walk_unique(config: &SyncConfig, value: &Value, path: &mut Path) -> Result<()> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                path.push(PathStep::key(key.as_str()));
                walk_unique(config, child, path)?;
                path.pop();
            }
        }
        Value::Array(items) => {
            let mut seen = HashSet::new();
            for (index, item) in items.iter().enumerate() {
                let id = item.as_object().and_then(|m| config.identity.extract(m));
                match id {
                    Some(id) => {
                        if !seen.insert(id.clone()) {
                            path.push(PathStep::Index(index));
                            let err = SyncError::DuplicateIdentity {
                                identity: id.to_string(),
                                path: path.to_string(),
                            };
                            path.pop();
                            return Err(err);
                        }
                        path.push(PathStep::Id(id));
                    }
                    None => path.push(PathStep::Index(index)),
                }
                walk_unique(config, item, path)?;
                path.pop();
            }
        }
        _ => {}
    }
    Ok(())
}
