//! Edit script operations and their wire form.

use crate::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One step of an edit script.
///
/// `prev` carries the value an operation overwrote or removed, and `index`
/// the array position the element held, so that the operation can be
/// inverted exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireOperation", into = "WireOperation")]
pub enum Operation {
    /// Insert a map key or an array element.
    Add {
        /// Target location
        path: Path,
        /// Inserted value
        value: Value,
        /// Final array position of the inserted element
        index: Option<usize>,
    },
    /// Delete a map key or an array element.
    Remove {
        /// Target location
        path: Path,
        /// Removed value
        prev: Value,
        /// Array position of the removed element
        index: Option<usize>,
    },
    /// Overwrite the value at a location.
    Replace {
        /// Target location
        path: Path,
        /// New value
        value: Value,
        /// Overwritten value
        prev: Value,
    },
    /// Relocate an array element.
    Move {
        /// Source location
        from: Path,
        /// Destination location
        path: Path,
        /// Array position the element was taken from
        index: Option<usize>,
    },
}

impl Operation {
    /// Add without position bookkeeping.
    #[must_use]
    pub fn add(path: Path, value: Value) -> Self {
        Operation::Add {
            path,
            value,
            index: None,
        }
    }

    /// Remove without position bookkeeping.
    #[must_use]
    pub fn remove(path: Path, prev: Value) -> Self {
        Operation::Remove {
            path,
            prev,
            index: None,
        }
    }

    /// Replace `prev` by `value`.
    #[must_use]
    pub fn replace(path: Path, value: Value, prev: Value) -> Self {
        Operation::Replace { path, value, prev }
    }

    /// Move without position bookkeeping.
    #[must_use]
    pub fn move_to(from: Path, path: Path) -> Self {
        Operation::Move {
            from,
            path,
            index: None,
        }
    }

    /// The target location.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Operation::Add { path, .. }
            | Operation::Remove { path, .. }
            | Operation::Replace { path, .. }
            | Operation::Move { path, .. } => path,
        }
    }

    /// The wire name of the operation.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Add { .. } => OpKind::Add,
            Operation::Remove { .. } => OpKind::Remove,
            Operation::Replace { .. } => OpKind::Replace,
            Operation::Move { .. } => OpKind::Move,
        }
    }
}

/// Operation tag as it appears in the `op` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    /// `add`
    Add,
    /// `remove`
    Remove,
    /// `replace`
    Replace,
    /// `move`
    Move,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OpKind::Add => "add",
            OpKind::Remove => "remove",
            OpKind::Replace => "replace",
            OpKind::Move => "move",
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireOperation {
    op: OpKind,
    path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(rename = "_prev", default, skip_serializing_if = "Option::is_none")]
    prev: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<Path>,
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
}

impl TryFrom<WireOperation> for Operation {
    type Error = String;

    fn try_from(wire: WireOperation) -> Result<Self, Self::Error> {
        let value = wire.value.unwrap_or(Value::Null);
        let prev = wire.prev.unwrap_or(Value::Null);
        Ok(match wire.op {
            OpKind::Add => Operation::Add {
                path: wire.path,
                value,
                index: wire.index,
            },
            OpKind::Remove => Operation::Remove {
                path: wire.path,
                prev,
                index: wire.index,
            },
            OpKind::Replace => Operation::Replace {
                path: wire.path,
                value,
                prev,
            },
            OpKind::Move => Operation::Move {
                from: wire
                    .from
                    .ok_or_else(|| format!("move to {} has no `from`", wire.path))?,
                path: wire.path,
                index: wire.index,
            },
        })
    }
}

impl From<Operation> for WireOperation {
    fn from(op: Operation) -> Self {
        let mut wire = WireOperation {
            op: op.kind(),
            path: Path::root(),
            value: None,
            prev: None,
            from: None,
            index: None,
        };
        match op {
            Operation::Add { path, value, index } => {
                wire.path = path;
                wire.value = Some(value);
                wire.index = index;
            }
            Operation::Remove { path, prev, index } => {
                wire.path = path;
                wire.prev = Some(prev);
                wire.index = index;
            }
            Operation::Replace { path, value, prev } => {
                wire.path = path;
                wire.value = Some(value);
                wire.prev = Some(prev);
            }
            Operation::Move { from, path, index } => {
                wire.path = path;
                wire.from = Some(from);
                wire.index = index;
            }
        }
        wire
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Move { from, path, .. } => write!(f, "move {from} -> {path}"),
            other => write!(f, "{} {}", other.kind(), other.path()),
        }
    }
}
