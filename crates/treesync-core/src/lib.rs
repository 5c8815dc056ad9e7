//! # treesync core
//!
//! Structural synchronization of tree-shaped JSON documents.
//!
//! This crate provides:
//! - Identity-aware structural diff producing edit scripts
//! - A patch engine and exact script reversal
//! - Documents with a bounded change history, reconciled by rewinding and
//!   replaying so that replicas converge whatever the arrival order
//! - A two-history merge
//!
//! ```
//! use serde_json::json;
//! use treesync_core::{Document, SyncContext};
//!
//! let ctx = SyncContext::default().shared();
//! let mut doc = Document::from_value(ctx, json!({"id": "0", "name": "Test"})).unwrap();
//! let change = doc.change(|v| v["name"] = json!("Foo")).unwrap();
//! assert_eq!(change.diff.len(), 1);
//! assert_eq!(doc.value()["name"], "Foo");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod clock;
pub mod config;
pub mod context;
pub mod diff;
pub mod document;
pub mod error;
pub mod identity;
pub mod merge;
pub mod operation;
pub mod patch;
pub mod path;
pub mod reverse;

pub use change::ChangeSet;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{IdentityStrategy, SyncConfig, DEFAULT_HISTORY_CAPACITY};
pub use context::SyncContext;
pub use diff::diff;
pub use document::{Document, PersistedDocument, PersistedMeta};
pub use error::{Result, SyncError};
pub use identity::Identity;
pub use merge::merge;
pub use operation::{OpKind, Operation};
pub use path::{Path, PathStep};
pub use reverse::reverse;
