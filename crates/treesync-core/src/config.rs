//! Identity and history policy shared by every document of a context.

use crate::identity::Identity;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;

/// Default number of change sets a document retains.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Signature of a pluggable identity accessor.
pub type IdentityFn = dyn Fn(&Map<String, Value>) -> Option<Identity> + Send + Sync;

/// How the identity of a map-typed value is derived.
#[derive(Clone)]
pub enum IdentityStrategy {
    /// Ordered accessor paths; the first one holding a string or number wins.
    ///
    /// A path may reach into nested maps, e.g. `["attrs", "id"]`.
    Fields(Vec<Vec<String>>),
    /// Caller-supplied accessor.
    Custom(Arc<IdentityFn>),
}

impl IdentityStrategy {
    /// Single-level accessor fields, tried in order.
    #[must_use]
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fields(fields.into_iter().map(|f| vec![f.into()]).collect())
    }

    /// Wrap a closure as the identity accessor.
    #[must_use]
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Option<Identity> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Run the accessors against a map.
    #[must_use]
    pub fn extract(&self, map: &Map<String, Value>) -> Option<Identity> {
        match self {
            IdentityStrategy::Fields(paths) => paths.iter().find_map(|path| lookup(map, path)),
            IdentityStrategy::Custom(f) => f(map),
        }
    }
}

fn lookup(map: &Map<String, Value>, path: &[String]) -> Option<Identity> {
    let (last, parents) = path.split_last()?;
    let mut layer = map;
    for key in parents {
        layer = layer.get(key)?.as_object()?;
    }
    match layer.get(last)? {
        Value::String(s) => Some(Identity::new(s.clone())),
        Value::Number(n) => Some(Identity::new(number_text(n))),
        _ => None,
    }
}

/// Integral floats read as integers, so `1` and `1.0` name the same element.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.trunc() == f && f.abs() < 9.0e15 => (f as i64).to_string(),
        _ => n.to_string(),
    }
}

impl Default for IdentityStrategy {
    fn default() -> Self {
        Self::fields(["id", "_id", "uuid", "slug"])
    }
}

impl fmt::Debug for IdentityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityStrategy::Fields(paths) => f.debug_tuple("Fields").field(paths).finish(),
            IdentityStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Process-wide synchronization policy.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fail instead of hashing when a compared map has no identity.
    ///
    /// When off, same-position nested arrays are also treated as the same element.
    pub strict: bool,
    /// Identity accessor strategy
    pub identity: IdentityStrategy,
    /// Retained history window used by `fork` and `load`
    pub history_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            strict: true,
            identity: IdentityStrategy::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SyncConfig {
    /// Default policy with strict mode switched off.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Replace the identity strategy.
    #[must_use]
    pub fn with_identity(mut self, identity: IdentityStrategy) -> Self {
        self.identity = identity;
        self
    }

    /// Replace the history capacity.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}
