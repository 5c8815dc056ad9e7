//! Error kinds shared by the diff, patch and document layers.

/// Errors raised while comparing, patching or persisting documents.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A map compared under strict mode has no configured identity field.
    #[error("couldn't find id for object: {object}")]
    Identity {
        /// Canonical serialization of the offending map
        object: String,
    },

    /// Two arrays were asked whether they denote the same element.
    #[error("can't compare arrays of arrays")]
    UnsupportedComparison,

    /// The roots handed to the diff engine have different shapes.
    #[error("can't diff different types: {left} vs {right}")]
    TypeMismatch {
        /// Shape of the old value
        left: &'static str,
        /// Shape of the new value
        right: &'static str,
    },

    /// A patch step could not locate its target.
    #[error("path {path}: {reason}")]
    PathResolution {
        /// Textual path of the failing operation
        path: String,
        /// What was missing
        reason: String,
    },

    /// Two maps in the same array share an identity.
    #[error("duplicate identifier found: id `{identity}` at path {path}")]
    DuplicateIdentity {
        /// The repeated identity
        identity: String,
        /// Path of the second occurrence
        path: String,
    },

    /// Persisted form could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl SyncError {
    pub(crate) fn path_resolution(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::PathResolution {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = SyncError> = std::result::Result<T, E>;
