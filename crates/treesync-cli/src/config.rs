//! CLI configuration.

use anyhow::{Context, Result};
use std::sync::Arc;
use treesync_core::{IdentityStrategy, SyncConfig, SyncContext};

/// Settings read from the environment.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Synchronization policy
    pub sync: SyncConfig,

    /// Document id used for documents opened by this process
    pub cid: Option<String>,
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TREESYNC_STRICT`: `true` or `false`
    /// - `TREESYNC_ID_FIELDS`: JSON array of accessor paths, e.g. `[["attrs","id"],["id"]]`
    /// - `TREESYNC_HISTORY_CAPACITY`: retained history entries
    /// - `TREESYNC_CID`: document id
    ///
    /// # Errors
    ///
    /// Returns error if a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(strict) = std::env::var("TREESYNC_STRICT") {
            config.sync.strict = strict
                .trim()
                .parse()
                .context("Invalid TREESYNC_STRICT, expected true or false")?;
        }

        if let Ok(fields) = std::env::var("TREESYNC_ID_FIELDS") {
            let paths: Vec<Vec<String>> =
                serde_json::from_str(&fields).context("Invalid TREESYNC_ID_FIELDS JSON")?;
            config.sync.identity = IdentityStrategy::Fields(paths);
        }

        if let Ok(capacity) = std::env::var("TREESYNC_HISTORY_CAPACITY") {
            config.sync.history_capacity = capacity
                .trim()
                .parse()
                .context("Invalid TREESYNC_HISTORY_CAPACITY")?;
        }

        if let Ok(cid) = std::env::var("TREESYNC_CID") {
            config.cid = Some(cid);
        }

        Ok(config)
    }

    /// Build the shared context documents of this process use.
    #[must_use]
    pub fn context(&self) -> Arc<SyncContext> {
        let ctx = SyncContext::new(self.sync.clone());
        match &self.cid {
            Some(cid) => ctx.with_replica_id(cid.clone()).shared(),
            None => ctx.shared(),
        }
    }
}
