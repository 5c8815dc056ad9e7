//! Shared synchronization context.
//!
//! Bundles the policy, the timestamp source and the sequence counter that
//! every document of a process reads. A context is built once and handed to
//! documents behind an `Arc`; afterwards only the counter changes.

use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Configuration, clock and counters shared by a set of documents.
#[derive(Debug)]
pub struct SyncContext {
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    seq: AtomicU64,
    replica_id: String,
}

impl SyncContext {
    /// Context reading the system clock, with a random replica id.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Context with an injected clock.
    #[must_use]
    pub fn with_clock(config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            seq: AtomicU64::new(0),
            replica_id: Uuid::new_v4().to_string(),
        }
    }

    /// Override the default document id handed to new documents.
    #[must_use]
    pub fn with_replica_id(mut self, replica_id: impl Into<String>) -> Self {
        self.replica_id = replica_id.into();
        self
    }

    /// Wrap in an `Arc` for sharing between documents.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The synchronization policy.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Default `cid` for documents created in this context.
    #[must_use]
    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    /// Current timestamp from the configured clock.
    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Next value of the monotonic sequence counter.
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SyncContext {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn sequence_is_monotonic() {
        let ctx = SyncContext::default();
        let a = ctx.next_seq();
        let b = ctx.next_seq();
        assert!(b > a);
    }

    #[test]
    fn injected_clock_is_used() {
        let clock = Arc::new(ManualClock::new(77));
        let ctx = SyncContext::with_clock(SyncConfig::default(), clock.clone());
        assert_eq!(ctx.now_ms(), 77);
        clock.advance(3);
        assert_eq!(ctx.now_ms(), 80);
    }

    #[test]
    fn replica_id_override() {
        let ctx = SyncContext::default().with_replica_id("replica-a");
        assert_eq!(ctx.replica_id(), "replica-a");
    }
}
