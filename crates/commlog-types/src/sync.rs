//! Sync reports, outcomes, and the events broadcast to listeners.

use crate::RecordKind;
use serde::{Deserialize, Serialize};

/// What a sync attempt covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum SyncScope {
    /// Complete snapshot, merged into the cache.
    Full,
    /// Complete snapshot replacing the cache.
    Resync,
    /// Delta of one kind since its watermark.
    Incremental(RecordKind),
    /// Delta of every kind, written together.
    IncrementalAll,
}

/// Per-kind counters for one sync attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindReport {
    /// Rows returned by the source.
    pub fetched: usize,
    /// Rows written to the cache.
    pub written: usize,
    /// Rows already cached by id.
    pub skipped_existing: usize,
    /// Rows missing a required field or carrying an unknown type code.
    pub skipped_malformed: usize,
}

/// Result of a completed sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub scope: SyncScope,
    pub calls: KindReport,
    pub messages: KindReport,
    pub contacts: KindReport,
    pub started_at_millis: i64,
    pub finished_at_millis: i64,
}

impl SyncReport {
    pub fn new(scope: SyncScope, started_at_millis: i64) -> Self {
        Self {
            scope,
            calls: KindReport::default(),
            messages: KindReport::default(),
            contacts: KindReport::default(),
            started_at_millis,
            finished_at_millis: started_at_millis,
        }
    }

    pub fn total_written(&self) -> usize {
        self.calls.written + self.messages.written + self.contacts.written
    }
}

/// Outcome of asking the engine to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another sync of this kind was in flight; nothing was done.
    AlreadyRunning { kind: RecordKind },
}

/// Broadcast after every sync attempt that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Completed { report: SyncReport },
    Failed { scope: SyncScope, error: String },
}

/// Counts and watermarks of the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub call_count: u64,
    pub message_count: u64,
    pub contact_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_watermark: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_watermark: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_watermark: Option<i64>,
}

impl StoreStats {
    pub fn is_empty(&self) -> bool {
        self.call_count == 0 && self.message_count == 0 && self.contact_count == 0
    }
}
