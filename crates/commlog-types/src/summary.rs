//! Derived views: per-number summaries and the merged timeline.

use crate::{CallRecord, CallType, MessageRecord};
use serde::{Deserialize, Serialize};

/// Which record kind supplied a summary's most recent activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Call,
    Message,
}

/// One merged row per normalized number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// Join key; doubles as the row's identity.
    pub normalized_number: String,
    /// Raw number of the winning record.
    pub display_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub most_recent_timestamp: i64,
    pub most_recent_kind: ActivityKind,
    /// Set only when the most recent activity is a call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_recent_call_type: Option<CallType>,
    pub call_count: u32,
    pub message_count: u32,
    /// Floor of total call duration over call count; 0 with no calls.
    pub average_call_duration: i64,
    pub contact_saved: bool,
}

/// A single entry in a number's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimelineEntry {
    Call(CallRecord),
    Message(MessageRecord),
}

impl TimelineEntry {
    pub fn timestamp_millis(&self) -> i64 {
        match self {
            TimelineEntry::Call(call) => call.timestamp_millis,
            TimelineEntry::Message(message) => message.timestamp_millis,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            TimelineEntry::Call(call) => &call.id,
            TimelineEntry::Message(message) => &message.id,
        }
    }
}

/// Offset/limit window over a history list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub offset: usize,
    pub limit: usize,
}

impl HistoryPage {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    /// The first `limit` entries.
    pub fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }

    /// The window following this one.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.limit,
            limit: self.limit,
        }
    }
}
