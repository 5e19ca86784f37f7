//! Row shapes delivered by the external communication source.
//!
//! These mirror what a device provider returns: nullable columns stay
//! `Option`, type columns stay raw integer codes. Validation happens when
//! the sync engine converts them into cached records.

use serde::{Deserialize, Serialize};

/// A call log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCall {
    pub id: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub cached_name: Option<String>,
    /// Provider call type code (1 = incoming .. 6 = blocked).
    #[serde(rename = "type")]
    pub call_type: i32,
    pub timestamp: i64,
    #[serde(default)]
    pub duration: i64,
}

/// An SMS row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub id: String,
    #[serde(default)]
    pub address: Option<String>,
    /// Provider message type code (1 = inbox .. 6 = queued).
    #[serde(rename = "type")]
    pub message_type: i32,
    pub timestamp: i64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub read: bool,
}

/// A contact row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContact {
    pub contact_id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub primary_number: Option<String>,
    #[serde(default)]
    pub photo_ref: Option<String>,
    #[serde(default)]
    pub last_updated: i64,
    #[serde(default)]
    pub times_contacted: i64,
    #[serde(default)]
    pub last_contacted: i64,
}

/// Timestamp a row is ordered and watermarked by.
pub trait SourceRow {
    fn row_timestamp(&self) -> i64;
}

impl SourceRow for SourceCall {
    fn row_timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl SourceRow for SourceMessage {
    fn row_timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl SourceRow for SourceContact {
    fn row_timestamp(&self) -> i64 {
        self.last_updated
    }
}
