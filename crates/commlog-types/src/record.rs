//! Cached record kinds and their enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The three record kinds held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Call,
    Message,
    Contact,
}

impl RecordKind {
    /// All kinds, in the order a full sync processes them.
    pub const ALL: [RecordKind; 3] = [RecordKind::Contact, RecordKind::Call, RecordKind::Message];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Call => "call",
            RecordKind::Message => "message",
            RecordKind::Contact => "contact",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "call" | "calls" => Ok(RecordKind::Call),
            "message" | "messages" | "sms" => Ok(RecordKind::Message),
            "contact" | "contacts" => Ok(RecordKind::Contact),
            _ => Err(format!("Invalid record kind: '{}'", s)),
        }
    }
}

/// Direction/outcome of a call, mirroring the provider's type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    Incoming,
    Outgoing,
    Missed,
    Voicemail,
    Rejected,
    Blocked,
}

impl CallType {
    /// Map a provider type code. Unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(CallType::Incoming),
            2 => Some(CallType::Outgoing),
            3 => Some(CallType::Missed),
            4 => Some(CallType::Voicemail),
            5 => Some(CallType::Rejected),
            6 => Some(CallType::Blocked),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            CallType::Incoming => 1,
            CallType::Outgoing => 2,
            CallType::Missed => 3,
            CallType::Voicemail => 4,
            CallType::Rejected => 5,
            CallType::Blocked => 6,
        }
    }
}

/// SMS box a message lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Inbox,
    Sent,
    Draft,
    Outbox,
    Failed,
    Queued,
}

impl MessageType {
    /// Map a provider type code. Unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(MessageType::Inbox),
            2 => Some(MessageType::Sent),
            3 => Some(MessageType::Draft),
            4 => Some(MessageType::Outbox),
            5 => Some(MessageType::Failed),
            6 => Some(MessageType::Queued),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            MessageType::Inbox => 1,
            MessageType::Sent => 2,
            MessageType::Draft => 3,
            MessageType::Outbox => 4,
            MessageType::Failed => 5,
            MessageType::Queued => 6,
        }
    }
}

/// A cached call log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Source-provided stable id.
    pub id: String,
    /// Number as the source reported it.
    pub raw_number: String,
    /// Digits-only join key.
    pub normalized_number: String,
    /// Name the source cached alongside the call, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_name: Option<String>,
    pub call_type: CallType,
    pub timestamp_millis: i64,
    pub duration_seconds: i64,
    /// Whether the number matches a cached contact.
    pub contact_saved: bool,
    /// When this row was written to the cache.
    pub synced_at_millis: i64,
}

/// A cached SMS entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub raw_address: String,
    pub normalized_address: String,
    /// Usually absent: the SMS provider carries no cached name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub message_type: MessageType,
    pub timestamp_millis: i64,
    pub body: String,
    pub contact_saved: bool,
    pub read: bool,
    pub synced_at_millis: i64,
}

/// A cached contact, keyed by the source's contact id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub contact_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// First phone number found for the contact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_ref: Option<String>,
    pub last_updated_millis: i64,
    pub times_contacted: i64,
    pub last_contacted_millis: i64,
    pub synced_at_millis: i64,
}
