//! Messages pushed to WebSocket clients.

use crate::{AggregateSummary, SyncEvent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// Full summary snapshot, sent on connect and after every change.
    Summaries { summaries: Vec<AggregateSummary> },
    /// A sync finished or failed.
    Sync { event: SyncEvent },
}
