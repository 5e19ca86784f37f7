//! Per-number summaries and their live view.
//!
//! Calls and messages are grouped independently by normalized key, then
//! merged: the group with the strictly newer timestamp supplies the display
//! fields, and calls win exact ties.

use crate::db::{RecordStore, StoreChange};
use crate::Result;
use commlog_types::{ActivityKind, AggregateQuery, AggregateSummary, CallType};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, trace, warn};

/// Calls grouped under one normalized number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallGroup {
    pub normalized_number: String,
    /// Display fields of the most recent call.
    pub raw_number: String,
    pub cached_name: Option<String>,
    pub call_type: CallType,
    pub latest_timestamp: i64,
    pub call_count: u32,
    pub total_duration: i64,
    pub contact_saved: bool,
}

/// Messages grouped under one normalized address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageGroup {
    pub normalized_address: String,
    /// Display fields of the most recent message.
    pub raw_address: String,
    pub name: Option<String>,
    pub latest_timestamp: i64,
    pub message_count: u32,
    pub contact_saved: bool,
}

/// Floor of `total / count`, 0 when there are no calls.
pub fn average_duration(total: i64, count: u32) -> i64 {
    if count == 0 {
        return 0;
    }
    total.div_euclid(count as i64)
}

/// Merge call and message groups into summaries, most recent first.
///
/// Keys present in neither input are never emitted.
pub fn merge_groups(calls: Vec<CallGroup>, messages: Vec<MessageGroup>) -> Vec<AggregateSummary> {
    let mut call_map: HashMap<String, CallGroup> = calls
        .into_iter()
        .map(|g| (g.normalized_number.clone(), g))
        .collect();
    let mut message_map: HashMap<String, MessageGroup> = messages
        .into_iter()
        .map(|g| (g.normalized_address.clone(), g))
        .collect();

    let keys: BTreeSet<String> = call_map.keys().chain(message_map.keys()).cloned().collect();

    let mut summaries: Vec<AggregateSummary> = keys
        .into_iter()
        .filter_map(|key| {
            let call = call_map.remove(&key);
            let message = message_map.remove(&key);
            summarize(key, call, message)
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.most_recent_timestamp
            .cmp(&a.most_recent_timestamp)
            .then_with(|| a.normalized_number.cmp(&b.normalized_number))
    });
    summaries
}

fn summarize(
    key: String,
    call: Option<CallGroup>,
    message: Option<MessageGroup>,
) -> Option<AggregateSummary> {
    let call_count = call.as_ref().map(|c| c.call_count).unwrap_or(0);
    let total_duration = call.as_ref().map(|c| c.total_duration).unwrap_or(0);
    let message_count = message.as_ref().map(|m| m.message_count).unwrap_or(0);
    let average_call_duration = average_duration(total_duration, call_count);

    match (call, message) {
        (Some(c), Some(m)) if m.latest_timestamp > c.latest_timestamp => Some(AggregateSummary {
            normalized_number: key,
            display_number: m.raw_address,
            display_name: m.name,
            most_recent_timestamp: m.latest_timestamp,
            most_recent_kind: ActivityKind::Message,
            most_recent_call_type: None,
            call_count,
            message_count,
            average_call_duration,
            contact_saved: m.contact_saved,
        }),
        // Calls win exact ties.
        (Some(c), _) => Some(AggregateSummary {
            normalized_number: key,
            display_number: c.raw_number,
            display_name: c.cached_name,
            most_recent_timestamp: c.latest_timestamp,
            most_recent_kind: ActivityKind::Call,
            most_recent_call_type: Some(c.call_type),
            call_count,
            message_count,
            average_call_duration,
            contact_saved: c.contact_saved,
        }),
        (None, Some(m)) => Some(AggregateSummary {
            normalized_number: key,
            display_number: m.raw_address,
            display_name: m.name,
            most_recent_timestamp: m.latest_timestamp,
            most_recent_kind: ActivityKind::Message,
            most_recent_call_type: None,
            call_count,
            message_count,
            average_call_duration,
            contact_saved: m.contact_saved,
        }),
        (None, None) => None,
    }
}

/// A continuously recomputed snapshot of every summary.
///
/// Dropping it stops recomputation and ends every stream handed out; the
/// store is untouched.
pub struct LiveAggregates {
    rx: watch::Receiver<Arc<Vec<AggregateSummary>>>,
    task: JoinHandle<()>,
}

impl LiveAggregates {
    /// Compute the first snapshot and start following store changes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<RecordStore>, query: AggregateQuery) -> Result<Self> {
        // Subscribe before the first read so no change slips in between.
        let changes = store.subscribe();
        let initial = store.aggregates(query)?;
        let (tx, rx) = watch::channel(Arc::new(initial));

        let task = tokio::spawn(follow_changes(store, query, changes, tx));
        Ok(Self { rx, task })
    }

    /// The latest snapshot.
    pub fn current(&self) -> Arc<Vec<AggregateSummary>> {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. `None` once recomputation has stopped.
    pub async fn changed(&mut self) -> Option<Arc<Vec<AggregateSummary>>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// An independent receiver for another consumer.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<AggregateSummary>>> {
        self.rx.clone()
    }

    /// Stream yielding the current snapshot, then one per change.
    pub fn stream(&self) -> WatchStream<Arc<Vec<AggregateSummary>>> {
        WatchStream::new(self.rx.clone())
    }
}

impl Drop for LiveAggregates {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn follow_changes(
    store: Arc<RecordStore>,
    query: AggregateQuery,
    mut changes: broadcast::Receiver<StoreChange>,
    tx: watch::Sender<Arc<Vec<AggregateSummary>>>,
) {
    loop {
        let mut dirty = match changes.recv().await {
            Ok(change) => change.touches_activity(),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                trace!(target: "commlog::aggregate", "Skipped {} store changes", skipped);
                true
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        // Coalesce a burst of changes into one recompute.
        loop {
            match changes.try_recv() {
                Ok(change) => dirty |= change.touches_activity(),
                Err(broadcast::error::TryRecvError::Lagged(_)) => dirty = true,
                Err(_) => break,
            }
        }

        if !dirty {
            continue;
        }

        let store = store.clone();
        match tokio::task::spawn_blocking(move || store.aggregates(query)).await {
            Ok(Ok(summaries)) => {
                debug!(
                    target: "commlog::aggregate",
                    "Recomputed {} summaries",
                    summaries.len()
                );
                if tx.send(Arc::new(summaries)).is_err() {
                    break;
                }
            }
            Ok(Err(e)) => {
                // Keep serving the previous snapshot.
                warn!(target: "commlog::aggregate", "Failed to recompute summaries: {}", e);
            }
            Err(e) => {
                warn!(target: "commlog::aggregate", "Summary task failed: {}", e);
            }
        }
    }
}
