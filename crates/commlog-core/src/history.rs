//! Per-number history: calls and messages interleaved, newest first.

use crate::db::RecordStore;
use crate::normalize::normalize;
use crate::Result;
use commlog_types::{CallRecord, HistoryPage, MessageRecord, TimelineEntry};
use std::sync::Arc;

/// Merge two newest-first lists into one newest-first timeline.
///
/// On equal timestamps the call comes first.
pub fn merge_timeline(calls: Vec<CallRecord>, messages: Vec<MessageRecord>) -> Vec<TimelineEntry> {
    let mut merged = Vec::with_capacity(calls.len() + messages.len());
    let mut calls = calls.into_iter().peekable();
    let mut messages = messages.into_iter().peekable();

    loop {
        let take_call = match (calls.peek(), messages.peek()) {
            (Some(c), Some(m)) => c.timestamp_millis >= m.timestamp_millis,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };

        let entry = if take_call {
            calls.next().map(TimelineEntry::Call)
        } else {
            messages.next().map(TimelineEntry::Message)
        };
        merged.extend(entry);
    }

    merged
}

/// Reads a number's history from the store on demand.
#[derive(Clone)]
pub struct HistoryAssembler {
    store: Arc<RecordStore>,
}

impl HistoryAssembler {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Full history for a raw or already-normalized number.
    pub fn history(&self, number: &str) -> Result<Vec<TimelineEntry>> {
        self.store.history(&normalize(number), None)
    }

    /// One offset/limit window of a number's history.
    ///
    /// Windows are independent queries, not a cursor over a snapshot.
    pub fn page(&self, number: &str, page: HistoryPage) -> Result<Vec<TimelineEntry>> {
        if page.limit == 0 {
            return Ok(Vec::new());
        }
        self.store.history(&normalize(number), Some(page))
    }

    /// The `limit` most recent entries.
    pub fn recent(&self, number: &str, limit: usize) -> Result<Vec<TimelineEntry>> {
        self.page(number, HistoryPage::first(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordBatch;
    use commlog_types::{CallType, MessageType};

    fn call(id: &str, ts: i64) -> CallRecord {
        CallRecord {
            id: id.to_string(),
            raw_number: "(555) 123-4567".to_string(),
            normalized_number: "5551234567".to_string(),
            cached_name: None,
            call_type: CallType::Outgoing,
            timestamp_millis: ts,
            duration_seconds: 1,
            contact_saved: false,
            synced_at_millis: 0,
        }
    }

    fn message(id: &str, ts: i64) -> MessageRecord {
        MessageRecord {
            id: id.to_string(),
            raw_address: "5551234567".to_string(),
            normalized_address: "5551234567".to_string(),
            name: None,
            message_type: MessageType::Inbox,
            timestamp_millis: ts,
            body: format!("body {}", id),
            contact_saved: false,
            read: true,
            synced_at_millis: 0,
        }
    }

    #[test]
    fn test_merge_timeline_orders_and_breaks_ties() {
        let merged = merge_timeline(
            vec![call("c3", 300), call("c1", 100)],
            vec![message("m3", 300), message("m2", 200)],
        );
        let ids: Vec<&str> = merged.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["c3", "m3", "m2", "c1"]);
    }

    #[test]
    fn test_merge_timeline_one_side_empty() {
        let merged = merge_timeline(Vec::new(), vec![message("m1", 5)]);
        assert_eq!(merged.len(), 1);
        assert!(matches!(merged[0], TimelineEntry::Message(_)));
        assert!(merge_timeline(Vec::new(), Vec::new()).is_empty());
    }

    #[test]
    fn test_assembler_normalizes_and_pages() {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        store
            .upsert_many(&RecordBatch {
                calls: vec![call("c1", 100), call("c2", 400)],
                messages: vec![message("m1", 200), message("m2", 300)],
                ..Default::default()
            })
            .unwrap();

        let assembler = HistoryAssembler::new(store.clone());
        let all = assembler.history("+1 (555) 123-4567").unwrap();
        // "+1" prefix changes the key: no match.
        assert!(all.is_empty());

        let all = assembler.history("555.123.4567").unwrap();
        assert_eq!(all.len(), 4);

        let first = assembler.page("5551234567", HistoryPage::first(2)).unwrap();
        let ids: Vec<&str> = first.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["c2", "m2"]);

        let second = assembler
            .page("5551234567", HistoryPage::first(2).next())
            .unwrap();
        let ids: Vec<&str> = second.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["m1", "c1"]);

        assert!(assembler.recent("5551234567", 0).unwrap().is_empty());
    }

    #[test]
    fn test_pages_are_requeried() {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        store
            .upsert_many(&RecordBatch {
                calls: vec![call("c1", 100), call("c2", 200)],
                ..Default::default()
            })
            .unwrap();
        let assembler = HistoryAssembler::new(store.clone());

        let first = assembler.recent("5551234567", 1).unwrap();
        assert_eq!(first[0].id(), "c2");

        // A newer record arrives between windows and shifts the second one.
        store
            .upsert_many(&RecordBatch {
                messages: vec![message("m9", 900)],
                ..Default::default()
            })
            .unwrap();
        let second = assembler
            .page("5551234567", HistoryPage::first(1).next())
            .unwrap();
        assert_eq!(second[0].id(), "c2");
    }
}
