//! External record sources.
//!
//! A source is the system of record. Queries are blocking and run on the
//! blocking pool; change subscriptions deliver a bare "something changed"
//! signal per kind.

mod json_dir;
mod memory;

pub use json_dir::JsonDirSource;
pub use memory::MemorySource;

use crate::Result;
use commlog_types::{RecordKind, SourceCall, SourceContact, SourceMessage, SourceRow};
use std::any::Any;
use tokio::sync::mpsc;

/// Provider of calls, messages and contacts.
///
/// Each query returns rows with a timestamp strictly greater than `since`
/// (all rows when `None`), newest first.
pub trait CommunicationSource: Send + Sync + 'static {
    fn query_calls(&self, since: Option<i64>) -> Result<SourceRows<SourceCall>>;

    fn query_messages(&self, since: Option<i64>) -> Result<SourceRows<SourceMessage>>;

    /// Contacts are filtered on their last-updated time.
    fn query_contacts(&self, since: Option<i64>) -> Result<SourceRows<SourceContact>>;

    /// Register for change signals on one kind. Signals stop when the
    /// returned subscription is dropped.
    fn subscribe_to_changes(&self, kind: RecordKind) -> Result<ChangeSubscription>;
}

/// Answer to one source query.
#[derive(Debug, Clone)]
pub struct SourceRows<T> {
    pub rows: Vec<T>,
    /// Rows the source holds but could not decode at all.
    pub unreadable: usize,
}

impl<T> SourceRows<T> {
    pub fn new(rows: Vec<T>, unreadable: usize) -> Self {
        Self { rows, unreadable }
    }
}

impl<T> Default for SourceRows<T> {
    fn default() -> Self {
        Self::new(Vec::new(), 0)
    }
}

impl<T> From<Vec<T>> for SourceRows<T> {
    fn from(rows: Vec<T>) -> Self {
        Self::new(rows, 0)
    }
}

/// Receiving end of a source's change signals.
pub struct ChangeSubscription {
    rx: mpsc::UnboundedReceiver<()>,
    // Keeps the underlying watcher alive for the lifetime of the subscription.
    _guard: Option<Box<dyn Any + Send>>,
}

impl ChangeSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<()>) -> Self {
        Self { rx, _guard: None }
    }

    pub fn with_guard<G: Any + Send>(rx: mpsc::UnboundedReceiver<()>, guard: G) -> Self {
        Self {
            rx,
            _guard: Some(Box::new(guard)),
        }
    }

    /// Wait for the next signal. `None` once the source stops signalling.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

impl std::fmt::Debug for ChangeSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSubscription")
            .field("guarded", &self._guard.is_some())
            .finish()
    }
}

/// Rows newer than `since`, newest first.
pub(crate) fn snapshot_since<T: SourceRow + Clone>(rows: &[T], since: Option<i64>) -> Vec<T> {
    let mut out: Vec<T> = rows
        .iter()
        .filter(|row| since.is_none_or(|s| row.row_timestamp() > s))
        .cloned()
        .collect();
    out.sort_by(|a, b| b.row_timestamp().cmp(&a.row_timestamp()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str, ts: i64) -> SourceCall {
        SourceCall {
            id: id.to_string(),
            number: Some("555".to_string()),
            cached_name: None,
            call_type: 1,
            timestamp: ts,
            duration: 0,
        }
    }

    #[test]
    fn test_snapshot_since_is_strict_and_sorted() {
        let rows = vec![call("a", 100), call("b", 300), call("c", 200)];

        let all = snapshot_since(&rows, None);
        let ids: Vec<&str> = all.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);

        let newer = snapshot_since(&rows, Some(200));
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, "b");

        assert!(snapshot_since(&rows, Some(300)).is_empty());
    }
}
