//! In-process source backed by vectors. Used by tests and demos.

use super::{snapshot_since, ChangeSubscription, CommunicationSource, SourceRows};
use crate::{CommlogError, Result};
use commlog_types::{RecordKind, SourceCall, SourceContact, SourceMessage};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct Rows {
    calls: Vec<SourceCall>,
    messages: Vec<SourceMessage>,
    contacts: Vec<SourceContact>,
}

#[derive(Default)]
struct Subscribers {
    calls: Vec<mpsc::UnboundedSender<()>>,
    messages: Vec<mpsc::UnboundedSender<()>>,
    contacts: Vec<mpsc::UnboundedSender<()>>,
}

impl Subscribers {
    fn for_kind(&mut self, kind: RecordKind) -> &mut Vec<mpsc::UnboundedSender<()>> {
        match kind {
            RecordKind::Call => &mut self.calls,
            RecordKind::Message => &mut self.messages,
            RecordKind::Contact => &mut self.contacts,
        }
    }
}

/// Mutable in-memory source.
///
/// Writes do not signal on their own; call [`MemorySource::notify`] to
/// simulate the provider's change notification.
#[derive(Default)]
pub struct MemorySource {
    rows: RwLock<Rows>,
    subscribers: Mutex<Subscribers>,
    unavailable: AtomicBool,
    delay: Mutex<Option<Duration>>,
    queries: [AtomicUsize; 3],
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_call(&self, row: SourceCall) {
        self.write().calls.push(row);
    }

    pub fn push_message(&self, row: SourceMessage) {
        self.write().messages.push(row);
    }

    pub fn push_contact(&self, row: SourceContact) {
        let mut rows = self.write();
        rows.contacts.retain(|c| c.contact_id != row.contact_id);
        rows.contacts.push(row);
    }

    pub fn remove_call(&self, id: &str) -> bool {
        let mut rows = self.write();
        let before = rows.calls.len();
        rows.calls.retain(|c| c.id != id);
        rows.calls.len() != before
    }

    pub fn remove_message(&self, id: &str) -> bool {
        let mut rows = self.write();
        let before = rows.messages.len();
        rows.messages.retain(|m| m.id != id);
        rows.messages.len() != before
    }

    pub fn remove_contact(&self, contact_id: i64) -> bool {
        let mut rows = self.write();
        let before = rows.contacts.len();
        rows.contacts.retain(|c| c.contact_id != contact_id);
        rows.contacts.len() != before
    }

    /// Signal every subscriber of `kind`. Closed subscriptions are pruned.
    pub fn notify(&self, kind: RecordKind) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.for_kind(kind).retain(|tx| tx.send(()).is_ok());
    }

    /// Number of live subscriptions for `kind`.
    pub fn subscriber_count(&self, kind: RecordKind) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let list = subscribers.for_kind(kind);
        list.retain(|tx| !tx.is_closed());
        list.len()
    }

    /// Make every query fail with `SourceUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Block each query for `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// How many queries of `kind` have been answered or refused.
    pub fn query_count(&self, kind: RecordKind) -> usize {
        self.queries[kind_index(kind)].load(Ordering::SeqCst)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Rows> {
        self.rows.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Rows> {
        self.rows.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn before_query(&self, kind: RecordKind) -> Result<()> {
        self.queries[kind_index(kind)].fetch_add(1, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CommlogError::SourceUnavailable(format!(
                "{} provider is not available",
                kind
            )));
        }
        Ok(())
    }
}

fn kind_index(kind: RecordKind) -> usize {
    match kind {
        RecordKind::Call => 0,
        RecordKind::Message => 1,
        RecordKind::Contact => 2,
    }
}

impl CommunicationSource for MemorySource {
    fn query_calls(&self, since: Option<i64>) -> Result<SourceRows<SourceCall>> {
        self.before_query(RecordKind::Call)?;
        Ok(snapshot_since(&self.read().calls, since).into())
    }

    fn query_messages(&self, since: Option<i64>) -> Result<SourceRows<SourceMessage>> {
        self.before_query(RecordKind::Message)?;
        Ok(snapshot_since(&self.read().messages, since).into())
    }

    fn query_contacts(&self, since: Option<i64>) -> Result<SourceRows<SourceContact>> {
        self.before_query(RecordKind::Contact)?;
        Ok(snapshot_since(&self.read().contacts, since).into())
    }

    fn subscribe_to_changes(&self, kind: RecordKind) -> Result<ChangeSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .for_kind(kind)
            .push(tx);
        Ok(ChangeSubscription::new(rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, ts: i64) -> SourceMessage {
        SourceMessage {
            id: id.to_string(),
            address: Some("555".to_string()),
            message_type: 1,
            timestamp: ts,
            body: None,
            read: false,
        }
    }

    #[test]
    fn test_queries_respect_since() {
        let source = MemorySource::new();
        source.push_message(message("m1", 10));
        source.push_message(message("m2", 20));

        assert_eq!(source.query_messages(None).unwrap().rows.len(), 2);
        let newer = source.query_messages(Some(10)).unwrap().rows;
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, "m2");
        assert_eq!(source.query_count(RecordKind::Message), 2);
    }

    #[test]
    fn test_unavailable_source_errors() {
        let source = MemorySource::new();
        source.set_unavailable(true);
        let err = source.query_calls(None).unwrap_err();
        assert!(matches!(err, CommlogError::SourceUnavailable(_)));
    }

    #[test]
    fn test_push_contact_replaces_same_id() {
        let source = MemorySource::new();
        let mut contact = SourceContact {
            contact_id: 1,
            name: Some("Ann".to_string()),
            primary_number: Some("555".to_string()),
            photo_ref: None,
            last_updated: 1,
            times_contacted: 0,
            last_contacted: 0,
        };
        source.push_contact(contact.clone());
        contact.name = Some("Anne".to_string());
        contact.last_updated = 2;
        source.push_contact(contact);

        let contacts = source.query_contacts(None).unwrap().rows;
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].name.as_deref(), Some("Anne"));
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers_of_kind() {
        let source = MemorySource::new();
        let mut calls = source.subscribe_to_changes(RecordKind::Call).unwrap();
        let mut messages = source.subscribe_to_changes(RecordKind::Message).unwrap();

        source.notify(RecordKind::Call);
        assert_eq!(calls.recv().await, Some(()));
        assert!(messages.rx.try_recv().is_err());

        drop(calls);
        assert_eq!(source.subscriber_count(RecordKind::Call), 0);
        assert_eq!(source.subscriber_count(RecordKind::Message), 1);
    }
}
