//! Pulls records from a [`CommunicationSource`] into the [`RecordStore`].
//!
//! A sync runs in two phases: every requested kind is fetched (on the
//! blocking pool, bounded by a timeout), then everything is written in one
//! store transaction. A failure in either phase leaves the store and its
//! watermarks untouched. At most one sync per kind is in flight; a request
//! that finds its kind busy is dropped with [`SyncOutcome::AlreadyRunning`].

use crate::db::{RecordBatch, RecordStore, WriteMode};
use crate::normalize::normalize;
use crate::source::{CommunicationSource, SourceRows};
use crate::{CommlogError, Result};
use commlog_types::{
    CallRecord, CallType, ContactRecord, KindReport, MessageRecord, MessageType, RecordKind,
    SourceCall, SourceContact, SourceMessage, SyncEvent, SyncOutcome, SyncReport, SyncScope,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tuning for the sync engine and the observers driving it.
#[derive(Debug, Clone, Copy)]
pub struct SyncConfig {
    /// Upper bound on one source query.
    pub fetch_timeout: Duration,
    /// Quiet interval of the change observers.
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            debounce: Duration::from_millis(1000),
        }
    }
}

#[derive(Default)]
struct KindLocks {
    call: Mutex<()>,
    message: Mutex<()>,
    contact: Mutex<()>,
}

impl KindLocks {
    fn get(&self, kind: RecordKind) -> &Mutex<()> {
        match kind {
            RecordKind::Call => &self.call,
            RecordKind::Message => &self.message,
            RecordKind::Contact => &self.contact,
        }
    }

    /// Take every lock in `kinds` or none. Returns the first busy kind.
    fn try_acquire(
        &self,
        kinds: &[RecordKind],
    ) -> std::result::Result<Vec<MutexGuard<'_, ()>>, RecordKind> {
        let mut guards = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            match self.get(kind).try_lock() {
                Ok(guard) => guards.push(guard),
                Err(_) => return Err(kind),
            }
        }
        Ok(guards)
    }
}

/// Rows fetched in phase one of a sync.
struct Fetched {
    calls: SourceRows<SourceCall>,
    messages: SourceRows<SourceMessage>,
    contacts: SourceRows<SourceContact>,
}

pub struct SyncEngine {
    store: Arc<RecordStore>,
    source: Arc<dyn CommunicationSource>,
    config: SyncConfig,
    locks: KindLocks,
    events: broadcast::Sender<SyncEvent>,
}

impl SyncEngine {
    pub fn new(
        store: Arc<RecordStore>,
        source: Arc<dyn CommunicationSource>,
        config: SyncConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            source,
            config,
            locks: KindLocks::default(),
            events,
        }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn source(&self) -> &Arc<dyn CommunicationSource> {
        &self.source
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Subscribe to completion and failure events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Fetch everything and merge it into the cache.
    ///
    /// The contact table is replaced with the fetched set; calls and
    /// messages are upserted and flagged against it.
    pub async fn full_sync(&self) -> Result<SyncOutcome> {
        self.run(SyncScope::Full).await
    }

    /// Drop every cached record and reload a fresh full snapshot.
    pub async fn resync(&self) -> Result<SyncOutcome> {
        self.run(SyncScope::Resync).await
    }

    /// Fetch records of one kind newer than its watermark.
    pub async fn incremental_sync(&self, kind: RecordKind) -> Result<SyncOutcome> {
        self.run(SyncScope::Incremental(kind)).await
    }

    /// Incremental sync of every kind, written in a single transaction.
    pub async fn incremental_sync_all(&self) -> Result<SyncOutcome> {
        self.run(SyncScope::IncrementalAll).await
    }

    /// Full sync on an empty cache, incremental otherwise.
    pub async fn sync_on_start(&self) -> Result<SyncOutcome> {
        let stats = self.with_store(|store| store.stats()).await?;
        if stats.is_empty() {
            info!(target: "commlog::sync", "Cache is empty, running full sync");
            self.full_sync().await
        } else {
            self.incremental_sync_all().await
        }
    }

    async fn run(&self, scope: SyncScope) -> Result<SyncOutcome> {
        let kinds = scope_kinds(scope);
        let _guards = match self.locks.try_acquire(&kinds) {
            Ok(guards) => guards,
            Err(kind) => {
                debug!(
                    target: "commlog::sync",
                    "Dropping {:?} sync: {} sync already running",
                    scope,
                    kind
                );
                return Ok(SyncOutcome::AlreadyRunning { kind });
            }
        };

        let started = now_millis();
        match self.sync_locked(scope, &kinds, started).await {
            Ok(report) => {
                info!(
                    target: "commlog::sync",
                    "{:?} sync wrote {} records ({} calls, {} messages, {} contacts) in {}ms",
                    scope,
                    report.total_written(),
                    report.calls.written,
                    report.messages.written,
                    report.contacts.written,
                    report.finished_at_millis - report.started_at_millis
                );
                let _ = self.events.send(SyncEvent::Completed {
                    report: report.clone(),
                });
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                warn!(target: "commlog::sync", "{:?} sync failed: {}", scope, e);
                let _ = self.events.send(SyncEvent::Failed {
                    scope,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn sync_locked(
        &self,
        scope: SyncScope,
        kinds: &[RecordKind],
        started: i64,
    ) -> Result<SyncReport> {
        let incremental = matches!(
            scope,
            SyncScope::Incremental(_) | SyncScope::IncrementalAll
        );
        let [calls_since, messages_since, contacts_since] = if incremental {
            self.with_store(|store| {
                Ok([
                    store.watermark(RecordKind::Call)?,
                    store.watermark(RecordKind::Message)?,
                    store.watermark(RecordKind::Contact)?,
                ])
            })
            .await?
        } else {
            [None; 3]
        };

        let fetched = self
            .fetch(kinds, calls_since, messages_since, contacts_since)
            .await?;

        let mut report = SyncReport::new(scope, started);
        let synced_at = now_millis();
        let calls = tally(fetched.calls, &mut report.calls);
        let messages = tally(fetched.messages, &mut report.messages);
        let contacts = tally(fetched.contacts, &mut report.contacts);

        let mut batch = RecordBatch {
            calls: convert_calls(calls, synced_at, &mut report.calls),
            messages: convert_messages(messages, synced_at, &mut report.messages),
            contacts: contacts
                .into_iter()
                .map(|row| contact_from_source(row, synced_at))
                .collect(),
        };
        let mode = match scope {
            SyncScope::Full => WriteMode::ReplaceContacts,
            SyncScope::Resync => WriteMode::ReplaceAll,
            SyncScope::Incremental(_) | SyncScope::IncrementalAll => WriteMode::Upsert,
        };

        // Phase two. Contact flags are assigned inside the write transaction.
        let mut report = self
            .with_store(move |store| {
                if incremental {
                    report.calls.skipped_existing =
                        drop_cached(store, RecordKind::Call, &mut batch.calls, |c| {
                            c.id.as_str()
                        })?;
                    report.messages.skipped_existing =
                        drop_cached(store, RecordKind::Message, &mut batch.messages, |m| {
                            m.id.as_str()
                        })?;
                }
                report.calls.written = batch.calls.len();
                report.messages.written = batch.messages.len();
                report.contacts.written = batch.contacts.len();

                if mode != WriteMode::Upsert || !batch.is_empty() {
                    store.apply(&batch, mode)?;
                }
                Ok(report)
            })
            .await?;

        report.finished_at_millis = now_millis();
        Ok(report)
    }

    /// Run blocking store work on the blocking pool.
    async fn with_store<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&RecordStore) -> Result<T> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || work(&store)).await?
    }

    /// Phase one: query every requested kind concurrently.
    async fn fetch(
        &self,
        kinds: &[RecordKind],
        calls_since: Option<i64>,
        messages_since: Option<i64>,
        contacts_since: Option<i64>,
    ) -> Result<Fetched> {
        let wants = |kind| kinds.contains(&kind);

        let calls = async {
            if wants(RecordKind::Call) {
                self.query(RecordKind::Call, move |s| s.query_calls(calls_since))
                    .await
            } else {
                Ok(SourceRows::default())
            }
        };
        let messages = async {
            if wants(RecordKind::Message) {
                self.query(RecordKind::Message, move |s| {
                    s.query_messages(messages_since)
                })
                .await
            } else {
                Ok(SourceRows::default())
            }
        };
        let contacts = async {
            if wants(RecordKind::Contact) {
                self.query(RecordKind::Contact, move |s| {
                    s.query_contacts(contacts_since)
                })
                .await
            } else {
                Ok(SourceRows::default())
            }
        };

        let (calls, messages, contacts) = tokio::try_join!(calls, messages, contacts)?;
        Ok(Fetched {
            calls,
            messages,
            contacts,
        })
    }

    /// Run one blocking source query under the fetch timeout.
    ///
    /// A timed-out query keeps running on its blocking thread; its result is
    /// discarded.
    async fn query<T, F>(&self, kind: RecordKind, query: F) -> Result<SourceRows<T>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn CommunicationSource) -> Result<SourceRows<T>> + Send + 'static,
    {
        let source = self.source.clone();
        let task = tokio::task::spawn_blocking(move || query(source.as_ref()));

        match tokio::time::timeout(self.config.fetch_timeout, task).await {
            Ok(joined) => {
                let rows = joined??;
                debug!(
                    target: "commlog::sync",
                    "Fetched {} {} rows ({} unreadable)",
                    rows.rows.len(),
                    kind,
                    rows.unreadable
                );
                Ok(rows)
            }
            Err(_) => Err(CommlogError::SourceUnavailable(format!(
                "{} query timed out after {}ms",
                kind,
                self.config.fetch_timeout.as_millis()
            ))),
        }
    }
}

fn scope_kinds(scope: SyncScope) -> Vec<RecordKind> {
    match scope {
        SyncScope::Incremental(kind) => vec![kind],
        SyncScope::Full | SyncScope::Resync | SyncScope::IncrementalAll => {
            RecordKind::ALL.to_vec()
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn malformed(kind: RecordKind, id: &str, reason: &str) -> CommlogError {
    CommlogError::MalformedRecord {
        kind,
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Convert a call row. Rows without a number or with an unknown type code
/// are malformed. `contact_saved` is left for the store to assign.
pub(crate) fn call_from_source(row: SourceCall, synced_at: i64) -> Result<CallRecord> {
    let Some(raw_number) = row.number else {
        return Err(malformed(RecordKind::Call, &row.id, "missing number"));
    };
    let Some(call_type) = CallType::from_code(row.call_type) else {
        return Err(malformed(
            RecordKind::Call,
            &row.id,
            &format!("unknown call type {}", row.call_type),
        ));
    };

    let normalized_number = normalize(&raw_number);
    Ok(CallRecord {
        id: row.id,
        contact_saved: false,
        raw_number,
        normalized_number,
        cached_name: row.cached_name,
        call_type,
        timestamp_millis: row.timestamp,
        duration_seconds: row.duration,
        synced_at_millis: synced_at,
    })
}

/// Convert a message row. A missing body is stored as empty.
pub(crate) fn message_from_source(row: SourceMessage, synced_at: i64) -> Result<MessageRecord> {
    let Some(raw_address) = row.address else {
        return Err(malformed(RecordKind::Message, &row.id, "missing address"));
    };
    let Some(message_type) = MessageType::from_code(row.message_type) else {
        return Err(malformed(
            RecordKind::Message,
            &row.id,
            &format!("unknown message type {}", row.message_type),
        ));
    };

    let normalized_address = normalize(&raw_address);
    Ok(MessageRecord {
        id: row.id,
        contact_saved: false,
        raw_address,
        normalized_address,
        name: None,
        message_type,
        timestamp_millis: row.timestamp,
        body: row.body.unwrap_or_default(),
        read: row.read,
        synced_at_millis: synced_at,
    })
}

pub(crate) fn contact_from_source(row: SourceContact, synced_at: i64) -> ContactRecord {
    ContactRecord {
        contact_id: row.contact_id,
        name: row.name,
        primary_phone_number: row.primary_number,
        photo_ref: row.photo_ref,
        last_updated_millis: row.last_updated,
        times_contacted: row.times_contacted,
        last_contacted_millis: row.last_contacted,
        synced_at_millis: synced_at,
    }
}

/// Record what the source returned and unwrap its readable rows.
fn tally<T>(fetched: SourceRows<T>, report: &mut KindReport) -> Vec<T> {
    report.fetched = fetched.rows.len() + fetched.unreadable;
    report.skipped_malformed = fetched.unreadable;
    fetched.rows
}

/// Remove records already cached by id. Returns how many were removed.
fn drop_cached<T>(
    store: &RecordStore,
    kind: RecordKind,
    records: &mut Vec<T>,
    id: impl Fn(&T) -> &str,
) -> Result<usize> {
    let ids: Vec<String> = records.iter().map(|r| id(r).to_string()).collect();
    let existing = store.existing_ids(kind, &ids)?;
    records.retain(|r| !existing.contains(id(r)));
    Ok(existing.len())
}

fn keep_valid<T>(result: Result<T>, report: &mut KindReport) -> Option<T> {
    match result {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(target: "commlog::sync", "Skipping row: {}", e);
            report.skipped_malformed += 1;
            None
        }
    }
}

fn convert_calls(
    rows: Vec<SourceCall>,
    synced_at: i64,
    report: &mut KindReport,
) -> Vec<CallRecord> {
    rows.into_iter()
        .filter_map(|row| keep_valid(call_from_source(row, synced_at), report))
        .collect()
}

fn convert_messages(
    rows: Vec<SourceMessage>,
    synced_at: i64,
    report: &mut KindReport,
) -> Vec<MessageRecord> {
    rows.into_iter()
        .filter_map(|row| keep_valid(message_from_source(row, synced_at), report))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ChangeSubscription, JsonDirSource, MemorySource};
    use commlog_types::AggregateQuery;

    fn source_call(id: &str, number: &str, ts: i64, duration: i64) -> SourceCall {
        SourceCall {
            id: id.to_string(),
            number: Some(number.to_string()),
            cached_name: None,
            call_type: 1,
            timestamp: ts,
            duration,
        }
    }

    fn source_message(id: &str, address: &str, ts: i64) -> SourceMessage {
        SourceMessage {
            id: id.to_string(),
            address: Some(address.to_string()),
            message_type: 1,
            timestamp: ts,
            body: Some(format!("body {}", id)),
            read: false,
        }
    }

    fn source_contact(id: i64, number: &str, updated: i64) -> SourceContact {
        SourceContact {
            contact_id: id,
            name: Some(format!("Contact {}", id)),
            primary_number: Some(number.to_string()),
            photo_ref: None,
            last_updated: updated,
            times_contacted: 0,
            last_contacted: 0,
        }
    }

    fn create_engine(config: SyncConfig) -> (Arc<SyncEngine>, Arc<MemorySource>) {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let source = Arc::new(MemorySource::new());
        let engine = Arc::new(SyncEngine::new(store, source.clone(), config));
        (engine, source)
    }

    fn completed(outcome: SyncOutcome) -> SyncReport {
        match outcome {
            SyncOutcome::Completed(report) => report,
            other => panic!("expected completed sync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_sync_of_empty_source() {
        let (engine, _source) = create_engine(SyncConfig::default());

        let report = completed(engine.full_sync().await.unwrap());
        assert_eq!(report.total_written(), 0);

        let stats = engine.store().stats().unwrap();
        assert!(stats.is_empty());
        assert!(engine
            .store()
            .aggregates(AggregateQuery::default())
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_full_sync_tags_contact_saved() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_contact(source_contact(1, "555-123-4567", 10));
        source.push_call(source_call("c1", "+1 (555) 123-4567", 100, 30));
        source.push_call(source_call("c2", "999", 110, 5));
        source.push_message(source_message("m1", "5551234567", 200));

        let report = completed(engine.full_sync().await.unwrap());
        assert_eq!(report.calls.written, 2);
        assert_eq!(report.messages.written, 1);
        assert_eq!(report.contacts.written, 1);

        let store = engine.store();
        assert!(store.get_call("c1").unwrap().unwrap().contact_saved);
        assert!(!store.get_call("c2").unwrap().unwrap().contact_saved);
        assert!(store.get_message("m1").unwrap().unwrap().contact_saved);
        assert_eq!(store.watermark(RecordKind::Call).unwrap(), Some(110));
    }

    #[tokio::test]
    async fn test_incremental_sync_is_idempotent() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("c1", "555", 100, 30));
        source.push_message(source_message("m1", "555", 200));

        completed(engine.incremental_sync_all().await.unwrap());
        let before = engine.store().stats().unwrap();

        let report = completed(engine.incremental_sync_all().await.unwrap());
        assert_eq!(report.total_written(), 0);
        assert_eq!(engine.store().stats().unwrap(), before);
        assert_eq!(before.call_count, 1);
        assert_eq!(before.message_watermark, Some(200));
    }

    #[tokio::test]
    async fn test_incremental_sync_fetches_after_watermark_and_skips_known_ids() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("c1", "555", 100, 30));
        completed(engine.incremental_sync(RecordKind::Call).await.unwrap());

        source.push_call(source_call("c2", "555", 300, 10));
        // Duplicate delivery of a known id with a newer timestamp.
        source.push_call(source_call("c1", "555", 250, 99));

        let report = completed(engine.incremental_sync(RecordKind::Call).await.unwrap());
        assert_eq!(report.calls.fetched, 2);
        assert_eq!(report.calls.skipped_existing, 1);
        assert_eq!(report.calls.written, 1);

        let store = engine.store();
        assert_eq!(store.count(RecordKind::Call).unwrap(), 2);
        assert_eq!(store.get_call("c1").unwrap().unwrap().duration_seconds, 30);
        assert_eq!(store.watermark(RecordKind::Call).unwrap(), Some(300));
    }

    #[tokio::test]
    async fn test_failed_sync_keeps_watermark_and_reports() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("c1", "555", 100, 30));
        completed(engine.incremental_sync(RecordKind::Call).await.unwrap());

        let mut events = engine.subscribe();
        source.push_call(source_call("c2", "555", 200, 30));
        source.set_unavailable(true);

        let err = engine.incremental_sync(RecordKind::Call).await.unwrap_err();
        assert!(matches!(err, CommlogError::SourceUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(engine.store().watermark(RecordKind::Call).unwrap(), Some(100));

        match events.recv().await.unwrap() {
            SyncEvent::Failed { scope, .. } => {
                assert_eq!(scope, SyncScope::Incremental(RecordKind::Call))
            }
            other => panic!("expected failure event, got {:?}", other),
        }

        // The next attempt retries the same window.
        source.set_unavailable(false);
        let report = completed(engine.incremental_sync(RecordKind::Call).await.unwrap());
        assert_eq!(report.calls.written, 1);
    }

    /// Fails message queries only.
    struct BrokenMessages(MemorySource);

    impl CommunicationSource for BrokenMessages {
        fn query_calls(&self, since: Option<i64>) -> Result<SourceRows<SourceCall>> {
            self.0.query_calls(since)
        }

        fn query_messages(&self, _since: Option<i64>) -> Result<SourceRows<SourceMessage>> {
            Err(CommlogError::SourceUnavailable("sms provider gone".to_string()))
        }

        fn query_contacts(&self, since: Option<i64>) -> Result<SourceRows<SourceContact>> {
            self.0.query_contacts(since)
        }

        fn subscribe_to_changes(&self, kind: RecordKind) -> Result<ChangeSubscription> {
            self.0.subscribe_to_changes(kind)
        }
    }

    #[tokio::test]
    async fn test_multi_kind_failure_writes_nothing() {
        let inner = MemorySource::new();
        inner.push_call(source_call("c1", "555", 100, 30));
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(BrokenMessages(inner)),
            SyncConfig::default(),
        );

        assert!(engine.incremental_sync_all().await.is_err());
        assert_eq!(store.watermark(RecordKind::Call).unwrap(), None);
        assert_eq!(store.count(RecordKind::Call).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_fetch_timeout_fails_sync() {
        let (engine, source) = create_engine(SyncConfig {
            fetch_timeout: Duration::from_millis(50),
            ..SyncConfig::default()
        });
        source.push_call(source_call("c1", "555", 100, 30));
        source.set_delay(Some(Duration::from_millis(300)));

        let err = engine.incremental_sync(RecordKind::Call).await.unwrap_err();
        assert!(matches!(err, CommlogError::SourceUnavailable(_)));
        assert_eq!(engine.store().count(RecordKind::Call).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reentrant_sync_is_dropped() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("c1", "555", 100, 30));
        source.set_delay(Some(Duration::from_millis(300)));

        let running = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.incremental_sync(RecordKind::Call).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = engine.incremental_sync(RecordKind::Call).await.unwrap();
        assert_eq!(
            second,
            SyncOutcome::AlreadyRunning {
                kind: RecordKind::Call
            }
        );
        let full = engine.full_sync().await.unwrap();
        assert!(matches!(full, SyncOutcome::AlreadyRunning { .. }));

        let first = completed(running.await.unwrap().unwrap());
        assert_eq!(first.calls.written, 1);
        assert_eq!(source.query_count(RecordKind::Call), 1);
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("ok", "555", 100, 30));
        source.push_call(SourceCall {
            number: None,
            ..source_call("no-number", "", 110, 0)
        });
        source.push_call(SourceCall {
            call_type: 42,
            ..source_call("bad-type", "555", 120, 0)
        });
        source.push_message(SourceMessage {
            body: None,
            ..source_message("m1", "555", 130)
        });
        source.push_message(SourceMessage {
            address: None,
            ..source_message("m2", "", 140)
        });

        let report = completed(engine.full_sync().await.unwrap());
        assert_eq!(report.calls.fetched, 3);
        assert_eq!(report.calls.skipped_malformed, 2);
        assert_eq!(report.calls.written, 1);
        assert_eq!(report.messages.skipped_malformed, 1);

        let message = engine.store().get_message("m1").unwrap().unwrap();
        assert_eq!(message.body, "");
    }

    #[tokio::test]
    async fn test_contact_sync_refreshes_flags() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("c1", "555-0100", 100, 30));
        completed(engine.incremental_sync(RecordKind::Call).await.unwrap());
        assert!(!engine.store().get_call("c1").unwrap().unwrap().contact_saved);

        source.push_contact(source_contact(7, "5550100", 50));
        let report = completed(engine.incremental_sync(RecordKind::Contact).await.unwrap());
        assert_eq!(report.contacts.written, 1);
        assert!(engine.store().get_call("c1").unwrap().unwrap().contact_saved);

        // New calls for the number are tagged from the stored contact set.
        source.push_call(source_call("c2", "5550100", 200, 30));
        completed(engine.incremental_sync(RecordKind::Call).await.unwrap());
        assert!(engine.store().get_call("c2").unwrap().unwrap().contact_saved);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_call_and_contact_syncs_agree_on_flags() {
        for run in 0..200 {
            let (engine, source) = create_engine(SyncConfig::default());
            source.push_call(source_call("c1", "(555) 010-0200", 100, 30));
            source.push_contact(source_contact(1, "5550100200", 10));
            // Both queries sleep so the two writes race.
            source.set_delay(Some(Duration::from_millis(5)));

            let calls = {
                let engine = engine.clone();
                tokio::spawn(async move { engine.incremental_sync(RecordKind::Call).await })
            };
            let contacts = {
                let engine = engine.clone();
                tokio::spawn(async move { engine.incremental_sync(RecordKind::Contact).await })
            };
            completed(calls.await.unwrap().unwrap());
            completed(contacts.await.unwrap().unwrap());

            let store = engine.store();
            let call = store.get_call("c1").unwrap().unwrap();
            let expected = store.contact_matcher().unwrap().is_saved(&call.normalized_number);
            assert!(expected);
            assert_eq!(call.contact_saved, expected, "run {}", run);
        }
    }

    #[tokio::test]
    async fn test_store_write_failure_keeps_watermark_and_reports() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("cache.db");
        let store = Arc::new(RecordStore::open(&db_path).unwrap());
        let source = Arc::new(MemorySource::new());
        let engine = SyncEngine::new(store.clone(), source.clone(), SyncConfig::default());

        source.push_call(source_call("c1", "555", 100, 30));
        completed(engine.incremental_sync(RecordKind::Call).await.unwrap());

        let admin = rusqlite::Connection::open(&db_path).unwrap();
        admin
            .execute_batch(
                "CREATE TRIGGER reject_calls BEFORE INSERT ON calls \
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let mut events = engine.subscribe();
        source.push_call(source_call("c2", "555", 200, 30));
        let err = engine.incremental_sync(RecordKind::Call).await.unwrap_err();
        assert!(matches!(err, CommlogError::StorageFailure(_)));
        assert!(err.is_retryable());
        assert_eq!(store.watermark(RecordKind::Call).unwrap(), Some(100));
        assert!(matches!(
            events.recv().await.unwrap(),
            SyncEvent::Failed { .. }
        ));

        admin.execute_batch("DROP TRIGGER reject_calls;").unwrap();
        let report = completed(engine.incremental_sync(RecordKind::Call).await.unwrap());
        assert_eq!(report.calls.written, 1);
        assert_eq!(store.watermark(RecordKind::Call).unwrap(), Some(200));
    }

    #[tokio::test]
    async fn test_unreadable_export_lines_count_as_malformed() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("messages.jsonl"),
            concat!(
                r#"{"id":"m1","address":"555","type":1,"timestamp":100}"#,
                "\n",
                r#"{"address":"555","type":1}"#,
                "\n",
            ),
        )
        .unwrap();
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(JsonDirSource::new(dir.path())),
            SyncConfig::default(),
        );

        let report = completed(engine.full_sync().await.unwrap());
        assert_eq!(report.messages.fetched, 2);
        assert_eq!(report.messages.skipped_malformed, 1);
        assert_eq!(report.messages.written, 1);
        assert_eq!(store.count(RecordKind::Message).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resync_drops_records_gone_from_source() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("c1", "555", 100, 30));
        source.push_call(source_call("c2", "555", 200, 30));
        completed(engine.full_sync().await.unwrap());

        source.remove_call("c2");
        completed(engine.resync().await.unwrap());

        let store = engine.store();
        assert_eq!(store.count(RecordKind::Call).unwrap(), 1);
        assert!(store.get_call("c2").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_on_start_picks_full_then_incremental() {
        let (engine, source) = create_engine(SyncConfig::default());
        source.push_call(source_call("c1", "555", 100, 30));

        let first = completed(engine.sync_on_start().await.unwrap());
        assert_eq!(first.scope, SyncScope::Full);

        let second = completed(engine.sync_on_start().await.unwrap());
        assert_eq!(second.scope, SyncScope::IncrementalAll);
    }
}
