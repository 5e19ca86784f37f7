//! SQLite cache for calls, messages and contacts.
//!
//! Every mutation commits in a single transaction and then publishes a
//! [`StoreChange`] naming the tables it touched. Live queries listen on that
//! channel and recompute.

use crate::aggregate::{self, CallGroup, MessageGroup};
use crate::history;
use crate::normalize::{normalize, ContactMatcher};
use crate::Result;
use commlog_types::{
    AggregateQuery, AggregateSummary, CallRecord, CallType, ContactRecord, ContactSort,
    HistoryPage, MessageRecord, MessageType, RecordKind, StoreStats, TimelineEntry,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the change channel. Slow listeners see `Lagged` and recompute.
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Tables touched by one committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub kinds: Vec<RecordKind>,
}

impl StoreChange {
    pub fn touches(&self, kind: RecordKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Whether summaries or histories may have changed.
    pub fn touches_activity(&self) -> bool {
        self.touches(RecordKind::Call) || self.touches(RecordKind::Message)
    }
}

/// Records written together in one transaction.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub calls: Vec<CallRecord>,
    pub messages: Vec<MessageRecord>,
    pub contacts: Vec<ContactRecord>,
}

impl RecordBatch {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.messages.is_empty() && self.contacts.is_empty()
    }

    fn kinds(&self) -> Vec<RecordKind> {
        let mut kinds = Vec::new();
        if !self.contacts.is_empty() {
            kinds.push(RecordKind::Contact);
        }
        if !self.calls.is_empty() {
            kinds.push(RecordKind::Call);
        }
        if !self.messages.is_empty() {
            kinds.push(RecordKind::Message);
        }
        kinds
    }
}

/// How a batch is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Insert or replace by id.
    Upsert,
    /// Replace the contact table with the batch's contacts; upsert the rest.
    ReplaceContacts,
    /// Drop every table, then insert the batch.
    ReplaceAll,
}

/// SQLite-based record store.
pub struct RecordStore {
    conn: Mutex<Connection>,
    changes: broadcast::Sender<StoreChange>,
}

impl RecordStore {
    /// Open or create the cache at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory cache.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Create a store from an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        let store = Self {
            conn: Mutex::new(conn),
            changes,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS calls (
                id TEXT PRIMARY KEY,
                raw_number TEXT NOT NULL,
                normalized_number TEXT NOT NULL,
                cached_name TEXT,
                call_type INTEGER NOT NULL,
                timestamp_millis INTEGER NOT NULL,
                duration_seconds INTEGER NOT NULL DEFAULT 0,
                contact_saved INTEGER NOT NULL DEFAULT 0,
                synced_at_millis INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_calls_raw_number ON calls(raw_number);
            CREATE INDEX IF NOT EXISTS idx_calls_timestamp ON calls(timestamp_millis);
            CREATE INDEX IF NOT EXISTS idx_calls_normalized ON calls(normalized_number);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                raw_address TEXT NOT NULL,
                normalized_address TEXT NOT NULL,
                name TEXT,
                message_type INTEGER NOT NULL,
                timestamp_millis INTEGER NOT NULL,
                body TEXT NOT NULL DEFAULT '',
                contact_saved INTEGER NOT NULL DEFAULT 0,
                read INTEGER NOT NULL DEFAULT 0,
                synced_at_millis INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_raw_address ON messages(raw_address);
            CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp_millis);
            CREATE INDEX IF NOT EXISTS idx_messages_normalized ON messages(normalized_address);

            CREATE TABLE IF NOT EXISTS contacts (
                contact_id INTEGER PRIMARY KEY,
                name TEXT,
                primary_phone_number TEXT,
                normalized_number TEXT,
                photo_ref TEXT,
                last_updated_millis INTEGER NOT NULL DEFAULT 0,
                times_contacted INTEGER NOT NULL DEFAULT 0,
                last_contacted_millis INTEGER NOT NULL DEFAULT 0,
                synced_at_millis INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_contacts_last_updated ON contacts(last_updated_millis);
            CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name);
            "#,
        )?;
        Ok(())
    }

    /// Subscribe to committed changes.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn publish(&self, kinds: Vec<RecordKind>) {
        if kinds.is_empty() {
            return;
        }
        // No receivers is fine.
        let _ = self.changes.send(StoreChange { kinds });
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Insert or replace every record of the batch by id, atomically.
    pub fn upsert_many(&self, batch: &RecordBatch) -> Result<()> {
        self.apply(batch, WriteMode::Upsert)
    }

    /// Drop every table and insert the batch, atomically.
    pub fn replace_all(&self, batch: &RecordBatch) -> Result<()> {
        self.apply(batch, WriteMode::ReplaceAll)
    }

    /// Apply a batch in one transaction.
    ///
    /// Incoming calls and messages get `contact_saved` from the contact set
    /// as of this transaction, after the batch's own contacts are written;
    /// the flag carried by the batch is ignored. When contacts change, the
    /// flag of every cached call and message is recomputed as well.
    pub fn apply(&self, batch: &RecordBatch, mode: WriteMode) -> Result<()> {
        let mut kinds = batch.kinds();
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;

            match mode {
                WriteMode::Upsert => {}
                WriteMode::ReplaceContacts => {
                    tx.execute("DELETE FROM contacts", [])?;
                }
                WriteMode::ReplaceAll => {
                    tx.execute_batch(
                        "DELETE FROM calls; DELETE FROM messages; DELETE FROM contacts;",
                    )?;
                }
            }

            insert_contacts(&tx, &batch.contacts)?;
            let matcher = ContactMatcher::new(contact_numbers(&tx)?);
            insert_calls(&tx, &batch.calls, &matcher)?;
            insert_messages(&tx, &batch.messages, &matcher)?;

            let contacts_changed = !batch.contacts.is_empty() || mode != WriteMode::Upsert;
            if contacts_changed {
                let (calls, messages) = refresh_contact_flags(&tx)?;
                debug!(
                    target: "commlog::store",
                    "Refreshed contact flags ({} calls, {} messages changed)",
                    calls,
                    messages
                );
                if calls > 0 {
                    kinds.push(RecordKind::Call);
                }
                if messages > 0 {
                    kinds.push(RecordKind::Message);
                }
            }

            tx.commit()?;

            if mode != WriteMode::Upsert {
                kinds = RecordKind::ALL.to_vec();
            }
        }

        kinds.sort_by_key(|k| k.as_str());
        kinds.dedup();
        self.publish(kinds);
        Ok(())
    }

    /// Remove a call deleted at the source.
    pub fn delete_call(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM calls WHERE id = ?1", params![id])?;
        if deleted > 0 {
            self.publish(vec![RecordKind::Call]);
        }
        Ok(deleted > 0)
    }

    /// Remove a message deleted at the source.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        if deleted > 0 {
            self.publish(vec![RecordKind::Message]);
        }
        Ok(deleted > 0)
    }

    /// Remove a contact deleted at the source and refresh contact flags.
    pub fn delete_contact(&self, contact_id: i64) -> Result<bool> {
        let (deleted, calls, messages) = {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            let deleted = tx.execute(
                "DELETE FROM contacts WHERE contact_id = ?1",
                params![contact_id],
            )?;
            let (calls, messages) = if deleted > 0 {
                refresh_contact_flags(&tx)?
            } else {
                (0, 0)
            };
            tx.commit()?;
            (deleted, calls, messages)
        };

        if deleted > 0 {
            let mut kinds = vec![RecordKind::Contact];
            if calls > 0 {
                kinds.push(RecordKind::Call);
            }
            if messages > 0 {
                kinds.push(RecordKind::Message);
            }
            self.publish(kinds);
        }
        Ok(deleted > 0)
    }

    /// Drop every cached record.
    pub fn clear(&self) -> Result<()> {
        {
            let mut conn = self.conn();
            let tx = conn.transaction()?;
            tx.execute_batch("DELETE FROM calls; DELETE FROM messages; DELETE FROM contacts;")?;
            tx.commit()?;
        }
        info!(target: "commlog::store", "Cleared record cache");
        self.publish(RecordKind::ALL.to_vec());
        Ok(())
    }

    // =========================================================================
    // Point and watermark queries
    // =========================================================================

    /// Highest timestamp cached for a kind, `None` when empty.
    ///
    /// Contacts are watermarked by their last-updated time.
    pub fn watermark(&self, kind: RecordKind) -> Result<Option<i64>> {
        let sql = match kind {
            RecordKind::Call => "SELECT MAX(timestamp_millis) FROM calls",
            RecordKind::Message => "SELECT MAX(timestamp_millis) FROM messages",
            RecordKind::Contact => "SELECT MAX(last_updated_millis) FROM contacts",
        };
        let watermark: Option<i64> = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(watermark)
    }

    pub fn count(&self, kind: RecordKind) -> Result<u64> {
        let sql = match kind {
            RecordKind::Call => "SELECT COUNT(*) FROM calls",
            RecordKind::Message => "SELECT COUNT(*) FROM messages",
            RecordKind::Contact => "SELECT COUNT(*) FROM contacts",
        };
        let count: i64 = self.conn().query_row(sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Counts and watermarks for every kind.
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            call_count: self.count(RecordKind::Call)?,
            message_count: self.count(RecordKind::Message)?,
            contact_count: self.count(RecordKind::Contact)?,
            call_watermark: self.watermark(RecordKind::Call)?,
            message_watermark: self.watermark(RecordKind::Message)?,
            contact_watermark: self.watermark(RecordKind::Contact)?,
        })
    }

    /// The subset of `ids` already cached for a call or message kind.
    pub fn existing_ids(&self, kind: RecordKind, ids: &[String]) -> Result<HashSet<String>> {
        let table = match kind {
            RecordKind::Call => "calls",
            RecordKind::Message => "messages",
            RecordKind::Contact => {
                let numeric: Vec<i64> = ids.iter().filter_map(|id| id.parse().ok()).collect();
                return Ok(self
                    .existing_contact_ids(&numeric)?
                    .into_iter()
                    .map(|id| id.to_string())
                    .collect());
            }
        };

        let conn = self.conn();
        let mut existing = HashSet::new();
        // Stay well below SQLite's bound-parameter limit.
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!("SELECT id FROM {} WHERE id IN ({})", table, placeholders);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, String>(0))?;
            for id in rows {
                existing.insert(id?);
            }
        }
        Ok(existing)
    }

    fn existing_contact_ids(&self, ids: &[i64]) -> Result<HashSet<i64>> {
        let conn = self.conn();
        let mut existing = HashSet::new();
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT contact_id FROM contacts WHERE contact_id IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| row.get::<_, i64>(0))?;
            for id in rows {
                existing.insert(id?);
            }
        }
        Ok(existing)
    }

    /// Normalized primary numbers of every cached contact that has one.
    pub fn contact_numbers(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        contact_numbers(&conn)
    }

    /// Matcher over the cached contact set.
    pub fn contact_matcher(&self) -> Result<ContactMatcher> {
        Ok(ContactMatcher::new(self.contact_numbers()?))
    }

    pub fn get_call(&self, id: &str) -> Result<Option<CallRecord>> {
        let call = self
            .conn()
            .query_row("SELECT * FROM calls WHERE id = ?1", params![id], row_to_call)
            .optional()?;
        Ok(call)
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRecord>> {
        let message = self
            .conn()
            .query_row(
                "SELECT * FROM messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
            .optional()?;
        Ok(message)
    }

    pub fn get_contact(&self, contact_id: i64) -> Result<Option<ContactRecord>> {
        let contact = self
            .conn()
            .query_row(
                "SELECT * FROM contacts WHERE contact_id = ?1",
                params![contact_id],
                row_to_contact,
            )
            .optional()?;
        Ok(contact)
    }

    /// All cached contacts in the requested order.
    pub fn contacts(&self, sort: ContactSort) -> Result<Vec<ContactRecord>> {
        let order = match sort {
            ContactSort::NameAsc => "name COLLATE NOCASE ASC, contact_id ASC",
            ContactSort::NameDesc => "name COLLATE NOCASE DESC, contact_id ASC",
            ContactSort::LastUpdated => "last_updated_millis DESC, contact_id ASC",
            ContactSort::MostContacted => "times_contacted DESC, contact_id ASC",
        };
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT * FROM contacts ORDER BY {}", order))?;
        let contacts = stmt
            .query_map([], row_to_contact)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(contacts)
    }

    // =========================================================================
    // Per-number queries
    // =========================================================================

    /// Calls for one normalized number, newest first.
    pub fn calls_for(&self, normalized: &str, limit: Option<usize>) -> Result<Vec<CallRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM calls
            WHERE normalized_number = ?1
            ORDER BY timestamp_millis DESC, id ASC
            LIMIT ?2
            "#,
        )?;
        let calls = stmt
            .query_map(params![normalized, sql_limit(limit)], row_to_call)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(calls)
    }

    /// Messages for one normalized address, newest first.
    pub fn messages_for(
        &self,
        normalized: &str,
        limit: Option<usize>,
    ) -> Result<Vec<MessageRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM messages
            WHERE normalized_address = ?1
            ORDER BY timestamp_millis DESC, id ASC
            LIMIT ?2
            "#,
        )?;
        let messages = stmt
            .query_map(params![normalized, sql_limit(limit)], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    /// Interleaved calls and messages for one key, newest first.
    ///
    /// Each window is computed fresh; results shift if records arrive
    /// between windows.
    pub fn history(&self, normalized: &str, page: Option<HistoryPage>) -> Result<Vec<TimelineEntry>> {
        // The first offset+limit merged entries are drawn from the first
        // offset+limit of each kind.
        let fetch = page.map(|p| p.offset.saturating_add(p.limit));
        let calls = self.calls_for(normalized, fetch)?;
        let messages = self.messages_for(normalized, fetch)?;

        let merged = history::merge_timeline(calls, messages);
        Ok(match page {
            Some(p) => merged.into_iter().skip(p.offset).take(p.limit).collect(),
            None => merged,
        })
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Per-number call groups carrying the most recent call's display fields.
    pub fn call_groups(&self) -> Result<Vec<CallGroup>> {
        let conn = self.conn();
        // With a single MAX() aggregate, SQLite takes bare columns from the
        // row holding the maximum.
        let mut stmt = conn.prepare(
            r#"
            SELECT normalized_number, raw_number, cached_name, call_type, contact_saved,
                   MAX(timestamp_millis) AS latest,
                   COUNT(*) AS call_count,
                   SUM(duration_seconds) AS total_duration
            FROM calls
            GROUP BY normalized_number
            "#,
        )?;
        let groups = stmt
            .query_map([], |row| {
                let code: i32 = row.get("call_type")?;
                let contact_saved: i32 = row.get("contact_saved")?;
                let call_count: i64 = row.get("call_count")?;
                Ok(CallGroup {
                    normalized_number: row.get("normalized_number")?,
                    raw_number: row.get("raw_number")?,
                    cached_name: row.get("cached_name")?,
                    call_type: call_type_from_code(code, 3)?,
                    latest_timestamp: row.get("latest")?,
                    call_count: call_count as u32,
                    total_duration: row.get::<_, Option<i64>>("total_duration")?.unwrap_or(0),
                    contact_saved: contact_saved != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Per-address message groups carrying the most recent message's display fields.
    pub fn message_groups(&self, query: AggregateQuery) -> Result<Vec<MessageGroup>> {
        let conn = self.conn();
        let filter = if query.numbers_only_messages {
            "WHERE raw_address GLOB '*[0-9]*'"
        } else {
            ""
        };
        let sql = format!(
            r#"
            SELECT normalized_address, raw_address, name, contact_saved,
                   MAX(timestamp_millis) AS latest,
                   COUNT(*) AS message_count
            FROM messages
            {}
            GROUP BY normalized_address
            "#,
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let groups = stmt
            .query_map([], |row| {
                let contact_saved: i32 = row.get("contact_saved")?;
                let message_count: i64 = row.get("message_count")?;
                Ok(MessageGroup {
                    normalized_address: row.get("normalized_address")?,
                    raw_address: row.get("raw_address")?,
                    name: row.get("name")?,
                    latest_timestamp: row.get("latest")?,
                    message_count: message_count as u32,
                    contact_saved: contact_saved != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// One merged summary per number, most recent first.
    pub fn aggregates(&self, query: AggregateQuery) -> Result<Vec<AggregateSummary>> {
        let calls = self.call_groups()?;
        let messages = self.message_groups(query)?;
        Ok(aggregate::merge_groups(calls, messages))
    }
}

// =============================================================================
// Transaction helpers
// =============================================================================

fn insert_calls(
    tx: &Transaction<'_>,
    calls: &[CallRecord],
    matcher: &ContactMatcher,
) -> Result<()> {
    if calls.is_empty() {
        return Ok(());
    }
    let mut stmt = tx.prepare(
        r#"
        INSERT OR REPLACE INTO calls (
            id, raw_number, normalized_number, cached_name, call_type,
            timestamp_millis, duration_seconds, contact_saved, synced_at_millis
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )?;
    for call in calls {
        stmt.execute(params![
            call.id,
            call.raw_number,
            call.normalized_number,
            call.cached_name,
            call.call_type.code(),
            call.timestamp_millis,
            call.duration_seconds,
            matcher.is_saved(&call.normalized_number) as i32,
            call.synced_at_millis,
        ])?;
    }
    Ok(())
}

fn insert_messages(
    tx: &Transaction<'_>,
    messages: &[MessageRecord],
    matcher: &ContactMatcher,
) -> Result<()> {
    if messages.is_empty() {
        return Ok(());
    }
    let mut stmt = tx.prepare(
        r#"
        INSERT OR REPLACE INTO messages (
            id, raw_address, normalized_address, name, message_type,
            timestamp_millis, body, contact_saved, read, synced_at_millis
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )?;
    for message in messages {
        stmt.execute(params![
            message.id,
            message.raw_address,
            message.normalized_address,
            message.name,
            message.message_type.code(),
            message.timestamp_millis,
            message.body,
            matcher.is_saved(&message.normalized_address) as i32,
            message.read as i32,
            message.synced_at_millis,
        ])?;
    }
    Ok(())
}

fn insert_contacts(tx: &Transaction<'_>, contacts: &[ContactRecord]) -> Result<()> {
    if contacts.is_empty() {
        return Ok(());
    }
    let mut stmt = tx.prepare(
        r#"
        INSERT OR REPLACE INTO contacts (
            contact_id, name, primary_phone_number, normalized_number, photo_ref,
            last_updated_millis, times_contacted, last_contacted_millis, synced_at_millis
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )?;
    for contact in contacts {
        let normalized = contact.primary_phone_number.as_deref().map(normalize);
        stmt.execute(params![
            contact.contact_id,
            contact.name,
            contact.primary_phone_number,
            normalized,
            contact.photo_ref,
            contact.last_updated_millis,
            contact.times_contacted,
            contact.last_contacted_millis,
            contact.synced_at_millis,
        ])?;
    }
    Ok(())
}

fn contact_numbers(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT normalized_number FROM contacts WHERE normalized_number IS NOT NULL",
    )?;
    let numbers = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(numbers)
}

/// Recompute contact flags per distinct key; returns rows changed per table.
fn refresh_contact_flags(tx: &Transaction<'_>) -> Result<(usize, usize)> {
    let matcher = ContactMatcher::new(contact_numbers(tx)?);

    let refresh = |select: &str, update: &str| -> Result<usize> {
        let mut stmt = tx.prepare(select)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut stmt = tx.prepare(update)?;
        let mut changed = 0;
        for key in keys {
            let saved = matcher.is_saved(&key) as i32;
            changed += stmt.execute(params![saved, key])?;
        }
        Ok(changed)
    };

    let calls = refresh(
        "SELECT DISTINCT normalized_number FROM calls",
        "UPDATE calls SET contact_saved = ?1 WHERE normalized_number = ?2 AND contact_saved != ?1",
    )?;
    let messages = refresh(
        "SELECT DISTINCT normalized_address FROM messages",
        "UPDATE messages SET contact_saved = ?1 WHERE normalized_address = ?2 AND contact_saved != ?1",
    )?;
    Ok((calls, messages))
}

/// SQLite treats a negative LIMIT as unbounded.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|l| l.min(i64::MAX as usize) as i64).unwrap_or(-1)
}

// =============================================================================
// Row conversion helpers
// =============================================================================

fn call_type_from_code(code: i32, column: usize) -> rusqlite::Result<CallType> {
    CallType::from_code(code).ok_or(rusqlite::Error::IntegralValueOutOfRange(column, code as i64))
}

fn message_type_from_code(code: i32, column: usize) -> rusqlite::Result<MessageType> {
    MessageType::from_code(code)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, code as i64))
}

fn row_to_call(row: &rusqlite::Row) -> rusqlite::Result<CallRecord> {
    let call_type: i32 = row.get("call_type")?;
    let contact_saved: i32 = row.get("contact_saved")?;

    Ok(CallRecord {
        id: row.get("id")?,
        raw_number: row.get("raw_number")?,
        normalized_number: row.get("normalized_number")?,
        cached_name: row.get("cached_name")?,
        call_type: call_type_from_code(call_type, 4)?,
        timestamp_millis: row.get("timestamp_millis")?,
        duration_seconds: row.get("duration_seconds")?,
        contact_saved: contact_saved != 0,
        synced_at_millis: row.get("synced_at_millis")?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<MessageRecord> {
    let message_type: i32 = row.get("message_type")?;
    let contact_saved: i32 = row.get("contact_saved")?;
    let read: i32 = row.get("read")?;

    Ok(MessageRecord {
        id: row.get("id")?,
        raw_address: row.get("raw_address")?,
        normalized_address: row.get("normalized_address")?,
        name: row.get("name")?,
        message_type: message_type_from_code(message_type, 4)?,
        timestamp_millis: row.get("timestamp_millis")?,
        body: row.get("body")?,
        contact_saved: contact_saved != 0,
        read: read != 0,
        synced_at_millis: row.get("synced_at_millis")?,
    })
}

fn row_to_contact(row: &rusqlite::Row) -> rusqlite::Result<ContactRecord> {
    Ok(ContactRecord {
        contact_id: row.get("contact_id")?,
        name: row.get("name")?,
        primary_phone_number: row.get("primary_phone_number")?,
        photo_ref: row.get("photo_ref")?,
        last_updated_millis: row.get("last_updated_millis")?,
        times_contacted: row.get("times_contacted")?,
        last_contacted_millis: row.get("last_contacted_millis")?,
        synced_at_millis: row.get("synced_at_millis")?,
    })
}
