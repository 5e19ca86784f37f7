//! Source reading JSON Lines exports from a directory.
//!
//! Layout: `calls.jsonl`, `messages.jsonl`, `contacts.jsonl`, one row per
//! line. A missing file reads as empty. Lines that fail to parse are logged,
//! skipped and counted as unreadable. Change signals come from a filesystem
//! watcher on the directory.

use super::{snapshot_since, ChangeSubscription, CommunicationSource, SourceRows};
use crate::{CommlogError, Result};
use commlog_types::{RecordKind, SourceCall, SourceContact, SourceMessage, SourceRow};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding rows of `kind`.
    pub fn file_for(&self, kind: RecordKind) -> PathBuf {
        self.dir.join(file_name(kind))
    }

    fn read_rows<T>(&self, kind: RecordKind, since: Option<i64>) -> Result<SourceRows<T>>
    where
        T: DeserializeOwned + SourceRow + Clone,
    {
        let path = self.file_for(kind);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SourceRows::default()),
            Err(e) => {
                return Err(CommlogError::SourceUnavailable(format!(
                    "{}: {}",
                    path.display(),
                    e
                )));
            }
        };

        let mut rows = Vec::new();
        let mut unreadable = 0;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| {
                CommlogError::SourceUnavailable(format!("{}: {}", path.display(), e))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(row) => rows.push(row),
                Err(e) => {
                    warn!(
                        target: "commlog::source",
                        "Skipping unreadable line {} of {}: {}",
                        index + 1,
                        path.display(),
                        e
                    );
                    unreadable += 1;
                }
            }
        }

        Ok(SourceRows::new(snapshot_since(&rows, since), unreadable))
    }
}

fn file_name(kind: RecordKind) -> &'static str {
    match kind {
        RecordKind::Call => "calls.jsonl",
        RecordKind::Message => "messages.jsonl",
        RecordKind::Contact => "contacts.jsonl",
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

impl CommunicationSource for JsonDirSource {
    fn query_calls(&self, since: Option<i64>) -> Result<SourceRows<SourceCall>> {
        self.read_rows(RecordKind::Call, since)
    }

    fn query_messages(&self, since: Option<i64>) -> Result<SourceRows<SourceMessage>> {
        self.read_rows(RecordKind::Message, since)
    }

    fn query_contacts(&self, since: Option<i64>) -> Result<SourceRows<SourceContact>> {
        self.read_rows(RecordKind::Contact, since)
    }

    fn subscribe_to_changes(&self, kind: RecordKind) -> Result<ChangeSubscription> {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = file_name(kind);

        let mut watcher =
            notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
                match res {
                    Ok(event) => {
                        let relevant = is_content_change(&event.kind)
                            && event
                                .paths
                                .iter()
                                .any(|p| p.file_name().is_some_and(|name| name == target));
                        if relevant {
                            let _ = tx.send(());
                        }
                    }
                    Err(e) => warn!(target: "commlog::source", "Watch error: {}", e),
                }
            })?;

        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        debug!(
            target: "commlog::source",
            "Watching {} for {} changes",
            self.dir.display(),
            kind
        );

        Ok(ChangeSubscription::with_guard(rx, watcher))
    }
}
