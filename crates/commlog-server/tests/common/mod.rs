//! Shared builders for server integration tests.

#![allow(dead_code)]

use commlog_server::config::Config;
use commlog_types::{SourceCall, SourceContact, SourceMessage};
use tempfile::TempDir;

/// Config pointing every path into `temp_dir`, with observation off.
pub fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        db_path: temp_dir.path().join("cache.db"),
        source_dir: temp_dir.path().join("source"),
        debounce_ms: 100,
        fetch_timeout_secs: 5,
        observe_on_start: false,
        numbers_only_messages: false,
    }
}

/// An incoming call row.
pub fn call(id: &str, number: &str, timestamp: i64, duration: i64) -> SourceCall {
    SourceCall {
        id: id.to_string(),
        number: Some(number.to_string()),
        cached_name: None,
        call_type: 1,
        timestamp,
        duration,
    }
}

/// An inbox message row.
pub fn message(id: &str, address: &str, timestamp: i64, body: &str) -> SourceMessage {
    SourceMessage {
        id: id.to_string(),
        address: Some(address.to_string()),
        message_type: 1,
        timestamp,
        body: Some(body.to_string()),
        read: false,
    }
}

pub fn contact(contact_id: i64, name: &str, number: &str, last_updated: i64) -> SourceContact {
    SourceContact {
        contact_id,
        name: Some(name.to_string()),
        primary_number: Some(number.to_string()),
        photo_ref: None,
        last_updated,
        times_contacted: 0,
        last_contacted: 0,
    }
}
