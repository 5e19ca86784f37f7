//! Server configuration.

use anyhow::Result;
use commlog_core::SyncConfig;
use commlog_types::AggregateQuery;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Directory holding `calls.jsonl`, `messages.jsonl` and `contacts.jsonl`.
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_observe_on_start")]
    pub observe_on_start: bool,
    #[serde(default)]
    pub numbers_only_messages: bool,
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("commlog")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    data_dir().join("cache.db")
}

fn default_source_dir() -> PathBuf {
    data_dir().join("source")
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_observe_on_start() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            source_dir: default_source_dir(),
            debounce_ms: default_debounce_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            observe_on_start: default_observe_on_start(),
            numbers_only_messages: false,
        }
    }
}

impl Config {
    /// Load config from a specific file path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config from config/default.toml, or fall back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = PathBuf::from("config/default.toml");
        if config_path.exists() {
            return Self::load_from(&config_path);
        }

        Ok(Config::default())
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn aggregate_query(&self) -> AggregateQuery {
        AggregateQuery {
            numbers_only_messages: self.numbers_only_messages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            port = 9000
            debounce_ms = 250
            numbers_only_messages = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.observe_on_start);
        assert_eq!(config.sync_config().debounce, Duration::from_millis(250));
        assert_eq!(config.sync_config().fetch_timeout, Duration::from_secs(30));
        assert!(config.aggregate_query().numbers_only_messages);
    }

    #[test]
    fn test_load_from_missing_file_errors() {
        let missing = std::path::Path::new("/nonexistent/commlog/config.toml");
        assert!(Config::load_from(missing).is_err());
    }
}
