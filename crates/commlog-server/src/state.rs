//! Shared application state.

use crate::config::Config;
use commlog_core::source::JsonDirSource;
use commlog_core::{
    ChangeObserver, CommunicationSource, HistoryAssembler, LiveAggregates, ObserverHandle,
    RecordStore, SyncEngine,
};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AppState {
    pub store: Arc<RecordStore>,
    pub engine: Arc<SyncEngine>,
    pub history: HistoryAssembler,
    pub aggregates: LiveAggregates,
    observer: Mutex<Option<ObserverHandle>>,
    pub config: Config,
}

impl AppState {
    /// State backed by the on-disk cache and the configured export directory.
    pub fn new(config: Config) -> commlog_core::Result<Self> {
        let store = Arc::new(RecordStore::open(&config.db_path)?);
        std::fs::create_dir_all(&config.source_dir)?;
        let source = Arc::new(JsonDirSource::new(config.source_dir.clone()));
        Self::with_parts(config, store, source)
    }

    /// State over an existing store and source.
    pub fn with_parts(
        config: Config,
        store: Arc<RecordStore>,
        source: Arc<dyn CommunicationSource>,
    ) -> commlog_core::Result<Self> {
        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            source,
            config.sync_config(),
        ));
        let history = HistoryAssembler::new(store.clone());
        let aggregates = LiveAggregates::spawn(store.clone(), config.aggregate_query())?;

        Ok(Self {
            store,
            engine,
            history,
            aggregates,
            observer: Mutex::new(None),
            config,
        })
    }

    /// Start the change observers. Returns `false` if already running.
    pub async fn start_observing(&self) -> commlog_core::Result<bool> {
        let mut observer = self.observer.lock().await;
        if observer.is_some() {
            return Ok(false);
        }
        *observer = Some(ChangeObserver::from_engine(self.engine.clone()).start_all()?);
        Ok(true)
    }

    /// Stop the change observers. Returns `false` if none were running.
    pub async fn stop_observing(&self) -> bool {
        let handle = self.observer.lock().await.take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub async fn is_observing(&self) -> bool {
        self.observer.lock().await.is_some()
    }
}
