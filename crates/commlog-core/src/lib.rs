//! Sync and aggregation engine for call, message and contact records.

mod aggregate;
mod db;
mod error;
mod history;
mod normalize;
mod observer;
pub mod source;
mod sync;

pub use aggregate::{average_duration, merge_groups, CallGroup, LiveAggregates, MessageGroup};
pub use db::{RecordBatch, RecordStore, StoreChange, WriteMode};
pub use error::CommlogError;
pub use history::{merge_timeline, HistoryAssembler};
pub use normalize::{normalize, ContactMatcher};
pub use observer::{ChangeObserver, Debouncer, ObserverHandle};
pub use source::{ChangeSubscription, CommunicationSource, SourceRows};
pub use sync::{SyncConfig, SyncEngine};

/// Result type for commlog operations.
pub type Result<T> = std::result::Result<T, CommlogError>;
