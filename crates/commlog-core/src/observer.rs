//! Turns source change signals into incremental syncs.
//!
//! One listener task per kind. Signals are debounced on the leading edge:
//! the first signal fires a sync and opens a quiet window, and signals
//! inside the window are dropped.

use crate::source::ChangeSubscription;
use crate::sync::SyncEngine;
use crate::Result;
use commlog_types::{RecordKind, SyncOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Leading-edge debounce clock for one channel.
#[derive(Debug, Clone)]
pub struct Debouncer {
    quiet: Duration,
    last_fired: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_fired: None,
        }
    }

    /// Whether a signal at `now` fires. Firing resets the window.
    pub fn should_fire(&mut self, now: Instant) -> bool {
        let fire = match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.quiet,
        };
        if fire {
            self.last_fired = Some(now);
        }
        fire
    }
}

pub struct ChangeObserver {
    engine: Arc<SyncEngine>,
    quiet: Duration,
}

impl ChangeObserver {
    pub fn new(engine: Arc<SyncEngine>, quiet: Duration) -> Self {
        Self { engine, quiet }
    }

    /// Observer using the engine's configured debounce interval.
    pub fn from_engine(engine: Arc<SyncEngine>) -> Self {
        let quiet = engine.config().debounce;
        Self::new(engine, quiet)
    }

    /// Subscribe to every kind.
    pub fn start_all(&self) -> Result<ObserverHandle> {
        self.start(&RecordKind::ALL)
    }

    /// Subscribe to the given kinds. Fails without leaving listeners behind
    /// if any subscription fails.
    pub fn start(&self, kinds: &[RecordKind]) -> Result<ObserverHandle> {
        let mut subscriptions = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let subscription = self.engine.source().subscribe_to_changes(kind)?;
            subscriptions.push((kind, subscription));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = subscriptions
            .into_iter()
            .map(|(kind, subscription)| {
                tokio::spawn(listen(
                    self.engine.clone(),
                    kind,
                    subscription,
                    self.quiet,
                    stop_rx.clone(),
                ))
            })
            .collect();

        info!(
            target: "commlog::observer",
            "Observing {:?} changes (quiet interval {}ms)",
            kinds,
            self.quiet.as_millis()
        );

        Ok(ObserverHandle {
            kinds: kinds.to_vec(),
            stop_tx,
            tasks,
        })
    }
}

/// Owns the listener tasks. Dropping it unsubscribes.
///
/// Syncs already triggered run to completion either way.
pub struct ObserverHandle {
    kinds: Vec<RecordKind>,
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ObserverHandle {
    pub fn kinds(&self) -> &[RecordKind] {
        &self.kinds
    }

    /// Stop listening and wait for the listeners to release their
    /// subscriptions.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
        info!(target: "commlog::observer", "Stopped observing {:?} changes", self.kinds);
    }
}

async fn listen(
    engine: Arc<SyncEngine>,
    kind: RecordKind,
    mut subscription: ChangeSubscription,
    quiet: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut debouncer = Debouncer::new(quiet);

    loop {
        tokio::select! {
            signal = subscription.recv() => {
                if signal.is_none() {
                    debug!(target: "commlog::observer", "{} change channel closed", kind);
                    break;
                }
                if !debouncer.should_fire(Instant::now()) {
                    trace!(target: "commlog::observer", "Dropping {} change inside quiet window", kind);
                    continue;
                }
                // Detached: a newer signal never cancels a running sync.
                tokio::spawn(trigger(engine.clone(), kind));
            }
            _ = stop_rx.changed() => {
                break;
            }
        }
    }
}

async fn trigger(engine: Arc<SyncEngine>, kind: RecordKind) {
    debug!(target: "commlog::observer", "{} changed, syncing", kind);
    match engine.incremental_sync(kind).await {
        Ok(SyncOutcome::Completed(_)) => {}
        Ok(SyncOutcome::AlreadyRunning { .. }) => {
            debug!(target: "commlog::observer", "{} sync already running", kind);
        }
        Err(e) => {
            warn!(target: "commlog::observer", "Triggered {} sync failed: {}", kind, e);
        }
    }
}
