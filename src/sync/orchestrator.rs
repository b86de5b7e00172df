//! Sync orchestrator - Drives the connectors, merges, persists and pushes.
//!
//! State machine: `Idle -> Syncing { progress } -> Idle`. Every operation that
//! writes the index file goes through one single-flight lock, so the store
//! only ever sees one writer.

use crate::config::{FetchMode, RecoveryPolicy};
use crate::connectors::Connector;
use crate::error::{Error, Result};
use crate::model::{Index, Item, MergeStats, Source};
use crate::storage::IndexStore;
use crate::sync::RemoteSyncClient;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncState {
    Idle,
    /// `progress` in `[0, 1]`
    Syncing { progress: f64 },
}

/// Events published while `connect_all` runs.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    Started,
    /// `source` finished; `progress` is the fraction of connectors done
    Progress { source: Source, progress: f64 },
    Finished(SyncReport),
}

/// Result of one connector within a sync.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorOutcome {
    pub source: Source,
    /// Items fetched, or why the fetch failed
    pub result: std::result::Result<usize, String>,
}

impl ConnectorOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a `connect_all` run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub outcomes: Vec<ConnectorOutcome>,
    /// Items fetched across all connectors
    pub fetched: usize,
    pub merge: MergeStats,
    /// Items in the index after the merge
    pub total_items: usize,
    /// Whether the index was written to disk
    pub persisted: bool,
    /// Whether the remote service accepted the index
    pub pushed: bool,
}

impl SyncReport {
    pub fn failed(&self) -> impl Iterator<Item = &ConnectorOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_ok())
    }
}

/// Builder for [`SyncOrchestrator`].
pub struct SyncOrchestratorBuilder {
    store: IndexStore,
    connectors: Vec<Arc<dyn Connector>>,
    remote: Option<RemoteSyncClient>,
    fetch_mode: FetchMode,
    recovery: RecoveryPolicy,
}

impl SyncOrchestratorBuilder {
    /// Register a connector. Connectors run in registration order.
    pub fn connector<C: Connector + 'static>(mut self, connector: Arc<C>) -> Self {
        self.connectors.push(connector);
        self
    }

    pub fn remote(mut self, remote: RemoteSyncClient) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn fetch_mode(mut self, mode: FetchMode) -> Self {
        self.fetch_mode = mode;
        self
    }

    pub fn recovery(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery = policy;
        self
    }

    /// Load the persisted index and assemble the orchestrator.
    ///
    /// An unreadable index is moved aside and replaced by an empty one when
    /// the recovery policy is `Reset`; otherwise the error is returned.
    pub fn build(self) -> Result<SyncOrchestrator> {
        let index = load_persisted(&self.store, self.recovery)?;
        let (state, _) = watch::channel(SyncState::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(SyncOrchestrator {
            store: self.store,
            connectors: self.connectors,
            remote: self.remote,
            fetch_mode: self.fetch_mode,
            index: RwLock::new(index),
            flight: Mutex::new(()),
            state,
            events,
        })
    }
}

fn load_persisted(store: &IndexStore, recovery: RecoveryPolicy) -> Result<Index> {
    let index = match store.load() {
        Ok(index) => index,
        Err(Error::StorageCorrupted(reason)) if recovery == RecoveryPolicy::Reset => {
            error!("[Sync] Index unreadable ({}), starting fresh", reason);
            store.quarantine()?;
            Index::empty()
        }
        Err(e) => return Err(e),
    };

    info!("[Sync] Loaded index with {} items", index.len());
    Ok(index)
}

/// Owns the in-memory index and the connectors feeding it.
pub struct SyncOrchestrator {
    store: IndexStore,
    connectors: Vec<Arc<dyn Connector>>,
    remote: Option<RemoteSyncClient>,
    fetch_mode: FetchMode,
    index: RwLock<Index>,
    /// Single-flight guard for everything that writes the store
    flight: Mutex<()>,
    state: watch::Sender<SyncState>,
    events: broadcast::Sender<SyncEvent>,
}

/// Puts the state back to `Idle` however `connect_all` exits.
struct IdleOnDrop<'a>(&'a watch::Sender<SyncState>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(SyncState::Idle);
    }
}

impl SyncOrchestrator {
    pub fn builder(store: IndexStore) -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder {
            store,
            connectors: Vec::new(),
            remote: None,
            fetch_mode: FetchMode::default(),
            recovery: RecoveryPolicy::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Receive sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the in-memory index.
    pub async fn index(&self) -> Index {
        self.index.read().await.clone()
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Arc<dyn Connector>> {
        self.connectors.iter()
    }

    pub fn connector(&self, source: Source) -> Option<&Arc<dyn Connector>> {
        self.connectors.iter().find(|c| c.source() == source)
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    pub fn remote(&self) -> Option<&RemoteSyncClient> {
        self.remote.as_ref()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn advance(&self, source: Source, done: usize, total: usize) {
        let progress = done as f64 / total as f64;
        self.state.send_replace(SyncState::Syncing { progress });
        self.emit(SyncEvent::Progress { source, progress });
    }

    /// Fetch from every connector, merge, persist, push.
    ///
    /// Connector failures are recorded in the report and count as zero
    /// items. Persistence and push failures are logged and reported, never
    /// returned.
    pub async fn connect_all(&self) -> SyncReport {
        let _flight = self.flight.lock().await;
        let _idle = IdleOnDrop(&self.state);

        self.state.send_replace(SyncState::Syncing { progress: 0.0 });
        self.emit(SyncEvent::Started);
        info!(
            "[Sync] Starting sync of {} connectors ({:?})",
            self.connectors.len(),
            self.fetch_mode
        );

        let total = self.connectors.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut fetched: Vec<Item> = Vec::new();

        match self.fetch_mode {
            FetchMode::Sequential => {
                for (done, connector) in self.connectors.iter().enumerate() {
                    let source = connector.source();
                    let result = connector.try_fetch().await;
                    outcomes.push(record(source, result, &mut fetched));
                    self.advance(source, done + 1, total);
                }
            }
            FetchMode::Concurrent => {
                let mut pending: FuturesUnordered<_> = self
                    .connectors
                    .iter()
                    .map(|connector| async move {
                        (connector.source(), connector.try_fetch().await)
                    })
                    .collect();

                let mut done = 0;
                while let Some((source, result)) = pending.next().await {
                    done += 1;
                    outcomes.push(record(source, result, &mut fetched));
                    self.advance(source, done, total);
                }
            }
        }

        let fetched_count = fetched.len();
        let (snapshot, merge) = {
            let mut index = self.index.write().await;
            let merge = index.merge(fetched, Utc::now());
            (index.clone(), merge)
        };
        debug!(
            "[Sync] Merged: {} new, {} updated, {} unchanged",
            merge.inserted, merge.updated, merge.unchanged
        );

        let persisted = match self.store.save(&snapshot) {
            Ok(()) => true,
            Err(e) => {
                warn!("[Sync] Failed to persist index: {}", e);
                false
            }
        };

        let pushed = match &self.remote {
            Some(remote) => match remote.push_index(&snapshot).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("[Sync] Remote push failed: {}", e);
                    false
                }
            },
            None => false,
        };

        let report = SyncReport {
            outcomes,
            fetched: fetched_count,
            merge,
            total_items: snapshot.len(),
            persisted,
            pushed,
        };
        info!(
            "[Sync] Done: {} fetched, {} in index",
            report.fetched, report.total_items
        );

        self.state.send_replace(SyncState::Idle);
        self.emit(SyncEvent::Finished(report.clone()));
        report
    }

    /// Fetch one source, merge and persist. No progress events, no push.
    ///
    /// Unlike `connect_all`, this is an explicit user action: fetch and
    /// persistence errors are returned. Returns the number of items fetched.
    pub async fn connect_one(&self, source: Source) -> Result<usize> {
        let connector = self
            .connector(source)
            .ok_or_else(|| Error::UnknownSource(source.to_string()))?
            .clone();
        let _flight = self.flight.lock().await;

        let items = connector.try_fetch().await?;
        let count = items.len();

        let snapshot = {
            let mut index = self.index.write().await;
            index.merge(items, Utc::now());
            index.clone()
        };
        self.store.save(&snapshot)?;

        info!("[Sync] {} contributed {} items", source, count);
        Ok(count)
    }

    /// Drop every item and persist the empty index.
    pub async fn clear_cache(&self) -> Result<()> {
        let _flight = self.flight.lock().await;

        let mut index = self.index.write().await;
        index.clear();
        self.store.save(&index)?;
        info!("[Sync] Cache cleared");
        Ok(())
    }
}

fn record(source: Source, result: Result<Vec<Item>>, fetched: &mut Vec<Item>) -> ConnectorOutcome {
    let result = match result {
        Ok(items) => {
            debug!("[Sync] {} returned {} items", source, items.len());
            let count = items.len();
            fetched.extend(items);
            Ok(count)
        }
        Err(e) => {
            warn!("[{}] Fetch failed: {}", source, e);
            Err(e.to_string())
        }
    };
    ConnectorOutcome { source, result }
}
