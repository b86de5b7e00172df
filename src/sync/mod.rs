//! Sync module - Aggregates the connectors into the encrypted index and
//! mirrors it to the remote service.
//!
//! This module contains:
//! - SyncOrchestrator: fetch, merge, persist, push with progress reporting
//! - RemoteSyncClient: JSON over HTTP to the sync service

pub mod orchestrator;
pub mod remote;

pub use orchestrator::{
    ConnectorOutcome, SyncEvent, SyncOrchestrator, SyncOrchestratorBuilder, SyncReport,
    SyncState,
};
pub use remote::RemoteSyncClient;
