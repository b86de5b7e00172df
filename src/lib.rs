//! pkm-sync Core Library
//!
//! Aggregates personal knowledge metadata (notes, pages, highlights) from
//! several sources into one encrypted local index and mirrors it to a remote
//! sync service.
//!
//! Pipeline: Connectors (fetch) -> Index (merge by key) -> IndexStore (seal) -> Remote (push)

pub mod config;
pub mod connectors;
pub mod crypto;
pub mod error;
pub mod model;
pub mod secrets;
pub mod storage;
pub mod sync;
pub mod utils;

// Re-export main types
pub use config::Config;
pub use connectors::{Connector, StubConnector, VaultConnector, WorkspaceConnector};
pub use error::{Error, Result};
pub use model::{Index, Item, ItemKey, MergeStats, Source};
pub use secrets::{KeyringSecretStore, MemorySecretStore, SecretStore};
pub use storage::IndexStore;
pub use sync::{RemoteSyncClient, SyncEvent, SyncOrchestrator, SyncReport, SyncState};
