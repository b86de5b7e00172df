//! Connectors module - Fetch item metadata from external knowledge sources.
//!
//! Each connector takes a snapshot of one source. Failures stay inside the
//! connector boundary: `try_fetch` reports them, `fetch` turns them into an
//! empty result so one unavailable source never blocks the others.

pub mod scope;
pub mod stub;
pub mod vault;
pub mod workspace;

use crate::error::Result;
use crate::model::{Item, Source};
use async_trait::async_trait;
use tracing::warn;

pub use scope::{AccessScope, ScopedAccess, UnscopedAccess};
pub use stub::StubConnector;
pub use vault::VaultConnector;
pub use workspace::{AuthorizationPrompt, WorkspaceConnector};

/// Trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Source this connector feeds.
    fn source(&self) -> Source;

    /// Whether the connector has what it needs (credential, vault location).
    /// Used for status display only.
    fn is_configured(&self) -> bool;

    /// Fetch a snapshot of items.
    ///
    /// A source that is simply not set up returns `Ok(vec![])`.
    async fn try_fetch(&self) -> Result<Vec<Item>>;

    /// Fetch a snapshot of items, degrading any failure to an empty result.
    async fn fetch(&self) -> Vec<Item> {
        match self.try_fetch().await {
            Ok(items) => items,
            Err(e) => {
                warn!("[{}] Fetch failed: {}", self.source(), e);
                Vec::new()
            }
        }
    }
}
