//! Scoped directory access.
//!
//! Some platforms only expose a user-granted directory between an explicit
//! begin/end pair. [`ScopedAccess`] pairs the two: `end` runs when the guard
//! drops, whatever path the traversal took out.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Platform hook opening and closing access to a granted directory.
pub trait AccessScope: Send + Sync {
    /// Start accessing `path`. Returns false when access was not granted.
    fn begin(&self, path: &Path) -> bool;

    /// Stop accessing `path`.
    fn end(&self, path: &Path);
}

/// Plain filesystem: nothing to open, access is always granted.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnscopedAccess;

impl AccessScope for UnscopedAccess {
    fn begin(&self, _path: &Path) -> bool {
        true
    }

    fn end(&self, _path: &Path) {}
}

/// Guard holding access to a directory until dropped.
pub struct ScopedAccess {
    scope: Arc<dyn AccessScope>,
    path: PathBuf,
    granted: bool,
}

impl ScopedAccess {
    /// Begin access to `path`.
    pub fn acquire(scope: Arc<dyn AccessScope>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let granted = scope.begin(&path);
        debug!(
            "[Scope] Begin access to {} (granted: {})",
            path.display(),
            granted
        );
        Self {
            scope,
            path,
            granted,
        }
    }

    /// Whether the platform granted access. An ungranted scope may still
    /// be readable (plain paths), so callers attempt traversal either way.
    pub fn is_granted(&self) -> bool {
        self.granted
    }
}

impl Drop for ScopedAccess {
    fn drop(&mut self) {
        if self.granted {
            self.scope.end(&self.path);
            debug!("[Scope] End access to {}", self.path.display());
        }
    }
}
