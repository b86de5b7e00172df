//! Markdown vault connector.
//!
//! Walks a user-granted directory of markdown notes and turns every note into
//! an item: title from the leading `# ` heading (or the file name), tags from
//! a `tags: [a, b]` line plus inline `#tag` tokens, timestamp from the file
//! modification time.
//!
//! Hidden files and directories (`.obsidian/`, `.trash/`, ...) are skipped.

use super::scope::{AccessScope, ScopedAccess, UnscopedAccess};
use super::Connector;
use crate::error::{Error, Result};
use crate::model::{Item, Source};
use crate::secrets::{SecretStore, VAULT_LOCATION_KEY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Markdown vault connector
pub struct VaultConnector {
    secrets: Arc<dyn SecretStore>,
    scope: Arc<dyn AccessScope>,
}

impl VaultConnector {
    /// Create a connector reading its vault location from `secrets`.
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            secrets,
            scope: Arc::new(UnscopedAccess),
        }
    }

    /// Use a platform access scope around traversal.
    pub fn with_scope(mut self, scope: Arc<dyn AccessScope>) -> Self {
        self.scope = scope;
        self
    }

    /// Remember `path` as the vault. Returns the canonical path stored.
    pub fn set_vault(&self, path: &Path) -> Result<PathBuf> {
        let canonical = fs::canonicalize(path)?;
        if !canonical.is_dir() {
            return Err(Error::Config(format!(
                "{} is not a directory",
                canonical.display()
            )));
        }

        let location = canonical.to_str().ok_or_else(|| {
            Error::Config(format!("{} is not valid UTF-8", canonical.display()))
        })?;
        self.secrets.set(VAULT_LOCATION_KEY, location.as_bytes())?;
        info!("[Vault] Vault set to {}", canonical.display());
        Ok(canonical)
    }

    /// Forget the vault location.
    pub fn clear_vault(&self) -> Result<()> {
        self.secrets.delete(VAULT_LOCATION_KEY)
    }

    /// Stored vault location, if any.
    pub fn vault_path(&self) -> Result<Option<PathBuf>> {
        Ok(self
            .secrets
            .get_string(VAULT_LOCATION_KEY)?
            .map(PathBuf::from))
    }
}

#[async_trait]
impl Connector for VaultConnector {
    fn source(&self) -> Source {
        Source::Vault
    }

    fn is_configured(&self) -> bool {
        self.secrets.contains(VAULT_LOCATION_KEY)
    }

    async fn try_fetch(&self) -> Result<Vec<Item>> {
        let Some(root) = self.vault_path()? else {
            debug!("[Vault] No vault configured");
            return Ok(Vec::new());
        };

        let scope = self.scope.clone();
        let items = tokio::task::spawn_blocking(move || {
            let _access = ScopedAccess::acquire(scope, &root);
            scan_vault(&root)
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        info!("[Vault] Found {} notes", items.len());
        Ok(items)
    }
}

/// Scan a vault directory (blocking).
pub fn scan_vault(root: &Path) -> Result<Vec<Item>> {
    let root = fs::canonicalize(root)?;
    if !root.is_dir() {
        return Err(Error::Config(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut items = Vec::new();
    let walker = WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("[Vault] Skipping unreadable entry: {}", e);
                continue;
            }
        };

        if entry.file_type().is_file() && is_markdown(entry.path()) {
            items.push(read_note(entry.path()));
        }
    }

    Ok(items)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Build an item from one note on disk.
fn read_note(path: &Path) -> Item {
    let content = match fs::read(path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!("[Vault] Cannot read {}: {}", path.display(), e);
            None
        }
    };

    let title = content
        .as_deref()
        .and_then(extract_title)
        .unwrap_or_else(|| file_stem(path));
    let tags = content.as_deref().map(extract_tags).unwrap_or_default();
    let updated_at = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());

    let mut item = Item::new(title, Source::Vault, updated_at).with_tags(tags);
    item.link = Url::from_file_path(path).ok().map(String::from);
    item
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Title from a leading `# Heading` (first non-empty line).
pub fn extract_title(content: &str) -> Option<String> {
    content
        .lines()
        .find(|line| !line.trim().is_empty())
        .and_then(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Tags from the `tags:` line and inline `#tag` tokens.
pub fn extract_tags(content: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    if let Some(line) = content
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with("tags:"))
    {
        for value in line["tags:".len()..].split(',') {
            let value = value
                .trim()
                .trim_matches(|c| matches!(c, '[' | ']' | '"' | '\''))
                .trim();
            if !value.is_empty() {
                tags.insert(value.to_string());
            }
        }
    }

    tags.extend(content.split_whitespace().filter_map(inline_tag));
    tags
}

fn inline_tag(token: &str) -> Option<String> {
    let rest = token.strip_prefix('#')?;
    // `##` is a heading marker, not a tag
    if rest.starts_with('#') {
        return None;
    }
    let tag = rest.trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?' | ')'));
    (!tag.is_empty()).then(|| tag.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectors::scope::testing::CountingScope;
    use crate::secrets::MemorySecretStore;
    use tempfile::TempDir;

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_tags_from_frontmatter_and_body() {
        let content = "---\ntags: [work, urgent]\n---\nPing #alice about #work\n";
        assert_eq!(extract_tags(content), set(&["work", "urgent", "alice"]));
    }

    #[test]
    fn test_heading_markers_are_not_tags() {
        let content = "# Title\n## Section\nSee #rust, and #async.\n";
        assert_eq!(extract_tags(content), set(&["rust", "async"]));
    }

    #[test]
    fn test_title_from_heading() {
        assert_eq!(
            extract_title("\n# Weekly review \nbody").as_deref(),
            Some("Weekly review")
        );
        assert_eq!(extract_title("## Not a title\n"), None);
        assert_eq!(extract_title("plain text"), None);
        assert_eq!(extract_title("# \n"), None);
    }

    #[test]
    fn test_title_falls_back_to_file_name() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("ideas.md");
        fs::write(&path, "some thoughts without heading\n")?;

        let item = read_note(&path);
        assert_eq!(item.title, "ideas");
        assert_eq!(item.source, Source::Vault);
        assert!(item.link.as_deref().unwrap_or("").starts_with("file://"));
        Ok(())
    }

    #[test]
    fn test_scan_skips_hidden_and_non_markdown() -> Result<()> {
        let dir = TempDir::new()?;
        let root = dir.path();
        fs::create_dir_all(root.join("projects/deep"))?;
        fs::create_dir_all(root.join(".obsidian"))?;
        fs::write(root.join("inbox.md"), "# Inbox\n#todo")?;
        fs::write(root.join("projects/deep/Plan.MD"), "# Plan")?;
        fs::write(root.join(".hidden.md"), "# Hidden")?;
        fs::write(root.join(".obsidian/workspace.md"), "# Config")?;
        fs::write(root.join("image.png"), [0u8, 1, 2])?;

        let mut titles: Vec<String> = scan_vault(root)?.into_iter().map(|i| i.title).collect();
        titles.sort();

        assert_eq!(titles, vec!["Inbox".to_string(), "Plan".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_without_vault_is_empty() -> Result<()> {
        let connector = VaultConnector::new(Arc::new(MemorySecretStore::new()));

        assert!(!connector.is_configured());
        assert!(connector.try_fetch().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_reads_stored_vault() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(
            dir.path().join("meeting.md"),
            "# Meeting\ntags: [work]\nwith #bob",
        )?;

        let scope = Arc::new(CountingScope::default());
        let connector =
            VaultConnector::new(Arc::new(MemorySecretStore::new())).with_scope(scope.clone());
        connector.set_vault(dir.path())?;

        let items = connector.try_fetch().await?;
        assert!(connector.is_configured());
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Meeting");
        assert_eq!(items[0].tags, set(&["work", "bob"]));
        assert_eq!((scope.begins(), scope.ends()), (1, 1));
        Ok(())
    }

    #[tokio::test]
    async fn test_scope_released_when_traversal_fails() -> Result<()> {
        let dir = TempDir::new()?;
        let vault = dir.path().join("vault");
        fs::create_dir(&vault)?;

        let scope = Arc::new(CountingScope::default());
        let connector =
            VaultConnector::new(Arc::new(MemorySecretStore::new())).with_scope(scope.clone());
        connector.set_vault(&vault)?;
        fs::remove_dir(&vault)?;

        assert!(connector.try_fetch().await.is_err());
        assert!(connector.fetch().await.is_empty());
        assert_eq!(scope.begins(), scope.ends());
        assert_eq!(scope.ends(), 2);
        Ok(())
    }

    #[test]
    fn test_set_vault_rejects_file() -> Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("note.md");
        fs::write(&file, "x")?;

        let connector = VaultConnector::new(Arc::new(MemorySecretStore::new()));
        assert!(connector.set_vault(&file).is_err());
        assert!(!connector.is_configured());
        Ok(())
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_set_vault_rejects_non_utf8_path() -> Result<()> {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new()?;
        let vault = dir.path().join(OsStr::from_bytes(b"vault-\xff"));
        fs::create_dir(&vault)?;

        let connector = VaultConnector::new(Arc::new(MemorySecretStore::new()));
        assert!(matches!(
            connector.set_vault(&vault),
            Err(Error::Config(_))
        ));
        assert!(!connector.is_configured());
        assert_eq!(connector.vault_path()?, None);
        Ok(())
    }
}
