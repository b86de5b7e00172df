//! Config module - Manages pkm-sync configuration (pkm-sync.toml).
//!
//! Configuration file contains:
//! - Location of the encrypted index
//! - Remote sync service settings
//! - Workspace OAuth client settings
//! - Fetch mode and corrupted-index policy

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the orchestrator drives its connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// One connector at a time, in registration order
    #[default]
    Sequential,
    /// All connectors at once; progress advances as each completes
    Concurrent,
}

/// What to do when the persisted index fails authentication on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Move the corrupt file aside and start from an empty index
    #[default]
    Reset,
    /// Refuse to start
    Fail,
}

/// Remote sync service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the sync service
    #[serde(default = "default_remote_base_url")]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Whether `sync` pushes the index after merging
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_remote_base_url() -> String {
    "http://localhost:18789".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_remote_base_url(),
            timeout_secs: default_timeout_secs(),
            enabled: true,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Workspace OAuth and search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// OAuth client id
    #[serde(default)]
    pub client_id: String,
    /// OAuth client secret
    #[serde(default)]
    pub client_secret: String,
    /// Custom-scheme redirect registered with the provider
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    /// API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Value of the API version header
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Requested scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Search page size
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_redirect_uri() -> String {
    "pkmsync://workspace-oauth".to_string()
}

fn default_api_base() -> String {
    "https://api.notion.com".to_string()
}

fn default_api_version() -> String {
    "2022-06-28".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["read:content".to_string(), "read:user".to_string()]
}

fn default_page_size() -> u32 {
    20
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            api_base: default_api_base(),
            api_version: default_api_version(),
            scopes: default_scopes(),
            page_size: default_page_size(),
        }
    }
}

impl WorkspaceConfig {
    /// Fill client credentials from `PKM_WORKSPACE_CLIENT_ID` /
    /// `PKM_WORKSPACE_CLIENT_SECRET` when set.
    pub fn apply_env(&mut self) {
        if let Ok(id) = std::env::var("PKM_WORKSPACE_CLIENT_ID") {
            self.client_id = id;
        }
        if let Ok(secret) = std::env::var("PKM_WORKSPACE_CLIENT_SECRET") {
            self.client_secret = secret;
        }
    }

    /// Whether an OAuth client is configured at all.
    pub fn has_client(&self) -> bool {
        !self.client_id.is_empty()
    }
}

/// Secret store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Keychain service name
    #[serde(default = "default_service")]
    pub service: String,
}

fn default_service() -> String {
    "pkm-sync".to_string()
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
        }
    }
}

/// Main pkm-sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Config version (for future migrations)
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path of the encrypted index file
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Sequential or concurrent connector fetches
    #[serde(default)]
    pub fetch_mode: FetchMode,

    /// Policy for an index that fails authentication
    #[serde(default)]
    pub on_corrupt_index: RecoveryPolicy,

    /// Remote sync service
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Workspace connector
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Secret store
    #[serde(default)]
    pub secrets: SecretsConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            fetch_mode: FetchMode::default(),
            on_corrupt_index: RecoveryPolicy::default(),
            remote: RemoteConfig::default(),
            workspace: WorkspaceConfig::default(),
            secrets: SecretsConfig::default(),
        }
    }
}

/// Get default data directory (~/.local/share/pkm-sync/).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("pkm-sync"))
        .unwrap_or_else(|| PathBuf::from("./pkm-sync"))
}

/// Get default index file path.
pub fn default_index_path() -> PathBuf {
    default_data_dir().join("pkm_index.enc")
}

/// Get default config directory (~/.config/pkm-sync/).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("pkm-sync"))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get default config file path.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("pkm-sync.toml")
}

impl Config {
    /// Create new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Cannot parse config file: {}", path.display()))?;
        config.workspace.apply_env();

        Ok(config)
    }

    /// Load config from `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let mut config = Self::default();
            config.workspace.apply_env();
            Ok(config)
        }
    }

    /// Save config to file.
    pub fn save(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).with_context(|| "Cannot serialize config to TOML")?;

        std::fs::write(path, content)
            .with_context(|| format!("Cannot write config file: {}", path.display()))?;

        // The file may carry the OAuth client secret
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}
