//! Command implementations for the pkm CLI.
//!
//! Main commands:
//! - sync: fetch all connectors with a progress bar, merge, persist, push
//! - connect / disconnect: manage the vault location and workspace token
//! - status / list: inspect the local index
//! - query / summarize: ask the remote service

use super::{Account, ConnectTarget};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Local;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use pkm_sync::config::{default_config_path, Config};
use pkm_sync::connectors::AuthorizationPrompt;
use pkm_sync::utils::open_browser;
use pkm_sync::{
    Connector, Error, IndexStore, Item, KeyringSecretStore, RemoteSyncClient, SecretStore, Source,
    StubConnector, SyncEvent, SyncOrchestrator, VaultConnector, WorkspaceConnector,
};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Everything a command needs, wired from the config.
pub struct App {
    config: Config,
    config_path: PathBuf,
    orchestrator: SyncOrchestrator,
    vault: Arc<VaultConnector>,
    workspace: Arc<WorkspaceConnector>,
    remote: RemoteSyncClient,
}

impl App {
    /// Load config, build the connectors and open the index.
    pub async fn open(config_path: Option<&Path>) -> Result<Self> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);
        let config = Config::load_or_default(&config_path)?;
        debug!("Using config {}", config_path.display());

        let secrets: Arc<dyn SecretStore> =
            Arc::new(KeyringSecretStore::new(config.secrets.service.clone()));
        let vault = Arc::new(VaultConnector::new(secrets.clone()));
        let http = reqwest::Client::builder()
            .timeout(config.remote.timeout())
            .build()
            .context("Cannot create HTTP client")?;
        let workspace = Arc::new(
            WorkspaceConnector::new(config.workspace.clone(), secrets.clone()).with_client(http),
        );
        let remote = RemoteSyncClient::new(config.remote.base_url.clone(), config.remote.timeout())
            .context("Cannot create remote sync client")?;

        let mut builder = SyncOrchestrator::builder(IndexStore::new(&config.index_path, secrets))
            .connector(vault.clone())
            .connector(workspace.clone())
            .connector(Arc::new(StubConnector::new(Source::Highlights)))
            .connector(Arc::new(StubConnector::new(Source::Notes)))
            .connector(Arc::new(StubConnector::new(Source::Memory)))
            .fetch_mode(config.fetch_mode)
            .recovery(config.on_corrupt_index);
        if config.remote.enabled {
            builder = builder.remote(remote.clone());
        }

        let orchestrator = builder
            .build()
            .with_context(|| format!("Cannot open index {}", config.index_path.display()))?;

        Ok(Self {
            config,
            config_path,
            orchestrator,
            vault,
            workspace,
            remote,
        })
    }
}

/// Shows the authorization page in the browser and reads the redirect URL
/// pasted back by the user.
struct BrowserPrompt;

#[async_trait]
impl AuthorizationPrompt for BrowserPrompt {
    async fn obtain_callback(
        &self,
        authorize_url: &Url,
        callback_scheme: &str,
    ) -> pkm_sync::Result<Url> {
        println!("\nOpen this URL to authorize pkm:");
        println!("  {}", authorize_url.as_str().blue().underline());
        if !open_browser(authorize_url.as_str()) {
            println!(
                "{}",
                "Could not open a browser, copy the URL manually.".yellow()
            );
        }

        let prompt = format!(
            "Paste the {}:// URL you were sent to (empty to cancel)",
            callback_scheme
        );
        let input = tokio::task::spawn_blocking(move || {
            dialoguer::Input::<String>::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        let input = input.trim();
        if input.is_empty() {
            return Err(Error::AuthorizationCancelled);
        }
        Url::parse(input).map_err(|e| Error::AuthorizationFailed(format!("not a URL: {}", e)))
    }
}

/// Run a full sync with a progress bar.
pub async fn sync(app: &App) -> Result<()> {
    println!("{}", "Syncing knowledge sources...".cyan().bold());

    let total = app.orchestrator.connectors().count() as u64;
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("  [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );

    let mut events = app.orchestrator.subscribe();
    let bar = pb.clone();
    let drawer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(SyncEvent::Progress { source, progress }) => {
                    bar.set_position((progress * total as f64).round() as u64);
                    bar.set_message(source.display_name());
                }
                Ok(SyncEvent::Finished(_)) | Err(RecvError::Closed) => break,
                Ok(SyncEvent::Started) | Err(RecvError::Lagged(_)) => {}
            }
        }
    });

    let report = app.orchestrator.connect_all().await;
    drawer.await.context("Progress display failed")?;
    pb.finish_and_clear();

    for outcome in &report.outcomes {
        let name = outcome.source.display_name();
        match &outcome.result {
            Ok(count) => println!(
                "  {} {:<16} {}",
                "✓".green(),
                name,
                format!("{} items", count).dimmed()
            ),
            Err(reason) => println!("  {} {:<16} {}", "✗".red(), name, reason.red()),
        }
    }

    println!(
        "\n{} {} items in index ({} new, {} updated)",
        "Done:".green().bold(),
        report.total_items,
        report.merge.inserted,
        report.merge.updated
    );
    if !report.persisted {
        println!("{}", "Warning: the index could not be saved locally.".yellow());
    }
    if app.config.remote.enabled {
        if report.pushed {
            println!("  {} Pushed to {}", "✓".green(), app.remote.base_url());
        } else {
            println!(
                "  {} Remote {} unreachable, index kept locally",
                "!".yellow(),
                app.remote.base_url()
            );
        }
    }

    Ok(())
}

/// Connect a vault directory or authorize the workspace, then import it.
pub async fn connect(app: &App, target: ConnectTarget) -> Result<()> {
    let source = match target {
        ConnectTarget::Vault { path } => {
            let stored = app
                .vault
                .set_vault(&path)
                .with_context(|| format!("Cannot use {} as vault", path.display()))?;
            println!("  {} Vault: {}", "✓".green(), stored.display());
            Source::Vault
        }
        ConnectTarget::Workspace => {
            if !app.config.workspace.has_client() {
                bail!(
                    "Workspace OAuth client is not configured. Set workspace.client_id in {} or PKM_WORKSPACE_CLIENT_ID",
                    app.config_path.display()
                );
            }
            app.workspace
                .authorize(&BrowserPrompt)
                .await
                .context("Workspace authorization failed")?;
            println!("  {} Workspace authorized", "✓".green());
            Source::Workspace
        }
    };

    let count = app
        .orchestrator
        .connect_one(source)
        .await
        .with_context(|| format!("Cannot import {}", source.display_name()))?;
    println!(
        "  {} Imported {} items from {}",
        "✓".green(),
        count.to_string().cyan(),
        source.display_name()
    );
    Ok(())
}

/// Forget a vault location or workspace token.
pub fn disconnect(app: &App, account: Account) -> Result<()> {
    match account {
        Account::Vault => app.vault.clear_vault()?,
        Account::Workspace => app.workspace.disconnect()?,
    }
    println!("  {} Disconnected {:?}", "✓".green(), account);
    Ok(())
}

/// Show connectors, item counts and last merge.
pub async fn status(app: &App) -> Result<()> {
    println!("{}", "📊 pkm Status".bold().cyan());
    println!();

    let index = app.orchestrator.index().await;
    println!("Config:    {}", app.config_path.display());
    println!("Index:     {}", app.orchestrator.store().path().display());
    println!("Items:     {}", index.len().to_string().cyan());
    let last_sync = index
        .updated_at
        .map(|ts| ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("Last sync: {}", last_sync);
    let remote = if app.config.remote.enabled {
        app.remote.base_url().to_string()
    } else {
        "disabled".dimmed().to_string()
    };
    println!("Remote:    {}", remote);
    println!();

    for connector in app.orchestrator.connectors() {
        let source = connector.source();
        let state = if connector.is_configured() {
            "connected".green().to_string()
        } else {
            "not connected".dimmed().to_string()
        };
        println!(
            "  - {:<16} {:<14} {} items",
            source.display_name(),
            state,
            index.by_source(source).count()
        );
    }

    if let Some(path) = app.vault.vault_path()? {
        println!("\nVault path: {}", path.display());
    }

    Ok(())
}

/// List indexed items.
pub async fn list(app: &App, source: Option<String>) -> Result<()> {
    let filter = source.map(|s| s.parse::<Source>()).transpose()?;
    let index = app.orchestrator.index().await;

    let items: Vec<&Item> = index
        .items
        .iter()
        .filter(|item| filter.map_or(true, |source| item.source == source))
        .collect();

    if items.is_empty() {
        println!("{}", "No items. Run `pkm sync` first.".yellow());
        return Ok(());
    }

    print_items(&items);
    println!("\n{} items", items.len().to_string().cyan());
    Ok(())
}

/// Search the remote index.
pub async fn query(app: &App, text: &str) -> Result<()> {
    let items = app.remote.query(text).await;
    if items.is_empty() {
        println!("{}", "No results.".yellow());
        return Ok(());
    }

    print_items(&items.iter().collect::<Vec<_>>());
    Ok(())
}

/// Print the remote summary.
pub async fn summarize(app: &App, text: &str) -> Result<()> {
    let summary = app.remote.summarize(text).await;
    if summary.trim().is_empty() {
        println!("{}", "No summary available.".yellow());
    } else {
        println!("{}", summary.trim());
    }
    Ok(())
}

/// Empty the local index.
pub async fn clear(app: &App, yes: bool) -> Result<()> {
    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Remove every item from the local index?")
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    app.orchestrator.clear_cache().await?;
    println!("  {} Index cleared", "✓".green());
    Ok(())
}

fn print_items(items: &[&Item]) {
    for item in items {
        let tags = if item.tags.is_empty() {
            String::new()
        } else {
            format!(
                " [{}]",
                item.tags.iter().cloned().collect::<Vec<_>>().join(", ")
            )
        };
        println!(
            "  {} {}{} {}",
            format!("[{}]", item.source).dimmed(),
            item.title.white().bold(),
            tags.cyan(),
            item.updated_at
                .with_timezone(&Local)
                .format("%Y-%m-%d")
                .to_string()
                .dimmed()
        );
        if let Some(link) = &item.link {
            println!("     {}", link.dimmed());
        }
    }
}
