//! Cloud workspace connector with OAuth2 authorization-code flow.
//!
//! Flow:
//! 1. Build the authorize URL (client id, `response_type=code`, redirect URI, scopes)
//! 2. Hand it to an [`AuthorizationPrompt`], which shows it to the user and
//!    waits for exactly one redirect back to the custom callback scheme
//! 3. Exchange the `code` at the token endpoint
//! 4. Keep only the access token, in the secret store
//!
//! Fetching never re-authenticates: without a stored token the source is
//! simply empty.

use super::Connector;
use crate::config::WorkspaceConfig;
use crate::error::{Error, Result};
use crate::model::{Item, Source};
use crate::secrets::{SecretStore, WORKSPACE_TOKEN_KEY};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// API version header sent with every search request
const VERSION_HEADER: &str = "Notion-Version";

/// Presents the authorization page and returns the redirect it ends on.
///
/// Implemented per platform (system browser, embedded web view, ...). The
/// connector itself never touches UI.
#[async_trait]
pub trait AuthorizationPrompt: Send + Sync {
    /// Show `authorize_url` and wait for the redirect to `callback_scheme`.
    ///
    /// Returns [`Error::AuthorizationCancelled`] when the user gives up.
    async fn obtain_callback(&self, authorize_url: &Url, callback_scheme: &str) -> Result<Url>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
struct SearchRequest {
    page_size: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

/// Workspace connector
pub struct WorkspaceConnector {
    client: reqwest::Client,
    config: WorkspaceConfig,
    secrets: Arc<dyn SecretStore>,
    /// Held while a browser session waits for its callback
    auth_lock: Mutex<()>,
}

impl WorkspaceConnector {
    pub fn new(config: WorkspaceConfig, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            secrets,
            auth_lock: Mutex::new(()),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Scheme of the redirect URI, which the callback must use.
    pub fn callback_scheme(&self) -> String {
        Url::parse(&self.config.redirect_uri)
            .map(|url| url.scheme().to_string())
            .unwrap_or_else(|_| "pkmsync".to_string())
    }

    /// Authorization page URL.
    pub fn authorize_url(&self) -> Result<Url> {
        if !self.config.has_client() {
            return Err(Error::NotConfigured(
                "workspace OAuth client id is not set".to_string(),
            ));
        }

        let url = format!(
            "{}?client_id={}&response_type=code&owner=user&redirect_uri={}&scope={}",
            self.endpoint("/v1/oauth/authorize"),
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(&self.config.scopes.join(" ")),
        );
        Url::parse(&url).map_err(|e| Error::Config(format!("invalid authorize URL: {}", e)))
    }

    /// Run the interactive authorization and store the access token.
    ///
    /// Only one authorization may wait for a callback at a time.
    pub async fn authorize(&self, prompt: &dyn AuthorizationPrompt) -> Result<()> {
        let _session = self
            .auth_lock
            .try_lock()
            .map_err(|_| Error::AuthorizationInProgress)?;

        let authorize_url = self.authorize_url()?;
        let scheme = self.callback_scheme();
        info!("[Workspace] Starting authorization");

        let callback = prompt.obtain_callback(&authorize_url, &scheme).await?;
        let code = parse_callback(&callback, &scheme)?;

        let token = self.exchange_code(&code).await?;
        self.secrets.set(WORKSPACE_TOKEN_KEY, token.as_bytes())?;
        info!("[Workspace] Authorization complete, token stored");
        Ok(())
    }

    async fn exchange_code(&self, code: &str) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("/v1/oauth/token"))
            .json(&TokenRequest {
                grant_type: "authorization_code",
                code,
                redirect_uri: &self.config.redirect_uri,
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::AuthorizationFailed(format!(
                "token endpoint returned {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::AuthorizationFailed(format!("bad token response: {}", e)))?;
        Ok(token.access_token)
    }

    /// Forget the stored access token.
    pub fn disconnect(&self) -> Result<()> {
        self.secrets.delete(WORKSPACE_TOKEN_KEY)?;
        info!("[Workspace] Token removed");
        Ok(())
    }
}

#[async_trait]
impl Connector for WorkspaceConnector {
    fn source(&self) -> Source {
        Source::Workspace
    }

    fn is_configured(&self) -> bool {
        self.secrets.contains(WORKSPACE_TOKEN_KEY)
    }

    async fn try_fetch(&self) -> Result<Vec<Item>> {
        let Some(token) = self.secrets.get_string(WORKSPACE_TOKEN_KEY)? else {
            debug!("[Workspace] No access token, skipping");
            return Ok(Vec::new());
        };

        let url = self.endpoint("/v1/search");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .header(VERSION_HEADER, &self.config.api_version)
            .json(&SearchRequest {
                page_size: self.config.page_size,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let search: SearchResponse = serde_json::from_slice(&body)?;

        let total = search.results.len();
        let items: Vec<Item> = search.results.iter().filter_map(result_to_item).collect();
        if items.len() < total {
            debug!(
                "[Workspace] Dropped {} results without a URL",
                total - items.len()
            );
        }
        info!("[Workspace] Found {} items", items.len());
        Ok(items)
    }
}

/// Pull the authorization code out of the redirect.
fn parse_callback(callback: &Url, expected_scheme: &str) -> Result<String> {
    if callback.scheme() != expected_scheme {
        return Err(Error::AuthorizationFailed(format!(
            "unexpected callback scheme '{}'",
            callback.scheme()
        )));
    }

    let mut code = None;
    let mut error = None;
    let mut description = None;
    for (name, value) in callback.query_pairs() {
        match name.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            "error_description" => description = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        warn!("[Workspace] Authorization rejected: {}", error);
        return Err(Error::AuthorizationFailed(match description {
            Some(description) => format!("{}: {}", error, description),
            None => error,
        }));
    }

    code.filter(|code| !code.is_empty()).ok_or_else(|| {
        Error::AuthorizationFailed("callback carried no authorization code".to_string())
    })
}

/// Map one search result to an item. Results without a URL are dropped.
fn result_to_item(result: &Value) -> Option<Item> {
    let url = result.get("url")?.as_str()?.trim();
    if url.is_empty() {
        return None;
    }

    let title = result_title(result)
        .or_else(|| result.get("object")?.as_str().map(str::to_string))
        .unwrap_or_else(|| "Untitled".to_string());
    let updated_at = result
        .get("last_edited_time")
        .and_then(Value::as_str)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(Item::new(title, Source::Workspace, updated_at).with_link(url))
}

/// Page title (the `title`-typed property) or database title.
fn result_title(result: &Value) -> Option<String> {
    let rich_text = result
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|props| {
            props
                .values()
                .find(|prop| prop.get("type").and_then(Value::as_str) == Some("title"))
        })
        .and_then(|prop| prop.get("title"))
        .or_else(|| result.get("title"))?
        .as_array()?;

    let text: String = rich_text
        .iter()
        .filter_map(|part| part.get("plain_text").and_then(Value::as_str))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
