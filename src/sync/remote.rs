//! Remote sync client - JSON over HTTP to the PKM sync service.
//!
//! Endpoints (relative to the configured base URL):
//! - `POST /sync/pkm`: the serialized index
//! - `POST /query/pkm`: `{"text": ...}`, answers a JSON array of items
//! - `POST /summarize/pkm`: `{"text": ...}`, answers plain text
//!
//! Nothing retries. `query` and `summarize` never fail: problems are logged
//! and yield an empty answer.

use crate::error::{Error, Result};
use crate::model::{Index, Item};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const SYNC_PATH: &str = "/sync/pkm";
const QUERY_PATH: &str = "/query/pkm";
const SUMMARIZE_PATH: &str = "/summarize/pkm";

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

/// Client for the remote sync service
#[derive(Clone)]
pub struct RemoteSyncClient {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteSyncClient {
    /// Create a client. A trailing `/` on `base_url` is ignored.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST `body` and fail on a non-2xx answer.
    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let url = self.url(path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response)
    }

    /// Upload the whole index. The response body is ignored.
    pub async fn push_index(&self, index: &Index) -> Result<()> {
        self.post(SYNC_PATH, index).await?;
        debug!("[Remote] Pushed {} items", index.len());
        Ok(())
    }

    /// Search the remote index.
    pub async fn query(&self, text: &str) -> Vec<Item> {
        match self.try_query(text).await {
            Ok(items) => items,
            Err(e) => {
                warn!("[Remote] Query failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_query(&self, text: &str) -> Result<Vec<Item>> {
        let response = self.post(QUERY_PATH, &TextRequest { text }).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Ask the service to summarize. Returns the raw answer text.
    pub async fn summarize(&self, text: &str) -> String {
        match self.try_summarize(text).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("[Remote] Summarize failed: {}", e);
                String::new()
            }
        }
    }

    async fn try_summarize(&self, text: &str) -> Result<String> {
        let response = self.post(SUMMARIZE_PATH, &TextRequest { text }).await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Source;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RemoteSyncClient {
        RemoteSyncClient::new(format!("{}/", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client =
            RemoteSyncClient::new("http://localhost:18789/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:18789");
        assert_eq!(client.url(SYNC_PATH), "http://localhost:18789/sync/pkm");
    }

    #[tokio::test]
    async fn test_push_index_posts_serialized_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/pkm"))
            .and(body_partial_json(json!({ "items": [{ "title": "Roadmap", "source": "vault" }] })))
            .respond_with(ResponseTemplate::new(200).set_body_string("ignored"))
            .expect(1)
            .mount(&server)
            .await;

        let mut index = Index::empty();
        index.merge([Item::new("Roadmap", Source::Vault, Utc::now())], Utc::now());

        assert!(client(&server).push_index(&index).await.is_ok());
    }

    #[tokio::test]
    async fn test_push_index_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/pkm"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client(&server).push_index(&Index::empty()).await;
        assert!(matches!(result, Err(Error::HttpStatus { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_query_decodes_items() {
        let server = MockServer::start().await;
        let item = Item::new("Meeting notes", Source::Workspace, Utc::now())
            .with_link("https://example.com/p/1")
            .with_tags(["work"]);
        Mock::given(method("POST"))
            .and(path("/query/pkm"))
            .and(body_json(json!({ "text": "meeting" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![item.clone()]))
            .mount(&server)
            .await;

        assert_eq!(client(&server).query("meeting").await, vec![item]);
    }

    #[tokio::test]
    async fn test_query_non_json_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/pkm"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        assert!(client(&server).query("anything").await.is_empty());
    }

    #[tokio::test]
    async fn test_query_server_error_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query/pkm"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(client(&server).query("anything").await.is_empty());
    }

    #[tokio::test]
    async fn test_summarize_returns_raw_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize/pkm"))
            .and(body_json(json!({ "text": "last week" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("Three meetings, one launch."))
            .mount(&server)
            .await;

        assert_eq!(
            client(&server).summarize("last week").await,
            "Three meetings, one launch."
        );
    }

    #[tokio::test]
    async fn test_summarize_failure_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/summarize/pkm"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert_eq!(client(&server).summarize("x").await, "");
    }
}
