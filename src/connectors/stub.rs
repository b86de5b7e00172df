//! Placeholder connector for sources without an integration yet.

use super::Connector;
use crate::error::Result;
use crate::model::{Item, Source};
use async_trait::async_trait;
use tracing::debug;

/// Connector that is never configured and always yields nothing.
#[derive(Debug, Clone, Copy)]
pub struct StubConnector {
    source: Source,
}

impl StubConnector {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Connector for StubConnector {
    fn source(&self) -> Source {
        self.source
    }

    fn is_configured(&self) -> bool {
        false
    }

    async fn try_fetch(&self) -> Result<Vec<Item>> {
        debug!("[{}] No integration, nothing to fetch", self.source);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stub_is_empty() {
        for source in [Source::Highlights, Source::Notes, Source::Memory] {
            let connector = StubConnector::new(source);
            assert_eq!(connector.source(), source);
            assert!(!connector.is_configured());
            assert!(connector.fetch().await.is_empty());
        }
    }
}
