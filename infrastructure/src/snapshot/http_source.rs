// ./infrastructure/src/snapshot/http_source.rs
use application::{ApplicationError, SnapshotSource};
use async_trait::async_trait;
use tracing::{debug, error, instrument};

/// Snapshot served over HTTP. Any non-2xx response is a fetch failure.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSnapshotSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    fn fetch_error(&self, reason: String) -> ApplicationError {
        error!(location = %self.url, "Snapshot fetch failed: {}", reason);
        ApplicationError::Fetch {
            location: self.url.clone(),
            reason,
        }
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    fn location(&self) -> &str {
        &self.url
    }

    #[instrument(skip(self), fields(location = %self.url))]
    async fn fetch(&self) -> Result<String, ApplicationError> {
        debug!("Requesting snapshot");
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.fetch_error(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.fetch_error(format!("unexpected status {}", status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.fetch_error(format!("failed to read response body: {}", e)))?;
        debug!(bytes = body.len(), "Snapshot received");
        Ok(body)
    }
}
