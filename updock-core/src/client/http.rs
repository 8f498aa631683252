//! HTTP update source talking to an updock host

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::UpdateSource;
use crate::error::SourceError;
use crate::protocol::{self, ErrorResponse, VersionsResponse, VERSION_QUERY_KEY};

/// Update source backed by the host's `/versions` and `/updates` endpoints
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    /// Create a source with no transfer timeout
    pub fn new(base_url: &str) -> Result<Self, SourceError> {
        Self::with_timeout(base_url, None)
    }

    /// Create a source whose requests give up after `timeout`
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, SourceError> {
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("updock/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| SourceError::Transfer(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl UpdateSource for HttpSource {
    async fn fetch_catalog(&self) -> Result<Vec<String>, SourceError> {
        let url = self.url("/versions");
        tracing::debug!("Fetching catalog from {}", url);

        let response = self.client.get(&url).send().await.map_err(request_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let message = error_message(response).await;
            return Err(SourceError::Transfer(format!(
                "HTTP {status} from {url}: {message}"
            )));
        }

        let body: VersionsResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Transfer(format!("Invalid catalog from {url}: {e}")))?;

        Ok(body.versions)
    }

    async fn download(&self, requested: &str, dest: &Path) -> Result<Option<String>, SourceError> {
        let url = self.url("/updates");
        tracing::info!("Downloading version {} from {}", requested, url);

        let response = self
            .client
            .get(&url)
            .query(&[(VERSION_QUERY_KEY, requested)])
            .send()
            .await
            .map_err(request_error)?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(SourceError::NotFound(error_message(response).await));
            }
            StatusCode::FORBIDDEN => {
                return Err(SourceError::Rejected(error_message(response).await));
            }
            status => {
                let message = error_message(response).await;
                return Err(SourceError::Transfer(format!("HTTP {status}: {message}")));
            }
        }

        let resolved = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(protocol::version_from_attachment);

        let io_error = |source: std::io::Error| SourceError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(dest).await.map_err(io_error)?;
        let mut body = response.bytes_stream();
        let mut received: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                SourceError::Transfer(format!("Download interrupted after {received} bytes: {e}"))
            })?;
            file.write_all(&chunk).await.map_err(io_error)?;
            received += chunk.len() as u64;
        }

        file.flush().await.map_err(io_error)?;
        file.sync_all().await.map_err(io_error)?;

        tracing::info!("Downloaded {} bytes to {}", received, dest.display());
        Ok(resolved)
    }
}

fn request_error(err: reqwest::Error) -> SourceError {
    if err.is_connect() {
        SourceError::Unreachable(err.to_string())
    } else {
        SourceError::Transfer(err.to_string())
    }
}

/// Pull the `error` field out of a JSON error body, falling back to the status
async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    }
}
