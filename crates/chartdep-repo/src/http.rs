//! HTTP and file transport for indices and archives

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::backend::{ArchiveFetcher, IndexSource};
use crate::config::Repository;
use crate::error::{RepoError, Result};
use crate::index::RepositoryIndex;

/// Default timeout for a single request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client serving both repository indices and chart archives
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chartdep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: e.to_string(),
            })?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fetch the full body of `url`
    ///
    /// `file://` URLs are read from disk.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        if url.starts_with("file://") {
            let path = file_url_to_path(url)?;
            return Ok(tokio::fs::read(&path).await?);
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("{} not found", url),
            });
        }
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("Request to {} failed", url),
            });
        }

        let expected_len = response.content_length();
        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;

        if let Some(expected) = expected_len
            && (bytes.len() as u64) < expected
        {
            return Err(RepoError::NetworkError {
                message: format!(
                    "truncated transfer: received {} of {} bytes",
                    bytes.len(),
                    expected
                ),
            });
        }

        Ok(bytes.to_vec())
    }

    fn map_error(&self, e: reqwest::Error) -> RepoError {
        if e.is_timeout() {
            RepoError::Timeout {
                seconds: self.timeout.as_secs(),
            }
        } else {
            RepoError::from(e)
        }
    }
}

#[async_trait]
impl IndexSource for HttpClient {
    async fn fetch_index(&self, repo: &Repository) -> Result<RepositoryIndex> {
        let index_url = repo.index_url();
        tracing::debug!(repository = %repo.name, url = %index_url, "fetching index");

        let data = match self.get_bytes(&index_url).await {
            Ok(data) => data,
            Err(RepoError::HttpError { status: 404, .. }) => {
                return Err(RepoError::IndexNotFound { url: index_url });
            }
            Err(RepoError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepoError::IndexNotFound { url: index_url });
            }
            Err(e) => return Err(e),
        };

        RepositoryIndex::from_bytes(&data)
    }
}

#[async_trait]
impl ArchiveFetcher for HttpClient {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<Vec<u8>> {
        tracing::debug!(url = %url, destination = %destination.display(), "fetching archive");

        let data = self
            .get_bytes(url)
            .await
            .map_err(|e| RepoError::FetchFailed {
                dependency: None,
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        tokio::fs::write(destination, &data).await?;
        Ok(data)
    }
}

fn file_url_to_path(url: &str) -> Result<PathBuf> {
    let parsed = Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    parsed
        .to_file_path()
        .map_err(|_| RepoError::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        })
}
