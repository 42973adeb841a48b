//! Transport seams used by the update engine
//!
//! The cache refresh and the fetch stage only talk to these traits, so tests
//! and alternative transports can stand in for the HTTP client.

use async_trait::async_trait;
use std::path::Path;

use crate::config::Repository;
use crate::error::Result;
use crate::index::RepositoryIndex;

/// Something that can produce a repository's current index
#[async_trait]
pub trait IndexSource: Send + Sync {
    async fn fetch_index(&self, repo: &Repository) -> Result<RepositoryIndex>;
}

/// Something that can download a chart archive
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Download `url` into `destination` and return the bytes written
    ///
    /// Fails with `FetchFailed` on any transport error, non-success status
    /// or short body.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<Vec<u8>>;
}
