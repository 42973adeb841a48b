//! Fetch stage: download or package every resolved dependency into a
//! private staging directory

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use crate::backend::ArchiveFetcher;
use crate::error::{RepoError, Result};
use crate::resolve::{ArchiveSource, ResolvedDependency};

/// Scratch directory inside the bundle, removed when dropped
///
/// Living next to the dependency directory keeps every later move a rename
/// on the same filesystem.
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    pub fn new(bundle: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(".chartdep-staging-")
            .tempdir_in(bundle)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Staging path of a dependency's archive
    pub fn path_for(&self, dep: &ResolvedDependency) -> PathBuf {
        self.dir.path().join(dep.archive_name())
    }
}

/// Archive bytes retrieved for one dependency, not yet verified
#[derive(Debug)]
pub struct FetchedArchive {
    pub path: PathBuf,
    pub data: Vec<u8>,
}

/// A fetched and verified archive waiting to be committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArchive {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    /// Hex SHA256 of the staged file
    pub digest: String,
}

impl StagedArchive {
    pub fn file_name(&self) -> String {
        chartdep_core::archive_file_name(&self.name, &self.version)
    }
}

/// Retrieve one dependency's archive into the staging area
pub async fn fetch_archive(
    fetcher: &dyn ArchiveFetcher,
    staging: &StagingArea,
    dep: &ResolvedDependency,
    timeout: Duration,
) -> Result<FetchedArchive> {
    let path = staging.path_for(dep);

    let data = match &dep.source {
        ArchiveSource::Url(url) => {
            match tokio::time::timeout(timeout, fetcher.fetch(url, &path)).await {
                Ok(result) => result.map_err(|e| {
                    match e {
                        fetch @ RepoError::FetchFailed { .. } => fetch,
                        other => RepoError::FetchFailed {
                            dependency: None,
                            url: url.clone(),
                            reason: other.to_string(),
                        },
                    }
                    .for_dependency(&dep.name)
                })?,
                Err(_) => {
                    return Err(RepoError::FetchFailed {
                        dependency: Some(dep.name.clone()),
                        url: url.clone(),
                        reason: format!("timed out after {}s", timeout.as_secs()),
                    });
                }
            }
        }
        ArchiveSource::LocalChart(chart_dir) => {
            chartdep_core::package_chart(chart_dir, &path)?;
            tokio::fs::read(&path).await?
        }
    };

    tracing::debug!(
        dependency = %dep.name,
        bytes = data.len(),
        path = %path.display(),
        "staged archive"
    );

    Ok(FetchedArchive { path, data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct SlowFetcher;

    #[async_trait]
    impl ArchiveFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str, _destination: &Path) -> Result<Vec<u8>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl ArchiveFetcher for FailingFetcher {
        async fn fetch(&self, _url: &str, _destination: &Path) -> Result<Vec<u8>> {
            Err(RepoError::Io(std::io::Error::other("disk full")))
        }
    }

    fn remote(name: &str) -> ResolvedDependency {
        ResolvedDependency {
            name: name.to_string(),
            version: "0.1.0".to_string(),
            repository: "test".to_string(),
            reference: "@test".to_string(),
            source: ArchiveSource::Url(format!("http://127.0.0.1:1/{}-0.1.0.tgz", name)),
            digest: None,
            constraint: "0.1.0".to_string(),
        }
    }

    #[test]
    fn test_staging_removed_on_drop() {
        let bundle = TempDir::new().unwrap();
        let staging = StagingArea::new(bundle.path()).unwrap();
        let path = staging.path().to_path_buf();
        assert!(path.starts_with(bundle.path()));
        assert_eq!(
            staging.path_for(&remote("reqtest")),
            path.join("reqtest-0.1.0.tgz")
        );

        drop(staging);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_timeout_is_fetch_failure() {
        let bundle = TempDir::new().unwrap();
        let staging = StagingArea::new(bundle.path()).unwrap();

        let err = fetch_archive(
            &SlowFetcher,
            &staging,
            &remote("reqtest"),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::FetchFailed { .. }));
        assert_eq!(err.dependency(), Some("reqtest"));
    }

    #[tokio::test]
    async fn test_other_errors_become_fetch_failures() {
        let bundle = TempDir::new().unwrap();
        let staging = StagingArea::new(bundle.path()).unwrap();

        let err = fetch_archive(
            &FailingFetcher,
            &staging,
            &remote("reqtest"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RepoError::FetchFailed { ref reason, .. } if reason.contains("disk full")));
    }

    #[tokio::test]
    async fn test_local_chart_packaged() {
        let temp = TempDir::new().unwrap();
        let chart_dir = temp.path().join("local");
        std::fs::create_dir_all(&chart_dir).unwrap();
        std::fs::write(
            chart_dir.join("Chart.yaml"),
            "apiVersion: v1\nname: local\nversion: 1.0.0\n",
        )
        .unwrap();

        let staging = StagingArea::new(temp.path()).unwrap();
        let dep = ResolvedDependency {
            name: "local".to_string(),
            version: "1.0.0".to_string(),
            repository: "../local".to_string(),
            reference: "file://../local".to_string(),
            source: ArchiveSource::LocalChart(chart_dir),
            digest: None,
            constraint: "1.0.0".to_string(),
        };

        let fetched = fetch_archive(&FailingFetcher, &staging, &dep, Duration::from_secs(5))
            .await
            .unwrap();
        assert!(fetched.path.ends_with("local-1.0.0.tgz"));
        let meta = chartdep_core::archive::read_chart_metadata_from_bytes(&fetched.data).unwrap();
        assert_eq!(meta.name, "local");
    }
}
