//! Update orchestration
//!
//! Drives one bundle through refresh, resolution, fetch, verification and
//! reconciliation. The first failure aborts the run before `charts/` is
//! touched.

use chartdep_core::Manifest;
use fs4::FileExt;
use futures::{StreamExt, TryStreamExt, stream};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{ArchiveFetcher, IndexSource};
use crate::cache::IndexCache;
use crate::config::{Repository, RepositoryConfig};
use crate::error::{RepoError, Result};
use crate::fetch::{FetchedArchive, StagedArchive, StagingArea, fetch_archive};
use crate::home::Home;
use crate::http::{DEFAULT_TIMEOUT, HttpClient};
use crate::lock::{LockFile, LockedDependency};
use crate::progress::{ProgressSink, TracingSink, UpdateEvent};
use crate::reconcile::{Outcome, Reconciler};
use crate::resolve::{ConstraintResolver, ResolvedDependency};
use crate::verify::{compute_digest, digest_matches, verify};

/// Advisory lock file guarding a bundle during an update
pub const BUNDLE_LOCK_FILE: &str = ".chartdep.lock";

/// Default number of concurrent archive fetches
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    /// Use the cached indices as they are
    pub skip_refresh: bool,
    /// Bound on each index refresh and archive fetch
    pub timeout: Duration,
    /// Maximum fetches in flight
    pub concurrency: usize,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            skip_refresh: false,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Where an update run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Start,
    Refreshing,
    Resolving,
    Fetching,
    Verifying,
    Reconciling,
    Done,
    Aborted,
}

/// Result for one declared dependency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyOutcome {
    pub name: String,
    pub version: String,
    /// Repository reference as written in the manifest
    pub repository: String,
    /// SHA256 of the installed archive
    pub digest: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// In manifest order
    pub dependencies: Vec<DependencyOutcome>,
    /// Stale archive file names that were deleted
    pub removed: Vec<String>,
}

impl UpdateReport {
    /// Lock entries for the installed set
    pub fn locked(&self) -> Vec<LockedDependency> {
        self.dependencies
            .iter()
            .map(|d| LockedDependency {
                name: d.name.clone(),
                version: d.version.clone(),
                repository: d.repository.clone(),
                digest: d.digest.clone(),
            })
            .collect()
    }
}

/// Outcome of refreshing one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshResult {
    pub name: String,
    pub error: Option<String>,
}

/// Exclusive advisory lock on a bundle, released on drop
pub struct BundleLock {
    _file: File,
}

impl BundleLock {
    /// Wait for the lock without blocking the async runtime
    ///
    /// Another holder, in this process or another one, makes this wait until
    /// its guard is dropped.
    pub async fn acquire(bundle: &Path) -> Result<Self> {
        let path = bundle.join(BUNDLE_LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| RepoError::Other(format!("bundle lock task failed: {}", e)))??;

        tracing::debug!(path = %path.display(), "acquired bundle lock");
        Ok(Self { _file: file })
    }
}

/// Dependency update engine for bundles
pub struct DependencyManager {
    config: RepositoryConfig,
    cache: IndexCache,
    indices: Arc<dyn IndexSource>,
    fetcher: Arc<dyn ArchiveFetcher>,
    progress: Arc<dyn ProgressSink>,
    phase: UpdatePhase,
}

impl DependencyManager {
    pub fn new(
        config: RepositoryConfig,
        cache: IndexCache,
        indices: Arc<dyn IndexSource>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        Self {
            config,
            cache,
            indices,
            fetcher,
            progress: Arc::new(TracingSink),
            phase: UpdatePhase::Start,
        }
    }

    /// Manager over a home directory's configuration and cache, using HTTP
    pub fn open(home: &Home, timeout: Duration) -> Result<Self> {
        let config = RepositoryConfig::load(home)?;
        let cache = IndexCache::open(home)?;
        let client = Arc::new(HttpClient::new(timeout)?);
        Ok(Self::new(config, cache, client.clone(), client))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn cache(&self) -> &IndexCache {
        &self.cache
    }

    fn enter(&mut self, phase: UpdatePhase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "update phase");
        self.phase = phase;
    }

    fn emit(&self, event: UpdateEvent) {
        self.progress.emit(&event);
    }

    /// Refresh the cached index of every configured repository
    pub async fn refresh_all(&mut self, timeout: Duration) -> Vec<RefreshResult> {
        let repos = self.config.repositories.clone();
        self.refresh_repositories(&repos, timeout).await
    }

    /// Refresh the given repositories one after another
    ///
    /// Failures are reported, not returned: a stale cached index stays usable.
    pub async fn refresh_repositories(
        &mut self,
        repos: &[Repository],
        timeout: Duration,
    ) -> Vec<RefreshResult> {
        self.emit(UpdateEvent::RefreshStarted);

        let mut results = Vec::with_capacity(repos.len());
        for repo in repos {
            let refreshed =
                tokio::time::timeout(timeout, self.cache.refresh(repo, self.indices.as_ref()))
                    .await
                    .unwrap_or(Err(RepoError::Timeout {
                        seconds: timeout.as_secs(),
                    }));

            match refreshed {
                Ok(index) => {
                    tracing::debug!(repository = %repo.name, charts = index.entries.len(), "refreshed");
                    self.emit(UpdateEvent::RepositoryRefreshed {
                        name: repo.name.clone(),
                    });
                    results.push(RefreshResult {
                        name: repo.name.clone(),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(repository = %repo.name, error = %e, "index refresh failed");
                    self.emit(UpdateEvent::RepositoryRefreshFailed {
                        name: repo.name.clone(),
                        url: repo.url.clone(),
                        error: e.to_string(),
                    });
                    results.push(RefreshResult {
                        name: repo.name.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        self.emit(UpdateEvent::RefreshComplete);
        results
    }

    /// Configured repositories referenced by the manifest, first use first
    fn referenced_repositories(&self, manifest: &Manifest) -> Vec<Repository> {
        let mut repos: Vec<Repository> = Vec::new();
        for dep in &manifest.dependencies {
            if dep.local_path().is_some() {
                continue;
            }
            if let Ok(repo) = self.config.lookup(&dep.repository)
                && !repos.iter().any(|r| r.name == repo.name)
            {
                repos.push(repo.clone());
            }
        }
        repos
    }

    /// Bring `<bundle>/charts` in line with `manifest`
    ///
    /// Holds the bundle lock for the whole run, so concurrent updates of one
    /// bundle take turns.
    pub async fn update(
        &mut self,
        bundle: &Path,
        manifest: &Manifest,
        options: &UpdateOptions,
    ) -> Result<UpdateReport> {
        let _guard = BundleLock::acquire(bundle).await?;
        self.run(bundle, manifest, options, None).await
    }

    async fn run(
        &mut self,
        bundle: &Path,
        manifest: &Manifest,
        options: &UpdateOptions,
        locked: Option<&LockFile>,
    ) -> Result<UpdateReport> {
        self.enter(UpdatePhase::Start);
        let result = self.run_phases(bundle, manifest, options, locked).await;

        match &result {
            Ok(report) => {
                tracing::info!(
                    bundle = %bundle.display(),
                    dependencies = report.dependencies.len(),
                    removed = report.removed.len(),
                    "update complete"
                );
                self.enter(UpdatePhase::Done);
            }
            Err(e) => {
                tracing::warn!(
                    stage = %e.stage(),
                    dependency = e.dependency().unwrap_or("-"),
                    error = %e,
                    "update aborted"
                );
                self.enter(UpdatePhase::Aborted);
            }
        }

        result
    }

    async fn run_phases(
        &mut self,
        bundle: &Path,
        manifest: &Manifest,
        options: &UpdateOptions,
        locked: Option<&LockFile>,
    ) -> Result<UpdateReport> {
        if !options.skip_refresh {
            self.enter(UpdatePhase::Refreshing);
            let repos = self.referenced_repositories(manifest);
            self.refresh_repositories(&repos, options.timeout).await;
        }

        self.enter(UpdatePhase::Resolving);
        let resolved = ConstraintResolver::new(&self.config, &self.cache, bundle).resolve_all(manifest)?;
        self.emit(UpdateEvent::Saving {
            count: resolved.len(),
        });

        let staging = StagingArea::new(bundle)?;

        self.enter(UpdatePhase::Fetching);
        for dep in &resolved {
            if dep.is_local() {
                self.emit(UpdateEvent::Archiving {
                    name: dep.name.clone(),
                    path: dep.repository.clone(),
                });
            } else {
                self.emit(UpdateEvent::Downloading {
                    name: dep.name.clone(),
                    repository: dep.reference.clone(),
                });
            }
        }

        let fetcher = Arc::clone(&self.fetcher);
        let fetched: Vec<FetchedArchive> = stream::iter(
            resolved
                .iter()
                .map(|dep| fetch_archive(fetcher.as_ref(), &staging, dep, options.timeout)),
        )
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await?;

        self.enter(UpdatePhase::Verifying);
        let staged = resolved
            .iter()
            .zip(fetched)
            .map(|(dep, archive)| verify_archive(dep, archive, locked))
            .collect::<Result<Vec<_>>>()?;

        self.enter(UpdatePhase::Reconciling);
        let summary = Reconciler::new(bundle).reconcile(&staged)?;

        self.emit(UpdateEvent::DeletingOutdated);
        for file in &summary.removed {
            self.emit(UpdateEvent::Removed { file: file.clone() });
        }

        let dependencies = resolved
            .iter()
            .zip(&staged)
            .zip(summary.outcomes)
            .map(|((dep, archive), (_, outcome))| DependencyOutcome {
                name: dep.name.clone(),
                version: dep.version.clone(),
                repository: dep.reference.clone(),
                digest: archive.digest.clone(),
                outcome,
            })
            .collect();

        Ok(UpdateReport {
            dependencies,
            removed: summary.removed,
        })
    }

    /// Update a bundle from its `requirements.yaml` and rewrite its lock file
    pub async fn update_bundle(
        &mut self,
        bundle: &Path,
        options: &UpdateOptions,
    ) -> Result<UpdateReport> {
        let manifest = Manifest::load(bundle)?;
        let _guard = BundleLock::acquire(bundle).await?;

        let report = self.run(bundle, &manifest, options, None).await?;
        LockFile::new(&manifest, report.locked())?.save(bundle)?;
        Ok(report)
    }

    /// Install exactly what `requirements.lock` records
    ///
    /// Without a lock file this is the same as [`Self::update_bundle`].
    pub async fn build_bundle(
        &mut self,
        bundle: &Path,
        options: &UpdateOptions,
    ) -> Result<UpdateReport> {
        let manifest = Manifest::load(bundle)?;
        let Some(lock) = LockFile::load_optional(bundle)? else {
            tracing::debug!(bundle = %bundle.display(), "no lock file, running update");
            return self.update_bundle(bundle, options).await;
        };

        if lock.is_outdated(&manifest)? {
            return Err(RepoError::LockFileOutdated);
        }

        let _guard = BundleLock::acquire(bundle).await?;
        self.run(bundle, &lock.pinned_manifest(), options, Some(&lock))
            .await
    }
}

/// Check a fetched archive and turn it into a staged one
fn verify_archive(
    dep: &ResolvedDependency,
    archive: FetchedArchive,
    locked: Option<&LockFile>,
) -> Result<StagedArchive> {
    let digest = if dep.is_local() {
        compute_digest(&archive.data)
    } else {
        let digest =
            verify(&archive.data, dep.digest.as_deref()).map_err(|e| e.for_dependency(&dep.name))?;

        if let Some(entry) = locked.and_then(|lock| lock.get(&dep.name))
            && !digest_matches(&entry.digest, &digest)
        {
            return Err(RepoError::DigestMismatch {
                dependency: Some(dep.name.clone()),
                expected: entry.digest.clone(),
                actual: digest,
            });
        }
        digest
    };

    Ok(StagedArchive {
        name: dep.name.clone(),
        version: dep.version.clone(),
        path: archive.path,
        digest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{ChartEntry, RepositoryIndex};
    use crate::progress::MemorySink;
    use async_trait::async_trait;
    use chartdep_core::{Dependency, MANIFEST_FILE};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Serves archives from memory and counts calls
    #[derive(Default)]
    struct MemoryRepo {
        index: RepositoryIndex,
        archives: HashMap<String, Vec<u8>>,
        index_calls: AtomicUsize,
        fetch_calls: AtomicUsize,
        /// Time each fetch takes
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MemoryRepo {
        fn publish(&mut self, name: &str, version: &str, content: &[u8]) {
            let url = format!("http://127.0.0.1:8879/{}-{}.tgz", name, version);
            self.index.add_entry(
                ChartEntry::new(name, version)
                    .with_url(&url)
                    .with_digest(compute_digest(content)),
            );
            self.archives.insert(url, content.to_vec());
        }
    }

    #[async_trait]
    impl IndexSource for MemoryRepo {
        async fn fetch_index(&self, _repo: &Repository) -> Result<RepositoryIndex> {
            self.index_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.index.clone())
        }
    }

    #[async_trait]
    impl ArchiveFetcher for MemoryRepo {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<Vec<u8>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let data = self.archives.get(url).cloned().ok_or_else(|| RepoError::FetchFailed {
                dependency: None,
                url: url.to_string(),
                reason: "HTTP error: 404".to_string(),
            })?;
            std::fs::write(destination, &data)?;
            Ok(data)
        }
    }

    fn manager(repo: Arc<MemoryRepo>) -> (DependencyManager, Arc<MemorySink>) {
        let mut config = RepositoryConfig::default();
        config
            .add(Repository::new("test", "http://127.0.0.1:8879").unwrap())
            .unwrap();
        let sink = Arc::new(MemorySink::new());
        let manager = DependencyManager::new(
            config,
            IndexCache::open_memory().unwrap(),
            repo.clone(),
            repo,
        )
        .with_progress(sink.clone());
        (manager, sink)
    }

    fn published() -> MemoryRepo {
        let mut repo = MemoryRepo::default();
        repo.publish("reqtest", "0.1.0", b"reqtest 0.1.0");
        repo.publish("compressedchart", "0.1.0", b"compressed 0.1.0");
        repo.publish("compressedchart", "0.3.0", b"compressed 0.3.0");
        repo
    }

    #[tokio::test]
    async fn test_update_phases_and_report() {
        let repo = Arc::new(published());
        let (mut manager, sink) = manager(repo.clone());
        let bundle = TempDir::new().unwrap();
        let manifest = Manifest::new(vec![
            Dependency::new("reqtest", "0.1.0", "@test"),
            Dependency::new("compressedchart", "^0.1.0 || ^0.3.0", "@test"),
        ]);

        assert_eq!(manager.phase(), UpdatePhase::Start);
        let report = manager
            .update(bundle.path(), &manifest, &UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(manager.phase(), UpdatePhase::Done);
        assert_eq!(report.dependencies.len(), 2);
        assert_eq!(report.dependencies[1].version, "0.3.0");
        assert!(report.dependencies.iter().all(|d| d.outcome == Outcome::Added));
        assert_eq!(repo.index_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            sink.lines(),
            vec![
                "Hang tight while we grab the latest from your chart repositories...",
                "...Successfully got an update from the \"test\" chart repository",
                "Update Complete.",
                "Saving 2 charts",
                "Downloading reqtest from repo @test",
                "Downloading compressedchart from repo @test",
                "Deleting outdated charts",
            ]
        );
    }

    #[tokio::test]
    async fn test_resolution_failure_aborts_before_fetch() {
        let repo = Arc::new(published());
        let (mut manager, _) = manager(repo.clone());
        let bundle = TempDir::new().unwrap();
        let manifest = Manifest::new(vec![
            Dependency::new("reqtest", "0.1.0", "@test"),
            Dependency::new("compressedchart", "9.9.9", "@test"),
        ]);

        let err = manager
            .update(bundle.path(), &manifest, &UpdateOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, RepoError::NoMatchingVersion { .. }));
        assert_eq!(manager.phase(), UpdatePhase::Aborted);
        assert_eq!(repo.fetch_calls.load(Ordering::SeqCst), 0);
        assert!(!bundle.path().join("charts").exists());
    }

    #[tokio::test]
    async fn test_refresh_failure_falls_back_to_cache() {
        struct Offline;

        #[async_trait]
        impl IndexSource for Offline {
            async fn fetch_index(&self, _repo: &Repository) -> Result<RepositoryIndex> {
                Err(RepoError::NetworkError {
                    message: "connection refused".to_string(),
                })
            }
        }

        let repo = Arc::new(published());
        let (mut manager, sink) = manager(repo.clone());
        let test_repo = manager.config().get("test").unwrap().clone();
        manager.cache.store(&test_repo, &repo.index).unwrap();
        manager.indices = Arc::new(Offline);

        let bundle = TempDir::new().unwrap();
        let manifest = Manifest::new(vec![Dependency::new("reqtest", "0.1.0", "@test")]);
        manager
            .update(bundle.path(), &manifest, &UpdateOptions::default())
            .await
            .unwrap();

        assert!(sink.lines().iter().any(|l| l
            == "...Unable to get an update from the \"test\" chart repository (http://127.0.0.1:8879): Network error: connection refused"));
    }

    #[tokio::test]
    async fn test_update_bundle_writes_lock_and_build_reuses_it() {
        let repo = Arc::new(published());
        let (mut manager, _) = manager(repo.clone());
        let bundle = TempDir::new().unwrap();
        std::fs::write(
            bundle.path().join(MANIFEST_FILE),
            "dependencies:\n  - name: compressedchart\n    version: \">=0.1.0\"\n    repository: \"@test\"\n",
        )
        .unwrap();

        manager
            .update_bundle(bundle.path(), &UpdateOptions::default())
            .await
            .unwrap();
        let lock = LockFile::load(bundle.path()).unwrap();
        assert_eq!(lock.dependencies[0].version, "0.3.0");
        assert_eq!(
            lock.dependencies[0].digest,
            compute_digest(b"compressed 0.3.0")
        );

        let report = manager
            .build_bundle(
                bundle.path(),
                &UpdateOptions {
                    skip_refresh: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(report.dependencies[0].outcome, Outcome::Unchanged);

        std::fs::write(
            bundle.path().join(MANIFEST_FILE),
            "dependencies:\n  - name: compressedchart\n    version: 0.1.0\n    repository: \"@test\"\n",
        )
        .unwrap();
        let err = manager
            .build_bundle(bundle.path(), &UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::LockFileOutdated));
    }

    #[tokio::test]
    async fn test_build_rejects_changed_archive() {
        let repo = Arc::new(published());
        let (mut manager, _) = manager(repo.clone());
        let bundle = TempDir::new().unwrap();
        let manifest = Manifest::new(vec![Dependency::new("reqtest", "0.1.0", "@test")]);
        manifest.save(bundle.path()).unwrap();

        let mut tampered = LockFile::new(&manifest, Vec::new()).unwrap();
        tampered.dependencies.push(LockedDependency {
            name: "reqtest".to_string(),
            version: "0.1.0".to_string(),
            repository: "@test".to_string(),
            digest: "0000".to_string(),
        });
        tampered.save(bundle.path()).unwrap();

        let err = manager
            .build_bundle(bundle.path(), &UpdateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::DigestMismatch { .. }));
        assert!(!bundle.path().join("charts").exists());
    }

    fn slow_repo() -> Arc<MemoryRepo> {
        let mut repo = MemoryRepo::default();
        repo.publish("reqtest", "0.1.0", b"reqtest 0.1.0");
        repo.delay = Duration::from_millis(200);
        Arc::new(repo)
    }

    #[tokio::test]
    async fn test_concurrent_bundle_updates_take_turns() {
        let repo = slow_repo();
        let (mut first, _) = manager(repo.clone());
        let (mut second, _) = manager(repo.clone());
        let bundle = TempDir::new().unwrap();
        Manifest::new(vec![Dependency::new("reqtest", "0.1.0", "@test")])
            .save(bundle.path())
            .unwrap();
        let options = UpdateOptions::default();

        let (a, b) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(
                first.update_bundle(bundle.path(), &options),
                second.update_bundle(bundle.path(), &options),
            )
        })
        .await
        .expect("updates of one bundle never finished");

        a.unwrap();
        b.unwrap();
        assert_eq!(repo.fetch_calls.load(Ordering::SeqCst), 2);
        assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            LockFile::load(bundle.path()).unwrap().dependencies[0].version,
            "0.1.0"
        );
    }

    #[tokio::test]
    async fn test_update_holds_bundle_lock() {
        let repo = slow_repo();
        let (mut first, _) = manager(repo.clone());
        let (mut second, _) = manager(repo.clone());
        let bundle = TempDir::new().unwrap();
        let manifest = Manifest::new(vec![Dependency::new("reqtest", "0.1.0", "@test")]);
        let options = UpdateOptions::default();

        let (a, b) = tokio::time::timeout(Duration::from_secs(10), async {
            tokio::join!(
                first.update(bundle.path(), &manifest, &options),
                second.update(bundle.path(), &manifest, &options),
            )
        })
        .await
        .expect("updates of one bundle never finished");

        a.unwrap();
        b.unwrap();
        assert_eq!(repo.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(bundle.path().join(BUNDLE_LOCK_FILE).exists());
        assert!(bundle.path().join("charts/reqtest-0.1.0.tgz").exists());
    }
}
