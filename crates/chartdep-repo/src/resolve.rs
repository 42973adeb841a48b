//! Constraint resolution
//!
//! Turns each declared dependency into one concrete chart version using only
//! the configured repositories and the cached indices. Nothing here touches
//! the network.

use chartdep_core::{ChartMetadata, CoreError, Dependency, Manifest, VersionConstraint};
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::IndexCache;
use crate::config::{Repository, RepositoryConfig};
use crate::error::{RepoError, Result};
use crate::index::compare_versions;

/// Where the archive of a resolved dependency comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveSource {
    /// Absolute download URL
    Url(String),
    /// Chart directory packaged on the fly
    LocalChart(PathBuf),
}

/// A dependency pinned to one concrete version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    pub version: String,
    /// Repository name, or the local path for `file://` dependencies
    pub repository: String,
    /// Repository reference as written in the manifest
    pub reference: String,
    pub source: ArchiveSource,
    /// Digest published in the index, copied verbatim
    pub digest: Option<String>,
    /// Constraint the version was chosen for
    pub constraint: String,
}

impl ResolvedDependency {
    /// File name of the archive inside the dependency directory
    pub fn archive_name(&self) -> String {
        chartdep_core::archive_file_name(&self.name, &self.version)
    }

    pub fn download_url(&self) -> String {
        match &self.source {
            ArchiveSource::Url(url) => url.clone(),
            ArchiveSource::LocalChart(path) => format!("file://{}", path.display()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.source, ArchiveSource::LocalChart(_))
    }
}

/// Resolves dependencies against cached repository indices
pub struct ConstraintResolver<'a> {
    config: &'a RepositoryConfig,
    cache: &'a IndexCache,
    bundle: &'a Path,
}

impl<'a> ConstraintResolver<'a> {
    /// `bundle` anchors relative `file://` references
    pub fn new(config: &'a RepositoryConfig, cache: &'a IndexCache, bundle: &'a Path) -> Self {
        Self {
            config,
            cache,
            bundle,
        }
    }

    /// Resolve every dependency in manifest order, stopping at the first failure
    pub fn resolve_all(&self, manifest: &Manifest) -> Result<Vec<ResolvedDependency>> {
        manifest
            .dependencies
            .iter()
            .map(|dep| self.resolve(dep))
            .collect()
    }

    pub fn resolve(&self, dep: &Dependency) -> Result<ResolvedDependency> {
        let constraint = dep
            .constraint()
            .map_err(|e| RepoError::NoMatchingVersion {
                dependency: dep.name.clone(),
                constraint: dep.version.clone(),
                reason: e.to_string(),
            })?;

        let resolved = match dep.local_path() {
            Some(path) => self.resolve_local(dep, &constraint, path),
            None => self.resolve_remote(dep, &constraint),
        };

        let resolved = resolved.map_err(|e| e.for_dependency(&dep.name))?;
        tracing::debug!(
            dependency = %resolved.name,
            version = %resolved.version,
            repository = %resolved.repository,
            "resolved"
        );
        Ok(resolved)
    }

    fn resolve_remote(
        &self,
        dep: &Dependency,
        constraint: &VersionConstraint,
    ) -> Result<ResolvedDependency> {
        let repo = self.config.lookup(&dep.repository)?;
        let index = self.cache.get(&repo.name)?;

        let candidates = index
            .get(&dep.name)
            .ok_or_else(|| RepoError::NoMatchingVersion {
                dependency: dep.name.clone(),
                constraint: dep.version.clone(),
                reason: format!("chart not found in repository '{}'", repo.name),
            })?;

        let entry = candidates
            .iter()
            .filter(|e| constraint.satisfies_str(&e.version))
            .max_by(|a, b| compare_versions(a, b))
            .ok_or_else(|| RepoError::NoMatchingVersion {
                dependency: dep.name.clone(),
                constraint: dep.version.clone(),
                reason: format!(
                    "available versions: {}",
                    candidates
                        .iter()
                        .map(|e| e.version.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })?;

        let url = entry
            .download_url()
            .ok_or_else(|| RepoError::NoMatchingVersion {
                dependency: dep.name.clone(),
                constraint: dep.version.clone(),
                reason: format!("version {} has no download URL", entry.version),
            })?;

        Ok(ResolvedDependency {
            name: dep.name.clone(),
            version: entry.version.clone(),
            repository: repo.name.clone(),
            reference: dep.repository.clone(),
            source: ArchiveSource::Url(absolute_url(repo, url)?),
            digest: entry.digest.clone(),
            constraint: dep.version.clone(),
        })
    }

    fn resolve_local(
        &self,
        dep: &Dependency,
        constraint: &VersionConstraint,
        path: &str,
    ) -> Result<ResolvedDependency> {
        let chart_dir = self.bundle.join(path);
        let metadata = ChartMetadata::load(&chart_dir).map_err(|e| match e {
            CoreError::ChartNotFound { .. } => RepoError::RepositoryUnknown {
                dependency: None,
                repository: dep.repository.clone(),
                reason: format!("no chart found at {}", chart_dir.display()),
            },
            other => RepoError::Core(other),
        })?;

        if !constraint.satisfies_str(&metadata.version) {
            return Err(RepoError::NoMatchingVersion {
                dependency: dep.name.clone(),
                constraint: dep.version.clone(),
                reason: format!("local chart is version {}", metadata.version),
            });
        }

        Ok(ResolvedDependency {
            name: dep.name.clone(),
            version: metadata.version,
            repository: path.to_string(),
            reference: dep.repository.clone(),
            source: ArchiveSource::LocalChart(chart_dir),
            digest: None,
            constraint: dep.version.clone(),
        })
    }
}

/// Resolve an index URL relative to the repository it came from
fn absolute_url(repo: &Repository, url: &str) -> Result<String> {
    if let Ok(parsed) = Url::parse(url) {
        return Ok(parsed.to_string());
    }

    let base = Url::parse(&repo.index_url()).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: repo.url.clone(),
        reason: e.to_string(),
    })?;
    let joined = base.join(url).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    Ok(joined.to_string())
}
