//! Lock file (`requirements.lock`)
//!
//! Records the exact versions and archive digests of the last successful
//! update, together with a digest of the manifest they were resolved from.

use chartdep_core::{Dependency, Manifest};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};
use crate::verify::compute_digest;

/// File name of the lock file inside a bundle
pub const LOCK_FILE: &str = "requirements.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockFile {
    /// When this lock file was generated
    pub generated: DateTime<Utc>,

    /// SHA256 of the manifest the lock was resolved from
    pub digest: String,

    #[serde(default)]
    pub dependencies: Vec<LockedDependency>,
}

/// A dependency pinned to the exact version that was installed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    pub name: String,

    /// Exact version (never a range)
    pub version: String,

    /// Repository reference as written in the manifest
    pub repository: String,

    /// SHA256 of the installed archive
    pub digest: String,
}

impl LockFile {
    pub fn new(manifest: &Manifest, dependencies: Vec<LockedDependency>) -> Result<Self> {
        Ok(Self {
            generated: Utc::now(),
            digest: manifest_digest(manifest)?,
            dependencies,
        })
    }

    pub fn path(bundle: &Path) -> PathBuf {
        bundle.join(LOCK_FILE)
    }

    /// Load the lock file of a bundle
    pub fn load(bundle: &Path) -> Result<Self> {
        Self::load_optional(bundle)?.ok_or_else(|| RepoError::LockFileNotFound {
            path: Self::path(bundle).display().to_string(),
        })
    }

    /// Load the lock file of a bundle, if there is one
    pub fn load_optional(bundle: &Path) -> Result<Option<Self>> {
        let path = Self::path(bundle);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let lock: Self = serde_yaml::from_str(&content)?;
        Ok(Some(lock))
    }

    /// Write the lock file next to the manifest, replacing any old one in a
    /// single rename
    pub fn save(&self, bundle: &Path) -> Result<()> {
        let content = serde_yaml::to_string(self)?;

        let mut tmp = tempfile::NamedTempFile::new_in(bundle)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(Self::path(bundle)).map_err(|e| RepoError::Io(e.error))?;
        Ok(())
    }

    /// Whether the manifest changed since this lock was written
    pub fn is_outdated(&self, manifest: &Manifest) -> Result<bool> {
        if self.digest != manifest_digest(manifest)? {
            return Ok(true);
        }

        let locked: Vec<&str> = self.dependencies.iter().map(|d| d.name.as_str()).collect();
        let declared: Vec<&str> = manifest.dependencies.iter().map(|d| d.name.as_str()).collect();
        Ok(locked != declared)
    }

    /// Get a locked dependency by name
    pub fn get(&self, name: &str) -> Option<&LockedDependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }

    /// The manifest with every constraint replaced by its locked version
    pub fn pinned_manifest(&self) -> Manifest {
        Manifest::new(
            self.dependencies
                .iter()
                .map(|d| Dependency::new(&d.name, &d.version, &d.repository))
                .collect(),
        )
    }
}

/// SHA256 over the canonical YAML form of a manifest
pub fn manifest_digest(manifest: &Manifest) -> Result<String> {
    let yaml = manifest.to_yaml()?;
    Ok(format!("sha256:{}", compute_digest(yaml.as_bytes())))
}
