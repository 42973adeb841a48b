//! Home directory layout
//!
//! ```text
//! <home>/
//!   repositories.yaml
//!   cache/index.db
//! ```

use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};

/// Environment variable overriding the home location
pub const HOME_ENV: &str = "CHARTDEP_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$CHARTDEP_HOME`, or `<data dir>/chartdep`
    pub fn from_env() -> Result<Self> {
        if let Some(root) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::new(root));
        }
        Self::default_root().map(Self::new)
    }

    pub fn default_root() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| RepoError::InvalidConfig {
            message: "Could not determine data directory".to_string(),
        })?;
        Ok(data_dir.join("chartdep"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repositories_file(&self) -> PathBuf {
        self.root.join("repositories.yaml")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn cache_db(&self) -> PathBuf {
        self.cache_dir().join("index.db")
    }
}
