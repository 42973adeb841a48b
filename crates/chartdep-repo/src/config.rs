//! Repository configuration management
//!
//! Stores configured repositories in `<home>/repositories.yaml` and maps the
//! repository references used in manifests back to them.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{RepoError, Result};
use crate::home::Home;

/// Repository configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfig {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Configured repositories
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            repositories: Vec::new(),
        }
    }
}

impl RepositoryConfig {
    /// Load the configuration of a home directory, empty if never written
    pub fn load(home: &Home) -> Result<Self> {
        let path = home.repositories_file();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content).map_err(|e| RepoError::InvalidConfig {
            message: format!("{}: {}", path.display(), e),
        })?;
        Ok(config)
    }

    pub fn save(&self, home: &Home) -> Result<()> {
        self.save_to(&home.repositories_file())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get a repository by name
    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Get a repository by URL, ignoring a trailing slash
    pub fn find_by_url(&self, url: &str) -> Option<&Repository> {
        let wanted = url.trim_end_matches('/');
        self.repositories
            .iter()
            .find(|r| r.url.trim_end_matches('/') == wanted)
    }

    /// Map a manifest repository reference to a configured repository
    ///
    /// `@name` and `alias:name` look up by name; anything else is compared
    /// against the configured URLs.
    pub fn lookup(&self, reference: &str) -> Result<&Repository> {
        let found = match RepositoryRef::parse(reference) {
            RepositoryRef::Named(name) => self.get(name),
            RepositoryRef::Url(url) => self.find_by_url(url),
        };

        found.ok_or_else(|| RepoError::RepositoryUnknown {
            dependency: None,
            repository: reference.to_string(),
            reason: "no repository with this name or URL is configured; add it with 'chartdep repo add'"
                .to_string(),
        })
    }

    /// Add a repository
    pub fn add(&mut self, repo: Repository) -> Result<()> {
        if self.get(&repo.name).is_some() {
            return Err(RepoError::RepositoryAlreadyExists {
                name: repo.name.clone(),
            });
        }
        self.repositories.push(repo);
        Ok(())
    }

    /// Remove a repository by name
    pub fn remove(&mut self, name: &str) -> Result<Repository> {
        let idx = self
            .repositories
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RepoError::RepositoryNotFound {
                name: name.to_string(),
            })?;
        Ok(self.repositories.remove(idx))
    }

    /// List all repository names
    pub fn names(&self) -> Vec<&str> {
        self.repositories.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Repository reference as written in a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryRef<'a> {
    Named(&'a str),
    Url(&'a str),
}

impl<'a> RepositoryRef<'a> {
    pub fn parse(reference: &'a str) -> Self {
        let reference = reference.trim();
        if let Some(name) = reference.strip_prefix('@') {
            RepositoryRef::Named(name)
        } else if let Some(name) = reference.strip_prefix("alias:") {
            RepositoryRef::Named(name)
        } else {
            RepositoryRef::Url(reference)
        }
    }
}

/// Repository definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Unique name for this repository
    pub name: String,

    /// Repository URL (HTTP(S) or file)
    pub url: String,

    /// Repository type (auto-detected if not specified)
    #[serde(default)]
    pub repo_type: RepositoryType,
}

impl Repository {
    /// Create a new repository from URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let url = url.into();
        if name.trim().is_empty() || name.contains('/') {
            return Err(RepoError::InvalidConfig {
                message: format!("invalid repository name '{}'", name),
            });
        }
        let repo_type = RepositoryType::detect(&url)?;

        Ok(Self {
            name,
            url,
            repo_type,
        })
    }

    /// URL of the repository's `index.yaml`
    pub fn index_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        match self.repo_type {
            RepositoryType::File if !base.starts_with("file://") => {
                format!("file://{}/index.yaml", base)
            }
            _ => format!("{}/index.yaml", base),
        }
    }

    pub fn is_http(&self) -> bool {
        matches!(self.repo_type, RepositoryType::Http)
    }
}

/// Repository type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryType {
    /// Chart repository serving `index.yaml` over HTTP(S)
    #[default]
    Http,

    /// Chart repository on the local filesystem
    File,
}

impl RepositoryType {
    /// Auto-detect repository type from URL
    pub fn detect(url: &str) -> Result<Self> {
        if url.starts_with("file://") || url.starts_with('/') {
            Ok(RepositoryType::File)
        } else if url.starts_with("http://") || url.starts_with("https://") {
            url::Url::parse(url).map_err(|e| RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
            Ok(RepositoryType::Http)
        } else {
            Err(RepoError::InvalidRepositoryUrl {
                url: url.to_string(),
                reason: "URL must start with http://, https://, file://, or /".to_string(),
            })
        }
    }
}
