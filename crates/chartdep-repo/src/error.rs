//! Error types for repository and dependency operations

use chartdep_core::CoreError;
use std::fmt;
use thiserror::Error;

/// Repository and dependency update errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Repository not found: {name}")]
    RepositoryNotFound { name: String },

    #[error("Repository already exists: {name}")]
    RepositoryAlreadyExists { name: String },

    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("Invalid repository configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    // ============ Index Errors ============
    #[error("Index not found at {url}")]
    IndexNotFound { url: String },

    #[error("Index parse error: {message}")]
    IndexParseError { message: String },

    // ============ Update Errors ============
    #[error("Repository unknown{}: {repository} ({reason})", for_dependency(.dependency))]
    RepositoryUnknown {
        dependency: Option<String>,
        repository: String,
        reason: String,
    },

    #[error("No version of '{dependency}' matches '{constraint}': {reason}")]
    NoMatchingVersion {
        dependency: String,
        constraint: String,
        reason: String,
    },

    #[error("Fetch failed{}: {url} - {reason}", for_dependency(.dependency))]
    FetchFailed {
        dependency: Option<String>,
        url: String,
        reason: String,
    },

    #[error("Digest mismatch{}: expected {expected}, got {actual}", for_dependency(.dependency))]
    DigestMismatch {
        dependency: Option<String>,
        expected: String,
        actual: String,
    },

    #[error("Failed to update {path}: {reason}")]
    ReconcileFailed { path: String, reason: String },

    // ============ Lock File Errors ============
    #[error("Lock file not found: {path}")]
    LockFileNotFound { path: String },

    #[error(
        "requirements.lock is out of sync with requirements.yaml. Run 'chartdep dependency update'"
    )]
    LockFileOutdated,

    // ============ Cache Errors ============
    #[error("Cache error: {message}")]
    CacheError { message: String },

    // ============ Wrapped Errors ============
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

fn for_dependency(dependency: &Option<String>) -> String {
    dependency
        .as_ref()
        .map(|d| format!(" for '{}'", d))
        .unwrap_or_default()
}

/// Stage of an update run an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Refresh,
    Resolve,
    Fetch,
    Verify,
    Reconcile,
    Other,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Refresh => "refresh",
            Stage::Resolve => "resolve",
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::Reconcile => "reconcile",
            Stage::Other => "other",
        };
        f.write_str(s)
    }
}

impl RepoError {
    /// The update stage this error is reported from
    pub fn stage(&self) -> Stage {
        match self {
            RepoError::RepositoryUnknown { .. } | RepoError::NoMatchingVersion { .. } => {
                Stage::Resolve
            }
            RepoError::FetchFailed { .. } | RepoError::Timeout { .. } => Stage::Fetch,
            RepoError::DigestMismatch { .. } => Stage::Verify,
            RepoError::ReconcileFailed { .. } => Stage::Reconcile,
            RepoError::HttpError { .. }
            | RepoError::NetworkError { .. }
            | RepoError::IndexNotFound { .. }
            | RepoError::IndexParseError { .. } => Stage::Refresh,
            _ => Stage::Other,
        }
    }

    /// Attach the dependency name to errors raised without one
    pub fn for_dependency(self, name: &str) -> Self {
        match self {
            RepoError::RepositoryUnknown {
                dependency: None,
                repository,
                reason,
            } => RepoError::RepositoryUnknown {
                dependency: Some(name.to_string()),
                repository,
                reason,
            },
            RepoError::FetchFailed {
                dependency: None,
                url,
                reason,
            } => RepoError::FetchFailed {
                dependency: Some(name.to_string()),
                url,
                reason,
            },
            RepoError::DigestMismatch {
                dependency: None,
                expected,
                actual,
            } => RepoError::DigestMismatch {
                dependency: Some(name.to_string()),
                expected,
                actual,
            },
            other => other,
        }
    }

    /// Name of the dependency the error concerns, when known
    pub fn dependency(&self) -> Option<&str> {
        match self {
            RepoError::RepositoryUnknown { dependency, .. }
            | RepoError::FetchFailed { dependency, .. }
            | RepoError::DigestMismatch { dependency, .. } => dependency.as_deref(),
            RepoError::NoMatchingVersion { dependency, .. } => Some(dependency),
            _ => None,
        }
    }

    pub(crate) fn reconcile(path: &std::path::Path, err: impl fmt::Display) -> Self {
        RepoError::ReconcileFailed {
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout { seconds: 30 }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(e: rusqlite::Error) -> Self {
        RepoError::CacheError {
            message: e.to_string(),
        }
    }
}
