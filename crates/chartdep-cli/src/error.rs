//! CLI error type with exit codes
//!
//! Library errors are folded into one diagnostic per failure class; the
//! message keeps the stage and dependency the library attached.

use chartdep_core::CoreError;
use chartdep_repo::{RepoError, Stage};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// A dependency could not be pinned to a version
    #[error("Resolve failed: {message}")]
    #[diagnostic(code(chartdep::cli::resolve))]
    Resolve {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Fetch failed: {message}")]
    #[diagnostic(code(chartdep::cli::fetch))]
    Fetch {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("Verify failed: {message}")]
    #[diagnostic(
        code(chartdep::cli::verify),
        help("the repository served an archive that does not match its index; charts/ was left unchanged")
    )]
    Integrity { message: String },

    #[error("Reconcile failed: {message}")]
    #[diagnostic(code(chartdep::cli::reconcile))]
    Reconcile { message: String },

    #[error("{message}")]
    #[diagnostic(code(chartdep::cli::lock))]
    Lock {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Bad arguments, manifest or repository configuration
    #[error("{message}")]
    #[diagnostic(code(chartdep::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    #[error("IO error: {message}")]
    #[diagnostic(code(chartdep::cli::io))]
    Io { message: String },

    #[error("Internal error: {message}")]
    #[diagnostic(code(chartdep::cli::internal))]
    Internal { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Resolve { .. } => exit_codes::RESOLVE_ERROR,
            CliError::Fetch { .. } => exit_codes::FETCH_ERROR,
            CliError::Integrity { .. } => exit_codes::INTEGRITY_ERROR,
            CliError::Reconcile { .. } => exit_codes::RECONCILE_ERROR,
            CliError::Lock { .. } => exit_codes::LOCK_ERROR,
            CliError::Input { .. } => exit_codes::USAGE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();
        match &err {
            RepoError::RepositoryUnknown { .. } => CliError::Resolve {
                message,
                help: Some(
                    "add the repository with 'chartdep repo add <name> <url>', then run 'chartdep repo update'"
                        .to_string(),
                ),
            },
            RepoError::NoMatchingVersion { .. } => CliError::Resolve {
                message,
                help: Some("run 'chartdep repo update' to refresh the repository indices".to_string()),
            },
            RepoError::LockFileOutdated => CliError::Lock {
                message,
                help: Some("run 'chartdep dependency update' to regenerate requirements.lock".to_string()),
            },
            RepoError::LockFileNotFound { .. } => CliError::Lock {
                message,
                help: Some("run 'chartdep dependency update' first".to_string()),
            },
            RepoError::RepositoryNotFound { .. }
            | RepoError::RepositoryAlreadyExists { .. }
            | RepoError::InvalidRepositoryUrl { .. }
            | RepoError::InvalidConfig { .. } => CliError::input(message),
            RepoError::Core(core) => from_core(core),
            RepoError::Io(_) => CliError::Io { message },
            _ => match err.stage() {
                Stage::Fetch | Stage::Refresh => CliError::Fetch {
                    message,
                    help: None,
                },
                Stage::Verify => CliError::Integrity { message },
                Stage::Reconcile => CliError::Reconcile { message },
                Stage::Resolve => CliError::Resolve {
                    message,
                    help: None,
                },
                Stage::Other => CliError::internal(message),
            },
        }
    }
}

fn from_core(err: &CoreError) -> CliError {
    let message = err.to_string();
    match err {
        CoreError::ChartNotFound { .. } => CliError::input_with_help(
            message,
            "pass the path of a chart directory containing requirements.yaml",
        ),
        CoreError::Io(_) => CliError::Io { message },
        _ => CliError::input(message),
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        from_core(&err)
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
