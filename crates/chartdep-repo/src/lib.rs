//! Chart repositories and dependency updates for chartdep
//!
//! This crate brings a bundle's `charts/` directory in line with its
//! `requirements.yaml`:
//!
//! - **Repositories**: named HTTP or local file repositories with an `index.yaml`
//! - **Index cache**: SQLite copy of every refreshed index
//! - **Resolution**: highest version satisfying each constraint
//! - **Verification**: SHA256 of every downloaded archive against its index digest
//! - **Reconciliation**: `charts/` replaced in one step, stale archives removed
//! - **Lock files**: exact versions and digests for reproducible builds
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartdep_repo::{DependencyManager, Home, UpdateOptions};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let home = Home::from_env()?;
//! let mut manager = DependencyManager::open(&home, UpdateOptions::default().timeout)?;
//!
//! let report = manager
//!     .update_bundle(Path::new("./mychart"), &UpdateOptions::default())
//!     .await?;
//! for dep in &report.dependencies {
//!     println!("{} {}", dep.name, dep.version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A failed update never leaves `charts/` half written: either the whole new
//! set is installed or the previous contents are kept.

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod home;
pub mod http;
pub mod index;
pub mod lock;
pub mod manager;
pub mod progress;
pub mod reconcile;
pub mod resolve;
pub mod status;
pub mod verify;

// Re-exports for convenience
pub use backend::{ArchiveFetcher, IndexSource};
pub use cache::{CacheStats, IndexCache};
pub use config::{Repository, RepositoryConfig, RepositoryRef, RepositoryType};
pub use error::{RepoError, Result, Stage};
pub use home::Home;
pub use http::HttpClient;
pub use index::{ChartEntry, RepositoryIndex};
pub use lock::{LOCK_FILE, LockFile, LockedDependency};
pub use manager::{
    DEFAULT_CONCURRENCY, DependencyManager, DependencyOutcome, RefreshResult, UpdateOptions,
    UpdatePhase, UpdateReport,
};
pub use progress::{MemorySink, ProgressSink, TracingSink, UpdateEvent, WriterSink};
pub use reconcile::{CHARTS_DIR, Outcome, ReconcileSummary, Reconciler};
pub use resolve::{ArchiveSource, ConstraintResolver, ResolvedDependency};
pub use status::{DependencyStatus, StatusEntry, status};
pub use verify::{compute_digest, verify};
