//! Reconciliation of a bundle's `charts/` directory
//!
//! The next directory is assembled beside the current one and swapped in
//! with two renames:
//!
//! ```text
//! charts/        -> .charts.prev/
//! .charts.next/  -> charts/
//! ```
//!
//! A failure before the first rename leaves `charts/` untouched, and a failed
//! second rename is rolled back. Leftovers from an interrupted run are cleaned
//! up the next time the bundle is reconciled.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chartdep_core::is_archive;

use crate::error::{RepoError, Result};
use crate::fetch::StagedArchive;
use crate::verify::compute_digest;

/// Dependency directory name inside a bundle
pub const CHARTS_DIR: &str = "charts";
const NEXT_DIR: &str = ".charts.next";
const PREV_DIR: &str = ".charts.prev";

/// What happened to one dependency's archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Added,
    Replaced { previous: String },
    Unchanged,
}

/// Result of a successful reconcile
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// One outcome per staged archive, in the order given
    pub outcomes: Vec<(String, Outcome)>,
    /// Archive file names that were removed, sorted
    pub removed: Vec<String>,
}

pub struct Reconciler {
    bundle: PathBuf,
}

impl Reconciler {
    pub fn new(bundle: impl Into<PathBuf>) -> Self {
        Self {
            bundle: bundle.into(),
        }
    }

    pub fn charts_dir(&self) -> PathBuf {
        self.bundle.join(CHARTS_DIR)
    }

    fn next_dir(&self) -> PathBuf {
        self.bundle.join(NEXT_DIR)
    }

    fn prev_dir(&self) -> PathBuf {
        self.bundle.join(PREV_DIR)
    }

    /// Make `charts/` hold exactly the staged archives
    ///
    /// Non-archive entries (unpacked charts, README files) are carried over.
    pub fn reconcile(&self, staged: &[StagedArchive]) -> Result<ReconcileSummary> {
        self.recover()?;

        let charts = self.charts_dir();
        let next = self.next_dir();

        let current = list_archives(&charts)?;
        let wanted: HashSet<String> = staged.iter().map(StagedArchive::file_name).collect();

        let mut summary = ReconcileSummary::default();
        for archive in staged {
            let file_name = archive.file_name();
            let outcome = if current.contains(&file_name) {
                if file_digest(&charts.join(&file_name))? == archive.digest {
                    Outcome::Unchanged
                } else {
                    Outcome::Replaced {
                        previous: archive.version.clone(),
                    }
                }
            } else if let Some(previous) = previous_version(&current, &archive.name, &file_name) {
                Outcome::Replaced { previous }
            } else {
                Outcome::Added
            };
            summary.outcomes.push((archive.name.clone(), outcome));
        }

        summary.removed = current
            .iter()
            .filter(|name| !wanted.contains(*name))
            .cloned()
            .collect();
        summary.removed.sort();

        if let Err(e) = self.assemble(&charts, &next, staged) {
            let _ = std::fs::remove_dir_all(&next);
            return Err(e);
        }

        self.swap(&charts, &next)?;

        tracing::info!(
            bundle = %self.bundle.display(),
            archives = staged.len(),
            removed = summary.removed.len(),
            "dependency directory updated"
        );
        Ok(summary)
    }

    /// Clean up after an interrupted reconcile
    pub fn recover(&self) -> Result<()> {
        let charts = self.charts_dir();
        let next = self.next_dir();
        let prev = self.prev_dir();

        if prev.exists() {
            if charts.exists() {
                tracing::warn!(path = %prev.display(), "discarding leftover previous charts");
                std::fs::remove_dir_all(&prev).map_err(|e| RepoError::reconcile(&prev, e))?;
            } else {
                tracing::warn!(path = %charts.display(), "restoring charts from interrupted update");
                std::fs::rename(&prev, &charts).map_err(|e| RepoError::reconcile(&charts, e))?;
            }
        }

        if next.exists() {
            tracing::warn!(path = %next.display(), "discarding leftover staged charts");
            std::fs::remove_dir_all(&next).map_err(|e| RepoError::reconcile(&next, e))?;
        }

        Ok(())
    }

    fn assemble(&self, charts: &Path, next: &Path, staged: &[StagedArchive]) -> Result<()> {
        std::fs::create_dir_all(next).map_err(|e| RepoError::reconcile(next, e))?;

        if charts.is_dir() {
            for entry in std::fs::read_dir(charts).map_err(|e| RepoError::reconcile(charts, e))? {
                let entry = entry?;
                let path = entry.path();
                if path.is_file() && is_archive(&path) {
                    continue;
                }
                copy_recursive(&path, &next.join(entry.file_name()))
                    .map_err(|e| RepoError::reconcile(&path, e))?;
            }
        }

        for archive in staged {
            let target = next.join(archive.file_name());
            std::fs::rename(&archive.path, &target)
                .or_else(|_| std::fs::copy(&archive.path, &target).map(|_| ()))
                .map_err(|e| RepoError::reconcile(&target, e))?;
        }

        Ok(())
    }

    fn swap(&self, charts: &Path, next: &Path) -> Result<()> {
        if !charts.exists() {
            return std::fs::rename(next, charts).map_err(|e| {
                let _ = std::fs::remove_dir_all(next);
                RepoError::reconcile(charts, e)
            });
        }

        let prev = self.prev_dir();
        if let Err(e) = std::fs::rename(charts, &prev) {
            let _ = std::fs::remove_dir_all(next);
            return Err(RepoError::reconcile(charts, e));
        }

        if let Err(e) = std::fs::rename(next, charts) {
            if let Err(rollback) = std::fs::rename(&prev, charts) {
                tracing::error!(
                    error = %rollback,
                    "could not restore {}; it is preserved at {}",
                    charts.display(),
                    prev.display()
                );
            }
            let _ = std::fs::remove_dir_all(next);
            return Err(RepoError::reconcile(charts, e));
        }

        if let Err(e) = std::fs::remove_dir_all(&prev) {
            tracing::warn!(path = %prev.display(), error = %e, "could not remove previous charts");
        }

        Ok(())
    }
}

/// Archive file names directly inside `dir`, sorted
fn list_archives(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut archives = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| RepoError::reconcile(dir, e))? {
        let path = entry?.path();
        if path.is_file()
            && is_archive(&path)
            && let Some(name) = path.file_name()
        {
            archives.push(name.to_string_lossy().to_string());
        }
    }
    archives.sort();
    Ok(archives)
}

/// Version of another archive of the same chart, judged by file name
fn previous_version(current: &[String], chart: &str, file_name: &str) -> Option<String> {
    let prefix = format!("{}-", chart);
    current
        .iter()
        .filter(|f| f.as_str() != file_name)
        .filter_map(|f| {
            f.strip_prefix(&prefix)?
                .strip_suffix(".tgz")
                .filter(|v| v.starts_with(|c: char| c.is_ascii_digit() || c == 'v'))
                .map(str::to_string)
        })
        .next()
}

fn file_digest(path: &Path) -> Result<String> {
    Ok(compute_digest(&std::fs::read(path)?))
}

fn copy_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    if from.is_dir() {
        std::fs::create_dir_all(to)?;
        for entry in std::fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        std::fs::copy(from, to)?;
    }
    Ok(())
}
