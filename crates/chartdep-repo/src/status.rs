//! Installed state of a bundle's dependencies

use chartdep_core::{CHART_FILE, ChartMetadata, Manifest, is_archive, read_chart_metadata};
use std::fmt;
use std::path::Path;

use crate::error::Result;
use crate::reconcile::CHARTS_DIR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyStatus {
    /// An archive satisfying the constraint is present
    Ok { version: String },
    /// Nothing for this dependency in `charts/`
    Missing,
    /// An archive is present but its version does not satisfy the constraint
    WrongVersion { found: String },
    /// Present as an unpacked chart directory
    Unpacked,
    /// An archive named after the dependency could not be read
    Corrupt { reason: String },
}

impl fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyStatus::Ok { .. } => write!(f, "ok"),
            DependencyStatus::Missing => write!(f, "missing"),
            DependencyStatus::WrongVersion { .. } => write!(f, "wrong version"),
            DependencyStatus::Unpacked => write!(f, "unpacked"),
            DependencyStatus::Corrupt { .. } => write!(f, "corrupt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub name: String,
    pub version: String,
    pub repository: String,
    pub status: DependencyStatus,
}

/// Compare the manifest with what is in `<bundle>/charts`
pub fn status(bundle: &Path, manifest: &Manifest) -> Result<Vec<StatusEntry>> {
    let charts = bundle.join(CHARTS_DIR);

    let mut archives: Vec<(String, std::result::Result<ChartMetadata, String>)> = Vec::new();
    if charts.is_dir() {
        for entry in std::fs::read_dir(&charts)? {
            let path = entry?.path();
            if path.is_file() && is_archive(&path) {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                archives.push((file_name, read_chart_metadata(&path).map_err(|e| e.to_string())));
            }
        }
    }
    archives.sort_by(|a, b| a.0.cmp(&b.0));

    let entries = manifest
        .dependencies
        .iter()
        .map(|dep| {
            let mut status = DependencyStatus::Missing;

            for (file_name, metadata) in &archives {
                match metadata {
                    Ok(meta) if meta.name == dep.name => {
                        let satisfied = dep
                            .constraint()
                            .map(|c| c.satisfies_str(&meta.version))
                            .unwrap_or(false);
                        status = if satisfied {
                            DependencyStatus::Ok {
                                version: meta.version.clone(),
                            }
                        } else {
                            DependencyStatus::WrongVersion {
                                found: meta.version.clone(),
                            }
                        };
                        if satisfied {
                            break;
                        }
                    }
                    Err(reason) if file_name.starts_with(&format!("{}-", dep.name)) => {
                        if status == DependencyStatus::Missing {
                            status = DependencyStatus::Corrupt {
                                reason: reason.clone(),
                            };
                        }
                    }
                    _ => {}
                }
            }

            if status == DependencyStatus::Missing && charts.join(&dep.name).join(CHART_FILE).exists()
            {
                status = DependencyStatus::Unpacked;
            }

            StatusEntry {
                name: dep.name.clone(),
                version: dep.version.clone(),
                repository: dep.repository.clone(),
                status,
            }
        })
        .collect();

    Ok(entries)
}
