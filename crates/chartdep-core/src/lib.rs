//! chartdep Core - Core types for chart dependency management
//!
//! This crate provides the foundational types used throughout chartdep:
//! - `Manifest` / `Dependency`: the dependencies a bundle declares
//! - `VersionConstraint`: exact versions and ranges, matched in one place
//! - `ChartMetadata`: the contents of `Chart.yaml`
//! - `archive`: packaging and inspecting `.tgz` chart archives

pub mod archive;
pub mod chart;
pub mod constraint;
pub mod error;
pub mod manifest;

pub use archive::{archive_file_name, is_archive, package_chart, read_chart_metadata};
pub use chart::{CHART_FILE, ChartMetadata};
pub use constraint::VersionConstraint;
pub use error::{CoreError, Result};
pub use manifest::{Dependency, MANIFEST_FILE, Manifest};
