//! Dependency management commands

use chartdep_core::Manifest;
use chartdep_repo::{
    DependencyManager, Home, LOCK_FILE, LockFile, UpdateOptions, UpdateReport, WriterSink, status,
};
use console::style;
use std::path::Path;
use std::sync::Arc;

use crate::display;
use crate::error::Result;

fn manager(home: &Home, options: &UpdateOptions) -> Result<DependencyManager> {
    Ok(DependencyManager::open(home, options.timeout)?.with_progress(Arc::new(WriterSink::stdout())))
}

fn log_report(report: &UpdateReport) {
    for dep in &report.dependencies {
        tracing::debug!(
            dependency = %dep.name,
            version = %dep.version,
            outcome = ?dep.outcome,
            "installed"
        );
    }
}

/// Resolve `requirements.yaml` and rewrite `charts/` and `requirements.lock`
pub async fn update(home: &Home, chart: &Path, options: &UpdateOptions) -> Result<()> {
    let report = manager(home, options)?.update_bundle(chart, options).await?;
    log_report(&report);
    Ok(())
}

/// Install the versions recorded in `requirements.lock`
pub async fn build(home: &Home, chart: &Path, options: &UpdateOptions) -> Result<()> {
    let report = manager(home, options)?.build_bundle(chart, options).await?;
    log_report(&report);
    Ok(())
}

/// Show declared dependencies and what is installed for them
pub fn list(chart: &Path) -> Result<()> {
    let manifest = Manifest::load(chart)?;

    if manifest.is_empty() {
        println!("WARNING: no requirements at {}", chart.display());
        return Ok(());
    }

    let entries = status(chart, &manifest)?;
    print!("{}", display::status_table(&entries));

    match LockFile::load_optional(chart)? {
        Some(lock) if lock.is_outdated(&manifest)? => {
            println!();
            println!(
                "{} {} is out of date, run 'chartdep dependency update'",
                style("WARNING:").yellow(),
                LOCK_FILE
            );
        }
        Some(_) => {}
        None => {
            println!();
            println!("No {} found, run 'chartdep dependency update' to create one", LOCK_FILE);
        }
    }

    Ok(())
}
