//! Repository management commands

use chartdep_repo::{DependencyManager, Home, IndexCache, Repository, RepositoryConfig, WriterSink};
use std::sync::Arc;
use std::time::Duration;

use crate::display;
use crate::error::{CliError, Result};

/// Add a new repository
pub fn add(home: &Home, name: &str, url: &str) -> Result<()> {
    let mut config = RepositoryConfig::load(home)?;

    if config.get(name).is_some() {
        return Err(CliError::input_with_help(
            format!("Repository '{}' already exists", name),
            "remove it first with 'chartdep repo remove'",
        ));
    }

    config.add(Repository::new(name, url)?)?;
    config.save(home)?;

    println!("\"{}\" has been added to your repositories", name);
    Ok(())
}

/// List configured repositories
pub fn list(home: &Home) -> Result<()> {
    let config = RepositoryConfig::load(home)?;

    if config.repositories.is_empty() {
        println!("No repositories configured.");
        println!();
        println!("Add one with: chartdep repo add <name> <url>");
        return Ok(());
    }

    print!("{}", display::repository_table(&config.repositories));
    Ok(())
}

/// Refresh every configured repository's cached index
pub async fn update(home: &Home, timeout: Duration) -> Result<()> {
    let mut manager =
        DependencyManager::open(home, timeout)?.with_progress(Arc::new(WriterSink::stdout()));

    if manager.config().repositories.is_empty() {
        return Err(CliError::input_with_help(
            "no repositories configured",
            "add one with 'chartdep repo add <name> <url>'",
        ));
    }

    let results = manager.refresh_all(timeout).await;
    tracing::debug!(
        refreshed = results.iter().filter(|r| r.error.is_none()).count(),
        failed = results.iter().filter(|r| r.error.is_some()).count(),
        "repository update finished"
    );
    Ok(())
}

/// Remove a repository and its cached index
pub fn remove(home: &Home, name: &str) -> Result<()> {
    let mut config = RepositoryConfig::load(home)?;
    config.remove(name)?;
    config.save(home)?;

    let mut cache = IndexCache::open(home)?;
    if cache.remove_repository(name)? {
        tracing::debug!(repository = %name, "dropped cached index");
    }

    println!("\"{}\" has been removed from your repositories", name);
    Ok(())
}
