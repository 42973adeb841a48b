//! SQLite-backed index cache
//!
//! One row per repository plus its chart entries. A refresh replaces a
//! repository's entries wholesale inside a single transaction, so readers
//! see either the old index or the new one.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::path::Path;

use crate::backend::IndexSource;
use crate::config::Repository;
use crate::error::{RepoError, Result};
use crate::home::Home;
use crate::index::{ChartEntry, RepositoryIndex};

/// Local store of repository indices, keyed by repository name
pub struct IndexCache {
    conn: Connection,
}

impl IndexCache {
    /// Open or create the cache of a home directory
    pub fn open(home: &Home) -> Result<Self> {
        Self::open_at(&home.cache_db())
    }

    /// Open or create cache at specific path
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let result = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        );

        let conn = match result {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Cache corrupted, recreating: {}", e);
                if path.exists() {
                    std::fs::remove_file(path)?;
                }
                Connection::open(path)?
            }
        };

        let mut cache = Self { conn };
        cache.init()?;
        Ok(cache)
    }

    /// Open in-memory cache (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut cache = Self { conn };
        cache.init()?;
        Ok(cache)
    }

    fn init(&mut self) -> Result<()> {
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS repositories (
                id INTEGER PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                url TEXT NOT NULL,
                api_version TEXT NOT NULL,
                generated TEXT NOT NULL,
                last_updated INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entries (
                id INTEGER PRIMARY KEY,
                repo_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                position INTEGER NOT NULL,
                app_version TEXT,
                description TEXT,
                digest TEXT,
                urls TEXT NOT NULL,
                created TEXT,
                UNIQUE(repo_id, name, version)
            );

            CREATE INDEX IF NOT EXISTS idx_entries_repo ON entries(repo_id);
            CREATE INDEX IF NOT EXISTS idx_entries_name ON entries(repo_id, name);
            "#,
        )?;

        Ok(())
    }

    /// Fetch a repository's index from `source` and replace the cached copy
    pub async fn refresh(
        &mut self,
        repo: &Repository,
        source: &dyn IndexSource,
    ) -> Result<RepositoryIndex> {
        let index = source.fetch_index(repo).await?;
        self.store(repo, &index)?;
        Ok(index)
    }

    /// Replace the cached index of a repository
    ///
    /// Entries are stored deduplicated and newest first whatever order the
    /// caller built them in.
    pub fn store(&mut self, repo: &Repository, index: &RepositoryIndex) -> Result<()> {
        let mut index = index.clone();
        index.normalize();

        let tx = self.conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO repositories (name, url, api_version, generated, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                api_version = excluded.api_version,
                generated = excluded.generated,
                last_updated = excluded.last_updated
            "#,
            params![
                repo.name,
                repo.url,
                index.api_version,
                index.generated.to_rfc3339(),
                Utc::now().timestamp()
            ],
        )?;

        let repo_id: i64 = tx.query_row(
            "SELECT id FROM repositories WHERE name = ?1",
            [&repo.name],
            |row| row.get(0),
        )?;

        tx.execute("DELETE FROM entries WHERE repo_id = ?1", [repo_id])?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO entries (repo_id, name, version, position, app_version, description, digest, urls, created)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;

            for (chart, versions) in &index.entries {
                for (position, entry) in versions.iter().enumerate() {
                    let urls = serde_json::to_string(&entry.urls)?;
                    stmt.execute(params![
                        repo_id,
                        chart,
                        entry.version,
                        position as i64,
                        entry.app_version,
                        entry.description,
                        entry.digest,
                        urls,
                        entry.created,
                    ])?;
                }
            }
        }

        tx.commit()?;
        tracing::debug!(
            repository = %repo.name,
            entries = index.len(),
            "stored repository index"
        );
        Ok(())
    }

    /// Cached index of a repository
    pub fn get(&self, name: &str) -> Result<RepositoryIndex> {
        let header: Option<(i64, String, String)> = self
            .conn
            .query_row(
                "SELECT id, api_version, generated FROM repositories WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((repo_id, api_version, generated)) = header else {
            return Err(RepoError::RepositoryUnknown {
                dependency: None,
                repository: name.to_string(),
                reason: "no cached index; run 'chartdep repo update'".to_string(),
            });
        };

        let mut stmt = self.conn.prepare(
            r#"
            SELECT name, version, app_version, description, digest, urls, created
            FROM entries
            WHERE repo_id = ?1
            ORDER BY name, position
            "#,
        )?;

        let rows = stmt
            .query_map([repo_id], |row| {
                Ok((
                    ChartEntry {
                        name: row.get(0)?,
                        version: row.get(1)?,
                        app_version: row.get(2)?,
                        description: row.get(3)?,
                        digest: row.get(4)?,
                        urls: Vec::new(),
                        created: row.get(6)?,
                    },
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut index = RepositoryIndex {
            api_version,
            generated: DateTime::parse_from_rfc3339(&generated)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            entries: Default::default(),
        };

        for (mut entry, urls) in rows {
            entry.urls = serde_json::from_str(&urls)?;
            index
                .entries
                .entry(entry.name.clone())
                .or_default()
                .push(entry);
        }

        Ok(index)
    }

    /// Whether a repository has a cached index
    pub fn contains(&self, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM repositories WHERE name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Names of all cached repositories, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM repositories ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// When a repository was last refreshed
    pub fn last_updated(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<i64> = self
            .conn
            .query_row(
                "SELECT last_updated FROM repositories WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts.and_then(|ts| DateTime::from_timestamp(ts, 0)))
    }

    /// Drop a repository and its entries; returns whether it was cached
    pub fn remove_repository(&mut self, name: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM entries WHERE repo_id IN (SELECT id FROM repositories WHERE name = ?1)",
            [name],
        )?;
        let removed = tx.execute("DELETE FROM repositories WHERE name = ?1", [name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Get cache statistics
    pub fn stats(&self) -> Result<CacheStats> {
        let repository_count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM repositories", [], |r| r.get(0))?;
        let entry_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |r| r.get(0))?;

        Ok(CacheStats {
            repository_count: repository_count as usize,
            entry_count: entry_count as usize,
        })
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub repository_count: usize,
    pub entry_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_repo() -> Repository {
        Repository::new("test", "http://127.0.0.1:8879").unwrap()
    }

    fn sample_index() -> RepositoryIndex {
        let mut index = RepositoryIndex::default();
        index.add_entry(
            ChartEntry::new("reqtest", "0.1.0")
                .with_url("reqtest-0.1.0.tgz")
                .with_digest("abc"),
        );
        index.add_entry(ChartEntry::new("compressedchart", "0.1.0").with_url("c-0.1.0.tgz"));
        index.add_entry(ChartEntry::new("compressedchart", "0.3.0").with_url("c-0.3.0.tgz"));
        index
    }

    struct StaticSource {
        index: RepositoryIndex,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IndexSource for StaticSource {
        async fn fetch_index(&self, _repo: &Repository) -> Result<RepositoryIndex> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.index.clone())
        }
    }

    #[test]
    fn test_get_unknown_repository() {
        let cache = IndexCache::open_memory().unwrap();
        let err = cache.get("test").unwrap_err();
        assert!(matches!(err, RepoError::RepositoryUnknown { .. }));
        assert!(cache.list().unwrap().is_empty());
        assert!(cache.last_updated("test").unwrap().is_none());
    }

    #[test]
    fn test_store_and_get() {
        let mut cache = IndexCache::open_memory().unwrap();
        let index = sample_index();
        cache.store(&test_repo(), &index).unwrap();

        let cached = cache.get("test").unwrap();
        assert_eq!(cached.entries, index.entries);
        assert_eq!(cache.list().unwrap(), vec!["test".to_string()]);
        assert!(cache.last_updated("test").unwrap().is_some());

        let versions: Vec<&str> = cached
            .get("compressedchart")
            .unwrap()
            .iter()
            .map(|e| e.version.as_str())
            .collect();
        assert_eq!(versions, vec!["0.3.0", "0.1.0"]);
    }

    #[test]
    fn test_store_orders_unsorted_index() {
        let mut cache = IndexCache::open_memory().unwrap();
        let mut index = RepositoryIndex::default();
        index.entries.insert(
            "compressedchart".to_string(),
            vec![
                ChartEntry::new("compressedchart", "0.1.0"),
                ChartEntry::new("compressedchart", "0.3.0"),
                ChartEntry::new("compressedchart", "0.1.0").with_url("dup.tgz"),
            ],
        );
        cache.store(&test_repo(), &index).unwrap();

        let cached = cache.get("test").unwrap();
        let versions: Vec<&str> = cached
            .get("compressedchart")
            .unwrap()
            .iter()
            .map(|e| e.version.as_str())
            .collect();
        assert_eq!(versions, vec!["0.3.0", "0.1.0"]);
        assert!(cached.get("compressedchart").unwrap()[1].urls.is_empty());
    }

    #[test]
    fn test_store_replaces_wholesale() {
        let mut cache = IndexCache::open_memory().unwrap();
        cache.store(&test_repo(), &sample_index()).unwrap();

        let mut smaller = RepositoryIndex::default();
        smaller.add_entry(ChartEntry::new("other", "1.0.0"));
        cache.store(&test_repo(), &smaller).unwrap();

        let cached = cache.get("test").unwrap();
        assert_eq!(cached.names(), vec!["other"]);
        assert_eq!(
            cache.stats().unwrap(),
            CacheStats {
                repository_count: 1,
                entry_count: 1
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let mut cache = IndexCache::open_memory().unwrap();
        let source = StaticSource {
            index: sample_index(),
            calls: AtomicUsize::new(0),
        };

        let first = cache.refresh(&test_repo(), &source).await.unwrap();
        let second = cache.refresh(&test_repo(), &source).await.unwrap();

        assert_eq!(first.entries, second.entries);
        assert_eq!(cache.get("test").unwrap().entries, first.entries);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().unwrap().entry_count, 3);
    }

    #[test]
    fn test_remove_repository() {
        let mut cache = IndexCache::open_memory().unwrap();
        cache.store(&test_repo(), &sample_index()).unwrap();

        assert!(cache.remove_repository("test").unwrap());
        assert!(!cache.remove_repository("test").unwrap());
        assert!(!cache.contains("test").unwrap());
        assert_eq!(cache.stats().unwrap().entry_count, 0);
    }

    #[test]
    fn test_persists_on_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let home = Home::new(temp.path());

        {
            let mut cache = IndexCache::open(&home).unwrap();
            cache.store(&test_repo(), &sample_index()).unwrap();
        }

        let cache = IndexCache::open(&home).unwrap();
        assert!(cache.contains("test").unwrap());
        assert!(home.cache_db().exists());
    }
}
