//! Database connection and repositories
//!
//! One [`Database`] handle wraps the SQLite pool; repositories are cheap
//! views over it, created per use like `db.torrents()`.

pub mod episodes;
pub mod links;
pub mod movies;
pub mod scheduled_jobs;
pub mod schema;
pub mod sqlite_helpers;
pub mod symlinks;
pub mod torrent_files;
pub mod torrents;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{info, warn};

pub use episodes::{EpisodeRecord, EpisodeRepository, NewExternalEpisode};
pub use links::{LinkOutcome, LinkRepository};
pub use movies::{MovieRecord, MovieRepository, NewExternalMovie};
pub use scheduled_jobs::{ScheduledJobRecord, ScheduledJobRepository};
pub use symlinks::{NewSymlink, SymlinkRecord, SymlinkRepository};
pub use torrent_files::{NewTorrentFile, TorrentFileRecord, TorrentFileRepository};
pub use torrents::{NewFile, NewTorrent, TorrentRecord, TorrentRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn connect_options(url: &str) -> Result<SqliteConnectOptions> {
        let options = if url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(url)
                .with_context(|| format!("Invalid database URL '{}'", url))?
        } else {
            if let Some(parent) = Path::new(url).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            SqliteConnectOptions::new().filename(url)
        };

        Ok(options
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10)))
    }

    /// Connect to a SQLite file (plain path or `sqlite:` URL)
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(Self::connect_options(url)?)
            .await
            .with_context(|| format!("Failed to open database '{}'", url))?;

        Ok(Self { pool })
    }

    /// Connect, retrying every `retry_interval` until `timeout` has elapsed
    pub async fn connect_with_retry(
        url: &str,
        max_connections: u32,
        retry_interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let started = std::time::Instant::now();
        loop {
            match Self::connect(url, max_connections).await {
                Ok(db) => return Ok(db),
                Err(e) if started.elapsed() < timeout => {
                    warn!(
                        error = %e,
                        retry_in_secs = retry_interval.as_secs(),
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create missing tables and indexes
    pub async fn sync_schema(&self) -> Result<()> {
        let result = schema::sync_schema(&self.pool).await?;
        if !result.tables_created.is_empty() {
            info!(tables = ?result.tables_created, "Created tables");
        }
        if let Some(first) = result.errors.first() {
            anyhow::bail!("Schema sync failed: {}", first);
        }
        Ok(())
    }

    /// Maintenance reset: delete every entity row in one transaction.
    /// The scheduled job registry is left alone.
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in schema::ENTITY_TABLES {
            let deleted = sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?
                .rows_affected();
            info!(table = %table, deleted = deleted, "Cleared table");
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn torrents(&self) -> TorrentRepository {
        TorrentRepository::new(self.pool.clone())
    }

    pub fn torrent_files(&self) -> TorrentFileRepository {
        TorrentFileRepository::new(self.pool.clone())
    }

    pub fn symlinks(&self) -> SymlinkRepository {
        SymlinkRepository::new(self.pool.clone())
    }

    pub fn movies(&self) -> MovieRepository {
        MovieRepository::new(self.pool.clone())
    }

    pub fn episodes(&self) -> EpisodeRepository {
        EpisodeRepository::new(self.pool.clone())
    }

    /// Relationship writes (file/symlink/metadata links)
    pub fn links(&self) -> LinkRepository {
        LinkRepository::new(self.pool.clone())
    }

    pub fn scheduled_jobs(&self) -> ScheduledJobRepository {
        ScheduledJobRepository::new(self.pool.clone())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use super::Database;

    /// Fresh on-disk database in a temp dir; keep the dir alive for the test
    pub async fn test_db() -> (Database, TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("test.db");
        let db = Database::connect(path.to_str().expect("utf-8 path"), 4)
            .await
            .expect("connect");
        db.sync_schema().await.expect("schema");
        (db, dir)
    }
}
