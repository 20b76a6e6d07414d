//! Torrent database operations
//!
//! Torrents are keyed by the provider-assigned id; the content hash is the
//! natural dedup key used by the torrent sync job.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::db::sqlite_helpers::{decode_datetime, now_iso8601};
use crate::db::torrent_files::insert_file;
use crate::error::{SyncError, SyncResult};

/// A torrent record in the database
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentRecord {
    pub id: String,
    pub hash: String,
    pub filename: String,
    pub added_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for TorrentRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let added_at_str: String = row.try_get("added_at")?;

        Ok(Self {
            id: row.try_get("id")?,
            hash: row.try_get("hash")?,
            filename: row.try_get("filename")?,
            added_at: decode_datetime(&added_at_str)?,
        })
    }
}

/// Input for creating a new torrent record
#[derive(Debug, Clone)]
pub struct NewTorrent {
    pub id: String,
    pub hash: String,
    pub filename: String,
}

/// A file stored together with its torrent
#[derive(Debug, Clone)]
pub struct NewFile {
    pub path: String,
    pub bytes: i64,
}

/// Torrent repository for database operations
pub struct TorrentRepository {
    pool: SqlitePool,
}

impl TorrentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new torrent in its own transaction
    pub async fn create(&self, input: NewTorrent) -> SyncResult<TorrentRecord> {
        self.create_with_files(input, Vec::new()).await
    }

    /// Insert a torrent and its files in one transaction. Any failing file
    /// rolls the torrent back too, so the next sync retries all of it.
    pub async fn create_with_files(
        &self,
        input: NewTorrent,
        files: Vec<NewFile>,
    ) -> SyncResult<TorrentRecord> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO torrents (id, hash, filename, added_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&input.id)
        .bind(&input.hash)
        .bind(&input.filename)
        .bind(now_iso8601())
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::from_insert(e, "torrent", &input.hash))?;

        for file in &files {
            insert_file(&mut *tx, &input.id, &file.path, file.bytes).await?;
        }

        let record = sqlx::query_as::<_, TorrentRecord>("SELECT * FROM torrents WHERE id = ?1")
            .bind(&input.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    /// Page through torrents in insertion order
    pub async fn list(&self, limit: i64, offset: i64) -> SyncResult<Vec<TorrentRecord>> {
        let records = sqlx::query_as::<_, TorrentRecord>(
            "SELECT * FROM torrents ORDER BY rowid LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_by_id(&self, id: &str) -> SyncResult<Option<TorrentRecord>> {
        let record = sqlx::query_as::<_, TorrentRecord>("SELECT * FROM torrents WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    pub async fn get_by_hash(&self, hash: &str) -> SyncResult<Option<TorrentRecord>> {
        let record = sqlx::query_as::<_, TorrentRecord>("SELECT * FROM torrents WHERE hash = ?1")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Every stored content hash, loaded once per sync run
    pub async fn all_hashes(&self) -> SyncResult<HashSet<String>> {
        let hashes: Vec<String> = sqlx::query_scalar("SELECT hash FROM torrents")
            .fetch_all(&self.pool)
            .await?;

        Ok(hashes.into_iter().collect())
    }

    pub async fn count(&self) -> SyncResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM torrents")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::db::test_support::test_db;

    fn new_torrent(id: &str, hash_char: char) -> NewTorrent {
        NewTorrent {
            id: id.to_string(),
            hash: hash_char.to_string().repeat(40),
            filename: format!("{}.mkv", id),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_by_hash() {
        let (db, _dir) = test_db().await;
        let repo = db.torrents();

        let created = repo.create(new_torrent("t1", 'a')).await.unwrap();
        assert_eq!(created.id, "t1");

        let fetched = repo.get_by_hash(&"a".repeat(40)).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(repo.all_hashes().await.unwrap().contains(&"a".repeat(40)));
    }

    #[tokio::test]
    async fn duplicate_hash_is_rejected_and_rolled_back() {
        let (db, _dir) = test_db().await;
        let repo = db.torrents();

        repo.create(new_torrent("t1", 'a')).await.unwrap();
        let err = repo.create(new_torrent("t2", 'a')).await.unwrap_err();

        assert_matches!(err, SyncError::DuplicateKey { entity: "torrent", .. });
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get_by_id("t2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn files_are_stored_with_their_torrent() {
        let (db, _dir) = test_db().await;
        let files = vec![
            NewFile {
                path: "/Movie/Movie.mkv".into(),
                bytes: 10,
            },
            NewFile {
                path: "/Movie/Extras.mkv".into(),
                bytes: 2,
            },
        ];

        db.torrents()
            .create_with_files(new_torrent("t1", 'a'), files)
            .await
            .unwrap();

        let stored = db.torrent_files().list_by_torrent("t1").await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn failing_file_rolls_back_the_torrent() {
        let (db, _dir) = test_db().await;
        sqlx::query(
            "CREATE TRIGGER reject_sample BEFORE INSERT ON torrent_files
             WHEN NEW.path LIKE '%sample%'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(db.pool())
        .await
        .unwrap();
        let files = vec![
            NewFile {
                path: "/Movie/Movie.mkv".into(),
                bytes: 10,
            },
            NewFile {
                path: "/Movie/sample.mkv".into(),
                bytes: 1,
            },
        ];

        let result = db
            .torrents()
            .create_with_files(new_torrent("t1", 'a'), files)
            .await;

        assert!(result.is_err());
        assert_eq!(db.torrents().count().await.unwrap(), 0);
        assert!(db.torrent_files().list_by_torrent("t1").await.unwrap().is_empty());
        assert!(!db.torrents().all_hashes().await.unwrap().contains(&"a".repeat(40)));
    }

    #[tokio::test]
    async fn list_pages_in_insertion_order() {
        let (db, _dir) = test_db().await;
        let repo = db.torrents();
        for (id, c) in [("t1", 'a'), ("t2", 'b'), ("t3", 'c')] {
            repo.create(new_torrent(id, c)).await.unwrap();
        }

        let first = repo.list(2, 0).await.unwrap();
        let second = repo.list(2, 2).await.unwrap();

        let ids: Vec<_> = first.iter().chain(second.iter()).map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(second.len(), 1);
    }
}
