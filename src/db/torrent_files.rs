//! Torrent files database operations
//!
//! A file row is the hub of the entity graph: it points at its torrent, at
//! most one symlink, and at most one of movie/episode metadata.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    decode_datetime, decode_uuid, decode_uuid_opt, now_iso8601, uuid_to_str,
};
use crate::error::{SyncError, SyncResult};

/// A torrent file record in the database
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentFileRecord {
    pub id: Uuid,
    pub path: String,
    pub bytes: i64,
    pub added_at: DateTime<Utc>,
    pub torrent_id: Option<String>,
    pub symlink_id: Option<Uuid>,
    pub movie_id: Option<Uuid>,
    pub episode_id: Option<Uuid>,
}

impl TorrentFileRecord {
    /// Has a symlink but no metadata yet
    pub fn is_unlinked(&self) -> bool {
        self.symlink_id.is_some() && self.movie_id.is_none() && self.episode_id.is_none()
    }

    /// Basename of the path inside the torrent
    pub fn filename(&self) -> &str {
        file_basename(&self.path)
    }
}

pub(crate) fn file_basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for TorrentFileRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let added_at_str: String = row.try_get("added_at")?;

        Ok(Self {
            id: decode_uuid(&id_str)?,
            path: row.try_get("path")?,
            bytes: row.try_get("bytes")?,
            added_at: decode_datetime(&added_at_str)?,
            torrent_id: row.try_get("torrent_id")?,
            symlink_id: decode_uuid_opt(row.try_get("symlink_id")?)?,
            movie_id: decode_uuid_opt(row.try_get("movie_id")?)?,
            episode_id: decode_uuid_opt(row.try_get("episode_id")?)?,
        })
    }
}

/// Input for creating a file under an existing torrent
#[derive(Debug, Clone)]
pub struct NewTorrentFile {
    pub torrent_id: String,
    pub path: String,
    pub bytes: i64,
}

/// Insert one file row on an open transaction; the caller owns the commit
pub(crate) async fn insert_file(
    conn: &mut SqliteConnection,
    torrent_id: &str,
    path: &str,
    bytes: i64,
) -> SyncResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO torrent_files (id, path, bytes, added_at, torrent_id)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(uuid_to_str(id))
    .bind(path)
    .bind(bytes)
    .bind(now_iso8601())
    .bind(torrent_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| SyncError::from_insert(e, "torrent file", path))?;

    Ok(id)
}

/// Repository for torrent file operations
pub struct TorrentFileRepository {
    pool: SqlitePool,
}

impl TorrentFileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a file scoped to its torrent. Fails with `NotFound` when the
    /// owning torrent is missing.
    pub async fn create(&self, input: NewTorrentFile) -> SyncResult<TorrentFileRecord> {
        let mut tx = self.pool.begin().await?;

        let torrent_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM torrents WHERE id = ?1")
                .bind(&input.torrent_id)
                .fetch_optional(&mut *tx)
                .await?;
        if torrent_exists.is_none() {
            return Err(SyncError::NotFound {
                entity: "torrent",
                id: input.torrent_id,
            });
        }

        let id = insert_file(&mut *tx, &input.torrent_id, &input.path, input.bytes).await?;

        let record =
            sqlx::query_as::<_, TorrentFileRecord>("SELECT * FROM torrent_files WHERE id = ?1")
                .bind(uuid_to_str(id))
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_by_id(&self, id: Uuid) -> SyncResult<Option<TorrentFileRecord>> {
        let record =
            sqlx::query_as::<_, TorrentFileRecord>("SELECT * FROM torrent_files WHERE id = ?1")
                .bind(uuid_to_str(id))
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    pub async fn list_by_torrent(&self, torrent_id: &str) -> SyncResult<Vec<TorrentFileRecord>> {
        let records = sqlx::query_as::<_, TorrentFileRecord>(
            "SELECT * FROM torrent_files WHERE torrent_id = ?1 ORDER BY rowid",
        )
        .bind(torrent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Files with a symlink but neither movie nor episode metadata
    pub async fn list_unlinked(&self) -> SyncResult<Vec<TorrentFileRecord>> {
        let records = sqlx::query_as::<_, TorrentFileRecord>(
            r#"
            SELECT * FROM torrent_files
            WHERE symlink_id IS NOT NULL
                AND movie_id IS NULL
                AND episode_id IS NULL
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Map of path basename to file id. When two files share a basename the
    /// most recently inserted one wins.
    pub async fn filename_index(&self) -> SyncResult<HashMap<String, Uuid>> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, path FROM torrent_files ORDER BY rowid")
                .fetch_all(&self.pool)
                .await?;

        let mut index = HashMap::with_capacity(rows.len());
        for (id, path) in rows {
            index.insert(file_basename(&path).to_string(), decode_uuid(&id)?);
        }
        Ok(index)
    }

    pub async fn count(&self) -> SyncResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM torrent_files")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::db::NewTorrent;
    use crate::db::test_support::test_db;

    async fn seed_torrent(db: &crate::db::Database) {
        db.torrents()
            .create(NewTorrent {
                id: "t1".into(),
                hash: "a".repeat(40),
                filename: "Show.S01E01.mkv".into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn file_is_scoped_to_its_torrent() {
        let (db, _dir) = test_db().await;
        seed_torrent(&db).await;

        let file = db
            .torrent_files()
            .create(NewTorrentFile {
                torrent_id: "t1".into(),
                path: "/Show.S01E01.mkv".into(),
                bytes: 1000,
            })
            .await
            .unwrap();

        assert_eq!(file.torrent_id.as_deref(), Some("t1"));
        assert_eq!(file.filename(), "Show.S01E01.mkv");
        assert!(!file.is_unlinked());
        assert_eq!(db.torrent_files().list_by_torrent("t1").await.unwrap(), vec![file]);
    }

    #[tokio::test]
    async fn missing_torrent_is_not_found() {
        let (db, _dir) = test_db().await;

        let err = db
            .torrent_files()
            .create(NewTorrentFile {
                torrent_id: "ghost".into(),
                path: "/a.mkv".into(),
                bytes: 1,
            })
            .await
            .unwrap_err();

        assert_matches!(err, SyncError::NotFound { entity: "torrent", .. });
        assert_eq!(db.torrent_files().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn filename_index_uses_basenames() {
        let (db, _dir) = test_db().await;
        seed_torrent(&db).await;
        let file = db
            .torrent_files()
            .create(NewTorrentFile {
                torrent_id: "t1".into(),
                path: "/Season 1/Show.S01E01.mkv".into(),
                bytes: 10,
            })
            .await
            .unwrap();

        let index = db.torrent_files().filename_index().await.unwrap();
        assert_eq!(index.get("Show.S01E01.mkv"), Some(&file.id));
    }
}
