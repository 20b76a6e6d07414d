//! Symlink database operations
//!
//! Symlinks record where a library entry points to inside the debrid mount.
//! Creating one also attaches it to the torrent file it resolves to and runs
//! back-propagation in the same transaction.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::links::apply_back_propagation;
use crate::db::sqlite_helpers::{decode_datetime, decode_uuid, now_iso8601, uuid_to_str};
use crate::error::{SyncError, SyncResult};

/// A symlink record in the database
#[derive(Debug, Clone, PartialEq)]
pub struct SymlinkRecord {
    pub id: Uuid,
    pub target_path: String,
    pub target_filename: String,
    pub destination_path: String,
    pub destination_filename: String,
    pub added_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for SymlinkRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let added_at_str: String = row.try_get("added_at")?;

        Ok(Self {
            id: decode_uuid(&id_str)?,
            target_path: row.try_get("target_path")?,
            target_filename: row.try_get("target_filename")?,
            destination_path: row.try_get("destination_path")?,
            destination_filename: row.try_get("destination_filename")?,
            added_at: decode_datetime(&added_at_str)?,
        })
    }
}

/// Input for creating a symlink record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSymlink {
    pub target_path: String,
    pub target_filename: String,
    pub destination_path: String,
    pub destination_filename: String,
}

pub struct SymlinkRepository {
    pool: SqlitePool,
}

impl SymlinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a symlink and attach it to `file_id` when given.
    ///
    /// The newest symlink wins: a file that already had one is re-pointed,
    /// so a renamed library entry replaces the stale link. A file id that
    /// does not resolve leaves the symlink unattached.
    pub async fn create(
        &self,
        input: NewSymlink,
        file_id: Option<Uuid>,
    ) -> SyncResult<SymlinkRecord> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO symlinks (id, target_path, target_filename, destination_path,
                                  destination_filename, added_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(&input.target_path)
        .bind(&input.target_filename)
        .bind(&input.destination_path)
        .bind(&input.destination_filename)
        .bind(now_iso8601())
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::from_insert(e, "symlink", &input.destination_path))?;

        if let Some(file_id) = file_id {
            let previous: Option<Option<String>> =
                sqlx::query_scalar("SELECT symlink_id FROM torrent_files WHERE id = ?1")
                    .bind(uuid_to_str(file_id))
                    .fetch_optional(&mut *tx)
                    .await?;

            match previous {
                None => warn!(
                    file_id = %file_id,
                    destination = %input.destination_path,
                    "Torrent file not found, symlink stored unattached"
                ),
                Some(previous) => {
                    sqlx::query("UPDATE torrent_files SET symlink_id = ?1 WHERE id = ?2")
                        .bind(uuid_to_str(id))
                        .bind(uuid_to_str(file_id))
                        .execute(&mut *tx)
                        .await?;
                    if let Some(previous) = previous {
                        debug!(
                            file_id = %file_id,
                            previous = %previous,
                            destination = %input.destination_path,
                            "Replaced symlink of torrent file"
                        );
                    }
                }
            }
        }

        apply_back_propagation(&mut tx, id).await?;

        let record = sqlx::query_as::<_, SymlinkRecord>("SELECT * FROM symlinks WHERE id = ?1")
            .bind(uuid_to_str(id))
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_by_id(&self, id: Uuid) -> SyncResult<Option<SymlinkRecord>> {
        let record = sqlx::query_as::<_, SymlinkRecord>("SELECT * FROM symlinks WHERE id = ?1")
            .bind(uuid_to_str(id))
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    pub async fn get_by_destination(&self, path: &str) -> SyncResult<Option<SymlinkRecord>> {
        let record = sqlx::query_as::<_, SymlinkRecord>(
            "SELECT * FROM symlinks WHERE destination_path = ?1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_target(&self, path: &str) -> SyncResult<Option<SymlinkRecord>> {
        let record =
            sqlx::query_as::<_, SymlinkRecord>("SELECT * FROM symlinks WHERE target_path = ?1")
                .bind(path)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// Every stored destination filename, the cross-run dedup key of the
    /// symlink sync job
    pub async fn destination_filenames(&self) -> SyncResult<HashSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT destination_filename FROM symlinks")
            .fetch_all(&self.pool)
            .await?;

        Ok(names.into_iter().collect())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> SyncResult<Vec<SymlinkRecord>> {
        let records = sqlx::query_as::<_, SymlinkRecord>(
            "SELECT * FROM symlinks ORDER BY rowid LIMIT ?1 OFFSET ?2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count(&self) -> SyncResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM symlinks")
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
    use crate::db::{NewTorrent, NewTorrentFile};

    fn symlink(dest: &str, target: &str) -> NewSymlink {
        NewSymlink {
            target_path: target.to_string(),
            target_filename: crate::db::torrent_files::file_basename(target).to_string(),
            destination_path: dest.to_string(),
            destination_filename: crate::db::torrent_files::file_basename(dest).to_string(),
        }
    }

    #[tokio::test]
    async fn create_attaches_to_file() {
        let (db, _dir) = test_db().await;
        db.torrents()
            .create(NewTorrent {
                id: "t1".into(),
                hash: "a".repeat(40),
                filename: "Show.S01E01.mkv".into(),
            })
            .await
            .unwrap();
        let file = db
            .torrent_files()
            .create(NewTorrentFile {
                torrent_id: "t1".into(),
                path: "/Show.S01E01.mkv".into(),
                bytes: 1000,
            })
            .await
            .unwrap();

        let link = db
            .symlinks()
            .create(
                symlink("/media/Show.S01E01.mkv", "/downloads/Show.S01E01.mkv"),
                Some(file.id),
            )
            .await
            .unwrap();

        let file = db.torrent_files().get_by_id(file.id).await.unwrap().unwrap();
        assert_eq!(file.symlink_id, Some(link.id));
        assert!(file.is_unlinked());
    }

    #[tokio::test]
    async fn newer_symlink_replaces_the_files_previous_one() {
        let (db, _dir) = test_db().await;
        db.torrents()
            .create(NewTorrent {
                id: "t1".into(),
                hash: "b".repeat(40),
                filename: "Movie.mkv".into(),
            })
            .await
            .unwrap();
        let file = db
            .torrent_files()
            .create(NewTorrentFile {
                torrent_id: "t1".into(),
                path: "/Movie.mkv".into(),
                bytes: 1000,
            })
            .await
            .unwrap();

        let old = db
            .symlinks()
            .create(symlink("/media/old/Movie.mkv", "/downloads/Movie.mkv"), Some(file.id))
            .await
            .unwrap();
        let renamed = db
            .symlinks()
            .create(
                symlink("/media/Movie (2010)/Movie (2010).mkv", "/downloads/Movie.mkv"),
                Some(file.id),
            )
            .await
            .unwrap();

        let file = db.torrent_files().get_by_id(file.id).await.unwrap().unwrap();
        assert_eq!(file.symlink_id, Some(renamed.id));
        assert_ne!(file.symlink_id, Some(old.id));
        assert_eq!(db.symlinks().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicate_destination_is_rejected() {
        let (db, _dir) = test_db().await;
        let repo = db.symlinks();

        repo.create(symlink("/media/a.mkv", "/downloads/a.mkv"), None)
            .await
            .unwrap();
        let err = repo
            .create(symlink("/media/a.mkv", "/downloads/b.mkv"), None)
            .await
            .unwrap_err();

        assert_matches!(err, SyncError::DuplicateKey { entity: "symlink", .. });
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unknown_file_id_leaves_symlink_unattached() {
        let (db, _dir) = test_db().await;

        let link = db
            .symlinks()
            .create(symlink("/media/a.mkv", "/downloads/a.mkv"), Some(Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(
            db.symlinks().get_by_destination("/media/a.mkv").await.unwrap(),
            Some(link)
        );
        assert!(db.symlinks().destination_filenames().await.unwrap().contains("a.mkv"));
    }
}
