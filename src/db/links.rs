//! Relationship writes between files, symlinks and media metadata
//!
//! A symlink is owned by at most one metadata record. Whenever a link
//! changes, [`apply_back_propagation`] runs inside the same transaction so
//! every file behind the symlink ends up pointing at the owner, and the owner
//! points back at the symlink.

use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::sqlite_helpers::{decode_uuid_opt, uuid_to_str};
use crate::error::SyncResult;

/// Result of a link operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    /// The relationship already existed
    Unchanged,
    /// One side of the link does not exist
    Unresolved,
}

/// A movie or episode row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRef {
    Movie(Uuid),
    Episode(Uuid),
}

impl MediaRef {
    fn id(&self) -> Uuid {
        match self {
            Self::Movie(id) | Self::Episode(id) => *id,
        }
    }

    fn table(&self) -> &'static str {
        match self {
            Self::Movie(_) => "external_movies",
            Self::Episode(_) => "external_episodes",
        }
    }

    /// Column on torrent_files referencing this kind of record
    fn file_column(&self) -> &'static str {
        match self {
            Self::Movie(_) => "movie_id",
            Self::Episode(_) => "episode_id",
        }
    }

    /// The other exclusive column on torrent_files
    fn other_file_column(&self) -> &'static str {
        match self {
            Self::Movie(_) => "episode_id",
            Self::Episode(_) => "movie_id",
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Movie(_) => "movie",
            Self::Episode(_) => "episode",
        }
    }
}

pub struct LinkRepository {
    pool: SqlitePool,
}

impl LinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn link_file_to_movie(&self, file_id: Uuid, movie_id: Uuid) -> SyncResult<LinkOutcome> {
        self.link_file_to_media(file_id, MediaRef::Movie(movie_id)).await
    }

    pub async fn link_file_to_episode(
        &self,
        file_id: Uuid,
        episode_id: Uuid,
    ) -> SyncResult<LinkOutcome> {
        self.link_file_to_media(file_id, MediaRef::Episode(episode_id))
            .await
    }

    pub async fn link_movie_to_symlink(
        &self,
        movie_id: Uuid,
        symlink_id: Uuid,
    ) -> SyncResult<LinkOutcome> {
        self.link_media_to_symlink(MediaRef::Movie(movie_id), symlink_id)
            .await
    }

    pub async fn link_episode_to_symlink(
        &self,
        episode_id: Uuid,
        symlink_id: Uuid,
    ) -> SyncResult<LinkOutcome> {
        self.link_media_to_symlink(MediaRef::Episode(episode_id), symlink_id)
            .await
    }

    async fn link_file_to_media(&self, file_id: Uuid, media: MediaRef) -> SyncResult<LinkOutcome> {
        let mut tx = self.pool.begin().await?;

        let file: Option<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT symlink_id, movie_id, episode_id FROM torrent_files WHERE id = ?1",
        )
        .bind(uuid_to_str(file_id))
        .fetch_optional(&mut *tx)
        .await?;

        let Some((symlink_id, movie_id, episode_id)) = file else {
            warn!(file_id = %file_id, "Torrent file not found, link skipped");
            return Ok(LinkOutcome::Unresolved);
        };
        if !media_exists(&mut tx, media).await? {
            warn!(kind = media.kind(), id = %media.id(), "Media record not found, link skipped");
            return Ok(LinkOutcome::Unresolved);
        }

        let current = match media {
            MediaRef::Movie(_) => decode_uuid_opt(movie_id)?,
            MediaRef::Episode(_) => decode_uuid_opt(episode_id)?,
        };
        if current == Some(media.id()) {
            return Ok(LinkOutcome::Unchanged);
        }

        sqlx::query(&format!(
            "UPDATE torrent_files SET {} = ?1, {} = NULL WHERE id = ?2",
            media.file_column(),
            media.other_file_column()
        ))
        .bind(uuid_to_str(media.id()))
        .bind(uuid_to_str(file_id))
        .execute(&mut *tx)
        .await?;

        if let Some(symlink_id) = decode_uuid_opt(symlink_id)? {
            claim_symlink(&mut tx, media, symlink_id).await?;
            apply_back_propagation(&mut tx, symlink_id).await?;
        }

        tx.commit().await?;
        debug!(file_id = %file_id, kind = media.kind(), id = %media.id(), "Linked file to media");
        Ok(LinkOutcome::Linked)
    }

    async fn link_media_to_symlink(
        &self,
        media: MediaRef,
        symlink_id: Uuid,
    ) -> SyncResult<LinkOutcome> {
        let mut tx = self.pool.begin().await?;

        let current: Option<Option<String>> = sqlx::query_scalar(&format!(
            "SELECT symlink_id FROM {} WHERE id = ?1",
            media.table()
        ))
        .bind(uuid_to_str(media.id()))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            warn!(kind = media.kind(), id = %media.id(), "Media record not found, link skipped");
            return Ok(LinkOutcome::Unresolved);
        };
        let symlink_exists: Option<String> =
            sqlx::query_scalar("SELECT id FROM symlinks WHERE id = ?1")
                .bind(uuid_to_str(symlink_id))
                .fetch_optional(&mut *tx)
                .await?;
        if symlink_exists.is_none() {
            warn!(symlink_id = %symlink_id, "Symlink not found, link skipped");
            return Ok(LinkOutcome::Unresolved);
        }

        if decode_uuid_opt(current)? == Some(symlink_id) {
            return Ok(LinkOutcome::Unchanged);
        }

        claim_symlink(&mut tx, media, symlink_id).await?;
        apply_back_propagation(&mut tx, symlink_id).await?;

        tx.commit().await?;
        debug!(kind = media.kind(), id = %media.id(), symlink_id = %symlink_id, "Linked media to symlink");
        Ok(LinkOutcome::Linked)
    }
}

async fn media_exists(tx: &mut Transaction<'_, Sqlite>, media: MediaRef) -> SyncResult<bool> {
    let found: Option<String> =
        sqlx::query_scalar(&format!("SELECT id FROM {} WHERE id = ?1", media.table()))
            .bind(uuid_to_str(media.id()))
            .fetch_optional(&mut **tx)
            .await?;

    Ok(found.is_some())
}

/// Make `media` the only metadata record owning `symlink_id`
async fn claim_symlink(
    tx: &mut Transaction<'_, Sqlite>,
    media: MediaRef,
    symlink_id: Uuid,
) -> SyncResult<()> {
    let symlink = uuid_to_str(symlink_id);
    for table in ["external_movies", "external_episodes"] {
        sqlx::query(&format!(
            "UPDATE {} SET symlink_id = NULL WHERE symlink_id = ?1 AND id != ?2",
            table
        ))
        .bind(&symlink)
        .bind(uuid_to_str(media.id()))
        .execute(&mut **tx)
        .await?;
    }

    sqlx::query(&format!("UPDATE {} SET symlink_id = ?1 WHERE id = ?2", media.table()))
        .bind(&symlink)
        .bind(uuid_to_str(media.id()))
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn symlink_owner(
    tx: &mut Transaction<'_, Sqlite>,
    symlink_id: Uuid,
) -> SyncResult<Option<MediaRef>> {
    let symlink = uuid_to_str(symlink_id);

    let movie: Option<String> = sqlx::query_scalar(
        "SELECT id FROM external_movies WHERE symlink_id = ?1 ORDER BY rowid LIMIT 1",
    )
    .bind(&symlink)
    .fetch_optional(&mut **tx)
    .await?;
    if let Some(id) = decode_uuid_opt(movie)? {
        return Ok(Some(MediaRef::Movie(id)));
    }

    let episode: Option<String> = sqlx::query_scalar(
        "SELECT id FROM external_episodes WHERE symlink_id = ?1 ORDER BY rowid LIMIT 1",
    )
    .bind(&symlink)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(decode_uuid_opt(episode)?.map(MediaRef::Episode))
}

/// Align files and metadata around `symlink_id`.
///
/// When a metadata record owns the symlink, every file behind it is pointed
/// at that record (clearing the other kind). Otherwise the metadata already
/// attached to the first such file takes ownership of the symlink.
/// Returns the number of file rows changed.
pub(crate) async fn apply_back_propagation(
    tx: &mut Transaction<'_, Sqlite>,
    symlink_id: Uuid,
) -> SyncResult<u64> {
    let owner = match symlink_owner(tx, symlink_id).await? {
        Some(owner) => owner,
        None => {
            let attached: Option<(Option<String>, Option<String>)> = sqlx::query_as(
                r#"
                SELECT movie_id, episode_id FROM torrent_files
                WHERE symlink_id = ?1 AND (movie_id IS NOT NULL OR episode_id IS NOT NULL)
                ORDER BY rowid LIMIT 1
                "#,
            )
            .bind(uuid_to_str(symlink_id))
            .fetch_optional(&mut **tx)
            .await?;

            let owner = match attached {
                Some((movie_id, episode_id)) => match decode_uuid_opt(movie_id)? {
                    Some(id) => MediaRef::Movie(id),
                    None => match decode_uuid_opt(episode_id)? {
                        Some(id) => MediaRef::Episode(id),
                        None => return Ok(0),
                    },
                },
                None => return Ok(0),
            };
            claim_symlink(tx, owner, symlink_id).await?;
            owner
        }
    };

    let changed = sqlx::query(&format!(
        r#"
        UPDATE torrent_files SET {col} = ?1, {other} = NULL
        WHERE symlink_id = ?2 AND ({col} IS NULL OR {col} != ?1 OR {other} IS NOT NULL)
        "#,
        col = owner.file_column(),
        other = owner.other_file_column()
    ))
    .bind(uuid_to_str(owner.id()))
    .bind(uuid_to_str(symlink_id))
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if changed > 0 {
        debug!(symlink_id = %symlink_id, kind = owner.kind(), files = changed, "Back-propagated link");
    }
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::{
        Database, NewExternalEpisode, NewExternalMovie, NewSymlink, NewTorrent, NewTorrentFile,
        TorrentFileRecord,
    };

    async fn seed_file(db: &Database, name: &str) -> TorrentFileRecord {
        db.torrents()
            .create(NewTorrent {
                id: format!("t-{}", name),
                hash: format!("{:0>40}", name.len()),
                filename: name.to_string(),
            })
            .await
            .unwrap();
        db.torrent_files()
            .create(NewTorrentFile {
                torrent_id: format!("t-{}", name),
                path: format!("/{}", name),
                bytes: 100,
            })
            .await
            .unwrap()
    }

    async fn seed_symlink(db: &Database, name: &str, file: Option<Uuid>) -> Uuid {
        db.symlinks()
            .create(
                NewSymlink {
                    target_path: format!("/downloads/{}", name),
                    target_filename: name.to_string(),
                    destination_path: format!("/media/{}", name),
                    destination_filename: name.to_string(),
                },
                file,
            )
            .await
            .unwrap()
            .id
    }

    async fn seed_movie(db: &Database, file_id: i64) -> Uuid {
        db.movies()
            .create(NewExternalMovie {
                provider_movie_id: 1,
                title: "Movie".into(),
                source_path: "/media/Movie.mkv".into(),
                provider_file_id: file_id,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn seed_episode(db: &Database, file_id: i64) -> Uuid {
        db.episodes()
            .create(NewExternalEpisode {
                provider_series_id: 1,
                series_title: "Show".into(),
                season_number: 1,
                source_path: "/media/Show.S01E01.mkv".into(),
                provider_file_id: file_id,
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn movie_to_symlink_reaches_the_file() {
        let (db, _dir) = test_db().await;
        let file = seed_file(&db, "Movie.mkv").await;
        let symlink = seed_symlink(&db, "Movie.mkv", Some(file.id)).await;
        let movie = seed_movie(&db, 1).await;

        let outcome = db.links().link_movie_to_symlink(movie, symlink).await.unwrap();

        assert_eq!(outcome, LinkOutcome::Linked);
        let file = db.torrent_files().get_by_id(file.id).await.unwrap().unwrap();
        assert_eq!(file.movie_id, Some(movie));
        assert_eq!(file.episode_id, None);
        assert_eq!(
            db.links().link_movie_to_symlink(movie, symlink).await.unwrap(),
            LinkOutcome::Unchanged
        );
    }

    #[tokio::test]
    async fn file_to_movie_claims_the_symlink() {
        let (db, _dir) = test_db().await;
        let file = seed_file(&db, "Movie.mkv").await;
        let symlink = seed_symlink(&db, "Movie.mkv", Some(file.id)).await;
        let movie = seed_movie(&db, 1).await;

        db.links().link_file_to_movie(file.id, movie).await.unwrap();

        let movie = db.movies().get_by_id(movie).await.unwrap().unwrap();
        assert_eq!(movie.symlink_id, Some(symlink));
    }

    #[tokio::test]
    async fn switching_kind_clears_the_other_column() {
        let (db, _dir) = test_db().await;
        let file = seed_file(&db, "Show.S01E01.mkv").await;
        let movie = seed_movie(&db, 1).await;
        let episode = seed_episode(&db, 2).await;

        db.links().link_file_to_movie(file.id, movie).await.unwrap();
        db.links().link_file_to_episode(file.id, episode).await.unwrap();

        let file = db.torrent_files().get_by_id(file.id).await.unwrap().unwrap();
        assert_eq!(file.movie_id, None);
        assert_eq!(file.episode_id, Some(episode));
    }

    #[tokio::test]
    async fn new_symlink_adopts_metadata_of_its_file() {
        let (db, _dir) = test_db().await;
        let file = seed_file(&db, "Show.S01E01.mkv").await;
        let episode = seed_episode(&db, 2).await;
        db.links().link_file_to_episode(file.id, episode).await.unwrap();

        let symlink = seed_symlink(&db, "Show.S01E01.mkv", Some(file.id)).await;

        let episode = db.episodes().get_by_id(episode).await.unwrap().unwrap();
        assert_eq!(episode.symlink_id, Some(symlink));
    }

    #[tokio::test]
    async fn missing_side_is_unresolved() {
        let (db, _dir) = test_db().await;
        let movie = seed_movie(&db, 1).await;

        assert_eq!(
            db.links().link_file_to_movie(Uuid::new_v4(), movie).await.unwrap(),
            LinkOutcome::Unresolved
        );
        assert_eq!(
            db.links()
                .link_movie_to_symlink(movie, Uuid::new_v4())
                .await
                .unwrap(),
            LinkOutcome::Unresolved
        );
    }
}
