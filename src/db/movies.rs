//! External movie metadata
//!
//! Rows mirror one movie file known to the movie manager. `provider_file_id`
//! is the dedup key; `source_path` is what the cross-link pass matches
//! against symlink destinations.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    decode_datetime, decode_uuid, decode_uuid_opt, json_to_vec, now_iso8601, uuid_to_str,
    vec_to_json,
};
use crate::error::{SyncError, SyncResult};

pub const MOVIE_MEDIA_TYPE: &str = "movie";

#[derive(Debug, Clone, PartialEq)]
pub struct MovieRecord {
    pub id: Uuid,
    pub added_at: DateTime<Utc>,
    pub media_type: String,
    pub provider_movie_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub release_group: Option<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub genres: Vec<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
    pub original_file_path: Option<String>,
    pub relative_path: Option<String>,
    pub source_path: String,
    pub provider_file_id: i64,
    pub symlink_id: Option<Uuid>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for MovieRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        use sqlx::Row;

        let id_str: String = row.try_get("id")?;
        let added_at_str: String = row.try_get("added_at")?;
        let genres_json: String = row.try_get("genres")?;
        let languages_json: String = row.try_get("languages")?;

        Ok(Self {
            id: decode_uuid(&id_str)?,
            added_at: decode_datetime(&added_at_str)?,
            media_type: row.try_get("media_type")?,
            provider_movie_id: row.try_get("provider_movie_id")?,
            title: row.try_get("title")?,
            original_title: row.try_get("original_title")?,
            year: row.try_get("year")?,
            release_group: row.try_get("release_group")?,
            imdb_id: row.try_get("imdb_id")?,
            tmdb_id: row.try_get("tmdb_id")?,
            genres: json_to_vec(&genres_json),
            quality: row.try_get("quality")?,
            resolution: row.try_get("resolution")?,
            languages: json_to_vec(&languages_json),
            original_file_path: row.try_get("original_file_path")?,
            relative_path: row.try_get("relative_path")?,
            source_path: row.try_get("source_path")?,
            provider_file_id: row.try_get("provider_file_id")?,
            symlink_id: decode_uuid_opt(row.try_get("symlink_id")?)?,
        })
    }
}

/// Fully-formed movie payload produced by the media-info sync job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewExternalMovie {
    pub provider_movie_id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub release_group: Option<String>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub genres: Vec<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
    pub original_file_path: Option<String>,
    pub relative_path: Option<String>,
    pub source_path: String,
    pub provider_file_id: i64,
}

pub struct MovieRepository {
    pool: SqlitePool,
}

impl MovieRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: NewExternalMovie) -> SyncResult<MovieRecord> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO external_movies (
                id, added_at, media_type, provider_movie_id, title, original_title, year,
                release_group, imdb_id, tmdb_id, genres, quality, resolution, languages,
                original_file_path, relative_path, source_path, provider_file_id
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(now_iso8601())
        .bind(MOVIE_MEDIA_TYPE)
        .bind(input.provider_movie_id)
        .bind(&input.title)
        .bind(&input.original_title)
        .bind(input.year)
        .bind(&input.release_group)
        .bind(&input.imdb_id)
        .bind(input.tmdb_id)
        .bind(vec_to_json(&input.genres))
        .bind(&input.quality)
        .bind(input.resolution)
        .bind(vec_to_json(&input.languages))
        .bind(&input.original_file_path)
        .bind(&input.relative_path)
        .bind(&input.source_path)
        .bind(input.provider_file_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::from_insert(e, "movie", &input.provider_file_id.to_string()))?;

        let record =
            sqlx::query_as::<_, MovieRecord>("SELECT * FROM external_movies WHERE id = ?1")
                .bind(uuid_to_str(id))
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_by_id(&self, id: Uuid) -> SyncResult<Option<MovieRecord>> {
        let record =
            sqlx::query_as::<_, MovieRecord>("SELECT * FROM external_movies WHERE id = ?1")
                .bind(uuid_to_str(id))
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    /// First movie (insertion order) whose file lives at `path`
    pub async fn find_by_source_path(&self, path: &str) -> SyncResult<Option<MovieRecord>> {
        let record = sqlx::query_as::<_, MovieRecord>(
            "SELECT * FROM external_movies WHERE source_path = ?1 ORDER BY rowid LIMIT 1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_by_provider_file_id(&self, file_id: i64) -> SyncResult<Option<MovieRecord>> {
        let record = sqlx::query_as::<_, MovieRecord>(
            "SELECT * FROM external_movies WHERE provider_file_id = ?1",
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn provider_file_ids(&self) -> SyncResult<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT provider_file_id FROM external_movies")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().collect())
    }

    pub async fn count(&self) -> SyncResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM external_movies")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
