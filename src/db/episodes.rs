//! External episode metadata
//!
//! One row per episode file known to the series manager. Episode number and
//! title stay unset when the file could not be joined to an episode.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::db::sqlite_helpers::{
    decode_datetime, decode_uuid, decode_uuid_opt, json_to_vec, now_iso8601, uuid_to_str,
    vec_to_json,
};
use crate::error::{SyncError, SyncResult};

pub const SERIES_MEDIA_TYPE: &str = "series";

#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRecord {
    pub id: Uuid,
    pub added_at: DateTime<Utc>,
    pub media_type: String,
    pub provider_series_id: i64,
    pub series_title: String,
    pub year: Option<i64>,
    pub season_number: i64,
    pub episode_number: Option<i64>,
    pub episode_title: Option<String>,
    pub release_group: Option<String>,
    pub tvdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub tvmaze_id: Option<i64>,
    pub genres: Vec<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
    pub relative_path: Option<String>,
    pub source_path: String,
    pub provider_file_id: i64,
    pub provider_episode_id: Option<i64>,
    pub symlink_id: Option<Uuid>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for EpisodeRecord {
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
            provider_series_id: row.try_get("provider_series_id")?,
            series_title: row.try_get("series_title")?,
            year: row.try_get("year")?,
            season_number: row.try_get("season_number")?,
            episode_number: row.try_get("episode_number")?,
            episode_title: row.try_get("episode_title")?,
            release_group: row.try_get("release_group")?,
            tvdb_id: row.try_get("tvdb_id")?,
            imdb_id: row.try_get("imdb_id")?,
            tvmaze_id: row.try_get("tvmaze_id")?,
            genres: json_to_vec(&genres_json),
            quality: row.try_get("quality")?,
            resolution: row.try_get("resolution")?,
            languages: json_to_vec(&languages_json),
            relative_path: row.try_get("relative_path")?,
            source_path: row.try_get("source_path")?,
            provider_file_id: row.try_get("provider_file_id")?,
            provider_episode_id: row.try_get("provider_episode_id")?,
            symlink_id: decode_uuid_opt(row.try_get("symlink_id")?)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewExternalEpisode {
    pub provider_series_id: i64,
    pub series_title: String,
    pub year: Option<i64>,
    pub season_number: i64,
    pub episode_number: Option<i64>,
    pub episode_title: Option<String>,
    pub release_group: Option<String>,
    pub tvdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub tvmaze_id: Option<i64>,
    pub genres: Vec<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
    pub relative_path: Option<String>,
    pub source_path: String,
    pub provider_file_id: i64,
    pub provider_episode_id: Option<i64>,
}

pub struct EpisodeRepository {
    pool: SqlitePool,
}

impl EpisodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, input: NewExternalEpisode) -> SyncResult<EpisodeRecord> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO external_episodes (
                id, added_at, media_type, provider_series_id, series_title, year,
                season_number, episode_number, episode_title, release_group, tvdb_id,
                imdb_id, tvmaze_id, genres, quality, resolution, languages, relative_path,
                source_path, provider_file_id, provider_episode_id
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                    ?17, ?18, ?19, ?20, ?21)
            "#,
        )
        .bind(uuid_to_str(id))
        .bind(now_iso8601())
        .bind(SERIES_MEDIA_TYPE)
        .bind(input.provider_series_id)
        .bind(&input.series_title)
        .bind(input.year)
        .bind(input.season_number)
        .bind(input.episode_number)
        .bind(&input.episode_title)
        .bind(&input.release_group)
        .bind(input.tvdb_id)
        .bind(&input.imdb_id)
        .bind(input.tvmaze_id)
        .bind(vec_to_json(&input.genres))
        .bind(&input.quality)
        .bind(input.resolution)
        .bind(vec_to_json(&input.languages))
        .bind(&input.relative_path)
        .bind(&input.source_path)
        .bind(input.provider_file_id)
        .bind(input.provider_episode_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| SyncError::from_insert(e, "episode", &input.provider_file_id.to_string()))?;

        let record =
            sqlx::query_as::<_, EpisodeRecord>("SELECT * FROM external_episodes WHERE id = ?1")
                .bind(uuid_to_str(id))
                .fetch_one(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(record)
    }

    pub async fn get_by_id(&self, id: Uuid) -> SyncResult<Option<EpisodeRecord>> {
        let record =
            sqlx::query_as::<_, EpisodeRecord>("SELECT * FROM external_episodes WHERE id = ?1")
                .bind(uuid_to_str(id))
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    pub async fn find_by_source_path(&self, path: &str) -> SyncResult<Option<EpisodeRecord>> {
        let record = sqlx::query_as::<_, EpisodeRecord>(
            "SELECT * FROM external_episodes WHERE source_path = ?1 ORDER BY rowid LIMIT 1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn provider_file_ids(&self) -> SyncResult<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT provider_file_id FROM external_episodes")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids.into_iter().collect())
    }

    pub async fn count(&self) -> SyncResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM external_episodes")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
