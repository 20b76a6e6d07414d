//! Sonarr (series manager) client

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::arr::{ArrClient, ArrLanguage, ArrLanguages, ArrQualityWrapper};
use super::{EpisodeFileEntry, EpisodeInfoEntry, SeriesEntry, SeriesProvider};
use crate::error::SyncResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrSeries {
    id: i64,
    #[serde(default)]
    title: String,
    year: Option<i64>,
    tvdb_id: Option<i64>,
    imdb_id: Option<String>,
    tv_maze_id: Option<i64>,
    #[serde(default)]
    genres: Vec<String>,
    statistics: Option<SonarrStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrStatistics {
    #[serde(default)]
    episode_file_count: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrEpisodeFile {
    id: i64,
    #[serde(default)]
    season_number: i64,
    #[serde(default)]
    path: String,
    release_group: Option<String>,
    #[serde(default)]
    quality: ArrQualityWrapper,
    language: Option<ArrLanguages>,
    languages: Option<Vec<ArrLanguage>>,
    relative_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonarrEpisode {
    id: i64,
    episode_number: Option<i64>,
    title: Option<String>,
    episode_file_id: Option<i64>,
}

impl From<SonarrSeries> for SeriesEntry {
    fn from(s: SonarrSeries) -> Self {
        Self {
            id: s.id,
            title: s.title,
            year: s.year,
            tvdb_id: s.tvdb_id,
            imdb_id: s.imdb_id,
            tvmaze_id: s.tv_maze_id,
            genres: s.genres,
            episode_file_count: s.statistics.map(|st| st.episode_file_count),
        }
    }
}

impl From<SonarrEpisodeFile> for EpisodeFileEntry {
    fn from(f: SonarrEpisodeFile) -> Self {
        let (quality, resolution) = f.quality.into_parts();
        let languages = match (f.languages, f.language) {
            (Some(langs), _) if !langs.is_empty() => langs.into_iter().map(|l| l.name).collect(),
            (_, Some(lang)) => lang.into_names(),
            _ => Vec::new(),
        };
        Self {
            id: f.id,
            season_number: f.season_number,
            path: f.path,
            release_group: f.release_group,
            quality,
            resolution,
            languages,
            relative_path: f.relative_path,
        }
    }
}

impl From<SonarrEpisode> for EpisodeInfoEntry {
    fn from(e: SonarrEpisode) -> Self {
        Self {
            id: e.id,
            episode_number: e.episode_number,
            title: e.title,
            episode_file_id: e.episode_file_id,
        }
    }
}

pub struct SonarrClient {
    api: ArrClient,
}

impl SonarrClient {
    pub fn new(host: &str, api_key: Option<String>) -> SyncResult<Self> {
        Ok(Self {
            api: ArrClient::new("sonarr", host, api_key)?,
        })
    }
}

#[async_trait]
impl SeriesProvider for SonarrClient {
    async fn list_series(&self) -> SyncResult<Vec<SeriesEntry>> {
        let series: Vec<SonarrSeries> = self.api.get("series", &[]).await?;
        debug!(count = series.len(), "Fetched series");
        Ok(series.into_iter().map(Into::into).collect())
    }

    async fn get_episode_files(&self, series_id: i64) -> SyncResult<Vec<EpisodeFileEntry>> {
        let files: Vec<SonarrEpisodeFile> = self
            .api
            .get("episodefile", &[("seriesId", series_id.to_string())])
            .await?;
        Ok(files.into_iter().map(Into::into).collect())
    }

    async fn get_episodes(&self, series_id: i64) -> SyncResult<Vec<EpisodeInfoEntry>> {
        let episodes: Vec<SonarrEpisode> = self
            .api
            .get("episode", &[("seriesId", series_id.to_string())])
            .await?;
        Ok(episodes.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_without_statistics_has_no_count() {
        let raw = r#"[
            {"id": 1, "title": "A", "statistics": {"episodeFileCount": 3}},
            {"id": 2, "title": "B"}
        ]"#;

        let series: Vec<SeriesEntry> = serde_json::from_str::<Vec<SonarrSeries>>(raw)
            .unwrap()
            .into_iter()
            .map(Into::into)
            .collect();

        assert_eq!(series[0].episode_file_count, Some(3));
        assert_eq!(series[1].episode_file_count, None);
    }

    #[test]
    fn episode_file_reads_legacy_language_object() {
        let raw = r#"{
            "id": 900, "seasonNumber": 1, "path": "/tv/Show/Season 01/Show.S01E01.mkv",
            "quality": {"quality": {"name": "WEBDL-1080p", "resolution": 1080}},
            "language": {"id": 1, "name": "English"}
        }"#;

        let file: EpisodeFileEntry = serde_json::from_str::<SonarrEpisodeFile>(raw)
            .unwrap()
            .into();

        assert_eq!(file.languages, vec!["English"]);
        assert_eq!(file.resolution, Some(1080));
    }
}
