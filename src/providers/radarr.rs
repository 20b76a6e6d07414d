//! Radarr (movie manager) client

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::arr::{ArrClient, ArrLanguage, ArrQualityWrapper};
use super::{MovieEntry, MovieFileEntry, MovieProvider};
use crate::error::SyncResult;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovie {
    id: i64,
    #[serde(default)]
    title: String,
    original_title: Option<String>,
    year: Option<i64>,
    imdb_id: Option<String>,
    tmdb_id: Option<i64>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    has_file: bool,
    movie_file: Option<RadarrMovieFile>,
}

/// Radarr sends `{}` for movies without a file, so every field is optional
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RadarrMovieFile {
    id: Option<i64>,
    path: Option<String>,
    release_group: Option<String>,
    #[serde(default)]
    quality: ArrQualityWrapper,
    #[serde(default)]
    languages: Vec<ArrLanguage>,
    original_file_path: Option<String>,
    relative_path: Option<String>,
}

impl RadarrMovieFile {
    fn into_entry(self) -> Option<MovieFileEntry> {
        let (quality, resolution) = self.quality.into_parts();
        Some(MovieFileEntry {
            id: self.id?,
            path: self.path?,
            release_group: self.release_group,
            quality,
            resolution,
            languages: self.languages.into_iter().map(|l| l.name).collect(),
            original_file_path: self.original_file_path,
            relative_path: self.relative_path,
        })
    }
}

impl From<RadarrMovie> for MovieEntry {
    fn from(m: RadarrMovie) -> Self {
        Self {
            id: m.id,
            title: m.title,
            original_title: m.original_title,
            year: m.year,
            imdb_id: m.imdb_id,
            tmdb_id: m.tmdb_id,
            genres: m.genres,
            has_file: m.has_file,
            movie_file: m.movie_file.and_then(RadarrMovieFile::into_entry),
        }
    }
}

pub struct RadarrClient {
    api: ArrClient,
}

impl RadarrClient {
    pub fn new(host: &str, api_key: Option<String>) -> SyncResult<Self> {
        Ok(Self {
            api: ArrClient::new("radarr", host, api_key)?,
        })
    }
}

#[async_trait]
impl MovieProvider for RadarrClient {
    async fn list_movies(&self) -> SyncResult<Vec<MovieEntry>> {
        let movies: Vec<RadarrMovie> = self.api.get("movie", &[]).await?;
        debug!(count = movies.len(), "Fetched movies");
        Ok(movies.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_movie_file_fields() {
        let raw = r#"{
            "id": 7, "title": "Inception", "originalTitle": "Inception", "year": 2010,
            "imdbId": "tt1375666", "tmdbId": 27205, "genres": ["Action"], "hasFile": true,
            "movieFile": {
                "id": 42, "path": "/movies/Inception (2010)/Inception.mkv",
                "relativePath": "Inception.mkv", "releaseGroup": "GRP",
                "quality": {"quality": {"id": 7, "name": "Bluray-1080p", "resolution": 1080}},
                "languages": [{"id": 1, "name": "English"}]
            }
        }"#;

        let movie: MovieEntry = serde_json::from_str::<RadarrMovie>(raw).unwrap().into();
        let file = movie.movie_file.unwrap();

        assert_eq!(file.id, 42);
        assert_eq!(file.quality.as_deref(), Some("Bluray-1080p"));
        assert_eq!(file.resolution, Some(1080));
        assert_eq!(file.languages, vec!["English"]);
    }

    #[test]
    fn empty_movie_file_is_absent() {
        let raw = r#"{"id": 8, "title": "Missing", "hasFile": false, "movieFile": {}}"#;

        let movie: MovieEntry = serde_json::from_str::<RadarrMovie>(raw).unwrap().into();

        assert!(!movie.has_file);
        assert_eq!(movie.movie_file, None);
    }
}
