//! Media-info sync job
//!
//! Mirrors the movie and series managers' file metadata into the store.
//! The movie and episode sub-passes are independent: a provider outage
//! aborts only its own sub-pass.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::db::{Database, NewExternalEpisode, NewExternalMovie};
use crate::error::SyncResult;
use crate::providers::{
    EpisodeFileEntry, EpisodeInfoEntry, MovieEntry, MovieProvider, SeriesEntry, SeriesProvider,
};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SubPassReport {
    /// Payloads built from provider data
    pub candidates: usize,
    pub already_stored: usize,
    pub created: usize,
    pub failures: usize,
    /// The provider could not be reached; nothing was written
    pub aborted: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct MediaInfoSyncReport {
    pub movies: SubPassReport,
    pub episodes: SubPassReport,
}

pub async fn sync_media_info(
    db: &Database,
    movies: &dyn MovieProvider,
    series: &dyn SeriesProvider,
) -> MediaInfoSyncReport {
    let movies = sync_movies(db, movies).await.unwrap_or_else(|e| {
        error!(job = "media_info_sync", pass = "movies", error = %e, "Movie sync aborted");
        SubPassReport {
            aborted: true,
            ..Default::default()
        }
    });
    let episodes = sync_episodes(db, series).await.unwrap_or_else(|e| {
        error!(job = "media_info_sync", pass = "episodes", error = %e, "Episode sync aborted");
        SubPassReport {
            aborted: true,
            ..Default::default()
        }
    });

    MediaInfoSyncReport { movies, episodes }
}

/// Build the stored payload for a movie, or `None` when it has no file
pub fn movie_payload(movie: MovieEntry) -> Option<NewExternalMovie> {
    if !movie.has_file {
        return None;
    }
    let file = movie.movie_file?;

    Some(NewExternalMovie {
        provider_movie_id: movie.id,
        title: movie.title,
        original_title: movie.original_title,
        year: movie.year,
        release_group: file.release_group,
        imdb_id: movie.imdb_id,
        tmdb_id: movie.tmdb_id,
        genres: movie.genres,
        quality: file.quality,
        resolution: file.resolution,
        languages: file.languages,
        original_file_path: file.original_file_path,
        relative_path: file.relative_path,
        source_path: file.path,
        provider_file_id: file.id,
    })
}

/// Join a series' episode files with its episodes by episode-file id.
/// Files without a matching episode keep number and title unset.
pub fn episode_payloads(
    series: &SeriesEntry,
    files: Vec<EpisodeFileEntry>,
    episodes: &[EpisodeInfoEntry],
) -> Vec<NewExternalEpisode> {
    let by_file: HashMap<i64, &EpisodeInfoEntry> = episodes
        .iter()
        .filter_map(|e| e.episode_file_id.map(|file_id| (file_id, e)))
        .fold(HashMap::new(), |mut map, (file_id, e)| {
            // First episode wins for multi-episode files
            map.entry(file_id).or_insert(e);
            map
        });

    files
        .into_iter()
        .map(|file| {
            let episode = by_file.get(&file.id);
            NewExternalEpisode {
                provider_series_id: series.id,
                series_title: series.title.clone(),
                year: series.year,
                season_number: file.season_number,
                episode_number: episode.and_then(|e| e.episode_number),
                episode_title: episode.and_then(|e| e.title.clone()),
                release_group: file.release_group,
                tvdb_id: series.tvdb_id,
                imdb_id: series.imdb_id.clone(),
                tvmaze_id: series.tvmaze_id,
                genres: series.genres.clone(),
                quality: file.quality,
                resolution: file.resolution,
                languages: file.languages,
                relative_path: file.relative_path,
                source_path: file.path,
                provider_file_id: file.id,
                provider_episode_id: episode.map(|e| e.id),
            }
        })
        .collect()
}

pub async fn sync_movies(db: &Database, provider: &dyn MovieProvider) -> SyncResult<SubPassReport> {
    let mut report = SubPassReport::default();

    let payloads: Vec<NewExternalMovie> = provider
        .list_movies()
        .await?
        .into_iter()
        .filter_map(movie_payload)
        .collect();
    report.candidates = payloads.len();

    let mut known = db.movies().provider_file_ids().await?;
    for payload in payloads {
        if !known.insert(payload.provider_file_id) {
            report.already_stored += 1;
            continue;
        }
        let title = payload.title.clone();
        match db.movies().create(payload).await {
            Ok(movie) => {
                report.created += 1;
                info!(job = "media_info_sync", title = %title, file_id = movie.provider_file_id, "Movie info added");
            }
            Err(e) => {
                report.failures += 1;
                warn!(job = "media_info_sync", title = %title, error = %e, "Failed to store movie info");
            }
        }
    }

    if report.created == 0 {
        debug!(job = "media_info_sync", "No new movies found");
    }
    Ok(report)
}

pub async fn sync_episodes(
    db: &Database,
    provider: &dyn SeriesProvider,
) -> SyncResult<SubPassReport> {
    let mut report = SubPassReport::default();

    let mut payloads = Vec::new();
    for series in provider.list_series().await? {
        match series.episode_file_count {
            None | Some(0) => {
                debug!(job = "media_info_sync", series = %series.title, "Series has no episode files");
                continue;
            }
            Some(_) => {}
        }

        let files = match provider.get_episode_files(series.id).await {
            Ok(files) => files,
            Err(e) => {
                warn!(job = "media_info_sync", series = %series.title, error = %e, "Skipping series, episode files unavailable");
                continue;
            }
        };
        let episodes = match provider.get_episodes(series.id).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!(job = "media_info_sync", series = %series.title, error = %e, "Skipping series, episodes unavailable");
                continue;
            }
        };

        payloads.extend(episode_payloads(&series, files, &episodes));
    }
    report.candidates = payloads.len();

    let mut known: HashSet<i64> = db.episodes().provider_file_ids().await?;
    for payload in payloads {
        if !known.insert(payload.provider_file_id) {
            report.already_stored += 1;
            continue;
        }
        let series_title = payload.series_title.clone();
        let season = payload.season_number;
        let episode = payload.episode_number;
        match db.episodes().create(payload).await {
            Ok(_) => {
                report.created += 1;
                info!(
                    job = "media_info_sync",
                    series = %series_title,
                    season = season,
                    episode = ?episode,
                    "Episode info added"
                );
            }
            Err(e) => {
                report.failures += 1;
                warn!(job = "media_info_sync", series = %series_title, error = %e, "Failed to store episode info");
            }
        }
    }

    if report.created == 0 {
        debug!(job = "media_info_sync", "No new episodes found");
    }
    Ok(report)
}
