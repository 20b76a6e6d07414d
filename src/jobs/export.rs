//! JSON export of the store
//!
//! Materializes every torrent with its files and collapsed media info into
//! `all_torrents.json`, plus the 25 most recent into `latest_torrents.json`.
//! Files are replaced atomically so readers never see a partial snapshot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{Database, EpisodeRecord, MovieRecord, TorrentFileRecord, TorrentRecord};
use crate::error::{SyncError, SyncResult};

pub const ALL_TORRENTS_FILE: &str = "all_torrents.json";
pub const LATEST_TORRENTS_FILE: &str = "latest_torrents.json";
pub const LATEST_COUNT: usize = 25;
const PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentView {
    /// Torrent filename
    pub torrent: String,
    pub id: String,
    pub hash: String,
    pub added: DateTime<Utc>,
    pub files: Vec<FileView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileView {
    pub path: String,
    pub bytes: i64,
    pub added: DateTime<Utc>,
    pub info: Option<MediaInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mediaType")]
pub enum MediaInfo {
    #[serde(rename = "movie")]
    Movie(MovieInfo),
    #[serde(rename = "series")]
    Series(EpisodeInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieInfo {
    pub title: String,
    pub year: Option<i64>,
    pub release_group: Option<String>,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub genres: Vec<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeInfo {
    pub series_title: String,
    pub year: Option<i64>,
    pub season_number: i64,
    pub episode_title: Option<String>,
    pub episode_number: Option<i64>,
    pub release_group: Option<String>,
    pub tvdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    #[serde(rename = "tvMazeId")]
    pub tvmaze_id: Option<i64>,
    pub genres: Vec<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
}

impl From<MovieRecord> for MediaInfo {
    fn from(m: MovieRecord) -> Self {
        Self::Movie(MovieInfo {
            title: m.title,
            year: m.year,
            release_group: m.release_group,
            tmdb_id: m.tmdb_id,
            imdb_id: m.imdb_id,
            genres: m.genres,
            quality: m.quality,
            resolution: m.resolution,
            languages: m.languages,
        })
    }
}

impl From<EpisodeRecord> for MediaInfo {
    fn from(e: EpisodeRecord) -> Self {
        Self::Series(EpisodeInfo {
            series_title: e.series_title,
            year: e.year,
            season_number: e.season_number,
            episode_title: e.episode_title,
            episode_number: e.episode_number,
            release_group: e.release_group,
            tvdb_id: e.tvdb_id,
            imdb_id: e.imdb_id,
            tvmaze_id: e.tvmaze_id,
            genres: e.genres,
            quality: e.quality,
            resolution: e.resolution,
            languages: e.languages,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub torrents: usize,
    pub latest: usize,
    pub all_path: PathBuf,
    pub latest_path: PathBuf,
}

async fn file_view(db: &Database, file: TorrentFileRecord) -> SyncResult<FileView> {
    let info = if let Some(movie_id) = file.movie_id {
        db.movies().get_by_id(movie_id).await?.map(MediaInfo::from)
    } else if let Some(episode_id) = file.episode_id {
        db.episodes().get_by_id(episode_id).await?.map(MediaInfo::from)
    } else {
        None
    };

    Ok(FileView {
        path: file.path,
        bytes: file.bytes,
        added: file.added_at,
        info,
    })
}

pub async fn torrent_view(db: &Database, torrent: TorrentRecord) -> SyncResult<TorrentView> {
    let mut files = Vec::new();
    for file in db.torrent_files().list_by_torrent(&torrent.id).await? {
        files.push(file_view(db, file).await?);
    }

    Ok(TorrentView {
        torrent: torrent.filename,
        id: torrent.id,
        hash: torrent.hash,
        added: torrent.added_at,
        files,
    })
}

/// One page of torrent views in insertion order
pub async fn list_torrent_views(
    db: &Database,
    limit: i64,
    offset: i64,
) -> SyncResult<Vec<TorrentView>> {
    let mut views = Vec::new();
    for torrent in db.torrents().list(limit, offset).await? {
        views.push(torrent_view(db, torrent).await?);
    }
    Ok(views)
}

/// Every torrent view, newest first
pub async fn collect_all(db: &Database) -> SyncResult<Vec<TorrentView>> {
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let page = list_torrent_views(db, PAGE_SIZE, offset).await?;
        let short = (page.len() as i64) < PAGE_SIZE;
        all.extend(page);
        if short {
            break;
        }
        offset += PAGE_SIZE;
    }

    all.sort_by(|a, b| b.added.cmp(&a.added));
    Ok(all)
}

/// Write `value` as pretty JSON to a temp sibling, sync it, then rename it
/// over `path`
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> SyncResult<()> {
    let body = serde_json::to_vec_pretty(value)?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.json".to_string());
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| SyncError::io(&tmp, e))?;
        file.write_all(&body).await.map_err(|e| SyncError::io(&tmp, e))?;
        file.flush().await.map_err(|e| SyncError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| SyncError::io(&tmp, e))?;
        drop(file);
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| SyncError::io(path, e))
    }
    .await;

    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(&tmp).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %tmp.display(), error = %e, "Failed to remove temp export file");
    }
    result
}

/// Write both snapshots into `dir`
pub async fn export_snapshots(db: &Database, dir: &Path) -> SyncResult<ExportReport> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SyncError::io(dir, e))?;

    let all = collect_all(db).await?;
    let latest = &all[..all.len().min(LATEST_COUNT)];

    let all_path = dir.join(ALL_TORRENTS_FILE);
    let latest_path = dir.join(LATEST_TORRENTS_FILE);
    write_json_atomic(&all_path, &all).await?;
    write_json_atomic(&latest_path, &latest).await?;
    debug!(path = %all_path.display(), "Wrote torrent snapshot");

    info!(job = "export", torrents = all.len(), latest = latest.len(), "Export written");
    Ok(ExportReport {
        torrents: all.len(),
        latest: latest.len(),
        all_path,
        latest_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_info_is_tagged_by_media_type() {
        let info = MediaInfo::Movie(MovieInfo {
            title: "Inception".into(),
            year: Some(2010),
            release_group: None,
            tmdb_id: Some(27205),
            imdb_id: None,
            genres: vec![],
            quality: None,
            resolution: Some(1080),
            languages: vec!["English".into()],
        });

        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["mediaType"], "movie");
        assert_eq!(json["tmdbId"], 27205);
        assert_eq!(serde_json::from_value::<MediaInfo>(json).unwrap(), info);
    }

    #[tokio::test]
    async fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(ALL_TORRENTS_FILE);
        tokio::fs::write(&path, b"old").await.unwrap();

        write_json_atomic(&path, &vec![1, 2, 3]).await.unwrap();

        let parsed: Vec<i32> =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(parsed, vec![1, 2, 3]);
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn failed_write_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let missing_dir = dir.path().join("nope").join(ALL_TORRENTS_FILE);

        let err = write_json_atomic(&missing_dir, &vec![1]).await.unwrap_err();

        assert!(matches!(err, SyncError::Io { .. }));
    }
}
