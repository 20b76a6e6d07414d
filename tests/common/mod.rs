//! Shared fixtures: a temp-file database and in-memory providers

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use mediasync::db::Database;
use mediasync::error::{SyncError, SyncResult};
use mediasync::jobs::{JobContext, JobSettings};
use mediasync::providers::{
    EpisodeFileEntry, EpisodeInfoEntry, FileEntry, MovieEntry, MovieFileEntry, MovieProvider,
    PeerScope, PeerSource, PeerTorrent, Providers, SeriesEntry, SeriesProvider, SymlinkEntry,
    SymlinkScanner, TorrentProvider, TorrentSummary,
};

pub async fn test_db() -> (Database, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mediasync.db");
    let db = Database::connect(path.to_str().expect("utf-8 path"), 4)
        .await
        .expect("connect");
    db.sync_schema().await.expect("schema");
    (db, dir)
}

pub fn hash(c: char) -> String {
    c.to_string().repeat(40)
}

pub fn downloaded(id: &str, hash: &str, filename: &str) -> TorrentSummary {
    TorrentSummary {
        id: id.into(),
        hash: hash.into(),
        filename: filename.into(),
        status: "downloaded".into(),
    }
}

pub fn selected(path: &str, bytes: i64) -> FileEntry {
    FileEntry {
        path: path.into(),
        bytes,
        selected: true,
    }
}

pub fn link(target: &str, destination: &str) -> SymlinkEntry {
    let name = |p: &str| {
        Path::new(p)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    };
    SymlinkEntry {
        target_path: target.into(),
        target_filename: name(target),
        destination_path: destination.into(),
        destination_filename: name(destination),
    }
}

pub fn movie(id: i64, title: &str, file_id: i64, path: &str) -> MovieEntry {
    MovieEntry {
        id,
        title: title.into(),
        year: Some(2010),
        tmdb_id: Some(id * 100),
        genres: vec!["Drama".into()],
        has_file: true,
        movie_file: Some(MovieFileEntry {
            id: file_id,
            path: path.into(),
            quality: Some("Bluray-1080p".into()),
            resolution: Some(1080),
            languages: vec!["English".into()],
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn peer_torrent(id: &str, hash: &str, filename: &str) -> PeerTorrent {
    PeerTorrent {
        id: id.into(),
        hash: hash.into(),
        filename: filename.into(),
    }
}

/// Torrent listing served page by page, with per-torrent file listings.
/// Added magnets show up in the listing as `"magnet_conversion"`.
#[derive(Default)]
pub struct FakeTorrents {
    pub torrents: Mutex<Vec<TorrentSummary>>,
    pub files: Mutex<HashMap<String, Vec<FileEntry>>>,
    pub unavailable: Mutex<bool>,
    /// Hashes the provider reports as cached
    pub cached: Mutex<Vec<String>>,
    /// Hashes whose magnet the provider rejects
    pub rejected: Mutex<Vec<String>>,
    pub added: Mutex<Vec<String>>,
    pub selected_all: Mutex<Vec<String>>,
}

impl FakeTorrents {
    pub fn with(torrents: Vec<(TorrentSummary, Vec<FileEntry>)>) -> Self {
        let fake = Self::default();
        for (torrent, files) in torrents {
            fake.files.lock().insert(torrent.id.clone(), files);
            fake.torrents.lock().push(torrent);
        }
        fake
    }
}

#[async_trait]
impl TorrentProvider for FakeTorrents {
    async fn list_torrents(&self, page: u32, limit: u32) -> SyncResult<Vec<TorrentSummary>> {
        if *self.unavailable.lock() {
            return Err(SyncError::provider("real-debrid", "connection refused"));
        }
        let start = ((page.max(1) - 1) * limit) as usize;
        Ok(self
            .torrents
            .lock()
            .iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_torrent_files(&self, torrent_id: &str) -> SyncResult<Vec<FileEntry>> {
        self.files
            .lock()
            .get(torrent_id)
            .cloned()
            .ok_or_else(|| SyncError::provider("real-debrid", format!("no torrent {}", torrent_id)))
    }

    async fn is_cached(&self, hash: &str) -> SyncResult<bool> {
        Ok(self.cached.lock().iter().any(|h| h == hash))
    }

    async fn add_magnet(&self, hash: &str) -> SyncResult<String> {
        if self.rejected.lock().iter().any(|h| h == hash) {
            return Err(SyncError::provider("real-debrid", "400 Bad Request"));
        }
        let mut added = self.added.lock();
        added.push(hash.to_string());
        let id = format!("added{}", added.len());
        self.torrents.lock().push(TorrentSummary {
            id: id.clone(),
            hash: hash.to_string(),
            filename: format!("{}.magnet", hash),
            status: "magnet_conversion".into(),
        });
        Ok(id)
    }

    async fn select_all_files(&self, torrent_id: &str) -> SyncResult<()> {
        self.selected_all.lock().push(torrent_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMovies {
    pub movies: Mutex<Vec<MovieEntry>>,
    pub unavailable: Mutex<bool>,
}

#[async_trait]
impl MovieProvider for FakeMovies {
    async fn list_movies(&self) -> SyncResult<Vec<MovieEntry>> {
        if *self.unavailable.lock() {
            return Err(SyncError::provider("radarr", "503 Service Unavailable"));
        }
        Ok(self.movies.lock().clone())
    }
}

#[derive(Default)]
pub struct FakeSeries {
    pub series: Mutex<Vec<SeriesEntry>>,
    pub files: Mutex<HashMap<i64, Vec<EpisodeFileEntry>>>,
    pub episodes: Mutex<HashMap<i64, Vec<EpisodeInfoEntry>>>,
}

#[async_trait]
impl SeriesProvider for FakeSeries {
    async fn list_series(&self) -> SyncResult<Vec<SeriesEntry>> {
        Ok(self.series.lock().clone())
    }

    async fn get_episode_files(&self, series_id: i64) -> SyncResult<Vec<EpisodeFileEntry>> {
        Ok(self.files.lock().get(&series_id).cloned().unwrap_or_default())
    }

    async fn get_episodes(&self, series_id: i64) -> SyncResult<Vec<EpisodeInfoEntry>> {
        Ok(self.episodes.lock().get(&series_id).cloned().unwrap_or_default())
    }
}

/// A peer instance's export, per scope
#[derive(Default)]
pub struct FakePeer {
    pub all: Mutex<Vec<PeerTorrent>>,
    pub latest: Mutex<Vec<PeerTorrent>>,
    pub unavailable: Mutex<bool>,
}

#[async_trait]
impl PeerSource for FakePeer {
    async fn fetch_torrents(&self, scope: PeerScope) -> SyncResult<Vec<PeerTorrent>> {
        if *self.unavailable.lock() {
            return Err(SyncError::provider("peer", "401 Unauthorized"));
        }
        Ok(match scope {
            PeerScope::All => self.all.lock().clone(),
            PeerScope::Latest => self.latest.lock().clone(),
        })
    }
}

/// Returns a fixed scan result regardless of root
#[derive(Default)]
pub struct FakeScanner {
    pub links: Mutex<Vec<SymlinkEntry>>,
}

#[async_trait]
impl SymlinkScanner for FakeScanner {
    async fn scan_symlinks(&self, _root: &Path) -> SyncResult<Vec<SymlinkEntry>> {
        Ok(self.links.lock().clone())
    }
}

pub struct Fakes {
    pub torrents: Arc<FakeTorrents>,
    pub movies: Arc<FakeMovies>,
    pub series: Arc<FakeSeries>,
    pub scanner: Arc<FakeScanner>,
    pub peer: Arc<FakePeer>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            torrents: Arc::new(FakeTorrents::default()),
            movies: Arc::new(FakeMovies::default()),
            series: Arc::new(FakeSeries::default()),
            scanner: Arc::new(FakeScanner::default()),
            peer: Arc::new(FakePeer::default()),
        }
    }
}

impl Fakes {
    pub fn providers(&self) -> Providers {
        Providers {
            torrents: self.torrents.clone(),
            movies: self.movies.clone(),
            series: self.series.clone(),
            symlinks: self.scanner.clone(),
            peer: self.peer.clone(),
        }
    }

    pub fn context(&self, db: &Database, dir: &TempDir) -> JobContext {
        JobContext::new(
            db.clone(),
            self.providers(),
            JobSettings {
                page_size: 2,
                symlink_root: PathBuf::from("/media"),
                export_dir: dir.path().join("export"),
                mirror_only_cached: false,
            },
        )
    }
}
