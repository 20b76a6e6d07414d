//! External data sources
//!
//! The reconciliation jobs only see the traits in this module. Concrete
//! adapters talk to the debrid REST API, the movie and series managers, a
//! peer instance's export and the local filesystem; tests plug in in-memory
//! fakes instead.

pub mod arr;
pub mod http;
pub mod peer;
pub mod radarr;
pub mod real_debrid;
pub mod sonarr;
pub mod symlinks;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::SyncResult;

pub use peer::PeerExportClient;
pub use radarr::RadarrClient;
pub use real_debrid::RealDebridClient;
pub use sonarr::SonarrClient;
pub use symlinks::FsSymlinkScanner;

/// Torrent status the sync job keeps
pub const STATUS_DOWNLOADED: &str = "downloaded";

/// One torrent in the remote account listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentSummary {
    pub id: String,
    pub hash: String,
    pub filename: String,
    pub status: String,
}

/// One file inside a remote torrent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub bytes: i64,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieEntry {
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i64>,
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<i64>,
    pub genres: Vec<String>,
    pub has_file: bool,
    pub movie_file: Option<MovieFileEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieFileEntry {
    pub id: i64,
    pub path: String,
    pub release_group: Option<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
    pub original_file_path: Option<String>,
    pub relative_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub id: i64,
    pub title: String,
    pub year: Option<i64>,
    pub tvdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub tvmaze_id: Option<i64>,
    pub genres: Vec<String>,
    /// Missing when the series manager has not computed statistics yet
    pub episode_file_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeFileEntry {
    pub id: i64,
    pub season_number: i64,
    pub path: String,
    pub release_group: Option<String>,
    pub quality: Option<String>,
    pub resolution: Option<i64>,
    pub languages: Vec<String>,
    pub relative_path: Option<String>,
}

/// Episode metadata, joined to files by `episode_file_id`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInfoEntry {
    pub id: i64,
    pub episode_number: Option<i64>,
    pub title: Option<String>,
    pub episode_file_id: Option<i64>,
}

/// A symlink found on disk, with its target resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymlinkEntry {
    pub target_path: String,
    pub target_filename: String,
    pub destination_path: String,
    pub destination_filename: String,
}

#[async_trait]
pub trait TorrentProvider: Send + Sync {
    /// One page (1-based) of the account's torrents
    async fn list_torrents(&self, page: u32, limit: u32) -> SyncResult<Vec<TorrentSummary>>;

    async fn get_torrent_files(&self, torrent_id: &str) -> SyncResult<Vec<FileEntry>>;

    /// Whether the provider can serve `hash` instantly from its cache
    async fn is_cached(&self, hash: &str) -> SyncResult<bool>;

    /// Add a magnet for `hash` to the account, returning the new torrent id
    async fn add_magnet(&self, hash: &str) -> SyncResult<String>;

    /// Start downloading every file of a freshly added torrent
    async fn select_all_files(&self, torrent_id: &str) -> SyncResult<()>;
}

#[async_trait]
pub trait MovieProvider: Send + Sync {
    async fn list_movies(&self) -> SyncResult<Vec<MovieEntry>>;
}

#[async_trait]
pub trait SeriesProvider: Send + Sync {
    async fn list_series(&self) -> SyncResult<Vec<SeriesEntry>>;

    async fn get_episode_files(&self, series_id: i64) -> SyncResult<Vec<EpisodeFileEntry>>;

    async fn get_episodes(&self, series_id: i64) -> SyncResult<Vec<EpisodeInfoEntry>>;
}

/// Which of a peer's snapshots to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerScope {
    All,
    Latest,
}

/// One torrent as published by a peer instance's export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerTorrent {
    pub id: String,
    pub hash: String,
    #[serde(rename = "torrent")]
    pub filename: String,
}

/// Read access to another instance's torrent export
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn fetch_torrents(&self, scope: PeerScope) -> SyncResult<Vec<PeerTorrent>>;
}

#[async_trait]
pub trait SymlinkScanner: Send + Sync {
    /// Every symlink under `root`, recursively, without following links
    async fn scan_symlinks(&self, root: &Path) -> SyncResult<Vec<SymlinkEntry>>;
}

/// The set of providers a job run works against
#[derive(Clone)]
pub struct Providers {
    pub torrents: Arc<dyn TorrentProvider>,
    pub movies: Arc<dyn MovieProvider>,
    pub series: Arc<dyn SeriesProvider>,
    pub symlinks: Arc<dyn SymlinkScanner>,
    pub peer: Arc<dyn PeerSource>,
}

impl Providers {
    /// Build the HTTP and filesystem adapters from configuration.
    ///
    /// Missing credentials do not fail here; the affected adapter logs a
    /// warning and reports itself unavailable on every call.
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        Ok(Self {
            torrents: Arc::new(RealDebridClient::new(
                &config.real_debrid_base_url,
                config.real_debrid_token.clone(),
            )?),
            movies: Arc::new(RadarrClient::new(
                &config.radarr_host,
                config.radarr_api_key.clone(),
            )?),
            series: Arc::new(SonarrClient::new(
                &config.sonarr_host,
                config.sonarr_api_key.clone(),
            )?),
            symlinks: Arc::new(FsSymlinkScanner),
            peer: Arc::new(PeerExportClient::new(
                config.peer_host.as_deref(),
                config.peer_api_key.clone(),
            )?),
        })
    }
}
