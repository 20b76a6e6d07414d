//! Real-Debrid REST client
//!
//! Base URL: https://api.real-debrid.com/rest/1.0, bearer token auth.
//! Wraps the listing and file endpoints the torrent sync reads, plus the
//! cache lookup and magnet endpoints the peer mirror writes through.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::http::RateLimitedClient;
use super::{FileEntry, TorrentProvider, TorrentSummary};
use crate::error::{SyncError, SyncResult};

const PROVIDER: &str = "real-debrid";

#[derive(Debug, Deserialize)]
struct RdTorrent {
    id: String,
    hash: String,
    filename: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RdTorrentInfo {
    #[serde(default)]
    files: Vec<RdFile>,
}

#[derive(Debug, Deserialize)]
struct RdFile {
    path: String,
    bytes: i64,
    /// 1 when the file was picked for download
    #[serde(default)]
    selected: i64,
}

#[derive(Debug, Deserialize)]
struct RdAddedTorrent {
    id: String,
}

/// `{"<hash>": {"rd": [...]}}` when cached, `{"<hash>": []}` otherwise
fn is_cached_response(body: &HashMap<String, serde_json::Value>, hash: &str) -> bool {
    body.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(hash))
        .is_some_and(|(_, hosts)| hosts.get("rd").is_some())
}

fn magnet_uri(hash: &str) -> String {
    format!("magnet:?xt=urn:btih:{}", hash)
}

impl From<RdTorrent> for TorrentSummary {
    fn from(t: RdTorrent) -> Self {
        Self {
            id: t.id,
            hash: t.hash,
            filename: t.filename,
            status: t.status,
        }
    }
}

impl From<RdFile> for FileEntry {
    fn from(f: RdFile) -> Self {
        Self {
            path: f.path,
            bytes: f.bytes,
            selected: f.selected == 1,
        }
    }
}

pub struct RealDebridClient {
    http: RateLimitedClient,
    base_url: String,
    token: Option<String>,
}

impl RealDebridClient {
    pub fn new(base_url: &str, token: Option<String>) -> SyncResult<Self> {
        if token.is_none() {
            warn!("RD_API_TOKEN not set, torrent sync will be unavailable");
        }
        Ok(Self {
            http: RateLimitedClient::for_real_debrid()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn auth_header(&self) -> SyncResult<String> {
        self.token
            .as_ref()
            .map(|t| format!("Bearer {}", t))
            .ok_or_else(|| SyncError::provider(PROVIDER, "API token not configured"))
    }
}

#[async_trait]
impl TorrentProvider for RealDebridClient {
    async fn list_torrents(&self, page: u32, limit: u32) -> SyncResult<Vec<TorrentSummary>> {
        let auth = self.auth_header()?;
        let url = format!("{}/torrents", self.base_url);

        let torrents: Option<Vec<RdTorrent>> = self
            .http
            .get_json(
                &url,
                &[("Authorization", auth.as_str())],
                &[("page", page.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        let torrents: Vec<TorrentSummary> = torrents
            .unwrap_or_default()
            .into_iter()
            .map(Into::into)
            .collect();
        debug!(page = page, count = torrents.len(), "Fetched torrent page");
        Ok(torrents)
    }

    async fn get_torrent_files(&self, torrent_id: &str) -> SyncResult<Vec<FileEntry>> {
        let auth = self.auth_header()?;
        let url = format!("{}/torrents/info/{}", self.base_url, torrent_id);

        let info: Option<RdTorrentInfo> = self
            .http
            .get_json(&url, &[("Authorization", auth.as_str())], &[])
            .await?;

        Ok(info
            .map(|i| i.files.into_iter().map(Into::into).collect())
            .unwrap_or_default())
    }

    async fn is_cached(&self, hash: &str) -> SyncResult<bool> {
        let auth = self.auth_header()?;
        let url = format!("{}/torrents/instantAvailability/{}", self.base_url, hash);

        let body: Option<HashMap<String, serde_json::Value>> = self
            .http
            .get_json(&url, &[("Authorization", auth.as_str())], &[])
            .await?;
        Ok(body.is_some_and(|b| is_cached_response(&b, hash)))
    }

    async fn add_magnet(&self, hash: &str) -> SyncResult<String> {
        let auth = self.auth_header()?;
        let url = format!("{}/torrents/addMagnet", self.base_url);

        let added: Option<RdAddedTorrent> = self
            .http
            .post_form(
                &url,
                &[("Authorization", auth.as_str())],
                &[("magnet", magnet_uri(hash))],
            )
            .await?;
        let added = added.ok_or_else(|| {
            SyncError::provider(PROVIDER, format!("no torrent id returned for {}", hash))
        })?;
        debug!(hash = %hash, torrent_id = %added.id, "Magnet added");
        Ok(added.id)
    }

    async fn select_all_files(&self, torrent_id: &str) -> SyncResult<()> {
        let auth = self.auth_header()?;
        let url = format!("{}/torrents/selectFiles/{}", self.base_url, torrent_id);

        let _: Option<serde_json::Value> = self
            .http
            .post_form(
                &url,
                &[("Authorization", auth.as_str())],
                &[("files", "all".to_string())],
            )
            .await?;
        Ok(())
    }
}
