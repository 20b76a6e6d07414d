//! Client for another instance's published torrent export
//!
//! The peer serves the same JSON the export projector writes, at
//! `/sync/fetchAll` and `/sync/fetchLatest`, behind an `api-key` header.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::http::{RateLimitConfig, RateLimitedClient};
use super::{PeerScope, PeerSource, PeerTorrent};
use crate::error::{SyncError, SyncResult};

const PROVIDER: &str = "peer";

pub struct PeerExportClient {
    http: RateLimitedClient,
    host: Option<String>,
    api_key: Option<String>,
}

impl PeerExportClient {
    pub fn new(host: Option<&str>, api_key: Option<String>) -> SyncResult<Self> {
        if host.is_none() || api_key.is_none() {
            warn!("PEER_HOST or PEER_API_KEY not set, mirroring will be unavailable");
        }
        Ok(Self {
            http: RateLimitedClient::new(PROVIDER, RateLimitConfig::default())?,
            host: host.map(|h| h.trim_end_matches('/').to_string()),
            api_key,
        })
    }

    fn endpoint(&self, scope: PeerScope) -> SyncResult<String> {
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| SyncError::provider(PROVIDER, "peer host not configured"))?;
        let path = match scope {
            PeerScope::All => "fetchAll",
            PeerScope::Latest => "fetchLatest",
        };
        Ok(format!("{}/sync/{}", host, path))
    }
}

#[async_trait]
impl PeerSource for PeerExportClient {
    async fn fetch_torrents(&self, scope: PeerScope) -> SyncResult<Vec<PeerTorrent>> {
        let url = self.endpoint(scope)?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SyncError::provider(PROVIDER, "API key not configured"))?;

        let torrents: Vec<PeerTorrent> = self
            .http
            .get_json(&url, &[("api-key", api_key)], &[])
            .await?
            .unwrap_or_default();
        debug!(scope = ?scope, count = torrents.len(), "Fetched peer export");
        Ok(torrents)
    }
}
