//! Peer mirror job
//!
//! Reads another instance's torrent export and adds every hash this account
//! does not hold yet, as a magnet with all files selected. The local store
//! is not written; the next torrent sync picks the downloads up.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::torrent_sync::fetch_all_torrents;
use crate::db::Database;
use crate::error::SyncResult;
use crate::providers::{PeerScope, PeerSource, PeerTorrent, TorrentProvider};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorReport {
    pub scope: PeerScope,
    /// Torrents listed by the peer
    pub fetched: usize,
    pub already_present: usize,
    pub added: usize,
    /// Skipped because the provider has no cached copy
    pub not_cached: usize,
    pub failures: usize,
}

impl MirrorReport {
    fn new(scope: PeerScope) -> Self {
        Self {
            scope,
            fetched: 0,
            already_present: 0,
            added: 0,
            not_cached: 0,
            failures: 0,
        }
    }
}

/// Settings for one mirror run
#[derive(Debug, Clone, Copy)]
pub struct MirrorOptions {
    pub scope: PeerScope,
    pub page_size: u32,
    pub only_cached: bool,
}

/// Hashes the account already holds: stored torrents plus the live listing
/// in any status, so in-progress downloads are not added twice.
async fn known_hashes(
    db: &Database,
    torrents: &dyn TorrentProvider,
    page_size: u32,
) -> SyncResult<HashSet<String>> {
    let mut known: HashSet<String> = db
        .torrents()
        .all_hashes()
        .await?
        .into_iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();
    for torrent in fetch_all_torrents(torrents, page_size).await? {
        known.insert(torrent.hash.to_ascii_lowercase());
    }
    Ok(known)
}

async fn add_torrent(torrents: &dyn TorrentProvider, hash: &str) -> SyncResult<String> {
    let torrent_id = torrents.add_magnet(hash).await?;
    torrents.select_all_files(&torrent_id).await?;
    Ok(torrent_id)
}

/// Run the mirror. A failed peer fetch or account listing aborts the run;
/// a failed add is logged and counted.
pub async fn mirror_peer(
    db: &Database,
    peer: &dyn PeerSource,
    torrents: &dyn TorrentProvider,
    options: MirrorOptions,
) -> SyncResult<MirrorReport> {
    let mut report = MirrorReport::new(options.scope);

    let listing = peer.fetch_torrents(options.scope).await?;
    report.fetched = listing.len();
    if listing.is_empty() {
        info!(job = "mirror", scope = ?options.scope, "No torrents to sync");
        return Ok(report);
    }

    let mut known = known_hashes(db, torrents, options.page_size).await?;
    let missing: Vec<PeerTorrent> = listing
        .into_iter()
        .filter(|t| {
            let new = known.insert(t.hash.to_ascii_lowercase());
            if !new {
                report.already_present += 1;
            }
            new
        })
        .collect();

    for torrent in missing {
        if options.only_cached {
            match torrents.is_cached(&torrent.hash).await {
                Ok(true) => {}
                Ok(false) => {
                    report.not_cached += 1;
                    debug!(job = "mirror", hash = %torrent.hash, "Torrent not cached, skipping");
                    continue;
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(
                        job = "mirror",
                        hash = %torrent.hash,
                        error = %e,
                        "Cache lookup failed"
                    );
                    continue;
                }
            }
        }

        match add_torrent(torrents, &torrent.hash).await {
            Ok(torrent_id) => {
                report.added += 1;
                info!(
                    job = "mirror",
                    torrent_id = %torrent_id,
                    filename = %torrent.filename,
                    "Torrent added from peer"
                );
            }
            Err(e) => {
                report.failures += 1;
                warn!(
                    job = "mirror",
                    hash = %torrent.hash,
                    filename = %torrent.filename,
                    error = %e,
                    "Failed to add torrent from peer"
                );
            }
        }
    }

    info!(
        job = "mirror",
        scope = ?options.scope,
        added = report.added,
        already_present = report.already_present,
        not_cached = report.not_cached,
        failures = report.failures,
        "Mirror finished"
    );
    Ok(report)
}
