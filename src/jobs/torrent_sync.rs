//! Torrent sync job
//!
//! Pulls the remote torrent listing page by page, keeps finished downloads
//! whose hash is not stored yet, and stores each one with its selected files.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{Database, NewFile, NewTorrent};
use crate::error::SyncResult;
use crate::providers::{STATUS_DOWNLOADED, TorrentProvider, TorrentSummary};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TorrentSyncReport {
    /// Torrents returned by the provider, any status
    pub fetched: usize,
    pub already_stored: usize,
    pub torrents_created: usize,
    pub files_created: usize,
    pub failures: usize,
}

/// Fetch every page, stopping at the first page shorter than `limit`
pub async fn fetch_all_torrents(
    provider: &dyn TorrentProvider,
    limit: u32,
) -> SyncResult<Vec<TorrentSummary>> {
    let limit = limit.max(1);
    let mut page = 1;
    let mut all = Vec::new();

    loop {
        let batch = provider.list_torrents(page, limit).await?;
        let short = batch.len() < limit as usize;
        all.extend(batch);
        if short {
            break;
        }
        page += 1;
    }

    debug!(job = "torrent_sync", pages = page, count = all.len(), "Fetched torrent listing");
    Ok(all)
}

/// Run the torrent sync. Only a failed listing aborts the run; per-torrent
/// failures are logged and counted.
pub async fn sync_torrents(
    db: &Database,
    provider: &dyn TorrentProvider,
    page_size: u32,
) -> SyncResult<TorrentSyncReport> {
    let mut report = TorrentSyncReport::default();

    let listing = fetch_all_torrents(provider, page_size).await?;
    report.fetched = listing.len();

    let mut known = db.torrents().all_hashes().await?;
    let mut seen_ids = HashSet::new();
    let mut new_torrents = Vec::new();
    for torrent in listing {
        if torrent.status != STATUS_DOWNLOADED {
            continue;
        }
        // `known` also absorbs duplicates inside the listing
        if !known.insert(torrent.hash.clone()) || !seen_ids.insert(torrent.id.clone()) {
            report.already_stored += 1;
            continue;
        }
        new_torrents.push(torrent);
    }

    if new_torrents.is_empty() {
        info!(job = "torrent_sync", "No new torrents found");
        return Ok(report);
    }

    for torrent in new_torrents {
        match store_torrent(db, provider, &torrent).await {
            Ok(files) => {
                report.torrents_created += 1;
                report.files_created += files;
                info!(
                    job = "torrent_sync",
                    torrent_id = %torrent.id,
                    filename = %torrent.filename,
                    files = files,
                    "Torrent added"
                );
            }
            Err(e) => {
                report.failures += 1;
                warn!(
                    job = "torrent_sync",
                    torrent_id = %torrent.id,
                    hash = %torrent.hash,
                    error = %e,
                    "Failed to store torrent"
                );
            }
        }
    }

    info!(
        job = "torrent_sync",
        created = report.torrents_created,
        files = report.files_created,
        failures = report.failures,
        "Torrent sync finished"
    );
    Ok(report)
}

/// Files are fetched before anything is written, and the torrent is stored
/// with its selected files in one transaction. Any failure leaves nothing
/// behind, so the torrent is retried on the next run.
async fn store_torrent(
    db: &Database,
    provider: &dyn TorrentProvider,
    torrent: &TorrentSummary,
) -> SyncResult<usize> {
    let files: Vec<NewFile> = provider
        .get_torrent_files(&torrent.id)
        .await?
        .into_iter()
        .filter(|f| f.selected)
        .map(|f| NewFile {
            path: f.path,
            bytes: f.bytes,
        })
        .collect();
    let count = files.len();

    db.torrents()
        .create_with_files(
            NewTorrent {
                id: torrent.id.clone(),
                hash: torrent.hash.clone(),
                filename: torrent.filename.clone(),
            },
            files,
        )
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::SyncError;
    use crate::providers::FileEntry;

    /// Serves `total` downloaded torrents and records requested pages
    struct PagedProvider {
        total: usize,
        pages: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl TorrentProvider for PagedProvider {
        async fn list_torrents(&self, page: u32, limit: u32) -> SyncResult<Vec<TorrentSummary>> {
            self.pages.lock().unwrap().push(page);
            let start = (page as usize - 1) * limit as usize;
            Ok((start..self.total.min(start + limit as usize))
                .map(|i| TorrentSummary {
                    id: format!("T{}", i),
                    hash: format!("{:040}", i),
                    filename: format!("file{}.mkv", i),
                    status: STATUS_DOWNLOADED.into(),
                })
                .collect())
        }

        async fn get_torrent_files(&self, _torrent_id: &str) -> SyncResult<Vec<FileEntry>> {
            Err(SyncError::provider("test", "no files"))
        }

        async fn is_cached(&self, _hash: &str) -> SyncResult<bool> {
            Ok(false)
        }

        async fn add_magnet(&self, _hash: &str) -> SyncResult<String> {
            Err(SyncError::provider("test", "read only"))
        }

        async fn select_all_files(&self, _torrent_id: &str) -> SyncResult<()> {
            Err(SyncError::provider("test", "read only"))
        }
    }

    #[tokio::test]
    async fn pagination_stops_on_short_page() {
        let provider = PagedProvider {
            total: 5,
            pages: Mutex::new(Vec::new()),
        };

        let all = fetch_all_torrents(&provider, 2).await.unwrap();

        assert_eq!(all.len(), 5);
        assert_eq!(*provider.pages.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let provider = PagedProvider {
            total: 4,
            pages: Mutex::new(Vec::new()),
        };

        let all = fetch_all_torrents(&provider, 2).await.unwrap();

        assert_eq!(all.len(), 4);
        assert_eq!(*provider.pages.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_file_fetch_stores_nothing() {
        let (db, _dir) = crate::db::test_support::test_db().await;
        let provider = PagedProvider {
            total: 1,
            pages: Mutex::new(Vec::new()),
        };

        let report = sync_torrents(&db, &provider, 10).await.unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(report.torrents_created, 0);
        assert_eq!(db.torrents().count().await.unwrap(), 0);
    }
}
