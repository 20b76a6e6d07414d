//! Symlink sync job
//!
//! Scans the library for symlinks and stores the ones whose target file
//! name matches a known torrent file.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{Database, NewSymlink};
use crate::error::SyncResult;
use crate::providers::{SymlinkEntry, SymlinkScanner};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SymlinkSyncReport {
    pub scanned: usize,
    pub already_stored: usize,
    /// No torrent file carries the target's name
    pub unmatched: usize,
    pub created: usize,
    pub failures: usize,
    /// The store had no torrent files, so nothing was attempted
    pub skipped: bool,
}

pub async fn sync_symlinks(
    db: &Database,
    scanner: &dyn SymlinkScanner,
    root: &Path,
) -> SyncResult<SymlinkSyncReport> {
    let mut report = SymlinkSyncReport::default();

    let file_index = db.torrent_files().filename_index().await?;
    if file_index.is_empty() {
        warn!(job = "symlink_sync", "No torrent files in the database, skipping symlink sync");
        report.skipped = true;
        return Ok(report);
    }

    let scanned = scanner.scan_symlinks(root).await?;
    report.scanned = scanned.len();
    if scanned.is_empty() {
        warn!(job = "symlink_sync", root = %root.display(), "No symbolic links found in the library");
        return Ok(report);
    }

    let mut known = db.symlinks().destination_filenames().await?;
    let candidates: Vec<SymlinkEntry> = scanned
        .into_iter()
        .filter(|entry| {
            let new = known.insert(entry.destination_filename.clone());
            if !new {
                report.already_stored += 1;
            }
            new
        })
        .collect();

    for entry in candidates {
        let Some(&file_id) = file_index.get(&entry.target_filename) else {
            report.unmatched += 1;
            warn!(
                job = "symlink_sync",
                target = %entry.target_filename,
                "Target not found among torrent files, skipping"
            );
            continue;
        };

        let destination = entry.destination_path.clone();
        let input = NewSymlink {
            target_path: entry.target_path,
            target_filename: entry.target_filename,
            destination_path: entry.destination_path,
            destination_filename: entry.destination_filename,
        };
        match db.symlinks().create(input, Some(file_id)).await {
            Ok(symlink) => {
                report.created += 1;
                debug!(
                    job = "symlink_sync",
                    target = %symlink.target_path,
                    destination = %symlink.destination_path,
                    file_id = %file_id,
                    "Symlink added"
                );
            }
            Err(e) => {
                report.failures += 1;
                warn!(job = "symlink_sync", destination = %destination, error = %e, "Failed to store symlink");
            }
        }
    }

    info!(
        job = "symlink_sync",
        created = report.created,
        unmatched = report.unmatched,
        already_stored = report.already_stored,
        "Symlink sync finished"
    );
    Ok(report)
}

