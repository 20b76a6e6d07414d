//! Filesystem symlink scanner
//!
//! Walks the library root without following links and resolves each file
//! symlink's raw target against the directory holding the link. Targets are
//! normalized lexically; they are never canonicalized, so dangling links
//! still resolve.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{SymlinkEntry, SymlinkScanner};
use crate::error::{SyncError, SyncResult};

pub struct FsSymlinkScanner;

#[async_trait]
impl SymlinkScanner for FsSymlinkScanner {
    async fn scan_symlinks(&self, root: &Path) -> SyncResult<Vec<SymlinkEntry>> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || scan_blocking(&root))
            .await
            .map_err(|e| SyncError::io(PathBuf::new(), std::io::Error::other(e)))?
    }
}

fn scan_blocking(root: &Path) -> SyncResult<Vec<SymlinkEntry>> {
    let root = absolutize(root).map_err(|e| SyncError::io(root, e))?;
    if !root.is_dir() {
        return Err(SyncError::io(
            &root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "symlink root is not a directory"),
        ));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(&root).follow_links(false).into_iter() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        // A linked root and links to directories are not library entries
        if entry.depth() == 0 || !entry.path_is_symlink() || entry.path().is_dir() {
            continue;
        }

        match resolve_symlink(entry.path()) {
            Ok(resolved) => entries.push(resolved),
            Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable symlink"),
        }
    }

    debug!(root = %root.display(), count = entries.len(), "Symlink scan finished");
    Ok(entries)
}

fn resolve_symlink(link: &Path) -> std::io::Result<SymlinkEntry> {
    let raw_target = std::fs::read_link(link)?;
    let link_dir = link.parent().unwrap_or_else(|| Path::new("/"));
    let target = normalize(&link_dir.join(raw_target));

    Ok(SymlinkEntry {
        target_filename: file_name(&target),
        target_path: target.to_string_lossy().into_owned(),
        destination_filename: file_name(link),
        destination_path: link.to_string_lossy().into_owned(),
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Resolve `.` and `..` without touching the filesystem
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
