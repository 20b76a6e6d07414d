//! Reconciliation jobs and their scheduling
//!
//! Every trigger, scheduled or ad hoc, goes through [`run_job`], which holds
//! a per-kind single-flight guard for the duration of the run.

pub mod cross_link;
pub mod export;
pub mod media_info_sync;
pub mod mirror;
pub mod scheduler;
pub mod symlink_sync;
pub mod torrent_sync;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info};

use crate::config::Config;
use crate::db::Database;
use crate::error::{SyncError, SyncResult};
use crate::providers::{PeerScope, Providers};

pub use cross_link::CrossLinkReport;
pub use export::ExportReport;
pub use media_info_sync::MediaInfoSyncReport;
pub use mirror::{MirrorOptions, MirrorReport};
pub use symlink_sync::SymlinkSyncReport;
pub use torrent_sync::TorrentSyncReport;

/// Something that can be triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Torrents,
    Media,
    Symlinks,
    CrossLink,
    Export,
    /// Torrents, media, symlinks, cross-link and export in order
    All,
    /// The scheduled sequence: torrents then media
    DatabaseUpdate,
    /// Add a peer instance's torrents to this account
    Mirror(PeerScope),
}

impl JobKind {
    pub fn from_arg(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "torrents" => Some(Self::Torrents),
            "media" => Some(Self::Media),
            "symlinks" => Some(Self::Symlinks),
            "crosslink" | "cross-link" => Some(Self::CrossLink),
            "export" => Some(Self::Export),
            "all" => Some(Self::All),
            "mirror" => Some(Self::Mirror(PeerScope::All)),
            "mirror-latest" | "mirror_latest" => Some(Self::Mirror(PeerScope::Latest)),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Torrents => "torrent_sync",
            Self::Media => "media_info_sync",
            Self::Symlinks => "symlink_sync",
            Self::CrossLink => "cross_link",
            Self::Export => "export",
            Self::All => "all",
            Self::DatabaseUpdate => scheduler::DATABASE_UPDATE_JOB,
            Self::Mirror(_) => "mirror",
        }
    }

    /// The single jobs this kind runs, in order
    pub fn steps(&self) -> &'static [JobKind] {
        match self {
            Self::Torrents => &[Self::Torrents],
            Self::Media => &[Self::Media],
            Self::Symlinks => &[Self::Symlinks],
            Self::CrossLink => &[Self::CrossLink],
            Self::Export => &[Self::Export],
            Self::All => &[
                Self::Torrents,
                Self::Media,
                Self::Symlinks,
                Self::CrossLink,
                Self::Export,
            ],
            Self::DatabaseUpdate => &[Self::Torrents, Self::Media],
            Self::Mirror(PeerScope::All) => &[Self::Mirror(PeerScope::All)],
            Self::Mirror(PeerScope::Latest) => &[Self::Mirror(PeerScope::Latest)],
        }
    }

    /// Mirror runs exclude each other whatever their scope
    fn lock_key(self) -> JobKind {
        match self {
            Self::Mirror(_) => Self::Mirror(PeerScope::All),
            other => other,
        }
    }
}

/// In-process single-flight guards, one per single job kind
#[derive(Debug, Clone, Default)]
pub struct JobLocks {
    running: Arc<Mutex<HashSet<JobKind>>>,
}

/// Releases its job kinds on drop
#[derive(Debug)]
pub struct JobGuard {
    kinds: Vec<JobKind>,
    running: Arc<Mutex<HashSet<JobKind>>>,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut running = self.running.lock();
        for kind in &self.kinds {
            running.remove(kind);
        }
    }
}

impl JobLocks {
    /// Take every step of `kind` at once, or none of them
    pub fn try_acquire(&self, kind: JobKind) -> SyncResult<JobGuard> {
        let keys: Vec<JobKind> = kind.steps().iter().map(|k| k.lock_key()).collect();
        let mut running = self.running.lock();
        if let Some(busy) = keys.iter().find(|k| running.contains(k)) {
            return Err(SyncError::AlreadyRunning(busy.name()));
        }
        running.extend(keys.iter().copied());

        Ok(JobGuard {
            kinds: keys,
            running: self.running.clone(),
        })
    }
}

/// Per-run settings the jobs need beyond the store and providers
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub page_size: u32,
    pub symlink_root: PathBuf,
    pub export_dir: PathBuf,
    pub mirror_only_cached: bool,
}

impl From<&Config> for JobSettings {
    fn from(config: &Config) -> Self {
        Self {
            page_size: config.real_debrid_page_size,
            symlink_root: config.symlink_path.clone(),
            export_dir: config.export_dir.clone(),
            mirror_only_cached: config.mirror_only_cached,
        }
    }
}

/// Everything a job run works against
pub struct JobContext {
    pub db: Database,
    pub providers: Providers,
    pub settings: JobSettings,
    pub locks: JobLocks,
}

impl JobContext {
    pub fn new(db: Database, providers: Providers, settings: JobSettings) -> Self {
        Self {
            db,
            providers,
            settings,
            locks: JobLocks::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobReport {
    TorrentSync(TorrentSyncReport),
    MediaInfoSync(MediaInfoSyncReport),
    SymlinkSync(SymlinkSyncReport),
    CrossLink(CrossLinkReport),
    Export(ExportReport),
    Mirror(MirrorReport),
}

async fn run_step(ctx: &JobContext, step: JobKind) -> SyncResult<JobReport> {
    let db = &ctx.db;
    let providers = &ctx.providers;
    match step {
        JobKind::Torrents => torrent_sync::sync_torrents(
            db,
            providers.torrents.as_ref(),
            ctx.settings.page_size,
        )
        .await
        .map(JobReport::TorrentSync),
        JobKind::Media => Ok(JobReport::MediaInfoSync(
            media_info_sync::sync_media_info(
                db,
                providers.movies.as_ref(),
                providers.series.as_ref(),
            )
            .await,
        )),
        JobKind::Symlinks => symlink_sync::sync_symlinks(
            db,
            providers.symlinks.as_ref(),
            &ctx.settings.symlink_root,
        )
        .await
        .map(JobReport::SymlinkSync),
        JobKind::CrossLink => cross_link::cross_link(db).await.map(JobReport::CrossLink),
        JobKind::Export => export::export_snapshots(db, &ctx.settings.export_dir)
            .await
            .map(JobReport::Export),
        JobKind::Mirror(scope) => mirror::mirror_peer(
            db,
            providers.peer.as_ref(),
            providers.torrents.as_ref(),
            MirrorOptions {
                scope,
                page_size: ctx.settings.page_size,
                only_cached: ctx.settings.mirror_only_cached,
            },
        )
        .await
        .map(JobReport::Mirror),
        JobKind::All | JobKind::DatabaseUpdate => Err(SyncError::Configuration(format!(
            "{} is not a single job",
            step.name()
        ))),
    }
}

/// Run `kind` under its single-flight guard.
///
/// Steps run in order; a failing step is logged and the next one still runs.
/// Only a busy guard is returned as an error.
pub async fn run_job(ctx: &JobContext, kind: JobKind) -> SyncResult<Vec<JobReport>> {
    let _guard = ctx.locks.try_acquire(kind)?;
    if kind == JobKind::DatabaseUpdate {
        info!(job = kind.name(), "Updating database...");
    } else {
        info!(job = kind.name(), "Job started");
    }

    let mut reports = Vec::new();
    for step in kind.steps() {
        match run_step(ctx, *step).await {
            Ok(report) => reports.push(report),
            Err(e) => error!(job = step.name(), error = %e, "Job failed"),
        }
    }

    if kind == JobKind::DatabaseUpdate {
        info!(job = kind.name(), completed = reports.len(), "Database updated.");
    } else {
        info!(
            job = kind.name(),
            completed = reports.len(),
            steps = kind.steps().len(),
            "Job finished"
        );
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_cli_names() {
        assert_eq!(JobKind::from_arg("crosslink"), Some(JobKind::CrossLink));
        assert_eq!(JobKind::from_arg("ALL"), Some(JobKind::All));
        assert_eq!(JobKind::from_arg("database_update_job"), None);
        assert_eq!(
            JobKind::from_arg("mirror-latest"),
            Some(JobKind::Mirror(PeerScope::Latest))
        );
    }

    #[test]
    fn mirror_scopes_share_one_guard() {
        let locks = JobLocks::default();

        let _guard = locks.try_acquire(JobKind::Mirror(PeerScope::All)).unwrap();

        assert_matches!(
            locks.try_acquire(JobKind::Mirror(PeerScope::Latest)),
            Err(SyncError::AlreadyRunning("mirror"))
        );
        assert!(locks.try_acquire(JobKind::All).is_ok());
    }

    #[test]
    fn overlapping_kinds_are_rejected_until_released() {
        let locks = JobLocks::default();

        let guard = locks.try_acquire(JobKind::DatabaseUpdate).unwrap();
        assert_matches!(
            locks.try_acquire(JobKind::Torrents),
            Err(SyncError::AlreadyRunning("torrent_sync"))
        );
        // Disjoint kinds still run
        let symlinks = locks.try_acquire(JobKind::Symlinks).unwrap();
        assert_matches!(locks.try_acquire(JobKind::All), Err(SyncError::AlreadyRunning(_)));

        drop(guard);
        drop(symlinks);
        assert!(locks.try_acquire(JobKind::All).is_ok());
    }
}
