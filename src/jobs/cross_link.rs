//! Cross-link pass
//!
//! Attaches metadata to files that have a symlink but no metadata yet, by
//! matching the symlink's destination against the managers' file paths.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{Database, LinkOutcome};
use crate::error::SyncResult;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CrossLinkReport {
    pub examined: usize,
    pub linked_movies: usize,
    pub linked_episodes: usize,
    pub no_media_path: usize,
    pub missing_symlink: usize,
    pub failures: usize,
}

pub async fn cross_link(db: &Database) -> SyncResult<CrossLinkReport> {
    let mut report = CrossLinkReport::default();

    let unlinked = db.torrent_files().list_unlinked().await?;
    report.examined = unlinked.len();

    for file in unlinked {
        let Some(symlink_id) = file.symlink_id else {
            continue;
        };
        let symlink = match db.symlinks().get_by_id(symlink_id).await {
            Ok(Some(symlink)) => symlink,
            Ok(None) => {
                report.missing_symlink += 1;
                warn!(job = "cross_link", path = %file.path, "Symlink not found for file");
                continue;
            }
            Err(e) => {
                report.failures += 1;
                warn!(job = "cross_link", path = %file.path, error = %e, "Failed to load symlink");
                continue;
            }
        };

        let result = match db.movies().find_by_source_path(&symlink.destination_path).await {
            Ok(Some(movie)) => db
                .links()
                .link_file_to_movie(file.id, movie.id)
                .await
                .map(|outcome| (outcome, "movie")),
            Ok(None) => match db.episodes().find_by_source_path(&symlink.destination_path).await {
                Ok(Some(episode)) => db
                    .links()
                    .link_file_to_episode(file.id, episode.id)
                    .await
                    .map(|outcome| (outcome, "episode")),
                Ok(None) => {
                    report.no_media_path += 1;
                    debug!(job = "cross_link", path = %file.path, "Could not find media path for file");
                    continue;
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok((LinkOutcome::Linked, "movie")) => report.linked_movies += 1,
            Ok((LinkOutcome::Linked, _)) => report.linked_episodes += 1,
            Ok((outcome, kind)) => {
                debug!(job = "cross_link", path = %file.path, kind = kind, outcome = ?outcome, "Nothing to link")
            }
            Err(e) => {
                report.failures += 1;
                warn!(job = "cross_link", path = %file.path, error = %e, "Failed to link file");
            }
        }
    }

    info!(
        job = "cross_link",
        movies = report.linked_movies,
        episodes = report.linked_episodes,
        no_media_path = report.no_media_path,
        "Cross-link pass finished"
    );
    Ok(report)
}
