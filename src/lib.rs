//! mediasync
//!
//! Keeps a SQLite store of debrid torrents, their files, the library
//! symlinks pointing at them and the Radarr/Sonarr metadata describing them,
//! cross-linked so each file resolves to one movie or episode.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod providers;
