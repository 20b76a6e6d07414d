//! Application configuration management

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, ensure};

/// One year; longer intervals overflow the scheduler's date arithmetic
pub const MAX_SYNC_INTERVAL_MINUTES: i64 = 525_600;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite path or `sqlite:` URL
    pub database_url: String,

    pub database_max_connections: u32,

    /// Real-Debrid API token; the torrent provider is unavailable without it
    pub real_debrid_token: Option<String>,

    pub real_debrid_base_url: String,

    /// Page size used when listing remote torrents
    pub real_debrid_page_size: u32,

    pub radarr_host: String,
    pub radarr_api_key: Option<String>,

    pub sonarr_host: String,
    pub sonarr_api_key: Option<String>,

    /// Base URL of another instance whose export the mirror job copies
    pub peer_host: Option<String>,
    pub peer_api_key: Option<String>,

    /// Mirror only torrents the debrid provider has cached
    pub mirror_only_cached: bool,

    /// Root of the symlinked media library
    pub symlink_path: PathBuf,

    /// Directory receiving the JSON snapshots
    pub export_dir: PathBuf,

    /// Interval of the recurring database update job
    pub sync_interval_minutes: i64,

    pub misfire_grace_seconds: i64,

    /// How often the scheduler checks the job registry
    pub scheduler_poll_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        // Empty values count as unset for secrets
        let secret = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Prefer DATABASE_PATH, fall back to DATABASE_URL
        let database_url = lookup("DATABASE_PATH")
            .or_else(|| lookup("DATABASE_URL"))
            .unwrap_or_else(|| "./data/mediasync.db".to_string());

        let sync_interval_minutes: i64 = var("SYNC_INTERVAL_MINUTES", "15")
            .parse()
            .context("Invalid SYNC_INTERVAL_MINUTES")?;
        ensure!(
            (1..=MAX_SYNC_INTERVAL_MINUTES).contains(&sync_interval_minutes),
            "SYNC_INTERVAL_MINUTES must be between 1 and {}, got {}",
            MAX_SYNC_INTERVAL_MINUTES,
            sync_interval_minutes
        );

        Ok(Self {
            database_url,

            database_max_connections: var("DATABASE_MAX_CONNECTIONS", "5")
                .parse()
                .context("Invalid DATABASE_MAX_CONNECTIONS")?,

            real_debrid_token: secret("RD_API_TOKEN"),

            real_debrid_base_url: var("RD_BASE_URL", "https://api.real-debrid.com/rest/1.0"),

            real_debrid_page_size: var("RD_PAGE_SIZE", "1000")
                .parse()
                .context("Invalid RD_PAGE_SIZE")?,

            radarr_host: var("RADARR_HOST", "http://radarr:7878"),
            radarr_api_key: secret("RADARR_API_KEY"),

            sonarr_host: var("SONARR_HOST", "http://sonarr:8989"),
            sonarr_api_key: secret("SONARR_API_KEY"),

            peer_host: secret("PEER_HOST"),
            peer_api_key: secret("PEER_API_KEY"),

            mirror_only_cached: var("MIRROR_ONLY_CACHED", "false")
                .parse()
                .context("Invalid MIRROR_ONLY_CACHED")?,

            symlink_path: PathBuf::from(var("SYMLINK_PATH", "/symlinks")),

            export_dir: PathBuf::from(var("EXPORT_DIR", "./data")),

            sync_interval_minutes,

            misfire_grace_seconds: var("SCHEDULER_MISFIRE_GRACE_SECONDS", "20")
                .parse()
                .context("Invalid SCHEDULER_MISFIRE_GRACE_SECONDS")?,

            scheduler_poll_seconds: var("SCHEDULER_POLL_SECONDS", "5")
                .parse()
                .context("Invalid SCHEDULER_POLL_SECONDS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = load(&[]).unwrap();

        assert_eq!(config.database_url, "./data/mediasync.db");
        assert_eq!(config.real_debrid_page_size, 1000);
        assert_eq!(config.sync_interval_minutes, 15);
        assert_eq!(config.misfire_grace_seconds, 20);
        assert_eq!(config.symlink_path, PathBuf::from("/symlinks"));
        assert!(config.real_debrid_token.is_none());
    }

    #[test]
    fn database_path_wins_over_url() {
        let config = load(&[
            ("DATABASE_URL", "sqlite:other.db"),
            ("DATABASE_PATH", "/var/lib/mediasync.db"),
            ("RADARR_API_KEY", "  "),
        ])
        .unwrap();

        assert_eq!(config.database_url, "/var/lib/mediasync.db");
        assert!(config.radarr_api_key.is_none());
    }

    #[test]
    fn invalid_number_is_rejected() {
        assert!(load(&[("SYNC_INTERVAL_MINUTES", "soon")]).is_err());
    }

    #[test]
    fn sync_interval_is_bounded() {
        assert!(load(&[("SYNC_INTERVAL_MINUTES", "0")]).is_err());
        assert!(load(&[("SYNC_INTERVAL_MINUTES", "-5")]).is_err());
        assert!(load(&[("SYNC_INTERVAL_MINUTES", "9223372036854775807")]).is_err());

        let config = load(&[("SYNC_INTERVAL_MINUTES", "525600")]).unwrap();
        assert_eq!(config.sync_interval_minutes, MAX_SYNC_INTERVAL_MINUTES);
    }

    #[test]
    fn mirroring_is_off_without_a_peer() {
        let config = load(&[("PEER_API_KEY", "secret")]).unwrap();
        assert!(config.peer_host.is_none());
        assert!(!config.mirror_only_cached);

        let config = load(&[("PEER_HOST", "http://peer:8000"), ("MIRROR_ONLY_CACHED", "true")]).unwrap();
        assert_eq!(config.peer_host.as_deref(), Some("http://peer:8000"));
        assert!(config.mirror_only_cached);
    }
}
