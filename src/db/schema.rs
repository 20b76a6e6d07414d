//! Schema sync: create the reconciliation tables on startup
//!
//! Tables are created when missing and indexes are created with
//! `IF NOT EXISTS`, so running this against an existing database is a no-op.
//! Column renames or type changes are not handled (requires a DB wipe).

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// A table definition: name, CREATE statement, and its secondary indexes
struct TableDef {
    name: &'static str,
    create_sql: &'static str,
    indexes: &'static [&'static str],
}

/// Tables in foreign-key dependency order
const TABLES: &[TableDef] = &[
    TableDef {
        name: "torrents",
        create_sql: r#"
            CREATE TABLE torrents (
                id TEXT PRIMARY KEY NOT NULL,
                hash TEXT NOT NULL UNIQUE,
                filename TEXT NOT NULL,
                added_at TEXT NOT NULL
            )
        "#,
        indexes: &[],
    },
    TableDef {
        name: "symlinks",
        create_sql: r#"
            CREATE TABLE symlinks (
                id TEXT PRIMARY KEY NOT NULL,
                target_path TEXT NOT NULL,
                target_filename TEXT NOT NULL,
                destination_path TEXT NOT NULL UNIQUE,
                destination_filename TEXT NOT NULL,
                added_at TEXT NOT NULL
            )
        "#,
        indexes: &[
            "CREATE INDEX IF NOT EXISTS idx_symlinks_target_path ON symlinks(target_path)",
            "CREATE INDEX IF NOT EXISTS idx_symlinks_destination_filename ON symlinks(destination_filename)",
        ],
    },
    TableDef {
        name: "external_movies",
        create_sql: r#"
            CREATE TABLE external_movies (
                id TEXT PRIMARY KEY NOT NULL,
                added_at TEXT NOT NULL,
                media_type TEXT NOT NULL DEFAULT 'movie',
                provider_movie_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                original_title TEXT,
                year INTEGER,
                release_group TEXT,
                imdb_id TEXT,
                tmdb_id INTEGER,
                genres TEXT NOT NULL DEFAULT '[]',
                quality TEXT,
                resolution INTEGER,
                languages TEXT NOT NULL DEFAULT '[]',
                original_file_path TEXT,
                relative_path TEXT,
                source_path TEXT NOT NULL,
                provider_file_id INTEGER NOT NULL UNIQUE,
                symlink_id TEXT REFERENCES symlinks(id)
            )
        "#,
        indexes: &[
            "CREATE INDEX IF NOT EXISTS idx_external_movies_source_path ON external_movies(source_path)",
        ],
    },
    TableDef {
        name: "external_episodes",
        create_sql: r#"
            CREATE TABLE external_episodes (
                id TEXT PRIMARY KEY NOT NULL,
                added_at TEXT NOT NULL,
                media_type TEXT NOT NULL DEFAULT 'series',
                provider_series_id INTEGER NOT NULL,
                series_title TEXT NOT NULL,
                year INTEGER,
                season_number INTEGER NOT NULL,
                episode_number INTEGER,
                episode_title TEXT,
                release_group TEXT,
                tvdb_id INTEGER,
                imdb_id TEXT,
                tvmaze_id INTEGER,
                genres TEXT NOT NULL DEFAULT '[]',
                quality TEXT,
                resolution INTEGER,
                languages TEXT NOT NULL DEFAULT '[]',
                relative_path TEXT,
                source_path TEXT NOT NULL,
                provider_file_id INTEGER NOT NULL UNIQUE,
                provider_episode_id INTEGER,
                symlink_id TEXT REFERENCES symlinks(id)
            )
        "#,
        indexes: &[
            "CREATE INDEX IF NOT EXISTS idx_external_episodes_source_path ON external_episodes(source_path)",
        ],
    },
    TableDef {
        name: "torrent_files",
        create_sql: r#"
            CREATE TABLE torrent_files (
                id TEXT PRIMARY KEY NOT NULL,
                path TEXT NOT NULL,
                bytes INTEGER NOT NULL,
                added_at TEXT NOT NULL,
                torrent_id TEXT REFERENCES torrents(id),
                symlink_id TEXT REFERENCES symlinks(id),
                movie_id TEXT REFERENCES external_movies(id),
                episode_id TEXT REFERENCES external_episodes(id),
                CHECK (movie_id IS NULL OR episode_id IS NULL)
            )
        "#,
        indexes: &[
            "CREATE INDEX IF NOT EXISTS idx_torrent_files_torrent_id ON torrent_files(torrent_id)",
            "CREATE INDEX IF NOT EXISTS idx_torrent_files_symlink_id ON torrent_files(symlink_id)",
        ],
    },
    TableDef {
        name: "scheduled_jobs",
        create_sql: r#"
            CREATE TABLE scheduled_jobs (
                name TEXT PRIMARY KEY NOT NULL,
                interval_minutes INTEGER NOT NULL,
                misfire_grace_seconds INTEGER NOT NULL,
                next_run_at TEXT NOT NULL,
                last_run_at TEXT,
                lease_until TEXT,
                created_at TEXT NOT NULL
            )
        "#,
        indexes: &[],
    },
];

/// Entity tables cleared by a maintenance reset, children first
pub const ENTITY_TABLES: &[&str] = &[
    "torrent_files",
    "external_movies",
    "external_episodes",
    "symlinks",
    "torrents",
];

/// Result of a schema sync operation
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    pub errors: Vec<String>,
}

/// Check if a table exists in the database
async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool, sqlx::Error> {
    let result: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name = ?")
            .bind(table_name)
            .fetch_optional(pool)
            .await?;

    Ok(result.is_some())
}

/// Create every missing table and index
pub async fn sync_schema(pool: &SqlitePool) -> Result<SchemaSyncResult, sqlx::Error> {
    let mut result = SchemaSyncResult::default();

    for table in TABLES {
        if !table_exists(pool, table.name).await? {
            debug!(table = table.name, "Creating table");
            match sqlx::query(table.create_sql).execute(pool).await {
                Ok(_) => {
                    info!(table = table.name, "Created table");
                    result.tables_created.push(table.name.to_string());
                }
                Err(e) => {
                    let msg = format!("Failed to create table {}: {}", table.name, e);
                    warn!("{}", msg);
                    result.errors.push(msg);
                    continue;
                }
            }
        }

        for index_sql in table.indexes {
            if let Err(e) = sqlx::query(index_sql).execute(pool).await {
                let msg = format!("Failed to create index on {}: {}", table.name, e);
                warn!("{}", msg);
                result.errors.push(msg);
            }
        }
    }

    Ok(result)
}
