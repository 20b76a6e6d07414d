//! Error taxonomy for the reconciliation core
//!
//! Store and provider operations return [`SyncError`] values; the job
//! boundaries decide whether an error skips one item, one sub-pass, or the
//! whole run, and log it exactly once.

use std::path::PathBuf;

use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network or API failure reaching an external provider, or a provider
    /// that was never configured.
    #[error("{provider} unavailable: {message}")]
    ProviderUnavailable {
        provider: &'static str,
        message: String,
    },

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} with key '{key}' already exists")]
    DuplicateKey { entity: &'static str, key: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("job '{0}' is already running")]
    AlreadyRunning(&'static str),
}

impl SyncError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an insert failure, turning unique-constraint violations into
    /// [`SyncError::DuplicateKey`].
    pub fn from_insert(err: sqlx::Error, entity: &'static str, key: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Self::DuplicateKey {
                entity,
                key: key.to_string(),
            },
            _ => Self::Database(err),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
