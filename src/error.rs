//! Error types shared by the cache, config and export layers.
//!
//! Remote fetch outcomes are not errors; see `api_client::FetchResult`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cache storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Cache payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by stores that are deliberately unavailable (e.g. a failing test double).
    #[error("Cache unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
