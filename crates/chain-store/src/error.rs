use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by any [`Database`](crate::Database) backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    /// Advisory lock on the backing file could not be taken.
    #[error("could not lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key, item or table file could not be (de)serialized.
    #[error("store encoding: {0}")]
    Json(#[from] serde_json::Error),

    /// The Redis server rejected a command or could not be reached.
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    /// The SQL engine reported an error.
    #[error("sql: {0}")]
    Sql(#[from] rusqlite::Error),
}
