use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database query failed: {0}")]
    QueryError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("An error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A stored row could not be mapped back onto a domain type.
    #[error("Stored row is invalid: {0}")]
    CorruptRow(#[from] CoreError),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("The requested data was not found in the database.")]
    NotFound,
}

impl DbError {
    /// True for failures that may succeed if the same operation is retried later.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::QueryError(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::WorkerCrashed
            ),
            DbError::Unavailable(_) => true,
            _ => false,
        }
    }
}
