use thiserror::Error;

/// Errors that can occur when interacting with the series store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No series exists under the given name or id.
    ///
    /// Permanent: the numbering engine cannot manufacture a series.
    #[error("Series not found: {0}")]
    SeriesNotFound(String),

    /// A series with this name has already been seeded.
    #[error("Series already exists: {0}")]
    SeriesAlreadyExists(String),

    /// Another document already holds this value in the series.
    #[error("Value {value} already claimed in series {series}")]
    ValueAlreadyClaimed { series: String, value: i64 },

    /// The series counter cannot advance past `i64::MAX`.
    ///
    /// Permanent: no retry will produce another value from this series.
    #[error("Series exhausted: {0}")]
    SeriesExhausted(String),

    /// The backing store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    /// Returns true when retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Protocol(_)
            ),
            StoreError::SeriesNotFound(_)
            | StoreError::SeriesAlreadyExists(_)
            | StoreError::ValueAlreadyClaimed { .. }
            | StoreError::SeriesExhausted(_)
            | StoreError::Migration(_) => false,
        }
    }
}

/// Result type for series store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
