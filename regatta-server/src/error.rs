//! Server Error Types
//!
//! One error type flows through the repository and service layers. Only
//! `Race` is ever handled internally (the transaction runner retries it);
//! every other kind propagates unchanged to the API boundary.

use thiserror::Error;

/// Result type alias for store and service operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing caller data. Never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The operation targets an entity that does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A uniqueness violation that persists after race resolution.
    #[error("{0}")]
    Conflict(String),

    /// Transient store-level write conflict. Consumed by the transaction
    /// runner's retry loop; callers never see it directly.
    #[error("write conflict: {0}")]
    Race(sqlx::Error),

    /// Retry budget exhausted. The request left no partial writes and can
    /// be retried by the caller.
    #[error("transaction failed after {attempts} attempts, please retry")]
    Unavailable { attempts: u32 },

    /// Any other store failure.
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl Error {
    pub fn is_race(&self) -> bool {
        matches!(self, Error::Race(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        if is_write_conflict(&err) {
            Error::Race(err)
        } else {
            Error::Database(err)
        }
    }
}

/// SQLite reports lock contention as the BUSY/LOCKED family, distinct from
/// constraint violations and from validation failures. Those are the only
/// errors the transaction runner may retry.
fn is_write_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(
                db_err.code().as_deref(),
                Some("5" | "6" | "261" | "262" | "517")
            ) || db_err.message().contains("database is locked")
                || db_err.message().contains("database table is locked")
        }
        _ => false,
    }
}

/// True for the store's uniqueness-constraint violation. The repository
/// create paths classify this into `Conflict` or `Race` by re-checking
/// existence inside the still-open transaction.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("1555" | "2067"))
                || db_err.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}
