//! Store error taxonomy.
//!
//! Queries return `DatabaseError` directly; the engine crate maps the
//! row-level variants (`NotFound`, `AlreadyExists`) onto its own conflict
//! taxonomy and lets everything else surface as an internal failure.

use thiserror::Error;

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying SQLx failure (connection, pool, query shape).
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Schema migration failure at startup.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row the caller named by id does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint rejected the write.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },
}

impl DatabaseError {
    /// Map a write error to `AlreadyExists` when a unique constraint fired,
    /// passing anything else through as `Sqlx`.
    ///
    /// Insert paths lean on unique indexes to close write races (duplicate
    /// usernames, follow pairs, like rows), so this is the common tail of
    /// every `INSERT` touching a constrained column.
    pub fn from_unique_violation(error: sqlx::Error, entity: &'static str, id: String) -> Self {
        if let sqlx::Error::Database(ref db_err) = error {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists { entity, id };
            }
        }
        DatabaseError::Sqlx(error)
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
