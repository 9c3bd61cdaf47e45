//! Error types for pkgsync-db.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    #[diagnostic(
        code(pkgsync_db::connection),
        help("Check that the database directory exists and is writable")
    )]
    ConnectionError(String),

    #[error("Database query failed: {0}")]
    #[diagnostic(code(pkgsync_db::query))]
    QueryError(String),

    #[error("Database migration failed: {0}")]
    #[diagnostic(
        code(pkgsync_db::migration),
        help("The database schema may be corrupted. Remove the database file and sync again.")
    )]
    MigrationError(String),

    #[error("Record not found: {0}")]
    #[diagnostic(code(pkgsync_db::not_found))]
    NotFound(String),

    #[error("Database lock poisoned")]
    #[diagnostic(code(pkgsync_db::poison))]
    PoisonError,

    #[error("IO error: {0}")]
    #[diagnostic(
        code(pkgsync_db::io),
        help("Check file permissions and disk space")
    )]
    IoError(#[from] std::io::Error),
}

impl From<diesel::result::Error> for DbError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => DbError::NotFound("Record not found".to_string()),
            diesel::result::Error::DatabaseError(_, info) => {
                DbError::QueryError(info.message().to_string())
            }
            other => DbError::QueryError(other.to_string()),
        }
    }
}

impl From<diesel::result::ConnectionError> for DbError {
    fn from(err: diesel::result::ConnectionError) -> Self {
        DbError::ConnectionError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
