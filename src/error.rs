//! Error type shared by every layer of the store.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors that can occur while defining schemas, encoding rows or touching
/// the files of a database directory.
#[derive(Debug, Error)]
pub enum DbError {
    /// Invalid type token, empty schema, unparametrized text, a value failing
    /// validation or a row referencing an unknown column.
    #[error("schema error: {0}")]
    Schema(String),

    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    #[error("database directory not found: {}", .0.display())]
    DatabaseNotFound(PathBuf),

    #[error("table '{0}' already exists")]
    TableExists(String),

    #[error("database directory already exists: {}", .0.display())]
    DatabaseExists(PathBuf),

    /// On-disk state does not match what the catalog says it should be.
    #[error("corruption: {0}")]
    Corruption(String),

    #[error("row index {index} out of range for table of {rows} rows")]
    OutOfRange { index: i64, rows: u64 },

    /// The advisory lock on a table was not released within the timeout.
    #[error("table file {} is busy, gave up after {waited:?}", .path.display())]
    Busy { path: PathBuf, waited: Duration },

    /// A row block does not have the size its codec expects.
    #[error("cannot decode row: expected {expected} bytes, got {actual}")]
    Decode { expected: usize, actual: usize },

    /// The final rename of a table rewrite failed. The table may hold either
    /// the old or the new content and has to be checked by the caller.
    #[error("rewrite of {} did not complete, table state is unknown: {source}", .path.display())]
    RewriteIncomplete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Returns true for an unknown table or database directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound(_) | Self::DatabaseNotFound(_))
    }

    /// Returns true when something with the same name already exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::TableExists(_) | Self::DatabaseExists(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(DbError::TableNotFound("t".into()).is_not_found());
        assert!(DbError::DatabaseNotFound("/tmp/x".into()).is_not_found());
        assert!(!DbError::TableExists("t".into()).is_not_found());

        assert!(DbError::TableExists("t".into()).is_conflict());
        assert!(DbError::DatabaseExists("/tmp/x".into()).is_conflict());
        assert!(!DbError::schema("bad").is_conflict());
    }

    #[test]
    fn test_display() {
        let err = DbError::OutOfRange { index: 7, rows: 3 };
        assert_eq!(
            err.to_string(),
            "row index 7 out of range for table of 3 rows"
        );

        let err = DbError::Decode {
            expected: 10,
            actual: 4,
        };
        assert!(err.to_string().contains("expected 10 bytes"));
    }

    #[test]
    fn test_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: DbError = io_err.into();
        assert!(matches!(err, DbError::Io(_)));
    }
}
