use thiserror::Error;

use crate::object::ObjectKind;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage corruption in {table}/{meta_key}: {message}")]
    Corruption {
        table: String,
        meta_key: String,
        message: String,
    },

    #[error("Transaction error: {message}")]
    Transaction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

// ---------------------------------------------------------------------------
// BatchOperation
// ---------------------------------------------------------------------------

/// The write statement a batch failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOperation {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchOperation::Insert => "insert",
            BatchOperation::Update => "update",
            BatchOperation::Delete => "delete",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// RepeaterError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RepeaterError {
    #[error("Invalid object id \"{0}\"")]
    InvalidObjectId(String),

    #[error("No meta table configured for {0} objects")]
    UnknownDestination(ObjectKind),

    #[error("Invalid value for field \"{path}\": {reason}")]
    InvalidValue { path: String, reason: String },

    #[error(
        "Batch {operation} affected {affected} of {submitted} rows; the batch was rolled back"
    )]
    PartialBatchFailure {
        operation: BatchOperation,
        submitted: usize,
        affected: usize,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for RepeaterError {
    fn from(e: rusqlite::Error) -> Self {
        RepeaterError::Storage(StorageError::Sqlite(e))
    }
}

/// Convenience alias: the default error type is `RepeaterError`.
pub type Result<T, E = RepeaterError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
