//! Error types for the journaled table store.

use std::io;
use thiserror::Error;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`crate::StorageBackend`].
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of storage.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current storage size.
        size: u64,
    },

    /// Truncation target lies past the current end.
    #[error("cannot truncate to {requested} bytes, storage holds {size}")]
    TruncatePastEnd {
        /// Requested size.
        requested: u64,
        /// Current size.
        size: u64,
    },
}

/// Errors raised by [`crate::Store`] and its transactions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O error outside the backend (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A row or journal payload could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Another process holds the store directory.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The journal holds a record that cannot be applied.
    #[error("journal corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A row passed to the store is not a JSON object.
    #[error("row in table {table} is not a JSON object")]
    NotAnObject {
        /// The target table.
        table: String,
    },

    /// A failed journal write could not be undone; reopen the store.
    #[error("store poisoned: a failed write could not be rolled back")]
    Poisoned,

    /// The caller aborted the transaction.
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Reason for the abort.
        reason: String,
    },
}

impl StoreError {
    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an abort error, used by transaction closures to roll back.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }
}
