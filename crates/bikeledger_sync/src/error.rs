//! Error types for the sync engine.

use bikeledger_model::ModelError;
use bikeledger_store::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// A failure confined to one remote file.
#[derive(Debug)]
pub struct FileFailure {
    /// Remote file name.
    pub file: &'static str,
    /// What went wrong.
    pub error: SyncError,
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The credential was rejected (HTTP 401).
    #[error("invalid credential: {0}")]
    Auth(String),

    /// The credential lacks access to the repository (HTTP 403).
    #[error("permission denied: {0}")]
    Permission(String),

    /// The version token sent with a push is stale.
    #[error("version conflict on {file}")]
    Conflict {
        /// Remote file name.
        file: String,
    },

    /// DNS, connect, TLS or timeout failure.
    #[error("network error: {0}")]
    Network(String),

    /// Remote content could not be decoded.
    #[error("cannot parse {file}: {message}")]
    Parse {
        /// Remote file name.
        file: String,
        /// Decoder message.
        message: String,
    },

    /// The local commit failed; nothing was written.
    #[error("local transaction failed: {0}")]
    LocalTransaction(#[from] StoreError),

    /// Local data could not be converted.
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Any other non-success HTTP status.
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// API message, if any.
        message: String,
    },

    /// No remote location or no credential.
    #[error("sync is not configured")]
    NotConfigured,

    /// A manual sync was requested while a cycle runs.
    #[error("a sync is already in progress")]
    AlreadySyncing,

    /// The network is known to be down.
    #[error("offline")]
    Offline,

    /// The scheduler task is gone.
    #[error("sync scheduler has stopped")]
    Stopped,

    /// Some files failed; the others synced.
    #[error("{} file(s) failed to sync: {}", .failures.len(), summarize(.failures))]
    Partial {
        /// One entry per failed file.
        failures: Vec<FileFailure>,
    },
}

fn summarize(failures: &[FileFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.file, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

impl SyncError {
    /// Creates a parse error.
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Returns true if scheduling another cycle may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network(_) | SyncError::Offline | SyncError::Conflict { .. } => true,
            SyncError::Server { status, .. } => *status >= 500 || *status == 429,
            SyncError::Partial { failures } => {
                !self.is_fatal() && failures.iter().any(|f| f.error.is_retryable())
            }
            _ => false,
        }
    }

    /// Returns true if no retry should happen until the credential changes,
    /// or the local store is unusable.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Auth(_) | SyncError::Permission(_) | SyncError::LocalTransaction(_) => true,
            SyncError::Partial { failures } => failures.iter().any(|f| f.error.is_fatal()),
            _ => false,
        }
    }

    /// Returns true for credential problems.
    pub fn is_auth(&self) -> bool {
        match self {
            SyncError::Auth(_) | SyncError::Permission(_) => true,
            SyncError::Partial { failures } => failures.iter().any(|f| f.error.is_auth()),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(SyncError::Network("reset".into()).is_retryable());
        assert!(SyncError::Conflict { file: "parts.json".into() }.is_retryable());
        assert!(SyncError::Server { status: 502, message: String::new() }.is_retryable());
        assert!(!SyncError::Server { status: 400, message: String::new() }.is_retryable());
        assert!(!SyncError::Auth("bad".into()).is_retryable());
        assert!(SyncError::Permission("scope".into()).is_fatal());
        assert!(!SyncError::NotConfigured.is_retryable());
    }

    #[test]
    fn partial_takes_the_worst_member() {
        let soft = SyncError::Partial {
            failures: vec![FileFailure {
                file: "parts.json",
                error: SyncError::Network("timeout".into()),
            }],
        };
        assert!(soft.is_retryable());
        assert!(!soft.is_fatal());

        let hard = SyncError::Partial {
            failures: vec![
                FileFailure {
                    file: "parts.json",
                    error: SyncError::Network("timeout".into()),
                },
                FileFailure {
                    file: "cash_log.json",
                    error: SyncError::Auth("revoked".into()),
                },
            ],
        };
        assert!(hard.is_fatal());
        assert!(hard.is_auth());
        assert!(!hard.is_retryable());
        assert!(hard.to_string().contains("cash_log.json"));
    }
}
