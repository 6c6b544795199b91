//! Error types shared across the guard
//!
//! Each layer reports a typed error so callers can tell expected, recoverable
//! failures (network, malformed download) from internal ones.

use thiserror::Error;

/// Failure talking to the remote ban service
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {endpoint}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("malformed response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },
}

impl RemoteError {
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else {
            RemoteError::Transport {
                endpoint: endpoint.to_string(),
                source: err,
            }
        }
    }

    /// HTTP status code, if the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure building a ban snapshot from a database file
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot open ban database: {0}")]
    Open(#[source] rusqlite::Error),

    #[error("ban database has no `{0}` table")]
    MissingPartition(&'static str),

    #[error("table `{table}` is missing column `{column}`")]
    MissingColumn {
        table: &'static str,
        column: &'static str,
    },

    #[error("failed to read table `{table}`: {source}")]
    Query {
        table: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot read ban database file: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a single sync attempt
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("failed to persist ban database: {0}")]
    Persist(#[from] std::io::Error),

    #[error("internal sync failure: {0}")]
    Internal(String),
}

impl SyncError {
    /// Expected failures are retried on the next tick without alarm
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SyncError::Internal(_))
    }
}
