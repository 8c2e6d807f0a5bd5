//! Error types.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a comment-store round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The store process never started, exited, or closed its streams.
    #[error("comment store process is unavailable")]
    ProcessUnavailable,

    /// Too many requests are already queued.
    #[error("comment store is busy ({queued} requests queued)")]
    Busy { queued: usize },

    /// The request was discarded before a response could be delivered.
    #[error("comment store request was dropped")]
    Dropped,

    /// No response arrived within the configured timeout.
    #[error("comment store did not answer within {0} ms")]
    Timeout(u64),

    /// The store answered with a line that doesn't fit the request.
    #[error("unexpected comment store response '{0}'")]
    UnexpectedResponse(String),

    /// The payload can't be carried by the line protocol.
    #[error("payload contains a line break")]
    MultilinePayload,

    /// I/O failure while talking to the process.
    #[error("comment store I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Failures while completing a comment commit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthoringError {
    /// The document changed shape between request and response.
    #[error("document changed before the reference could be spliced in")]
    SpliceStale,

    /// The store round-trip failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures while resolving or provisioning the project workspace.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    /// No workspace folder is open.
    #[error("no workspace is open")]
    WorkspaceUnavailable,

    /// The storage directory target already exists.
    #[error("{} already exists", .0.display())]
    DirectoryConflict(PathBuf),

    /// The storage directory couldn't be created.
    #[error("failed to create {}: {message}", .path.display())]
    CreateDirectory { path: PathBuf, message: String },
}
