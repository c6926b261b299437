//! Error types shared by the reconciler and its collaborators.
//!
//! Per-item errors ([`FetchError`], [`UploadError`]) never abort a run: the
//! reconciler converts them into `Failed` ledger records. Run-level errors
//! ([`SyncError`]) abort before any ledger mutation.

use thiserror::Error;

/// Listing the remote source failed entirely.
#[derive(Debug, Error)]
pub enum SourceListError {
    #[error("source root does not exist: {0}")]
    MissingRoot(String),

    #[error("I/O error while listing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// A single item's content could not be retrieved.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// The RAG platform rejected or failed to accept a request.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Reading or writing the status ledger failed.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("ledger at {path} is malformed: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("ledger serialisation failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Invalid filter configuration.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Run-level failure: the run stopped before planning or executing anything.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("listing source failed: {0}")]
    SourceList(#[from] SourceListError),

    #[error("reading ledger failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("filter configuration invalid: {0}")]
    Filter(#[from] FilterError),
}
