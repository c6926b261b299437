#![allow(unused)]

//! # contract: data model and collaborator interfaces for the reconciler
//!
//! The reconciler depends only on the traits in this module. Concrete sources,
//! uploaders and ledger stores live elsewhere (the local folder source and the
//! ledger stores in this crate, the HTTP uploader in the CLI crate) and tests
//! substitute the `mockall` mocks generated here.
//!
//! ## Interfaces
//! - [`SourceLister`]: enumerate the remote items of one source.
//! - [`ContentFetcher`]: download one item's bytes.
//! - [`Uploader`]: upload bytes plus metadata to the RAG profile, delete by id.
//! - [`LedgerStore`]: durable per-item sync status.
//!
//! ## Mocking & Testing
//! All traits are annotated for `mockall`; the mocks are exported with the
//! `test-export-mocks` feature so integration tests and the CLI crate can use them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, LedgerError, SourceListError, UploadError};

/// Key/value metadata sent alongside an uploaded document.
pub type DocumentMetadata = serde_json::Map<String, serde_json::Value>;

/// One discoverable unit at the source, as produced by a [`SourceLister`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Stable identifier, unique within the source.
    pub id: String,
    /// Opaque version marker (timestamp, etag, revision). Absent when the
    /// source provides no versioning signal.
    pub last_modified: Option<String>,
    /// Typed modification time, used for date filtering only.
    pub modified_at: Option<DateTime<Utc>>,
    /// Human-readable location.
    pub path: String,
    /// File name, used for extension filtering and as the uploaded file name.
    pub name: String,
    pub size: Option<u64>,
    /// SHA-256 hex digest of the content, when the source can provide it.
    pub content_hash: Option<String>,
    /// Source-provided metadata, passed through the metadata mapping.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl RemoteItem {
    pub fn new(id: impl Into<String>, last_modified: Option<&str>) -> Self {
        let id = id.into();
        let name = id.rsplit('/').next().unwrap_or(&id).to_string();
        RemoteItem {
            path: id.clone(),
            name,
            id,
            last_modified: last_modified.map(str::to_owned),
            ..Default::default()
        }
    }

    /// Lower-cased extension of [`RemoteItem::name`], without the dot.
    pub fn extension(&self) -> Option<String> {
        let (stem, ext) = self.name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

/// Lifecycle state of a [`SyncRecord`].
///
/// Serialised by variant name; parsed ignoring ASCII case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum SyncStatus {
    Unknown,
    Starting,
    Pending,
    Success,
    Failed,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::Unknown,
        SyncStatus::Starting,
        SyncStatus::Pending,
        SyncStatus::Success,
        SyncStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Unknown => "Unknown",
            SyncStatus::Starting => "Starting",
            SyncStatus::Pending => "Pending",
            SyncStatus::Success => "Success",
            SyncStatus::Failed => "Failed",
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown sync status {s:?}"))
    }
}

impl<'de> Deserialize<'de> for SyncStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Persisted sync state for one item across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub id: String,
    pub status: SyncStatus,
    /// `last_modified` observed at the last successful sync.
    #[serde(default)]
    pub last_synced_marker: Option<String>,
    /// SHA-256 of the bytes last uploaded successfully.
    #[serde(default)]
    pub content_hash: Option<String>,
    /// Id assigned by the uploader on success.
    #[serde(default)]
    pub remote_document_id: Option<String>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SyncRecord {
    /// Fresh `Unknown` record for an id seen for the first time.
    pub fn unknown(item: &RemoteItem) -> Self {
        SyncRecord {
            id: item.id.clone(),
            status: SyncStatus::Unknown,
            last_synced_marker: None,
            content_hash: None,
            remote_document_id: None,
            attempt_count: 0,
            last_error: None,
            name: Some(item.name.clone()),
            updated_at: Some(Utc::now()),
        }
    }

    /// `Success` records must carry the document id the uploader assigned.
    pub fn is_corrupt(&self) -> bool {
        self.status == SyncStatus::Success && self.remote_document_id.is_none()
    }
}

/// Bytes of one fetched item, ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContent {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Request for a single document upload.
pub struct NewDocument<'a> {
    /// File name reported to the platform.
    pub file_name: &'a str,
    pub content_type: &'a str,
    pub content: &'a [u8],
    pub metadata: &'a DocumentMetadata,
}

/// Platform response for an accepted upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub document_id: String,
    /// Index status reported by the platform at upload time, if any.
    pub index_status: Option<String>,
}

/// Enumerates the items of one configured source.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SourceLister: Send + Sync {
    /// Short label used in logs and as the `source` metadata value.
    fn label(&self) -> String;

    /// List every item currently present at the source. A fresh call re-lists
    /// from scratch.
    async fn list(&self) -> Result<Vec<RemoteItem>, SourceListError>;
}

/// Downloads an item's content given its descriptor.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, item: &RemoteItem) -> Result<FetchedContent, FetchError>;
}

/// Uploads documents to, and deletes documents from, the RAG profile.
///
/// The implementor owns transport, authentication and response decoding. The
/// reconciler treats an `Ok` as confirmation that the platform accepted the
/// request.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Upload one document; returns the id the platform assigned to it.
    async fn upload<'a>(&self, doc: NewDocument<'a>) -> Result<UploadedDocument, UploadError>;

    /// Delete a previously uploaded document.
    async fn delete(&self, document_id: &str) -> Result<(), UploadError>;

    /// Confirm the target profile exists and the credentials are accepted,
    /// before any item is touched.
    async fn check_profile(&self) -> Result<(), UploadError>;
}

/// Durable per-item sync status.
///
/// `put`, `put_many` and `delete` must be durable before they return: the
/// reconciler only counts an item as uploaded once its `Success` record has
/// been written. Implementations must tolerate concurrent calls for different
/// ids.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<SyncRecord>, LedgerError>;

    async fn put(&self, record: SyncRecord) -> Result<(), LedgerError>;

    /// Write several records as one durable update; all or none are applied.
    async fn put_many(&self, records: Vec<SyncRecord>) -> Result<(), LedgerError>;

    async fn list(&self) -> Result<Vec<SyncRecord>, LedgerError>;

    async fn delete(&self, id: &str) -> Result<(), LedgerError>;
}
