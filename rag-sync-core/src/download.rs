use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::contract::{ContentFetcher, FetchedContent, RemoteItem, SourceLister};
use crate::error::{FetchError, SourceListError};

/// Selects the type of source to synchronise.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Folder(FolderConfig),
    // Extendable for other source types.
}

impl SourceConfig {
    /// Build the lister/fetcher pair for this source.
    pub fn build(&self) -> FolderSource {
        match self {
            SourceConfig::Folder(folder) => FolderSource::new(folder.clone()),
        }
    }
}

/// Describes a local folder source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FolderConfig {
    pub root: PathBuf,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// Maximum directory depth below `root`; `None` is unbounded.
    #[serde(default)]
    pub max_depth: Option<usize>,
    /// Compute SHA-256 digests at listing time.
    #[serde(default = "default_true")]
    pub hash_contents: bool,
}

fn default_true() -> bool {
    true
}

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &[".git", "target"];

/// Lists and reads files below a local directory.
#[derive(Debug, Clone)]
pub struct FolderSource {
    config: FolderConfig,
}

impl FolderSource {
    pub fn new(config: FolderConfig) -> Self {
        Self { config }
    }

    fn scan(&self) -> Result<Vec<RemoteItem>, SourceListError> {
        let root = &self.config.root;
        if !root.is_dir() {
            error!(path = %root.display(), "Folder source root does not exist");
            return Err(SourceListError::MissingRoot(root.display().to_string()));
        }
        let mut items = Vec::new();
        self.visit_dir(root, 0, &mut items)?;
        items.sort_by(|a, b| a.id.cmp(&b.id));
        info!(path = %root.display(), count = items.len(), "Listed folder source");
        Ok(items)
    }

    fn visit_dir(
        &self,
        dir: &Path,
        depth: usize,
        results: &mut Vec<RemoteItem>,
    ) -> Result<(), SourceListError> {
        let io_err = |source: std::io::Error| SourceListError::Io {
            path: dir.display().to_string(),
            source,
        };
        for entry_res in std::fs::read_dir(dir).map_err(io_err)? {
            let entry = entry_res.map_err(io_err)?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(io_err)?;
            if file_type.is_dir() {
                let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if SKIPPED_DIRS.contains(&dir_name) {
                    debug!(path = %path.display(), "Skipping directory");
                    continue;
                }
                let within_depth = self.config.max_depth.map_or(true, |max| depth < max);
                if self.config.recursive && within_depth {
                    self.visit_dir(&path, depth + 1, results)?;
                }
            } else if file_type.is_file() {
                results.push(self.describe(&path)?);
            }
        }
        Ok(())
    }

    fn describe(&self, path: &Path) -> Result<RemoteItem, SourceListError> {
        let io_err = |source: std::io::Error| SourceListError::Io {
            path: path.display().to_string(),
            source,
        };
        let rel_path = path.strip_prefix(&self.config.root).unwrap_or(path);
        let id = rel_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| id.clone());

        let meta = std::fs::metadata(path).map_err(io_err)?;
        let modified_at: Option<DateTime<Utc>> = meta.modified().ok().map(DateTime::from);
        let content_hash = if self.config.hash_contents {
            Some(file_hash(path).map_err(io_err)?)
        } else {
            None
        };

        let mut metadata = std::collections::BTreeMap::new();
        if let Some(ext) = path.extension() {
            metadata.insert("extension".to_string(), ext.to_string_lossy().into_owned());
        }
        debug!(%id, size = meta.len(), "Discovered file");
        Ok(RemoteItem {
            last_modified: modified_at.map(|t| t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            modified_at,
            path: id.clone(),
            name,
            size: Some(meta.len()),
            content_hash,
            metadata,
            id,
        })
    }
}

#[async_trait]
impl SourceLister for FolderSource {
    fn label(&self) -> String {
        format!("folder:{}", self.config.root.display())
    }

    async fn list(&self) -> Result<Vec<RemoteItem>, SourceListError> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.scan())
            .await
            .map_err(|e| SourceListError::Other(format!("folder scan task failed: {e}")))?
    }
}

#[async_trait]
impl ContentFetcher for FolderSource {
    async fn fetch(&self, item: &RemoteItem) -> Result<FetchedContent, FetchError> {
        let path = self.config.root.join(&item.id);
        let bytes = tokio::fs::read(&path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                FetchError::NotFound(path.display().to_string())
            } else {
                FetchError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;
        debug!(id = %item.id, size = bytes.len(), "Fetched file");
        Ok(FetchedContent {
            file_name: item.name.clone(),
            content_type: content_type_for(&item.name).to_string(),
            bytes,
        })
    }
}

/// SHA-256 hex digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of the file at `path`, streamed so large files are
/// never held in memory.
pub fn file_hash(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// MIME type from the file extension; `application/octet-stream` otherwise.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
