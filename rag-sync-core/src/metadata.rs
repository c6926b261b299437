use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::contract::{DocumentMetadata, RemoteItem};

/// Renaming and enrichment applied to every document's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Key -> new key.
    pub rename: BTreeMap<String, String>,
    /// Static pairs added to every document; they win over item values.
    pub extra: BTreeMap<String, String>,
    /// Keys dropped after renaming.
    pub exclude: Vec<String>,
}

impl MetadataConfig {
    pub fn build(&self, item: &RemoteItem, source_label: &str) -> DocumentMetadata {
        let mut raw: BTreeMap<String, String> = item.metadata.clone();
        raw.insert("source".into(), source_label.to_string());
        raw.insert("source_id".into(), item.id.clone());
        raw.insert("name".into(), item.name.clone());
        raw.insert("path".into(), item.path.clone());
        if let Some(marker) = &item.last_modified {
            raw.insert("last_modified".into(), marker.clone());
        }
        if let Some(hash) = &item.content_hash {
            raw.insert("content_hash".into(), hash.clone());
        }

        let mut out = DocumentMetadata::new();
        for (key, value) in raw {
            let key = self.rename.get(&key).cloned().unwrap_or(key);
            out.insert(key, Value::String(value));
        }
        for (key, value) in &self.extra {
            out.insert(key.clone(), Value::String(value.clone()));
        }
        for key in &self.exclude {
            out.remove(key);
        }
        out
    }
}
