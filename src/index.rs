//! Canonical resource index
//!
//! Per-package metadata index built from a shallow structural peek of each
//! file. The index is a read-through cache invalidated solely by its stored
//! schema version: when it differs from [`INDEX_SCHEMA_VERSION`] the folder
//! is re-scanned, otherwise the persisted index is returned unchanged.

use crate::error::{IndexError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// Current index schema version. Bumped whenever the entry shape or the
/// peeked field set changes; older persisted indexes are rebuilt on read.
pub const INDEX_SCHEMA_VERSION: u32 = 6;

/// Fixed index file name at the cache-entry root.
pub const INDEX_FILE_NAME: &str = ".restore.index.json";

/// Lightweight metadata for one indexed resource file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetadata {
    pub file_name: String,
    /// Path relative to the indexed folder, with `/` separators.
    pub file_path: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fhir_version: Option<String>,
    pub has_snapshot: bool,
    pub has_expansion: bool,
}

/// Schema-versioned canonical index for one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalIndex {
    #[serde(rename = "index-version")]
    pub schema_version: u32,
    pub built_at: DateTime<Utc>,
    pub entries: Vec<ResourceMetadata>,
}

impl CanonicalIndex {
    pub fn is_current(&self) -> bool {
        self.schema_version == INDEX_SCHEMA_VERSION
    }

    /// First entry with the given canonical URL, if any.
    pub fn find_canonical(&self, url: &str) -> Option<&ResourceMetadata> {
        self.entries
            .iter()
            .find(|entry| entry.canonical_url.as_deref() == Some(url))
    }
}

/// Shallow view of a structured document: just the root element name and a
/// fixed set of named scalar children. Implemented once per source format so
/// the indexer stays decoupled from any document-object-model library.
pub trait ShallowNode {
    fn root_name(&self) -> Option<&str>;
    fn child_scalar(&self, name: &str) -> Option<String>;
    fn has_child(&self, name: &str) -> bool;
}

/// Shallow JSON view backed by a parsed top-level object.
pub struct JsonShallowNode {
    value: serde_json::Value,
}

impl JsonShallowNode {
    pub fn parse(content: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(content).ok()?;
        value.is_object().then_some(Self { value })
    }
}

impl ShallowNode for JsonShallowNode {
    fn root_name(&self) -> Option<&str> {
        self.value.get("resourceType")?.as_str()
    }

    fn child_scalar(&self, name: &str) -> Option<String> {
        match self.value.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn has_child(&self, name: &str) -> bool {
        self.value.get(name).is_some()
    }
}

/// Shallow XML view over FHIR-style XML, where scalar children carry a
/// `value` attribute (`<id value="example"/>`). Only depth-one children of
/// the root element are inspected.
pub struct XmlShallowNode {
    root: String,
    children: Vec<(String, Option<String>)>,
}

impl XmlShallowNode {
    pub fn parse(content: &str) -> Option<Self> {
        use quick_xml::Reader;
        use quick_xml::events::Event;

        let mut reader = Reader::from_str(content);
        reader.config_mut().trim_text(true);

        let mut root: Option<String> = None;
        let mut children = Vec::new();
        let mut depth = 0usize;

        loop {
            match reader.read_event().ok()? {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    if depth == 0 {
                        root = Some(name);
                    } else if depth == 1 {
                        let value = Self::value_attribute(&start);
                        children.push((name, value));
                    }
                    depth += 1;
                }
                Event::Empty(start) => {
                    if depth == 1 {
                        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                        let value = Self::value_attribute(&start);
                        children.push((name, value));
                    }
                }
                Event::End(_) => {
                    depth = depth.checked_sub(1)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.map(|root| Self { root, children })
    }

    fn value_attribute(start: &quick_xml::events::BytesStart<'_>) -> Option<String> {
        start
            .attributes()
            .flatten()
            .find(|attr| attr.key.as_ref() == b"value")
            .and_then(|attr| String::from_utf8(attr.value.into_owned()).ok())
    }
}

impl ShallowNode for XmlShallowNode {
    fn root_name(&self) -> Option<&str> {
        Some(&self.root)
    }

    fn child_scalar(&self, name: &str) -> Option<String> {
        self.children
            .iter()
            .find(|(child, _)| child == name)
            .and_then(|(_, value)| value.clone())
    }

    fn has_child(&self, name: &str) -> bool {
        self.children.iter().any(|(child, _)| child == name)
    }
}

/// Builds and persists canonical indexes for package folders.
pub struct CanonicalIndexer;

impl CanonicalIndexer {
    pub fn new() -> Self {
        Self
    }

    /// Returns the persisted index when its schema version is current,
    /// otherwise scans `folder` and persists a fresh index.
    pub async fn build_or_reuse(&self, folder: &Path, recurse: bool) -> Result<CanonicalIndex> {
        let index_path = folder.join(INDEX_FILE_NAME);

        if let Ok(content) = fs::read_to_string(&index_path).await {
            match serde_json::from_str::<CanonicalIndex>(&content) {
                Ok(index) if index.is_current() => {
                    debug!("Reusing canonical index at {}", index_path.display());
                    return Ok(index);
                }
                Ok(index) => {
                    debug!(
                        "Index schema {} is stale (current {}), rebuilding",
                        index.schema_version, INDEX_SCHEMA_VERSION
                    );
                }
                Err(e) => {
                    warn!("Corrupt canonical index at {}: {}", index_path.display(), e);
                }
            }
        }

        let index = self.scan(folder, recurse).await?;
        self.persist(&index, &index_path).await?;
        Ok(index)
    }

    /// Scans `folder` and builds an index without touching any persisted one.
    pub async fn scan(&self, folder: &Path, recurse: bool) -> Result<CanonicalIndex> {
        let mut entries = Vec::new();
        let mut pending = vec![folder.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut dir_entries = fs::read_dir(&dir).await?;
            while let Some(entry) = dir_entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    if recurse {
                        pending.push(path);
                    }
                    continue;
                }
                if path.file_name().and_then(|n| n.to_str()) == Some(INDEX_FILE_NAME) {
                    continue;
                }
                if let Some(metadata) = peek_file(folder, &path).await {
                    entries.push(metadata);
                }
            }
        }

        entries.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        Ok(CanonicalIndex {
            schema_version: INDEX_SCHEMA_VERSION,
            built_at: Utc::now(),
            entries,
        })
    }

    async fn persist(&self, index: &CanonicalIndex, index_path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        let tmp_path = index_path.with_extension("json.tmp");
        fs::write(&tmp_path, &json)
            .await
            .map_err(|e| IndexError::WriteFailed {
                message: format!("Failed to write {}: {e}", tmp_path.display()),
            })?;
        fs::rename(&tmp_path, index_path)
            .await
            .map_err(|e| IndexError::WriteFailed {
                message: format!("Failed to publish {}: {e}", index_path.display()),
            })?;
        debug!(
            "Persisted canonical index with {} entries to {}",
            index.entries.len(),
            index_path.display()
        );
        Ok(())
    }
}

impl Default for CanonicalIndexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Shallow-peeks a single file. Returns `None` for anything that is not
/// recognizable as a structured resource document; a bad file never aborts
/// the index build.
async fn peek_file(folder: &Path, path: &Path) -> Option<ResourceMetadata> {
    let extension = path.extension().and_then(|e| e.to_str())?;
    let content = fs::read_to_string(path).await.ok()?;

    let node: Box<dyn ShallowNode> = match extension {
        "json" => Box::new(JsonShallowNode::parse(&content)?),
        "xml" => Box::new(XmlShallowNode::parse(&content)?),
        _ => return None,
    };

    let resource_type = node.root_name()?.to_string();
    if resource_type.is_empty() {
        return None;
    }

    let relative = path.strip_prefix(folder).ok()?;
    let file_path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    Some(ResourceMetadata {
        file_name: path.file_name()?.to_string_lossy().into_owned(),
        file_path,
        resource_type,
        id: node.child_scalar("id"),
        canonical_url: node.child_scalar("url"),
        version: node.child_scalar("version"),
        kind: node.child_scalar("kind"),
        type_field: node.child_scalar("type"),
        fhir_version: node.child_scalar("fhirVersion"),
        has_snapshot: node.has_child("snapshot"),
        has_expansion: node.has_child("expansion"),
    })
}
