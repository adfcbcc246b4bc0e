//! Persistent metadata types for the regulation library.
//!
//! The library directory holds `metadata.json` (this file's types), one
//! source text per document under `sources/`, and one graph snapshot per
//! document under `graphs/`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Bumped when the metadata schema breaks.
pub const METADATA_VERSION: u32 = 2;

/// Lifecycle state of a library document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Pending,
    Ready,
    Failed,
}

impl DocStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

/// Extraction statistics recorded at ingest time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    pub articles: usize,
    pub definitions: usize,
    pub references: usize,
    pub semantics: usize,
    pub triples: usize,
    pub resolution_rate: f64,
}

/// Where a document's source text came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Path or URL, when known.
    pub origin: Option<String>,
    pub size_bytes: u64,
}

/// One document's metadata entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub id: String,
    pub name: String,
    pub jurisdiction: String,
    pub tags: Vec<String>,
    pub status: DocStatus,
    pub stats: DocumentStats,
    /// Seconds since UNIX epoch.
    pub added_at: u64,
    pub updated_at: u64,
    pub source_info: SourceInfo,
}

/// The versioned `metadata.json` root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub version: u32,
    pub base_uri: String,
    pub documents: Vec<DocumentEntry>,
}

impl LibraryMetadata {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            version: METADATA_VERSION,
            base_uri: base_uri.into(),
            documents: Vec::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&DocumentEntry> {
        self.documents.iter().find(|d| d.id == id)
    }
}

/// Aggregated per-jurisdiction and per-status counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryStats {
    pub documents: usize,
    pub by_jurisdiction: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub total_triples: usize,
}

/// Seconds since the UNIX epoch.
pub fn now_epoch() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
