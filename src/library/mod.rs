//! On-disk store of ingested regulations.
//!
//! Layout: `metadata.json` + `sources/<id>.txt` + `graphs/<id>.json`. Every
//! mutating operation serialises through one in-process lock and writes
//! metadata atomically (temp file + rename). A failed add removes its
//! partially written per-document files; the library never holds a document
//! whose source and graph disagree.

pub mod model;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::LibraryError;
use crate::graph::TripleStore;
use crate::model::DocumentType;
use crate::patterns::PatternRegistry;
use crate::session::{self, IngestOptions, IngestReport};

pub use model::{
    DocStatus, DocumentEntry, DocumentStats, LibraryMetadata, LibraryStats, SourceInfo,
    now_epoch,
};

/// Result type for library operations.
pub type LibraryResult<T> = std::result::Result<T, LibraryError>;

const METADATA_FILE: &str = "metadata.json";
const SOURCES_DIR: &str = "sources";
const GRAPHS_DIR: &str = "graphs";

/// Options for [`Library::add_document`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub name: Option<String>,
    pub jurisdiction: Option<String>,
    pub tags: Vec<String>,
    /// Replace an existing document with the same ID.
    pub force: bool,
    pub doc_type: Option<DocumentType>,
    pub eli: bool,
    /// Recorded origin (path or URL) for provenance.
    pub origin: Option<String>,
}

/// A library rooted at one directory.
pub struct Library {
    root: PathBuf,
    lock: Mutex<()>,
}

impl Library {
    /// Create the layout idempotently and open it.
    pub fn init(path: &Path, base_uri: &str) -> LibraryResult<Self> {
        std::fs::create_dir_all(path.join(SOURCES_DIR))
            .map_err(|e| LibraryError::Io { source: e })?;
        std::fs::create_dir_all(path.join(GRAPHS_DIR))
            .map_err(|e| LibraryError::Io { source: e })?;

        let library = Self {
            root: path.to_path_buf(),
            lock: Mutex::new(()),
        };
        if !library.metadata_path().exists() {
            library.write_metadata(&LibraryMetadata::new(base_uri))?;
        }
        tracing::info!(root = %path.display(), "library initialised");
        Ok(library)
    }

    /// Open an existing library.
    pub fn open(path: &Path) -> LibraryResult<Self> {
        let library = Self {
            root: path.to_path_buf(),
            lock: Mutex::new(()),
        };
        if !library.metadata_path().exists() {
            return Err(LibraryError::NotInitialized {
                path: path.display().to_string(),
            });
        }
        Ok(library)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    fn source_path(&self, id: &str) -> PathBuf {
        self.root.join(SOURCES_DIR).join(format!("{id}.txt"))
    }

    fn graph_path(&self, id: &str) -> PathBuf {
        self.root.join(GRAPHS_DIR).join(format!("{id}.json"))
    }

    /// Read metadata.json.
    pub fn metadata(&self) -> LibraryResult<LibraryMetadata> {
        let text = std::fs::read_to_string(self.metadata_path()).map_err(|e| {
            LibraryError::MetadataIo {
                message: format!("read {}: {e}", self.metadata_path().display()),
            }
        })?;
        serde_json::from_str(&text).map_err(|e| LibraryError::MetadataIo {
            message: format!("parse {}: {e}", self.metadata_path().display()),
        })
    }

    fn write_metadata(&self, metadata: &LibraryMetadata) -> LibraryResult<()> {
        let json = serde_json::to_string_pretty(metadata).map_err(|e| {
            LibraryError::MetadataIo {
                message: format!("serialise metadata: {e}"),
            }
        })?;
        let tmp = self.root.join(".metadata.json.tmp");
        std::fs::write(&tmp, json).map_err(|e| LibraryError::MetadataIo {
            message: format!("write {}: {e}", tmp.display()),
        })?;
        std::fs::rename(&tmp, self.metadata_path()).map_err(|e| LibraryError::MetadataIo {
            message: format!("rename into place: {e}"),
        })?;
        Ok(())
    }

    /// Ingest a document into the library: write source, run the pipeline,
    /// write the graph snapshot, update metadata. Partial files are removed
    /// on failure.
    pub fn add_document(
        &self,
        id: &str,
        source_text: &str,
        options: &AddOptions,
        registry: &PatternRegistry,
    ) -> LibraryResult<IngestReport> {
        let _guard = self.lock.lock().expect("library lock poisoned");
        let mut metadata = self.metadata()?;

        if metadata.get(id).is_some() {
            if options.force {
                self.remove_files(id);
                metadata.documents.retain(|d| d.id != id);
            } else {
                return Err(LibraryError::Duplicate { id: id.into() });
            }
        }

        let cleanup = |library: &Self| {
            library.remove_files(id);
        };

        std::fs::write(self.source_path(id), source_text)
            .map_err(|e| LibraryError::Io { source: e })?;

        let ingest_options = IngestOptions {
            doc_id: id.to_string(),
            doc_type: options.doc_type,
            eli: options.eli,
        };
        let ingested =
            match session::ingest_text(source_text, registry, &metadata.base_uri, &ingest_options)
            {
                Ok(i) => i,
                Err(e) => {
                    cleanup(self);
                    return Err(LibraryError::IngestFailed {
                        id: id.into(),
                        message: e.to_string(),
                    });
                }
            };

        let snapshot = match ingested.store.to_snapshot() {
            Ok(s) => s,
            Err(e) => {
                cleanup(self);
                return Err(e.into());
            }
        };
        if let Err(e) = std::fs::write(self.graph_path(id), snapshot) {
            cleanup(self);
            return Err(LibraryError::Io { source: e });
        }

        let now = now_epoch();
        metadata.documents.push(DocumentEntry {
            id: id.to_string(),
            name: options.name.clone().unwrap_or_else(|| id.to_string()),
            jurisdiction: options
                .jurisdiction
                .clone()
                .unwrap_or_else(|| "unknown".into()),
            tags: options.tags.clone(),
            status: DocStatus::Ready,
            stats: DocumentStats {
                articles: ingested.report.articles,
                definitions: ingested.report.definitions,
                references: ingested.report.references,
                semantics: ingested.report.semantics,
                triples: ingested.report.counts.triples,
                resolution_rate: ingested.report.resolution.rate,
            },
            added_at: now,
            updated_at: now,
            source_info: SourceInfo {
                origin: options.origin.clone(),
                size_bytes: source_text.len() as u64,
            },
        });
        if let Err(e) = self.write_metadata(&metadata) {
            cleanup(self);
            return Err(e);
        }

        Ok(ingested.report)
    }

    /// Record a failed ingest attempt (used by bulk ingest) without files.
    pub fn record_failure(&self, id: &str, origin: Option<String>) -> LibraryResult<()> {
        let _guard = self.lock.lock().expect("library lock poisoned");
        let mut metadata = self.metadata()?;
        metadata.documents.retain(|d| d.id != id);
        let now = now_epoch();
        metadata.documents.push(DocumentEntry {
            id: id.to_string(),
            name: id.to_string(),
            jurisdiction: "unknown".into(),
            tags: Vec::new(),
            status: DocStatus::Failed,
            stats: DocumentStats::default(),
            added_at: now,
            updated_at: now,
            source_info: SourceInfo {
                origin,
                size_bytes: 0,
            },
        });
        self.write_metadata(&metadata)
    }

    fn remove_files(&self, id: &str) {
        let _ = std::fs::remove_file(self.source_path(id));
        let _ = std::fs::remove_file(self.graph_path(id));
    }

    /// Delete a document's files and metadata entry.
    pub fn remove_document(&self, id: &str) -> LibraryResult<()> {
        let _guard = self.lock.lock().expect("library lock poisoned");
        let mut metadata = self.metadata()?;
        if metadata.get(id).is_none() {
            return Err(LibraryError::DocumentNotFound { id: id.into() });
        }
        metadata.documents.retain(|d| d.id != id);
        self.write_metadata(&metadata)?;
        self.remove_files(id);
        Ok(())
    }

    /// Load one document's source text.
    pub fn load_source(&self, id: &str) -> LibraryResult<String> {
        self.require(id)?;
        std::fs::read_to_string(self.source_path(id)).map_err(|e| LibraryError::Io { source: e })
    }

    /// Rebuild one document's triple store from its snapshot.
    pub fn load_triple_store(&self, id: &str) -> LibraryResult<TripleStore> {
        self.require(id)?;
        let json = std::fs::read_to_string(self.graph_path(id))
            .map_err(|e| LibraryError::Io { source: e })?;
        Ok(TripleStore::from_snapshot(&json)?)
    }

    /// Merge the named documents' stores into one transient store.
    pub fn load_merged_triple_store(&self, ids: &[&str]) -> LibraryResult<TripleStore> {
        let mut merged = TripleStore::new();
        for id in ids {
            let store = self.load_triple_store(id)?;
            merged.merge(&store);
        }
        Ok(merged)
    }

    /// Merge every ready document's store.
    pub fn load_all_triple_stores(&self) -> LibraryResult<TripleStore> {
        let metadata = self.metadata()?;
        let ids: Vec<&str> = metadata
            .documents
            .iter()
            .filter(|d| d.status == DocStatus::Ready)
            .map(|d| d.id.as_str())
            .collect();
        self.load_merged_triple_store(&ids)
    }

    /// All metadata entries.
    pub fn list(&self) -> LibraryResult<Vec<DocumentEntry>> {
        Ok(self.metadata()?.documents)
    }

    /// Per-jurisdiction and per-status aggregates.
    pub fn stats(&self) -> LibraryResult<LibraryStats> {
        let metadata = self.metadata()?;
        let mut stats = LibraryStats {
            documents: metadata.documents.len(),
            ..Default::default()
        };
        for doc in &metadata.documents {
            *stats
                .by_jurisdiction
                .entry(doc.jurisdiction.clone())
                .or_default() += 1;
            *stats
                .by_status
                .entry(doc.status.as_str().to_string())
                .or_default() += 1;
            stats.total_triples += doc.stats.triples;
        }
        Ok(stats)
    }

    fn require(&self, id: &str) -> LibraryResult<()> {
        if self.metadata()?.get(id).is_none() {
            return Err(LibraryError::DocumentNotFound { id: id.into() });
        }
        Ok(())
    }

    /// Ingest the bundled starter excerpts. Existing IDs are left alone.
    /// Returns the number of documents actually added.
    pub fn seed(&self, registry: &PatternRegistry) -> LibraryResult<usize> {
        let mut added = 0;
        for (id, jurisdiction, text) in SEED_DOCS {
            let options = AddOptions {
                jurisdiction: Some((*jurisdiction).to_string()),
                tags: vec!["seed".into()],
                origin: Some("bundled".into()),
                ..Default::default()
            };
            match self.add_document(id, text, &options, registry) {
                Ok(_) => added += 1,
                Err(LibraryError::Duplicate { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }
}

/// Small starter excerpts so a fresh library has something to query.
const SEED_DOCS: &[(&str, &str, &str)] = &[
    (
        "gdpr-excerpt",
        "EU",
        "\
CHAPTER I
General provisions
Article 4
Definitions
(1) 'personal data' means any information relating to an identified or identifiable natural person;
(2) 'controller' means the body which determines the purposes and means of the processing;

CHAPTER III
Rights of the data subject
Article 15
Right of access by the data subject
1. The data subject shall have the right of access to personal data, in accordance with Article 4.
Article 17
Right to erasure
1. The data subject shall have the right to obtain from the controller the erasure of personal data. See Article 15.
",
    ),
    (
        "ccpa-excerpt",
        "US-CA",
        "\
Article 2
Definitions
(1) 'personal information' means information that identifies a consumer;
Article 5
Right to deletion
1. A consumer shall have the right to request that a business delete personal information, subject to Article 2.
",
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "\
CHAPTER I
General
Article 1
Scope
1. This Regulation lays down rules. See Article 2.
Article 2
Definitions
(1) 'personal data' means any information;
";

    fn registry() -> PatternRegistry {
        PatternRegistry::builtin()
    }

    #[test]
    fn init_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        Library::init(dir.path(), "https://regula.dev/").unwrap();
        let library = Library::init(dir.path(), "https://other.example/").unwrap();
        // The second init must not clobber the existing metadata.
        assert_eq!(library.metadata().unwrap().base_uri, "https://regula.dev/");
    }

    #[test]
    fn open_requires_initialised_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            Library::open(dir.path()),
            Err(LibraryError::NotInitialized { .. })
        ));
    }

    #[test]
    fn add_list_load_remove() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = Library::init(dir.path(), "https://regula.dev/").unwrap();

        let report = library
            .add_document("gdpr-mini", TEXT, &AddOptions::default(), &registry())
            .unwrap();
        assert_eq!(report.articles, 2);

        let entries = library.list().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DocStatus::Ready);
        assert!(entries[0].stats.triples > 0);

        let store = library.load_triple_store("gdpr-mini").unwrap();
        assert_eq!(store.len(), entries[0].stats.triples);

        library.remove_document("gdpr-mini").unwrap();
        assert!(library.list().unwrap().is_empty());
        assert!(matches!(
            library.load_triple_store("gdpr-mini"),
            Err(LibraryError::DocumentNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_requires_force() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = Library::init(dir.path(), "https://regula.dev/").unwrap();
        library
            .add_document("doc", TEXT, &AddOptions::default(), &registry())
            .unwrap();

        let err = library
            .add_document("doc", TEXT, &AddOptions::default(), &registry())
            .unwrap_err();
        assert!(matches!(err, LibraryError::Duplicate { .. }));

        let forced = AddOptions {
            force: true,
            ..Default::default()
        };
        library
            .add_document("doc", TEXT, &forced, &registry())
            .unwrap();
        assert_eq!(library.list().unwrap().len(), 1);
    }

    #[test]
    fn merged_store_is_order_independent() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = Library::init(dir.path(), "https://regula.dev/").unwrap();
        library
            .add_document("a", TEXT, &AddOptions::default(), &registry())
            .unwrap();
        library
            .add_document("b", "Article 1\nOther\n1. Unrelated text.\n", &AddOptions::default(), &registry())
            .unwrap();

        let ab = library.load_merged_triple_store(&["a", "b"]).unwrap();
        let ba = library.load_merged_triple_store(&["b", "a"]).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), library.load_all_triple_stores().unwrap().len());
    }

    #[test]
    fn stats_aggregate_by_jurisdiction_and_status() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = Library::init(dir.path(), "https://regula.dev/").unwrap();
        let eu = AddOptions {
            jurisdiction: Some("EU".into()),
            ..Default::default()
        };
        library.add_document("a", TEXT, &eu, &registry()).unwrap();
        library.add_document("b", TEXT, &eu, &registry()).unwrap();
        library.record_failure("c", None).unwrap();

        let stats = library.stats().unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.by_jurisdiction.get("EU"), Some(&2));
        assert_eq!(stats.by_status.get("ready"), Some(&2));
        assert_eq!(stats.by_status.get("failed"), Some(&1));
    }

    #[test]
    fn seed_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = Library::init(dir.path(), "https://regula.dev/").unwrap();
        let added = library.seed(&registry()).unwrap();
        assert_eq!(added, 2);
        assert!(library.list().unwrap().iter().any(|d| d.id == "gdpr-excerpt"));

        // Seeding again adds nothing and errors on nothing.
        assert_eq!(library.seed(&registry()).unwrap(), 0);
    }

    #[test]
    fn snapshot_file_shape() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = Library::init(dir.path(), "https://regula.dev/").unwrap();
        library
            .add_document("doc", TEXT, &AddOptions::default(), &registry())
            .unwrap();

        let raw = std::fs::read_to_string(dir.path().join("graphs/doc.json")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let records = json.as_array().unwrap();
        assert!(!records.is_empty());
        assert!(records[0]["subject"].is_string());
        assert!(records[0]["predicate"].is_string());
        assert!(records[0]["object"].is_string());
    }
}
