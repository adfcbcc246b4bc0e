//! Per-command pipeline orchestration.
//!
//! A [`Session`] owns the pattern registry and the most recent ingest, so
//! chained commands (ingest then query then export) work against one loaded
//! graph without any module-level state. Each ingest runs the fixed pipeline
//! parse → extract → resolve → build and keeps every artefact for the
//! validator.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ParseError, RegulaResult};
use crate::extract::{
    self, DefinedTerm, Reference, SemanticAnnotation, TermUsage,
};
use crate::graph::builder::{BuildCounts, GraphBuilder};
use crate::graph::TripleStore;
use crate::model::{Document, DocumentType};
use crate::parser::{self, Diagnostic};
use crate::patterns::PatternRegistry;
use crate::query::{self, QueryMetrics, QueryOutcome};
use crate::resolve::{
    DocumentIndex, ResolutionReport, ResolvedReference, Resolver, UriScheme,
};
use crate::validate::ValidationContext;

/// Default base for provision URIs.
pub const DEFAULT_BASE_URI: &str = "https://regula.dev/";

/// Options for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub doc_id: String,
    /// Parse as a known type; None auto-detects.
    pub doc_type: Option<DocumentType>,
    /// Emit ELI enrichment triples for EU legislative types.
    pub eli: bool,
}

impl IngestOptions {
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            doc_type: None,
            eli: false,
        }
    }

    pub fn with_type(mut self, doc_type: DocumentType) -> Self {
        self.doc_type = Some(doc_type);
        self
    }

    pub fn with_eli(mut self, eli: bool) -> Self {
        self.eli = eli;
        self
    }
}

/// Wall-clock per stage.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageDurations {
    pub parse: Duration,
    pub extract: Duration,
    pub resolve: Duration,
    pub build: Duration,
}

/// Summary of one ingest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: String,
    pub doc_type: DocumentType,
    pub chapters: usize,
    pub articles: usize,
    pub recitals: usize,
    pub definitions: usize,
    pub references: usize,
    pub semantics: usize,
    pub term_usages: usize,
    pub resolution: ResolutionReport,
    pub counts: BuildCounts,
    pub warnings: Vec<String>,
    pub durations: StageDurations,
}

/// Everything produced by one pipeline run.
#[derive(Debug)]
pub struct IngestedDocument {
    pub doc_id: String,
    pub source_path: Option<PathBuf>,
    pub source_size: u64,
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
    pub definitions: Vec<DefinedTerm>,
    pub references: Vec<Reference>,
    pub semantics: Vec<SemanticAnnotation>,
    pub term_usages: Vec<TermUsage>,
    pub resolved: Vec<ResolvedReference>,
    pub store: TripleStore,
    pub report: IngestReport,
}

impl IngestedDocument {
    /// Borrow everything as a gate-pipeline context.
    pub fn validation_context(&self) -> ValidationContext<'_> {
        ValidationContext {
            source_path: self.source_path.as_deref(),
            source_size: self.source_size,
            document: &self.document,
            diagnostics: &self.diagnostics,
            parse_duration: self.report.durations.parse,
            definitions: &self.definitions,
            references: &self.references,
            semantics: &self.semantics,
            term_usages: &self.term_usages,
            resolved: &self.resolved,
            store: &self.store,
        }
    }
}

/// Run the full pipeline over in-memory text.
pub fn ingest_text(
    text: &str,
    registry: &PatternRegistry,
    base_uri: &str,
    options: &IngestOptions,
) -> RegulaResult<IngestedDocument> {
    let mut durations = StageDurations::default();

    let started = Instant::now();
    let parsed = match options.doc_type {
        Some(doc_type) => parser::parse_with_type(text, registry, doc_type)?,
        None => parser::parse(text, registry)?,
    };
    durations.parse = parsed.duration;
    let document = parsed.document;

    let extract_started = Instant::now();
    let definitions = extract::extract_definitions(&document, registry);
    let references = extract::extract_references(&document, registry);
    let semantics = extract::extract_semantics(&document);
    let term_usages = extract::extract_usages(&document, &definitions);
    durations.extract = extract_started.elapsed();

    let resolve_started = Instant::now();
    let uris = UriScheme::new(base_uri, &options.doc_id);
    let index = DocumentIndex::build(&document);
    let resolved = Resolver::new(&index, uris.clone()).resolve_all(&references);
    let resolution = ResolutionReport::from_resolved(&resolved);
    durations.resolve = resolve_started.elapsed();

    let build_started = Instant::now();
    let (store, counts) = GraphBuilder::new(uris)
        .with_eli(options.eli)
        .build(&document, &definitions, &term_usages, &semantics, &resolved);
    durations.build = build_started.elapsed();

    let report = IngestReport {
        doc_id: options.doc_id.clone(),
        doc_type: document.doc_type,
        chapters: document.chapters.len(),
        articles: document.article_count(),
        recitals: document.recitals.len(),
        definitions: definitions.len(),
        references: references.len(),
        semantics: semantics.len(),
        term_usages: term_usages.len(),
        resolution,
        counts,
        warnings: parsed
            .diagnostics
            .iter()
            .map(|d| format!("line {}: {}", d.line, d.message))
            .collect(),
        durations,
    };

    tracing::info!(
        doc = %options.doc_id,
        articles = report.articles,
        triples = report.counts.triples,
        rate = report.resolution.rate,
        total_ms = started.elapsed().as_millis() as u64,
        "ingest complete"
    );

    Ok(IngestedDocument {
        doc_id: options.doc_id.clone(),
        source_path: None,
        source_size: text.len() as u64,
        document,
        diagnostics: parsed.diagnostics,
        definitions,
        references,
        semantics,
        term_usages,
        resolved,
        store,
        report,
    })
}

/// A per-invocation session owning the registry and the loaded graph.
pub struct Session {
    base_uri: String,
    registry: PatternRegistry,
    current: Option<IngestedDocument>,
}

impl Session {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            registry: PatternRegistry::builtin(),
            current: None,
        }
    }

    pub fn with_registry(mut self, registry: PatternRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    /// Ingest text and keep the result as the session's loaded document.
    pub fn ingest_text(
        &mut self,
        text: &str,
        options: &IngestOptions,
    ) -> RegulaResult<&IngestedDocument> {
        let ingested = ingest_text(text, &self.registry, &self.base_uri, options)?;
        self.current = Some(ingested);
        Ok(self.current.as_ref().expect("just stored"))
    }

    /// Ingest a file; the document ID defaults to the file stem.
    pub fn ingest_file(
        &mut self,
        path: &Path,
        options: &IngestOptions,
    ) -> RegulaResult<&IngestedDocument> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ParseError::Io { source: e })?;
        let mut ingested = ingest_text(&text, &self.registry, &self.base_uri, options)?;
        ingested.source_path = Some(path.to_path_buf());
        self.current = Some(ingested);
        Ok(self.current.as_ref().expect("just stored"))
    }

    /// The loaded document, if any.
    pub fn current(&self) -> Option<&IngestedDocument> {
        self.current.as_ref()
    }

    /// Query the loaded graph. An empty store yields zero rows, not an error.
    pub fn query(&self, text: &str) -> RegulaResult<(QueryOutcome, QueryMetrics)> {
        static EMPTY: std::sync::OnceLock<TripleStore> = std::sync::OnceLock::new();
        let store = self
            .current
            .as_ref()
            .map(|c| &c.store)
            .unwrap_or_else(|| EMPTY.get_or_init(TripleStore::new));
        Ok(query::run(store, text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "\
CHAPTER I
General provisions
Article 1
Subject-matter
1. This Regulation lays down rules. See Article 2.
Article 2
Material scope
1. It applies to processing of personal data.
";

    #[test]
    fn ingest_then_query_through_session() {
        let mut session = Session::new(DEFAULT_BASE_URI);
        let report = session
            .ingest_text(TEXT, &IngestOptions::new("GDPR"))
            .unwrap()
            .report
            .clone();
        assert_eq!(report.articles, 2);
        assert!(report.counts.triples > 0);

        let (outcome, _) = session
            .query("SELECT ?a WHERE { ?a rdf:type reg:Article } ORDER BY ?a")
            .unwrap();
        match outcome {
            QueryOutcome::Select(result) => {
                assert_eq!(result.rows.len(), 2);
                assert_eq!(result.rows[0][0], "https://regula.dev/GDPR:Art1");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn query_without_ingest_returns_empty() {
        let session = Session::new(DEFAULT_BASE_URI);
        let (outcome, _) = session.query("SELECT ?s WHERE { ?s ?p ?o }").unwrap();
        match outcome {
            QueryOutcome::Select(result) => assert!(result.rows.is_empty()),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn report_carries_resolution_rate() {
        let ingested = ingest_text(
            TEXT,
            &PatternRegistry::builtin(),
            DEFAULT_BASE_URI,
            &IngestOptions::new("X"),
        )
        .unwrap();
        assert!((ingested.report.resolution.rate - 1.0).abs() < f64::EPSILON);
        assert!(ingested.report.warnings.is_empty());
    }

    #[test]
    fn validation_context_borrows_everything() {
        let ingested = ingest_text(
            TEXT,
            &PatternRegistry::builtin(),
            DEFAULT_BASE_URI,
            &IngestOptions::new("X"),
        )
        .unwrap();
        let ctx = ingested.validation_context();
        assert_eq!(ctx.document.article_count(), 2);
        assert_eq!(ctx.source_size, TEXT.len() as u64);
    }
}
