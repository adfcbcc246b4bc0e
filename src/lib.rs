//! # regula
//!
//! Regulation knowledge graphs: parse unstructured legal text into a typed
//! document tree, extract definitions, citations and rights/obligations,
//! resolve citations to provision URIs, materialise an RDF-style triple
//! store, and query it with a SPARQL subset.
//!
//! ## Architecture
//!
//! - **Patterns** (`patterns`): data-driven regex registry with per-family overrides
//! - **Parser** (`parser`): line-oriented FSM producing the `model::Document` tree
//! - **Extractors** (`extract`): definitions, references, semantics, term usage
//! - **Resolver** (`resolve`): citations → provision URIs with status + confidence
//! - **Graph** (`graph`): indexed triple store, ontology, builder, serialisers
//! - **Query** (`query`): SPARQL-subset parser and executor
//! - **Validation** (`validate`): V0–V3 gates, legacy scored validator, profiles
//! - **Library** (`library`): persistent multi-regulation store with merge-for-query
//! - **Analyses** (`analysis`): impact, cross-regulation comparison, scenarios
//!
//! ## Library usage
//!
//! ```no_run
//! use regula::session::{IngestOptions, Session, DEFAULT_BASE_URI};
//!
//! let mut session = Session::new(DEFAULT_BASE_URI);
//! let text = std::fs::read_to_string("gdpr.txt").unwrap();
//! session.ingest_text(&text, &IngestOptions::new("GDPR")).unwrap();
//! let (outcome, _metrics) = session
//!     .query("SELECT ?a ?t WHERE { ?a rdf:type reg:Article . ?a reg:title ?t } ORDER BY ?a")
//!     .unwrap();
//! ```

pub mod analysis;
pub mod bulk;
pub mod draft;
pub mod error;
pub mod extract;
pub mod graph;
pub mod library;
pub mod linkcheck;
pub mod model;
pub mod parser;
pub mod patterns;
pub mod query;
pub mod resolve;
pub mod session;
pub mod validate;
