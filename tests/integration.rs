//! End-to-end integration tests for the regula pipeline.
//!
//! These exercise the full chain from raw regulation text through parsing,
//! extraction, resolution, graph building, querying, validation, and impact
//! analysis, pinning the cross-component behaviours no unit test covers.

use regula::analysis::impact::{self, ImpactDirection};
use regula::extract::RefTarget;
use regula::graph::Object;
use regula::graph::ontology::{class, pred};
use regula::graph::serialize;
use regula::patterns::PatternRegistry;
use regula::query::QueryOutcome;
use regula::resolve::ResolutionStatus;
use regula::session::{DEFAULT_BASE_URI, IngestOptions, Session, ingest_text};
use regula::validate::{GateConfig, GateId, GatePipeline};

const MINI_GDPR: &str = "\
REGULATION (EU) 2016/679 OF THE EUROPEAN PARLIAMENT AND OF THE COUNCIL

Whereas:
(1) The protection of natural persons in relation to the processing of personal data is a fundamental right.
(26) The principles of data protection should apply to any information concerning an identified person.

CHAPTER I
General provisions

Article 1
Subject-matter and objectives
1. This Regulation lays down rules relating to the protection of natural persons.
2. This Regulation protects fundamental rights and freedoms.

Article 4
Definitions
For the purposes of this Regulation:
(1) 'personal data' means any information relating to an identified or identifiable natural person;
(2) 'controller' means the natural or legal person which determines the purposes and means of the processing;

CHAPTER II
Principles

Article 5
Principles relating to processing of personal data
1. Personal data shall be processed lawfully, fairly and transparently.
2. The controller shall be responsible for compliance with paragraph 1.

CHAPTER III
Rights of the data subject

Article 15
Right of access by the data subject
1. The data subject shall have the right of access to personal data, subject to Articles 16 to 18.

Article 17
Right to erasure
1. The data subject shall have the right to obtain from the controller the erasure of personal data, in accordance with Article 5 and Directive 95/46/EC.
";

fn ingest() -> regula::session::IngestedDocument {
    ingest_text(
        MINI_GDPR,
        &PatternRegistry::builtin(),
        DEFAULT_BASE_URI,
        &IngestOptions::new("GDPR"),
    )
    .unwrap()
}

#[test]
fn minimal_parse_produces_expected_tree_and_triples() {
    let ingested = ingest();
    let doc = &ingested.document;

    assert_eq!(doc.chapters.len(), 3);
    assert_eq!(doc.chapters[0].number, "I");
    assert_eq!(doc.recitals.len(), 2);
    let art1 = doc.article(1).unwrap();
    assert_eq!(art1.title, "Subject-matter and objectives");

    assert!(ingested.store.contains(
        "https://regula.dev/GDPR:Art1",
        pred::TYPE,
        &Object::Iri(class::ARTICLE.into())
    ));
    assert!(ingested.store.contains(
        "https://regula.dev/GDPR:Art1",
        pred::TITLE,
        &Object::Literal("Subject-matter and objectives".into())
    ));
}

#[test]
fn reference_resolution_statuses() {
    let ingested = ingest();

    // Article 17 cites Article 5: resolved, high confidence.
    let art5 = ingested
        .resolved
        .iter()
        .find(|r| {
            r.reference.source_article == 17
                && matches!(r.reference.target, RefTarget::Article { number: 5, .. })
        })
        .unwrap();
    assert_eq!(art5.status, ResolutionStatus::Resolved);
    assert_eq!(art5.target.as_deref(), Some("https://regula.dev/GDPR:Art5"));

    // Articles 16 to 18: a range over the indexed subset (only 17 exists).
    let range = ingested
        .resolved
        .iter()
        .find(|r| r.reference.raw.contains("16 to 18"))
        .unwrap();
    assert_eq!(range.status, ResolutionStatus::Range);
    assert!(
        range
            .targets
            .contains(&"https://regula.dev/GDPR:Art17".to_string())
    );

    // Directive 95/46/EC: external with a scheme URI.
    let external = ingested
        .resolved
        .iter()
        .find(|r| r.status == ResolutionStatus::External)
        .unwrap();
    assert_eq!(
        external.target.as_deref(),
        Some("https://regula.dev/GDPR/directive:95/46")
    );
}

#[test]
fn builder_maintains_inverse_reference_closure() {
    let ingested = ingest();
    let references = ingested.store.find(None, Some(pred::REFERENCES), None);
    assert!(!references.is_empty());
    for triple in references {
        assert!(
            ingested.store.contains(
                triple.object.as_str(),
                pred::REFERENCED_BY,
                &Object::Iri(triple.subject.clone())
            ),
            "no inverse for {} -> {}",
            triple.subject,
            triple.object
        );
    }
}

#[test]
fn select_query_over_ingested_graph() {
    let mut session = Session::new(DEFAULT_BASE_URI);
    session
        .ingest_text(MINI_GDPR, &IngestOptions::new("GDPR"))
        .unwrap();

    let (outcome, _) = session
        .query("SELECT ?a ?t WHERE { ?a rdf:type reg:Article . ?a reg:title ?t } ORDER BY ?a")
        .unwrap();
    let QueryOutcome::Select(result) = outcome else {
        panic!("expected select result");
    };
    assert_eq!(result.columns, vec!["a", "t"]);
    assert_eq!(result.rows.len(), 5);
    assert_eq!(result.rows[0][0], "https://regula.dev/GDPR:Art1");

    // Repeated execution returns identical row order.
    let (second, _) = session
        .query("SELECT ?a ?t WHERE { ?a rdf:type reg:Article . ?a reg:title ?t } ORDER BY ?a")
        .unwrap();
    let QueryOutcome::Select(second) = second else {
        panic!("expected select result");
    };
    assert_eq!(result, second);
}

#[test]
fn describe_and_construct_forms() {
    let mut session = Session::new(DEFAULT_BASE_URI);
    session
        .ingest_text(MINI_GDPR, &IngestOptions::new("GDPR"))
        .unwrap();

    let (outcome, _) = session
        .query("DESCRIBE <https://regula.dev/GDPR:Art5>")
        .unwrap();
    let QueryOutcome::Graph(graph) = outcome else {
        panic!("expected graph result");
    };
    assert!(graph.iter().any(|t| t.subject.ends_with("Art5")));
    // Incoming edges are part of the description.
    assert!(
        graph
            .iter()
            .any(|t| t.predicate == pred::REFERENCES && t.object.as_str().ends_with("Art5"))
    );

    let (outcome, _) = session
        .query("CONSTRUCT { ?b reg:referencedBy ?a } WHERE { ?a reg:references ?b }")
        .unwrap();
    let QueryOutcome::Graph(constructed) = outcome else {
        panic!("expected graph result");
    };
    assert!(!constructed.is_empty());
}

#[test]
fn ntriples_round_trip_preserves_triple_set() {
    let ingested = ingest();
    let nt = serialize::to_ntriples(&ingested.store);
    let back = serialize::parse_ntriples(&nt).unwrap();
    assert_eq!(back, ingested.store);
}

#[test]
fn snapshot_round_trip_preserves_triple_set_and_order() {
    let ingested = ingest();
    let snapshot = ingested.store.to_snapshot().unwrap();
    let back = regula::graph::TripleStore::from_snapshot(&snapshot).unwrap();
    assert_eq!(back, ingested.store);
    let a: Vec<_> = ingested.store.iter().collect();
    let b: Vec<_> = back.iter().collect();
    assert_eq!(a, b);
}

#[test]
fn gate_pipeline_passes_and_strict_halt_behaviour() {
    let ingested = ingest();
    let config = GateConfig {
        min_definitions: 1,
        min_references: 1,
        min_semantics: 1,
        ..Default::default()
    };
    let report = GatePipeline::new(config).run(&ingested.validation_context());
    assert!(report.overall_pass, "{report:?}");

    // Strict mode with V3 skipped halts on the failing V2.
    let sparse = ingest_text(
        "Article 1\nScope\n1. Nothing here references anything.\n",
        &PatternRegistry::builtin(),
        DEFAULT_BASE_URI,
        &IngestOptions::new("SPARSE"),
    )
    .unwrap();
    let config = GateConfig {
        skip: vec![GateId::Quality],
        strict: true,
        ..Default::default()
    };
    let report = GatePipeline::new(config).run(&sparse.validation_context());
    assert!(report.halted);
    assert!(!report.overall_pass);
}

#[test]
fn impact_walks_reference_edges() {
    let ingested = ingest();
    let result = impact::analyze(
        &ingested.store,
        "https://regula.dev/GDPR:Art17",
        1,
        ImpactDirection::Outgoing,
    );
    assert!(
        result
            .direct
            .contains(&"https://regula.dev/GDPR:Art5".to_string())
    );

    let zero = impact::analyze(
        &ingested.store,
        "https://regula.dev/GDPR:Art17",
        0,
        ImpactDirection::Both,
    );
    assert_eq!(zero.total_reached(), 0);
}

#[test]
fn empty_document_boundary() {
    let ingested = ingest_text(
        "",
        &PatternRegistry::builtin(),
        DEFAULT_BASE_URI,
        &IngestOptions::new("EMPTY"),
    )
    .unwrap();
    assert!(ingested.document.is_empty());
    assert!(ingested.resolved.is_empty());

    let (outcome, _) = regula::query::run(
        &ingested.store,
        "SELECT ?s WHERE { ?s rdf:type reg:Article }",
    )
    .unwrap();
    let QueryOutcome::Select(result) = outcome else {
        panic!("expected select result");
    };
    assert!(result.rows.is_empty());
}

#[test]
fn export_formats_are_consistent() {
    let ingested = ingest();
    let ttl = serialize::to_turtle(&ingested.store);
    assert!(ttl.contains("@prefix reg:"));
    assert!(ttl.contains("reg:title \"Right to erasure\""));

    let summary = serialize::GraphSummary::from_store(&ingested.store);
    assert_eq!(summary.triples, ingested.store.len());
    assert!(summary.relationships.contains_key(pred::REFERENCES));
    assert!(!summary.most_referenced.is_empty());
}
