//! Materialises the knowledge graph from the parsed document and the
//! extraction artefacts.
//!
//! Emission order is fixed: chapters, sections, articles, paragraphs and
//! points, recitals, definitions, term-usage edges, semantic annotations,
//! then reference edges with their maintained inverse.

use serde::{Deserialize, Serialize};

use crate::extract::{
    AnnotationKind, DefinedTerm, SemanticAnnotation, TermUsage,
};
use crate::graph::ontology::{class, pred};
use crate::graph::{Object, TripleStore};
use crate::model::{Document, DocumentType};
use crate::resolve::{ResolutionStatus, ResolvedReference, UriScheme};

/// Per-category triple counts for the ingest report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCounts {
    pub chapters: usize,
    pub sections: usize,
    pub articles: usize,
    pub paragraphs: usize,
    pub points: usize,
    pub recitals: usize,
    pub definitions: usize,
    pub term_usages: usize,
    pub rights: usize,
    pub obligations: usize,
    pub references: usize,
    pub eli: usize,
    /// Total triples actually inserted (after dedup).
    pub triples: usize,
}

/// Builds the triple store for one document.
pub struct GraphBuilder {
    uris: UriScheme,
    eli: bool,
}

impl GraphBuilder {
    pub fn new(uris: UriScheme) -> Self {
        Self { uris, eli: false }
    }

    /// Enable ELI enrichment for EU legislative documents.
    pub fn with_eli(mut self, eli: bool) -> Self {
        self.eli = eli;
        self
    }

    /// Emit the whole graph into a fresh store.
    pub fn build(
        &self,
        document: &Document,
        definitions: &[DefinedTerm],
        usages: &[TermUsage],
        semantics: &[SemanticAnnotation],
        resolved: &[ResolvedReference],
    ) -> (TripleStore, BuildCounts) {
        let mut store = TripleStore::new();
        let mut counts = BuildCounts::default();

        let doc_uri = self.uris.document();
        store.insert(
            &doc_uri,
            pred::TYPE,
            Object::Iri(document_class(document.doc_type).into()),
        );

        self.emit_structure(document, &mut store, &mut counts);
        self.emit_definitions(definitions, &mut store, &mut counts);
        self.emit_usages(usages, definitions, &mut store, &mut counts);
        self.emit_semantics(semantics, &mut store, &mut counts);
        self.emit_references(resolved, &mut store, &mut counts);

        if self.eli && document.doc_type.is_eu_legislative() {
            counts.eli = self.emit_eli(document, &mut store);
        }

        counts.triples = store.len();
        tracing::info!(
            triples = counts.triples,
            references = counts.references,
            "graph built"
        );
        (store, counts)
    }

    fn emit_structure(&self, document: &Document, store: &mut TripleStore, counts: &mut BuildCounts) {
        let doc_uri = self.uris.document();

        for chapter in &document.chapters {
            let ch_uri = self.uris.chapter(&chapter.number);
            store.insert(&ch_uri, pred::TYPE, Object::Iri(class::CHAPTER.into()));
            store.insert(&ch_uri, pred::NUMBER, Object::Literal(chapter.number.clone()));
            if !chapter.title.is_empty() {
                store.insert(&ch_uri, pred::TITLE, Object::Literal(chapter.title.clone()));
            }
            store.insert(&doc_uri, pred::CONTAINS, Object::Iri(ch_uri.clone()));
            store.insert(&ch_uri, pred::PART_OF, Object::Iri(doc_uri.clone()));
            counts.chapters += 1;

            for section in &chapter.sections {
                let sec_uri = self.uris.section(&chapter.number, section.number);
                store.insert(&sec_uri, pred::TYPE, Object::Iri(class::SECTION.into()));
                store.insert(
                    &sec_uri,
                    pred::NUMBER,
                    Object::Literal(section.number.to_string()),
                );
                if !section.title.is_empty() {
                    store.insert(&sec_uri, pred::TITLE, Object::Literal(section.title.clone()));
                }
                store.insert(&ch_uri, pred::CONTAINS, Object::Iri(sec_uri.clone()));
                store.insert(&sec_uri, pred::PART_OF, Object::Iri(ch_uri.clone()));
                counts.sections += 1;

                for article in &section.articles {
                    self.emit_article(article, &sec_uri, store, counts);
                }
            }

            for article in &chapter.articles {
                self.emit_article(article, &ch_uri, store, counts);
            }
        }

        for recital in &document.recitals {
            let rec_uri = self.uris.recital(recital.number);
            store.insert(&rec_uri, pred::TYPE, Object::Iri(class::RECITAL.into()));
            store.insert(
                &rec_uri,
                pred::NUMBER,
                Object::Literal(recital.number.to_string()),
            );
            store.insert(&rec_uri, pred::TEXT, Object::Literal(recital.text.clone()));
            store.insert(&rec_uri, pred::PART_OF, Object::Iri(doc_uri.clone()));
            counts.recitals += 1;
        }
    }

    fn emit_article(
        &self,
        article: &crate::model::Article,
        parent_uri: &str,
        store: &mut TripleStore,
        counts: &mut BuildCounts,
    ) {
        let art_uri = self.uris.article(article.number);
        store.insert(&art_uri, pred::TYPE, Object::Iri(class::ARTICLE.into()));
        store.insert(
            &art_uri,
            pred::NUMBER,
            Object::Literal(article.number.to_string()),
        );
        if !article.title.is_empty() {
            store.insert(&art_uri, pred::TITLE, Object::Literal(article.title.clone()));
        }
        if !article.text.is_empty() {
            store.insert(&art_uri, pred::TEXT, Object::Literal(article.text.clone()));
        }
        store.insert(parent_uri, pred::CONTAINS, Object::Iri(art_uri.clone()));
        store.insert(&art_uri, pred::PART_OF, Object::Iri(parent_uri.to_string()));
        counts.articles += 1;

        for paragraph in &article.paragraphs {
            let para_uri = self.uris.paragraph(article.number, paragraph.number);
            store.insert(&para_uri, pred::TYPE, Object::Iri(class::PARAGRAPH.into()));
            store.insert(
                &para_uri,
                pred::NUMBER,
                Object::Literal(paragraph.number.to_string()),
            );
            if !paragraph.text.is_empty() {
                store.insert(&para_uri, pred::TEXT, Object::Literal(paragraph.text.clone()));
            }
            store.insert(&art_uri, pred::CONTAINS, Object::Iri(para_uri.clone()));
            store.insert(&para_uri, pred::PART_OF, Object::Iri(art_uri.clone()));
            counts.paragraphs += 1;

            for point in &paragraph.points {
                let pt_uri = self
                    .uris
                    .point(article.number, paragraph.number, &point.letter);
                store.insert(&pt_uri, pred::TYPE, Object::Iri(class::POINT.into()));
                store.insert(&pt_uri, pred::NUMBER, Object::Literal(point.letter.clone()));
                if !point.text.is_empty() {
                    store.insert(&pt_uri, pred::TEXT, Object::Literal(point.text.clone()));
                }
                store.insert(&para_uri, pred::CONTAINS, Object::Iri(pt_uri.clone()));
                store.insert(&pt_uri, pred::PART_OF, Object::Iri(para_uri.clone()));
                counts.points += 1;
            }
        }
    }

    fn definition_uri(&self, term: &DefinedTerm) -> String {
        let slug: String = term
            .term
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        format!("{}:Def:{slug}", self.uris.document())
    }

    fn emit_definitions(
        &self,
        definitions: &[DefinedTerm],
        store: &mut TripleStore,
        counts: &mut BuildCounts,
    ) {
        for def in definitions {
            let def_uri = self.definition_uri(def);
            store.insert(&def_uri, pred::TYPE, Object::Iri(class::DEFINITION.into()));
            store.insert(&def_uri, pred::TERM, Object::Literal(def.surface.clone()));
            store.insert(
                &def_uri,
                pred::NORMALIZED_TERM,
                Object::Literal(def.term.clone()),
            );
            store.insert(
                &def_uri,
                pred::DEFINITION,
                Object::Literal(def.definition.clone()),
            );
            store.insert(
                &def_uri,
                pred::DEFINED_IN,
                Object::Iri(self.uris.article(def.article)),
            );
            counts.definitions += 1;
        }
    }

    fn emit_usages(
        &self,
        usages: &[TermUsage],
        definitions: &[DefinedTerm],
        store: &mut TripleStore,
        counts: &mut BuildCounts,
    ) {
        for usage in usages {
            let Some(def) = definitions.iter().find(|d| d.term == usage.term) else {
                continue;
            };
            let inserted = store.insert(
                self.uris.article(usage.article),
                pred::USES_TERM,
                Object::Iri(self.definition_uri(def)),
            );
            if inserted {
                counts.term_usages += 1;
            }
        }
    }

    fn emit_semantics(
        &self,
        semantics: &[SemanticAnnotation],
        store: &mut TripleStore,
        counts: &mut BuildCounts,
    ) {
        for annotation in semantics {
            let art_uri = self.uris.article(annotation.article);
            match annotation.kind {
                AnnotationKind::Right(kind) => {
                    let node = format!("{art_uri}:{}", kind.tag());
                    store.insert(&node, pred::TYPE, Object::Iri(class::RIGHT.into()));
                    store.insert(
                        &node,
                        pred::RIGHT_TYPE,
                        Object::Iri(format!("reg:{}", kind.tag())),
                    );
                    store.insert(
                        &node,
                        pred::BENEFICIARY,
                        Object::Literal(annotation.party.as_str().into()),
                    );
                    store.insert(&art_uri, pred::GRANTS_RIGHT, Object::Iri(node));
                    counts.rights += 1;
                }
                AnnotationKind::Obligation(kind) => {
                    let node = format!("{art_uri}:{}", kind.tag());
                    store.insert(&node, pred::TYPE, Object::Iri(class::OBLIGATION.into()));
                    store.insert(
                        &node,
                        pred::OBLIGATION_TYPE,
                        Object::Iri(format!("reg:{}", kind.tag())),
                    );
                    store.insert(
                        &node,
                        pred::ACTOR,
                        Object::Literal(annotation.party.as_str().into()),
                    );
                    store.insert(&art_uri, pred::IMPOSES_OBLIGATION, Object::Iri(node));
                    counts.obligations += 1;
                }
            }
        }
    }

    fn emit_references(
        &self,
        resolved: &[ResolvedReference],
        store: &mut TripleStore,
        counts: &mut BuildCounts,
    ) {
        for r in resolved {
            if r.status == ResolutionStatus::NotFound {
                continue;
            }
            let source = self.uris.article(r.reference.source_article);
            let targets: Vec<&String> = if r.targets.is_empty() {
                r.target.iter().collect()
            } else {
                r.targets.iter().collect()
            };
            for target in targets {
                if *target == source {
                    continue;
                }
                let inserted =
                    store.insert(&source, pred::REFERENCES, Object::Iri(target.clone()));
                store.insert(target, pred::REFERENCED_BY, Object::Iri(source.clone()));
                if inserted {
                    counts.references += 1;
                }
            }
        }
    }

    fn emit_eli(&self, document: &Document, store: &mut TripleStore) -> usize {
        let before = store.len();
        let doc_uri = self.uris.document();
        store.insert(
            &doc_uri,
            pred::TYPE,
            Object::Iri(class::ELI_LEGAL_RESOURCE.into()),
        );
        store.insert(
            &doc_uri,
            pred::ELI_TYPE_DOCUMENT,
            Object::Literal(document.doc_type.as_str().into()),
        );
        for article in document.all_articles() {
            store.insert(
                self.uris.article(article.number),
                pred::ELI_IS_PART_OF,
                Object::Iri(doc_uri.clone()),
            );
            if !article.title.is_empty() {
                store.insert(
                    self.uris.article(article.number),
                    pred::ELI_TITLE,
                    Object::Literal(article.title.clone()),
                );
            }
        }
        store.len() - before
    }
}

fn document_class(doc_type: DocumentType) -> &'static str {
    match doc_type {
        DocumentType::Regulation => class::REGULATION,
        DocumentType::Directive => class::DIRECTIVE,
        DocumentType::Decision => class::DECISION,
        DocumentType::Generic => class::LEGAL_DOCUMENT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract;
    use crate::parser;
    use crate::patterns::PatternRegistry;
    use crate::resolve::{DocumentIndex, Resolver};

    const TEXT: &str = "\
CHAPTER I
General provisions
Article 1
Subject-matter
1. This Regulation lays down rules. See Article 2.
Article 2
Material scope
1. This Regulation applies to processing. As provided in Article 1.
";

    fn build(text: &str, eli: bool) -> (TripleStore, BuildCounts) {
        let registry = PatternRegistry::builtin();
        let doc = parser::parse_with_type(text, &registry, DocumentType::Regulation)
            .unwrap()
            .document;
        let uris = UriScheme::new("https://regula.dev/", "GDPR");
        let definitions = extract::extract_definitions(&doc, &registry);
        let references = extract::extract_references(&doc, &registry);
        let semantics = extract::extract_semantics(&doc);
        let usages = extract::extract_usages(&doc, &definitions);
        let index = DocumentIndex::build(&doc);
        let resolved = Resolver::new(&index, uris.clone()).resolve_all(&references);
        GraphBuilder::new(uris)
            .with_eli(eli)
            .build(&doc, &definitions, &usages, &semantics, &resolved)
    }

    #[test]
    fn minimal_structure_triples() {
        let (store, counts) = build(TEXT, false);
        assert_eq!(counts.chapters, 1);
        assert_eq!(counts.articles, 2);

        assert!(store.contains(
            "https://regula.dev/GDPR:Art1",
            pred::TYPE,
            &Object::Iri(class::ARTICLE.into())
        ));
        assert!(store.contains(
            "https://regula.dev/GDPR:Art1",
            pred::TITLE,
            &Object::Literal("Subject-matter".into())
        ));
        assert!(store.contains(
            "https://regula.dev/GDPR:Art1",
            pred::PART_OF,
            &Object::Iri("https://regula.dev/GDPR:ChapterI".into())
        ));
    }

    #[test]
    fn reference_edges_carry_inverse() {
        let (store, counts) = build(TEXT, false);
        assert!(counts.references >= 2);

        // Closure: every references edge has its referencedBy inverse.
        for t in store.find(None, Some(pred::REFERENCES), None) {
            assert!(
                store.contains(t.object.as_str(), pred::REFERENCED_BY, &Object::Iri(t.subject.clone())),
                "missing inverse for {} -> {}",
                t.subject,
                t.object
            );
        }
    }

    #[test]
    fn self_references_are_skipped() {
        let text = "Article 1\nScope\n1. As stated in Article 1 itself.\n";
        let registry = PatternRegistry::builtin();
        let doc = parser::parse(text, &registry).unwrap().document;
        let uris = UriScheme::new("https://regula.dev/", "X");
        let references = extract::extract_references(&doc, &registry);
        let index = DocumentIndex::build(&doc);
        let resolved = Resolver::new(&index, uris.clone()).resolve_all(&references);
        let (store, counts) =
            GraphBuilder::new(uris).build(&doc, &[], &[], &[], &resolved);
        assert_eq!(counts.references, 0);
        assert!(store.find(None, Some(pred::REFERENCES), None).is_empty());
    }

    #[test]
    fn eli_enrichment_only_for_eu_types() {
        let (_, with_eli) = build(TEXT, true);
        assert!(with_eli.eli > 0);

        let registry = PatternRegistry::builtin();
        let doc = parser::parse_with_type("Article 1\nScope\n1. Text.\n", &registry, DocumentType::Generic)
            .unwrap()
            .document;
        let uris = UriScheme::new("https://regula.dev/", "X");
        let (_, counts) = GraphBuilder::new(uris)
            .with_eli(true)
            .build(&doc, &[], &[], &[], &[]);
        assert_eq!(counts.eli, 0);
    }

    #[test]
    fn definitions_and_usages() {
        let text = "\
Article 4
Definitions
(1) 'personal data' means any information;

Article 5
Principles
1. Personal data shall be processed lawfully.
";
        let (store, counts) = build(text, false);
        assert_eq!(counts.definitions, 1);
        assert_eq!(counts.term_usages, 1);

        let defs = store.find(None, Some(pred::NORMALIZED_TERM), Some("personal data"));
        assert_eq!(defs.len(), 1);
        let def_uri = defs[0].subject.clone();
        assert!(store.contains(
            "https://regula.dev/GDPR:Art5",
            pred::USES_TERM,
            &Object::Iri(def_uri)
        ));
    }

    #[test]
    fn rebuild_is_deterministic() {
        let (first, _) = build(TEXT, false);
        let (second, _) = build(TEXT, false);
        assert_eq!(first, second);
        let a: Vec<_> = first.iter().collect();
        let b: Vec<_> = second.iter().collect();
        assert_eq!(a, b);
    }
}
