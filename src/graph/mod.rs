//! The in-memory triple store.
//!
//! Triples are `(subject, predicate, object)` strings; objects are tagged as
//! IRI or literal at insertion time so no serialiser has to re-derive the
//! distinction. The store preserves insertion order, deduplicates exact
//! triples, and keeps three indexes (subject, predicate, object) for
//! selective lookup.

pub mod builder;
pub mod ontology;
pub mod serialize;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// The object position of a triple: a resource IRI or a plain literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Object {
    Iri(String),
    Literal(String),
}

impl Object {
    /// The raw string regardless of tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Iri(s) | Self::Literal(s) => s,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, Self::Iri(_))
    }

    /// Classify an untagged string, as found in legacy snapshots: absolute
    /// URIs and CURIEs of the known vocabularies are IRIs, the rest literals.
    pub fn classify(s: &str) -> Self {
        let is_iri = s.contains("://")
            || s.starts_with("urn:")
            || ontology::KNOWN_PREFIXES
                .iter()
                .any(|(p, _)| s.starts_with(&format!("{p}:")));
        if is_iri {
            Self::Iri(s.to_string())
        } else {
            Self::Literal(s.to_string())
        }
    }
}

impl std::fmt::Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Object,
}

impl Triple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Object,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }
}

/// Snapshot record: the on-disk JSON shape (`graphs/<id>.json`).
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotTriple {
    subject: String,
    predicate: String,
    object: String,
}

/// Insertion-ordered, deduplicating triple store with three indexes.
#[derive(Debug, Default, Clone)]
pub struct TripleStore {
    triples: Vec<Triple>,
    seen: HashSet<Triple>,
    by_subject: HashMap<String, Vec<usize>>,
    by_predicate: HashMap<String, Vec<usize>>,
    by_object: HashMap<String, Vec<usize>>,
}

impl TripleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a triple. Returns false if the exact triple was already present.
    pub fn insert(
        &mut self,
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: Object,
    ) -> bool {
        self.insert_triple(Triple::new(subject, predicate, object))
    }

    /// Insert a prebuilt triple, deduplicating exact matches.
    pub fn insert_triple(&mut self, triple: Triple) -> bool {
        if self.seen.contains(&triple) {
            return false;
        }
        let idx = self.triples.len();
        self.by_subject
            .entry(triple.subject.clone())
            .or_default()
            .push(idx);
        self.by_predicate
            .entry(triple.predicate.clone())
            .or_default()
            .push(idx);
        self.by_object
            .entry(triple.object.as_str().to_string())
            .or_default()
            .push(idx);
        self.seen.insert(triple.clone());
        self.triples.push(triple);
        true
    }

    /// Find triples matching the given coordinates; `None` is a wildcard.
    /// Results come back in insertion order.
    pub fn find(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
    ) -> Vec<&Triple> {
        // Start from the smallest bound index list; a fully unbound query
        // scans everything.
        let mut lists: Vec<&[usize]> = Vec::new();
        if let Some(s) = subject {
            lists.push(self.by_subject.get(s).map(Vec::as_slice).unwrap_or(&[]));
        }
        if let Some(p) = predicate {
            lists.push(self.by_predicate.get(p).map(Vec::as_slice).unwrap_or(&[]));
        }
        if let Some(o) = object {
            lists.push(self.by_object.get(o).map(Vec::as_slice).unwrap_or(&[]));
        }

        let matches = |s: &str, p: &str, o: &str| {
            subject.is_none_or(|want| s == want)
                && predicate.is_none_or(|want| p == want)
                && object.is_none_or(|want| o == want)
        };

        match lists.iter().min_by_key(|l| l.len()) {
            None => self.triples.iter().collect(),
            Some(smallest) => smallest
                .iter()
                .map(|&i| &self.triples[i])
                .filter(|t| matches(t.subject.as_str(), t.predicate.as_str(), t.object.as_str()))
                .collect(),
        }
    }

    /// Whether the exact triple exists.
    pub fn contains(&self, subject: &str, predicate: &str, object: &Object) -> bool {
        self.seen.contains(&Triple {
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object: object.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// All triples in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Triple> {
        self.triples.iter()
    }

    /// Distinct predicates in first-seen order.
    pub fn predicates(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.triples
            .iter()
            .filter(|t| seen.insert(t.predicate.as_str()))
            .map(|t| t.predicate.as_str())
            .collect()
    }

    /// Merge another store into this one, deduplicating.
    pub fn merge(&mut self, other: &TripleStore) {
        for triple in other.iter() {
            self.insert_triple(triple.clone());
        }
    }

    /// Serialise to the library snapshot format. Snapshots list triples
    /// newest first; [`TripleStore::from_snapshot`] iterates in reverse, so a
    /// write-then-read cycle restores insertion order exactly.
    pub fn to_snapshot(&self) -> GraphResult<String> {
        let records: Vec<SnapshotTriple> = self
            .triples
            .iter()
            .rev()
            .map(|t| SnapshotTriple {
                subject: t.subject.clone(),
                predicate: t.predicate.clone(),
                object: t.object.as_str().to_string(),
            })
            .collect();
        serde_json::to_string_pretty(&records).map_err(|e| GraphError::Snapshot {
            message: e.to_string(),
        })
    }

    /// Rebuild a store from a snapshot, re-classifying untagged objects.
    pub fn from_snapshot(json: &str) -> GraphResult<Self> {
        let records: Vec<SnapshotTriple> =
            serde_json::from_str(json).map_err(|e| GraphError::Snapshot {
                message: e.to_string(),
            })?;
        let mut store = Self::new();
        for r in records.into_iter().rev() {
            store.insert(r.subject, r.predicate, Object::classify(&r.object));
        }
        Ok(store)
    }
}

impl PartialEq for TripleStore {
    /// Set equality: two stores are equal when they hold the same triples,
    /// regardless of insertion order.
    fn eq(&self, other: &Self) -> bool {
        self.seen == other.seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Object {
        Object::Literal(s.into())
    }

    fn iri(s: &str) -> Object {
        Object::Iri(s.into())
    }

    #[test]
    fn insert_dedup_and_order() {
        let mut store = TripleStore::new();
        assert!(store.insert("a", "p", lit("1")));
        assert!(store.insert("b", "p", lit("2")));
        assert!(!store.insert("a", "p", lit("1")));
        assert_eq!(store.len(), 2);

        let all: Vec<&str> = store.iter().map(|t| t.subject.as_str()).collect();
        assert_eq!(all, vec!["a", "b"]);
    }

    #[test]
    fn find_with_wildcards() {
        let mut store = TripleStore::new();
        store.insert("art1", "rdf:type", iri("reg:Article"));
        store.insert("art2", "rdf:type", iri("reg:Article"));
        store.insert("art1", "reg:title", lit("Scope"));

        assert_eq!(store.find(None, Some("rdf:type"), None).len(), 2);
        assert_eq!(store.find(Some("art1"), None, None).len(), 2);
        assert_eq!(
            store
                .find(None, Some("rdf:type"), Some("reg:Article"))
                .len(),
            2
        );
        assert_eq!(store.find(Some("art2"), Some("reg:title"), None).len(), 0);
        assert_eq!(store.find(None, None, None).len(), 3);
    }

    #[test]
    fn find_preserves_insertion_order() {
        let mut store = TripleStore::new();
        for i in 0..10 {
            store.insert(format!("s{i}"), "p", lit("x"));
        }
        let subjects: Vec<&str> = store
            .find(None, Some("p"), None)
            .into_iter()
            .map(|t| t.subject.as_str())
            .collect();
        let expected: Vec<String> = (0..10).map(|i| format!("s{i}")).collect();
        assert_eq!(subjects, expected);
    }

    #[test]
    fn literal_and_iri_with_same_text_are_distinct() {
        let mut store = TripleStore::new();
        assert!(store.insert("s", "p", lit("reg:Article")));
        assert!(store.insert("s", "p", iri("reg:Article")));
        assert_eq!(store.len(), 2);
        // But the object index keys on the raw string, so find sees both.
        assert_eq!(store.find(None, None, Some("reg:Article")).len(), 2);
    }

    #[test]
    fn classify_untagged_objects() {
        assert!(Object::classify("https://regula.dev/GDPR:Art1").is_iri());
        assert!(Object::classify("reg:Article").is_iri());
        assert!(Object::classify("rdf:type").is_iri());
        assert!(!Object::classify("Subject-matter").is_iri());
        assert!(!Object::classify("17").is_iri());
    }

    #[test]
    fn snapshot_round_trip_preserves_order_and_tags() {
        let mut store = TripleStore::new();
        store.insert("art1", "rdf:type", iri("reg:Article"));
        store.insert("art1", "reg:title", lit("Scope"));
        store.insert("art1", "reg:references", iri("https://x.dev/D:Art2"));

        let snapshot = store.to_snapshot().unwrap();
        let restored = TripleStore::from_snapshot(&snapshot).unwrap();

        assert_eq!(restored, store);
        let order: Vec<&str> = restored.iter().map(|t| t.predicate.as_str()).collect();
        assert_eq!(order, vec!["rdf:type", "reg:title", "reg:references"]);
        assert!(restored.iter().nth(1).unwrap().object == lit("Scope"));
    }

    #[test]
    fn merge_is_commutative_on_sets() {
        let mut a = TripleStore::new();
        a.insert("x", "p", lit("1"));
        a.insert("y", "p", lit("2"));
        let mut b = TripleStore::new();
        b.insert("y", "p", lit("2"));
        b.insert("z", "p", lit("3"));

        let mut ab = a.clone();
        ab.merge(&b);
        let mut ba = b.clone();
        ba.merge(&a);

        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 3);
    }

    #[test]
    fn malformed_snapshot_is_an_error() {
        assert!(TripleStore::from_snapshot("{\"not\": \"an array\"}").is_err());
    }
}
