//! Cross-regulation comparison.
//!
//! Takes one triple store per document and computes what the documents share:
//! definitions (by normalised term), rights and obligations (by category),
//! external references (by citation identity), and document pairs that cite
//! each other.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::graph::TripleStore;
use crate::graph::ontology::pred;

/// One shared item and the documents it appears in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedItem {
    pub key: String,
    pub documents: Vec<String>,
}

/// The comparison result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrossRefReport {
    pub documents: Vec<String>,
    pub shared_definitions: Vec<SharedItem>,
    pub shared_rights: Vec<SharedItem>,
    pub shared_obligations: Vec<SharedItem>,
    /// External citations made by two or more documents. Keys are the
    /// citation identity (`directive:95/46`), independent of the citing
    /// document's URI namespace.
    pub external_overlap: Vec<SharedItem>,
    /// Document ID pairs where each cites a provision of the other.
    pub bidirectional: Vec<(String, String)>,
}

/// Compare per-document stores. `base_uri` is the library's provision URI
/// base, used to recognise which document a cited URI belongs to.
pub fn analyze(docs: &[(String, TripleStore)], base_uri: &str) -> CrossRefReport {
    let ids: Vec<String> = docs.iter().map(|(id, _)| id.clone()).collect();

    let shared = |per_doc: Vec<(String, BTreeSet<String>)>| -> Vec<SharedItem> {
        let mut by_key: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (id, keys) in per_doc {
            for key in keys {
                by_key.entry(key).or_default().push(id.clone());
            }
        }
        by_key
            .into_iter()
            .filter(|(_, docs)| docs.len() >= 2)
            .map(|(key, documents)| SharedItem { key, documents })
            .collect()
    };

    let collect = |predicate: &str| -> Vec<(String, BTreeSet<String>)> {
        docs.iter()
            .map(|(id, store)| {
                let keys = store
                    .find(None, Some(predicate), None)
                    .into_iter()
                    .map(|t| t.object.as_str().to_string())
                    .collect();
                (id.clone(), keys)
            })
            .collect()
    };

    let shared_definitions = shared(collect(pred::NORMALIZED_TERM));
    let shared_rights = shared(collect(pred::RIGHT_TYPE));
    let shared_obligations = shared(collect(pred::OBLIGATION_TYPE));

    // External citation identity: the tail after "{base}{doc}/".
    let externals: Vec<(String, BTreeSet<String>)> = docs
        .iter()
        .map(|(id, store)| {
            let own_prefix = format!("{base_uri}{id}/");
            let keys = store
                .find(None, Some(pred::REFERENCES), None)
                .into_iter()
                .filter_map(|t| t.object.as_str().strip_prefix(&own_prefix))
                .map(str::to_string)
                .collect();
            (id.clone(), keys)
        })
        .collect();
    let external_overlap = shared(externals);

    // A cites B when any of A's reference objects sits in B's namespace.
    let cites = |store: &TripleStore, other: &str| -> bool {
        let prefix = format!("{base_uri}{other}:");
        store
            .find(None, Some(pred::REFERENCES), None)
            .into_iter()
            .any(|t| t.object.as_str().starts_with(&prefix))
    };
    let mut bidirectional = Vec::new();
    for (i, (id_a, store_a)) in docs.iter().enumerate() {
        for (id_b, store_b) in docs.iter().skip(i + 1) {
            if cites(store_a, id_b) && cites(store_b, id_a) {
                bidirectional.push((id_a.clone(), id_b.clone()));
            }
        }
    }

    CrossRefReport {
        documents: ids,
        shared_definitions,
        shared_rights,
        shared_obligations,
        external_overlap,
        bidirectional,
    }
}

impl CrossRefReport {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }

    /// Plain-text table for the CLI.
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Documents: {}\n\n", self.documents.join(", ")));

        let section = |title: &str, items: &[SharedItem]| -> String {
            let mut s = format!("{title} ({}):\n", items.len());
            for item in items {
                s.push_str(&format!("  {}  [{}]\n", item.key, item.documents.join(", ")));
            }
            s.push('\n');
            s
        };
        out.push_str(&section("Shared definitions", &self.shared_definitions));
        out.push_str(&section("Shared rights", &self.shared_rights));
        out.push_str(&section("Shared obligations", &self.shared_obligations));
        out.push_str(&section("External overlap", &self.external_overlap));

        out.push_str(&format!("Bidirectional pairs ({}):\n", self.bidirectional.len()));
        for (a, b) in &self.bidirectional {
            out.push_str(&format!("  {a} <-> {b}\n"));
        }
        out
    }

    /// Document-level DOT graph of shared edges.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph crossref {\n  node [shape=box];\n");
        for (a, b) in &self.bidirectional {
            out.push_str(&format!("  \"{a}\" -> \"{b}\" [dir=both];\n"));
        }
        for item in &self.external_overlap {
            for doc in &item.documents {
                out.push_str(&format!("  \"{doc}\" -> \"{}\" [style=dashed];\n", item.key));
            }
        }
        out.push_str("}\n");
        out
    }
}
