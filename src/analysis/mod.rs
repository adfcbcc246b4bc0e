//! Analyses over built graphs: impact, cross-regulation comparison, and
//! scenario matching.

pub mod crossref;
pub mod impact;
pub mod scenario;

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction as PetDirection;

use crate::graph::TripleStore;
use crate::graph::ontology::pred;

/// A directed graph of `reg:references` edges, the shared substrate for the
/// impact and cross-reference analysers.
pub struct ReferenceGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
}

impl ReferenceGraph {
    /// Build from every `reg:references` triple of a store.
    pub fn from_store(store: &TripleStore) -> Self {
        let mut graph = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();

        let node = |graph: &mut DiGraph<String, ()>,
                    index: &mut HashMap<String, NodeIndex>,
                    uri: &str| {
            if let Some(idx) = index.get(uri) {
                *idx
            } else {
                let idx = graph.add_node(uri.to_string());
                index.insert(uri.to_string(), idx);
                idx
            }
        };

        for triple in store.find(None, Some(pred::REFERENCES), None) {
            let from = node(&mut graph, &mut index, &triple.subject);
            let to = node(&mut graph, &mut index, triple.object.as_str());
            graph.update_edge(from, to, ());
        }

        Self { graph, index }
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.index.contains_key(uri)
    }

    /// Outgoing or incoming neighbours of a node, in insertion order.
    pub fn neighbors(&self, uri: &str, incoming: bool) -> Vec<&str> {
        let Some(&idx) = self.index.get(uri) else {
            return Vec::new();
        };
        let direction = if incoming {
            PetDirection::Incoming
        } else {
            PetDirection::Outgoing
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).map(String::as_str))
            .collect();
        // petgraph yields neighbours newest-edge-first; reverse for a stable
        // insertion-order walk.
        out.reverse();
        out
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Object;

    fn store() -> TripleStore {
        let mut s = TripleStore::new();
        s.insert("a", pred::REFERENCES, Object::Iri("b".into()));
        s.insert("a", pred::REFERENCES, Object::Iri("c".into()));
        s.insert("b", pred::REFERENCES, Object::Iri("c".into()));
        s.insert("a", pred::TITLE, Object::Literal("not an edge".into()));
        s
    }

    #[test]
    fn builds_only_reference_edges() {
        let g = ReferenceGraph::from_store(&store());
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 3);
    }

    #[test]
    fn neighbors_both_directions() {
        let g = ReferenceGraph::from_store(&store());
        assert_eq!(g.neighbors("a", false), vec!["b", "c"]);
        assert_eq!(g.neighbors("c", true), vec!["a", "b"]);
        assert!(g.neighbors("zzz", false).is_empty());
    }
}
