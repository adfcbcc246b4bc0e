//! Impact analysis: what a provision touches, and what touches it.
//!
//! BFS over `reg:references` edges from a starting provision, tracking depth.
//! Depth 1 hits are direct; deeper hits are transitive. Edge selection is
//! purely predicate equality; the analyser never looks at structural edges.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::analysis::ReferenceGraph;
use crate::graph::TripleStore;

/// Which way to walk the reference edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactDirection {
    /// Provisions that cite the target (followers of inverse edges).
    Incoming,
    /// Provisions the target cites.
    Outgoing,
    Both,
}

impl ImpactDirection {
    pub fn from_flag(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "incoming" | "in" => Self::Incoming,
            "outgoing" | "out" => Self::Outgoing,
            "both" => Self::Both,
            _ => return None,
        })
    }
}

/// One provision reached by the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactHit {
    pub uri: String,
    pub depth: usize,
}

/// The analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactResult {
    pub provision: String,
    pub direction: ImpactDirection,
    pub depth: usize,
    /// Depth-1 hits.
    pub direct: Vec<String>,
    /// Hits at depth 2 and beyond.
    pub transitive: Vec<ImpactHit>,
    /// Number of provisions first reached at each depth.
    pub layer_counts: BTreeMap<usize, usize>,
}

impl ImpactResult {
    pub fn total_reached(&self) -> usize {
        self.direct.len() + self.transitive.len()
    }
}

/// Walk the reference graph from `provision` up to `depth` hops.
///
/// Depth 0 returns only the provision itself (empty direct and transitive
/// sets). Cycles are handled by a visited set; each provision is reported at
/// its first (shallowest) depth.
pub fn analyze(
    store: &TripleStore,
    provision: &str,
    depth: usize,
    direction: ImpactDirection,
) -> ImpactResult {
    let graph = ReferenceGraph::from_store(store);

    let mut result = ImpactResult {
        provision: provision.to_string(),
        direction,
        depth,
        direct: Vec::new(),
        transitive: Vec::new(),
        layer_counts: BTreeMap::new(),
    };
    if depth == 0 {
        return result;
    }

    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(provision.to_string());
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();
    queue.push_back((provision.to_string(), 0));

    while let Some((uri, at)) = queue.pop_front() {
        if at >= depth {
            continue;
        }
        let mut next: Vec<&str> = Vec::new();
        match direction {
            ImpactDirection::Outgoing => next.extend(graph.neighbors(&uri, false)),
            ImpactDirection::Incoming => next.extend(graph.neighbors(&uri, true)),
            ImpactDirection::Both => {
                next.extend(graph.neighbors(&uri, false));
                next.extend(graph.neighbors(&uri, true));
            }
        }

        for neighbor in next {
            if !visited.insert(neighbor.to_string()) {
                continue;
            }
            let reached_at = at + 1;
            *result.layer_counts.entry(reached_at).or_default() += 1;
            if reached_at == 1 {
                result.direct.push(neighbor.to_string());
            } else {
                result.transitive.push(ImpactHit {
                    uri: neighbor.to_string(),
                    depth: reached_at,
                });
            }
            queue.push_back((neighbor.to_string(), reached_at));
        }
    }

    tracing::debug!(
        provision,
        reached = result.total_reached(),
        "impact analysis complete"
    );
    result
}
