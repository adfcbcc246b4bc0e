//! Read-only serialisers over the triple store.
//!
//! Turtle, N-Triples (with a parser for the round-trip), JSON-LD (compact or
//! expanded), RDF/XML, a plain JSON triple list, a DOT relationship subgraph,
//! and a summary structure with relationship counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::GraphError;
use crate::graph::ontology::{self, KNOWN_PREFIXES, pred};
use crate::graph::{GraphResult, Object, Triple, TripleStore};

/// Output formats for the `export` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Dot,
    Turtle,
    JsonLd,
    RdfXml,
    Summary,
}

impl ExportFormat {
    pub fn from_flag(s: &str) -> Option<Self> {
        Some(match s.to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "dot" => Self::Dot,
            "turtle" | "ttl" => Self::Turtle,
            "jsonld" | "json-ld" => Self::JsonLd,
            "rdfxml" | "rdf-xml" | "xml" => Self::RdfXml,
            "summary" => Self::Summary,
            _ => return None,
        })
    }
}

/// Render the store in the requested format.
pub fn export(store: &TripleStore, format: ExportFormat) -> GraphResult<String> {
    Ok(match format {
        ExportFormat::Json => to_json(store)?,
        ExportFormat::Dot => to_dot(store),
        ExportFormat::Turtle => to_turtle(store),
        ExportFormat::JsonLd => to_jsonld(store, true)?,
        ExportFormat::RdfXml => to_rdfxml(store),
        ExportFormat::Summary => {
            let summary = GraphSummary::from_store(store);
            serde_json::to_string_pretty(&summary).map_err(|e| GraphError::Serialize {
                format: "summary".into(),
                message: e.to_string(),
            })?
        }
    })
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

fn unescape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Render a resource for Turtle: CURIEs bare, absolute IRIs in angle brackets.
fn turtle_resource(s: &str) -> String {
    if ontology::is_known_curie(s) {
        s.to_string()
    } else {
        format!("<{s}>")
    }
}

/// Serialise as Turtle with prefix declarations, grouping consecutive
/// triples that share a subject.
pub fn to_turtle(store: &TripleStore) -> String {
    let mut out = String::new();
    for (prefix, ns) in KNOWN_PREFIXES {
        out.push_str(&format!("@prefix {prefix}: <{ns}> .\n"));
    }
    out.push('\n');

    let mut current_subject: Option<&str> = None;
    for triple in store.iter() {
        let object = match &triple.object {
            Object::Iri(iri) => turtle_resource(iri),
            Object::Literal(lit) => format!("\"{}\"", escape_literal(lit)),
        };
        if current_subject == Some(triple.subject.as_str()) {
            out.push_str(&format!(" ;\n    {} {object}", triple.predicate));
        } else {
            if current_subject.is_some() {
                out.push_str(" .\n");
            }
            out.push_str(&format!(
                "{} {} {object}",
                turtle_resource(&triple.subject),
                triple.predicate
            ));
            current_subject = Some(triple.subject.as_str());
        }
    }
    if current_subject.is_some() {
        out.push_str(" .\n");
    }
    out
}

/// Serialise as N-Triples with all CURIEs expanded to absolute IRIs.
pub fn to_ntriples(store: &TripleStore) -> String {
    let mut out = String::new();
    for triple in store.iter() {
        let object = match &triple.object {
            Object::Iri(iri) => format!("<{}>", ontology::expand(iri)),
            Object::Literal(lit) => format!("\"{}\"", escape_literal(lit)),
        };
        out.push_str(&format!(
            "<{}> <{}> {object} .\n",
            ontology::expand(&triple.subject),
            ontology::expand(&triple.predicate)
        ));
    }
    out
}

/// Parse N-Triples back into a store, compressing known namespaces to CURIEs.
pub fn parse_ntriples(text: &str) -> GraphResult<TripleStore> {
    let mut store = TripleStore::new();

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line_no = idx + 1;
        let bad = |message: &str| GraphError::NTriples {
            line: line_no,
            message: message.to_string(),
        };

        let rest = line.strip_suffix('.').ok_or_else(|| bad("missing trailing dot"))?;
        let rest = rest.trim_end();

        let (subject, rest) = take_iri(rest).ok_or_else(|| bad("expected subject IRI"))?;
        let rest = rest.trim_start();
        let (predicate, rest) = take_iri(rest).ok_or_else(|| bad("expected predicate IRI"))?;
        let rest = rest.trim_start();

        let object = if rest.starts_with('<') {
            let (iri, tail) = take_iri(rest).ok_or_else(|| bad("unterminated object IRI"))?;
            if !tail.trim().is_empty() {
                return Err(bad("trailing content after object"));
            }
            Object::Iri(ontology::compress(&iri))
        } else if let Some(stripped) = rest.strip_prefix('"') {
            let end = find_closing_quote(stripped).ok_or_else(|| bad("unterminated literal"))?;
            let (lit, tail) = stripped.split_at(end);
            if !tail[1..].trim().is_empty() {
                return Err(bad("trailing content after literal"));
            }
            Object::Literal(unescape_literal(lit))
        } else {
            return Err(bad("expected IRI or literal object"));
        };

        store.insert(
            ontology::compress(&subject),
            ontology::compress(&predicate),
            object,
        );
    }
    Ok(store)
}

fn take_iri(s: &str) -> Option<(String, &str)> {
    let rest = s.strip_prefix('<')?;
    let end = rest.find('>')?;
    Some((rest[..end].to_string(), &rest[end + 1..]))
}

/// Index of the closing unescaped quote.
fn find_closing_quote(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'"' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// Serialise as JSON-LD. Compact keeps CURIEs and carries a `@context`;
/// expanded uses full IRIs throughout.
pub fn to_jsonld(store: &TripleStore, compact: bool) -> GraphResult<String> {
    // Group triples by subject, preserving first-seen subject order.
    let mut subjects: Vec<&str> = Vec::new();
    let mut grouped: BTreeMap<&str, Vec<&Triple>> = BTreeMap::new();
    for triple in store.iter() {
        if !grouped.contains_key(triple.subject.as_str()) {
            subjects.push(&triple.subject);
        }
        grouped.entry(&triple.subject).or_default().push(triple);
    }

    let name = |s: &str| -> String {
        if compact {
            s.to_string()
        } else {
            ontology::expand(s)
        }
    };

    let mut graph = Vec::new();
    for subject in subjects {
        let mut node = Map::new();
        node.insert("@id".into(), Value::String(name(subject)));
        for triple in &grouped[subject] {
            let value = match &triple.object {
                Object::Iri(iri) => json!({ "@id": name(iri) }),
                Object::Literal(lit) => {
                    if compact {
                        Value::String(lit.clone())
                    } else {
                        json!({ "@value": lit })
                    }
                }
            };
            let key = name(&triple.predicate);
            match node.get_mut(&key) {
                None => {
                    node.insert(key, value);
                }
                Some(Value::Array(values)) => values.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            }
        }
        graph.push(Value::Object(node));
    }

    let doc = if compact {
        let context: Map<String, Value> = KNOWN_PREFIXES
            .iter()
            .map(|(p, ns)| (p.to_string(), Value::String(ns.to_string())))
            .collect();
        json!({ "@context": context, "@graph": graph })
    } else {
        Value::Array(graph)
    };

    serde_json::to_string_pretty(&doc).map_err(|e| GraphError::Serialize {
        format: "jsonld".into(),
        message: e.to_string(),
    })
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Serialise as RDF/XML. Predicates are emitted as namespaced elements;
/// all builder predicates are CURIEs of the known vocabularies.
pub fn to_rdfxml(store: &TripleStore) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rdf:RDF");
    for (prefix, ns) in KNOWN_PREFIXES {
        out.push_str(&format!("\n    xmlns:{prefix}=\"{ns}\""));
    }
    out.push_str(">\n");

    let mut current_subject: Option<&str> = None;
    for triple in store.iter() {
        if current_subject != Some(triple.subject.as_str()) {
            if current_subject.is_some() {
                out.push_str("  </rdf:Description>\n");
            }
            out.push_str(&format!(
                "  <rdf:Description rdf:about=\"{}\">\n",
                escape_xml(&ontology::expand(&triple.subject))
            ));
            current_subject = Some(triple.subject.as_str());
        }
        let element = if ontology::is_known_curie(&triple.predicate) {
            triple.predicate.clone()
        } else {
            // A raw-IRI predicate has no QName; label it generically.
            "rdfs:seeAlso".to_string()
        };
        match &triple.object {
            Object::Iri(iri) => out.push_str(&format!(
                "    <{element} rdf:resource=\"{}\"/>\n",
                escape_xml(&ontology::expand(iri))
            )),
            Object::Literal(lit) => out.push_str(&format!(
                "    <{element}>{}</{element}>\n",
                escape_xml(lit)
            )),
        }
    }
    if current_subject.is_some() {
        out.push_str("  </rdf:Description>\n");
    }
    out.push_str("</rdf:RDF>\n");
    out
}

/// Serialise as a plain JSON triple list (same shape as the snapshot format,
/// in insertion order).
pub fn to_json(store: &TripleStore) -> GraphResult<String> {
    let records: Vec<Value> = store
        .iter()
        .map(|t| {
            json!({
                "subject": t.subject,
                "predicate": t.predicate,
                "object": t.object.as_str(),
            })
        })
        .collect();
    serde_json::to_string_pretty(&records).map_err(|e| GraphError::Serialize {
        format: "json".into(),
        message: e.to_string(),
    })
}

/// Predicates that show up in the DOT relationship subgraph and the summary.
const RELATIONSHIP_PREDICATES: &[&str] = &[
    pred::REFERENCES,
    pred::PART_OF,
    pred::CONTAINS,
    pred::USES_TERM,
    pred::GRANTS_RIGHT,
    pred::IMPOSES_OBLIGATION,
];

/// Shorten a provision URI for display: strip everything up to the last '/'.
fn short(uri: &str) -> &str {
    uri.rsplit('/').next().unwrap_or(uri)
}

/// Serialise the relationship subgraph as GraphViz DOT.
pub fn to_dot(store: &TripleStore) -> String {
    let mut out = String::from("digraph regulation {\n  rankdir=LR;\n  node [shape=box, fontsize=10];\n");
    for triple in store.iter() {
        if !RELATIONSHIP_PREDICATES.contains(&triple.predicate.as_str()) {
            continue;
        }
        let label = triple.predicate.split(':').next_back().unwrap_or("");
        out.push_str(&format!(
            "  \"{}\" -> \"{}\" [label=\"{label}\"];\n",
            short(&triple.subject),
            short(triple.object.as_str())
        ));
    }
    out.push_str("}\n");
    out
}

/// Aggregate view of the graph for the `export --format summary` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSummary {
    pub triples: usize,
    /// Counts per relationship predicate.
    pub relationships: BTreeMap<String, usize>,
    /// Most-cited provisions: (uri, incoming reference count), top five.
    pub most_referenced: Vec<(String, usize)>,
    /// Most-citing provisions: (uri, outgoing reference count), top five.
    pub most_referencing: Vec<(String, usize)>,
}

impl GraphSummary {
    pub fn from_store(store: &TripleStore) -> Self {
        let mut relationships: BTreeMap<String, usize> = BTreeMap::new();
        let mut incoming: BTreeMap<String, usize> = BTreeMap::new();
        let mut outgoing: BTreeMap<String, usize> = BTreeMap::new();

        for triple in store.iter() {
            if RELATIONSHIP_PREDICATES.contains(&triple.predicate.as_str()) {
                *relationships.entry(triple.predicate.clone()).or_default() += 1;
            }
            if triple.predicate == pred::REFERENCES {
                *incoming.entry(triple.object.as_str().to_string()).or_default() += 1;
                *outgoing.entry(triple.subject.clone()).or_default() += 1;
            }
        }

        let top = |map: BTreeMap<String, usize>| -> Vec<(String, usize)> {
            let mut entries: Vec<(String, usize)> = map.into_iter().collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            entries.truncate(5);
            entries
        };

        Self {
            triples: store.len(),
            relationships,
            most_referenced: top(incoming),
            most_referencing: top(outgoing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TripleStore {
        let mut store = TripleStore::new();
        store.insert(
            "https://regula.dev/GDPR:Art1",
            pred::TYPE,
            Object::Iri("reg:Article".into()),
        );
        store.insert(
            "https://regula.dev/GDPR:Art1",
            pred::TITLE,
            Object::Literal("Subject-matter".into()),
        );
        store.insert(
            "https://regula.dev/GDPR:Art1",
            pred::REFERENCES,
            Object::Iri("https://regula.dev/GDPR:Art2".into()),
        );
        store.insert(
            "https://regula.dev/GDPR:Art2",
            pred::REFERENCES,
            Object::Iri("https://regula.dev/GDPR:Art1".into()),
        );
        store
    }

    #[test]
    fn turtle_has_prefixes_and_groups_subjects() {
        let ttl = to_turtle(&sample());
        assert!(ttl.starts_with("@prefix reg: <https://regula.dev/ontology#> ."));
        assert!(ttl.contains("<https://regula.dev/GDPR:Art1> rdf:type reg:Article ;"));
        assert!(ttl.contains("reg:title \"Subject-matter\""));
    }

    #[test]
    fn ntriples_round_trip_is_set_equal() {
        let store = sample();
        let nt = to_ntriples(&store);
        assert!(nt.contains("<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>"));
        let back = parse_ntriples(&nt).unwrap();
        assert_eq!(back, store);
    }

    #[test]
    fn ntriples_literal_escaping_round_trips() {
        let mut store = TripleStore::new();
        store.insert(
            "https://x.dev/a",
            pred::TEXT,
            Object::Literal("line one\nwith \"quotes\" and \\slash".into()),
        );
        let back = parse_ntriples(&to_ntriples(&store)).unwrap();
        assert_eq!(back, store);
    }

    #[test]
    fn malformed_ntriples_rejected() {
        assert!(parse_ntriples("<a> <b> no-object .").is_err());
        assert!(parse_ntriples("<a> <b> <c>").is_err());
        // Comments and blanks are fine.
        assert!(parse_ntriples("# comment\n\n").unwrap().is_empty());
    }

    #[test]
    fn jsonld_compact_has_context() {
        let doc: Value = serde_json::from_str(&to_jsonld(&sample(), true).unwrap()).unwrap();
        assert!(doc["@context"]["reg"].is_string());
        let graph = doc["@graph"].as_array().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph[0]["@id"], "https://regula.dev/GDPR:Art1");
        assert_eq!(graph[0]["reg:title"], "Subject-matter");
        assert_eq!(graph[0]["rdf:type"]["@id"], "reg:Article");
    }

    #[test]
    fn jsonld_expanded_uses_full_iris() {
        let doc: Value = serde_json::from_str(&to_jsonld(&sample(), false).unwrap()).unwrap();
        let nodes = doc.as_array().unwrap();
        assert!(nodes[0]
            .get("http://www.w3.org/1999/02/22-rdf-syntax-ns#type")
            .is_some());
    }

    #[test]
    fn rdfxml_wellformedness_basics() {
        let xml = to_rdfxml(&sample());
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("rdf:about=\"https://regula.dev/GDPR:Art1\""));
        assert!(xml.contains("<reg:title>Subject-matter</reg:title>"));
        assert_eq!(xml.matches("<rdf:Description").count(), xml.matches("</rdf:Description>").count());
    }

    #[test]
    fn dot_contains_reference_edges_only_for_relationships() {
        let dot = to_dot(&sample());
        assert!(dot.contains("\"GDPR:Art1\" -> \"GDPR:Art2\" [label=\"references\"]"));
        assert!(!dot.contains("Subject-matter"));
    }

    #[test]
    fn summary_counts() {
        let summary = GraphSummary::from_store(&sample());
        assert_eq!(summary.triples, 4);
        assert_eq!(summary.relationships.get(pred::REFERENCES), Some(&2));
        assert_eq!(summary.most_referenced.len(), 2);
        assert_eq!(summary.most_referenced[0].1, 1);
    }

    #[test]
    fn export_format_flags() {
        assert_eq!(ExportFormat::from_flag("turtle"), Some(ExportFormat::Turtle));
        assert_eq!(ExportFormat::from_flag("JSONLD"), Some(ExportFormat::JsonLd));
        assert_eq!(ExportFormat::from_flag("bogus"), None);
    }
}
