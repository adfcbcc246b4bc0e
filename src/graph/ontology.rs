//! The fixed vocabulary of the regulation graph.
//!
//! Predicates and classes are stored as CURIEs (`reg:title`, `rdf:type`);
//! provision URIs are absolute. The prefix table here drives CURIE expansion
//! for N-Triples/RDF-XML output and compression on the way back in.

/// Prefix → namespace IRI, in emission order.
pub const KNOWN_PREFIXES: &[(&str, &str)] = &[
    ("reg", "https://regula.dev/ontology#"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("prov", "http://www.w3.org/ns/prov#"),
    ("eli", "http://data.europa.eu/eli/ontology#"),
];

/// Predicates emitted by the graph builder.
pub mod pred {
    pub const TYPE: &str = "rdf:type";
    pub const LABEL: &str = "rdfs:label";

    pub const TITLE: &str = "reg:title";
    pub const NUMBER: &str = "reg:number";
    pub const TEXT: &str = "reg:text";
    pub const CONTAINS: &str = "reg:contains";
    pub const PART_OF: &str = "reg:partOf";

    pub const REFERENCES: &str = "reg:references";
    pub const REFERENCED_BY: &str = "reg:referencedBy";

    pub const TERM: &str = "reg:term";
    pub const NORMALIZED_TERM: &str = "reg:normalizedTerm";
    pub const DEFINITION: &str = "reg:definition";
    pub const DEFINED_IN: &str = "reg:definedIn";
    pub const USES_TERM: &str = "reg:usesTerm";

    pub const GRANTS_RIGHT: &str = "reg:grantsRight";
    pub const IMPOSES_OBLIGATION: &str = "reg:imposesObligation";
    pub const RIGHT_TYPE: &str = "reg:rightType";
    pub const OBLIGATION_TYPE: &str = "reg:obligationType";
    pub const BENEFICIARY: &str = "reg:beneficiary";
    pub const ACTOR: &str = "reg:actor";

    pub const DERIVED_FROM: &str = "prov:wasDerivedFrom";

    pub const ELI_TYPE_DOCUMENT: &str = "eli:type_document";
    pub const ELI_TITLE: &str = "eli:title";
    pub const ELI_IS_PART_OF: &str = "eli:is_part_of";
}

/// Classes emitted by the graph builder.
pub mod class {
    pub const REGULATION: &str = "reg:Regulation";
    pub const DIRECTIVE: &str = "reg:Directive";
    pub const DECISION: &str = "reg:Decision";
    pub const LEGAL_DOCUMENT: &str = "reg:LegalDocument";
    pub const CHAPTER: &str = "reg:Chapter";
    pub const SECTION: &str = "reg:Section";
    pub const ARTICLE: &str = "reg:Article";
    pub const PARAGRAPH: &str = "reg:Paragraph";
    pub const POINT: &str = "reg:Point";
    pub const RECITAL: &str = "reg:Recital";
    pub const DEFINITION: &str = "reg:Definition";
    pub const RIGHT: &str = "reg:Right";
    pub const OBLIGATION: &str = "reg:Obligation";

    pub const ELI_LEGAL_RESOURCE: &str = "eli:LegalResource";
}

/// Expand a CURIE of a known prefix to its full IRI. Absolute IRIs pass
/// through unchanged; unknown prefixes return the input unchanged.
pub fn expand(curie_or_iri: &str) -> String {
    if curie_or_iri.contains("://") {
        return curie_or_iri.to_string();
    }
    for (prefix, ns) in KNOWN_PREFIXES {
        if let Some(local) = curie_or_iri.strip_prefix(&format!("{prefix}:")) {
            return format!("{ns}{local}");
        }
    }
    curie_or_iri.to_string()
}

/// Compress a full IRI back to a CURIE when it sits in a known namespace.
pub fn compress(iri: &str) -> String {
    for (prefix, ns) in KNOWN_PREFIXES {
        if let Some(local) = iri.strip_prefix(ns) {
            return format!("{prefix}:{local}");
        }
    }
    iri.to_string()
}

/// Whether a string is a CURIE of a known vocabulary prefix.
pub fn is_known_curie(s: &str) -> bool {
    KNOWN_PREFIXES
        .iter()
        .any(|(p, _)| s.starts_with(&format!("{p}:")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_and_compress_round_trip() {
        for curie in [pred::TYPE, pred::TITLE, class::ARTICLE, pred::ELI_TITLE] {
            let iri = expand(curie);
            assert!(iri.contains("://"), "{curie} did not expand");
            assert_eq!(compress(&iri), curie);
        }
    }

    #[test]
    fn absolute_iris_pass_through() {
        let uri = "https://regula.dev/GDPR:Art1";
        assert_eq!(expand(uri), uri);
        assert_eq!(compress(uri), uri);
    }

    #[test]
    fn curie_detection() {
        assert!(is_known_curie("reg:title"));
        assert!(is_known_curie("rdf:type"));
        assert!(!is_known_curie("foaf:knows"));
        assert!(!is_known_curie("plain text"));
    }
}
