//! Defined-term extraction.
//!
//! Scans articles whose title matches the `definitions_title` pattern and
//! splits their body on numbered definition clauses:
//! `(n) "term" means <definition>;`.

use crate::extract::DefinedTerm;
use crate::model::Document;
use crate::patterns::PatternRegistry;

/// Normalise a term for use as a lookup key: lowercase, whitespace collapsed.
pub fn normalize_term(surface: &str) -> String {
    surface
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extract every defined term from the document's definitions articles.
pub fn extract(document: &Document, registry: &PatternRegistry) -> Vec<DefinedTerm> {
    let Some(title_pat) = registry.get("definitions_title") else {
        return Vec::new();
    };
    let Some(clause_pat) = registry.get("definition_clause") else {
        return Vec::new();
    };

    let mut terms = Vec::new();

    for article in document.all_articles() {
        if !title_pat.regex.is_match(&article.title) {
            continue;
        }

        // Clause starts partition the article body; each definition runs from
        // the end of its own clause marker to the start of the next.
        let matches: Vec<_> = clause_pat.regex.captures_iter(&article.text).collect();
        for (i, caps) in matches.iter().enumerate() {
            let surface = caps[2].trim().to_string();
            if surface.is_empty() {
                continue;
            }

            let start = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let end = matches
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(article.text.len());
            let definition = article.text[start..end]
                .trim()
                .trim_end_matches(';')
                .trim()
                .to_string();

            terms.push(DefinedTerm {
                term: normalize_term(&surface),
                surface,
                definition,
                article: article.number,
            });
        }
    }

    tracing::debug!(count = terms.len(), "extracted definitions");
    terms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    const DEFINITIONS: &str = "\
Article 4
Definitions
For the purposes of this Regulation:
(1) 'personal data' means any information relating to an identified or identifiable natural person;
(2) 'processing' means any operation or set of operations which is performed on personal data;
(3) 'controller' means the natural or legal person which determines the purposes and means;
";

    fn doc(text: &str) -> Document {
        parser::parse(text, &PatternRegistry::builtin())
            .unwrap()
            .document
    }

    #[test]
    fn extracts_numbered_clauses() {
        let registry = PatternRegistry::builtin();
        let terms = extract(&doc(DEFINITIONS), &registry);

        assert_eq!(terms.len(), 3);
        assert_eq!(terms[0].term, "personal data");
        assert_eq!(terms[0].article, 4);
        assert!(terms[0].definition.starts_with("any information"));
        assert!(!terms[0].definition.ends_with(';'));
        assert_eq!(terms[1].term, "processing");
        assert_eq!(terms[2].surface, "controller");
    }

    #[test]
    fn curly_quotes_accepted() {
        let text = "\
Article 4
Definitions
(1) \u{2018}personal data\u{2019} means any information;
";
        let registry = PatternRegistry::builtin();
        let terms = extract(&doc(text), &registry);
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].term, "personal data");
    }

    #[test]
    fn non_definition_articles_skipped() {
        let text = "\
Article 5
Principles
(1) 'shadow term' means nothing, this is not a definitions article;
";
        let registry = PatternRegistry::builtin();
        assert!(extract(&doc(text), &registry).is_empty());
    }

    #[test]
    fn normalisation_collapses_whitespace() {
        assert_eq!(normalize_term("Personal   Data"), "personal data");
        assert_eq!(normalize_term("  Supervisory\tAuthority "), "supervisory authority");
    }

    #[test]
    fn deterministic() {
        let registry = PatternRegistry::builtin();
        let d = doc(DEFINITIONS);
        assert_eq!(extract(&d, &registry), extract(&d, &registry));
    }
}
