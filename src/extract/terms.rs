//! Term-usage mapping.
//!
//! Finds which articles use which defined terms: case-insensitive whole-word
//! match of the normalised form. An article does not "use" a term it defines.
//! Matching is language-agnostic word-boundary matching; no stopword list.

use regex::RegexBuilder;

use crate::extract::{DefinedTerm, TermUsage};
use crate::model::Document;

/// Map term occurrences back to articles.
pub fn extract_usages(document: &Document, terms: &[DefinedTerm]) -> Vec<TermUsage> {
    let matchers: Vec<_> = terms
        .iter()
        .filter_map(|term| {
            let pattern = format!(r"\b{}\b", regex::escape(&term.term));
            RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .ok()
                .map(|re| (term, re))
        })
        .collect();

    let mut usages = Vec::new();
    for article in document.all_articles() {
        for (term, re) in &matchers {
            if term.article == article.number {
                continue;
            }
            if re.is_match(&article.text) || re.is_match(&article.title) {
                usages.push(TermUsage {
                    article: article.number,
                    term: term.term.clone(),
                });
            }
        }
    }

    tracing::debug!(count = usages.len(), "mapped term usages");
    usages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::definitions;
    use crate::parser;
    use crate::patterns::PatternRegistry;

    const TEXT: &str = "\
Article 4
Definitions
(1) 'personal data' means any information relating to a natural person;
(2) 'processing' means any operation performed on personal data;

Article 5
Principles
1. Personal data shall be processed lawfully.

Article 6
Lawfulness
1. Processing shall be lawful only if consented.
";

    #[test]
    fn usages_found_outside_defining_article() {
        let registry = PatternRegistry::builtin();
        let doc = parser::parse(TEXT, &registry).unwrap().document;
        let terms = definitions::extract(&doc, &registry);
        let usages = extract_usages(&doc, &terms);

        assert!(usages.contains(&TermUsage {
            article: 5,
            term: "personal data".into()
        }));
        assert!(usages.contains(&TermUsage {
            article: 6,
            term: "processing".into()
        }));
        // The defining article is not a usage of itself.
        assert!(!usages.iter().any(|u| u.article == 4));
    }

    #[test]
    fn whole_word_only() {
        let registry = PatternRegistry::builtin();
        let text = "\
Article 4
Definitions
(1) 'process' means a series of actions;

Article 5
Scope
1. The processing of data is covered elsewhere.
";
        let doc = parser::parse(text, &registry).unwrap().document;
        let terms = definitions::extract(&doc, &registry);
        let usages = extract_usages(&doc, &terms);
        // "processing" must not count as a use of the term "process".
        assert!(usages.is_empty());
    }

    #[test]
    fn no_terms_no_usages() {
        let registry = PatternRegistry::builtin();
        let doc = parser::parse("Article 1\nScope\n1. Text.\n", &registry)
            .unwrap()
            .document;
        assert!(extract_usages(&doc, &[]).is_empty());
    }
}
