//! Citation extraction.
//!
//! Applies an ordered list of reference patterns to each article body. Earlier
//! patterns claim their text span; later matches overlapping a claimed span
//! are dropped, so `Articles 13 to 15` is a range, not a range plus a stray
//! `Article 13`.

use std::ops::Range;

use crate::extract::{ExternalKind, RefTarget, Reference};
use crate::model::Document;
use crate::patterns::PatternRegistry;

/// Pattern application order. Position decides span-claim priority.
const PATTERN_ORDER: &[&str] = &[
    "reference_external",
    "reference_treaty",
    "reference_article_range",
    "reference_article",
    "reference_point",
    "reference_paragraph",
    "reference_chapter",
    "reference_section",
    "reference_recital",
];

/// Extract every citation from every article, in document order.
pub fn extract(document: &Document, registry: &PatternRegistry) -> Vec<Reference> {
    let mut references = Vec::new();

    for article in document.all_articles() {
        let mut claimed: Vec<Range<usize>> = Vec::new();
        let mut found: Vec<(usize, Reference)> = Vec::new();

        for name in PATTERN_ORDER {
            let Some(pattern) = registry.get(name) else {
                continue;
            };
            for caps in pattern.regex.captures_iter(&article.text) {
                let whole = caps.get(0).expect("group 0 always present");
                let span = whole.range();
                if claimed.iter().any(|c| c.start < span.end && span.start < c.end) {
                    continue;
                }
                let Some(target) = build_target(name, &caps) else {
                    continue;
                };
                claimed.push(span.clone());
                found.push((
                    span.start,
                    Reference {
                        target,
                        source_article: article.number,
                        raw: whole.as_str().to_string(),
                    },
                ));
            }
        }

        // Document order within the article, regardless of pattern order.
        found.sort_by_key(|(start, _)| *start);
        references.extend(found.into_iter().map(|(_, r)| r));
    }

    tracing::debug!(count = references.len(), "extracted references");
    references
}

fn build_target(pattern: &str, caps: &regex::Captures<'_>) -> Option<RefTarget> {
    let num = |i: usize| -> Option<u32> { caps.get(i).and_then(|m| m.as_str().parse().ok()) };

    match pattern {
        "reference_external" => {
            let kind = match &caps[1] {
                "Directive" => ExternalKind::Directive,
                "Regulation" => ExternalKind::Regulation,
                "Decision" => ExternalKind::Decision,
                _ => return None,
            };
            let first = num(2)?;
            let second = num(3)?;
            // The four-digit component is the year: "Directive 95/46" vs
            // "Regulation (EU) 2016/679" vs "Regulation (EC) No 45/2001".
            let (year, number) = if caps[3].len() == 4 {
                (second, first)
            } else {
                (first, second)
            };
            Some(RefTarget::External { kind, year, number })
        }
        "reference_treaty" => Some(RefTarget::External {
            kind: ExternalKind::Treaty,
            year: 0,
            number: 0,
        }),
        "reference_article_range" => {
            let start = num(1)?;
            let end = num(2)?;
            Some(RefTarget::Article {
                number: start,
                paragraph: None,
                point: None,
                range_end: Some(end),
            })
        }
        "reference_article" => Some(RefTarget::Article {
            number: num(1)?,
            paragraph: num(2),
            point: caps.get(3).map(|m| m.as_str().to_string()),
            range_end: None,
        }),
        "reference_point" => Some(RefTarget::Point {
            letter: caps[1].to_string(),
            paragraph: num(2).unwrap_or(0),
            article: num(3).unwrap_or(0),
        }),
        "reference_paragraph" => Some(RefTarget::Paragraph {
            number: num(1)?,
            article: num(2).unwrap_or(0),
        }),
        "reference_chapter" => Some(RefTarget::Chapter {
            key: crate::model::chapter_key(&caps[1]),
        }),
        "reference_section" => Some(RefTarget::Section { number: num(1)? }),
        "reference_recital" => Some(RefTarget::Recital { number: num(1)? }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn refs(text: &str) -> Vec<Reference> {
        let registry = PatternRegistry::builtin();
        let doc = parser::parse(text, &registry).unwrap().document;
        extract(&doc, &registry)
    }

    #[test]
    fn simple_article_reference() {
        let out = refs("Article 5\nScope\n1. Subject to Article 17, processing is allowed.\n");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_article, 5);
        assert_eq!(
            out[0].target,
            RefTarget::Article {
                number: 17,
                paragraph: None,
                point: None,
                range_end: None
            }
        );
        assert_eq!(out[0].raw, "Article 17");
    }

    #[test]
    fn article_with_paragraph_and_point() {
        let out = refs("Article 5\nScope\n1. As referred to in Article 6(1)(a) above.\n");
        assert_eq!(
            out[0].target,
            RefTarget::Article {
                number: 6,
                paragraph: Some(1),
                point: Some("a".into()),
                range_end: None
            }
        );
    }

    #[test]
    fn range_claims_span() {
        let out = refs("Article 5\nScope\n1. Pursuant to Articles 13 to 15 of this Regulation.\n");
        assert_eq!(out.len(), 1);
        assert_eq!(
            out[0].target,
            RefTarget::Article {
                number: 13,
                paragraph: None,
                point: None,
                range_end: Some(15)
            }
        );
    }

    #[test]
    fn relative_paragraph() {
        let out = refs("Article 5\nScope\n1. Without prejudice to paragraph 2 of this Article.\n");
        assert_eq!(
            out[0].target,
            RefTarget::Paragraph {
                article: 0,
                number: 2
            }
        );
        assert_eq!(out[0].source_article, 5);
    }

    #[test]
    fn external_directive_and_regulation() {
        let out = refs(
            "Article 94\nRepeal\n1. Directive 95/46/EC is repealed. References to Regulation (EU) 2016/679 shall apply.\n",
        );
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[0].target,
            RefTarget::External {
                kind: ExternalKind::Directive,
                year: 95,
                number: 46
            }
        );
        assert_eq!(
            out[1].target,
            RefTarget::External {
                kind: ExternalKind::Regulation,
                year: 2016,
                number: 679
            }
        );
    }

    #[test]
    fn chapter_and_section_references() {
        let out = refs("Article 5\nScope\n1. As set out in Chapter III and Section 2 thereof.\n");
        assert!(out.contains(&Reference {
            target: RefTarget::Chapter { key: "III".into() },
            source_article: 5,
            raw: "Chapter III".into()
        }));
        assert!(out
            .iter()
            .any(|r| r.target == RefTarget::Section { number: 2 }));
    }

    #[test]
    fn references_kept_in_document_order() {
        let out = refs("Article 5\nScope\n1. See paragraph 3, then Article 9, then Chapter II.\n");
        let order: Vec<usize> = out
            .iter()
            .map(|r| match &r.target {
                RefTarget::Paragraph { .. } => 0,
                RefTarget::Article { .. } => 1,
                RefTarget::Chapter { .. } => 2,
                _ => 9,
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn empty_document_yields_no_references() {
        assert!(refs("").is_empty());
    }
}
