//! Reference resolution: free-text citations to graph URIs.
//!
//! The resolver first indexes the document's coordinates (articles, chapters,
//! sections, paragraphs, points, recitals), then maps each extracted
//! [`Reference`] to a [`ResolvedReference`] with a status, a confidence, and
//! the canonical target URI. Resolution is deterministic for a fixed index,
//! including the ordering of alternatives on ambiguity.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::extract::{ExternalKind, RefTarget, Reference};
use crate::model::{Document, chapter_order};

/// Builds the canonical URIs for one document under a base URI.
///
/// `https://regula.dev/GDPR:Art17(1)(a)`, `...:ChapterIII:Section2`,
/// `...:Recital(26)`, external `https://regula.dev/GDPR/directive:1995/46`.
#[derive(Debug, Clone)]
pub struct UriScheme {
    pub base: String,
    pub doc_id: String,
}

impl UriScheme {
    pub fn new(base: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            doc_id: doc_id.into(),
        }
    }

    pub fn document(&self) -> String {
        format!("{}{}", self.base, self.doc_id)
    }

    pub fn article(&self, n: u32) -> String {
        format!("{}{}:Art{n}", self.base, self.doc_id)
    }

    pub fn paragraph(&self, article: u32, paragraph: u32) -> String {
        format!("{}{}:Art{article}({paragraph})", self.base, self.doc_id)
    }

    pub fn point(&self, article: u32, paragraph: u32, letter: &str) -> String {
        format!(
            "{}{}:Art{article}({paragraph})({letter})",
            self.base, self.doc_id
        )
    }

    pub fn chapter(&self, key: &str) -> String {
        format!("{}{}:Chapter{key}", self.base, self.doc_id)
    }

    pub fn section(&self, chapter: &str, number: u32) -> String {
        format!("{}{}:Chapter{chapter}:Section{number}", self.base, self.doc_id)
    }

    pub fn recital(&self, n: u32) -> String {
        format!("{}{}:Recital({n})", self.base, self.doc_id)
    }

    pub fn external(&self, kind: ExternalKind, year: u32, number: u32) -> String {
        if year == 0 && number == 0 {
            format!("{}{}/{}", self.base, self.doc_id, kind.as_str())
        } else {
            format!("{}{}/{}:{year}/{number}", self.base, self.doc_id, kind.as_str())
        }
    }
}

/// Coordinate sets for one document.
#[derive(Debug, Default)]
pub struct DocumentIndex {
    articles: HashSet<u32>,
    chapters: HashSet<String>,
    sections: HashSet<(String, u32)>,
    paragraphs: HashSet<(u32, u32)>,
    points: HashSet<(u32, u32, String)>,
    recitals: HashSet<u32>,
    article_chapter: HashMap<u32, String>,
}

impl DocumentIndex {
    /// Index every addressable coordinate of the document.
    pub fn build(document: &Document) -> Self {
        let mut index = Self::default();

        for chapter in &document.chapters {
            index.chapters.insert(chapter.number.clone());
            for section in &chapter.sections {
                index
                    .sections
                    .insert((chapter.number.clone(), section.number));
            }
            for article in chapter.all_articles() {
                index.articles.insert(article.number);
                index
                    .article_chapter
                    .insert(article.number, chapter.number.clone());
                for paragraph in &article.paragraphs {
                    index.paragraphs.insert((article.number, paragraph.number));
                    for point in &paragraph.points {
                        index.points.insert((
                            article.number,
                            paragraph.number,
                            point.letter.clone(),
                        ));
                    }
                }
            }
        }
        for recital in &document.recitals {
            index.recitals.insert(recital.number);
        }

        index
    }

    pub fn has_article(&self, n: u32) -> bool {
        self.articles.contains(&n)
    }

    pub fn has_paragraph(&self, article: u32, paragraph: u32) -> bool {
        self.paragraphs.contains(&(article, paragraph))
    }

    pub fn chapter_of(&self, article: u32) -> Option<&str> {
        self.article_chapter.get(&article).map(String::as_str)
    }

    /// Chapters holding a section with this number, in deterministic order.
    fn chapters_with_section(&self, number: u32) -> Vec<&str> {
        let mut chapters: Vec<&str> = self
            .sections
            .iter()
            .filter(|(_, n)| *n == number)
            .map(|(c, _)| c.as_str())
            .collect();
        chapters.sort_by_key(|c| (chapter_order(c), c.to_string()));
        chapters
    }
}

/// How a reference resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolutionStatus {
    Resolved,
    Partial,
    Range,
    Ambiguous,
    NotFound,
    External,
}

impl ResolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Partial => "partial",
            Self::Range => "range",
            Self::Ambiguous => "ambiguous",
            Self::NotFound => "not-found",
            Self::External => "external",
        }
    }
}

/// Resolver confidence in the produced mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResolutionConfidence {
    None,
    Low,
    Medium,
    High,
}

/// A reference mapped to its target URI (or a status explaining why not).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReference {
    pub reference: Reference,
    pub status: ResolutionStatus,
    pub confidence: ResolutionConfidence,
    /// Canonical target. For ranges, the first member; for ambiguity, the
    /// first alternative.
    pub target: Option<String>,
    /// All members of a range reference.
    pub targets: Vec<String>,
    /// Alternatives for ambiguous references, deterministic order.
    pub alternatives: Vec<String>,
    /// Failure or degradation reason.
    pub note: Option<String>,
}

/// Per-status counts and the resolution rate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionReport {
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
    pub internal_total: usize,
    pub rate: f64,
}

impl ResolutionReport {
    /// Legacy `--check references` pass line.
    pub const PASS_RATE: f64 = 0.85;

    pub fn from_resolved(resolved: &[ResolvedReference]) -> Self {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for r in resolved {
            *counts.entry(r.status.as_str().to_string()).or_default() += 1;
        }
        let internal_total = resolved
            .iter()
            .filter(|r| r.status != ResolutionStatus::External)
            .count();
        let good = resolved
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    ResolutionStatus::Resolved | ResolutionStatus::Partial | ResolutionStatus::Range
                )
            })
            .count();
        let rate = if internal_total == 0 {
            1.0
        } else {
            good as f64 / internal_total as f64
        };
        Self {
            counts,
            total: resolved.len(),
            internal_total,
            rate,
        }
    }

    pub fn passes(&self) -> bool {
        self.rate >= Self::PASS_RATE
    }
}

/// Maps references against one document index.
pub struct Resolver<'a> {
    index: &'a DocumentIndex,
    uris: UriScheme,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a DocumentIndex, uris: UriScheme) -> Self {
        Self { index, uris }
    }

    /// Resolve a batch, preserving input order.
    pub fn resolve_all(&self, references: &[Reference]) -> Vec<ResolvedReference> {
        references.iter().map(|r| self.resolve(r)).collect()
    }

    /// Resolve a single reference.
    pub fn resolve(&self, reference: &Reference) -> ResolvedReference {
        match &reference.target {
            RefTarget::External { kind, year, number } => {
                let confidence = if *year > 0 && *number > 0 {
                    ResolutionConfidence::High
                } else {
                    ResolutionConfidence::Medium
                };
                self.done(
                    reference,
                    ResolutionStatus::External,
                    confidence,
                    Some(self.uris.external(*kind, *year, *number)),
                    None,
                )
            }
            RefTarget::Article {
                number,
                paragraph,
                point,
                range_end,
            } => self.resolve_article(reference, *number, *paragraph, point.as_deref(), *range_end),
            RefTarget::Paragraph { article, number } => {
                let article = self.effective_article(*article, reference);
                self.resolve_paragraph(reference, article, *number)
            }
            RefTarget::Point {
                article,
                paragraph,
                letter,
            } => {
                let article = self.effective_article(*article, reference);
                self.resolve_point(reference, article, *paragraph, letter)
            }
            RefTarget::Chapter { key } => {
                if self.index.chapters.contains(key) {
                    self.done(
                        reference,
                        ResolutionStatus::Resolved,
                        ResolutionConfidence::High,
                        Some(self.uris.chapter(key)),
                        None,
                    )
                } else {
                    self.not_found(reference, format!("chapter {key} not indexed"))
                }
            }
            RefTarget::Section { number } => self.resolve_section(reference, *number),
            RefTarget::Recital { number } => {
                if self.index.recitals.contains(number) {
                    self.done(
                        reference,
                        ResolutionStatus::Resolved,
                        ResolutionConfidence::High,
                        Some(self.uris.recital(*number)),
                        None,
                    )
                } else {
                    self.not_found(reference, format!("recital ({number}) not indexed"))
                }
            }
        }
    }

    /// Relative citations (article 0) resolve against the citing article.
    fn effective_article(&self, article: u32, reference: &Reference) -> u32 {
        if article == 0 {
            reference.source_article
        } else {
            article
        }
    }

    fn resolve_article(
        &self,
        reference: &Reference,
        number: u32,
        paragraph: Option<u32>,
        point: Option<&str>,
        range_end: Option<u32>,
    ) -> ResolvedReference {
        if let Some(end) = range_end {
            return self.resolve_range(reference, number, end);
        }
        if !self.index.has_article(number) {
            return self.not_found(reference, format!("Article {number} not indexed"));
        }

        match (paragraph, point) {
            (None, _) => self.done(
                reference,
                ResolutionStatus::Resolved,
                ResolutionConfidence::High,
                Some(self.uris.article(number)),
                None,
            ),
            (Some(p), None) => self.resolve_paragraph(reference, number, p),
            (Some(p), Some(letter)) => self.resolve_point(reference, number, p, letter),
        }
    }

    fn resolve_range(&self, reference: &Reference, start: u32, end: u32) -> ResolvedReference {
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
        let targets: Vec<String> = (lo..=hi)
            .filter(|n| self.index.has_article(*n))
            .map(|n| self.uris.article(n))
            .collect();

        if targets.is_empty() {
            return self.not_found(
                reference,
                format!("no article in range {lo}..={hi} is indexed"),
            );
        }
        let full = targets.len() as u64 == u64::from(hi - lo + 1);
        let note = (!full).then(|| format!("range {lo}..={hi} only partially indexed"));
        ResolvedReference {
            reference: reference.clone(),
            status: ResolutionStatus::Range,
            confidence: if full {
                ResolutionConfidence::High
            } else {
                ResolutionConfidence::Medium
            },
            target: targets.first().cloned(),
            targets,
            alternatives: Vec::new(),
            note,
        }
    }

    fn resolve_paragraph(
        &self,
        reference: &Reference,
        article: u32,
        paragraph: u32,
    ) -> ResolvedReference {
        if article == 0 || !self.index.has_article(article) {
            return self.not_found(reference, format!("Article {article} not indexed"));
        }
        if self.index.has_paragraph(article, paragraph) {
            self.done(
                reference,
                ResolutionStatus::Resolved,
                ResolutionConfidence::High,
                Some(self.uris.paragraph(article, paragraph)),
                None,
            )
        } else {
            self.done(
                reference,
                ResolutionStatus::Partial,
                ResolutionConfidence::Medium,
                Some(self.uris.article(article)),
                Some(format!("paragraph {paragraph} of Article {article} not indexed")),
            )
        }
    }

    fn resolve_point(
        &self,
        reference: &Reference,
        article: u32,
        paragraph: u32,
        letter: &str,
    ) -> ResolvedReference {
        if article == 0 || !self.index.has_article(article) {
            return self.not_found(reference, format!("Article {article} not indexed"));
        }
        if paragraph == 0 {
            return self.done(
                reference,
                ResolutionStatus::Partial,
                ResolutionConfidence::Low,
                Some(self.uris.article(article)),
                Some(format!("point ({letter}) lacks a paragraph context")),
            );
        }
        if self
            .index
            .points
            .contains(&(article, paragraph, letter.to_string()))
        {
            self.done(
                reference,
                ResolutionStatus::Resolved,
                ResolutionConfidence::High,
                Some(self.uris.point(article, paragraph, letter)),
                None,
            )
        } else {
            let target = if self.index.has_paragraph(article, paragraph) {
                self.uris.paragraph(article, paragraph)
            } else {
                self.uris.article(article)
            };
            self.done(
                reference,
                ResolutionStatus::Partial,
                ResolutionConfidence::Medium,
                Some(target),
                Some(format!(
                    "point ({letter}) of Article {article}({paragraph}) not indexed"
                )),
            )
        }
    }

    fn resolve_section(&self, reference: &Reference, number: u32) -> ResolvedReference {
        // Prefer the chapter enclosing the citing article.
        if let Some(chapter) = self.index.chapter_of(reference.source_article) {
            if self.index.sections.contains(&(chapter.to_string(), number)) {
                return self.done(
                    reference,
                    ResolutionStatus::Resolved,
                    ResolutionConfidence::High,
                    Some(self.uris.section(chapter, number)),
                    None,
                );
            }
        }

        let candidates = self.index.chapters_with_section(number);
        match candidates.len() {
            0 => self.not_found(reference, format!("no chapter holds Section {number}")),
            1 => self.done(
                reference,
                ResolutionStatus::Resolved,
                ResolutionConfidence::Medium,
                Some(self.uris.section(candidates[0], number)),
                None,
            ),
            _ => {
                let alternatives: Vec<String> = candidates
                    .iter()
                    .map(|c| self.uris.section(c, number))
                    .collect();
                ResolvedReference {
                    reference: reference.clone(),
                    status: ResolutionStatus::Ambiguous,
                    confidence: ResolutionConfidence::Low,
                    target: alternatives.first().cloned(),
                    targets: Vec::new(),
                    alternatives,
                    note: Some(format!(
                        "Section {number} exists in {} chapters",
                        candidates.len()
                    )),
                }
            }
        }
    }

    fn done(
        &self,
        reference: &Reference,
        status: ResolutionStatus,
        confidence: ResolutionConfidence,
        target: Option<String>,
        note: Option<String>,
    ) -> ResolvedReference {
        ResolvedReference {
            reference: reference.clone(),
            status,
            confidence,
            target,
            targets: Vec::new(),
            alternatives: Vec::new(),
            note,
        }
    }

    fn not_found(&self, reference: &Reference, note: String) -> ResolvedReference {
        ResolvedReference {
            reference: reference.clone(),
            status: ResolutionStatus::NotFound,
            confidence: ResolutionConfidence::None,
            target: None,
            targets: Vec::new(),
            alternatives: Vec::new(),
            note: Some(note),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::patterns::PatternRegistry;

    const TEXT: &str = "\
CHAPTER I
General provisions
Article 1
Subject-matter
1. This Regulation lays down rules.

CHAPTER II
Principles
Section 1
General
Article 5
Principles
1. Data shall be processed lawfully.
2. The controller shall be responsible.

CHAPTER III
Rights
Section 1
Transparency
Article 13
Information to be provided
1. The controller shall provide information.
Article 14
Further information
1. More information.
Article 15
Right of access
1. The data subject has the right of access.
Article 17
Right to erasure
1. The data subject shall have the right to erasure.
(a) the data are no longer necessary;
";

    fn fixture() -> (DocumentIndex, UriScheme) {
        let doc = parser::parse(TEXT, &PatternRegistry::builtin())
            .unwrap()
            .document;
        (DocumentIndex::build(&doc), UriScheme::new("https://regula.dev/", "GDPR"))
    }

    fn internal(number: u32, source: u32) -> Reference {
        Reference {
            target: RefTarget::Article {
                number,
                paragraph: None,
                point: None,
                range_end: None,
            },
            source_article: source,
            raw: format!("Article {number}"),
        }
    }

    #[test]
    fn plain_article_resolves_high() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        let out = resolver.resolve(&internal(17, 5));
        assert_eq!(out.status, ResolutionStatus::Resolved);
        assert_eq!(out.confidence, ResolutionConfidence::High);
        assert_eq!(out.target.as_deref(), Some("https://regula.dev/GDPR:Art17"));
    }

    #[test]
    fn missing_article_not_found() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        let out = resolver.resolve(&internal(99, 5));
        assert_eq!(out.status, ResolutionStatus::NotFound);
        assert_eq!(out.confidence, ResolutionConfidence::None);
        assert!(out.target.is_none());
    }

    #[test]
    fn range_expands_over_indexed_articles() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        let r = Reference {
            target: RefTarget::Article {
                number: 13,
                paragraph: None,
                point: None,
                range_end: Some(15),
            },
            source_article: 5,
            raw: "Articles 13 to 15".into(),
        };
        let out = resolver.resolve(&r);
        assert_eq!(out.status, ResolutionStatus::Range);
        assert_eq!(out.confidence, ResolutionConfidence::High);
        assert_eq!(
            out.targets,
            vec![
                "https://regula.dev/GDPR:Art13",
                "https://regula.dev/GDPR:Art14",
                "https://regula.dev/GDPR:Art15"
            ]
        );
        assert_eq!(out.target.as_deref(), Some("https://regula.dev/GDPR:Art13"));
    }

    #[test]
    fn missing_paragraph_degrades_to_partial() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        let r = Reference {
            target: RefTarget::Article {
                number: 17,
                paragraph: Some(9),
                point: None,
                range_end: None,
            },
            source_article: 5,
            raw: "Article 17(9)".into(),
        };
        let out = resolver.resolve(&r);
        assert_eq!(out.status, ResolutionStatus::Partial);
        assert_eq!(out.confidence, ResolutionConfidence::Medium);
        assert_eq!(out.target.as_deref(), Some("https://regula.dev/GDPR:Art17"));
    }

    #[test]
    fn relative_paragraph_uses_source_article() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        let r = Reference {
            target: RefTarget::Paragraph {
                article: 0,
                number: 2,
            },
            source_article: 5,
            raw: "paragraph 2".into(),
        };
        let out = resolver.resolve(&r);
        assert_eq!(out.status, ResolutionStatus::Resolved);
        assert_eq!(out.target.as_deref(), Some("https://regula.dev/GDPR:Art5(2)"));
    }

    #[test]
    fn section_prefers_source_chapter_then_goes_ambiguous() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);

        // Article 5 sits in Chapter II, which has a Section 1.
        let contextual = Reference {
            target: RefTarget::Section { number: 1 },
            source_article: 5,
            raw: "Section 1".into(),
        };
        let out = resolver.resolve(&contextual);
        assert_eq!(out.status, ResolutionStatus::Resolved);
        assert_eq!(
            out.target.as_deref(),
            Some("https://regula.dev/GDPR:ChapterII:Section1")
        );

        // Article 1 sits in Chapter I which has no sections; both II and III
        // hold a Section 1, so this is ambiguous with deterministic order.
        let orphan = Reference {
            target: RefTarget::Section { number: 1 },
            source_article: 1,
            raw: "Section 1".into(),
        };
        let out = resolver.resolve(&orphan);
        assert_eq!(out.status, ResolutionStatus::Ambiguous);
        assert_eq!(
            out.alternatives,
            vec![
                "https://regula.dev/GDPR:ChapterII:Section1",
                "https://regula.dev/GDPR:ChapterIII:Section1"
            ]
        );
        assert_eq!(out.target.as_deref(), Some("https://regula.dev/GDPR:ChapterII:Section1"));
    }

    #[test]
    fn external_reference_builds_scheme_uri() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        let r = Reference {
            target: RefTarget::External {
                kind: ExternalKind::Directive,
                year: 95,
                number: 46,
            },
            source_article: 94,
            raw: "Directive 95/46/EC".into(),
        };
        let out = resolver.resolve(&r);
        assert_eq!(out.status, ResolutionStatus::External);
        assert_eq!(out.confidence, ResolutionConfidence::High);
        assert_eq!(
            out.target.as_deref(),
            Some("https://regula.dev/GDPR/directive:95/46")
        );
    }

    #[test]
    fn determinism_across_runs() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris.clone());
        let refs = vec![
            internal(17, 5),
            Reference {
                target: RefTarget::Section { number: 1 },
                source_article: 1,
                raw: "Section 1".into(),
            },
        ];
        let first = resolver.resolve_all(&refs);
        let second = resolver.resolve_all(&refs);
        assert_eq!(first, second);
    }

    #[test]
    fn report_counts_and_rate() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        let refs = vec![
            internal(17, 5),
            internal(99, 5),
            Reference {
                target: RefTarget::External {
                    kind: ExternalKind::Regulation,
                    year: 2016,
                    number: 679,
                },
                source_article: 1,
                raw: "Regulation (EU) 2016/679".into(),
            },
        ];
        let resolved = resolver.resolve_all(&refs);
        let report = ResolutionReport::from_resolved(&resolved);
        assert_eq!(report.total, 3);
        assert_eq!(report.internal_total, 2);
        assert!((report.rate - 0.5).abs() < f64::EPSILON);
        assert!(!report.passes());
        assert_eq!(report.counts.get("resolved"), Some(&1));
        assert_eq!(report.counts.get("external"), Some(&1));
    }

    #[test]
    fn empty_reference_list() {
        let (index, uris) = fixture();
        let resolver = Resolver::new(&index, uris);
        assert!(resolver.resolve_all(&[]).is_empty());
        let report = ResolutionReport::from_resolved(&[]);
        assert!((report.rate - 1.0).abs() < f64::EPSILON);
    }
}
