//! Core data types for parsed regulation documents.
//!
//! A [`Document`] is an ordered tree: chapters own sections and articles,
//! sections own articles, articles own paragraphs, paragraphs own points.
//! Recitals sit beside the chapter list. The tree is built once by the
//! parser and is immutable afterwards; extractors address into it by
//! integer coordinates only.

use serde::{Deserialize, Serialize};

/// The legislative instrument kind. Affects ELI enrichment only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DocumentType {
    Regulation,
    Directive,
    Decision,
    #[default]
    Generic,
}

impl DocumentType {
    /// Lowercase name for reports and CLI flags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regulation => "regulation",
            Self::Directive => "directive",
            Self::Decision => "decision",
            Self::Generic => "generic",
        }
    }

    /// Parse a CLI flag value. Unknown values fall back to Generic.
    pub fn from_flag(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "regulation" => Self::Regulation,
            "directive" => Self::Directive,
            "decision" => Self::Decision,
            _ => Self::Generic,
        }
    }

    /// Whether this is a recognised EU legislative type for ELI purposes.
    pub fn is_eu_legislative(&self) -> bool {
        !matches!(self, Self::Generic)
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single lettered point within a paragraph, e.g. `(a)` or `(iv)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Lowercase letter or Roman numeral, without parentheses.
    pub letter: String,
    pub text: String,
}

/// A numbered paragraph within an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paragraph {
    pub number: u32,
    pub text: String,
    pub points: Vec<Point>,
}

/// An article: the primary addressable unit of a regulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub number: u32,
    pub title: String,
    pub paragraphs: Vec<Paragraph>,
    /// Concatenated body text (paragraphs and points included).
    pub text: String,
}

/// A numbered section grouping articles within a chapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub number: u32,
    pub title: String,
    pub articles: Vec<Article>,
}

/// A chapter. The number is kept in its canonical textual form ("I", "III",
/// "2", ...) because EU instruments number chapters in Roman numerals while
/// other corpora use Arabic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub number: String,
    pub title: String,
    pub sections: Vec<Section>,
    /// Articles directly under the chapter, outside any section.
    pub articles: Vec<Article>,
}

impl Chapter {
    /// Synthetic chapter used when a source has articles but no chapter headers.
    pub fn synthetic() -> Self {
        Self {
            number: "0".into(),
            title: "Unchaptered".into(),
            sections: Vec::new(),
            articles: Vec::new(),
        }
    }

    /// Whether this is the synthetic fallback chapter.
    pub fn is_synthetic(&self) -> bool {
        self.number == "0"
    }

    /// Iterate all articles in document order: direct articles first, then
    /// per-section articles.
    pub fn all_articles(&self) -> impl Iterator<Item = &Article> {
        self.articles
            .iter()
            .chain(self.sections.iter().flat_map(|s| s.articles.iter()))
    }
}

/// A numbered recital from the preamble, e.g. `(26) The principles of ...`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recital {
    pub number: u32,
    pub text: String,
}

/// A fully parsed regulation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Document {
    pub doc_type: DocumentType,
    pub chapters: Vec<Chapter>,
    pub recitals: Vec<Recital>,
}

impl Document {
    /// Iterate every article in document order.
    pub fn all_articles(&self) -> impl Iterator<Item = &Article> {
        self.chapters.iter().flat_map(|c| c.all_articles())
    }

    /// Look up an article by number.
    pub fn article(&self, number: u32) -> Option<&Article> {
        self.all_articles().find(|a| a.number == number)
    }

    /// Total number of articles.
    pub fn article_count(&self) -> usize {
        self.all_articles().count()
    }

    /// Whether the document has no structural content at all.
    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty() && self.recitals.is_empty()
    }

    /// Whether the document only has the synthetic fallback chapter.
    pub fn has_synthetic_chapter_only(&self) -> bool {
        self.chapters.len() == 1 && self.chapters[0].is_synthetic()
    }

    /// Fraction of articles that carry a non-empty title, in [0, 1].
    /// Returns 1.0 for a document with no articles.
    pub fn title_coverage(&self) -> f64 {
        let total = self.article_count();
        if total == 0 {
            return 1.0;
        }
        let titled = self
            .all_articles()
            .filter(|a| !a.title.trim().is_empty())
            .count();
        titled as f64 / total as f64
    }
}

/// Convert an uppercase Roman numeral to its value. Returns None on
/// malformed input; subtraction pairs (IV, IX, XL, ...) are honoured.
pub fn roman_to_u32(s: &str) -> Option<u32> {
    if s.is_empty() {
        return None;
    }
    let value = |c: char| -> Option<u32> {
        Some(match c {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        })
    };
    let mut total: u32 = 0;
    let mut prev: u32 = 0;
    for c in s.chars().rev() {
        let v = value(c)?;
        if v < prev {
            total = total.checked_sub(v)?;
        } else {
            total += v;
            prev = v;
        }
    }
    Some(total)
}

/// Canonical textual chapter key: Roman numerals are kept uppercase,
/// Arabic numbers pass through unchanged.
pub fn chapter_key(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        trimmed.to_string()
    } else {
        trimmed.to_ascii_uppercase()
    }
}

/// Numeric ordering value for a chapter key, used for deterministic
/// tie-breaks. Roman numerals sort by value, Arabic by value; unparseable
/// keys sort last.
pub fn chapter_order(key: &str) -> u32 {
    if let Ok(n) = key.parse::<u32>() {
        n
    } else {
        roman_to_u32(key).unwrap_or(u32::MAX)
    }
}
