//! Line-oriented regulation parser.
//!
//! A small finite-state machine walks the source line by line, driven by the
//! pattern registry: chapter and section headers open new containers, article
//! headers open articles, numbered paragraphs and lettered points divide the
//! article body, and a `Whereas` block collects recitals. Unrecognised lines
//! append to whatever text buffer is open; they are never an error.
//!
//! Parse problems that are worth surfacing but not fatal (duplicate numbers,
//! orphan paragraph markers) come back as [`Diagnostic`] records.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::error::ParseError;
use crate::model::{
    Article, Chapter, Document, DocumentType, Paragraph, Point, Recital, Section, chapter_key,
};
use crate::patterns::PatternRegistry;

/// A non-fatal parse observation, with the 1-based source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: usize,
    pub message: String,
}

/// The parser's output: the document plus everything worth telling the user.
#[derive(Debug)]
pub struct ParseOutcome {
    pub document: Document,
    pub diagnostics: Vec<Diagnostic>,
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    InRecitals,
    InChapter,
    InSection,
    InArticleHeader,
    InArticleBody,
}

/// Guess the instrument kind from the document header lines.
pub fn detect_type(text: &str) -> DocumentType {
    for line in text.lines().take(40) {
        let upper = line.to_ascii_uppercase();
        if upper.contains("REGULATION (EU)") || upper.starts_with("REGULATION") {
            return DocumentType::Regulation;
        }
        if upper.contains("DIRECTIVE (EU)") || upper.starts_with("DIRECTIVE") {
            return DocumentType::Directive;
        }
        if upper.starts_with("DECISION") || upper.contains("DECISION (EU)") {
            return DocumentType::Decision;
        }
    }
    DocumentType::Generic
}

/// Parse regulation text, auto-detecting the document type.
pub fn parse(text: &str, registry: &PatternRegistry) -> Result<ParseOutcome, ParseError> {
    parse_with_type(text, registry, detect_type(text))
}

/// Parse regulation text as a known document type.
pub fn parse_with_type(
    text: &str,
    registry: &PatternRegistry,
    doc_type: DocumentType,
) -> Result<ParseOutcome, ParseError> {
    let started = Instant::now();
    let mut machine = Machine::new(registry, doc_type)?;

    for (idx, line) in text.lines().enumerate() {
        machine.feed(idx + 1, line);
    }
    let (document, diagnostics) = machine.finish();

    let duration = started.elapsed();
    tracing::debug!(
        chapters = document.chapters.len(),
        articles = document.article_count(),
        recitals = document.recitals.len(),
        ?duration,
        "parsed document"
    );

    Ok(ParseOutcome {
        document,
        diagnostics,
        duration,
    })
}

struct Machine<'r> {
    registry: &'r PatternRegistry,
    state: State,
    document: Document,
    diagnostics: Vec<Diagnostic>,

    chapter: Option<Chapter>,
    section: Option<Section>,
    article: Option<Article>,
    paragraph: Option<Paragraph>,
    point: Option<Point>,
    body: Vec<String>,

    seen_articles: HashSet<u32>,
    seen_chapters: HashSet<String>,
    recital: Option<Recital>,
}

impl<'r> Machine<'r> {
    fn new(registry: &'r PatternRegistry, doc_type: DocumentType) -> Result<Self, ParseError> {
        // Every structural pattern must exist up front; a registry that lost
        // one of them cannot drive the FSM.
        for name in [
            "chapter_header",
            "section_header",
            "article_header",
            "paragraph_number",
            "point_letter",
            "recital_header",
            "recital_item",
        ] {
            registry.require(name).map_err(|_| ParseError::Structural {
                line: 0,
                reason: format!("pattern registry is missing \"{name}\""),
            })?;
        }

        Ok(Self {
            registry,
            state: State::Header,
            document: Document {
                doc_type,
                ..Default::default()
            },
            diagnostics: Vec::new(),
            chapter: None,
            section: None,
            article: None,
            paragraph: None,
            point: None,
            body: Vec::new(),
            seen_articles: HashSet::new(),
            seen_chapters: HashSet::new(),
            recital: None,
        })
    }

    fn warn(&mut self, line: usize, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            line,
            message: message.into(),
        });
    }

    fn matches<'a>(&self, name: &str, line: &'a str) -> Option<regex::Captures<'a>> {
        self.registry.get(name).and_then(|p| p.regex.captures(line))
    }

    fn feed(&mut self, line_no: usize, line: &str) {
        // Chapter headers close everything below them, from any state.
        if let Some(caps) = self.matches("chapter_header", line) {
            let key = chapter_key(&caps[1]);
            let title = caps.get(2).map(|m| m.as_str().trim().to_string());
            if self.seen_chapters.contains(&key) {
                self.warn(line_no, format!("duplicate chapter {key}, treating as text"));
                self.append_text(line);
                return;
            }
            self.close_chapter();
            self.seen_chapters.insert(key.clone());
            self.chapter = Some(Chapter {
                number: key,
                title: title.unwrap_or_default(),
                sections: Vec::new(),
                articles: Vec::new(),
            });
            self.state = State::InChapter;
            return;
        }

        if let Some(caps) = self.matches("section_header", line) {
            // Only inside a chapter: a bare "Section" line in the preamble is text.
            if self.chapter.is_some() || self.article.is_some() {
                let number: u32 = caps[1].parse().unwrap_or(0);
                let title = caps.get(2).map(|m| m.as_str().trim().to_string());
                self.close_article();
                self.close_section();
                if self.chapter.is_none() {
                    self.open_synthetic_chapter();
                }
                let dup = self
                    .chapter
                    .as_ref()
                    .is_some_and(|c| c.sections.iter().any(|s| s.number == number));
                if dup {
                    self.warn(line_no, format!("duplicate section {number} in chapter"));
                    return;
                }
                self.section = Some(Section {
                    number,
                    title: title.unwrap_or_default(),
                    articles: Vec::new(),
                });
                self.state = State::InSection;
                return;
            }
        }

        if let Some(caps) = self.matches("article_header", line) {
            let number: u32 = match caps[1].parse() {
                Ok(n) => n,
                Err(_) => {
                    self.append_text(line);
                    return;
                }
            };
            if self.seen_articles.contains(&number) {
                self.warn(
                    line_no,
                    format!("duplicate Article {number}, treating header as text"),
                );
                self.append_text(line);
                return;
            }
            self.close_article();
            if self.chapter.is_none() {
                self.open_synthetic_chapter();
            }
            self.seen_articles.insert(number);
            let title = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
            self.article = Some(Article {
                number,
                title: title.clone(),
                paragraphs: Vec::new(),
                text: String::new(),
            });
            self.state = if title.is_empty() {
                State::InArticleHeader
            } else {
                State::InArticleBody
            };
            return;
        }

        if self.state != State::InArticleBody
            && self.state != State::InArticleHeader
            && self.matches("recital_header", line).is_some()
        {
            self.state = State::InRecitals;
            return;
        }

        match self.state {
            State::Header | State::InChapter | State::InSection => {
                // Orphan structure markers outside any article are surfaced.
                if self.matches("paragraph_number", line).is_some() {
                    self.warn(line_no, "paragraph number outside any article, ignored");
                    return;
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return;
                }
                // A container whose header line had no title takes the next
                // non-empty line as its title.
                if self.state == State::InSection {
                    if let Some(section) = self.section.as_mut() {
                        if section.title.is_empty() {
                            section.title = trimmed.to_string();
                        }
                    }
                } else if self.state == State::InChapter {
                    if let Some(chapter) = self.chapter.as_mut() {
                        if chapter.title.is_empty() {
                            chapter.title = trimmed.to_string();
                        }
                    }
                }
            }
            State::InRecitals => self.feed_recital(line),
            State::InArticleHeader => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return;
                }
                // A structural marker means the article has no title line.
                if self.matches("paragraph_number", line).is_some()
                    || self.matches("point_letter", line).is_some()
                {
                    self.state = State::InArticleBody;
                    self.feed(line_no, line);
                    return;
                }
                if let Some(article) = self.article.as_mut() {
                    article.title = trimmed.to_string();
                }
                self.state = State::InArticleBody;
            }
            State::InArticleBody => self.feed_body(line_no, line),
        }
    }

    fn feed_recital(&mut self, line: &str) {
        if let Some(caps) = self.matches("recital_item", line) {
            if let Ok(number) = caps[1].parse::<u32>() {
                self.close_recital();
                self.recital = Some(Recital {
                    number,
                    text: caps[2].trim().to_string(),
                });
                return;
            }
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        if let Some(recital) = self.recital.as_mut() {
            recital.text.push(' ');
            recital.text.push_str(trimmed);
        }
    }

    fn feed_body(&mut self, line_no: usize, line: &str) {
        if let Some(caps) = self.matches("paragraph_number", line) {
            let number: u32 = caps[1].parse().unwrap_or(0);
            let dup = self
                .article
                .as_ref()
                .is_some_and(|a| a.paragraphs.iter().any(|p| p.number == number))
                || self.paragraph.as_ref().is_some_and(|p| p.number == number);
            if dup {
                self.warn(
                    line_no,
                    format!("duplicate paragraph {number}, treating as text"),
                );
                self.append_text(line);
                return;
            }
            self.close_paragraph();
            self.paragraph = Some(Paragraph {
                number,
                text: caps[2].trim().to_string(),
                points: Vec::new(),
            });
            self.body.push(caps[2].trim().to_string());
            return;
        }

        if let Some(caps) = self.matches("point_letter", line) {
            let letter = caps[1].to_string();
            let dup = self
                .paragraph
                .as_ref()
                .is_some_and(|p| p.points.iter().any(|pt| pt.letter == letter))
                || self.point.as_ref().is_some_and(|pt| pt.letter == letter);
            if dup {
                self.warn(line_no, format!("duplicate point ({letter}), treating as text"));
                self.append_text(line);
                return;
            }
            if self.paragraph.is_none() {
                // A point without a paragraph gets an implicit paragraph 1.
                self.paragraph = Some(Paragraph {
                    number: 1,
                    text: String::new(),
                    points: Vec::new(),
                });
            }
            self.close_point();
            self.point = Some(Point {
                letter,
                text: caps[2].trim().to_string(),
            });
            self.body.push(caps[2].trim().to_string());
            return;
        }

        self.append_text(line);
    }

    fn append_text(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }
        if self.article.is_some() {
            if let Some(point) = self.point.as_mut() {
                point.text.push(' ');
                point.text.push_str(trimmed);
            } else if let Some(paragraph) = self.paragraph.as_mut() {
                paragraph.text.push(' ');
                paragraph.text.push_str(trimmed);
            }
            self.body.push(trimmed.to_string());
        }
    }

    fn open_synthetic_chapter(&mut self) {
        let synthetic = Chapter::synthetic();
        self.seen_chapters.insert(synthetic.number.clone());
        self.chapter = Some(synthetic);
    }

    fn close_point(&mut self) {
        if let Some(point) = self.point.take() {
            if let Some(paragraph) = self.paragraph.as_mut() {
                paragraph.points.push(point);
            }
        }
    }

    fn close_paragraph(&mut self) {
        self.close_point();
        if let Some(paragraph) = self.paragraph.take() {
            if let Some(article) = self.article.as_mut() {
                article.paragraphs.push(paragraph);
            }
        }
    }

    fn close_article(&mut self) {
        self.close_paragraph();
        if let Some(mut article) = self.article.take() {
            article.text = self.body.join("\n");
            self.body.clear();
            if let Some(section) = self.section.as_mut() {
                section.articles.push(article);
            } else if let Some(chapter) = self.chapter.as_mut() {
                chapter.articles.push(article);
            }
        }
        self.body.clear();
    }

    fn close_section(&mut self) {
        self.close_article();
        if let Some(section) = self.section.take() {
            if let Some(chapter) = self.chapter.as_mut() {
                chapter.sections.push(section);
            }
        }
    }

    fn close_chapter(&mut self) {
        self.close_section();
        if let Some(chapter) = self.chapter.take() {
            self.document.chapters.push(chapter);
        }
    }

    fn close_recital(&mut self) {
        if let Some(recital) = self.recital.take() {
            self.document.recitals.push(recital);
        }
    }

    fn finish(mut self) -> (Document, Vec<Diagnostic>) {
        self.close_recital();
        self.close_chapter();
        (self.document, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PatternRegistry {
        PatternRegistry::builtin()
    }

    const MINI_GDPR: &str = "\
CHAPTER I
General provisions

Article 1
Subject-matter and objectives
1. This Regulation lays down rules relating to the protection of natural persons.
2. This Regulation protects fundamental rights and freedoms.

Article 2
Material scope
1. This Regulation applies to the processing of personal data.
(a) in the context of the activities of an establishment;
(b) of data subjects who are in the Union.

CHAPTER II
Principles

Article 5
Principles relating to processing
1. Personal data shall be processed lawfully, fairly and transparently.
";

    #[test]
    fn minimal_structure() {
        let out = parse(MINI_GDPR, &registry()).unwrap();
        let doc = &out.document;

        assert_eq!(doc.chapters.len(), 2);
        assert_eq!(doc.chapters[0].number, "I");
        assert_eq!(doc.chapters[0].title, "General provisions");
        assert_eq!(doc.article_count(), 3);

        let art1 = doc.article(1).unwrap();
        assert_eq!(art1.title, "Subject-matter and objectives");
        assert_eq!(art1.paragraphs.len(), 2);

        let art2 = doc.article(2).unwrap();
        assert_eq!(art2.paragraphs.len(), 1);
        assert_eq!(art2.paragraphs[0].points.len(), 2);
        assert_eq!(art2.paragraphs[0].points[0].letter, "a");

        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn title_on_header_line() {
        let text = "Article 17 - Right to erasure\n1. The data subject shall have the right.\n";
        let out = parse(text, &registry()).unwrap();
        let art = out.document.article(17).unwrap();
        assert_eq!(art.title, "Right to erasure");
        assert_eq!(art.paragraphs.len(), 1);
    }

    #[test]
    fn synthetic_chapter_when_no_chapter_header() {
        let text = "Article 1\nScope\n1. Some text.\n";
        let out = parse(text, &registry()).unwrap();
        assert_eq!(out.document.chapters.len(), 1);
        assert!(out.document.chapters[0].is_synthetic());
        assert!(out.document.has_synthetic_chapter_only());
        assert_eq!(out.document.article_count(), 1);
    }

    #[test]
    fn sections_group_articles() {
        let text = "\
CHAPTER IV
Controller and processor
Section 1
General obligations
Article 24
Responsibility of the controller
1. The controller shall implement measures.
Section 2
Security
Article 32
Security of processing
1. The controller and the processor shall implement measures.
";
        let out = parse(text, &registry()).unwrap();
        let ch = &out.document.chapters[0];
        assert_eq!(ch.sections.len(), 2);
        assert_eq!(ch.sections[0].number, 1);
        assert_eq!(ch.sections[0].articles.len(), 1);
        assert_eq!(ch.sections[1].articles[0].number, 32);
    }

    #[test]
    fn recitals_collected() {
        let text = "\
Whereas:
(1) The protection of natural persons is a fundamental right.
(2) The principles of, and rules on the protection
should respect fundamental rights.

CHAPTER I
General provisions
Article 1
Subject-matter
1. Text.
";
        let out = parse(text, &registry()).unwrap();
        assert_eq!(out.document.recitals.len(), 2);
        assert_eq!(out.document.recitals[0].number, 1);
        assert!(out.document.recitals[1].text.contains("respect fundamental rights"));
    }

    #[test]
    fn empty_input_yields_empty_document() {
        let out = parse("", &registry()).unwrap();
        assert!(out.document.is_empty());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn orphan_paragraph_number_warns() {
        let text = "1. Orphan paragraph before any article.\nArticle 1\nScope\n";
        let out = parse(text, &registry()).unwrap();
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].line, 1);
        assert!(out.diagnostics[0].message.contains("outside any article"));
    }

    #[test]
    fn duplicate_article_number_warns_and_continues() {
        let text = "\
Article 1
Scope
1. First.
Article 1
Scope again
1. Second.
";
        let out = parse(text, &registry()).unwrap();
        assert_eq!(out.document.article_count(), 1);
        assert!(out
            .diagnostics
            .iter()
            .any(|d| d.message.contains("duplicate Article 1")));
    }

    #[test]
    fn type_detection() {
        assert_eq!(
            detect_type("REGULATION (EU) 2016/679 OF THE EUROPEAN PARLIAMENT"),
            DocumentType::Regulation
        );
        assert_eq!(
            detect_type("DIRECTIVE 95/46/EC OF THE EUROPEAN PARLIAMENT"),
            DocumentType::Directive
        );
        assert_eq!(detect_type("California Consumer Privacy Act"), DocumentType::Generic);
    }

    #[test]
    fn reparse_is_stable() {
        let first = parse(MINI_GDPR, &registry()).unwrap();
        let second = parse(MINI_GDPR, &registry()).unwrap();
        assert_eq!(first.document, second.document);
    }
}
