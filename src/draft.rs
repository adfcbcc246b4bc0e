//! Draft bills and amendment projection.
//!
//! Parses a plain-text draft bill (metadata plus SEC. sections), recognises
//! amendment instructions, and projects each amendment onto the library's
//! graphs: which provision it targets, how many triples that provision
//! touches, and which cross-references would be invalidated.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::DraftError;
use crate::graph::ontology::pred;
use crate::library::{DocStatus, Library, LibraryResult};

/// Header metadata recovered from a bill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BillMetadata {
    pub title: Option<String>,
    pub bill_number: Option<String>,
    pub congress: Option<String>,
}

/// One numbered section of a bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftSection {
    pub number: String,
    pub heading: String,
    pub text: String,
}

/// A parsed draft bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftBill {
    pub metadata: BillMetadata,
    pub sections: Vec<DraftSection>,
    pub raw: String,
}

/// Amendment instruction kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmendmentKind {
    StrikeAndInsert,
    Repeal,
    Add,
    Redesignate,
    Modify,
}

/// One recognised amendment instruction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Amendment {
    pub kind: AmendmentKind,
    pub target_title: Option<String>,
    pub target_section: Option<String>,
    pub target_subsection: Option<String>,
    /// The sentence the instruction was recognised in.
    pub excerpt: String,
}

fn re(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("draft rule regex")
}

struct Rules {
    section_header: Regex,
    bill_number: Regex,
    congress: Regex,
    strike_insert: Regex,
    repeal: Regex,
    add: Regex,
    redesignate: Regex,
    modify: Regex,
    target_section: Regex,
    target_title: Regex,
    target_subsection: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        section_header: re(r"^\s*SEC(?:TION)?\.?\s+(\d+[A-Za-z]?)\.\s*(.*)$"),
        bill_number: re(r"\b(H\.\s?R\.|S\.)\s*(\d+)"),
        congress: re(r"\b(\d+)(?:th|st|nd|rd)\s+CONGRESS"),
        strike_insert: re(r"is amended by striking\b.*\band inserting\b"),
        repeal: re(r"\b(?:is|are)\s+(?:hereby\s+)?repealed\b"),
        add: re(r"is amended by (?:adding at the end|inserting after)\b"),
        redesignate: re(r"\bredesignat(?:ed|ing)\b"),
        modify: re(r"\bis amended\b"),
        target_section: re(r"\bsection\s+(\d+[0-9A-Za-z.\-]*)"),
        target_title: re(r"\btitle\s+([IVXLCDM]+|\d+)\b"),
        target_subsection: re(r"\bsubsection\s+\(([a-z])\)"),
    })
}

/// Parse a draft bill. A text with no recognisable sections is an error.
pub fn parse_draft(text: &str) -> Result<DraftBill, DraftError> {
    let rules = rules();
    let mut metadata = BillMetadata::default();
    let mut sections: Vec<DraftSection> = Vec::new();

    for line in text.lines().take(30) {
        if metadata.bill_number.is_none() {
            if let Some(caps) = rules.bill_number.captures(line) {
                metadata.bill_number =
                    Some(format!("{} {}", caps[1].replace(' ', ""), &caps[2]));
            }
        }
        if metadata.congress.is_none() {
            if let Some(caps) = rules.congress.captures(line) {
                metadata.congress = Some(caps[1].to_string());
            }
        }
        if metadata.title.is_none() {
            let trimmed = line.trim();
            if trimmed.len() > 10 && trimmed.starts_with("To ") {
                metadata.title = Some(trimmed.trim_end_matches('.').to_string());
            }
        }
    }

    for line in text.lines() {
        if let Some(caps) = rules.section_header.captures(line) {
            sections.push(DraftSection {
                number: caps[1].to_string(),
                heading: caps[2].trim().trim_end_matches('.').to_string(),
                text: String::new(),
            });
        } else if let Some(section) = sections.last_mut() {
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                if !section.text.is_empty() {
                    section.text.push(' ');
                }
                section.text.push_str(trimmed);
            }
        }
    }

    if sections.is_empty() {
        return Err(DraftError::Empty);
    }

    tracing::debug!(sections = sections.len(), "draft parsed");
    Ok(DraftBill {
        metadata,
        sections,
        raw: text.to_string(),
    })
}

/// Recognise amendment instructions across a bill's sections.
pub fn recognize_amendments(bill: &DraftBill) -> Vec<Amendment> {
    let rules = rules();
    let mut amendments = Vec::new();

    for section in &bill.sections {
        for sentence in section.text.split(". ") {
            let kind = if rules.strike_insert.is_match(sentence) {
                AmendmentKind::StrikeAndInsert
            } else if rules.repeal.is_match(sentence) {
                AmendmentKind::Repeal
            } else if rules.add.is_match(sentence) {
                AmendmentKind::Add
            } else if rules.redesignate.is_match(sentence) {
                AmendmentKind::Redesignate
            } else if rules.modify.is_match(sentence) {
                AmendmentKind::Modify
            } else {
                continue;
            };

            amendments.push(Amendment {
                kind,
                target_title: rules
                    .target_title
                    .captures(sentence)
                    .map(|c| c[1].to_string()),
                target_section: rules
                    .target_section
                    .captures(sentence)
                    .map(|c| c[1].to_string()),
                target_subsection: rules
                    .target_subsection
                    .captures(sentence)
                    .map(|c| c[1].to_string()),
                excerpt: sentence.trim().to_string(),
            });
        }
    }

    amendments
}

/// What happens to the targeted provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Redesignated,
}

impl From<AmendmentKind> for ChangeKind {
    fn from(kind: AmendmentKind) -> Self {
        match kind {
            AmendmentKind::Add => Self::Added,
            AmendmentKind::Repeal => Self::Removed,
            AmendmentKind::Redesignate => Self::Redesignated,
            AmendmentKind::StrikeAndInsert | AmendmentKind::Modify => Self::Modified,
        }
    }
}

/// One amendment projected onto a library graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionDiff {
    pub amendment: Amendment,
    pub document_id: String,
    pub target_uri: String,
    /// Triples with the target URI as subject or object.
    pub affected_triples: usize,
    /// Provisions citing the target.
    pub crossrefs_to: Vec<String>,
    /// Provisions the target cites.
    pub crossrefs_from: Vec<String>,
    pub change: ChangeKind,
}

/// The projection of a whole bill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftDiff {
    pub diffs: Vec<ProvisionDiff>,
    pub unresolved: Vec<Amendment>,
    /// Affected triples summed over Modified + Removed + Redesignated.
    pub triples_invalidated: usize,
}

/// Project a bill's amendments onto the library.
pub fn compute_diff(library: &Library, bill: &DraftBill) -> LibraryResult<DraftDiff> {
    let amendments = recognize_amendments(bill);
    let metadata = library.metadata()?;

    // Load every ready document's store once.
    let mut stores = Vec::new();
    for entry in &metadata.documents {
        if entry.status == DocStatus::Ready {
            stores.push((entry.id.clone(), library.load_triple_store(&entry.id)?));
        }
    }

    let mut diffs = Vec::new();
    let mut unresolved = Vec::new();
    let mut invalidated = 0usize;

    for amendment in amendments {
        let Some(section) = amendment.target_section.as_deref() else {
            unresolved.push(amendment);
            continue;
        };
        let suffix = format!(":Art{section}");

        let hit = stores.iter().find_map(|(id, store)| {
            store
                .iter()
                .map(|t| t.subject.as_str())
                .find(|s| s.ends_with(&suffix))
                .map(|uri| (id.clone(), uri.to_string()))
        });
        let Some((document_id, target_uri)) = hit else {
            unresolved.push(amendment);
            continue;
        };

        let store = &stores
            .iter()
            .find(|(id, _)| *id == document_id)
            .expect("store just matched")
            .1;

        let affected = store.find(Some(&target_uri), None, None).len()
            + store.find(None, None, Some(&target_uri)).len();
        let crossrefs_to: Vec<String> = store
            .find(None, Some(pred::REFERENCES), Some(&target_uri))
            .into_iter()
            .map(|t| t.subject.clone())
            .collect();
        let crossrefs_from: Vec<String> = store
            .find(Some(&target_uri), Some(pred::REFERENCES), None)
            .into_iter()
            .map(|t| t.object.as_str().to_string())
            .collect();

        let change = ChangeKind::from(amendment.kind);
        if matches!(
            change,
            ChangeKind::Modified | ChangeKind::Removed | ChangeKind::Redesignated
        ) {
            invalidated += affected;
        }

        diffs.push(ProvisionDiff {
            amendment,
            document_id,
            target_uri,
            affected_triples: affected,
            crossrefs_to,
            crossrefs_from,
            change,
        });
    }

    Ok(DraftDiff {
        diffs,
        unresolved,
        triples_invalidated: invalidated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::AddOptions;
    use crate::patterns::PatternRegistry;

    const BILL: &str = "\
118th CONGRESS
1st Session
H. R. 4512

To amend the Data Protection Act to strengthen erasure rights.

SEC. 1. SHORT TITLE.
This Act may be cited as the Erasure Rights Act.

SEC. 2. ERASURE STRENGTHENING.
Section 17 of the Data Protection Act is amended by striking \"without undue delay\" and inserting \"within 30 days\".

SEC. 3. REPEALS.
Section 2 of the Data Protection Act is repealed.

SEC. 4. NEW OBLIGATIONS.
Section 99 of the Data Protection Act is amended by adding at the end a new subsection.
";

    #[test]
    fn bill_metadata_and_sections() {
        let bill = parse_draft(BILL).unwrap();
        assert_eq!(bill.metadata.bill_number.as_deref(), Some("H.R. 4512"));
        assert_eq!(bill.metadata.congress.as_deref(), Some("118"));
        assert!(bill.metadata.title.as_deref().unwrap().starts_with("To amend"));
        assert_eq!(bill.sections.len(), 4);
        assert_eq!(bill.sections[1].number, "2");
        assert_eq!(bill.sections[1].heading, "ERASURE STRENGTHENING");
    }

    #[test]
    fn amendment_kinds_recognised() {
        let bill = parse_draft(BILL).unwrap();
        let amendments = recognize_amendments(&bill);
        assert_eq!(amendments.len(), 3);
        assert_eq!(amendments[0].kind, AmendmentKind::StrikeAndInsert);
        assert_eq!(amendments[0].target_section.as_deref(), Some("17"));
        assert_eq!(amendments[1].kind, AmendmentKind::Repeal);
        assert_eq!(amendments[2].kind, AmendmentKind::Add);
    }

    #[test]
    fn empty_draft_is_an_error() {
        assert!(matches!(parse_draft("just prose\n"), Err(DraftError::Empty)));
    }

    #[test]
    fn diff_projects_onto_library() {
        let dir = tempfile::TempDir::new().unwrap();
        let library = Library::init(dir.path(), "https://regula.dev/").unwrap();
        library
            .add_document(
                "dpa",
                "Article 2\nScope\n1. This Act applies broadly. See Article 17.\nArticle 17\nErasure\n1. Erasure shall occur without undue delay as per Article 2.\n",
                &AddOptions::default(),
                &PatternRegistry::builtin(),
            )
            .unwrap();

        let bill = parse_draft(BILL).unwrap();
        let diff = compute_diff(&library, &bill).unwrap();

        // Section 17 and Section 2 resolve; Section 99 does not exist.
        assert_eq!(diff.diffs.len(), 2);
        assert_eq!(diff.unresolved.len(), 1);
        assert_eq!(diff.unresolved[0].target_section.as_deref(), Some("99"));

        let modified = &diff.diffs[0];
        assert_eq!(modified.document_id, "dpa");
        assert!(modified.target_uri.ends_with(":Art17"));
        assert_eq!(modified.change, ChangeKind::Modified);
        assert!(modified.affected_triples > 0);
        assert!(modified
            .crossrefs_to
            .iter()
            .any(|u| u.ends_with(":Art2")));

        // Both resolved amendments invalidate triples (modify + repeal).
        assert!(diff.triples_invalidated >= modified.affected_triples);
    }
}
