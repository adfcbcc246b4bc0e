//! Profile auto-generation.
//!
//! Inspects a parsed document and its extraction artefacts and proposes
//! per-regulation validation minima scaled to document size, with a
//! confidence derived from how cleanly the text matches a known regulation
//! family.

use serde::{Deserialize, Serialize};

use crate::error::ValidateError;
use crate::extract::{DefinedTerm, Reference, SemanticAnnotation};
use crate::model::Document;
use crate::validate::validator::{RegulationProfile, SubScoreThresholds};

/// A proposed profile plus how it was derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSuggestion {
    /// Detected regulation family: gdpr, ccpa, or generic.
    pub family: String,
    /// How cleanly the document matched the family heuristics, in [0, 1].
    pub confidence: f64,
    pub profile: RegulationProfile,
    pub notes: Vec<String>,
}

impl ProfileSuggestion {
    pub fn to_json(&self) -> Result<String, ValidateError> {
        serde_json::to_string_pretty(self).map_err(|e| ValidateError::ProfileIo {
            path: "<suggestion>".into(),
            message: e.to_string(),
        })
    }

    pub fn to_yaml(&self) -> Result<String, ValidateError> {
        serde_yaml::to_string(self).map_err(|e| ValidateError::ProfileIo {
            path: "<suggestion>".into(),
            message: e.to_string(),
        })
    }
}

/// Signals of each family, checked against titles and body text.
const GDPR_MARKERS: &[&str] = &["data subject", "personal data", "supervisory authority"];
const CCPA_MARKERS: &[&str] = &["consumer", "business", "sale of personal information"];

/// Propose validation minima for this document.
pub fn suggest(
    document: &Document,
    definitions: &[DefinedTerm],
    references: &[Reference],
    semantics: &[SemanticAnnotation],
) -> ProfileSuggestion {
    let mut notes = Vec::new();
    let articles = document.article_count().max(1);

    let text: String = document
        .all_articles()
        .map(|a| format!("{} {}", a.title, a.text))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let hits = |markers: &[&str]| markers.iter().filter(|m| text.contains(*m)).count();
    let gdpr_hits = hits(GDPR_MARKERS);
    let ccpa_hits = hits(CCPA_MARKERS);

    let (family, confidence) = if gdpr_hits >= 2 && gdpr_hits >= ccpa_hits {
        ("gdpr", 0.5 + 0.15 * gdpr_hits as f64)
    } else if ccpa_hits >= 2 {
        ("ccpa", 0.5 + 0.15 * ccpa_hits as f64)
    } else {
        notes.push("no regulation family markers found; generic thresholds".into());
        ("generic", 0.4)
    };

    // Scale the minima to what was actually extracted, with slack so a
    // re-ingest of the same text clears the bar.
    let scaled = |actual: usize| (actual * 3) / 4;
    let min_definitions = scaled(definitions.len());
    let min_references = scaled(references.len());
    let min_semantics = scaled(semantics.len());

    if definitions.is_empty() {
        notes.push("no definitions found; definition coverage will not gate".into());
    }
    notes.push(format!(
        "scaled to {articles} articles, {} definitions, {} references",
        definitions.len(),
        references.len()
    ));

    let thresholds = match family {
        "gdpr" => SubScoreThresholds::default(),
        "ccpa" => SubScoreThresholds {
            resolution: 0.7,
            ..Default::default()
        },
        _ => SubScoreThresholds {
            resolution: 0.6,
            connectivity: 0.3,
            definition_coverage: 0.3,
            semantic_extraction: 0.2,
            structure_quality: 0.5,
        },
    };

    let profile = RegulationProfile {
        name: format!("{family}-suggested"),
        thresholds,
        min_definitions,
        min_references,
        min_semantics,
        overall_threshold: if family == "generic" { 0.5 } else { 0.7 },
    };

    ProfileSuggestion {
        family: family.into(),
        confidence: confidence.min(0.95),
        profile,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract;
    use crate::parser;
    use crate::patterns::PatternRegistry;

    fn artefacts(
        text: &str,
    ) -> (
        Document,
        Vec<DefinedTerm>,
        Vec<Reference>,
        Vec<SemanticAnnotation>,
    ) {
        let registry = PatternRegistry::builtin();
        let document = parser::parse(text, &registry).unwrap().document;
        let definitions = extract::extract_definitions(&document, &registry);
        let references = extract::extract_references(&document, &registry);
        let semantics = extract::extract_semantics(&document);
        (document, definitions, references, semantics)
    }

    #[test]
    fn detects_gdpr_family() {
        let (doc, defs, refs, sems) = artefacts(
            "Article 1\nScope\n1. This Regulation protects personal data of the data subject \
             and empowers each supervisory authority.\n",
        );
        let suggestion = suggest(&doc, &defs, &refs, &sems);
        assert_eq!(suggestion.family, "gdpr");
        assert!(suggestion.confidence > 0.7);
    }

    #[test]
    fn generic_fallback_with_low_confidence() {
        let (doc, defs, refs, sems) =
            artefacts("Article 1\nScope\n1. Vehicles shall keep right.\n");
        let suggestion = suggest(&doc, &defs, &refs, &sems);
        assert_eq!(suggestion.family, "generic");
        assert!(suggestion.confidence < 0.5);
        assert!(suggestion.profile.name.starts_with("generic"));
    }

    #[test]
    fn minima_scale_below_actuals() {
        let (doc, defs, refs, sems) = artefacts(
            "Article 4\nDefinitions\n(1) 'personal data' means information about the data subject;\n\
             (2) 'processing' means any operation;\n\
             Article 5\nScope\n1. See Article 4. Personal data and processing as defined. The supervisory authority supervises.\n",
        );
        let suggestion = suggest(&doc, &defs, &refs, &sems);
        assert!(suggestion.profile.min_definitions <= defs.len());
        assert!(suggestion.profile.min_references <= refs.len());
    }

    #[test]
    fn serialises_both_ways() {
        let (doc, defs, refs, sems) = artefacts("Article 1\nScope\n1. Text.\n");
        let suggestion = suggest(&doc, &defs, &refs, &sems);
        let json: serde_json::Value = serde_json::from_str(&suggestion.to_json().unwrap()).unwrap();
        assert!(json["confidence"].is_number());
        assert!(suggestion.to_yaml().unwrap().contains("family:"));
    }
}
