//! Right and obligation annotation.
//!
//! A rule table of keyword patterns runs over each article. Title matches are
//! strong evidence (an article titled "Right to erasure" grants that right);
//! body matches on modal-verb phrasing score lower. At most one annotation per
//! (article, category) survives, keeping the highest-confidence hit.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::extract::{
    AnnotationKind, EntityType, ObligationKind, RightKind, SemanticAnnotation,
};
use crate::model::{Article, Document};

const TITLE_CONFIDENCE: f64 = 0.9;
const BODY_CONFIDENCE: f64 = 0.65;

struct Rule {
    kind: AnnotationKind,
    pattern: Regex,
}

fn rule(kind: AnnotationKind, pattern: &str) -> Rule {
    Rule {
        kind,
        pattern: RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .expect("rule table regex"),
    }
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        use AnnotationKind::{Obligation, Right};
        vec![
            rule(Right(RightKind::Access), r"right of access|right to access"),
            rule(
                Right(RightKind::Information),
                r"right to (?:be )?informed|information to be provided to the data subject",
            ),
            rule(
                Right(RightKind::Rectification),
                r"right to rectification|obtain\b.{0,40}\brectification",
            ),
            rule(
                Right(RightKind::Erasure),
                r"right to erasure|right to be forgotten|obtain\b.{0,40}\berasure",
            ),
            rule(
                Right(RightKind::Restriction),
                r"right to restriction|obtain\b.{0,40}\brestriction of processing",
            ),
            rule(Right(RightKind::Portability), r"data portability"),
            rule(Right(RightKind::Object), r"right to object"),
            rule(
                Right(RightKind::AutomatedDecision),
                r"automated individual decision-making|not to be subject to a decision based solely on automated processing",
            ),
            rule(
                Right(RightKind::WithdrawConsent),
                r"withdraw\b.{0,20}\bconsent at any time|right to withdraw\b.{0,20}\bconsent",
            ),
            rule(Right(RightKind::LodgeComplaint), r"right to lodge a complaint"),
            rule(Right(RightKind::EffectiveRemedy), r"effective judicial remedy"),
            rule(
                Right(RightKind::Compensation),
                r"right to (?:receive )?compensation",
            ),
            rule(
                Obligation(ObligationKind::Consent),
                r"conditions for consent|demonstrate that the data subject has consented",
            ),
            rule(
                Obligation(ObligationKind::LawfulProcessing),
                r"lawfulness of processing|processing shall be lawful",
            ),
            rule(
                Obligation(ObligationKind::ProvideInformation),
                r"shall provide\b.{0,60}\binformation|information to be provided where personal data",
            ),
            rule(
                Obligation(ObligationKind::Transparency),
                r"transparent\b.{0,40}\b(?:form|manner)|transparent information",
            ),
            rule(
                Obligation(ObligationKind::Respond),
                r"shall\b.{0,40}\b(?:respond|provide information on action taken)\b.{0,60}\bwithout undue delay",
            ),
            rule(
                Obligation(ObligationKind::NotifyBreach),
                r"notif\w+\b.{0,60}\bbreach\b.{0,60}\bsupervisory authority|shall\b.{0,30}\bnotify the personal data breach",
            ),
            rule(
                Obligation(ObligationKind::NotifySubject),
                r"communicat\w+\b.{0,40}\bbreach\b.{0,60}\bdata subject",
            ),
            rule(
                Obligation(ObligationKind::Secure),
                r"security of processing|shall implement appropriate technical and organisational measures",
            ),
            rule(
                Obligation(ObligationKind::Record),
                r"records? of processing activities|shall maintain a record",
            ),
            rule(
                Obligation(ObligationKind::Dpia),
                r"data protection impact assessment",
            ),
            rule(
                Obligation(ObligationKind::AppointDpo),
                r"shall designate a data protection officer|designation of the data protection officer",
            ),
            rule(
                Obligation(ObligationKind::TransferSafeguards),
                r"transfers? of personal data to\b.{0,20}\bthird countr|subject to appropriate safeguards",
            ),
        ]
    })
}

/// Pick the annotated party from article context.
fn party_for(kind: &AnnotationKind, article: &Article) -> EntityType {
    let text = article.text.to_lowercase();
    match kind {
        AnnotationKind::Right(_) => {
            if text.contains("consumer") && !text.contains("data subject") {
                EntityType::Consumer
            } else {
                EntityType::DataSubject
            }
        }
        AnnotationKind::Obligation(_) => {
            let controller = text.contains("controller");
            let processor = text.contains("processor");
            match (controller, processor) {
                (false, true) => EntityType::Processor,
                (false, false) if text.contains("business") => EntityType::Business,
                (false, false) => EntityType::Unspecified,
                _ => EntityType::Controller,
            }
        }
    }
}

/// Extract right and obligation annotations from every article.
pub fn extract(document: &Document) -> Vec<SemanticAnnotation> {
    let mut annotations: Vec<SemanticAnnotation> = Vec::new();

    for article in document.all_articles() {
        for rule in rules() {
            let (confidence, span) = if let Some(m) = rule.pattern.find(&article.title) {
                (TITLE_CONFIDENCE, m.as_str().to_string())
            } else if let Some(m) = rule.pattern.find(&article.text) {
                (BODY_CONFIDENCE, m.as_str().to_string())
            } else {
                continue;
            };

            let candidate = SemanticAnnotation {
                kind: rule.kind,
                article: article.number,
                party: party_for(&rule.kind, article),
                confidence,
                span,
            };

            match annotations
                .iter_mut()
                .find(|a| a.article == candidate.article && a.kind == candidate.kind)
            {
                Some(existing) if existing.confidence < candidate.confidence => {
                    *existing = candidate;
                }
                Some(_) => {}
                None => annotations.push(candidate),
            }
        }
    }

    tracing::debug!(count = annotations.len(), "extracted semantic annotations");
    annotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::patterns::PatternRegistry;

    fn doc(text: &str) -> Document {
        parser::parse(text, &PatternRegistry::builtin())
            .unwrap()
            .document
    }

    #[test]
    fn title_match_scores_high() {
        let d = doc("Article 17 - Right to erasure\n1. The data subject shall have the right to obtain from the controller the erasure of personal data.\n");
        let out = extract(&d);
        let erasure = out
            .iter()
            .find(|a| a.kind == AnnotationKind::Right(RightKind::Erasure))
            .unwrap();
        assert!((erasure.confidence - TITLE_CONFIDENCE).abs() < f64::EPSILON);
        assert_eq!(erasure.article, 17);
        assert_eq!(erasure.party, EntityType::DataSubject);
    }

    #[test]
    fn body_match_scores_medium() {
        let d = doc("Article 32\nSecurity of processing\n1. The controller and the processor shall implement appropriate technical and organisational measures.\n");
        let out = extract(&d);
        let secure = out
            .iter()
            .find(|a| a.kind == AnnotationKind::Obligation(ObligationKind::Secure))
            .unwrap();
        // "Security of processing" is the title, so this still scores high.
        assert!((secure.confidence - TITLE_CONFIDENCE).abs() < f64::EPSILON);
        assert_eq!(secure.party, EntityType::Controller);
    }

    #[test]
    fn one_annotation_per_article_and_category() {
        let d = doc("Article 17 - Right to erasure\n1. The right to erasure applies. The right to be forgotten is the same right to erasure.\n");
        let out = extract(&d);
        let erasures = out
            .iter()
            .filter(|a| a.kind == AnnotationKind::Right(RightKind::Erasure))
            .count();
        assert_eq!(erasures, 1);
    }

    #[test]
    fn breach_notification_detected() {
        let d = doc("Article 33\nNotification of a personal data breach to the supervisory authority\n1. The controller shall notify the personal data breach to the supervisory authority without undue delay.\n");
        let out = extract(&d);
        assert!(out
            .iter()
            .any(|a| a.kind == AnnotationKind::Obligation(ObligationKind::NotifyBreach)));
    }

    #[test]
    fn processor_only_article_gets_processor_actor() {
        let d = doc("Article 30\nRecords of processing activities\n1. Each processor shall maintain a record of all categories of processing activities.\n");
        let out = extract(&d);
        let record = out
            .iter()
            .find(|a| a.kind == AnnotationKind::Obligation(ObligationKind::Record))
            .unwrap();
        assert_eq!(record.party, EntityType::Processor);
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(extract(&Document::default()).is_empty());
    }

    #[test]
    fn deterministic() {
        let d = doc("Article 15\nRight of access by the data subject\n1. The data subject shall have the right of access.\n");
        assert_eq!(extract(&d), extract(&d));
    }
}
