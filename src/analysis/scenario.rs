//! Scenario matching.
//!
//! A scenario is a named set of right and obligation categories a compliance
//! situation needs (a breach, an access request, a cross-border transfer).
//! Matching checks which categories the graph provides and which articles
//! provide them.

use serde::{Deserialize, Serialize};

use crate::extract::{ObligationKind, RightKind};
use crate::graph::TripleStore;
use crate::graph::ontology::pred;

/// A named requirement set.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub description: &'static str,
    pub rights: &'static [RightKind],
    pub obligations: &'static [ObligationKind],
}

/// The built-in scenario catalogue.
pub const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "breach-response",
        description: "A personal data breach occurred and must be handled",
        rights: &[],
        obligations: &[
            ObligationKind::NotifyBreach,
            ObligationKind::NotifySubject,
            ObligationKind::Secure,
        ],
    },
    Scenario {
        name: "subject-access-request",
        description: "A data subject asks what is held about them",
        rights: &[RightKind::Access, RightKind::Information],
        obligations: &[ObligationKind::Respond, ObligationKind::ProvideInformation],
    },
    Scenario {
        name: "cross-border-transfer",
        description: "Personal data moves to a third country",
        rights: &[],
        obligations: &[ObligationKind::TransferSafeguards, ObligationKind::Record],
    },
    Scenario {
        name: "consent-withdrawal",
        description: "A data subject withdraws consent and wants erasure",
        rights: &[RightKind::WithdrawConsent, RightKind::Erasure],
        obligations: &[ObligationKind::Consent],
    },
];

/// Look up a scenario by name.
pub fn find(name: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

/// One satisfied requirement: the category and the articles providing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedCategory {
    pub category: String,
    pub articles: Vec<String>,
}

/// The match result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioMatch {
    pub scenario: String,
    pub matched: Vec<MatchedCategory>,
    pub missing: Vec<String>,
    /// Fraction of required categories satisfied, in [0, 1].
    pub coverage: f64,
}

/// Match one scenario against a built graph.
pub fn match_scenario(store: &TripleStore, scenario: &Scenario) -> ScenarioMatch {
    let mut matched = Vec::new();
    let mut missing = Vec::new();

    let mut check = |tag: String, type_pred: &str, link_pred: &str| {
        let object = format!("reg:{tag}");
        let nodes = store.find(None, Some(type_pred), Some(&object));
        let mut articles: Vec<String> = nodes
            .iter()
            .flat_map(|node| {
                store
                    .find(None, Some(link_pred), Some(&node.subject))
                    .into_iter()
                    .map(|t| t.subject.clone())
            })
            .collect();
        articles.sort();
        articles.dedup();
        if articles.is_empty() {
            missing.push(tag);
        } else {
            matched.push(MatchedCategory {
                category: tag,
                articles,
            });
        }
    };

    for right in scenario.rights {
        check(right.tag().to_string(), pred::RIGHT_TYPE, pred::GRANTS_RIGHT);
    }
    for obligation in scenario.obligations {
        check(
            obligation.tag().to_string(),
            pred::OBLIGATION_TYPE,
            pred::IMPOSES_OBLIGATION,
        );
    }

    let total = scenario.rights.len() + scenario.obligations.len();
    let coverage = if total == 0 {
        1.0
    } else {
        matched.len() as f64 / total as f64
    };

    ScenarioMatch {
        scenario: scenario.name.to_string(),
        matched,
        missing,
        coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::patterns::PatternRegistry;
    use crate::session::{IngestOptions, ingest_text};

    const TEXT: &str = "\
Article 15
Right of access by the data subject
1. The data subject shall have the right of access to personal data. The \
controller shall provide a copy and shall respond to the request without undue delay.

Article 33
Notification of a personal data breach to the supervisory authority
1. The controller shall notify the personal data breach to the supervisory authority.

Article 34
Communication of a personal data breach to the data subject
1. The controller shall communicate the personal data breach to the data subject.

Article 32
Security of processing
1. The controller shall implement appropriate technical and organisational measures.
";

    fn store() -> TripleStore {
        ingest_text(
            TEXT,
            &PatternRegistry::builtin(),
            "https://regula.dev/",
            &IngestOptions::new("GDPR"),
        )
        .unwrap()
        .store
    }

    #[test]
    fn breach_scenario_fully_covered() {
        let scenario = find("breach-response").unwrap();
        let result = match_scenario(&store(), scenario);
        assert!((result.coverage - 1.0).abs() < f64::EPSILON, "{result:?}");
        assert!(result.missing.is_empty());
        let notify = result
            .matched
            .iter()
            .find(|m| m.category == "ObligationNotifyBreach")
            .unwrap();
        assert!(notify.articles[0].ends_with("Art33"));
    }

    #[test]
    fn missing_categories_reported() {
        let scenario = find("consent-withdrawal").unwrap();
        let result = match_scenario(&store(), scenario);
        assert!(result.coverage < 1.0);
        assert!(result.missing.contains(&"RightErasure".to_string()));
    }

    #[test]
    fn unknown_scenario_name() {
        assert!(find("no-such-scenario").is_none());
        assert!(find("BREACH-RESPONSE").is_some());
    }

    #[test]
    fn empty_store_matches_nothing() {
        let scenario = find("subject-access-request").unwrap();
        let result = match_scenario(&TripleStore::new(), scenario);
        assert_eq!(result.coverage, 0.0);
        assert_eq!(result.missing.len(), 4);
    }

    // The parser module is exercised indirectly; keep a guard that the
    // fixture actually produces the annotations the scenarios rely on.
    #[test]
    fn fixture_has_expected_annotations() {
        let doc = parser::parse(TEXT, &PatternRegistry::builtin())
            .unwrap()
            .document;
        let semantics = crate::extract::extract_semantics(&doc);
        assert!(semantics.len() >= 4, "{semantics:?}");
    }
}
