//! Legacy scored validator, distinct from the gate pipeline.
//!
//! Produces one weighted overall score from five sub-scores (resolution,
//! connectivity, definition coverage, semantic extraction, structure
//! quality) against a regulation profile, and renders the stable report
//! schema as JSON or Markdown.

use serde::{Deserialize, Serialize};

use crate::error::ValidateError;
use crate::resolve::ResolutionReport;
use crate::validate::{ValidationContext, definition_usage, orphan_rate};

/// Per-sub-score thresholds a profile can override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScoreThresholds {
    pub resolution: f64,
    pub connectivity: f64,
    pub definition_coverage: f64,
    pub semantic_extraction: f64,
    pub structure_quality: f64,
}

impl Default for SubScoreThresholds {
    fn default() -> Self {
        Self {
            resolution: 0.85,
            connectivity: 0.5,
            definition_coverage: 0.5,
            semantic_extraction: 0.5,
            structure_quality: 0.7,
        }
    }
}

/// Expected extraction minima and thresholds for one regulation family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegulationProfile {
    pub name: String,
    #[serde(default)]
    pub thresholds: SubScoreThresholds,
    pub min_definitions: usize,
    pub min_references: usize,
    pub min_semantics: usize,
    /// Overall pass line.
    pub overall_threshold: f64,
}

impl RegulationProfile {
    pub fn gdpr() -> Self {
        Self {
            name: "gdpr".into(),
            thresholds: SubScoreThresholds::default(),
            min_definitions: 20,
            min_references: 50,
            min_semantics: 15,
            overall_threshold: 0.75,
        }
    }

    pub fn ccpa() -> Self {
        Self {
            name: "ccpa".into(),
            thresholds: SubScoreThresholds {
                resolution: 0.7,
                ..Default::default()
            },
            min_definitions: 10,
            min_references: 20,
            min_semantics: 8,
            overall_threshold: 0.7,
        }
    }

    pub fn generic() -> Self {
        Self {
            name: "generic".into(),
            thresholds: SubScoreThresholds {
                resolution: 0.6,
                connectivity: 0.3,
                definition_coverage: 0.3,
                semantic_extraction: 0.2,
                structure_quality: 0.5,
            },
            min_definitions: 1,
            min_references: 1,
            min_semantics: 0,
            overall_threshold: 0.5,
        }
    }

    /// Look up a built-in by name, or load a YAML profile from a path.
    pub fn resolve(flag: &str) -> Result<Self, ValidateError> {
        match flag.to_ascii_lowercase().as_str() {
            "gdpr" => Ok(Self::gdpr()),
            "ccpa" => Ok(Self::ccpa()),
            "generic" | "" => Ok(Self::generic()),
            path => Self::from_yaml_file(std::path::Path::new(path)),
        }
    }

    pub fn from_yaml_str(text: &str, origin: &str) -> Result<Self, ValidateError> {
        serde_yaml::from_str(text).map_err(|e| ValidateError::ProfileIo {
            path: origin.into(),
            message: e.to_string(),
        })
    }

    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self, ValidateError> {
        let text = std::fs::read_to_string(path).map_err(|e| ValidateError::ProfileIo {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    pub fn to_yaml(&self) -> Result<String, ValidateError> {
        serde_yaml::to_string(self).map_err(|e| ValidateError::ProfileIo {
            path: self.name.clone(),
            message: e.to_string(),
        })
    }
}

/// Pass or fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    Pass,
    Fail,
}

/// One named component of the overall score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScore {
    pub name: String,
    pub score: f64,
    pub threshold: f64,
    pub passed: bool,
}

/// The stable validation report schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub overall_score: f64,
    pub threshold: f64,
    pub status: ValidationStatus,
    pub subscores: Vec<SubScore>,
    pub issues: Vec<String>,
}

impl ValidationResult {
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }

    /// Markdown rendering generated from the same structure as the JSON.
    pub fn to_markdown(&self) -> String {
        let mut out = String::from("# Validation report\n\n");
        out.push_str(&format!(
            "**Status:** {}  \n**Overall score:** {:.2} (threshold {:.2})\n\n",
            match self.status {
                ValidationStatus::Pass => "PASS",
                ValidationStatus::Fail => "FAIL",
            },
            self.overall_score,
            self.threshold
        ));
        out.push_str("| Sub-score | Score | Threshold | Passed |\n");
        out.push_str("|-----------|-------|-----------|--------|\n");
        for sub in &self.subscores {
            out.push_str(&format!(
                "| {} | {:.2} | {:.2} | {} |\n",
                sub.name,
                sub.score,
                sub.threshold,
                if sub.passed { "yes" } else { "no" }
            ));
        }
        if !self.issues.is_empty() {
            out.push_str("\n## Issues\n\n");
            for issue in &self.issues {
                out.push_str(&format!("- {issue}\n"));
            }
        }
        out
    }
}

/// Sub-score aggregation weights.
const WEIGHTS: [(&str, f64); 5] = [
    ("resolution", 0.30),
    ("connectivity", 0.20),
    ("definitionCoverage", 0.15),
    ("semanticExtraction", 0.15),
    ("structureQuality", 0.20),
];

/// Score the context against a profile.
pub fn validate(ctx: &ValidationContext<'_>, profile: &RegulationProfile) -> ValidationResult {
    let t = &profile.thresholds;
    let mut issues = Vec::new();

    let resolution = ResolutionReport::from_resolved(ctx.resolved).rate;

    let connectivity = 1.0 - orphan_rate(ctx.store);

    let definition_coverage = if ctx.definitions.is_empty() {
        if profile.min_definitions == 0 { 1.0 } else { 0.0 }
    } else {
        definition_usage(ctx.definitions, ctx.term_usages)
    };

    let semantic_extraction = if profile.min_semantics == 0 {
        1.0
    } else {
        (ctx.semantics.len() as f64 / profile.min_semantics as f64).min(1.0)
    };

    let structure_quality = {
        let coverage = ctx.document.title_coverage();
        if ctx.document.has_synthetic_chapter_only() {
            coverage * 0.8
        } else {
            coverage
        }
    };

    if ctx.definitions.len() < profile.min_definitions {
        issues.push(format!(
            "{} definitions extracted, profile \"{}\" expects {}",
            ctx.definitions.len(),
            profile.name,
            profile.min_definitions
        ));
    }
    if ctx.references.len() < profile.min_references {
        issues.push(format!(
            "{} references extracted, profile \"{}\" expects {}",
            ctx.references.len(),
            profile.name,
            profile.min_references
        ));
    }

    let scores = [
        ("resolution", resolution, t.resolution),
        ("connectivity", connectivity, t.connectivity),
        ("definitionCoverage", definition_coverage, t.definition_coverage),
        ("semanticExtraction", semantic_extraction, t.semantic_extraction),
        ("structureQuality", structure_quality, t.structure_quality),
    ];

    let subscores: Vec<SubScore> = scores
        .iter()
        .map(|(name, score, threshold)| {
            let passed = score >= threshold;
            if !passed {
                issues.push(format!("sub-score {name} {score:.2} below {threshold:.2}"));
            }
            SubScore {
                name: (*name).into(),
                score: *score,
                threshold: *threshold,
                passed,
            }
        })
        .collect();

    let overall_score: f64 = WEIGHTS
        .iter()
        .map(|(name, weight)| {
            let score = scores
                .iter()
                .find(|(n, _, _)| n == name)
                .map(|(_, s, _)| *s)
                .unwrap_or(0.0);
            score * weight
        })
        .sum();

    let status = if overall_score >= profile.overall_threshold {
        ValidationStatus::Pass
    } else {
        ValidationStatus::Fail
    };

    ValidationResult {
        overall_score,
        threshold: profile.overall_threshold,
        status,
        subscores,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::GateConfig;

    #[test]
    fn builtin_profiles() {
        assert_eq!(RegulationProfile::resolve("gdpr").unwrap().name, "gdpr");
        assert_eq!(RegulationProfile::resolve("CCPA").unwrap().name, "ccpa");
        assert_eq!(RegulationProfile::resolve("").unwrap().name, "generic");
    }

    #[test]
    fn yaml_round_trip() {
        let profile = RegulationProfile::gdpr();
        let yaml = profile.to_yaml().unwrap();
        let back = RegulationProfile::from_yaml_str(&yaml, "inline").unwrap();
        assert_eq!(back.name, "gdpr");
        assert_eq!(back.min_definitions, 20);
        assert!((back.thresholds.resolution - 0.85).abs() < f64::EPSILON);
    }

    #[test]
    fn yaml_file_load_and_bad_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.yaml");
        std::fs::write(&path, RegulationProfile::ccpa().to_yaml().unwrap()).unwrap();
        let loaded = RegulationProfile::resolve(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.name, "ccpa");

        let missing = RegulationProfile::resolve("/no/such/profile.yaml");
        assert!(matches!(missing, Err(ValidateError::ProfileIo { .. })));
    }

    #[test]
    fn gate_config_from_profile_minima() {
        // Profiles carry minima the gate config can adopt.
        let profile = RegulationProfile::generic();
        let config = GateConfig {
            min_definitions: profile.min_definitions,
            min_references: profile.min_references,
            min_semantics: profile.min_semantics,
            ..Default::default()
        };
        assert_eq!(config.min_semantics, 0);
    }

    #[test]
    fn report_schema_is_camel_case() {
        let result = ValidationResult {
            overall_score: 0.9,
            threshold: 0.75,
            status: ValidationStatus::Pass,
            subscores: vec![SubScore {
                name: "resolution".into(),
                score: 1.0,
                threshold: 0.85,
                passed: true,
            }],
            issues: vec![],
        };
        let json: serde_json::Value = serde_json::from_str(&result.to_json()).unwrap();
        assert_eq!(json["overallScore"], 0.9);
        assert_eq!(json["status"], "pass");
        assert_eq!(json["subscores"][0]["passed"], true);
    }

    #[test]
    fn markdown_renders_from_same_structure() {
        let result = ValidationResult {
            overall_score: 0.4,
            threshold: 0.75,
            status: ValidationStatus::Fail,
            subscores: vec![],
            issues: vec!["something is off".into()],
        };
        let md = result.to_markdown();
        assert!(md.contains("**Status:** FAIL"));
        assert!(md.contains("- something is off"));
    }
}
