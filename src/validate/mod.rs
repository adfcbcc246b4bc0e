//! Validation gates V0–V3 over the pipeline's artefacts.
//!
//! Gates are a closed set, dispatched by match: V0 Schema (file-level), V1
//! Structure (parse-level), V2 Coverage (extraction-level), V3 Quality
//! (graph-level). Each returns a pass/fail plus a score in [0, 1]; the
//! pipeline aggregates them into a weighted report, with V3 weighted highest.

pub mod profile;
pub mod validator;

use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::extract::{DefinedTerm, Reference, SemanticAnnotation, TermUsage};
use crate::graph::TripleStore;
use crate::graph::ontology::{class, pred};
use crate::model::Document;
use crate::parser::Diagnostic;
use crate::resolve::{ResolutionReport, ResolvedReference};

/// Everything the gates inspect. Borrowed from the pipeline run.
pub struct ValidationContext<'a> {
    pub source_path: Option<&'a Path>,
    pub source_size: u64,
    pub document: &'a Document,
    pub diagnostics: &'a [Diagnostic],
    pub parse_duration: Duration,
    pub definitions: &'a [DefinedTerm],
    pub references: &'a [Reference],
    pub semantics: &'a [SemanticAnnotation],
    pub term_usages: &'a [TermUsage],
    pub resolved: &'a [ResolvedReference],
    pub store: &'a TripleStore,
}

/// The closed gate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateId {
    /// V0: file exists, non-empty, size within bounds, encoding valid.
    Schema,
    /// V1: chapters, articles, parse duration, title coverage.
    Structure,
    /// V2: extraction counts against profile minima.
    Coverage,
    /// V3: resolution rate, orphan rate, definition usage.
    Quality,
}

impl GateId {
    pub const ALL: [GateId; 4] = [
        GateId::Schema,
        GateId::Structure,
        GateId::Coverage,
        GateId::Quality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "V0",
            Self::Structure => "V1",
            Self::Coverage => "V2",
            Self::Quality => "V3",
        }
    }

    pub fn from_flag(s: &str) -> Option<Self> {
        Some(match s.to_ascii_uppercase().as_str() {
            "V0" | "SCHEMA" => Self::Schema,
            "V1" | "STRUCTURE" => Self::Structure,
            "V2" | "COVERAGE" => Self::Coverage,
            "V3" | "QUALITY" => Self::Quality,
            _ => return None,
        })
    }

    /// Aggregation weight; V3 dominates.
    fn weight(&self) -> f64 {
        match self {
            Self::Schema => 0.15,
            Self::Structure => 0.20,
            Self::Coverage => 0.25,
            Self::Quality => 0.40,
        }
    }
}

/// Gate pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    pub skip: Vec<GateId>,
    /// Halt at the first failing non-skipped gate.
    pub strict: bool,
    /// Promote warnings to failures.
    pub fail_on_warn: bool,
    pub min_source_bytes: u64,
    pub max_source_bytes: u64,
    pub max_parse_duration: Duration,
    pub min_title_coverage: f64,
    pub min_definitions: usize,
    pub min_references: usize,
    pub min_semantics: usize,
    pub min_resolution_rate: f64,
    pub max_orphan_rate: f64,
    pub min_definition_usage: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            skip: Vec::new(),
            strict: false,
            fail_on_warn: false,
            min_source_bytes: 1,
            max_source_bytes: 50 * 1024 * 1024,
            max_parse_duration: Duration::from_secs(30),
            min_title_coverage: 0.8,
            min_definitions: 1,
            min_references: 1,
            min_semantics: 1,
            min_resolution_rate: 0.85,
            max_orphan_rate: 0.5,
            min_definition_usage: 0.5,
        }
    }
}

/// One gate's verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateOutcome {
    pub gate: GateId,
    pub passed: bool,
    pub score: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub skipped: bool,
    pub duration: Duration,
}

impl GateOutcome {
    fn skipped(gate: GateId) -> Self {
        Self {
            gate,
            passed: true,
            score: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
            skipped: true,
            duration: Duration::ZERO,
        }
    }
}

/// Aggregated gate results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateReport {
    pub outcomes: Vec<GateOutcome>,
    pub overall_pass: bool,
    /// Weighted mean score over the gates that actually ran.
    pub total_score: f64,
    /// True when StrictMode stopped the pipeline early.
    pub halted: bool,
}

/// Runs the gate pipeline over a context.
pub struct GatePipeline {
    pub config: GateConfig,
}

impl GatePipeline {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, ctx: &ValidationContext<'_>) -> GateReport {
        let mut outcomes = Vec::new();
        let mut halted = false;

        for gate in GateId::ALL {
            if self.config.skip.contains(&gate) {
                outcomes.push(GateOutcome::skipped(gate));
                continue;
            }
            let started = Instant::now();
            let mut outcome = match gate {
                GateId::Schema => self.gate_schema(ctx),
                GateId::Structure => self.gate_structure(ctx),
                GateId::Coverage => self.gate_coverage(ctx),
                GateId::Quality => self.gate_quality(ctx),
            };
            outcome.duration = started.elapsed();
            if self.config.fail_on_warn && !outcome.warnings.is_empty() {
                outcome.passed = false;
            }
            let failed = !outcome.passed;
            tracing::info!(
                gate = gate.as_str(),
                passed = outcome.passed,
                score = outcome.score,
                "gate evaluated"
            );
            outcomes.push(outcome);
            if failed && self.config.strict {
                halted = true;
                break;
            }
        }

        let ran: Vec<&GateOutcome> = outcomes.iter().filter(|o| !o.skipped).collect();
        let weight_sum: f64 = ran.iter().map(|o| o.gate.weight()).sum();
        let total_score = if weight_sum > 0.0 {
            ran.iter().map(|o| o.score * o.gate.weight()).sum::<f64>() / weight_sum
        } else {
            0.0
        };
        let overall_pass = !halted && ran.iter().all(|o| o.passed);

        GateReport {
            outcomes,
            overall_pass,
            total_score,
            halted,
        }
    }

    fn outcome(
        gate: GateId,
        score: f64,
        errors: Vec<String>,
        warnings: Vec<String>,
    ) -> GateOutcome {
        GateOutcome {
            gate,
            passed: errors.is_empty(),
            score: score.clamp(0.0, 1.0),
            errors,
            warnings,
            skipped: false,
            duration: Duration::ZERO,
        }
    }

    fn gate_schema(&self, ctx: &ValidationContext<'_>) -> GateOutcome {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if ctx.source_size < self.config.min_source_bytes {
            errors.push(format!(
                "source is {} bytes, below the minimum of {}",
                ctx.source_size, self.config.min_source_bytes
            ));
        }
        if ctx.source_size > self.config.max_source_bytes {
            errors.push(format!(
                "source is {} bytes, above the maximum of {}",
                ctx.source_size, self.config.max_source_bytes
            ));
        }
        if let Some(path) = ctx.source_path {
            if !path.exists() {
                warnings.push(format!("source path {} no longer exists", path.display()));
            }
        }

        let score = if errors.is_empty() { 1.0 } else { 0.0 };
        Self::outcome(GateId::Schema, score, errors, warnings)
    }

    fn gate_structure(&self, ctx: &ValidationContext<'_>) -> GateOutcome {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut components = Vec::new();

        if ctx.document.chapters.is_empty() {
            errors.push("document has no chapters".into());
            components.push(0.0);
        } else {
            if ctx.document.has_synthetic_chapter_only() {
                warnings.push("no chapter headers found; synthetic chapter assigned".into());
            }
            components.push(1.0);
        }

        if ctx.document.article_count() == 0 {
            errors.push("document has no articles".into());
            components.push(0.0);
        } else {
            components.push(1.0);
        }

        if ctx.parse_duration > self.config.max_parse_duration {
            errors.push(format!(
                "parse took {:?}, above the {:?} budget",
                ctx.parse_duration, self.config.max_parse_duration
            ));
            components.push(0.0);
        } else {
            components.push(1.0);
        }

        let coverage = ctx.document.title_coverage();
        components.push(coverage);
        if coverage < self.config.min_title_coverage {
            errors.push(format!(
                "article title coverage {:.2} below threshold {:.2}",
                coverage, self.config.min_title_coverage
            ));
        }

        for diag in ctx.diagnostics {
            warnings.push(format!("line {}: {}", diag.line, diag.message));
        }

        let score = components.iter().sum::<f64>() / components.len() as f64;
        Self::outcome(GateId::Structure, score, errors, warnings)
    }

    fn gate_coverage(&self, ctx: &ValidationContext<'_>) -> GateOutcome {
        let mut errors = Vec::new();
        let warnings = Vec::new();

        let ratio = |actual: usize, min: usize| -> f64 {
            if min == 0 {
                1.0
            } else {
                (actual as f64 / min as f64).min(1.0)
            }
        };

        let defs = ratio(ctx.definitions.len(), self.config.min_definitions);
        if defs < 1.0 {
            errors.push(format!(
                "{} definitions extracted, expected at least {}",
                ctx.definitions.len(),
                self.config.min_definitions
            ));
        }
        let refs = ratio(ctx.references.len(), self.config.min_references);
        if refs < 1.0 {
            errors.push(format!(
                "{} references extracted, expected at least {}",
                ctx.references.len(),
                self.config.min_references
            ));
        }
        let sems = ratio(ctx.semantics.len(), self.config.min_semantics);
        if sems < 1.0 {
            errors.push(format!(
                "{} rights/obligations extracted, expected at least {}",
                ctx.semantics.len(),
                self.config.min_semantics
            ));
        }

        let score = (defs + refs + sems) / 3.0;
        Self::outcome(GateId::Coverage, score, errors, warnings)
    }

    fn gate_quality(&self, ctx: &ValidationContext<'_>) -> GateOutcome {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let report = ResolutionReport::from_resolved(ctx.resolved);
        if report.rate < self.config.min_resolution_rate {
            errors.push(format!(
                "resolution rate {:.2} below threshold {:.2}",
                report.rate, self.config.min_resolution_rate
            ));
        }

        let orphans = orphan_rate(ctx.store);
        if orphans > self.config.max_orphan_rate {
            errors.push(format!(
                "orphan article rate {orphans:.2} above threshold {:.2}",
                self.config.max_orphan_rate
            ));
        }

        let usage = definition_usage(ctx.definitions, ctx.term_usages);
        if !ctx.definitions.is_empty() && usage < self.config.min_definition_usage {
            warnings.push(format!(
                "only {:.0}% of defined terms are used outside their definition",
                usage * 100.0
            ));
        }

        let score = (report.rate + (1.0 - orphans) + usage) / 3.0;
        Self::outcome(GateId::Quality, score, errors, warnings)
    }
}

/// Fraction of articles in the store with no reference edge in either
/// direction. Zero articles count as zero orphans.
pub fn orphan_rate(store: &TripleStore) -> f64 {
    let articles: Vec<&str> = store
        .find(None, Some(pred::TYPE), Some(class::ARTICLE))
        .into_iter()
        .map(|t| t.subject.as_str())
        .collect();
    if articles.is_empty() {
        return 0.0;
    }
    let orphans = articles
        .iter()
        .filter(|a| {
            store.find(Some(a), Some(pred::REFERENCES), None).is_empty()
                && store.find(Some(a), Some(pred::REFERENCED_BY), None).is_empty()
        })
        .count();
    orphans as f64 / articles.len() as f64
}

/// Fraction of defined terms with at least one usage. 1.0 for no terms.
pub fn definition_usage(definitions: &[DefinedTerm], usages: &[TermUsage]) -> f64 {
    if definitions.is_empty() {
        return 1.0;
    }
    let used = definitions
        .iter()
        .filter(|d| usages.iter().any(|u| u.term == d.term))
        .count();
    used as f64 / definitions.len() as f64
}
