//! Named regex pattern registry driving the parser and extractors.
//!
//! Patterns are data, not code: each is a `{name, regex, flags, captures}`
//! record loaded from TOML, compiled once, and held in an immutable map.
//! The bundled defaults cover EU-style instruments; a directory of override
//! files adapts the registry to another regulation family without touching
//! the parser.

use std::collections::HashMap;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::error::PatternError;

/// Result type for pattern registry operations.
pub type PatternResult<T> = std::result::Result<T, PatternError>;

const DEFAULT_PATTERNS: &str = include_str!("patterns/default.toml");

/// One pattern record as written in a pattern file.
#[derive(Debug, Clone, Deserialize)]
pub struct PatternDef {
    pub name: String,
    pub regex: String,
    /// Regex flags: any of `i` (case-insensitive), `m` (multi-line),
    /// `s` (dot matches newline).
    #[serde(default)]
    pub flags: String,
    /// Names of the capture groups, in group order.
    #[serde(default)]
    pub captures: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PatternFile {
    #[serde(rename = "pattern", default)]
    patterns: Vec<PatternDef>,
}

/// A compiled pattern ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    pub regex: Regex,
    pub captures: Vec<String>,
}

/// Immutable name → pattern map.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: HashMap<String, CompiledPattern>,
}

impl PatternRegistry {
    /// The bundled default patterns.
    pub fn builtin() -> Self {
        // The bundled file is compiled into the binary; a failure here is a
        // build defect, not a runtime condition.
        Self::from_toml(DEFAULT_PATTERNS, "<builtin>")
            .unwrap_or_else(|e| panic!("bundled pattern file invalid: {e}"))
    }

    /// The defaults with every `*.toml` file under `dir` merged on top.
    /// Files are applied in lexical name order; later files win.
    pub fn with_overrides(dir: &Path) -> PatternResult<Self> {
        let mut registry = Self::builtin();

        let entries = std::fs::read_dir(dir).map_err(|e| PatternError::BadPatternFile {
            file: dir.display().to_string(),
            message: e.to_string(),
        })?;

        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        for file in files {
            let text =
                std::fs::read_to_string(&file).map_err(|e| PatternError::BadPatternFile {
                    file: file.display().to_string(),
                    message: e.to_string(),
                })?;
            let overrides = Self::from_toml(&text, &file.display().to_string())?;
            tracing::debug!(
                file = %file.display(),
                count = overrides.patterns.len(),
                "merged pattern overrides"
            );
            registry.patterns.extend(overrides.patterns);
        }

        Ok(registry)
    }

    fn from_toml(text: &str, origin: &str) -> PatternResult<Self> {
        let file: PatternFile = toml::from_str(text).map_err(|e| PatternError::BadPatternFile {
            file: origin.into(),
            message: e.to_string(),
        })?;

        let mut patterns = HashMap::with_capacity(file.patterns.len());
        for def in file.patterns {
            let compiled = compile(&def)?;
            patterns.insert(compiled.name.clone(), compiled);
        }
        Ok(Self { patterns })
    }

    /// Look up a pattern by name.
    pub fn get(&self, name: &str) -> Option<&CompiledPattern> {
        self.patterns.get(name)
    }

    /// Look up a pattern that the caller cannot proceed without.
    pub fn require(&self, name: &str) -> PatternResult<&CompiledPattern> {
        self.patterns
            .get(name)
            .ok_or_else(|| PatternError::Unknown { name: name.into() })
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Registered pattern names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.patterns.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn compile(def: &PatternDef) -> PatternResult<CompiledPattern> {
    let regex = RegexBuilder::new(&def.regex)
        .case_insensitive(def.flags.contains('i'))
        .multi_line(def.flags.contains('m'))
        .dot_matches_new_line(def.flags.contains('s'))
        .build()
        .map_err(|e| PatternError::InvalidRegex {
            name: def.name.clone(),
            message: e.to_string(),
        })?;

    Ok(CompiledPattern {
        name: def.name.clone(),
        regex,
        captures: def.captures.clone(),
    })
}
