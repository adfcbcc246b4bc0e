//! Rich diagnostic error types for the regula engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so users know exactly what went wrong
//! and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the regula engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum RegulaError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validate(#[from] ValidateError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Library(#[from] LibraryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Bulk(#[from] BulkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Pattern registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PatternError {
    #[error("invalid regex for pattern \"{name}\": {message}")]
    #[diagnostic(
        code(regula::pattern::invalid_regex),
        help(
            "The pattern's regular expression failed to compile. \
             Check the pattern file for unbalanced groups or unsupported syntax."
        )
    )]
    InvalidRegex { name: String, message: String },

    #[error("unreadable pattern file {file}: {message}")]
    #[diagnostic(
        code(regula::pattern::bad_file),
        help(
            "The pattern override file could not be read or parsed as TOML. \
             Each file must contain one or more [[pattern]] tables with \
             name, regex, and captures keys."
        )
    )]
    BadPatternFile { file: String, message: String },

    #[error("unknown pattern \"{name}\"")]
    #[diagnostic(
        code(regula::pattern::unknown),
        help(
            "The parser asked for a pattern the registry does not hold. \
             Built-in names cover the defaults; override files may only \
             replace or extend them, not remove them."
        )
    )]
    Unknown { name: String },
}

// ---------------------------------------------------------------------------
// Parser errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("structural parse failure at line {line}: {reason}")]
    #[diagnostic(
        code(regula::parse::structural),
        help(
            "The parser reached a state it cannot recover from. \
             Unrecognised lines are normally skipped; this error indicates \
             something deeper, such as an impossible state transition."
        )
    )]
    Structural { line: usize, reason: String },

    #[error("I/O error reading source: {source}")]
    #[diagnostic(
        code(regula::parse::io),
        help("Check that the source file exists and is readable.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Graph / triple store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("malformed graph snapshot: {message}")]
    #[diagnostic(
        code(regula::graph::snapshot),
        help(
            "A graph JSON snapshot must be an array of objects with \
             subject, predicate, and object string fields."
        )
    )]
    Snapshot { message: String },

    #[error("serialisation to {format} failed: {message}")]
    #[diagnostic(
        code(regula::graph::serialize),
        help("The triple store could not be rendered in the requested format.")
    )]
    Serialize { format: String, message: String },

    #[error("malformed N-Triples at line {line}: {message}")]
    #[diagnostic(
        code(regula::graph::ntriples),
        help(
            "Each N-Triples line must be `<s> <p> <o> .` or `<s> <p> \"literal\" .`. \
             Comment lines starting with # are skipped."
        )
    )]
    NTriples { line: usize, message: String },
}

// ---------------------------------------------------------------------------
// Query errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum QueryError {
    #[error("query parse error at {position}: {message}")]
    #[diagnostic(
        code(regula::query::parse),
        help(
            "The query does not match the supported SPARQL subset: \
             SELECT / CONSTRUCT / DESCRIBE with triple patterns, OPTIONAL, \
             FILTER, ORDER BY, LIMIT, OFFSET, and DISTINCT."
        )
    )]
    Parse { position: usize, message: String },

    #[error("query execution error: {message}")]
    #[diagnostic(
        code(regula::query::execution),
        help("The query parsed but could not be evaluated against the store.")
    )]
    Execution { message: String },

    #[error("unknown prefix \"{prefix}\"")]
    #[diagnostic(
        code(regula::query::unknown_prefix),
        help(
            "Declare the prefix with a PREFIX line, or use one of the \
             built-ins: reg, rdf, rdfs, prov, eli."
        )
    )]
    UnknownPrefix { prefix: String },
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ValidateError {
    #[error("unreadable profile {path}: {message}")]
    #[diagnostic(
        code(regula::validate::profile),
        help(
            "Regulation profiles are YAML documents. Use `regula validate \
             --profile gdpr|ccpa|generic` for the built-ins, or pass a path \
             to a YAML file."
        )
    )]
    ProfileIo { path: String, message: String },

    #[error("threshold \"{name}\" out of range: {value}")]
    #[diagnostic(
        code(regula::validate::threshold),
        help("Thresholds and scores are fractions in the range 0.0 to 1.0.")
    )]
    BadThreshold { name: String, value: f64 },

    #[error("validation failed: {failed} of {total} gates below threshold")]
    #[diagnostic(
        code(regula::validate::failed),
        help(
            "One or more gates scored below their configured threshold. \
             Inspect the gate report for per-gate errors and warnings."
        )
    )]
    Failed { failed: usize, total: usize },
}

// ---------------------------------------------------------------------------
// Library errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LibraryError {
    #[error("document not found: \"{id}\"")]
    #[diagnostic(
        code(regula::library::not_found),
        help(
            "No document with this ID exists in the library. \
             List available documents with `regula library list`."
        )
    )]
    DocumentNotFound { id: String },

    #[error("duplicate document: \"{id}\" already exists in the library")]
    #[diagnostic(
        code(regula::library::duplicate),
        help(
            "A document with this ID already exists. Remove it first with \
             `regula library remove {id}`, or pass --force to replace it."
        )
    )]
    Duplicate { id: String },

    #[error("not a regula library: {path}")]
    #[diagnostic(
        code(regula::library::not_initialized),
        help("Initialise the directory first with `regula library init`.")
    )]
    NotInitialized { path: String },

    #[error("metadata I/O error: {message}")]
    #[diagnostic(
        code(regula::library::metadata_io),
        help(
            "Failed to read or write metadata.json. Check that the library \
             directory exists and has correct permissions."
        )
    )]
    MetadataIo { message: String },

    #[error("ingestion failed for \"{id}\": {message}")]
    #[diagnostic(
        code(regula::library::ingest_failed),
        help(
            "The ingestion pipeline failed for this document. Partial \
             per-document files have been removed; the library is unchanged."
        )
    )]
    IngestFailed { id: String, message: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(regula::library::io),
        help("A filesystem operation failed. Check file paths and permissions.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),
}

// ---------------------------------------------------------------------------
// Link-check errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum LinkError {
    #[error("invalid URL: \"{url}\"")]
    #[diagnostic(
        code(regula::link::invalid_url),
        help("URLs must be absolute with an http or https scheme and a host.")
    )]
    InvalidUrl { url: String },

    #[error("link check cancelled after {completed} of {total} URLs")]
    #[diagnostic(
        code(regula::link::cancelled),
        help("The cancellation token was triggered. Partial results were returned.")
    )]
    Cancelled { completed: usize, total: usize },
}

// ---------------------------------------------------------------------------
// Draft diff errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum DraftError {
    #[error("empty draft: no sections recognised")]
    #[diagnostic(
        code(regula::draft::empty),
        help(
            "Draft bills are recognised by SEC. / SECTION headers. \
             Check that the file is a plain-text bill."
        )
    )]
    Empty,

    #[error("I/O error reading draft: {source}")]
    #[diagnostic(
        code(regula::draft::io),
        help("Check that the draft file exists and is readable.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Bulk source errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum BulkError {
    #[error("unknown bulk source: \"{name}\"")]
    #[diagnostic(
        code(regula::bulk::unknown_source),
        help("Known sources: uscode, cfr, california, archive, parliamentary.")
    )]
    UnknownSource { name: String },

    #[error("download failed for {url}: {message}")]
    #[diagnostic(
        code(regula::bulk::download),
        help(
            "The fetch exhausted its retries. 4xx responses are not retried; \
             5xx and transport errors are retried with exponential backoff."
        )
    )]
    Download { url: String, message: String },

    #[error("manifest I/O error: {message}")]
    #[diagnostic(
        code(regula::bulk::manifest),
        help("Failed to read or write downloads/manifest.json.")
    )]
    Manifest { message: String },

    #[error("I/O error: {source}")]
    #[diagnostic(
        code(regula::bulk::io),
        help("A filesystem operation failed. Check file paths and permissions.")
    )]
    Io {
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid flag combination: {message}")]
    #[diagnostic(
        code(regula::config::flags),
        help("See `regula --help` for valid flag combinations per command.")
    )]
    InvalidFlags { message: String },

    #[error("missing required input: {what}")]
    #[diagnostic(
        code(regula::config::missing),
        help("Provide the missing input. {what} is required for this command.")
    )]
    Missing { what: String },
}

/// Convenience alias for functions returning regula results.
pub type RegulaResult<T> = std::result::Result<T, RegulaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_error_converts_to_regula_error() {
        let err = PatternError::Unknown {
            name: "article_header".into(),
        };
        let top: RegulaError = err.into();
        assert!(matches!(top, RegulaError::Pattern(PatternError::Unknown { .. })));
    }

    #[test]
    fn library_error_wraps_graph_error() {
        let err = GraphError::Snapshot {
            message: "not an array".into(),
        };
        let lib: LibraryError = err.into();
        assert!(matches!(lib, LibraryError::Graph(GraphError::Snapshot { .. })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = QueryError::Parse {
            position: 17,
            message: "expected WHERE".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("17"));
        assert!(msg.contains("expected WHERE"));
    }
}
