//! regula CLI: regulation knowledge graphs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use regula::analysis::{crossref, impact, scenario};
use regula::bulk;
use regula::draft;
use regula::error::ConfigError;
use regula::graph::serialize::{self, ExportFormat};
use regula::graph::TripleStore;
use regula::library::{AddOptions, Library};
use regula::linkcheck::{CancelToken, CheckConfig, LinkChecker, LinkInput};
use regula::model::DocumentType;
use regula::patterns::PatternRegistry;
use regula::query::{GraphFormat, QueryOutcome, SelectFormat};
use regula::resolve::ResolutionStatus;
use regula::session::{DEFAULT_BASE_URI, IngestOptions, Session};
use regula::validate::validator::{self, RegulationProfile, ValidationStatus};
use regula::validate::{GateConfig, GateId, GatePipeline, profile};

#[derive(Parser)]
#[command(name = "regula", version, about = "Regulation knowledge graphs")]
struct Cli {
    /// Base URI for provision identifiers.
    #[arg(long, global = true, default_value = DEFAULT_BASE_URI)]
    base_uri: String,

    /// Directory of pattern override files (TOML).
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project skeleton: library, patterns, downloads.
    Init {
        /// Project directory name.
        name: String,
    },

    /// Parse a regulation and build its knowledge graph.
    Ingest {
        /// Path to the regulation text.
        source: PathBuf,

        /// Document identifier used in provision URIs (default: file stem).
        #[arg(long)]
        doc_id: Option<String>,

        /// Document type: regulation, directive, decision, generic.
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// Emit ELI enrichment triples.
        #[arg(long)]
        eli: bool,

        /// Write the graph snapshot JSON here after ingest.
        #[arg(long)]
        save_graph: Option<PathBuf>,
    },

    /// Run a SPARQL-subset query against one ingested source.
    Query {
        /// Path to the regulation text.
        source: PathBuf,

        /// Inline query string.
        #[arg(long, short = 'q')]
        query: Option<String>,

        /// Path to a query file (.rq).
        #[arg(long)]
        file: Option<PathBuf>,

        /// SELECT output: table, json, or csv.
        #[arg(long, default_value = "table")]
        format: String,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Validate an ingested regulation.
    Validate {
        /// Path to the regulation text.
        source: PathBuf,

        /// What to check: all, references, gates, links.
        #[arg(long, default_value = "all")]
        check: String,

        /// Profile: gdpr, ccpa, generic, or a YAML path.
        #[arg(long, default_value = "generic")]
        profile: String,

        /// Gates to skip (e.g. V0,V3).
        #[arg(long, value_delimiter = ',')]
        skip_gates: Vec<String>,

        /// Halt at the first failing gate.
        #[arg(long)]
        strict: bool,

        /// Treat warnings as failures.
        #[arg(long)]
        fail_on_warn: bool,

        /// Report format: text, json, markdown.
        #[arg(long, default_value = "text")]
        report: String,

        /// Suggest a profile for this document instead of validating.
        #[arg(long)]
        suggest_profile: bool,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Trace what a provision touches through reference edges.
    Impact {
        /// Path to the regulation text.
        source: PathBuf,

        /// Provision: full URI or a shorthand like Art17.
        #[arg(long)]
        provision: String,

        #[arg(long, default_value = "2")]
        depth: usize,

        /// incoming, outgoing, or both.
        #[arg(long, default_value = "both")]
        direction: String,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Match a compliance scenario against a regulation.
    Match {
        /// Path to the regulation text.
        source: PathBuf,

        /// Scenario name; omit to list the catalogue.
        #[arg(long)]
        scenario: Option<String>,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Serialise a regulation's graph.
    Export {
        /// Path to the regulation text.
        source: PathBuf,

        /// json, dot, turtle, jsonld, rdfxml, summary.
        #[arg(long, default_value = "turtle")]
        format: String,

        /// Emit ELI enrichment triples.
        #[arg(long)]
        eli: bool,

        /// Write to a file instead of stdout.
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Cross-regulation comparison over two or more sources.
    Compare {
        /// Paths to regulation texts.
        sources: Vec<PathBuf>,

        /// table, json, or dot.
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Reference summary for a regulation.
    Refs {
        /// Path to the regulation text.
        source: PathBuf,

        /// Only show external citations.
        #[arg(long)]
        external_only: bool,

        #[arg(long)]
        doc_id: Option<String>,
    },

    /// Manage the persistent regulation library.
    Library {
        /// Library directory.
        #[arg(long, default_value = "library")]
        path: PathBuf,

        #[command(subcommand)]
        action: LibraryAction,
    },

    /// Library-wide queries and templates.
    Playground {
        /// Library directory.
        #[arg(long, default_value = "library")]
        path: PathBuf,

        #[command(subcommand)]
        action: PlaygroundAction,
    },

    /// Bulk corpus sources: catalogues, downloads, ingestion.
    Bulk {
        /// Downloads directory.
        #[arg(long, default_value = "downloads")]
        dir: PathBuf,

        /// Library directory (for bulk ingest).
        #[arg(long, default_value = "library")]
        library: PathBuf,

        #[command(subcommand)]
        action: BulkAction,
    },

    /// Draft bills: parse and project amendments onto the library.
    Draft {
        /// Library directory.
        #[arg(long, default_value = "library")]
        library: PathBuf,

        #[command(subcommand)]
        action: DraftAction,
    },
}

#[derive(Subcommand)]
enum LibraryAction {
    /// Create the library layout.
    Init,
    /// Ingest a source file into the library.
    Add {
        /// Path to the regulation text.
        source: PathBuf,
        /// Document ID (default: file stem).
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        jurisdiction: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Replace an existing document with the same ID.
        #[arg(long)]
        force: bool,
        #[arg(long)]
        eli: bool,
    },
    /// Ingest the bundled starter excerpts.
    Seed,
    /// List documents.
    List,
    /// Show per-document status.
    Status,
    /// Query one or more library documents (merged store).
    Query {
        /// Inline query string.
        #[arg(long, short = 'q')]
        query: String,
        /// Documents to include (default: all ready).
        #[arg(long, value_delimiter = ',')]
        docs: Vec<String>,
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Export a library document's graph.
    Export {
        /// Document ID.
        id: String,
        #[arg(long, default_value = "turtle")]
        format: String,
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Print a document's stored source text.
    Source {
        /// Document ID.
        id: String,
    },
    /// Remove a document.
    Remove {
        /// Document ID.
        id: String,
    },
    /// Aggregate statistics.
    Stats,
}

#[derive(Subcommand)]
enum PlaygroundAction {
    /// List query templates.
    List,
    /// Run a named template against the whole library.
    Run {
        /// Template name.
        name: String,
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Run an ad-hoc query against the whole library.
    Query {
        /// Inline query string.
        query: String,
        #[arg(long, default_value = "table")]
        format: String,
    },
}

#[derive(Subcommand)]
enum BulkAction {
    /// List a source's catalogue (or all sources).
    List {
        /// uscode, cfr, california, archive, parliamentary.
        #[arg(long)]
        source: Option<String>,
    },
    /// Download a source's catalogue.
    Download {
        #[arg(long)]
        source: String,
    },
    /// Ingest downloaded files into the library.
    Ingest,
    /// Show the download manifest.
    Status,
    /// Show manifest aggregates.
    Stats,
}

#[derive(Subcommand)]
enum DraftAction {
    /// Parse a draft bill and show its amendments.
    Ingest {
        /// Path to the bill text.
        bill: PathBuf,
    },
    /// Project a bill's amendments onto the library.
    Diff {
        /// Path to the bill text.
        bill: PathBuf,
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Named query templates for the playground.
const TEMPLATES: &[(&str, &str, &str)] = &[
    (
        "articles",
        "All articles with titles",
        "SELECT ?a ?t WHERE { ?a rdf:type reg:Article . ?a reg:title ?t } ORDER BY ?a",
    ),
    (
        "definitions",
        "All defined terms",
        "SELECT ?term ?article WHERE { ?d rdf:type reg:Definition . ?d reg:normalizedTerm ?term . ?d reg:definedIn ?article } ORDER BY ?term",
    ),
    (
        "rights",
        "Articles granting rights",
        "SELECT ?a ?type WHERE { ?a reg:grantsRight ?r . ?r reg:rightType ?type } ORDER BY ?a",
    ),
    (
        "obligations",
        "Articles imposing obligations",
        "SELECT ?a ?type WHERE { ?a reg:imposesObligation ?o . ?o reg:obligationType ?type } ORDER BY ?a",
    ),
    (
        "references",
        "All reference edges",
        "SELECT ?from ?to WHERE { ?from reg:references ?to } ORDER BY ?from ?to",
    ),
];

fn registry_for(cli_patterns: Option<&Path>) -> Result<PatternRegistry> {
    match cli_patterns {
        Some(dir) => PatternRegistry::with_overrides(dir).into_diagnostic(),
        None => Ok(PatternRegistry::builtin()),
    }
}

fn doc_id_for(source: &Path, explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| {
        source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".into())
    })
}

fn ingest_source(
    cli: &Cli,
    source: &Path,
    doc_id: Option<String>,
    doc_type: Option<&str>,
    eli: bool,
) -> Result<Session> {
    let mut session = Session::new(cli.base_uri.clone())
        .with_registry(registry_for(cli.patterns.as_deref())?);
    let mut options = IngestOptions::new(doc_id_for(source, doc_id)).with_eli(eli);
    if let Some(t) = doc_type {
        options = options.with_type(DocumentType::from_flag(t));
    }
    session.ingest_file(source, &options).into_diagnostic()?;
    Ok(session)
}

fn select_format(flag: &str) -> Result<SelectFormat> {
    Ok(match flag.to_ascii_lowercase().as_str() {
        "table" => SelectFormat::Table,
        "json" => SelectFormat::Json,
        "csv" => SelectFormat::Csv,
        other => {
            return Err(ConfigError::InvalidFlags {
                message: format!("unknown select format \"{other}\""),
            })
            .into_diagnostic();
        }
    })
}

fn print_query_outcome(outcome: QueryOutcome, format: &str) -> Result<()> {
    match outcome {
        QueryOutcome::Select(result) => {
            println!(
                "{}",
                regula::query::render_select(&result, select_format(format)?)
            );
        }
        QueryOutcome::Graph(graph) => {
            let gf = match format.to_ascii_lowercase().as_str() {
                "ntriples" | "nt" => GraphFormat::NTriples,
                "json" => GraphFormat::Json,
                _ => GraphFormat::Turtle,
            };
            println!(
                "{}",
                regula::query::render_graph(&graph, gf).into_diagnostic()?
            );
        }
    }
    Ok(())
}

fn query_store(store: &TripleStore, text: &str, format: &str) -> Result<()> {
    let (outcome, metrics) = regula::query::run(store, text).into_diagnostic()?;
    print_query_outcome(outcome, format)?;
    eprintln!(
        "({} lookups, parse {:?}, execute {:?})",
        metrics.store_lookups, metrics.parse, metrics.execute
    );
    Ok(())
}

fn write_or_print(output: Option<&Path>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content).into_diagnostic()?;
            eprintln!("wrote {}", path.display());
        }
        None => println!("{content}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init { name } => {
            let root = PathBuf::from(name);
            Library::init(&root.join("library"), &cli.base_uri).into_diagnostic()?;
            std::fs::create_dir_all(root.join("patterns")).into_diagnostic()?;
            std::fs::create_dir_all(root.join("downloads")).into_diagnostic()?;
            println!("Initialised project \"{name}\"");
        }

        Commands::Ingest {
            source,
            doc_id,
            doc_type,
            eli,
            save_graph,
        } => {
            let session = ingest_source(
                &cli,
                source,
                doc_id.clone(),
                doc_type.as_deref(),
                *eli,
            )?;
            let ingested = session.current().expect("just ingested");
            let report = &ingested.report;
            println!(
                "Ingested {} ({}): {} chapters, {} articles, {} recitals",
                report.doc_id, report.doc_type, report.chapters, report.articles, report.recitals
            );
            println!(
                "Extracted {} definitions, {} references, {} rights/obligations, {} term usages",
                report.definitions, report.references, report.semantics, report.term_usages
            );
            println!(
                "Resolved {:.0}% of internal references; {} triples built",
                report.resolution.rate * 100.0,
                report.counts.triples
            );
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            if let Some(path) = save_graph {
                let snapshot = ingested.store.to_snapshot().into_diagnostic()?;
                std::fs::write(path, snapshot).into_diagnostic()?;
                eprintln!("wrote {}", path.display());
            }
        }

        Commands::Query {
            source,
            query,
            file,
            format,
            doc_id,
        } => {
            let text = match (query, file) {
                (Some(q), None) => q.clone(),
                (None, Some(path)) => std::fs::read_to_string(path).into_diagnostic()?,
                _ => {
                    return Err(ConfigError::Missing {
                        what: "exactly one of --query or --file".into(),
                    })
                    .into_diagnostic();
                }
            };
            let session = ingest_source(&cli, source, doc_id.clone(), None, false)?;
            let (outcome, metrics) = session.query(&text).into_diagnostic()?;
            print_query_outcome(outcome, format)?;
            eprintln!(
                "({} lookups, parse {:?}, execute {:?})",
                metrics.store_lookups, metrics.parse, metrics.execute
            );
        }

        Commands::Validate {
            source,
            check,
            profile: profile_flag,
            skip_gates,
            strict,
            fail_on_warn,
            report,
            suggest_profile,
            doc_id,
        } => {
            let session = ingest_source(&cli, source, doc_id.clone(), None, false)?;
            let ingested = session.current().expect("just ingested");

            if *suggest_profile {
                let suggestion = profile::suggest(
                    &ingested.document,
                    &ingested.definitions,
                    &ingested.references,
                    &ingested.semantics,
                );
                match report.as_str() {
                    "json" => println!("{}", suggestion.to_json().into_diagnostic()?),
                    _ => println!("{}", suggestion.to_yaml().into_diagnostic()?),
                }
                return Ok(());
            }

            match check.as_str() {
                "references" => {
                    let resolution = &ingested.report.resolution;
                    for (status, count) in &resolution.counts {
                        println!("{status:>10}: {count}");
                    }
                    println!(
                        "rate: {:.2} ({})",
                        resolution.rate,
                        if resolution.passes() { "PASS" } else { "FAIL" }
                    );
                    if !resolution.passes() {
                        return Err(regula::error::ValidateError::Failed {
                            failed: 1,
                            total: 1,
                        })
                        .into_diagnostic();
                    }
                }
                "links" => {
                    let inputs: Vec<LinkInput> = ingested
                        .resolved
                        .iter()
                        .filter(|r| r.status == ResolutionStatus::External)
                        .filter_map(|r| r.target.clone())
                        .filter(|uri| uri.starts_with("http"))
                        .map(LinkInput::new)
                        .collect();
                    if inputs.is_empty() {
                        println!("no external http(s) targets to check");
                        return Ok(());
                    }
                    let checker = LinkChecker::new(CheckConfig::default());
                    let results =
                        checker.validate_links(&inputs, &CancelToken::new(), None);
                    for result in &results {
                        println!("{:?}  {}", result.status, result.url);
                    }
                }
                "gates" | "all" => {
                    let resolved_profile =
                        RegulationProfile::resolve(profile_flag).into_diagnostic()?;
                    let skip: Vec<GateId> = skip_gates
                        .iter()
                        .filter_map(|s| GateId::from_flag(s))
                        .collect();
                    let config = GateConfig {
                        skip,
                        strict: *strict,
                        fail_on_warn: *fail_on_warn,
                        min_definitions: resolved_profile.min_definitions,
                        min_references: resolved_profile.min_references,
                        min_semantics: resolved_profile.min_semantics,
                        ..Default::default()
                    };
                    let gate_report = GatePipeline::new(config).run(&ingested.validation_context());

                    if check == "all" {
                        let result =
                            validator::validate(&ingested.validation_context(), &resolved_profile);
                        match report.as_str() {
                            "json" => println!("{}", result.to_json()),
                            "markdown" => println!("{}", result.to_markdown()),
                            _ => {
                                for sub in &result.subscores {
                                    println!(
                                        "{:>20}: {:.2} (threshold {:.2}) {}",
                                        sub.name,
                                        sub.score,
                                        sub.threshold,
                                        if sub.passed { "ok" } else { "BELOW" }
                                    );
                                }
                                println!(
                                    "overall: {:.2} / {:.2} -> {:?}",
                                    result.overall_score, result.threshold, result.status
                                );
                            }
                        }
                        if result.status == ValidationStatus::Fail {
                            return Err(regula::error::ValidateError::Failed {
                                failed: result.subscores.iter().filter(|s| !s.passed).count(),
                                total: result.subscores.len(),
                            })
                            .into_diagnostic();
                        }
                    }

                    for outcome in &gate_report.outcomes {
                        let state = if outcome.skipped {
                            "skipped".to_string()
                        } else if outcome.passed {
                            format!("pass  {:.2}", outcome.score)
                        } else {
                            format!("FAIL  {:.2}", outcome.score)
                        };
                        println!("{}: {state}", outcome.gate.as_str());
                        for error in &outcome.errors {
                            println!("    error: {error}");
                        }
                        for warning in &outcome.warnings {
                            println!("    warning: {warning}");
                        }
                    }
                    println!(
                        "gates: {} (score {:.2})",
                        if gate_report.overall_pass { "PASS" } else { "FAIL" },
                        gate_report.total_score
                    );
                    if !gate_report.overall_pass {
                        let failed = gate_report
                            .outcomes
                            .iter()
                            .filter(|o| !o.skipped && !o.passed)
                            .count();
                        return Err(regula::error::ValidateError::Failed {
                            failed,
                            total: gate_report.outcomes.len(),
                        })
                        .into_diagnostic();
                    }
                }
                other => {
                    return Err(ConfigError::InvalidFlags {
                        message: format!("unknown check \"{other}\""),
                    })
                    .into_diagnostic();
                }
            }
        }

        Commands::Impact {
            source,
            provision,
            depth,
            direction,
            doc_id,
        } => {
            let session = ingest_source(&cli, source, doc_id.clone(), None, false)?;
            let ingested = session.current().expect("just ingested");
            let direction = impact::ImpactDirection::from_flag(direction).ok_or_else(|| {
                ConfigError::InvalidFlags {
                    message: format!("unknown direction \"{direction}\""),
                }
            })
            .into_diagnostic()?;
            let uri = if provision.contains("://") {
                provision.clone()
            } else {
                format!("{}{}:{}", cli.base_uri, ingested.doc_id, provision)
            };
            let result = impact::analyze(&ingested.store, &uri, *depth, direction);
            println!("impact of {} (depth {}):", result.provision, result.depth);
            println!("  direct ({}):", result.direct.len());
            for hit in &result.direct {
                println!("    {hit}");
            }
            println!("  transitive ({}):", result.transitive.len());
            for hit in &result.transitive {
                println!("    [{}] {}", hit.depth, hit.uri);
            }
            for (layer, count) in &result.layer_counts {
                println!("  layer {layer}: {count}");
            }
        }

        Commands::Match {
            source,
            scenario: scenario_flag,
            doc_id,
        } => {
            let Some(name) = scenario_flag else {
                println!("available scenarios:");
                for s in scenario::SCENARIOS {
                    println!("  {:<24} {}", s.name, s.description);
                }
                return Ok(());
            };
            let found = scenario::find(name).ok_or_else(|| ConfigError::InvalidFlags {
                message: format!("unknown scenario \"{name}\""),
            })
            .into_diagnostic()?;
            let session = ingest_source(&cli, source, doc_id.clone(), None, false)?;
            let ingested = session.current().expect("just ingested");
            let result = scenario::match_scenario(&ingested.store, found);
            println!(
                "scenario {}: coverage {:.0}%",
                result.scenario,
                result.coverage * 100.0
            );
            for matched in &result.matched {
                println!("  {} <- {}", matched.category, matched.articles.join(", "));
            }
            for missing in &result.missing {
                println!("  MISSING {missing}");
            }
        }

        Commands::Export {
            source,
            format,
            eli,
            output,
            doc_id,
        } => {
            let session = ingest_source(&cli, source, doc_id.clone(), None, *eli)?;
            let ingested = session.current().expect("just ingested");
            let format = ExportFormat::from_flag(format).ok_or_else(|| {
                ConfigError::InvalidFlags {
                    message: format!("unknown export format \"{format}\""),
                }
            })
            .into_diagnostic()?;
            let content = serialize::export(&ingested.store, format).into_diagnostic()?;
            write_or_print(output.as_deref(), &content)?;
        }

        Commands::Compare { sources, format } => {
            if sources.len() < 2 {
                return Err(ConfigError::Missing {
                    what: "at least two sources to compare".into(),
                })
                .into_diagnostic();
            }
            let mut docs = Vec::new();
            for source in sources {
                let session = ingest_source(&cli, source, None, None, false)?;
                let ingested = session.current().expect("just ingested");
                docs.push((ingested.doc_id.clone(), ingested.store.clone()));
            }
            let report = crossref::analyze(&docs, &cli.base_uri);
            match format.as_str() {
                "json" => println!("{}", report.to_json()),
                "dot" => println!("{}", report.to_dot()),
                _ => println!("{}", report.to_table()),
            }
        }

        Commands::Refs {
            source,
            external_only,
            doc_id,
        } => {
            let session = ingest_source(&cli, source, doc_id.clone(), None, false)?;
            let ingested = session.current().expect("just ingested");
            for resolved in &ingested.resolved {
                let external = resolved.status == ResolutionStatus::External;
                if *external_only && !external {
                    continue;
                }
                println!(
                    "Art{:>3} {:>10} {:>6}  {}  {}",
                    resolved.reference.source_article,
                    resolved.status.as_str(),
                    format!("{:?}", resolved.confidence).to_lowercase(),
                    resolved.target.as_deref().unwrap_or("-"),
                    resolved.reference.raw
                );
            }
            let resolution = &ingested.report.resolution;
            println!(
                "{} references, {} internal, rate {:.2}",
                resolution.total, resolution.internal_total, resolution.rate
            );
        }

        Commands::Library { path, action } => {
            run_library(&cli, path, action)?;
        }

        Commands::Playground { path, action } => {
            let library = Library::open(path).into_diagnostic()?;
            match action {
                PlaygroundAction::List => {
                    for (name, description, _) in TEMPLATES {
                        println!("  {name:<16} {description}");
                    }
                }
                PlaygroundAction::Run { name, format } => {
                    let template = TEMPLATES
                        .iter()
                        .find(|(n, _, _)| n == name)
                        .ok_or_else(|| ConfigError::InvalidFlags {
                            message: format!("unknown template \"{name}\""),
                        })
                        .into_diagnostic()?;
                    let store = library.load_all_triple_stores().into_diagnostic()?;
                    query_store(&store, template.2, format)?;
                }
                PlaygroundAction::Query { query, format } => {
                    let store = library.load_all_triple_stores().into_diagnostic()?;
                    query_store(&store, query, format)?;
                }
            }
        }

        Commands::Bulk {
            dir,
            library: library_path,
            action,
        } => match action {
            BulkAction::List { source } => {
                let sources: Vec<bulk::Source> = match source {
                    Some(s) => vec![bulk::Source::from_flag(s).into_diagnostic()?],
                    None => bulk::Source::ALL.to_vec(),
                };
                for s in sources {
                    println!("{}:", s.name());
                    for record in s.catalog() {
                        println!("  {:<16} {}  {}", record.identifier, record.title, record.url);
                    }
                }
            }
            BulkAction::Download { source } => {
                let source = bulk::Source::from_flag(source).into_diagnostic()?;
                let fetcher = bulk::HttpFetcher::default();
                let stats =
                    bulk::download(source, dir, &fetcher, &bulk::RetryPolicy::default())
                        .into_diagnostic()?;
                println!(
                    "{} downloaded, {} resumed, {} failed",
                    stats.downloaded, stats.resumed, stats.failed
                );
            }
            BulkAction::Ingest => {
                let library = Library::open(library_path).into_diagnostic()?;
                let registry = registry_for(cli.patterns.as_deref())?;
                let stats =
                    bulk::ingest_downloads(&library, dir, &registry).into_diagnostic()?;
                println!(
                    "{} ingested, {} skipped, {} failed",
                    stats.ingested, stats.skipped, stats.failed
                );
            }
            BulkAction::Status => {
                let manifest =
                    bulk::DownloadManifest::load(&dir.join("manifest.json")).into_diagnostic()?;
                for entry in manifest.downloads.values() {
                    println!(
                        "{:<16} {:>10} bytes  {}",
                        entry.identifier, entry.size_bytes, entry.url
                    );
                }
            }
            BulkAction::Stats => {
                let manifest =
                    bulk::DownloadManifest::load(&dir.join("manifest.json")).into_diagnostic()?;
                let mut by_source: HashMap<&str, (usize, u64)> = HashMap::new();
                for entry in manifest.downloads.values() {
                    let slot = by_source.entry(entry.source_name.as_str()).or_default();
                    slot.0 += 1;
                    slot.1 += entry.size_bytes;
                }
                for (source, (count, bytes)) in by_source {
                    println!("{source:<16} {count} downloads, {bytes} bytes");
                }
            }
        },

        Commands::Draft {
            library: library_path,
            action,
        } => match action {
            DraftAction::Ingest { bill } => {
                let text = std::fs::read_to_string(bill).into_diagnostic()?;
                let parsed = draft::parse_draft(&text).into_diagnostic()?;
                if let Some(title) = &parsed.metadata.title {
                    println!("{title}");
                }
                if let Some(number) = &parsed.metadata.bill_number {
                    println!("bill {number}");
                }
                println!("{} sections", parsed.sections.len());
                for amendment in draft::recognize_amendments(&parsed) {
                    println!(
                        "  {:?} -> section {}",
                        amendment.kind,
                        amendment.target_section.as_deref().unwrap_or("?")
                    );
                }
            }
            DraftAction::Diff { bill, format } => {
                let text = std::fs::read_to_string(bill).into_diagnostic()?;
                let parsed = draft::parse_draft(&text).into_diagnostic()?;
                let library = Library::open(library_path).into_diagnostic()?;
                let diff = draft::compute_diff(&library, &parsed).into_diagnostic()?;
                if format == "json" {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&diff).into_diagnostic()?
                    );
                } else {
                    for d in &diff.diffs {
                        println!(
                            "{:?} {} ({} triples, {} in-refs, {} out-refs)",
                            d.change,
                            d.target_uri,
                            d.affected_triples,
                            d.crossrefs_to.len(),
                            d.crossrefs_from.len()
                        );
                    }
                    for amendment in &diff.unresolved {
                        println!(
                            "UNRESOLVED {:?} section {}",
                            amendment.kind,
                            amendment.target_section.as_deref().unwrap_or("?")
                        );
                    }
                    println!("{} triples invalidated", diff.triples_invalidated);
                }
            }
        },
    }

    Ok(())
}

fn run_library(cli: &Cli, path: &Path, action: &LibraryAction) -> Result<()> {
    match action {
        LibraryAction::Init => {
            Library::init(path, &cli.base_uri).into_diagnostic()?;
            println!("library initialised at {}", path.display());
        }
        LibraryAction::Add {
            source,
            id,
            name,
            jurisdiction,
            tags,
            force,
            eli,
        } => {
            let library = Library::open(path).into_diagnostic()?;
            let registry = registry_for(cli.patterns.as_deref())?;
            let text = std::fs::read_to_string(source).into_diagnostic()?;
            let doc_id = doc_id_for(source, id.clone());
            let options = AddOptions {
                name: name.clone(),
                jurisdiction: jurisdiction.clone(),
                tags: tags.clone(),
                force: *force,
                eli: *eli,
                origin: Some(source.display().to_string()),
                doc_type: None,
            };
            let report = library
                .add_document(&doc_id, &text, &options, &registry)
                .into_diagnostic()?;
            println!(
                "added {}: {} articles, {} triples, rate {:.2}",
                doc_id, report.articles, report.counts.triples, report.resolution.rate
            );
        }
        LibraryAction::Seed => {
            let library = Library::open(path).into_diagnostic()?;
            let registry = registry_for(cli.patterns.as_deref())?;
            let added = library.seed(&registry).into_diagnostic()?;
            println!("seeded {added} documents");
        }
        LibraryAction::List => {
            let library = Library::open(path).into_diagnostic()?;
            for entry in library.list().into_diagnostic()? {
                println!(
                    "{:<20} {:<8} {:<12} {} articles, {} triples",
                    entry.id,
                    entry.status.as_str(),
                    entry.jurisdiction,
                    entry.stats.articles,
                    entry.stats.triples
                );
            }
        }
        LibraryAction::Status => {
            let library = Library::open(path).into_diagnostic()?;
            for entry in library.list().into_diagnostic()? {
                println!(
                    "{:<20} {:<8} added {} updated {} rate {:.2}",
                    entry.id,
                    entry.status.as_str(),
                    entry.added_at,
                    entry.updated_at,
                    entry.stats.resolution_rate
                );
            }
        }
        LibraryAction::Query {
            query,
            docs,
            format,
        } => {
            let library = Library::open(path).into_diagnostic()?;
            let store = if docs.is_empty() {
                library.load_all_triple_stores().into_diagnostic()?
            } else {
                let ids: Vec<&str> = docs.iter().map(String::as_str).collect();
                library.load_merged_triple_store(&ids).into_diagnostic()?
            };
            query_store(&store, query, format)?;
        }
        LibraryAction::Export { id, format, output } => {
            let library = Library::open(path).into_diagnostic()?;
            let store = library.load_triple_store(id).into_diagnostic()?;
            let format = ExportFormat::from_flag(format).ok_or_else(|| {
                ConfigError::InvalidFlags {
                    message: format!("unknown export format \"{format}\""),
                }
            })
            .into_diagnostic()?;
            let content = serialize::export(&store, format).into_diagnostic()?;
            write_or_print(output.as_deref(), &content)?;
        }
        LibraryAction::Source { id } => {
            let library = Library::open(path).into_diagnostic()?;
            print!("{}", library.load_source(id).into_diagnostic()?);
        }
        LibraryAction::Remove { id } => {
            let library = Library::open(path).into_diagnostic()?;
            library.remove_document(id).into_diagnostic()?;
            println!("removed {id}");
        }
        LibraryAction::Stats => {
            let library = Library::open(path).into_diagnostic()?;
            let stats = library.stats().into_diagnostic()?;
            println!("{} documents, {} triples", stats.documents, stats.total_triples);
            for (jurisdiction, count) in &stats.by_jurisdiction {
                println!("  {jurisdiction}: {count}");
            }
            for (status, count) in &stats.by_status {
                println!("  {status}: {count}");
            }
        }
    }
    Ok(())
}
