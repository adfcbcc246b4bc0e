//! SPARQL-subset query engine: parser, executor, and result rendering.
//!
//! The subset covers SELECT / CONSTRUCT / DESCRIBE with triple patterns,
//! OPTIONAL blocks, FILTER (CONTAINS / STR / equality / logical operators),
//! ORDER BY, LIMIT, OFFSET, and DISTINCT. Queries never mutate the store.

pub mod ast;
pub mod exec;
pub mod parser;

use std::time::Instant;

use crate::error::QueryError;
use crate::graph::{TripleStore, serialize};

pub use ast::Query;
pub use exec::{Executor, QueryMetrics, QueryOutcome, SelectResult};
pub use parser::QueryParser;

/// Output renderings for SELECT results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectFormat {
    #[default]
    Table,
    Json,
    Csv,
}

/// Output renderings for CONSTRUCT / DESCRIBE results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphFormat {
    #[default]
    Turtle,
    NTriples,
    Json,
}

/// Parse and execute a query against a store.
pub fn run(store: &TripleStore, text: &str) -> Result<(QueryOutcome, QueryMetrics), QueryError> {
    let parse_started = Instant::now();
    let query = QueryParser::parse(text)?;
    let parse = parse_started.elapsed();

    let (outcome, mut metrics) = Executor::new(store).execute(&query)?;
    metrics.parse = parse;
    tracing::debug!(
        parse_us = metrics.parse.as_micros() as u64,
        execute_us = metrics.execute.as_micros() as u64,
        lookups = metrics.store_lookups,
        "query executed"
    );
    Ok((outcome, metrics))
}

/// Render a SELECT result.
pub fn render_select(result: &SelectResult, format: SelectFormat) -> String {
    match format {
        SelectFormat::Table => render_table(result),
        SelectFormat::Json => serde_json::json!({
            "columns": result.columns,
            "rows": result.rows,
        })
        .to_string(),
        SelectFormat::Csv => render_csv(result),
    }
}

/// Render a graph result.
pub fn render_graph(store: &TripleStore, format: GraphFormat) -> Result<String, QueryError> {
    Ok(match format {
        GraphFormat::Turtle => serialize::to_turtle(store),
        GraphFormat::NTriples => serialize::to_ntriples(store),
        GraphFormat::Json => serialize::to_json(store).map_err(|e| QueryError::Execution {
            message: e.to_string(),
        })?,
    })
}

/// Column-padded plain-text table.
fn render_table(result: &SelectResult) -> String {
    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len() + 1).collect();
    for row in &result.rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = result
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("?{:<width$}", c, width = widths[i].saturating_sub(1)))
        .collect();
    out.push_str(&header.join("  "));
    out.push('\n');
    out.push_str(&"-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    out.push('\n');
    for row in &result.rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
            .collect();
        out.push_str(cells.join("  ").trim_end());
        out.push('\n');
    }
    out
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn render_csv(result: &SelectResult) -> String {
    let mut out = String::new();
    out.push_str(
        &result
            .columns
            .iter()
            .map(|c| csv_escape(c))
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    for row in &result.rows {
        out.push_str(
            &row.iter()
                .map(|c| csv_escape(c))
                .collect::<Vec<_>>()
                .join(","),
        );
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Object;
    use crate::graph::ontology::pred;

    fn store() -> TripleStore {
        let mut store = TripleStore::new();
        store.insert(
            "https://regula.dev/GDPR:Art1",
            pred::TITLE,
            Object::Literal("Subject, with comma".into()),
        );
        store
    }

    #[test]
    fn run_returns_metrics() {
        let (outcome, metrics) = run(&store(), "SELECT ?s WHERE { ?s reg:title ?t }").unwrap();
        match outcome {
            QueryOutcome::Select(r) => assert_eq!(r.rows.len(), 1),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(metrics.store_lookups >= 1);
    }

    #[test]
    fn table_rendering_pads_columns() {
        let result = SelectResult {
            columns: vec!["a".into(), "title".into()],
            rows: vec![vec!["x".into(), "y".into()]],
        };
        let table = render_select(&result, SelectFormat::Table);
        let lines: Vec<&str> = table.lines().collect();
        assert!(lines[0].starts_with("?a"));
        assert!(lines[0].contains("?title"));
        assert!(lines[1].starts_with("---"));
        assert!(lines[2].starts_with('x'));
    }

    #[test]
    fn csv_escapes_commas_and_quotes() {
        let result = SelectResult {
            columns: vec!["t".into()],
            rows: vec![vec!["a, \"quoted\"".into()]],
        };
        let csv = render_select(&result, SelectFormat::Csv);
        assert!(csv.contains("\"a, \"\"quoted\"\"\""));
    }

    #[test]
    fn json_rendering_has_columns_and_rows() {
        let result = SelectResult {
            columns: vec!["s".into()],
            rows: vec![vec!["v".into()]],
        };
        let json: serde_json::Value =
            serde_json::from_str(&render_select(&result, SelectFormat::Json)).unwrap();
        assert_eq!(json["columns"][0], "s");
        assert_eq!(json["rows"][0][0], "v");
    }

    #[test]
    fn graph_render_formats() {
        let s = store();
        assert!(render_graph(&s, GraphFormat::Turtle).unwrap().contains("@prefix"));
        assert!(render_graph(&s, GraphFormat::NTriples)
            .unwrap()
            .contains("Subject, with comma"));
        assert!(render_graph(&s, GraphFormat::Json).unwrap().starts_with('['));
    }
}
