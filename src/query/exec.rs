//! Query execution: pattern-at-a-time binding joins over the triple store.
//!
//! Each required pattern extends the binding set; OPTIONAL groups left-join;
//! FILTER prunes finalised rows; ORDER BY, DISTINCT, LIMIT and OFFSET apply
//! last. Absent ORDER BY, row order follows the join order dictated by the
//! query's pattern sequence, which is deterministic for a fixed store.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::graph::{Object, TripleStore};
use crate::query::ast::*;

/// One row of variable bindings.
type Row = BTreeMap<String, Object>;

/// Tabular result of a SELECT query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Execution timings and counters returned with every result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryMetrics {
    pub parse: Duration,
    pub execute: Duration,
    /// Number of triple-store lookups performed.
    pub store_lookups: usize,
}

/// The result of executing a query.
#[derive(Debug)]
pub enum QueryOutcome {
    Select(SelectResult),
    /// CONSTRUCT and DESCRIBE produce a graph.
    Graph(TripleStore),
}

pub struct Executor<'s> {
    store: &'s TripleStore,
    lookups: usize,
}

impl<'s> Executor<'s> {
    pub fn new(store: &'s TripleStore) -> Self {
        Self { store, lookups: 0 }
    }

    /// Execute a parsed query. The store is never mutated.
    pub fn execute(mut self, query: &Query) -> Result<(QueryOutcome, QueryMetrics), QueryError> {
        let started = Instant::now();

        let mut rows = self.join_patterns(vec![Row::new()], &query.patterns);
        for optional in &query.optionals {
            rows = self.left_join(rows, optional);
        }
        rows.retain(|row| query.filters.iter().all(|f| eval_filter(f, row)));
        sort_rows(&mut rows, &query.order_by);

        let outcome = match &query.form {
            QueryForm::Select { vars, distinct } => {
                let columns = if vars.is_empty() {
                    query.pattern_vars()
                } else {
                    vars.clone()
                };
                let mut table: Vec<Vec<String>> = rows
                    .iter()
                    .map(|row| {
                        columns
                            .iter()
                            .map(|c| row.get(c).map(|o| o.as_str().to_string()).unwrap_or_default())
                            .collect()
                    })
                    .collect();
                if *distinct {
                    let mut seen = std::collections::HashSet::new();
                    table.retain(|row| seen.insert(row.clone()));
                }
                let table = apply_slice(table, query.offset, query.limit);
                QueryOutcome::Select(SelectResult {
                    columns,
                    rows: table,
                })
            }
            QueryForm::Construct { template } => {
                let rows = apply_slice(rows, query.offset, query.limit);
                let mut out = TripleStore::new();
                for row in &rows {
                    for pattern in template {
                        if let Some(triple) = instantiate(pattern, row) {
                            out.insert_triple(triple);
                        }
                    }
                }
                QueryOutcome::Graph(out)
            }
            QueryForm::Describe { targets } => {
                let mut uris: Vec<String> = Vec::new();
                for target in targets {
                    match target {
                        Term::Iri(iri) => uris.push(iri.clone()),
                        Term::Var(var) => {
                            for row in &rows {
                                if let Some(value) = row.get(var) {
                                    if !uris.iter().any(|u| u == value.as_str()) {
                                        uris.push(value.as_str().to_string());
                                    }
                                }
                            }
                        }
                        Term::Literal(_) => {}
                    }
                }
                let mut out = TripleStore::new();
                for uri in &uris {
                    self.lookups += 2;
                    for t in self.store.find(Some(uri), None, None) {
                        out.insert_triple(t.clone());
                    }
                    for t in self.store.find(None, None, Some(uri)) {
                        out.insert_triple(t.clone());
                    }
                }
                QueryOutcome::Graph(out)
            }
        };

        let metrics = QueryMetrics {
            parse: Duration::ZERO,
            execute: started.elapsed(),
            store_lookups: self.lookups,
        };
        Ok((outcome, metrics))
    }

    fn join_patterns(&mut self, rows: Vec<Row>, patterns: &[TriplePattern]) -> Vec<Row> {
        let mut current = rows;
        for pattern in patterns {
            let mut next = Vec::new();
            for row in &current {
                self.extend_row(row, pattern, &mut next);
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        current
    }

    fn left_join(&mut self, rows: Vec<Row>, group: &[TriplePattern]) -> Vec<Row> {
        let mut out = Vec::new();
        for row in rows {
            let extended = self.join_patterns(vec![row.clone()], group);
            if extended.is_empty() {
                out.push(row);
            } else {
                out.extend(extended);
            }
        }
        out
    }

    fn extend_row(&mut self, row: &Row, pattern: &TriplePattern, out: &mut Vec<Row>) {
        let bound = |term: &Term| -> Option<String> {
            match term {
                Term::Var(v) => row.get(v).map(|o| o.as_str().to_string()),
                Term::Iri(iri) => Some(iri.clone()),
                Term::Literal(lit) => Some(lit.clone()),
            }
        };
        let s = bound(&pattern.subject);
        let p = bound(&pattern.predicate);
        let o = bound(&pattern.object);

        self.lookups += 1;
        for triple in self.store.find(s.as_deref(), p.as_deref(), o.as_deref()) {
            let mut extended = row.clone();
            let mut consistent = true;
            let mut bind = |term: &Term, value: Object| {
                if let Term::Var(v) = term {
                    match extended.get(v) {
                        Some(existing) if existing.as_str() != value.as_str() => {
                            consistent = false;
                        }
                        _ => {
                            extended.insert(v.clone(), value);
                        }
                    }
                }
            };
            bind(&pattern.subject, Object::Iri(triple.subject.clone()));
            bind(&pattern.predicate, Object::Iri(triple.predicate.clone()));
            bind(&pattern.object, triple.object.clone());
            if consistent {
                out.push(extended);
            }
        }
    }
}

fn instantiate(pattern: &TriplePattern, row: &Row) -> Option<crate::graph::Triple> {
    let resolve = |term: &Term| -> Option<Object> {
        match term {
            Term::Var(v) => row.get(v).cloned(),
            Term::Iri(iri) => Some(Object::Iri(iri.clone())),
            Term::Literal(lit) => Some(Object::Literal(lit.clone())),
        }
    };
    let subject = resolve(&pattern.subject)?;
    let predicate = resolve(&pattern.predicate)?;
    let object = resolve(&pattern.object)?;
    Some(crate::graph::Triple::new(
        subject.as_str(),
        predicate.as_str(),
        object,
    ))
}

fn eval_value(expr: &ValueExpr, row: &Row) -> Option<String> {
    match expr {
        ValueExpr::Var(v) => row.get(v).map(|o| o.as_str().to_string()),
        ValueExpr::Constant(c) => Some(c.clone()),
        ValueExpr::Str(inner) => eval_value(inner, row),
    }
}

/// Evaluate a filter over a finalised row. Unbound variables make the
/// enclosing comparison false.
fn eval_filter(filter: &FilterExpr, row: &Row) -> bool {
    match filter {
        FilterExpr::Contains(hay, needle) => match (eval_value(hay, row), eval_value(needle, row)) {
            (Some(h), Some(n)) => h.contains(&n),
            _ => false,
        },
        FilterExpr::Equals(a, b) => match (eval_value(a, row), eval_value(b, row)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        FilterExpr::NotEquals(a, b) => match (eval_value(a, row), eval_value(b, row)) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        },
        FilterExpr::And(l, r) => eval_filter(l, row) && eval_filter(r, row),
        FilterExpr::Or(l, r) => eval_filter(l, row) || eval_filter(r, row),
        FilterExpr::Not(inner) => !eval_filter(inner, row),
    }
}

/// Stable lexicographic sort on the referenced columns.
fn sort_rows(rows: &mut [Row], keys: &[OrderKey]) {
    if keys.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in keys {
            let left = a.get(&key.var).map(|o| o.as_str()).unwrap_or("");
            let right = b.get(&key.var).map(|o| o.as_str()).unwrap_or("");
            let ord = left.cmp(right);
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn apply_slice<T>(rows: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    let mut iter = rows.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(n) => iter.by_ref().take(n).collect(),
        None => iter.collect(),
    }
}
