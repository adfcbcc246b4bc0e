//! Abstract syntax for the supported SPARQL subset.

/// One position of a triple pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// `?name`
    Var(String),
    /// A resource: prefixed name or `<absolute>` IRI, in canonical store form.
    Iri(String),
    /// `"quoted"` literal.
    Literal(String),
}

impl Term {
    pub fn as_var(&self) -> Option<&str> {
        match self {
            Self::Var(v) => Some(v),
            _ => None,
        }
    }
}

/// A triple pattern in a WHERE block or CONSTRUCT template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl TriplePattern {
    /// Variables in subject, predicate, object order.
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .filter_map(|t| t.as_var())
    }
}

/// A value inside a FILTER expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpr {
    Var(String),
    Constant(String),
    /// `STR(expr)`: the plain string form of a binding.
    Str(Box<ValueExpr>),
}

/// A FILTER expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// `CONTAINS(haystack, needle)`, case-sensitive substring.
    Contains(ValueExpr, ValueExpr),
    Equals(ValueExpr, ValueExpr),
    NotEquals(ValueExpr, ValueExpr),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Or(Box<FilterExpr>, Box<FilterExpr>),
    Not(Box<FilterExpr>),
}

/// One ORDER BY key. ASC is the default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub var: String,
    pub descending: bool,
}

/// The query form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryForm {
    Select {
        /// Projected variables in declaration order. Empty means `*`.
        vars: Vec<String>,
        distinct: bool,
    },
    Construct {
        template: Vec<TriplePattern>,
    },
    Describe {
        /// Explicit IRIs and/or variables bound by the WHERE block.
        targets: Vec<Term>,
    },
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub form: QueryForm,
    pub patterns: Vec<TriplePattern>,
    pub optionals: Vec<Vec<TriplePattern>>,
    pub filters: Vec<FilterExpr>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    /// All variables of the required patterns, in first-appearance order.
    pub fn pattern_vars(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for pattern in &self.patterns {
            for var in pattern.vars() {
                if !seen.iter().any(|s: &String| s == var) {
                    seen.push(var.to_string());
                }
            }
        }
        seen
    }
}
