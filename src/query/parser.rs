//! Recursive-descent parser for the SPARQL subset.
//!
//! Grammar (case-insensitive keywords):
//!
//! ```text
//! query     := prefix* form solvemods
//! prefix    := PREFIX name ':' '<iri>'
//! form      := SELECT [DISTINCT] (var+ | '*') where
//!            | CONSTRUCT '{' template '}' where
//!            | DESCRIBE (var | iri)+ [where]
//! where     := WHERE '{' group '}'
//! group     := (triple '.'? | OPTIONAL '{' triple-list '}' | FILTER '(' expr ')')*
//! solvemods := [ORDER BY key+] [LIMIT n] [OFFSET n]
//! ```
//!
//! Prefixed names are canonicalised against the ontology's prefix table so a
//! query-declared prefix and the store's stored form always agree.

use std::collections::HashMap;

use crate::error::QueryError;
use crate::graph::ontology;
use crate::query::ast::*;

type ParseResult<T> = std::result::Result<T, QueryError>;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Var(String),
    IriRef(String),
    Str(String),
    Punct(char),
    Op(&'static str),
}

struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    fn tokenize(mut self) -> ParseResult<Vec<(Token, usize)>> {
        let mut tokens = Vec::new();
        while self.pos < self.input.len() {
            let start = self.pos;
            let c = self.input[self.pos] as char;
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.pos += 1;
                }
                '#' => {
                    while self.pos < self.input.len() && self.input[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                '{' | '}' | '(' | ')' | '.' | ',' | '*' | ';' => {
                    self.pos += 1;
                    tokens.push((Token::Punct(c), start));
                }
                '?' | '$' => {
                    self.pos += 1;
                    let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                    if name.is_empty() {
                        return Err(self.error("expected variable name after '?'"));
                    }
                    tokens.push((Token::Var(name), start));
                }
                '<' => {
                    self.pos += 1;
                    let iri = self.take_while(|c| c != '>');
                    if self.pos >= self.input.len() {
                        return Err(self.error("unterminated IRI"));
                    }
                    self.pos += 1; // '>'
                    tokens.push((Token::IriRef(iri), start));
                }
                '"' => {
                    self.pos += 1;
                    let mut out: Vec<u8> = Vec::new();
                    loop {
                        if self.pos >= self.input.len() {
                            return Err(self.error("unterminated string literal"));
                        }
                        match self.input[self.pos] {
                            b'"' => {
                                self.pos += 1;
                                break;
                            }
                            b'\\' => {
                                self.pos += 1;
                                if self.pos >= self.input.len() {
                                    return Err(self.error("unterminated escape"));
                                }
                                out.push(match self.input[self.pos] {
                                    b'n' => b'\n',
                                    b't' => b'\t',
                                    other => other,
                                });
                                self.pos += 1;
                            }
                            other => {
                                out.push(other);
                                self.pos += 1;
                            }
                        }
                    }
                    tokens.push((
                        Token::Str(String::from_utf8_lossy(&out).into_owned()),
                        start,
                    ));
                }
                '=' => {
                    self.pos += 1;
                    tokens.push((Token::Op("="), start));
                }
                '!' => {
                    if self.input.get(self.pos + 1) == Some(&b'=') {
                        self.pos += 2;
                        tokens.push((Token::Op("!="), start));
                    } else {
                        self.pos += 1;
                        tokens.push((Token::Op("!"), start));
                    }
                }
                '&' => {
                    if self.input.get(self.pos + 1) == Some(&b'&') {
                        self.pos += 2;
                        tokens.push((Token::Op("&&"), start));
                    } else {
                        return Err(self.error("expected '&&'"));
                    }
                }
                '|' => {
                    if self.input.get(self.pos + 1) == Some(&b'|') {
                        self.pos += 2;
                        tokens.push((Token::Op("||"), start));
                    } else {
                        return Err(self.error("expected '||'"));
                    }
                }
                _ if c.is_ascii_alphanumeric() || c == '_' => {
                    let word =
                        self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':'
                            || c == '-');
                    tokens.push((Token::Word(word), start));
                }
                _ => return Err(self.error(format!("unexpected character '{c}'"))),
            }
        }
        Ok(tokens)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.pos < self.input.len() && keep(self.input[self.pos] as char) {
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }
}

pub struct QueryParser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    prefixes: HashMap<String, String>,
}

impl QueryParser {
    pub fn parse(input: &str) -> ParseResult<Query> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self {
            tokens,
            pos: 0,
            prefixes: HashMap::new(),
        };
        parser.query()
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        let position = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, p)| *p)
            .unwrap_or(0);
        QueryError::Parse {
            position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn keyword(&mut self, kw: &str) -> bool {
        if let Some(Token::Word(w)) = self.peek() {
            if w.eq_ignore_ascii_case(kw) {
                self.pos += 1;
                return true;
            }
        }
        false
    }

    fn expect_punct(&mut self, c: char) -> ParseResult<()> {
        match self.next() {
            Some(Token::Punct(p)) if p == c => Ok(()),
            _ => Err(self.error(format!("expected '{c}'"))),
        }
    }

    fn query(&mut self) -> ParseResult<Query> {
        while self.keyword("PREFIX") {
            self.prefix_decl()?;
        }

        let mut query = if self.keyword("SELECT") {
            self.select()?
        } else if self.keyword("CONSTRUCT") {
            self.construct()?
        } else if self.keyword("DESCRIBE") {
            self.describe()?
        } else {
            return Err(self.error("expected SELECT, CONSTRUCT, or DESCRIBE"));
        };

        self.solution_modifiers(&mut query)?;

        if self.pos < self.tokens.len() {
            return Err(self.error("unexpected trailing tokens"));
        }
        Ok(query)
    }

    fn prefix_decl(&mut self) -> ParseResult<()> {
        let name = match self.next() {
            Some(Token::Word(w)) => w.trim_end_matches(':').to_string(),
            _ => return Err(self.error("expected prefix name")),
        };
        let iri = match self.next() {
            Some(Token::IriRef(iri)) => iri,
            _ => return Err(self.error("expected namespace IRI")),
        };
        self.prefixes.insert(name, iri);
        Ok(())
    }

    fn select(&mut self) -> ParseResult<Query> {
        let distinct = self.keyword("DISTINCT");
        let mut vars = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Var(_)) => {
                    if let Some(Token::Var(v)) = self.next() {
                        vars.push(v);
                    }
                }
                Some(Token::Punct('*')) => {
                    self.pos += 1;
                    break;
                }
                _ => break,
            }
        }
        if vars.is_empty() && !matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case("WHERE"))
        {
            return Err(self.error("SELECT needs variables or '*'"));
        }

        let (patterns, optionals, filters) = self.where_block()?;
        Ok(Query {
            form: QueryForm::Select { vars, distinct },
            patterns,
            optionals,
            filters,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    fn construct(&mut self) -> ParseResult<Query> {
        self.expect_punct('{')?;
        let mut template = Vec::new();
        while !matches!(self.peek(), Some(Token::Punct('}'))) {
            template.push(self.triple_pattern()?);
            if matches!(self.peek(), Some(Token::Punct('.'))) {
                self.pos += 1;
            }
        }
        self.expect_punct('}')?;

        let (patterns, optionals, filters) = self.where_block()?;
        Ok(Query {
            form: QueryForm::Construct { template },
            patterns,
            optionals,
            filters,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    fn describe(&mut self) -> ParseResult<Query> {
        let mut targets = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Var(_)) | Some(Token::IriRef(_)) => {
                    targets.push(self.term()?);
                }
                Some(Token::Word(w)) if !w.eq_ignore_ascii_case("WHERE") => {
                    targets.push(self.term()?);
                }
                _ => break,
            }
        }
        if targets.is_empty() {
            return Err(self.error("DESCRIBE needs at least one target"));
        }

        let (patterns, optionals, filters) =
            if matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case("WHERE")) {
                self.where_block()?
            } else {
                (Vec::new(), Vec::new(), Vec::new())
            };
        Ok(Query {
            form: QueryForm::Describe { targets },
            patterns,
            optionals,
            filters,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        })
    }

    #[allow(clippy::type_complexity)]
    fn where_block(
        &mut self,
    ) -> ParseResult<(Vec<TriplePattern>, Vec<Vec<TriplePattern>>, Vec<FilterExpr>)> {
        if !self.keyword("WHERE") {
            return Err(self.error("expected WHERE"));
        }
        self.expect_punct('{')?;

        let mut patterns = Vec::new();
        let mut optionals = Vec::new();
        let mut filters = Vec::new();

        loop {
            match self.peek() {
                Some(Token::Punct('}')) => {
                    self.pos += 1;
                    break;
                }
                Some(Token::Word(w)) if w.eq_ignore_ascii_case("OPTIONAL") => {
                    self.pos += 1;
                    self.expect_punct('{')?;
                    let mut group = Vec::new();
                    while !matches!(self.peek(), Some(Token::Punct('}'))) {
                        group.push(self.triple_pattern()?);
                        if matches!(self.peek(), Some(Token::Punct('.'))) {
                            self.pos += 1;
                        }
                    }
                    self.expect_punct('}')?;
                    optionals.push(group);
                }
                Some(Token::Word(w)) if w.eq_ignore_ascii_case("FILTER") => {
                    self.pos += 1;
                    self.expect_punct('(')?;
                    let expr = self.filter_or()?;
                    self.expect_punct(')')?;
                    filters.push(expr);
                }
                Some(_) => {
                    patterns.push(self.triple_pattern()?);
                    if matches!(self.peek(), Some(Token::Punct('.'))) {
                        self.pos += 1;
                    }
                }
                None => return Err(self.error("unterminated WHERE block")),
            }
        }

        Ok((patterns, optionals, filters))
    }

    fn triple_pattern(&mut self) -> ParseResult<TriplePattern> {
        let subject = self.term()?;
        let predicate = self.term()?;
        let object = self.term()?;
        Ok(TriplePattern {
            subject,
            predicate,
            object,
        })
    }

    fn term(&mut self) -> ParseResult<Term> {
        match self.next() {
            Some(Token::Var(v)) => Ok(Term::Var(v)),
            Some(Token::IriRef(iri)) => Ok(Term::Iri(ontology::compress(&iri))),
            Some(Token::Str(s)) => Ok(Term::Literal(s)),
            Some(Token::Word(w)) => self.resolve_name(&w).map(Term::Iri),
            _ => Err(self.error("expected a term")),
        }
    }

    /// Canonicalise a prefixed name or bare word against query-declared and
    /// built-in prefixes. `a` is shorthand for `rdf:type`.
    fn resolve_name(&self, word: &str) -> ParseResult<String> {
        if word == "a" {
            return Ok("rdf:type".to_string());
        }
        let Some((prefix, local)) = word.split_once(':') else {
            return Err(self.error(format!("bare word \"{word}\" is not a valid term")));
        };
        if let Some(ns) = self.prefixes.get(prefix) {
            // Declared prefix: expand, then compress to the store's canonical form.
            return Ok(ontology::compress(&format!("{ns}{local}")));
        }
        if ontology::is_known_curie(word) {
            return Ok(word.to_string());
        }
        Err(QueryError::UnknownPrefix {
            prefix: prefix.to_string(),
        })
    }

    fn filter_or(&mut self) -> ParseResult<FilterExpr> {
        let mut left = self.filter_and()?;
        while matches!(self.peek(), Some(Token::Op("||"))) {
            self.pos += 1;
            let right = self.filter_and()?;
            left = FilterExpr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn filter_and(&mut self) -> ParseResult<FilterExpr> {
        let mut left = self.filter_unary()?;
        while matches!(self.peek(), Some(Token::Op("&&"))) {
            self.pos += 1;
            let right = self.filter_unary()?;
            left = FilterExpr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn filter_unary(&mut self) -> ParseResult<FilterExpr> {
        if matches!(self.peek(), Some(Token::Op("!"))) {
            self.pos += 1;
            let inner = self.filter_unary()?;
            return Ok(FilterExpr::Not(Box::new(inner)));
        }
        if matches!(self.peek(), Some(Token::Punct('('))) {
            self.pos += 1;
            let inner = self.filter_or()?;
            self.expect_punct(')')?;
            return Ok(inner);
        }
        self.filter_comparison()
    }

    fn filter_comparison(&mut self) -> ParseResult<FilterExpr> {
        // CONTAINS(x, y) as a predicate-form expression.
        if let Some(Token::Word(w)) = self.peek() {
            if w.eq_ignore_ascii_case("CONTAINS") {
                self.pos += 1;
                self.expect_punct('(')?;
                let left = self.value_expr()?;
                self.expect_punct(',')?;
                let right = self.value_expr()?;
                self.expect_punct(')')?;
                return Ok(FilterExpr::Contains(left, right));
            }
        }

        let left = self.value_expr()?;
        match self.peek() {
            Some(Token::Op("=")) => {
                self.pos += 1;
                let right = self.value_expr()?;
                Ok(FilterExpr::Equals(left, right))
            }
            Some(Token::Op("!=")) => {
                self.pos += 1;
                let right = self.value_expr()?;
                Ok(FilterExpr::NotEquals(left, right))
            }
            _ => Err(self.error("expected comparison operator in FILTER")),
        }
    }

    fn value_expr(&mut self) -> ParseResult<ValueExpr> {
        match self.peek().cloned() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case("STR") => {
                self.pos += 1;
                self.expect_punct('(')?;
                let inner = self.value_expr()?;
                self.expect_punct(')')?;
                Ok(ValueExpr::Str(Box::new(inner)))
            }
            Some(Token::Var(_)) => {
                if let Some(Token::Var(v)) = self.next() {
                    Ok(ValueExpr::Var(v))
                } else {
                    unreachable!("peeked var")
                }
            }
            Some(Token::Str(_)) => {
                if let Some(Token::Str(s)) = self.next() {
                    Ok(ValueExpr::Constant(s))
                } else {
                    unreachable!("peeked string")
                }
            }
            Some(Token::IriRef(iri)) => {
                self.pos += 1;
                Ok(ValueExpr::Constant(ontology::compress(&iri)))
            }
            Some(Token::Word(w)) => {
                self.pos += 1;
                Ok(ValueExpr::Constant(self.resolve_name(&w)?))
            }
            _ => Err(self.error("expected value in FILTER expression")),
        }
    }

    fn solution_modifiers(&mut self, query: &mut Query) -> ParseResult<()> {
        if self.keyword("ORDER") {
            if !self.keyword("BY") {
                return Err(self.error("expected BY after ORDER"));
            }
            loop {
                match self.peek().cloned() {
                    Some(Token::Var(_)) => {
                        if let Some(Token::Var(v)) = self.next() {
                            query.order_by.push(OrderKey {
                                var: v,
                                descending: false,
                            });
                        }
                    }
                    Some(Token::Word(w))
                        if w.eq_ignore_ascii_case("ASC") || w.eq_ignore_ascii_case("DESC") =>
                    {
                        let descending = w.eq_ignore_ascii_case("DESC");
                        self.pos += 1;
                        self.expect_punct('(')?;
                        let var = match self.next() {
                            Some(Token::Var(v)) => v,
                            _ => return Err(self.error("expected variable in ORDER BY")),
                        };
                        self.expect_punct(')')?;
                        query.order_by.push(OrderKey { var, descending });
                    }
                    _ => break,
                }
            }
            if query.order_by.is_empty() {
                return Err(self.error("ORDER BY needs at least one key"));
            }
        }

        if self.keyword("LIMIT") {
            query.limit = Some(self.number()?);
        }
        if self.keyword("OFFSET") {
            query.offset = Some(self.number()?);
        }
        Ok(())
    }

    fn number(&mut self) -> ParseResult<usize> {
        match self.next() {
            Some(Token::Word(w)) => w
                .parse()
                .map_err(|_| self.error(format!("expected a number, got \"{w}\""))),
            _ => Err(self.error("expected a number")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_with_order_and_limit() {
        let q = QueryParser::parse(
            "SELECT ?a ?t WHERE { ?a rdf:type reg:Article . ?a reg:title ?t } ORDER BY ?a LIMIT 10",
        )
        .unwrap();
        match &q.form {
            QueryForm::Select { vars, distinct } => {
                assert_eq!(vars, &["a", "t"]);
                assert!(!distinct);
            }
            other => panic!("wrong form: {other:?}"),
        }
        assert_eq!(q.patterns.len(), 2);
        assert_eq!(q.order_by.len(), 1);
        assert_eq!(q.limit, Some(10));
        assert_eq!(
            q.patterns[0].predicate,
            Term::Iri("rdf:type".into())
        );
    }

    #[test]
    fn select_star_and_distinct() {
        let q = QueryParser::parse("SELECT DISTINCT * WHERE { ?s ?p ?o }").unwrap();
        match &q.form {
            QueryForm::Select { vars, distinct } => {
                assert!(vars.is_empty());
                assert!(*distinct);
            }
            other => panic!("wrong form: {other:?}"),
        }
    }

    #[test]
    fn a_is_rdf_type() {
        let q = QueryParser::parse("SELECT ?s WHERE { ?s a reg:Article }").unwrap();
        assert_eq!(q.patterns[0].predicate, Term::Iri("rdf:type".into()));
    }

    #[test]
    fn optional_and_filter() {
        let q = QueryParser::parse(
            r#"SELECT ?a ?t WHERE {
                ?a rdf:type reg:Article .
                OPTIONAL { ?a reg:title ?t }
                FILTER(CONTAINS(STR(?a), "Art1"))
            }"#,
        )
        .unwrap();
        assert_eq!(q.optionals.len(), 1);
        assert_eq!(q.filters.len(), 1);
        match &q.filters[0] {
            FilterExpr::Contains(ValueExpr::Str(inner), ValueExpr::Constant(c)) => {
                assert_eq!(**inner, ValueExpr::Var("a".into()));
                assert_eq!(c, "Art1");
            }
            other => panic!("wrong filter: {other:?}"),
        }
    }

    #[test]
    fn logical_filter_precedence() {
        let q = QueryParser::parse(
            r#"SELECT ?s WHERE { ?s ?p ?o FILTER(?o = "x" || ?o = "y" && ?o != "z") }"#,
        )
        .unwrap();
        // && binds tighter than ||.
        assert!(matches!(q.filters[0], FilterExpr::Or(_, _)));
    }

    #[test]
    fn declared_prefix_canonicalises_to_store_form() {
        let q = QueryParser::parse(
            "PREFIX r: <https://regula.dev/ontology#> SELECT ?s WHERE { ?s r:title ?t }",
        )
        .unwrap();
        assert_eq!(q.patterns[0].predicate, Term::Iri("reg:title".into()));
    }

    #[test]
    fn unknown_prefix_rejected() {
        let err = QueryParser::parse("SELECT ?s WHERE { ?s foaf:knows ?o }").unwrap_err();
        assert!(matches!(err, QueryError::UnknownPrefix { .. }));
    }

    #[test]
    fn construct_form() {
        let q = QueryParser::parse(
            "CONSTRUCT { ?a reg:references ?b } WHERE { ?a reg:references ?b }",
        )
        .unwrap();
        match &q.form {
            QueryForm::Construct { template } => assert_eq!(template.len(), 1),
            other => panic!("wrong form: {other:?}"),
        }
    }

    #[test]
    fn describe_with_iri() {
        let q = QueryParser::parse("DESCRIBE <https://regula.dev/GDPR:Art17>").unwrap();
        match &q.form {
            QueryForm::Describe { targets } => {
                assert_eq!(targets[0], Term::Iri("https://regula.dev/GDPR:Art17".into()));
            }
            other => panic!("wrong form: {other:?}"),
        }
        assert!(q.patterns.is_empty());
    }

    #[test]
    fn parse_errors_carry_position() {
        let err = QueryParser::parse("SELECT ?s FROM { }").unwrap_err();
        match err {
            QueryError::Parse { position, .. } => assert!(position > 0),
            other => panic!("wrong error: {other:?}"),
        }
    }

    #[test]
    fn desc_order_key() {
        let q = QueryParser::parse("SELECT ?s WHERE { ?s ?p ?o } ORDER BY DESC(?s) OFFSET 5")
            .unwrap();
        assert!(q.order_by[0].descending);
        assert_eq!(q.offset, Some(5));
    }
}
