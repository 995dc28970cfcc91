//! Textual front-end for query trees.
//!
//! A compact, CQL-like syntax for writing queries by hand, mostly used in
//! tests and tooling. It produces the same [`cqn`](crate::cqn) trees as the
//! JSON reader, and [`Display`](std::fmt::Display) on those trees prints the
//! same syntax back.
//!
//! # Example
//!
//! ```
//! use navql::cql;
//!
//! let query = cql::parse("SELECT from Books { ID, author.name } where stock > 10").unwrap();
//! assert_eq!(query.to_string(), "SELECT from Books { ID, author.name } where stock > 10");
//! ```

pub mod lexer;
mod parser;

use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};
use chumsky::error::Rich;
use chumsky::input::Input;
use chumsky::span::{SimpleSpan, Span as _};
use chumsky::Parser as _;
use thiserror::Error;

use crate::cqn::{Expr, Query, Select};
use lexer::Token;

/// A syntax error with its location in the source text.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} at {}..{}", span.start, span.end)]
pub struct ParseError {
    pub message: String,
    pub span: Range<usize>,
}

impl ParseError {
    pub fn new(span: Range<usize>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }

    /// Render the error as a report pointing into `source`.
    pub fn render(&self, source: &str) -> String {
        let mut out = Vec::new();
        let report = Report::build(ReportKind::Error, self.span.clone())
            .with_config(Config::default().with_color(false))
            .with_message(&self.message)
            .with_label(Label::new(self.span.clone()).with_message(&self.message))
            .finish();

        match report.write(Source::from(source), &mut out) {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

impl<T: std::fmt::Display> From<Rich<'_, T, SimpleSpan>> for ParseError {
    fn from(err: Rich<'_, T, SimpleSpan>) -> Self {
        let span = err.span();
        ParseError::new(span.start()..span.end(), err.to_string())
    }
}

/// Keep the first error, or report `fallback` when there is none.
fn first_error<T: std::fmt::Display>(errs: Vec<Rich<'_, T, SimpleSpan>>, fallback: Range<usize>) -> ParseError {
    errs.into_iter()
        .next()
        .map(ParseError::from)
        .unwrap_or_else(|| ParseError::new(fallback, "invalid input"))
}

fn finish<O>(output: Option<O>, errs: Vec<Rich<'_, Token<'_>, SimpleSpan>>, len: usize) -> ParseResult<O> {
    match output {
        Some(output) if errs.is_empty() => Ok(output),
        _ => Err(first_error(errs, len..len)),
    }
}

/// Parse a statement (SELECT, INSERT, UPSERT, UPDATE or DELETE).
pub fn parse(source: &str) -> ParseResult<Query> {
    // Step 1: Lexical analysis
    let tokens = lexer::lex(source).map_err(|errs| first_error(errs, 0..source.len()))?;

    // Step 2: Parsing
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens
        .as_slice()
        .map(eoi, |(tok, span): &(Token<'_>, SimpleSpan)| (tok, span));
    let (query, errs) = parser::statement().parse(token_stream).into_output_errors();
    finish(query, errs, len)
}

/// Parse a SELECT statement.
pub fn parse_select(source: &str) -> ParseResult<Select> {
    match parse(source)? {
        Query::Select(select) => Ok(select),
        _ => Err(ParseError::new(0..source.len(), "expected a SELECT statement")),
    }
}

/// Parse an expression into a token stream.
pub fn parse_expr(source: &str) -> ParseResult<Vec<Expr>> {
    let tokens = lexer::lex(source).map_err(|errs| first_error(errs, 0..source.len()))?;

    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens
        .as_slice()
        .map(eoi, |(tok, span): &(Token<'_>, SimpleSpan)| (tok, span));
    let (exprs, errs) = parser::expression().parse(token_stream).into_output_errors();
    finish(exprs, errs, len)
}
