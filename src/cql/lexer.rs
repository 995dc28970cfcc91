//! Lexer for the textual query language.
//!
//! Keywords are not distinguished from identifiers here: the language is
//! case-insensitive and most keywords are valid element names, so the parser
//! decides by position.

use chumsky::prelude::*;

/// A token of a textual query.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    /// Identifier or keyword, including `$`-prefixed names like `$self`.
    Ident(&'src str),
    /// Content of a `'...'` literal, with `''` escapes still in place.
    StringLit(&'src str),
    Number(&'src str),
    /// Comparison and arithmetic operators, `*` included.
    Op(&'src str),

    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Question,
}

impl<'src> Token<'src> {
    /// Whether this is the identifier `keyword`, ignoring case.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "{}", s),
            Token::StringLit(s) => write!(f, "'{}'", s),
            Token::Number(n) => write!(f, "{}", n),
            Token::Op(op) => write!(f, "{}", op),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Question => write!(f, "?"),
        }
    }
}

/// Create a lexer for textual queries.
///
/// Returns a parser that tokenizes the input string into a sequence of
/// tokens with span information, skipping whitespace and comments.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    // Identifiers, optionally prefixed with `$`
    let ident = just('$')
        .or_not()
        .then(text::ident())
        .to_slice()
        .map(Token::Ident);

    // String literals: '...' with '' as escaped quote
    let string_lit = just('\'')
        .ignore_then(
            just("''")
                .ignored()
                .or(none_of('\'').ignored())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('\''))
        .map(Token::StringLit);

    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(Token::Number);

    // Operators (multi-char first)
    let op = choice((
        just("<="),
        just(">="),
        just("<>"),
        just("!="),
        just("=="),
        just("||"),
        just("="),
        just("<"),
        just(">"),
        just("+"),
        just("-"),
        just("*"),
        just("/"),
    ))
    .to_slice()
    .map(Token::Op);

    let symbol = choice((
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just(',').to(Token::Comma),
        just('.').to(Token::Dot),
        just(':').to(Token::Colon),
        just('?').to(Token::Question),
    ));

    // Single-line comments: // ... until newline
    let single_line_comment = just("//")
        .then(any().and_is(just('\n').not()).repeated())
        .ignored();

    // Multi-line comments: /* ... */
    let multi_line_comment = just("/*")
        .then(any().and_is(just("*/").not()).repeated())
        .then(just("*/"))
        .ignored();

    let comment = single_line_comment.or(multi_line_comment);

    let token = choice((ident, string_lit, number, op, symbol)).map_with(|tok, e| (tok, e.span()));

    token
        .padded_by(comment.padded().repeated())
        .padded()
        .repeated()
        .collect()
        .padded_by(comment.padded().repeated())
        .padded()
        .then_ignore(end())
}

/// Lex a source string into tokens.
///
/// Returns Ok with the token list on success, or Err with the lexer errors.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}
