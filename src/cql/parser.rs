//! Parser for the textual query language using chumsky.
//!
//! The parser consumes the token stream produced by the [lexer](super::lexer)
//! and builds [`cqn`](crate::cqn) trees. Expressions stay flat token streams
//! (`xpr`), as in the tree format itself: only parentheses, function calls,
//! paths and subqueries give them structure.

use chumsky::input::ValueInput;
use chumsky::prelude::*;
use chumsky::recursive::Indirect;
use indexmap::IndexMap;
use serde_json::{Number, Value};

use super::lexer::Token;
use crate::cqn::{
    Column, ColumnKind, Delete, Expr, Insert, Join, JoinKind, Limit, Nested, Nulls, OrderBy,
    Query, Ref, Select, Source, Step, Update,
};

type Extra<'tokens, 'src> = extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>;

/// Keywords that end an expression.
const CLAUSE_KEYWORDS: &[&str] = &[
    "as", "from", "where", "group", "order", "having", "limit", "offset", "asc", "desc", "nulls",
    "excluding", "set", "values", "join", "left", "inner", "right", "full", "cross", "outer", "on",
    "search", "by",
];

/// Keywords that are part of an expression.
const OPERATOR_KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "like", "between", "is", "exists", "case", "when", "then", "else",
    "end", "escape",
];

fn is_clause_keyword(s: &str) -> bool {
    CLAUSE_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(s))
}

fn is_operator_keyword(s: &str) -> bool {
    OPERATOR_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(s))
}

fn is_literal_word(s: &str) -> bool {
    ["null", "true", "false"].iter().any(|w| w.eq_ignore_ascii_case(s))
}

/// Whether an identifier can start a path.
fn is_name(s: &str) -> bool {
    !is_clause_keyword(s) && is_function_name(s)
}

/// Clause keywords followed by `(` are calls, as in `search(title, 'x')`.
fn is_function_name(s: &str) -> bool {
    !is_operator_keyword(s) && !is_literal_word(s)
}

fn single_or_xpr(mut tokens: Vec<Expr>) -> Expr {
    if tokens.len() == 1 {
        tokens.remove(0)
    } else {
        Expr::Xpr(tokens)
    }
}

fn push<T>(mut items: Vec<T>, item: T) -> Vec<T> {
    items.push(item);
    items
}

/// `in (x)` is a list of one, not a parenthesized expression.
fn in_lists(tokens: Vec<Expr>) -> Vec<Expr> {
    let mut out: Vec<Expr> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let token = match token {
            Expr::Xpr(items) if out.last().is_some_and(|t| t.is_keyword("in")) => {
                Expr::List(vec![single_or_xpr(items)])
            }
            other => other,
        };
        out.push(token);
    }
    out
}

fn nested(path: Option<Ref>, columns: Vec<Column>, excluding: Option<Vec<String>>) -> Nested {
    let mut nested = Nested::new(path, columns);
    nested.excluding = excluding.unwrap_or_default();
    nested
}

/// Rows after `values` or the query of an INSERT.
enum InsertData {
    Values(Vec<Vec<Value>>),
    Select(Select),
}

/// A keyword, matched case-insensitively.
fn kw<'tokens, 'src: 'tokens, I>(
    keyword: &'static str,
) -> impl Parser<'tokens, I, (), Extra<'tokens, 'src>> + Clone
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    any()
        .filter(move |t: &Token<'src>| t.is_keyword(keyword))
        .ignored()
        .labelled(keyword)
}

/// Create the statement parser (SELECT, INSERT, UPSERT, UPDATE or DELETE).
pub(super) fn statement<'tokens, 'src: 'tokens, I>() -> impl Parser<'tokens, I, Query, Extra<'tokens, 'src>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    grammar().0.then_ignore(end())
}

/// Create the parser for a standalone expression token stream.
pub(super) fn expression<'tokens, 'src: 'tokens, I>(
) -> impl Parser<'tokens, I, Vec<Expr>, Extra<'tokens, 'src>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    grammar().1.then_ignore(end())
}

/// The statement and expression parsers, which share one grammar.
fn grammar<'tokens, 'src: 'tokens, I>() -> (
    impl Parser<'tokens, I, Query, Extra<'tokens, 'src>> + Clone,
    impl Parser<'tokens, I, Vec<Expr>, Extra<'tokens, 'src>> + Clone,
)
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    let mut xpr: Recursive<Indirect<'tokens, 'tokens, I, Vec<Expr>, Extra<'tokens, 'src>>> =
        Recursive::declare();
    let mut select_query: Recursive<Indirect<'tokens, 'tokens, I, Select, Extra<'tokens, 'src>>> =
        Recursive::declare();

    // ==========================================================================
    // Basic token parsers
    // ==========================================================================

    let ident = select! {
        Token::Ident(s) => s.to_string(),
    }
    .labelled("identifier");

    let name = select! {
        Token::Ident(s) if is_name(s) => s.to_string(),
    }
    .labelled("name");

    // `a.b.c` as one dotted name
    let dotted_name = ident.clone().foldl(
        just(Token::Dot).ignore_then(ident.clone()).repeated(),
        |mut name, part| {
            name.push('.');
            name.push_str(&part);
            name
        },
    );

    let alias = kw("as").ignore_then(ident.clone()).or(name.clone()).or_not();

    let name_list = ident
        .clone()
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // ==========================================================================
    // Paths: a.b[filter].c
    // ==========================================================================

    let filter = kw("where")
        .or_not()
        .ignore_then(xpr.clone())
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .or_not()
        .map(Option::unwrap_or_default);

    let step = ident
        .clone()
        .then(filter.clone())
        .map(|(id, filter)| Step::new(id).with_filter(filter));

    let path = name
        .clone()
        .then(filter.clone())
        .map(|(id, filter)| vec![Step::new(id).with_filter(filter)])
        .foldl(just(Token::Dot).ignore_then(step.clone()).repeated(), push)
        .map(|steps| Ref {
            steps,
            links: Vec::new(),
        });

    let named_args = ident
        .clone()
        .then_ignore(just(Token::Colon))
        .then(xpr.clone().map(single_or_xpr))
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // `Entity(arg: x)[filter]:assoc.assoc[filter]`
    let entity_path = dotted_name
        .clone()
        .then(named_args.or_not())
        .then(filter.clone())
        .then(
            just(Token::Colon)
                .ignore_then(
                    step.clone()
                        .map(|step| vec![step])
                        .foldl(just(Token::Dot).ignore_then(step.clone()).repeated(), push),
                )
                .or_not(),
        )
        .map(|(((name, args), filter), tail)| {
            let mut root = Step::new(name).with_filter(filter);
            root.args = args.unwrap_or_default();
            let mut steps = vec![root];
            steps.extend(tail.unwrap_or_default());
            Ref {
                steps,
                links: Vec::new(),
            }
        });

    // ==========================================================================
    // Expressions
    // ==========================================================================

    let word = select! {
        Token::Ident(s) if is_operator_keyword(s) => Expr::kw(s.to_ascii_lowercase()),
        Token::Ident(s) if s.eq_ignore_ascii_case("null") => Expr::null(),
        Token::Ident(s) if s.eq_ignore_ascii_case("true") => Expr::val(true),
        Token::Ident(s) if s.eq_ignore_ascii_case("false") => Expr::val(false),
        Token::StringLit(s) => Expr::val(s.replace("''", "'")),
        Token::Op(op) => Expr::kw(op),
        Token::Question => Expr::Param("?".to_string()),
    };

    let number = select! {
        Token::Number(n) => n,
    }
    .try_map(|n, span| {
        parse_number(n)
            .map(|n| Expr::Val(Value::Number(n)))
            .ok_or_else(|| Rich::custom(span, format!("invalid number \"{}\"", n)))
    });

    let param = just(Token::Colon)
        .ignore_then(ident.clone())
        .map(Expr::Param);

    // `count(*)` passes the star through as a keyword
    let star_arg = just(Token::Op("*"))
        .then(choice((just(Token::RParen), just(Token::Comma))).rewind())
        .to(Expr::kw("*"));

    let function = select! {
        Token::Ident(s) if is_function_name(s) => s.to_string(),
    }
    .labelled("function name")
    .then(
        star_arg
            .or(xpr.clone().map(single_or_xpr))
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen)),
    )
    .map(|(name, args)| Expr::Func { name, args });

    let parenthesized = choice((
        select_query
            .clone()
            .map(|query| Expr::Query(Box::new(query))),
        xpr.clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(|mut items| match items.len() {
                1 => Expr::Xpr(items.pop().unwrap_or_default()),
                _ => Expr::List(items.into_iter().map(single_or_xpr).collect()),
            }),
        empty().to(Expr::List(Vec::new())),
    ))
    .delimited_by(just(Token::LParen), just(Token::RParen));

    let atom = choice((
        word,
        number,
        param,
        function,
        path.clone().map(Expr::Ref),
        parenthesized,
    ));

    xpr.define(
        atom.repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(in_lists)
            .labelled("expression"),
    );

    let expr_list = xpr
        .clone()
        .map(single_or_xpr)
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>();

    // ==========================================================================
    // Columns
    // ==========================================================================

    let alias_and_cast = kw("as")
        .ignore_then(ident.clone())
        .then(just(Token::Colon).ignore_then(dotted_name.clone()).or_not())
        .or_not();

    let column = recursive(|column| {
        let columns = column
            .separated_by(just(Token::Comma))
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .then(kw("excluding").ignore_then(name_list.clone()).or_not());

        // `{ ... } as name`
        let anonymous = columns
            .clone()
            .then_ignore(kw("as"))
            .then(ident.clone())
            .map(|((columns, excluding), alias)| {
                Column::new(ColumnKind::Expand(nested(None, columns, excluding))).with_alias(alias)
            });

        // `books as b { ... }`
        let aliased_expand = path
            .clone()
            .then_ignore(kw("as"))
            .then(ident.clone())
            .then(columns.clone())
            .map(|((path, alias), (columns, excluding))| {
                Column::new(ColumnKind::Expand(nested(Some(path), columns, excluding)))
                    .with_alias(alias)
            });

        let expand = path
            .clone()
            .then(columns.clone())
            .map(|(path, (columns, excluding))| {
                Column::new(ColumnKind::Expand(nested(Some(path), columns, excluding)))
            });

        let inline = path
            .clone()
            .then_ignore(just(Token::Dot))
            .then(columns)
            .map(|(path, (columns, excluding))| {
                Column::new(ColumnKind::Inline(nested(Some(path), columns, excluding)))
            });

        let inline_all = path
            .clone()
            .then_ignore(just(Token::Dot))
            .then_ignore(just(Token::Op("*")))
            .map(|path| {
                Column::new(ColumnKind::Inline(Nested::new(
                    Some(path),
                    vec![Column::wildcard()],
                )))
            });

        let value = xpr.clone().map(|tokens| Column::expr(single_or_xpr(tokens)));

        choice((
            just(Token::Op("*")).to(Column::wildcard()),
            anonymous,
            aliased_expand,
            choice((expand, inline, inline_all, value))
                .then(alias_and_cast)
                .map(|(mut column, alias)| {
                    if let Some((alias, cast)) = alias {
                        column.alias = Some(alias);
                        column.cast = cast;
                    }
                    column
                }),
        ))
    });

    let column_list = column
        .clone()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>();

    let braced_columns = column
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBrace), just(Token::RBrace));

    // ==========================================================================
    // Sources
    // ==========================================================================

    let source_primary = choice((
        select_query
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .then(alias.clone())
            .map(|(query, alias)| Source::Select {
                query: Box::new(query),
                alias,
            }),
        entity_path
            .clone()
            .then(alias.clone())
            .map(|(path, alias)| Source::Ref { path, alias }),
    ));

    let join_kind = choice((
        kw("join").to(JoinKind::Inner),
        choice((
            kw("inner").to(JoinKind::Inner),
            kw("left").to(JoinKind::Left),
            kw("right").to(JoinKind::Right),
            kw("full").to(JoinKind::Full),
            kw("cross").to(JoinKind::Cross),
        ))
        .then_ignore(kw("outer").or_not())
        .then_ignore(kw("join")),
    ));

    let join = join_kind
        .then(source_primary.clone())
        .then(kw("on").ignore_then(xpr.clone()).or_not())
        .try_map(|((kind, right), on), span| match (kind, on) {
            (JoinKind::Cross, None) => Ok((kind, right, Vec::new())),
            (JoinKind::Cross, Some(_)) => Err(Rich::custom(span, "a cross join takes no on condition")),
            (_, Some(on)) => Ok((kind, right, on)),
            (_, None) => Err(Rich::custom(span, "expected an on condition")),
        });

    let source = source_primary.foldl(join.repeated(), |left, (kind, right, on)| {
        Source::Join(Box::new(Join {
            kind,
            left,
            right,
            on,
        }))
    });

    // ==========================================================================
    // SELECT
    // ==========================================================================

    let order_item = xpr
        .clone()
        .map(single_or_xpr)
        .then(choice((kw("desc").to(true), kw("asc").to(false))).or_not())
        .then(
            kw("nulls")
                .ignore_then(choice((
                    kw("first").to(Nulls::First),
                    kw("last").to(Nulls::Last),
                )))
                .or_not(),
        )
        .map(|((expr, descending), nulls)| OrderBy {
            expr,
            descending: descending.unwrap_or(false),
            nulls,
        });

    let limit = kw("limit")
        .ignore_then(xpr.clone().map(single_or_xpr))
        .then(kw("offset").ignore_then(xpr.clone().map(single_or_xpr)).or_not())
        .map(|(rows, offset)| Limit { rows, offset });

    select_query.define(
        group((
            kw("select"),
            kw("one").or_not(),
            kw("distinct").or_not(),
            column_list.or_not(),
            kw("from"),
            source,
            braced_columns.or_not(),
            kw("excluding").ignore_then(name_list).or_not(),
            kw("where").ignore_then(xpr.clone()).or_not(),
            kw("search").ignore_then(xpr.clone()).or_not(),
            kw("group").ignore_then(kw("by")).ignore_then(expr_list).or_not(),
            kw("having").ignore_then(xpr.clone()).or_not(),
            kw("order")
                .ignore_then(kw("by"))
                .ignore_then(order_item.separated_by(just(Token::Comma)).at_least(1).collect::<Vec<_>>())
                .or_not(),
            limit.or_not(),
        ))
        .try_map(
            |(
                _,
                one,
                distinct,
                sql_columns,
                _,
                from,
                braced,
                excluding,
                where_clause,
                search,
                group_by,
                having,
                order_by,
                limit,
            ),
             span| {
                let columns = match (sql_columns, braced) {
                    (Some(_), Some(_)) => {
                        return Err(Rich::custom(span, "expected a single column list"))
                    }
                    (Some(columns), None) | (None, Some(columns)) => columns,
                    (None, None) => Vec::new(),
                };
                let mut select = Select::from_source(from);
                select.one = one.is_some();
                select.distinct = distinct.is_some();
                select.columns = columns;
                select.excluding = excluding.unwrap_or_default();
                select.where_clause = where_clause.unwrap_or_default();
                select.search = search.unwrap_or_default();
                select.group_by = group_by.unwrap_or_default();
                select.having = having.unwrap_or_default();
                select.order_by = order_by.unwrap_or_default();
                select.limit = limit;
                Ok(select)
            },
        ),
    );

    // ==========================================================================
    // DML
    // ==========================================================================

    let value = xpr.clone().try_map(|tokens, span| {
        literal(&tokens).ok_or_else(|| Rich::custom(span, "expected a literal value"))
    });

    let value_row = value
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    let insert_data = choice((
        kw("values")
            .ignore_then(
                value_row
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .map(InsertData::Values),
        select_query
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(InsertData::Select),
        select_query.clone().map(InsertData::Select),
    ));

    let insert = kw("into")
        .ignore_then(entity_path.clone())
        .then(
            ident
                .clone()
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .or_not(),
        )
        .then(insert_data)
        .map(|((path, columns), data)| {
            let mut insert = Insert::into(path);
            insert.columns = columns.unwrap_or_default();
            match data {
                InsertData::Values(mut rows) if rows.len() == 1 => {
                    insert.values = rows.pop().unwrap_or_default();
                }
                InsertData::Values(rows) => insert.rows = rows,
                InsertData::Select(select) => insert.as_select = Some(Box::new(select)),
            }
            insert
        });

    let assignment = dotted_name
        .then_ignore(just(Token::Op("=")))
        .then(xpr.clone());

    let update = entity_path
        .clone()
        .then(alias.clone())
        .then_ignore(kw("set"))
        .then(
            assignment
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>(),
        )
        .then(kw("where").ignore_then(xpr.clone()).or_not())
        .map(|(((entity, alias), assignments), where_clause)| {
            let mut update = Update {
                entity,
                alias,
                data: IndexMap::new(),
                with: IndexMap::new(),
                where_clause: where_clause.unwrap_or_default(),
            };
            for (name, tokens) in assignments {
                match literal(&tokens) {
                    Some(value) => {
                        update.data.insert(name, value);
                    }
                    None => {
                        update.with.insert(name, single_or_xpr(tokens));
                    }
                }
            }
            update
        });

    let delete = kw("from")
        .ignore_then(entity_path)
        .then(alias)
        .then(kw("where").ignore_then(xpr.clone()).or_not())
        .map(|((from, alias), where_clause)| Delete {
            from,
            alias,
            where_clause: where_clause.unwrap_or_default(),
        });

    // ==========================================================================
    // Statements
    // ==========================================================================

    let statement = choice((
        select_query.map(Query::Select),
        kw("insert").ignore_then(insert.clone()).map(Query::Insert),
        kw("upsert").ignore_then(insert).map(Query::Upsert),
        kw("update").ignore_then(update).map(Query::Update),
        kw("delete").ignore_then(delete).map(Query::Delete),
    ))
    .labelled("statement");

    (statement, xpr)
}

fn parse_number(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::from(i));
    }
    text.parse::<f64>().ok().and_then(Number::from_f64)
}

/// A literal value written as a token stream (`1`, `'x'`, `-2.5`, `null`).
fn literal(tokens: &[Expr]) -> Option<Value> {
    match tokens {
        [Expr::Val(value)] => Some(value.clone()),
        [minus, Expr::Val(Value::Number(n))] if minus.is_keyword("-") => {
            if let Some(i) = n.as_i64() {
                Some(Value::Number(Number::from(-i)))
            } else {
                n.as_f64().and_then(|f| Number::from_f64(-f)).map(Value::Number)
            }
        }
        _ => None,
    }
}
