//! Query tree types.
//!
//! A query is a closed tree of statements, sources, columns and flat token
//! streams. The same types describe the input of a transformation (paths
//! through associations, structured elements, wildcards) and its output
//! (plain `alias.column` references, explicit joins, subqueries).
//!
//! References carry a resolution sidecar ([`RefLink`]) which is empty in
//! user input and filled in by [`crate::infer`].

pub mod display;
pub mod json;

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::model::{Element, Entity};

pub use json::CqnJsonError;

// ============================================================================
// Statements
// ============================================================================

/// A statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Select(Select),
    Insert(Insert),
    Upsert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Query {
    /// The SELECT of this statement, if it is one.
    pub fn as_select(&self) -> Option<&Select> {
        match self {
            Query::Select(select) => Some(select),
            _ => None,
        }
    }
}

impl From<Select> for Query {
    fn from(select: Select) -> Self {
        Query::Select(select)
    }
}

/// A SELECT statement (or subquery).
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub from: Source,
    /// Projection; empty means an implicit `*`.
    pub columns: Vec<Column>,
    /// Element names left out of the wildcard.
    pub excluding: Vec<String>,
    pub where_clause: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
    pub distinct: bool,
    /// At most one row is expected.
    pub one: bool,
    /// The subquery stands for an expanded association.
    pub expand: bool,
    /// Read the localized variants of the entities.
    pub localized: bool,
    /// Search terms (values combined with `and` / `or`).
    pub search: Vec<Expr>,
}

impl Select {
    /// `SELECT from <entity>`.
    pub fn from_entity(name: impl Into<String>) -> Self {
        Self::from_source(Source::entity(name))
    }

    pub fn from_source(from: Source) -> Self {
        Self {
            from,
            columns: Vec::new(),
            excluding: Vec::new(),
            where_clause: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            distinct: false,
            one: false,
            expand: false,
            localized: false,
            search: Vec::new(),
        }
    }

    #[must_use]
    pub fn columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    #[must_use]
    pub fn where_clause(mut self, tokens: Vec<Expr>) -> Self {
        self.where_clause = tokens;
        self
    }

    #[must_use]
    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }
}

/// INSERT or UPSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub into: Ref,
    pub columns: Vec<String>,
    /// A single row of values.
    pub values: Vec<Value>,
    pub rows: Vec<Vec<Value>>,
    pub entries: Vec<serde_json::Map<String, Value>>,
    pub as_select: Option<Box<Select>>,
}

impl Insert {
    pub fn into(path: Ref) -> Self {
        Self {
            into: path,
            columns: Vec::new(),
            values: Vec::new(),
            rows: Vec::new(),
            entries: Vec::new(),
            as_select: None,
        }
    }
}

/// UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub entity: Ref,
    pub alias: Option<String>,
    /// Plain values to set.
    pub data: IndexMap<String, Value>,
    /// Expressions to set.
    pub with: IndexMap<String, Expr>,
    pub where_clause: Vec<Expr>,
}

/// DELETE.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub from: Ref,
    pub alias: Option<String>,
    pub where_clause: Vec<Expr>,
}

// ============================================================================
// Sources
// ============================================================================

/// Something to select from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// An entity, or a path starting at an entity (`Authors:books`).
    Ref { path: Ref, alias: Option<String> },
    /// A derived table.
    Select { query: Box<Select>, alias: Option<String> },
    Join(Box<Join>),
}

impl Source {
    pub fn entity(name: impl Into<String>) -> Self {
        Source::Ref {
            path: Ref::new([name.into()]),
            alias: None,
        }
    }

    #[must_use]
    pub fn with_alias(self, alias: impl Into<String>) -> Self {
        match self {
            Source::Ref { path, .. } => Source::Ref {
                path,
                alias: Some(alias.into()),
            },
            Source::Select { query, .. } => Source::Select {
                query,
                alias: Some(alias.into()),
            },
            join @ Source::Join(_) => join,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub left: Source,
    pub right: Source,
    pub on: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinKind::Inner => "inner",
            JoinKind::Left => "left",
            JoinKind::Right => "right",
            JoinKind::Full => "full",
            JoinKind::Cross => "cross",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Some(JoinKind::Inner),
            "left" => Some(JoinKind::Left),
            "right" => Some(JoinKind::Right),
            "full" => Some(JoinKind::Full),
            "cross" => Some(JoinKind::Cross),
            _ => None,
        }
    }
}

// ============================================================================
// References
// ============================================================================

/// A reference path such as `author.name` or `Books.author[name = 'x'].ID`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ref {
    pub steps: Vec<Step>,
    /// One link per step once resolved; empty before.
    pub links: Vec<RefLink>,
}

impl Ref {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            steps: ids.into_iter().map(Step::new).collect(),
            links: Vec::new(),
        }
    }

    /// Dotted rendering of the step ids, used in messages.
    pub fn path(&self) -> String {
        self.steps
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn first_id(&self) -> &str {
        self.steps.first().map(|s| s.id.as_str()).unwrap_or("")
    }

    pub fn last_id(&self) -> &str {
        self.steps.last().map(|s| s.id.as_str()).unwrap_or("")
    }

    pub fn is_resolved(&self) -> bool {
        !self.links.is_empty() && self.links.len() == self.steps.len()
    }

    /// Link of the last step.
    pub fn leaf(&self) -> Option<&RefLink> {
        self.links.last()
    }

    /// Element denoted by the last step.
    pub fn leaf_element(&self) -> Option<&Arc<Element>> {
        self.leaf().and_then(RefLink::element)
    }
}

/// One step of a reference path.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub id: String,
    /// Named arguments (`Books(locale: 'de')`).
    pub args: Vec<(String, Expr)>,
    /// Infix filter (`books[stock > 0]`).
    pub filter: Vec<Expr>,
}

impl Step {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            args: Vec::new(),
            filter: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Vec<Expr>) -> Self {
        self.filter = filter;
        self
    }
}

/// Resolution of one reference step.
#[derive(Debug, Clone, PartialEq)]
pub struct RefLink {
    pub definition: Definition,
    /// Entity in which the following step is looked up.
    pub target: Option<Arc<Entity>>,
    /// Table alias owning the first step of the path.
    pub alias: Option<String>,
    /// Alias of the join through which this association step is read.
    pub join: Option<String>,
    /// Resolved defining expression of a calculated element.
    pub calculated: Option<Box<Expr>>,
}

impl RefLink {
    pub fn new(definition: Definition) -> Self {
        Self {
            definition,
            target: None,
            alias: None,
            join: None,
            calculated: None,
        }
    }

    pub fn element(&self) -> Option<&Arc<Element>> {
        match &self.definition {
            Definition::Element(element) => Some(element),
            _ => None,
        }
    }
}

/// What a reference step denotes.
#[derive(Debug, Clone, PartialEq)]
pub enum Definition {
    /// The entity a FROM path starts at.
    Entity(Arc<Entity>),
    /// A table alias of this query (`outer == false`) or of an enclosing one.
    TableAlias { alias: String, outer: bool },
    Element(Arc<Element>),
    /// `$self` / `$projection`: the query's own columns.
    SelfRef,
    /// `$now`, `$user` and other pseudo variables.
    Variable,
    /// A column alias of the query (order by only).
    ColumnAlias,
}

// ============================================================================
// Expressions
// ============================================================================

/// A token of an expression stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ref(Ref),
    Val(Value),
    /// Bind parameter; `?` for positional ones.
    Param(String),
    Func { name: String, args: Vec<Expr> },
    /// Parenthesized sub-stream.
    Xpr(Vec<Expr>),
    List(Vec<Expr>),
    Query(Box<Select>),
    /// Operators and keywords (`=`, `and`, `exists`, `in`, ...).
    Keyword(String),
}

impl Expr {
    pub fn kw(keyword: impl Into<String>) -> Self {
        Expr::Keyword(keyword.into())
    }

    pub fn val(value: impl Into<Value>) -> Self {
        Expr::Val(value.into())
    }

    pub fn null() -> Self {
        Expr::Val(Value::Null)
    }

    pub fn reference<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expr::Ref(Ref::new(ids))
    }

    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    /// Case-insensitive keyword test.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Expr::Keyword(k) if k.eq_ignore_ascii_case(keyword))
    }

    pub fn as_ref(&self) -> Option<&Ref> {
        match self {
            Expr::Ref(r) => Some(r),
            _ => None,
        }
    }
}

// ============================================================================
// Columns
// ============================================================================

/// One entry of a projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub kind: ColumnKind,
    pub alias: Option<String>,
    /// Target type of a cast (`x as y : cds.String`).
    pub cast: Option<String>,
    /// Schema element an output column was derived from.
    pub element: Option<Arc<Element>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    Wildcard,
    Expr(Expr),
    /// `assoc { ... }` or anonymous `{ ... } as x`.
    Expand(Nested),
    /// `struct.{ ... }` / `assoc.{ ... }` / `struct.*`.
    Inline(Nested),
}

impl Column {
    pub fn wildcard() -> Self {
        Self::new(ColumnKind::Wildcard)
    }

    pub fn expr(expr: Expr) -> Self {
        Self::new(ColumnKind::Expr(expr))
    }

    pub fn reference<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::expr(Expr::reference(ids))
    }

    pub fn new(kind: ColumnKind) -> Self {
        Self {
            kind,
            alias: None,
            cast: None,
            element: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_cast(mut self, type_name: impl Into<String>) -> Self {
        self.cast = Some(type_name.into());
        self
    }

    #[must_use]
    pub fn with_element(mut self, element: Option<Arc<Element>>) -> Self {
        self.element = element;
        self
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.kind, ColumnKind::Wildcard)
    }
}

/// Body of an expand or inline column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Nested {
    /// Navigated path; `None` for anonymous expands.
    pub path: Option<Ref>,
    pub columns: Vec<Column>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
    pub excluding: Vec<String>,
}

impl Nested {
    pub fn new(path: Option<Ref>, columns: Vec<Column>) -> Self {
        Self {
            path,
            columns,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expr: Expr,
    pub descending: bool,
    pub nulls: Option<Nulls>,
}

impl OrderBy {
    pub fn asc(expr: Expr) -> Self {
        Self {
            expr,
            descending: false,
            nulls: None,
        }
    }

    pub fn desc(expr: Expr) -> Self {
        Self {
            expr,
            descending: true,
            nulls: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nulls {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub rows: Expr,
    pub offset: Option<Expr>,
}

// ============================================================================
// Stream helpers
// ============================================================================

/// Whether a token stream has an `or` outside of any parentheses.
pub fn has_top_level_or(tokens: &[Expr]) -> bool {
    tokens.iter().any(|t| t.is_keyword("or"))
}

/// Joins non-empty conditions with `and`.
///
/// When more than one condition remains, conditions with a top-level `or`
/// are wrapped in parentheses so the conjunction keeps its meaning.
pub fn and_all(parts: Vec<Vec<Expr>>) -> Vec<Expr> {
    let parts: Vec<Vec<Expr>> = parts.into_iter().filter(|p| !p.is_empty()).collect();
    if parts.len() == 1 {
        return parts.into_iter().next().unwrap_or_default();
    }

    let mut out = Vec::new();
    for part in parts {
        if !out.is_empty() {
            out.push(Expr::kw("and"));
        }
        if has_top_level_or(&part) {
            out.push(Expr::Xpr(part));
        } else {
            out.extend(part);
        }
    }
    out
}
