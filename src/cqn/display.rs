//! CQL-style rendering of query trees.
//!
//! The output reads like the textual query language accepted by
//! [`crate::cql`], so a transformed query can be compared against an
//! expected string:
//!
//! ```text
//! SELECT from Books as Books left join Authors as author on author.ID = Books.author_ID
//!   { Books.title, author.name as author_name }
//! ```
//! (printed on one line).

use std::fmt::{self, Display, Formatter, Write};

use serde_json::Value;

use super::{
    Column, ColumnKind, Delete, Expr, Insert, Limit, Nested, Nulls, OrderBy, Query, Ref, Select,
    Source, Step, Update,
};

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Query::Select(select) => select.fmt(f),
            Query::Insert(insert) => fmt_insert(f, "INSERT", insert),
            Query::Upsert(insert) => fmt_insert(f, "UPSERT", insert),
            Query::Update(update) => update.fmt(f),
            Query::Delete(delete) => delete.fmt(f),
        }
    }
}

impl Display for Select {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT ")?;
        if self.one {
            f.write_str("one ")?;
        }
        if self.distinct {
            f.write_str("distinct ")?;
        }
        write!(f, "from {}", self.from)?;

        if !self.columns.is_empty() {
            f.write_str(" { ")?;
            fmt_columns(f, &self.columns)?;
            f.write_str(" }")?;
        }
        if !self.excluding.is_empty() {
            write!(f, " excluding {{ {} }}", self.excluding.join(", "))?;
        }
        if !self.where_clause.is_empty() {
            f.write_str(" where ")?;
            fmt_tokens(f, &self.where_clause)?;
        }
        if !self.search.is_empty() {
            f.write_str(" search ")?;
            fmt_tokens(f, &self.search)?;
        }
        if !self.group_by.is_empty() {
            f.write_str(" group by ")?;
            fmt_list(f, &self.group_by)?;
        }
        if !self.having.is_empty() {
            f.write_str(" having ")?;
            fmt_tokens(f, &self.having)?;
        }
        fmt_order_limit(f, &self.order_by, self.limit.as_ref())
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Source::Ref { path, alias } => {
                fmt_from_path(f, path)?;
                fmt_alias(f, alias.as_deref())
            }
            Source::Select { query, alias } => {
                write!(f, "({})", query)?;
                fmt_alias(f, alias.as_deref())
            }
            Source::Join(join) => {
                write!(f, "{} {} join {}", join.left, join.kind.as_str(), join.right)?;
                if !join.on.is_empty() {
                    f.write_str(" on ")?;
                    fmt_tokens(f, &join.on)?;
                }
                Ok(())
            }
        }
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ColumnKind::Wildcard => f.write_str("*")?,
            // A bare expression list reads better without the outer parentheses.
            ColumnKind::Expr(Expr::Xpr(tokens)) => fmt_tokens(f, tokens)?,
            ColumnKind::Expr(expr) => expr.fmt(f)?,
            ColumnKind::Expand(nested) => {
                if let Some(path) = &nested.path {
                    write!(f, "{} ", path)?;
                }
                fmt_nested(f, nested)?;
            }
            ColumnKind::Inline(nested) => {
                if let Some(path) = &nested.path {
                    write!(f, "{}.", path)?;
                }
                fmt_nested(f, nested)?;
            }
        }
        fmt_alias(f, self.alias.as_deref())?;
        if let Some(cast) = &self.cast {
            write!(f, " : {}", cast)?;
        }
        Ok(())
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ref(r) => r.fmt(f),
            Expr::Val(value) => fmt_value(f, value),
            Expr::Param(name) if name == "?" => f.write_str("?"),
            Expr::Param(name) => write!(f, ":{}", name),
            Expr::Func { name, args } => {
                write!(f, "{}(", name)?;
                fmt_list(f, args)?;
                f.write_str(")")
            }
            Expr::Xpr(tokens) => {
                f.write_str("(")?;
                fmt_tokens(f, tokens)?;
                f.write_str(")")
            }
            Expr::List(items) => {
                f.write_str("(")?;
                fmt_list(f, items)?;
                f.write_str(")")
            }
            Expr::Query(select) => write!(f, "({})", select),
            Expr::Keyword(keyword) => f.write_str(keyword),
        }
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_char('.')?;
            }
            step.fmt(f)?;
        }
        Ok(())
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)?;
        if !self.args.is_empty() {
            f.write_char('(')?;
            for (i, (name, value)) in self.args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}: {}", name, value)?;
            }
            f.write_char(')')?;
        }
        if !self.filter.is_empty() {
            f.write_char('[')?;
            fmt_tokens(f, &self.filter)?;
            f.write_char(']')?;
        }
        Ok(())
    }
}

impl Display for OrderBy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.expr.fmt(f)?;
        if self.descending {
            f.write_str(" desc")?;
        }
        match self.nulls {
            Some(Nulls::First) => f.write_str(" nulls first"),
            Some(Nulls::Last) => f.write_str(" nulls last"),
            None => Ok(()),
        }
    }
}

impl Display for Update {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {}", self.entity)?;
        fmt_alias(f, self.alias.as_deref())?;

        let assignments: Vec<String> = self
            .data
            .iter()
            .map(|(name, value)| format!("{} = {}", name, Expr::Val(value.clone())))
            .chain(
                self.with
                    .iter()
                    .map(|(name, expr)| format!("{} = {}", name, expr)),
            )
            .collect();
        if !assignments.is_empty() {
            write!(f, " set {}", assignments.join(", "))?;
        }
        if !self.where_clause.is_empty() {
            f.write_str(" where ")?;
            fmt_tokens(f, &self.where_clause)?;
        }
        Ok(())
    }
}

impl Display for Delete {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE from {}", self.from)?;
        fmt_alias(f, self.alias.as_deref())?;
        if !self.where_clause.is_empty() {
            f.write_str(" where ")?;
            fmt_tokens(f, &self.where_clause)?;
        }
        Ok(())
    }
}

fn fmt_insert(f: &mut Formatter<'_>, verb: &str, insert: &Insert) -> fmt::Result {
    write!(f, "{} into {}", verb, insert.into)?;
    if !insert.columns.is_empty() {
        write!(f, " ({})", insert.columns.join(", "))?;
    }
    if !insert.values.is_empty() {
        f.write_str(" values ")?;
        fmt_row(f, &insert.values)?;
    }
    if !insert.rows.is_empty() {
        f.write_str(" values ")?;
        for (i, row) in insert.rows.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            fmt_row(f, row)?;
        }
    }
    if !insert.entries.is_empty() {
        let entries = Value::Array(
            insert
                .entries
                .iter()
                .cloned()
                .map(Value::Object)
                .collect(),
        );
        write!(f, " entries {}", entries)?;
    }
    if let Some(select) = &insert.as_select {
        write!(f, " {}", select)?;
    }
    Ok(())
}

fn fmt_row(f: &mut Formatter<'_>, row: &[Value]) -> fmt::Result {
    f.write_char('(')?;
    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        fmt_value(f, value)?;
    }
    f.write_char(')')
}

/// `Entity[filter]:step.step`: the first step names the entity.
fn fmt_from_path(f: &mut Formatter<'_>, path: &Ref) -> fmt::Result {
    for (i, step) in path.steps.iter().enumerate() {
        match i {
            0 => {}
            1 => f.write_char(':')?,
            _ => f.write_char('.')?,
        }
        step.fmt(f)?;
    }
    Ok(())
}

fn fmt_nested(f: &mut Formatter<'_>, nested: &Nested) -> fmt::Result {
    f.write_str("{ ")?;
    fmt_columns(f, &nested.columns)?;
    f.write_str(" }")?;
    if !nested.excluding.is_empty() {
        write!(f, " excluding {{ {} }}", nested.excluding.join(", "))?;
    }
    fmt_order_limit(f, &nested.order_by, nested.limit.as_ref())
}

fn fmt_order_limit(f: &mut Formatter<'_>, order_by: &[OrderBy], limit: Option<&Limit>) -> fmt::Result {
    if !order_by.is_empty() {
        f.write_str(" order by ")?;
        fmt_list(f, order_by)?;
    }
    if let Some(limit) = limit {
        write!(f, " limit {}", limit.rows)?;
        if let Some(offset) = &limit.offset {
            write!(f, " offset {}", offset)?;
        }
    }
    Ok(())
}

fn fmt_alias(f: &mut Formatter<'_>, alias: Option<&str>) -> fmt::Result {
    match alias {
        Some(alias) => write!(f, " as {}", alias),
        None => Ok(()),
    }
}

fn fmt_columns(f: &mut Formatter<'_>, columns: &[Column]) -> fmt::Result {
    fmt_list(f, columns)
}

fn fmt_list<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        item.fmt(f)?;
    }
    Ok(())
}

fn fmt_tokens(f: &mut Formatter<'_>, tokens: &[Expr]) -> fmt::Result {
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            f.write_char(' ')?;
        }
        token.fmt(f)?;
    }
    Ok(())
}

fn fmt_value(f: &mut Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => f.write_str("null"),
        Value::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        other => write!(f, "{}", other),
    }
}
