//! Expand columns.
//!
//! `books { title }` becomes a correlated subquery column over the
//! association's target:
//!
//! ```text
//! (SELECT from Books as books { books.title } where Authors.ID = books.author_ID) as books
//! ```
//!
//! Multi-step expands (`author.books { ... }`) tie the subquery back to the
//! outer row with the same back-chain a `FROM` path uses, its last link
//! being a direct condition on the outer alias. Anonymous expands
//! (`{ ... } as x`) read the outer entity again, matched on all keys.

use tracing::debug;

use crate::cqn::{Column, ColumnKind, Expr, Nested, Ref, Select, Source};
use crate::error::{TransformError, TransformResult};
use crate::infer::{implicit_name, qualify_filter, Hop};

use super::flatten::{element_leaves, join};
use super::{Correlation, Ctx, Transformer};

impl Transformer<'_> {
    pub(super) fn expand(&self, column: &Column, ctx: &Ctx<'_>) -> TransformResult<Column> {
        let ColumnKind::Expand(nested) = &column.kind else {
            return Err(TransformError::unsupported(format!("\"{}\" is not an expand", column)));
        };
        match &nested.path {
            Some(path) => self.path_expand(column, path, nested, ctx),
            None => self.anonymous_expand(column, nested, ctx),
        }
    }

    fn path_expand(&self, column: &Column, path: &Ref, nested: &Nested, ctx: &Ctx<'_>) -> TransformResult<Column> {
        let hops = Hop::from_ref(self.model, path)?;
        let Some(last) = hops.last() else {
            return Err(TransformError::unsupported(format!(
                "expand \"{}\" does not follow an association",
                path.path()
            )));
        };
        let outer = path
            .links
            .first()
            .and_then(|l| l.alias.clone())
            .ok_or_else(|| TransformError::unsupported(format!("expand \"{}\" on an anonymous source", path.path())))?;

        let alias = ctx.scope.unique_in_chain(&last.id);
        let name = column.alias.clone().unwrap_or_else(|| implicit_name(path));
        debug!(path = %path.path(), alias = %alias, "building expand subquery");

        let mut input = subquery(nested, &last.target.name, &alias);
        input.where_clause = qualify_filter(&last.filter, &alias, &last.target, &path.path())?;
        input.one = hops.iter().all(Hop::is_to_one);

        let correlation = Correlation::Path { hops: hops.clone(), outer };
        let sub = self.select(&input, Some(ctx.scope), ctx.localized, Some(&correlation))?;
        Ok(Column {
            kind: ColumnKind::Expr(Expr::Query(Box::new(sub))),
            alias: Some(name),
            cast: None,
            element: path.leaf_element().cloned(),
        })
    }

    fn anonymous_expand(&self, column: &Column, nested: &Nested, ctx: &Ctx<'_>) -> TransformResult<Column> {
        let name = column
            .alias
            .clone()
            .ok_or_else(|| TransformError::unsupported("anonymous expand without alias"))?;
        let source = ctx
            .scope
            .primary()
            .filter(|s| !s.derived)
            .ok_or_else(|| TransformError::unsupported(format!("anonymous expand \"{}\" needs an entity source", name)))?;

        let mut keys = Vec::new();
        for key in source.entity.keys() {
            for leaf in element_leaves(self.model, key, &key.name)? {
                keys.push(join(&key.flat_name, &leaf.suffix));
            }
        }
        if keys.is_empty() {
            return Err(TransformError::unsupported(format!(
                "anonymous expand \"{}\" on \"{}\" which has no keys",
                name, source.entity.name
            )));
        }

        let alias = ctx.scope.unique_in_chain(source.entity.implicit_alias());
        debug!(name = %name, alias = %alias, "building anonymous expand subquery");
        let input = subquery(nested, &source.entity.name, &alias);

        let correlation = Correlation::Keys {
            outer: source.alias.clone(),
            keys,
        };
        let sub = self.select(&input, Some(ctx.scope), ctx.localized, Some(&correlation))?;
        Ok(Column {
            kind: ColumnKind::Expr(Expr::Query(Box::new(sub))),
            alias: Some(name),
            cast: None,
            element: None,
        })
    }
}

/// Input of an expand subquery: the nested projection over `entity`.
fn subquery(nested: &Nested, entity: &str, alias: &str) -> Select {
    let mut select = Select::from_source(Source::entity(entity).with_alias(alias));
    select.columns = nested.columns.clone();
    select.excluding = nested.excluding.clone();
    select.order_by = nested.order_by.clone();
    select.limit = nested.limit.clone();
    select.expand = true;
    select
}
