//! Where-exists subqueries.
//!
//! `exists author.books` turns into one correlated subquery per association
//! step, the first step being the outermost:
//!
//! ```text
//! exists (SELECT 1 from Authors as author where author.ID = Books.author_ID
//!   and exists (SELECT 1 from Books as books where books.author_ID = author.ID))
//! ```
//!
//! The same chain read backwards ties a `FROM` path or an expand to its
//! root: the query reads the last target and each subquery steps one
//! association back, until the root entity (or the correlated outer table)
//! is reached.

use std::sync::Arc;

use tracing::debug;

use crate::cqn::{and_all, Column, Expr, Ref, Select, Source, Step};
use crate::error::{TransformError, TransformResult};
use crate::infer::{qualify_filter, Hop};
use crate::model::Entity;

use super::alias::AliasScope;
use super::{Correlation, Ctx, Transformer};

/// Where a back-chain ends.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Root<'a> {
    /// A table of an enclosing query, by alias.
    Correlated(&'a str),
    /// The entity a `FROM` path starts at.
    Entity { step: &'a Step, entity: &'a Arc<Entity> },
}

/// A back-chain being built.
struct Chain<'c> {
    hops: &'c [Hop],
    root: Root<'c>,
    /// Alias of each hop's source, the first hop's one left out.
    aliases: Vec<String>,
    root_alias: String,
    scope: &'c AliasScope<'c>,
}

impl Transformer<'_> {
    /// `exists <path>`.
    pub(super) fn exists(&self, r: &Ref, ctx: &Ctx<'_>) -> TransformResult<Select> {
        let r = self.with_base(r, ctx)?;
        if !r.leaf_element().is_some_and(|e| e.is_association()) {
            return Err(TransformError::InvalidExistsTarget { path: r.path() });
        }
        let first_step = r
            .links
            .iter()
            .position(|l| l.element().is_some_and(|e| e.is_association()))
            .ok_or_else(|| TransformError::InvalidExistsTarget { path: r.path() })?;
        let hops = Hop::from_ref(self.model, &r)?;
        let Some(first) = hops.first() else {
            return Err(TransformError::InvalidExistsTarget { path: r.path() });
        };
        let outer = r
            .links
            .first()
            .and_then(|l| l.alias.clone())
            .ok_or_else(|| TransformError::unsupported(format!("exists \"{}\" on an anonymous source", r.path())))?;

        let alias = ctx.scope.unique_in_chain(&first.id);
        debug!(path = %r.path(), alias = %alias, "building exists subquery");

        let mut conditions = vec![qualify_filter(&first.filter, &alias, &first.target, &r.path())?];
        if hops.len() > 1 {
            let mut steps = vec![Step::new(alias.clone())];
            steps.extend(r.steps[first_step + 1..].iter().cloned());
            conditions.push(vec![
                Expr::kw("exists"),
                Expr::Ref(Ref {
                    steps,
                    links: Vec::new(),
                }),
            ]);
        }

        let input = Select::from_source(Source::entity(first.target.name.clone()).with_alias(alias))
            .columns(vec![Column::expr(Expr::val(1))])
            .where_clause(and_all(conditions));
        let correlation = Correlation::Path {
            hops: vec![first.clone()],
            outer,
        };
        self.select(&input, Some(ctx.scope), ctx.localized, Some(&correlation))
    }

    /// Condition tying a query over the last hop's target, read as `alias`,
    /// back to `root`.
    pub(super) fn back_chain(
        &self,
        hops: &[Hop],
        root: Root<'_>,
        alias: &str,
        ctx: &Ctx<'_>,
    ) -> TransformResult<Vec<Expr>> {
        if hops.is_empty() {
            return Ok(Vec::new());
        }

        let mut scope = ctx.scope.child();
        let aliases: Vec<String> = hops[..hops.len() - 1]
            .iter()
            .map(|hop| scope.next_available(&hop.id))
            .collect();
        let root_alias = match root {
            Root::Entity { entity, .. } => scope.next_available(entity.implicit_alias()),
            Root::Correlated(outer) => outer.to_string(),
        };

        let chain = Chain {
            hops,
            root,
            aliases,
            root_alias,
            scope: &scope,
        };
        self.link(&chain, hops.len() - 1, alias, ctx)
    }

    /// Condition tying the target of hop `k`, read as `target_alias`, to its
    /// source.
    fn link(&self, chain: &Chain<'_>, k: usize, target_alias: &str, ctx: &Ctx<'_>) -> TransformResult<Vec<Expr>> {
        let hop = &chain.hops[k];
        if k == 0 {
            return match chain.root {
                Root::Correlated(outer) => self.on_condition(&hop.element, outer, target_alias, ctx),
                Root::Entity { step, entity } => {
                    let on = self.on_condition(&hop.element, &chain.root_alias, target_alias, ctx)?;
                    let sub = self.chain_subquery(
                        entity,
                        step,
                        &chain.root_alias,
                        vec![on],
                        chain.scope,
                        ctx,
                    )?;
                    Ok(vec![Expr::kw("exists"), Expr::Query(Box::new(sub))])
                }
            };
        }

        let source_alias = &chain.aliases[k - 1];
        let previous = &chain.hops[k - 1];
        let on = self.on_condition(&hop.element, source_alias, target_alias, ctx)?;
        let inner = self.link(chain, k - 1, source_alias, ctx)?;

        let mut step = Step::new(previous.target.name.clone());
        step.filter = previous.filter.clone();
        let sub = self.chain_subquery(&previous.target, &step, source_alias, vec![on, inner], chain.scope, ctx)?;
        Ok(vec![Expr::kw("exists"), Expr::Query(Box::new(sub))])
    }

    /// `SELECT 1 from <entity> as <alias> where <conditions> and <filter>`.
    fn chain_subquery(
        &self,
        entity: &Arc<Entity>,
        step: &Step,
        alias: &str,
        conditions: Vec<Vec<Expr>>,
        scope: &AliasScope<'_>,
        ctx: &Ctx<'_>,
    ) -> TransformResult<Select> {
        let mut from = Step::new(entity.name.clone());
        from.args = step.args.clone();
        let filter = qualify_filter(&step.filter, alias, entity, &step.id)?;
        let input = Select::from_source(Source::Ref {
            path: Ref {
                steps: vec![from],
                links: Vec::new(),
            },
            alias: Some(alias.to_string()),
        })
        .columns(vec![Column::expr(Expr::val(1))])
        .where_clause(filter);

        debug!(entity = %entity.name, alias, "building back-chain subquery");
        let mut sub = self.select(&input, Some(scope), ctx.localized, None)?;
        let mut parts = conditions;
        parts.insert(1.min(parts.len()), std::mem::take(&mut sub.where_clause));
        sub.where_clause = and_all(parts);
        Ok(sub)
    }
}
