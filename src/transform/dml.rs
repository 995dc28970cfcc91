//! INSERT, UPSERT, UPDATE and DELETE.
//!
//! UPDATE and DELETE can't join. When their condition reads through an
//! association, it moves into a key subquery over a second alias of the
//! same entity:
//!
//! ```text
//! DELETE from Books as Books where Books.ID in
//!   (SELECT from Books as Books2 left join Authors as author on ... { Books2.ID } where author.name = 'x')
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::cqn::{and_all, Column, ColumnKind, Delete, Expr, Insert, Ref, Select, Source, Update};
use crate::error::{TransformError, TransformResult};
use crate::infer::{from_hops, infer, qualify_filter};
use crate::model::Entity;

use super::alias::AliasScope;
use super::exists::Root;
use super::flatten::{element_leaves, join};
use super::{single, Ctx, Transformer};

/// Compiled target and condition of an UPDATE or DELETE.
struct Target {
    entity: String,
    alias: String,
    where_clause: Vec<Expr>,
    with: IndexMap<String, Expr>,
}

impl Transformer<'_> {
    pub(super) fn insert(&self, insert: &Insert) -> TransformResult<Insert> {
        let target = self.target_entity(&insert.into)?;
        let mut out = insert.clone();
        out.into = Ref::new([target.name.clone()]);
        if let Some(select) = &insert.as_select {
            out.as_select = Some(Box::new(self.select(select, None, false, None)?));
        }
        Ok(out)
    }

    pub(super) fn update(&self, update: &Update) -> TransformResult<Update> {
        let target = self.target(&update.entity, &update.alias, &update.where_clause, &update.with)?;
        Ok(Update {
            entity: Ref::new([target.entity]),
            alias: Some(target.alias),
            data: update.data.clone(),
            with: target.with,
            where_clause: target.where_clause,
        })
    }

    pub(super) fn delete(&self, delete: &Delete) -> TransformResult<Delete> {
        let target = self.target(&delete.from, &delete.alias, &delete.where_clause, &IndexMap::new())?;
        Ok(Delete {
            from: Ref::new([target.entity]),
            alias: Some(target.alias),
            where_clause: target.where_clause,
        })
    }

    /// Entity a (path) reference in `INSERT into` ends at.
    fn target_entity(&self, path: &Ref) -> TransformResult<Arc<Entity>> {
        let root = self.model.require_entity(path.first_id())?;
        let hops = from_hops(self.model, root, path)?;
        Ok(hops.last().map_or_else(|| root.clone(), |h| h.target.clone()))
    }

    fn target(
        &self,
        path: &Ref,
        alias: &Option<String>,
        where_clause: &[Expr],
        with: &IndexMap<String, Expr>,
    ) -> TransformResult<Target> {
        let mut input = Select::from_source(Source::Ref {
            path: path.clone(),
            alias: alias.clone(),
        })
        .where_clause(where_clause.to_vec());
        input.columns = with
            .iter()
            .map(|(name, expr)| Column::expr(expr.clone()).with_alias(name.clone()))
            .collect();

        let mut scope = AliasScope::new(None);
        let inferred = {
            let mut derive = |q: &Select| self.select(q, None, false, None);
            infer(self.model, &self.settings, &input, &mut scope, false, false, &mut derive)?
        };
        let ctx = Ctx::new(&scope, &inferred.select.columns, false);
        let source = scope
            .primary()
            .ok_or_else(|| TransformError::unsupported("statement without target"))?;

        let mut compiled_with = IndexMap::new();
        for column in &inferred.select.columns {
            let (Some(name), ColumnKind::Expr(expr)) = (&column.alias, &column.kind) else {
                continue;
            };
            if reads_join(expr) {
                return Err(TransformError::unsupported(format!(
                    "expression for \"{}\" reads through an association",
                    name
                )));
            }
            compiled_with.insert(name.clone(), single(self.rewrite(std::slice::from_ref(expr), &ctx)?));
        }

        let mut conditions = Vec::new();
        if let Some(from_path) = &inferred.from_path {
            let root = Root::Entity {
                step: &from_path.root,
                entity: &from_path.entity,
            };
            conditions.push(self.back_chain(&from_path.hops, root, &source.alias, &ctx)?);
        }
        if inferred.joins.is_empty() {
            conditions.push(self.rewrite(&inferred.select.where_clause, &ctx)?);
        } else {
            conditions.push(self.key_subquery(&source.entity, &source.alias, path, where_clause, &ctx)?);
        }

        Ok(Target {
            entity: source.entity.name.clone(),
            alias: source.alias.clone(),
            where_clause: and_all(conditions),
            with: compiled_with,
        })
    }

    /// `(alias.keys) in (SELECT keys from E as E2 <joins> where ...)`.
    fn key_subquery(
        &self,
        entity: &Arc<Entity>,
        alias: &str,
        path: &Ref,
        where_clause: &[Expr],
        ctx: &Ctx<'_>,
    ) -> TransformResult<Vec<Expr>> {
        let keys: Vec<_> = entity.keys().cloned().collect();
        let mut key_columns = Vec::new();
        for key in &keys {
            for leaf in element_leaves(self.model, key, &key.name)? {
                key_columns.push(join(&key.flat_name, &leaf.suffix));
            }
        }
        if key_columns.is_empty() {
            return Err(TransformError::unsupported(format!(
                "\"{}\" has no keys to match the rows to change",
                entity.name
            )));
        }

        let inner = ctx.scope.unique_in_chain(alias);
        debug!(entity = %entity.name, alias = %inner, "building key subquery");

        let last = path.steps.last();
        let filter = match last {
            Some(step) => qualify_filter(&step.filter, &inner, entity, &path.path())?,
            None => Vec::new(),
        };
        let renamed: Vec<Expr> = where_clause.iter().map(|t| rename_alias(t, alias, &inner)).collect();

        let input = Select::from_source(Source::entity(entity.name.clone()).with_alias(inner.clone()))
            .columns(
                keys.iter()
                    .map(|k| Column::reference([inner.clone(), k.name.clone()]))
                    .collect(),
            )
            .where_clause(and_all(vec![filter, renamed]));
        // uncorrelated
        let sub = self.select(&input, None, false, None)?;

        let lhs = match key_columns.as_slice() {
            [key] => Expr::reference([alias, key.as_str()]),
            _ => Expr::List(
                key_columns
                    .iter()
                    .map(|k| Expr::reference([alias, k.as_str()]))
                    .collect(),
            ),
        };
        Ok(vec![lhs, Expr::kw("in"), Expr::Query(Box::new(sub))])
    }
}

/// Whether an expression reads a column through a join.
fn reads_join(expr: &Expr) -> bool {
    match expr {
        Expr::Ref(r) => r.links.iter().any(|l| l.join.is_some()),
        Expr::Func { args: items, .. } | Expr::Xpr(items) | Expr::List(items) => items.iter().any(reads_join),
        _ => false,
    }
}

/// Point references that start with table alias `from` at `to`.
fn rename_alias(token: &Expr, from: &str, to: &str) -> Expr {
    match token {
        Expr::Ref(r) if r.steps.len() > 1 && r.first_id() == from => {
            let mut steps = r.steps.clone();
            steps[0].id = to.to_string();
            Expr::Ref(Ref {
                steps,
                links: Vec::new(),
            })
        }
        Expr::Func { name, args } => Expr::func(name.clone(), args.iter().map(|a| rename_alias(a, from, to)).collect()),
        Expr::Xpr(tokens) => Expr::Xpr(tokens.iter().map(|t| rename_alias(t, from, to)).collect()),
        Expr::List(items) => Expr::List(items.iter().map(|t| rename_alias(t, from, to)).collect()),
        other => other.clone(),
    }
}
