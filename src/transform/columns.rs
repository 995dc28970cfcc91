//! The projection.
//!
//! Columns are built in two passes. The first flattens every reference
//! column and leaves a placeholder for each expand; the second builds the
//! expand subqueries, whose names can then be checked against all flat
//! columns.

use std::collections::HashSet;

use crate::cqn::{Column, ColumnKind, Definition, Expr, Ref};
use crate::error::{TransformError, TransformResult};
use crate::infer::{implicit_name, Inferred};

use super::flatten::{flatten, is_persisted, FlatLeaf};
use super::{single, Ctx, Transformer};

enum Slot<'c> {
    Ready(Vec<Column>),
    Deferred(&'c Column),
}

impl Transformer<'_> {
    pub(super) fn columns(&self, inferred: &Inferred, ctx: &Ctx<'_>) -> TransformResult<Vec<Column>> {
        let mut slots = Vec::with_capacity(inferred.select.columns.len());
        for column in &inferred.select.columns {
            match &column.kind {
                ColumnKind::Expand(_) => slots.push(Slot::Deferred(column)),
                _ => slots.push(Slot::Ready(self.column(column, ctx)?)),
            }
        }

        let names: HashSet<String> = slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Ready(columns) => Some(columns),
                Slot::Deferred(_) => None,
            })
            .flatten()
            .filter_map(flat_name)
            .collect();

        let mut out = Vec::with_capacity(slots.len());
        let mut expand_names: HashSet<String> = HashSet::new();
        for slot in slots {
            match slot {
                Slot::Ready(columns) => out.extend(columns),
                Slot::Deferred(column) => {
                    let expanded = self.expand(column, ctx)?;
                    let name = expanded.alias.clone().unwrap_or_default();
                    // only expand names are checked; flat columns may repeat
                    if names.contains(&name) || !expand_names.insert(name.clone()) {
                        return Err(TransformError::DuplicateColumn(name));
                    }
                    out.push(expanded);
                }
            }
        }

        if out.is_empty() {
            let entity = ctx
                .scope
                .primary()
                .map(|s| s.entity.name.clone())
                .unwrap_or_default();
            return Err(TransformError::EmptyProjection { entity });
        }
        Ok(out)
    }

    /// Output columns for one resolved input column.
    fn column(&self, column: &Column, ctx: &Ctx<'_>) -> TransformResult<Vec<Column>> {
        match &column.kind {
            ColumnKind::Expr(Expr::Ref(r)) if is_element_ref(r) => self.ref_column(column, r, ctx),
            ColumnKind::Expr(expr) => {
                let rewritten = single(self.rewrite(std::slice::from_ref(expr), ctx)?);
                let alias = column.alias.clone().or_else(|| match (expr, &rewritten) {
                    // `$self.x` and friends keep their name
                    (Expr::Ref(r), Expr::Ref(out)) if out.last_id() != r.last_id() => Some(r.last_id().to_string()),
                    (Expr::Ref(r), out) if !matches!(out, Expr::Ref(_)) => Some(r.last_id().to_string()),
                    _ => None,
                });
                Ok(vec![Column {
                    kind: ColumnKind::Expr(rewritten),
                    alias,
                    cast: column.cast.clone(),
                    element: column.element.clone(),
                }])
            }
            ColumnKind::Wildcard | ColumnKind::Inline(_) | ColumnKind::Expand(_) => Err(
                TransformError::unsupported(format!("unexpanded column \"{}\"", column)),
            ),
        }
    }

    /// Columns behind a reference to an element.
    fn ref_column(&self, column: &Column, r: &Ref, ctx: &Ctx<'_>) -> TransformResult<Vec<Column>> {
        let element = r.leaf_element().cloned();
        if element.as_ref().is_some_and(|e| e.is_virtual) {
            return Ok(Vec::new());
        }
        let base_name = column.alias.clone().unwrap_or_else(|| implicit_name(r));

        if let Some(value) = r.leaf().and_then(|l| l.calculated.as_ref()) {
            let rewritten = single(self.rewrite(std::slice::from_ref(value.as_ref()), ctx)?);
            return Ok(vec![Column {
                kind: ColumnKind::Expr(rewritten),
                alias: Some(base_name),
                cast: column.cast.clone(),
                element,
            }]);
        }

        let leaves: Vec<FlatLeaf> = flatten(self.model, r)?
            .into_iter()
            .filter(|leaf| is_persisted(self.model, leaf))
            .collect();
        let single_leaf = leaves.len() == 1;

        Ok(leaves
            .into_iter()
            .map(|leaf| {
                let name = match &column.alias {
                    Some(alias) if (single_leaf && leaf.suffix.is_empty()) || *alias == leaf.column => {
                        alias.clone()
                    }
                    Some(alias) => format!("{}_{}", alias, leaf.suffix),
                    None if leaf.suffix.is_empty() => base_name.clone(),
                    None => format!("{}_{}", base_name, leaf.suffix),
                };
                let alias = (name != leaf.column || column.cast.is_some()).then_some(name);
                Column {
                    kind: ColumnKind::Expr(Expr::Ref(leaf.qualified())),
                    alias,
                    cast: column.cast.clone(),
                    element: Some(leaf.element),
                }
            })
            .collect())
    }
}

/// Whether a resolved reference reads an element of a table.
fn is_element_ref(r: &Ref) -> bool {
    matches!(
        r.links.first().map(|l| &l.definition),
        Some(Definition::Element(_) | Definition::TableAlias { .. })
    )
}

/// Name of an output column.
fn flat_name(column: &Column) -> Option<String> {
    match (&column.alias, &column.kind) {
        (Some(alias), _) => Some(alias.clone()),
        (None, ColumnKind::Expr(Expr::Ref(r))) => Some(r.last_id().to_string()),
        _ => None,
    }
}
