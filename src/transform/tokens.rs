//! Token stream rewriting.
//!
//! One left-to-right pass over a resolved token stream:
//!
//! - `exists <path>` and `exists (SELECT ...)` become correlated subqueries
//! - `x in ()` becomes `x = null`, `x not in ()` becomes `x is not null`
//! - comparisons of structures or associations expand leaf by leaf
//! - calculated elements are replaced by their definition
//! - `$self.x` is replaced by the expression of column `x`
//! - every other reference is qualified with its table alias

use std::borrow::Cow;

use tracing::trace;

use crate::cqn::{Column, ColumnKind, Definition, Expr, Ref};
use crate::error::{TransformError, TransformResult};
use crate::infer::{implicit_name, link_path};

use super::flatten::{flatten, FlatLeaf};
use super::{single, Ctx, Transformer};

/// Operators whose tuple expansion joins the leaf comparisons with `and`.
const EQUALITY: &[&str] = &["=", "==", "is"];
const INEQUALITY: &[&str] = &["!=", "<>", "is not"];
const ORDERING: &[&str] = &["<", ">", "<=", ">="];

impl Transformer<'_> {
    pub(super) fn rewrite(&self, tokens: &[Expr], ctx: &Ctx<'_>) -> TransformResult<Vec<Expr>> {
        trace!(tokens = tokens.len(), "rewriting tokens");
        let mut out: Vec<Expr> = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            let token = &tokens[i];
            match token {
                Expr::Keyword(_) if token.is_keyword("exists") => match tokens.get(i + 1) {
                    Some(Expr::Ref(r)) => {
                        out.push(token.clone());
                        out.push(Expr::Query(Box::new(self.exists(r, ctx)?)));
                        i += 2;
                        continue;
                    }
                    Some(Expr::Query(q)) => {
                        out.push(token.clone());
                        out.push(Expr::Query(Box::new(self.select(
                            q,
                            Some(ctx.scope),
                            ctx.localized,
                            None,
                        )?)));
                        i += 2;
                        continue;
                    }
                    _ => out.push(token.clone()),
                },
                Expr::List(items) if items.is_empty() && out.last().is_some_and(|t| t.is_keyword("in")) => {
                    out.pop();
                    if out.last().is_some_and(|t| t.is_keyword("not")) {
                        out.pop();
                        out.extend([Expr::kw("is"), Expr::kw("not"), Expr::null()]);
                    } else {
                        out.extend([Expr::kw("="), Expr::null()]);
                    }
                }
                Expr::List(items) if items.iter().all(|e| matches!(e, Expr::Val(_))) => {
                    out.push(token.clone());
                }
                Expr::List(items) => {
                    let mut list = Vec::with_capacity(items.len());
                    for item in items {
                        list.push(single(self.rewrite(std::slice::from_ref(item), ctx)?));
                    }
                    out.push(Expr::List(list));
                }
                Expr::Ref(r) => {
                    let r = self.with_base(r, ctx)?;
                    if let Some(consumed) = self.tuple(&r, tokens, i, ctx, &mut out)? {
                        i += consumed;
                        continue;
                    }
                    out.push(self.value(&r, ctx)?);
                }
                Expr::Func { name, args } => {
                    let mut rewritten = Vec::with_capacity(args.len());
                    for arg in args {
                        rewritten.push(single(self.rewrite(std::slice::from_ref(arg), ctx)?));
                    }
                    out.push(Expr::func(name.clone(), rewritten));
                }
                Expr::Xpr(inner) => out.push(Expr::Xpr(self.rewrite(inner, ctx)?)),
                Expr::Query(q) => {
                    let compiled = self.select(q, Some(ctx.scope), ctx.localized, None)?;
                    out.push(Expr::Query(Box::new(compiled)));
                }
                other => out.push(other.clone()),
            }
            i += 1;
        }
        Ok(out)
    }

    /// Links for a reference inside an infix filter, which is read against
    /// the filtered table.
    pub(super) fn with_base<'r>(&self, r: &'r Ref, ctx: &Ctx<'_>) -> TransformResult<Cow<'r, Ref>> {
        match &ctx.base {
            Some(base) if r.links.is_empty() => Ok(Cow::Owned(link_path(
                self.model,
                &base.entity,
                Some(&base.alias),
                r,
            )?)),
            _ => Ok(Cow::Borrowed(r)),
        }
    }

    /// A reference in value position.
    fn value(&self, r: &Ref, ctx: &Ctx<'_>) -> TransformResult<Expr> {
        let Some(head) = r.links.first() else {
            // already compiled
            return Ok(Expr::Ref(r.clone()));
        };
        match &head.definition {
            Definition::SelfRef => self.self_ref(r, ctx),
            Definition::Variable | Definition::ColumnAlias => Ok(Expr::Ref(Ref {
                steps: r.steps.clone(),
                links: Vec::new(),
            })),
            _ => {
                if let Some(value) = r.leaf().and_then(|l| l.calculated.as_ref()) {
                    return Ok(single(self.rewrite(std::slice::from_ref(value.as_ref()), ctx)?));
                }
                let structural = r
                    .leaf_element()
                    .is_some_and(|e| e.is_struct() || e.is_association());
                let leaves = flatten(self.model, r)?;
                match leaves.as_slice() {
                    [leaf] if !structural && leaf.key.is_empty() => Ok(Expr::Ref(leaf.qualified())),
                    _ => Err(TransformError::AssociationAsValue { path: r.path() }),
                }
            }
        }
    }

    /// `$self.x`: the expression of the query's own column `x`.
    fn self_ref(&self, r: &Ref, ctx: &Ctx<'_>) -> TransformResult<Expr> {
        let [_, name] = r.steps.as_slice() else {
            return Err(TransformError::unsupported(format!(
                "\"{}\" must name exactly one column",
                r.path()
            )));
        };
        let column = ctx
            .columns
            .iter()
            .find(|c| output_name(c).as_deref() == Some(name.id.as_str()))
            .ok_or_else(|| TransformError::unresolvable(&name.id, r.path()))?;
        let ColumnKind::Expr(expr) = &column.kind else {
            return Err(TransformError::unsupported(format!(
                "\"{}\" refers to a column without expression",
                r.path()
            )));
        };
        ctx.substituting(&name.id, || {
            Ok(single(self.rewrite(std::slice::from_ref(expr), ctx)?))
        })
    }

    /// Expand a comparison with a structured left operand at `tokens[i]`.
    /// Returns the number of tokens consumed.
    fn tuple(
        &self,
        lhs: &Ref,
        tokens: &[Expr],
        i: usize,
        ctx: &Ctx<'_>,
        out: &mut Vec<Expr>,
    ) -> TransformResult<Option<usize>> {
        let structural = lhs.leaf().is_some_and(|l| l.calculated.is_none())
            && lhs
                .leaf_element()
                .is_some_and(|e| e.is_struct() || e.is_association());
        if !structural {
            return Ok(None);
        }

        let (op, op_len) = match (tokens.get(i + 1), tokens.get(i + 2)) {
            (Some(a), Some(b)) if a.is_keyword("is") && b.is_keyword("not") => ("is not".to_string(), 2),
            (Some(Expr::Keyword(k)), _) => (k.to_lowercase(), 1),
            _ => return Ok(None),
        };
        if ORDERING.contains(&op.as_str()) {
            return Err(TransformError::UnsupportedStructOperator { op, path: lhs.path() });
        }
        let conjunction = if EQUALITY.contains(&op.as_str()) {
            "and"
        } else if INEQUALITY.contains(&op.as_str()) {
            "or"
        } else {
            return Ok(None);
        };
        let Some(rhs) = tokens.get(i + 1 + op_len) else {
            return Ok(None);
        };

        let left = flatten(self.model, lhs)?;
        let pairs: Vec<(Expr, Expr)> = match rhs {
            Expr::Ref(r) => {
                let r = self.with_base(r, ctx)?;
                let right = flatten(self.model, &r)?;
                pair_leaves(&left, &right).ok_or_else(|| TransformError::StructureMismatch {
                    lhs: lhs.path(),
                    rhs: r.path(),
                })?
            }
            Expr::Val(value) if value.is_null() => left
                .iter()
                .map(|l| (Expr::Ref(l.qualified()), rhs.clone()))
                .collect(),
            Expr::Val(_) | Expr::Param(_) if left.len() == 1 => {
                vec![(Expr::Ref(left[0].qualified()), rhs.clone())]
            }
            other => {
                return Err(TransformError::StructureMismatch {
                    lhs: lhs.path(),
                    rhs: other.to_string(),
                })
            }
        };

        let mut expanded = Vec::with_capacity(pairs.len() * 4);
        for (l, r) in pairs {
            if !expanded.is_empty() {
                expanded.push(Expr::kw(conjunction));
            }
            expanded.push(l);
            if op == "is not" {
                expanded.extend([Expr::kw("is"), Expr::kw("not")]);
            } else {
                expanded.push(tokens[i + 1].clone());
            }
            expanded.push(r);
        }

        let consumed = 2 + op_len;
        let neighbours = i > 0 || i + consumed < tokens.len();
        if neighbours && expanded.len() > 3 {
            out.push(Expr::Xpr(expanded));
        } else {
            out.extend(expanded);
        }
        Ok(Some(consumed))
    }
}

/// Pair the leaves of two operands by their key paths.
fn pair_leaves(left: &[FlatLeaf], right: &[FlatLeaf]) -> Option<Vec<(Expr, Expr)>> {
    if left.len() != right.len() {
        return None;
    }
    left.iter()
        .map(|l| {
            right
                .iter()
                .find(|r| r.key == l.key)
                .map(|r| (Expr::Ref(l.qualified()), Expr::Ref(r.qualified())))
        })
        .collect()
}

/// Name of a resolved input column.
pub(super) fn output_name(column: &Column) -> Option<String> {
    if let Some(alias) = &column.alias {
        return Some(alias.clone());
    }
    match &column.kind {
        ColumnKind::Expr(Expr::Ref(r)) => Some(implicit_name(r)),
        _ => None,
    }
}
