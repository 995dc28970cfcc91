//! Join conditions of associations.

use std::sync::Arc;

use crate::cqn::{Expr, Ref};
use crate::error::{TransformError, TransformResult};
use crate::infer::link_path;
use crate::model::{Element, Entity};

use super::flatten::{foreign_keys, join};
use super::{Ctx, Transformer};

/// Backlinks pointing back and forth between unmanaged associations give up
/// after this many flips.
const MAX_BACKLINK_DEPTH: usize = 8;

impl Transformer<'_> {
    /// Condition linking a row of the association's source, read as
    /// `source_alias`, with a row of its target, read as `target_alias`.
    pub(super) fn on_condition(
        &self,
        element: &Element,
        source_alias: &str,
        target_alias: &str,
        ctx: &Ctx<'_>,
    ) -> TransformResult<Vec<Expr>> {
        self.on_condition_at(element, source_alias, target_alias, ctx, 0)
    }

    fn on_condition_at(
        &self,
        element: &Element,
        source_alias: &str,
        target_alias: &str,
        ctx: &Ctx<'_>,
        depth: usize,
    ) -> TransformResult<Vec<Expr>> {
        if depth > MAX_BACKLINK_DEPTH {
            return Err(TransformError::unsupported(format!(
                "backlinks of \"{}\" never reach a managed association",
                element.name
            )));
        }
        let assoc = element
            .association()
            .ok_or_else(|| TransformError::AssociationAsValue { path: element.name.clone() })?;

        let Some(on) = &assoc.on else {
            let mut tokens = Vec::new();
            for fk in foreign_keys(self.model, element, &element.name)? {
                if !tokens.is_empty() {
                    tokens.push(Expr::kw("and"));
                }
                tokens.push(Expr::reference([target_alias, fk.target_column.as_str()]));
                tokens.push(Expr::kw("="));
                tokens.push(Expr::reference([
                    source_alias.to_string(),
                    join(&element.flat_name, &fk.suffix),
                ]));
            }
            return Ok(tokens);
        };

        let sides = Sides {
            element,
            source: self.model.require_entity(&element.parent)?.clone(),
            target: self.model.require_entity(&assoc.target)?.clone(),
            source_alias,
            target_alias,
            depth,
        };
        let linked = self.link_on(on, &sides, ctx)?;
        self.rewrite(&linked, ctx)
    }

    /// Attach links to the references of a stored on-condition. Backlinks
    /// come out already compiled.
    fn link_on(&self, on: &[Expr], sides: &Sides<'_>, ctx: &Ctx<'_>) -> TransformResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(on.len());
        let mut i = 0;
        while i < on.len() {
            if let Some(condition) = self.backlink(&on[i..], sides, ctx)? {
                let neighbours = i > 0 || i + 3 < on.len();
                if neighbours && condition.len() > 3 {
                    out.push(Expr::Xpr(condition));
                } else {
                    out.extend(condition);
                }
                i += 3;
                continue;
            }
            out.push(self.link_token(&on[i], sides, ctx)?);
            i += 1;
        }
        Ok(out)
    }

    /// `assoc.back = $self`: the condition of `back`, seen from the other
    /// side.
    fn backlink(&self, tokens: &[Expr], sides: &Sides<'_>, ctx: &Ctx<'_>) -> TransformResult<Option<Vec<Expr>>> {
        let [Expr::Ref(lhs), op, Expr::Ref(rhs), ..] = tokens else {
            return Ok(None);
        };
        if !op.is_keyword("=") {
            return Ok(None);
        }
        let path = if is_self(rhs) {
            lhs
        } else if is_self(lhs) {
            rhs
        } else {
            return Ok(None);
        };
        if path.steps.len() < 2 || path.first_id() != sides.element.name {
            return Ok(None);
        }

        let back_path = Ref {
            steps: path.steps[1..].to_vec(),
            links: Vec::new(),
        };
        let linked = link_path(self.model, &sides.target, Some(sides.target_alias), &back_path)?;
        let Some(back) = linked.leaf_element().filter(|e| e.is_association()) else {
            return Ok(None);
        };

        match back.association() {
            Some(assoc) if assoc.is_managed() => {
                let mut tokens = Vec::new();
                for fk in foreign_keys(self.model, back, &path.path())? {
                    if !tokens.is_empty() {
                        tokens.push(Expr::kw("and"));
                    }
                    tokens.push(Expr::reference([
                        sides.target_alias.to_string(),
                        join(&back.flat_name, &fk.suffix),
                    ]));
                    tokens.push(Expr::kw("="));
                    tokens.push(Expr::reference([sides.source_alias, fk.target_column.as_str()]));
                }
                Ok(Some(tokens))
            }
            _ => self
                .on_condition_at(back, sides.target_alias, sides.source_alias, ctx, sides.depth + 1)
                .map(Some),
        }
    }

    fn link_token(&self, token: &Expr, sides: &Sides<'_>, ctx: &Ctx<'_>) -> TransformResult<Expr> {
        Ok(match token {
            Expr::Ref(r) => Expr::Ref(self.link_ref(r, sides)?),
            Expr::Xpr(tokens) => Expr::Xpr(self.link_on(tokens, sides, ctx)?),
            Expr::Func { name, args } => Expr::Func {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| self.link_token(a, sides, ctx))
                    .collect::<TransformResult<_>>()?,
            },
            Expr::List(items) => Expr::List(
                items
                    .iter()
                    .map(|a| self.link_token(a, sides, ctx))
                    .collect::<TransformResult<_>>()?,
            ),
            other => other.clone(),
        })
    }

    /// `assoc.x` reads the target, `$self.x` and plain names the source.
    fn link_ref(&self, r: &Ref, sides: &Sides<'_>) -> TransformResult<Ref> {
        let rest = |from: usize| Ref {
            steps: r.steps[from..].to_vec(),
            links: Vec::new(),
        };
        if r.steps.len() > 1 && r.first_id() == sides.element.name {
            return link_path(self.model, &sides.target, Some(sides.target_alias), &rest(1));
        }
        if r.steps.len() > 1 && is_self_head(r) {
            return link_path(self.model, &sides.source, Some(sides.source_alias), &rest(1));
        }
        if is_self(r) {
            return Err(TransformError::unsupported(format!(
                "\"$self\" in the condition of \"{}\" is not compared with a backlink",
                sides.element.name
            )));
        }
        link_path(self.model, &sides.source, Some(sides.source_alias), r)
    }
}

/// Both ends of an unmanaged association.
struct Sides<'a> {
    element: &'a Element,
    source: Arc<Entity>,
    target: Arc<Entity>,
    source_alias: &'a str,
    target_alias: &'a str,
    depth: usize,
}

fn is_self_head(r: &Ref) -> bool {
    matches!(r.first_id(), "$self" | "$projection")
}

fn is_self(r: &Ref) -> bool {
    r.steps.len() == 1 && is_self_head(r)
}
