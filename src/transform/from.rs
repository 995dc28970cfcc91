//! The `FROM` clause: explicit sources plus one `left join` per join node.

use std::collections::HashSet;

use tracing::debug;

use crate::cqn::{and_all, Expr, Join, JoinKind, Ref, Source};
use crate::error::TransformResult;
use crate::infer::{filter_shorthand, table_name, Inferred, JoinNode};

use super::{Base, Ctx, Transformer};

impl Transformer<'_> {
    pub(super) fn from(&self, inferred: &Inferred, ctx: &Ctx<'_>) -> TransformResult<Source> {
        let mut source = self.explicit_source(&inferred.select.from, ctx)?;

        let mut skipped: HashSet<usize> = HashSet::new();
        for index in inferred.joins.pre_order() {
            let node = inferred.joins.node(index);
            let parent_skipped = node.parent.is_some_and(|p| skipped.contains(&p));
            if node.target.persistence_skip || parent_skipped {
                skipped.insert(index);
                continue;
            }

            let on = and_all(vec![
                self.on_condition(&node.element, &node.source_alias, &node.alias, ctx)?,
                self.join_filter(node, ctx)?,
            ]);
            let table = table_name(self.model, &self.settings, &node.target, ctx.localized);
            debug!(alias = %node.alias, table = %table, "emitting join");
            source = Source::Join(Box::new(Join {
                kind: JoinKind::Left,
                left: source,
                right: Source::Ref {
                    path: Ref::new([table]),
                    alias: Some(node.alias.clone()),
                },
                on,
            }));
        }
        Ok(source)
    }

    /// Rewrite the conditions of joins written in the query.
    fn explicit_source(&self, source: &Source, ctx: &Ctx<'_>) -> TransformResult<Source> {
        match source {
            Source::Join(join) => Ok(Source::Join(Box::new(Join {
                kind: join.kind,
                left: self.explicit_source(&join.left, ctx)?,
                right: self.explicit_source(&join.right, ctx)?,
                on: self.rewrite(&join.on, ctx)?,
            }))),
            other => Ok(other.clone()),
        }
    }

    /// Infix filter of a join, read against the joined table.
    fn join_filter(&self, node: &JoinNode, ctx: &Ctx<'_>) -> TransformResult<Vec<Expr>> {
        if node.filter.is_empty() {
            return Ok(Vec::new());
        }
        let path = node.path.join(".");
        let filter = filter_shorthand(&node.filter, &node.target, &path)?.unwrap_or_else(|| node.filter.clone());
        let base = ctx.with_base(Base {
            alias: node.alias.clone(),
            entity: node.target.clone(),
        });
        self.rewrite(&filter, &base)
    }
}
