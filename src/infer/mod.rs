//! Reference resolution.
//!
//! Resolution is the first phase of compiling a SELECT. It registers the
//! query's sources with the alias scope, attaches a [`RefLink`] to every
//! step of every reference, and collects the joins that path expressions
//! in join-relevant positions need.
//!
//! Column lists are normalized on the way: inline columns and expands on
//! structures turn into plain prefixed references, and the wildcard is
//! replaced by the entity's elements (smart wildcard).
//!
//! Lookup order for the first step of a reference:
//!
//! 1. `$`-prefixed names: `$self`/`$projection` or a pseudo variable
//! 2. a table alias of this query, if more steps follow
//! 3. an element of exactly one of this query's sources
//! 4. a table alias of an enclosing query, if more steps follow
//! 5. a column alias (order by only)

mod join_tree;

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;

pub use join_tree::{JoinNode, JoinParent, JoinTree};

use crate::config::Settings;
use crate::cqn::{
    and_all, Column, ColumnKind, Definition, Expr, Nested, Ref, RefLink, Select, Source, Step,
};
use crate::error::{TransformError, TransformResult};
use crate::model::{Association, Element, ElementKind, Entity, Model, LARGE_BINARY};
use crate::transform::alias::AliasScope;

/// A table visible in a query.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub alias: String,
    pub entity: Arc<Entity>,
    /// A subquery in `FROM`; `entity` describes its columns.
    pub derived: bool,
    /// A subquery in `FROM` without alias, read with one-part references.
    pub anonymous: bool,
}

impl SourceInfo {
    /// Alias to qualify columns of this source with.
    pub fn qualifier(&self) -> Option<String> {
        (!self.anonymous).then(|| self.alias.clone())
    }
}

/// An association step that is compiled into a correlated subquery.
#[derive(Debug, Clone)]
pub struct Hop {
    pub id: String,
    pub element: Arc<Element>,
    pub source: Arc<Entity>,
    pub target: Arc<Entity>,
    pub filter: Vec<Expr>,
}

impl Hop {
    pub fn association(&self) -> Option<&Association> {
        self.element.association()
    }

    pub fn is_to_one(&self) -> bool {
        self.association().is_some_and(|a| !a.to_many)
    }

    /// The association steps of a resolved reference.
    pub fn from_ref(model: &Model, r: &Ref) -> TransformResult<Vec<Hop>> {
        let mut hops = Vec::new();
        for (step, link) in r.steps.iter().zip(&r.links) {
            let (Some(element), Some(target)) = (link.element(), &link.target) else {
                continue;
            };
            if !element.is_association() {
                continue;
            }
            hops.push(Hop {
                id: step.id.clone(),
                element: element.clone(),
                source: model.require_entity(&element.parent)?.clone(),
                target: target.clone(),
                filter: step.filter.clone(),
            });
        }
        Ok(hops)
    }
}

/// A `FROM` path such as `Authors[ID = 1]:books`.
#[derive(Debug, Clone)]
pub struct FromPath {
    /// First step, naming the entity the path starts at.
    pub root: Step,
    pub entity: Arc<Entity>,
    pub hops: Vec<Hop>,
}

/// Result of resolving a SELECT.
#[derive(Debug)]
pub struct Inferred {
    /// The query with resolved references. Its sources carry their final
    /// names and aliases; subqueries in `FROM` are already compiled.
    pub select: Select,
    pub joins: JoinTree,
    pub from_path: Option<FromPath>,
}

/// Resolve a SELECT.
///
/// `derive` compiles subqueries found in `FROM`. With `wildcard` set, an
/// empty column list is read as `*`.
pub fn infer(
    model: &Model,
    settings: &Settings,
    select: &Select,
    scope: &mut AliasScope<'_>,
    localized: bool,
    wildcard: bool,
    derive: &mut dyn FnMut(&Select) -> TransformResult<Select>,
) -> TransformResult<Inferred> {
    let mut resolver = Resolver {
        model,
        settings,
        scope,
        joins: JoinTree::default(),
        column_aliases: select
            .columns
            .iter()
            .filter_map(|c| c.alias.clone())
            .collect(),
        localized,
    };

    let mut from_path = None;
    let mut filters = Vec::new();
    let from = resolver.source(&select.from, true, derive, &mut from_path, &mut filters)?;
    let from = resolver.join_conditions(from)?;

    let columns = resolver.columns(&select.columns, &select.excluding, wildcard)?;

    filters.push(select.where_clause.clone());
    let where_clause = resolver.tokens(&and_all(filters), true, false)?;
    let group_by = select
        .group_by
        .iter()
        .map(|e| resolver.expr(e, true, false))
        .collect::<TransformResult<Vec<_>>>()?;
    let having = resolver.tokens(&select.having, true, false)?;
    let mut order_by = Vec::with_capacity(select.order_by.len());
    for o in &select.order_by {
        let mut resolved = o.clone();
        resolved.expr = resolver.expr(&o.expr, true, true)?;
        order_by.push(resolved);
    }

    Ok(Inferred {
        select: Select {
            from,
            columns,
            excluding: Vec::new(),
            where_clause,
            group_by,
            having,
            order_by,
            limit: select.limit.clone(),
            distinct: select.distinct,
            one: select.one,
            expand: select.expand,
            localized,
            search: select.search.clone(),
        },
        joins: resolver.joins,
        from_path,
    })
}

struct Resolver<'a, 's, 'p> {
    model: &'a Model,
    settings: &'a Settings,
    scope: &'s mut AliasScope<'p>,
    joins: JoinTree,
    column_aliases: Vec<String>,
    localized: bool,
}

impl<'a, 's, 'p> Resolver<'a, 's, 'p> {
    // ========================================================================
    // Sources
    // ========================================================================

    fn source(
        &mut self,
        source: &Source,
        allow_path: bool,
        derive: &mut dyn FnMut(&Select) -> TransformResult<Select>,
        from_path: &mut Option<FromPath>,
        filters: &mut Vec<Vec<Expr>>,
    ) -> TransformResult<Source> {
        match source {
            Source::Ref { path, alias } => {
                let Some(root) = path.steps.first() else {
                    return Err(TransformError::unsupported("empty FROM path"));
                };
                let entity = self.model.require_entity(&root.id)?.clone();

                let (target, hops) = if path.steps.len() == 1 {
                    (entity.clone(), Vec::new())
                } else {
                    if !allow_path {
                        return Err(TransformError::unsupported(format!(
                            "path \"{}\" in a join",
                            path.path()
                        )));
                    }
                    let hops = from_hops(self.model, &entity, path)?;
                    let target = hops.last().map_or_else(|| entity.clone(), |h| h.target.clone());
                    (target, hops)
                };

                let alias = match alias {
                    Some(alias) => {
                        self.scope.register(alias)?;
                        alias.clone()
                    }
                    None => match hops.last() {
                        Some(hop) => self.scope.next_available(&hop.id),
                        None => self.scope.next_available(entity.implicit_alias()),
                    },
                };

                let last = path.steps.last().unwrap_or(root);
                filters.push(qualify_filter(&last.filter, &alias, &target, &path.path())?);

                let mut step = Step::new(table_name(self.model, self.settings, &target, self.localized));
                if hops.is_empty() {
                    step.args = root.args.clone();
                } else {
                    *from_path = Some(FromPath {
                        root: root.clone(),
                        entity,
                        hops,
                    });
                }

                self.scope.add_source(SourceInfo {
                    alias: alias.clone(),
                    entity: target,
                    derived: false,
                    anonymous: false,
                });
                Ok(Source::Ref {
                    path: Ref {
                        steps: vec![step],
                        links: Vec::new(),
                    },
                    alias: Some(alias),
                })
            }
            Source::Select { query, alias } => {
                let compiled = derive(query)?;
                if let Some(alias) = alias {
                    self.scope.register(alias)?;
                }
                let name = alias.clone().unwrap_or_default();
                self.scope.add_source(SourceInfo {
                    alias: name.clone(),
                    entity: Arc::new(derived_entity(&name, &compiled)),
                    derived: true,
                    anonymous: alias.is_none(),
                });
                Ok(Source::Select {
                    query: Box::new(compiled),
                    alias: alias.clone(),
                })
            }
            Source::Join(join) => {
                let left = self.source(&join.left, false, derive, from_path, filters)?;
                let right = self.source(&join.right, false, derive, from_path, filters)?;
                Ok(Source::Join(Box::new(crate::cqn::Join {
                    kind: join.kind,
                    left,
                    right,
                    on: join.on.clone(),
                })))
            }
        }
    }

    /// Resolve the conditions of explicit joins once all sources are known.
    fn join_conditions(&mut self, source: Source) -> TransformResult<Source> {
        match source {
            Source::Join(join) => {
                let join = *join;
                let left = self.join_conditions(join.left)?;
                let right = self.join_conditions(join.right)?;
                let on = self.tokens(&join.on, false, false)?;
                Ok(Source::Join(Box::new(crate::cqn::Join {
                    kind: join.kind,
                    left,
                    right,
                    on,
                })))
            }
            other => Ok(other),
        }
    }

    // ========================================================================
    // Columns
    // ========================================================================

    fn columns(
        &mut self,
        columns: &[Column],
        excluding: &[String],
        wildcard: bool,
    ) -> TransformResult<Vec<Column>> {
        let mut flat = Vec::with_capacity(columns.len());
        for column in columns {
            self.desugar(column, &mut flat)?;
        }
        if flat.is_empty() && wildcard {
            flat.push(Column::wildcard());
        }

        self.merge_wildcard(flat, excluding)?
            .into_iter()
            .map(|column| self.column(column))
            .collect()
    }

    /// Turn inline columns and expands on structures into prefixed refs.
    fn desugar(&mut self, column: &Column, out: &mut Vec<Column>) -> TransformResult<()> {
        let (nested, inline) = match &column.kind {
            ColumnKind::Inline(nested) => (nested, true),
            ColumnKind::Expand(nested) => (nested, false),
            _ => {
                out.push(column.clone());
                return Ok(());
            }
        };
        let Some(path) = &nested.path else {
            if inline {
                return Err(TransformError::unsupported("inline column without path"));
            }
            out.push(column.clone());
            return Ok(());
        };

        let resolved = self.resolve(path, false, false)?;
        let leaf = resolved
            .leaf_element()
            .cloned()
            .ok_or_else(|| TransformError::AssociationAsValue { path: path.path() })?;
        if !inline && !leaf.is_struct() {
            if !leaf.is_association() {
                return Err(TransformError::unsupported(format!(
                    "expand on scalar element \"{}\"",
                    path.path()
                )));
            }
            out.push(column.clone());
            return Ok(());
        }

        let members: Vec<Arc<Element>> = match (&leaf.kind, &resolved.leaf().and_then(|l| l.target.clone())) {
            (ElementKind::Struct { elements }, _) => elements.values().cloned().collect(),
            (ElementKind::Association(_), Some(target)) => target.elements.values().cloned().collect(),
            _ => {
                return Err(TransformError::unsupported(format!(
                    "inline on scalar element \"{}\"",
                    path.path()
                )))
            }
        };
        let prefix = column.alias.clone().unwrap_or_else(|| implicit_name(&resolved));

        for inner in &nested.columns {
            match &inner.kind {
                ColumnKind::Wildcard => {
                    for element in &members {
                        if !in_wildcard(element, self.settings) || nested.excluding.contains(&element.name) {
                            continue;
                        }
                        out.push(
                            Column::expr(Expr::Ref(prefixed(path, &[Step::new(&element.name)])))
                                .with_alias(format!("{}_{}", prefix, element.name)),
                        );
                    }
                }
                ColumnKind::Expr(Expr::Ref(r)) => {
                    let name = inner.alias.clone().unwrap_or_else(|| joined_ids(&r.steps));
                    let mut flattened = Column::expr(Expr::Ref(prefixed(path, &r.steps)))
                        .with_alias(format!("{}_{}", prefix, name));
                    flattened.cast = inner.cast.clone();
                    out.push(flattened);
                }
                ColumnKind::Expand(n) | ColumnKind::Inline(n) => {
                    let Some(inner_path) = &n.path else {
                        return Err(TransformError::unsupported("anonymous expand inside inline column"));
                    };
                    let name = inner.alias.clone().unwrap_or_else(|| joined_ids(&inner_path.steps));
                    let nested = Nested {
                        path: Some(prefixed(path, &inner_path.steps)),
                        ..n.clone()
                    };
                    let kind = if matches!(inner.kind, ColumnKind::Inline(_)) {
                        ColumnKind::Inline(nested)
                    } else {
                        ColumnKind::Expand(nested)
                    };
                    self.desugar(&Column::new(kind).with_alias(format!("{}_{}", prefix, name)), out)?;
                }
                ColumnKind::Expr(_) => {
                    return Err(TransformError::unsupported(format!(
                        "expression inside inline column \"{}\"",
                        path.path()
                    )))
                }
            }
        }
        Ok(())
    }

    /// Replace `*` by the elements of all sources.
    ///
    /// Columns before the `*` hide the elements of the same name; columns
    /// after it take the element's place.
    fn merge_wildcard(&self, columns: Vec<Column>, excluding: &[String]) -> TransformResult<Vec<Column>> {
        let Some(star) = columns.iter().position(Column::is_wildcard) else {
            return Ok(columns);
        };
        let before: HashSet<String> = columns[..star]
            .iter()
            .filter_map(|c| self.column_name(c))
            .collect();

        let mut merged: Vec<Column> = columns[..star].to_vec();
        let mut slots: IndexMap<String, (usize, String)> = IndexMap::new();
        for source in self.scope.sources() {
            // the structure stands for its flat copies
            let unfolded = if self.model.unfolded {
                source.entity.struct_leaf_names()
            } else {
                HashSet::new()
            };
            for element in source.entity.elements.values() {
                if !in_wildcard(element, self.settings)
                    || excluding.contains(&element.name)
                    || before.contains(&element.name)
                    || unfolded.contains(element.name.as_str())
                {
                    continue;
                }
                if let Some((_, other)) = slots.get(&element.name) {
                    return Err(TransformError::AmbiguousReference {
                        name: element.name.clone(),
                        candidates: vec![other.clone(), source.alias.clone()],
                    });
                }
                let r = match source.qualifier() {
                    Some(alias) => Ref::new([alias, element.name.clone()]),
                    None => Ref::new([element.name.clone()]),
                };
                slots.insert(element.name.clone(), (merged.len(), source.alias.clone()));
                merged.push(Column::expr(Expr::Ref(r)));
            }
        }

        for column in &columns[star + 1..] {
            if column.is_wildcard() {
                continue;
            }
            match self.column_name(column).and_then(|n| slots.get(&n)) {
                Some((index, _)) => merged[*index] = column.clone(),
                None => merged.push(column.clone()),
            }
        }
        Ok(merged)
    }

    /// Name of an input column, before resolution.
    fn column_name(&self, column: &Column) -> Option<String> {
        if let Some(alias) = &column.alias {
            return Some(alias.clone());
        }
        let path = match &column.kind {
            ColumnKind::Expr(Expr::Ref(r)) => r,
            ColumnKind::Expand(Nested { path: Some(r), .. }) => r,
            _ => return None,
        };
        let skip = usize::from(path.steps.len() > 1 && self.scope.own_source(path.first_id()).is_some());
        Some(joined_ids(&path.steps[skip..]))
    }

    fn column(&mut self, column: Column) -> TransformResult<Column> {
        let kind = match column.kind {
            ColumnKind::Expr(expr) => ColumnKind::Expr(self.expr(&expr, true, false)?),
            ColumnKind::Expand(mut nested) => {
                if let Some(path) = &nested.path {
                    nested.path = Some(self.resolve(path, false, false)?);
                }
                ColumnKind::Expand(nested)
            }
            other => other,
        };
        Ok(Column { kind, ..column })
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn tokens(&mut self, tokens: &[Expr], joins: bool, column_alias: bool) -> TransformResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            if tokens[i].is_keyword("exists") {
                if let Some(Expr::Ref(r)) = tokens.get(i + 1) {
                    // paths after exists become subqueries, never joins
                    out.push(tokens[i].clone());
                    out.push(Expr::Ref(self.resolve(r, false, false)?));
                    i += 2;
                    continue;
                }
            }
            out.push(self.expr(&tokens[i], joins, column_alias)?);
            i += 1;
        }
        Ok(out)
    }

    fn expr(&mut self, expr: &Expr, joins: bool, column_alias: bool) -> TransformResult<Expr> {
        Ok(match expr {
            Expr::Ref(r) => Expr::Ref(self.resolve(r, joins, column_alias)?),
            Expr::Func { name, args } => Expr::Func {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| self.expr(a, joins, column_alias))
                    .collect::<TransformResult<_>>()?,
            },
            Expr::Xpr(tokens) => Expr::Xpr(self.tokens(tokens, joins, column_alias)?),
            Expr::List(items) => Expr::List(
                items
                    .iter()
                    .map(|a| self.expr(a, joins, column_alias))
                    .collect::<TransformResult<_>>()?,
            ),
            // subqueries are compiled on their own, later
            other => other.clone(),
        })
    }

    fn resolve(&mut self, r: &Ref, joins: bool, column_alias: bool) -> TransformResult<Ref> {
        let first = r.first_id();
        if first.starts_with('$') {
            return Ok(pseudo(r));
        }

        if r.steps.len() > 1 {
            if let Some(source) = self.scope.own_source(first).cloned() {
                return self.walk(r, &source, 1, false, joins);
            }
        }

        let candidates: Vec<SourceInfo> = self
            .scope
            .sources()
            .filter(|s| s.entity.element(first).is_some())
            .cloned()
            .collect();
        match candidates.as_slice() {
            [source] => return self.walk(r, source, 0, false, joins),
            [] => {}
            _ => {
                return Err(TransformError::AmbiguousReference {
                    name: first.to_string(),
                    candidates: candidates.into_iter().map(|s| s.alias).collect(),
                })
            }
        }

        if r.steps.len() > 1 {
            if let Some(source) = self.scope.outer_source(first).cloned() {
                return self.walk(r, &source, 1, true, joins);
            }
        }

        if column_alias && r.steps.len() == 1 && self.column_aliases.iter().any(|a| a == first) {
            return Ok(Ref {
                steps: r.steps.clone(),
                links: vec![RefLink::new(Definition::ColumnAlias)],
            });
        }

        Err(TransformError::unresolvable(first, r.path()))
    }

    /// Resolve the steps of `r` from `start` on, inside `source`.
    fn walk(
        &mut self,
        r: &Ref,
        source: &SourceInfo,
        start: usize,
        outer: bool,
        joins: bool,
    ) -> TransformResult<Ref> {
        let n = r.steps.len();
        let mut links = Vec::with_capacity(n);
        if start == 1 {
            let mut link = RefLink::new(Definition::TableAlias {
                alias: source.alias.clone(),
                outer,
            });
            link.target = Some(source.entity.clone());
            link.alias = source.qualifier();
            links.push(link);
        }

        let mut entity = source.entity.clone();
        let mut structure: Option<Arc<Element>> = None;
        let mut parent: Option<usize> = None;
        let mut path: Vec<String> = Vec::new();
        let mut joining = joins;
        let mut last_assoc: Option<usize> = None;

        for i in start..n {
            let step = &r.steps[i];
            let found = match &structure {
                Some(s) => s.child(&step.id),
                None => entity.element(&step.id),
            };
            let element = found
                .cloned()
                .ok_or_else(|| TransformError::unresolvable(&step.id, r.path()))?;
            let last = i + 1 == n;

            let mut link = RefLink::new(Definition::Element(element.clone()));
            if links.is_empty() {
                link.alias = source.qualifier();
            }

            match &element.kind {
                ElementKind::Scalar { .. } => {
                    if !last {
                        return Err(TransformError::unresolvable(&r.steps[i + 1].id, r.path()));
                    }
                }
                ElementKind::Struct { .. } => {
                    path.push(step.id.clone());
                    structure = Some(element.clone());
                }
                ElementKind::Association(assoc) => {
                    let target = self.model.require_entity(&assoc.target)?.clone();
                    link.target = Some(target.clone());
                    last_assoc = Some(i);
                    path.push(step.id.clone());

                    if !last && joining {
                        let rest: Vec<&str> = r.steps[i + 1..].iter().map(|s| s.id.as_str()).collect();
                        if step.filter.is_empty() && is_foreign_key_path(assoc, &rest) {
                            joining = false;
                        } else {
                            if outer || source.derived {
                                return Err(TransformError::unsupported(format!(
                                    "path \"{}\" can't be joined from \"{}\"",
                                    r.path(),
                                    source.alias
                                )));
                            }
                            let join_parent = match parent {
                                Some(node) => JoinParent::Node(node),
                                None => JoinParent::Source(&source.alias),
                            };
                            let node = self.joins.join(
                                join_parent,
                                std::mem::take(&mut path),
                                &step.filter,
                                element.clone(),
                                target.clone(),
                                self.scope,
                            );
                            link.join = Some(self.joins.node(node).alias.clone());
                            parent = Some(node);
                        }
                    }
                    entity = target;
                    structure = None;
                }
            }

            if last {
                if let Some(value) = &element.value {
                    let prefix = match last_assoc {
                        Some(a) => r.steps[..=a].to_vec(),
                        None if start == 1 || !source.anonymous => vec![Step::new(&source.alias)],
                        None => Vec::new(),
                    };
                    link.calculated = Some(Box::new(self.calculated(value, &prefix)?));
                }
            }
            links.push(link);
        }

        Ok(Ref {
            steps: r.steps.clone(),
            links,
        })
    }

    /// Resolve the defining expression of a calculated element read
    /// through `prefix`.
    fn calculated(&mut self, value: &Expr, prefix: &[Step]) -> TransformResult<Expr> {
        Ok(match value {
            Expr::Ref(r) if !r.first_id().starts_with('$') => {
                let mut steps = prefix.to_vec();
                steps.extend(r.steps.iter().cloned());
                Expr::Ref(self.resolve(&Ref { steps, links: Vec::new() }, true, false)?)
            }
            Expr::Ref(r) => Expr::Ref(pseudo(r)),
            Expr::Func { name, args } => Expr::Func {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|a| self.calculated(a, prefix))
                    .collect::<TransformResult<_>>()?,
            },
            Expr::Xpr(tokens) => Expr::Xpr(
                tokens
                    .iter()
                    .map(|t| self.calculated(t, prefix))
                    .collect::<TransformResult<_>>()?,
            ),
            Expr::List(items) => Expr::List(
                items
                    .iter()
                    .map(|t| self.calculated(t, prefix))
                    .collect::<TransformResult<_>>()?,
            ),
            other => other.clone(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Association steps of a path that starts at `entity`.
pub(crate) fn from_hops(model: &Model, entity: &Arc<Entity>, path: &Ref) -> TransformResult<Vec<Hop>> {
    let mut owner = entity.clone();
    let mut hops = Vec::with_capacity(path.steps.len() - 1);
    for step in &path.steps[1..] {
        let element = owner
            .element(&step.id)
            .cloned()
            .ok_or_else(|| TransformError::unresolvable(&step.id, path.path()))?;
        let assoc = element.association().ok_or_else(|| {
            TransformError::unsupported(format!(
                "\"{}\" in FROM path \"{}\" is not an association",
                step.id,
                path.path()
            ))
        })?;
        let target = model.require_entity(&assoc.target)?.clone();
        hops.push(Hop {
            id: step.id.clone(),
            element: element.clone(),
            source: owner.clone(),
            target: target.clone(),
            filter: step.filter.clone(),
        });
        owner = target;
    }
    Ok(hops)
}

/// Links for `$self.x`, `$now`, `$user.id` and the like.
fn pseudo(r: &Ref) -> Ref {
    let head = match r.first_id() {
        "$self" | "$projection" => Definition::SelfRef,
        _ => Definition::Variable,
    };
    let links = (0..r.steps.len())
        .map(|i| {
            RefLink::new(if i == 0 {
                head.clone()
            } else {
                Definition::Variable
            })
        })
        .collect();
    Ref {
        steps: r.steps.clone(),
        links,
    }
}

/// Whether the steps after a managed association only read its foreign keys.
fn is_foreign_key_path(assoc: &Association, rest: &[&str]) -> bool {
    let Some(keys) = &assoc.keys else {
        return false;
    };
    keys.iter()
        .any(|fk| fk.path.iter().zip(rest).all(|(key, step)| key == step))
}

/// Resolve a reference against a single entity read under `alias`.
///
/// Used for infix filters of joins and for stored on-conditions. Such
/// references can't add joins: association steps may only be followed by
/// foreign key access.
pub(crate) fn link_path(
    model: &Model,
    entity: &Arc<Entity>,
    alias: Option<&str>,
    r: &Ref,
) -> TransformResult<Ref> {
    if r.first_id().starts_with('$') {
        return Ok(pseudo(r));
    }

    let n = r.steps.len();
    let mut links = Vec::with_capacity(n);
    let mut owner = entity.clone();
    let mut structure: Option<Arc<Element>> = None;
    let mut foreign_key = false;

    for i in 0..n {
        let step = &r.steps[i];
        let found = match &structure {
            Some(s) => s.child(&step.id),
            None => owner.element(&step.id),
        };
        let element = found
            .cloned()
            .ok_or_else(|| TransformError::unresolvable(&step.id, r.path()))?;
        let mut link = RefLink::new(Definition::Element(element.clone()));
        if i == 0 {
            link.alias = alias.map(str::to_string);
        }

        match &element.kind {
            ElementKind::Scalar { .. } if i + 1 < n => {
                return Err(TransformError::unresolvable(&r.steps[i + 1].id, r.path()));
            }
            ElementKind::Scalar { .. } => {}
            ElementKind::Struct { .. } => structure = Some(element.clone()),
            ElementKind::Association(assoc) => {
                let target = model.require_entity(&assoc.target)?.clone();
                if i + 1 < n && !foreign_key {
                    let rest: Vec<&str> = r.steps[i + 1..].iter().map(|s| s.id.as_str()).collect();
                    if !step.filter.is_empty() || !is_foreign_key_path(assoc, &rest) {
                        return Err(TransformError::unsupported(format!(
                            "path \"{}\" needs a join here",
                            r.path()
                        )));
                    }
                    foreign_key = true;
                }
                link.target = Some(target.clone());
                owner = target;
                structure = None;
            }
        }
        links.push(link);
    }

    Ok(Ref {
        steps: r.steps.clone(),
        links,
    })
}

/// Whether an element is part of a wildcard expansion.
pub(crate) fn in_wildcard(element: &Element, settings: &Settings) -> bool {
    if element.foreign_key_of.is_some() {
        return false;
    }
    if settings.transform.skip_large_binaries && element.type_name() == Some(LARGE_BINARY) {
        return false;
    }
    !matches!(element.association(), Some(assoc) if !assoc.is_managed())
}

/// Name of the table to read `entity` from.
pub(crate) fn table_name(model: &Model, settings: &Settings, entity: &Entity, localized: bool) -> String {
    if localized {
        if let Some(variant) = model.localized(entity, &settings.transform.localized_prefix) {
            return variant.name.clone();
        }
    }
    entity.name.clone()
}

/// Default output name of a resolved path: its steps after a leading
/// table alias, joined with `_`.
pub(crate) fn implicit_name(r: &Ref) -> String {
    let skip = usize::from(matches!(
        r.links.first().map(|l| &l.definition),
        Some(Definition::TableAlias { .. })
    ));
    joined_ids(&r.steps[skip.min(r.steps.len())..])
}

fn joined_ids(steps: &[Step]) -> String {
    steps
        .iter()
        .map(|s| s.id.as_str())
        .collect::<Vec<_>>()
        .join("_")
}

fn prefixed(path: &Ref, steps: &[Step]) -> Ref {
    let mut all = path.steps.clone();
    all.extend(steps.iter().cloned());
    Ref {
        steps: all,
        links: Vec::new(),
    }
}

/// Rewrite an infix filter for a query that reads the filtered entity
/// under `alias`: the shorthand `[42]` becomes a key comparison and every
/// reference gets the alias prepended.
pub(crate) fn qualify_filter(
    filter: &[Expr],
    alias: &str,
    entity: &Entity,
    path: &str,
) -> TransformResult<Vec<Expr>> {
    let filter = match filter_shorthand(filter, entity, path)? {
        Some(expanded) => expanded,
        None => filter.to_vec(),
    };
    Ok(filter.iter().map(|t| prepend_alias(t, alias)).collect())
}

/// `[42]` on an entity with a single key `ID` means `[ID = 42]`.
///
/// Backlink keys (unmanaged associations) don't count; a managed association
/// key does, so composite keys like `(book, code)` need an explicit filter.
pub(crate) fn filter_shorthand(
    filter: &[Expr],
    entity: &Entity,
    path: &str,
) -> TransformResult<Option<Vec<Expr>>> {
    let [value @ (Expr::Val(_) | Expr::Param(_))] = filter else {
        return Ok(None);
    };
    let keys: Vec<&Arc<Element>> = entity
        .keys()
        .filter(|k| !k.association().is_some_and(|a| !a.is_managed()))
        .collect();
    match keys.as_slice() {
        [key] => Ok(Some(vec![
            Expr::reference([key.name.clone()]),
            Expr::kw("="),
            value.clone(),
        ])),
        _ => Err(TransformError::FilterNeedsSingleKey {
            path: path.to_string(),
            found: keys.len(),
        }),
    }
}

fn prepend_alias(token: &Expr, alias: &str) -> Expr {
    match token {
        Expr::Ref(r) if !r.first_id().starts_with('$') => {
            let mut steps = vec![Step::new(alias)];
            steps.extend(r.steps.iter().cloned());
            Expr::Ref(Ref {
                steps,
                links: Vec::new(),
            })
        }
        Expr::Func { name, args } => Expr::Func {
            name: name.clone(),
            args: args.iter().map(|a| prepend_alias(a, alias)).collect(),
        },
        Expr::Xpr(tokens) => Expr::Xpr(tokens.iter().map(|t| prepend_alias(t, alias)).collect()),
        Expr::List(items) => Expr::List(items.iter().map(|t| prepend_alias(t, alias)).collect()),
        other => other.clone(),
    }
}

/// Element list of a subquery in `FROM`, built from its columns.
fn derived_entity(name: &str, select: &Select) -> Entity {
    let mut elements = IndexMap::new();
    for column in &select.columns {
        let column_name = match (&column.alias, &column.kind) {
            (Some(alias), _) => alias.clone(),
            (None, ColumnKind::Expr(Expr::Ref(r))) => r.last_id().to_string(),
            _ => continue,
        };
        let type_name = column.element.as_ref().and_then(|e| e.type_name());
        let mut element = Element::scalar(column_name.clone(), type_name);
        element.key = column.element.as_ref().is_some_and(|e| e.key);
        elements.insert(column_name, Arc::new(element));
    }
    Entity {
        name: name.to_string(),
        elements,
        persistence_skip: false,
        localized: false,
    }
}
