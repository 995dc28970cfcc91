//! Query compilation.
//!
//! A [`Transformer`] turns a query written against the model (paths through
//! associations, structured elements, expands, `exists` predicates) into a
//! query over plain tables:
//!
//! 1. **Resolve**: attach links to every reference and collect the joins
//!    path expressions need ([`crate::infer`]).
//! 2. **From**: emit a `left join` per join node, with its on-condition.
//! 3. **Columns**: flatten references into leaf columns, then build expand
//!    subqueries.
//! 4. **Where**: correlation with an enclosing query, the back-chain of a
//!    `FROM` path, the rewritten user condition and the search predicate.
//! 5. **Group by / having / order by**: rewritten like the where clause.
//!
//! Subqueries of every kind go through the same pipeline recursively. Each
//! level owns an [`AliasScope`]; correlated subqueries see their ancestors'
//! aliases.
//!
//! # Example
//!
//! ```
//! use navql::{cql, model::Model, transform::Transformer};
//! use serde_json::json;
//!
//! let model = Model::from_csn_value(json!({
//!     "definitions": { "Books": { "kind": "entity", "elements": {
//!         "ID": { "key": true, "type": "cds.Integer" }
//!     } } }
//! }))
//! .unwrap();
//!
//! let query = cql::parse("SELECT from Books { ID }").unwrap();
//! let compiled = Transformer::new(&model).transform(&query).unwrap();
//! assert_eq!(compiled.to_string(), "SELECT from Books as Books { Books.ID }");
//! ```

pub mod alias;
mod columns;
mod dml;
mod exists;
mod expand;
mod flatten;
mod from;
mod on_condition;
mod tokens;

use std::cell::RefCell;
use std::sync::Arc;

use tracing::debug;

use crate::config::Settings;
use crate::cqn::{and_all, Column, Expr, OrderBy, Query, Ref, Select};
use crate::error::{TransformError, TransformResult};
use crate::infer::{infer, Hop};
use crate::model::{Entity, Model};
use crate::search::{DefaultSearchColumns, SearchColumns};

pub use alias::AliasScope;
pub use flatten::{element_leaves, foreign_keys, ForeignKeyLeaf, Leaf};

use exists::Root;

/// Compile `query` against `model` with default settings.
pub fn transform(query: &Query, model: &Model) -> TransformResult<Query> {
    Transformer::new(model).transform(query)
}

/// Compiles queries against one model.
pub struct Transformer<'m> {
    model: &'m Model,
    settings: Settings,
    search: Option<Box<dyn SearchColumns + 'm>>,
}

impl<'m> Transformer<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            settings: Settings::default(),
            search: None,
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Use `search` to pick the columns of search predicates.
    #[must_use]
    pub fn with_search(mut self, search: impl SearchColumns + 'm) -> Self {
        self.search = Some(Box::new(search));
        self
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Compile a statement. The input is left untouched.
    pub fn transform(&self, query: &Query) -> TransformResult<Query> {
        match query {
            Query::Select(select) => {
                debug!(kind = "select", "transforming statement");
                Ok(Query::Select(self.select(select, None, false, None)?))
            }
            Query::Insert(insert) => {
                debug!(kind = "insert", "transforming statement");
                Ok(Query::Insert(self.insert(insert)?))
            }
            Query::Upsert(upsert) => {
                debug!(kind = "upsert", "transforming statement");
                Ok(Query::Upsert(self.insert(upsert)?))
            }
            Query::Update(update) => {
                debug!(kind = "update", "transforming statement");
                Ok(Query::Update(self.update(update)?))
            }
            Query::Delete(delete) => {
                debug!(kind = "delete", "transforming statement");
                Ok(Query::Delete(self.delete(delete)?))
            }
        }
    }

    // ========================================================================
    // SELECT pipeline
    // ========================================================================

    /// Compile one SELECT level.
    ///
    /// `parent` is the scope of the enclosing query for correlated
    /// subqueries, `correlation` ties the result to that query.
    pub(crate) fn select(
        &self,
        select: &Select,
        parent: Option<&AliasScope<'_>>,
        localized: bool,
        correlation: Option<&Correlation>,
    ) -> TransformResult<Select> {
        let localized = localized || select.localized;
        let mut scope = AliasScope::new(parent);
        let inferred = {
            let mut derive = |q: &Select| self.select(q, parent, localized, None);
            infer(
                self.model,
                &self.settings,
                select,
                &mut scope,
                localized,
                true,
                &mut derive,
            )?
        };

        let ctx = Ctx::new(&scope, &inferred.select.columns, localized);
        let from = self.from(&inferred, &ctx)?;
        let columns = self.columns(&inferred, &ctx)?;

        let own = scope.primary().map(|s| s.alias.clone()).unwrap_or_default();
        let mut conditions = Vec::new();
        if let Some(correlation) = correlation {
            conditions.push(self.correlate(correlation, &own, &ctx)?);
        }
        if let Some(path) = &inferred.from_path {
            let root = Root::Entity {
                step: &path.root,
                entity: &path.entity,
            };
            conditions.push(self.back_chain(&path.hops, root, &own, &ctx)?);
        }
        conditions.push(self.rewrite(&inferred.select.where_clause, &ctx)?);
        if let Some(search) = self.search_condition(&inferred.select, &ctx) {
            conditions.push(search);
        }

        let group_by = self.expression_list(&inferred.select.group_by, &ctx)?;
        let having = self.rewrite(&inferred.select.having, &ctx)?;
        let mut order_by = Vec::with_capacity(inferred.select.order_by.len());
        for entry in &inferred.select.order_by {
            for expr in self.expression_list(std::slice::from_ref(&entry.expr), &ctx)? {
                order_by.push(OrderBy { expr, ..entry.clone() });
            }
        }

        Ok(Select {
            from,
            columns,
            excluding: Vec::new(),
            where_clause: and_all(conditions),
            group_by,
            having,
            order_by,
            limit: inferred.select.limit.clone(),
            distinct: select.distinct,
            one: select.one,
            expand: select.expand,
            localized,
            search: Vec::new(),
        })
    }

    /// Condition tying a subquery to the row of its enclosing query.
    fn correlate(&self, correlation: &Correlation, own: &str, ctx: &Ctx<'_>) -> TransformResult<Vec<Expr>> {
        match correlation {
            Correlation::Path { hops, outer } => self.back_chain(hops, Root::Correlated(outer), own, ctx),
            Correlation::Keys { outer, keys } => {
                let mut tokens = Vec::with_capacity(keys.len() * 4);
                for key in keys {
                    if !tokens.is_empty() {
                        tokens.push(Expr::kw("and"));
                    }
                    tokens.push(Expr::reference([own, key.as_str()]));
                    tokens.push(Expr::kw("="));
                    tokens.push(Expr::reference([outer.as_str(), key.as_str()]));
                }
                Ok(tokens)
            }
        }
    }

    /// `search((cols), term)` over the first entity source.
    fn search_condition(&self, select: &Select, ctx: &Ctx<'_>) -> Option<Vec<Expr>> {
        if select.search.is_empty() {
            return None;
        }
        let source = ctx.scope.sources().find(|s| !s.derived)?;
        let columns = match &self.search {
            Some(search) => search.columns_to_search(select, &source.entity, &source.alias),
            None => DefaultSearchColumns::new(&self.settings.search).columns_to_search(
                select,
                &source.entity,
                &source.alias,
            ),
        };
        if columns.is_empty() {
            return None;
        }
        let term = match select.search.as_slice() {
            [single] => single.clone(),
            terms => Expr::Xpr(terms.to_vec()),
        };
        Some(vec![Expr::func(
            "search",
            vec![Expr::List(columns.into_iter().map(Expr::Ref).collect()), term],
        )])
    }

    /// Rewrite group by / order by entries; structured references expand
    /// into one entry per leaf.
    fn expression_list(&self, exprs: &[Expr], ctx: &Ctx<'_>) -> TransformResult<Vec<Expr>> {
        let mut out = Vec::with_capacity(exprs.len());
        for expr in exprs {
            match expr {
                Expr::Ref(r) if is_structural(r) => {
                    for leaf in flatten::flatten(self.model, r)? {
                        out.push(Expr::Ref(leaf.qualified()));
                    }
                }
                _ => out.push(single(self.rewrite(std::slice::from_ref(expr), ctx)?)),
            }
        }
        Ok(out)
    }
}

/// How a subquery refers back to its enclosing query.
#[derive(Debug, Clone)]
pub(crate) enum Correlation {
    /// Through association hops starting at the table aliased `outer`.
    Path { hops: Vec<Hop>, outer: String },
    /// Key by key with the table aliased `outer`.
    Keys { outer: String, keys: Vec<String> },
}

/// State shared by the rewriting steps of one query level.
pub(crate) struct Ctx<'a> {
    pub scope: &'a AliasScope<'a>,
    /// Resolved input columns, the targets of `$self` references.
    pub columns: &'a [Column],
    pub localized: bool,
    /// Table that unresolved references are read against.
    pub base: Option<Base>,
    self_refs: RefCell<Vec<String>>,
}

/// An infix filter's table.
#[derive(Debug, Clone)]
pub(crate) struct Base {
    pub alias: String,
    pub entity: Arc<Entity>,
}

impl<'a> Ctx<'a> {
    pub fn new(scope: &'a AliasScope<'a>, columns: &'a [Column], localized: bool) -> Self {
        Self {
            scope,
            columns,
            localized,
            base: None,
            self_refs: RefCell::new(Vec::new()),
        }
    }

    /// Same level, references read against `base`.
    pub fn with_base(&self, base: Base) -> Ctx<'a> {
        Ctx {
            scope: self.scope,
            columns: self.columns,
            localized: self.localized,
            base: Some(base),
            self_refs: RefCell::new(Vec::new()),
        }
    }

    /// Run `f` with `name` marked as being substituted.
    fn substituting<T>(
        &self,
        name: &str,
        f: impl FnOnce() -> TransformResult<T>,
    ) -> TransformResult<T> {
        if self.self_refs.borrow().iter().any(|n| n == name) {
            return Err(TransformError::unsupported(format!(
                "\"$self.{}\" refers to itself",
                name
            )));
        }
        self.self_refs.borrow_mut().push(name.to_string());
        let result = f();
        self.self_refs.borrow_mut().pop();
        result
    }
}

/// A token list as one expression.
pub(crate) fn single(mut tokens: Vec<Expr>) -> Expr {
    if tokens.len() == 1 {
        if let Some(token) = tokens.pop() {
            return token;
        }
    }
    Expr::Xpr(tokens)
}

/// Whether a resolved reference ends in a structure or association.
fn is_structural(r: &Ref) -> bool {
    r.leaf().is_some_and(|l| l.calculated.is_none())
        && r.leaf_element().is_some_and(|e| e.is_struct() || e.is_association())
}
