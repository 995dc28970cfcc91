//! Table alias allocation.
//!
//! Every query level owns an [`AliasScope`]. Correlated subqueries (value,
//! `exists` and expand subqueries) get a child scope that can see all of its
//! ancestors, so a generated alias never hides an outer alias that a
//! correlation condition refers to. Subqueries in `FROM` are compiled
//! against the enclosing query's parent instead, which keeps their aliases
//! invisible to their siblings.
//!
//! Alias comparison ignores case, because most databases do.

use indexmap::IndexMap;
use tracing::trace;

use crate::error::{TransformError, TransformResult};
use crate::infer::SourceInfo;
use crate::model::implicit_alias;

/// Aliases and sources of one query level.
#[derive(Debug, Default)]
pub struct AliasScope<'p> {
    parent: Option<&'p AliasScope<'p>>,
    /// Lowercased aliases taken in this scope.
    used: Vec<String>,
    sources: IndexMap<String, SourceInfo>,
}

impl<'p> AliasScope<'p> {
    pub fn new(parent: Option<&'p AliasScope<'p>>) -> Self {
        Self {
            parent,
            used: Vec::new(),
            sources: IndexMap::new(),
        }
    }

    /// A nested scope that sees this one.
    pub fn child(&self) -> AliasScope<'_> {
        AliasScope::new(Some(self))
    }

    pub fn parent(&self) -> Option<&'p AliasScope<'p>> {
        self.parent
    }

    /// Allocate a system-generated alias.
    ///
    /// The candidate is cut down to its last dotted segment and suffixed
    /// with `2`, `3`, ... until it is free in this scope and in every
    /// enclosing one.
    pub fn next_available(&mut self, candidate: &str) -> String {
        let alias = self.unique_in_chain(candidate);
        trace!(candidate, alias = %alias, "allocated alias");
        self.used.push(alias.to_lowercase());
        alias
    }

    /// The alias [`next_available`](Self::next_available) would return,
    /// without taking it.
    pub fn unique_in_chain(&self, candidate: &str) -> String {
        let base = implicit_alias(candidate);
        if !self.taken(base) {
            return base.to_string();
        }
        let mut n = 2;
        loop {
            let alias = format!("{}{}", base, n);
            if !self.taken(&alias) {
                return alias;
            }
            n += 1;
        }
    }

    /// Take a user-given alias as is.
    pub fn register(&mut self, alias: &str) -> TransformResult<()> {
        let lower = alias.to_lowercase();
        if self.used.contains(&lower) {
            return Err(TransformError::DuplicateAlias(alias.to_string()));
        }
        self.used.push(lower);
        Ok(())
    }

    /// Whether `alias` is taken here or in an enclosing scope.
    pub fn taken(&self, alias: &str) -> bool {
        let lower = alias.to_lowercase();
        let mut scope = Some(self);
        while let Some(s) = scope {
            if s.used.contains(&lower) {
                return true;
            }
            scope = s.parent;
        }
        false
    }

    pub fn add_source(&mut self, source: SourceInfo) {
        self.sources.insert(source.alias.clone(), source);
    }

    /// Sources of this query level, in `FROM` order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceInfo> {
        self.sources.values()
    }

    /// First source of this level, the one correlations refer to.
    pub fn primary(&self) -> Option<&SourceInfo> {
        self.sources.values().next()
    }

    /// Source with the given alias in this level.
    pub fn own_source(&self, alias: &str) -> Option<&SourceInfo> {
        self.sources.get(alias).filter(|s| !s.anonymous)
    }

    /// Source with the given alias in an enclosing level.
    pub fn outer_source(&self, alias: &str) -> Option<&SourceInfo> {
        let mut scope = self.parent;
        while let Some(s) = scope {
            if let Some(source) = s.own_source(alias) {
                return Some(source);
            }
            scope = s.parent;
        }
        None
    }
}
