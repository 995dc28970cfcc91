//! Columns of search predicates.
//!
//! A query's `search` terms become `search((cols...), term)`. Which columns
//! take part is up to a [`SearchColumns`] implementation; the default picks
//! the string elements of the searched entity.

use crate::config::SearchSettings;
use crate::cqn::{Ref, Select};
use crate::model::{Element, ElementKind, Entity};

/// Picks the columns a search looks at.
pub trait SearchColumns {
    /// Columns of `entity`, read as `alias`, for a search in `query`.
    fn columns_to_search(&self, query: &Select, entity: &Entity, alias: &str) -> Vec<Ref>;
}

/// Searches every stored element of one of the configured types,
/// structure leaves included.
#[derive(Debug, Clone)]
pub struct DefaultSearchColumns {
    types: Vec<String>,
}

impl DefaultSearchColumns {
    pub fn new(settings: &SearchSettings) -> Self {
        Self {
            types: settings.types.clone(),
        }
    }

    fn collect(&self, element: &Element, alias: &str, out: &mut Vec<Ref>) {
        if element.is_virtual || element.is_calculated() {
            return;
        }
        match &element.kind {
            ElementKind::Scalar { type_name: Some(t) } if self.types.contains(t) => {
                let column = Ref::new([alias, element.flat_name.as_str()]);
                // unfolded models list structure leaves twice
                if !out.contains(&column) {
                    out.push(column);
                }
            }
            ElementKind::Struct { elements } => {
                for child in elements.values() {
                    self.collect(child, alias, out);
                }
            }
            _ => {}
        }
    }
}

impl SearchColumns for DefaultSearchColumns {
    fn columns_to_search(&self, _query: &Select, entity: &Entity, alias: &str) -> Vec<Ref> {
        let mut columns = Vec::new();
        for element in entity.elements.values() {
            self.collect(element, alias, &mut columns);
        }
        columns
    }
}

/// Any closure of the right shape picks search columns.
impl<F> SearchColumns for F
where
    F: Fn(&Select, &Entity, &str) -> Vec<Ref>,
{
    fn columns_to_search(&self, query: &Select, entity: &Entity, alias: &str) -> Vec<Ref> {
        self(query, entity, alias)
    }
}
