//! Reference flattening.
//!
//! A resolved reference denotes a scalar, a structure or an association.
//! Flattening turns it into the table columns behind it:
//!
//! - a scalar is its own column (`dims_height` for `dims.height`)
//! - a structure expands to its leaves in declaration order
//! - a managed association expands to its foreign key columns, recursing
//!   through structured keys and keys that are associations themselves
//! - `assoc.key` on a managed association reads the foreign key column
//!   without a join
//!
//! Column names come from the loader's precomputed flat names, so
//! structured and unfolded models go through the same code.

use std::sync::Arc;

use crate::cqn::{Definition, Ref};
use crate::error::{TransformError, TransformResult};
use crate::model::{Element, ElementKind, Model};

/// One column behind a flattened reference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FlatLeaf {
    /// Table alias to read the column from; `None` over anonymous sources.
    pub alias: Option<String>,
    pub column: String,
    /// Scalar element the column stores.
    pub element: Arc<Element>,
    /// Path of the leaf below the flattened element. Leaves of two
    /// operands with the same key are compared with each other.
    pub key: Vec<String>,
    /// `key` as a column name part.
    pub suffix: String,
}

impl FlatLeaf {
    /// `alias.column`, or `column` over an anonymous source.
    pub fn qualified(&self) -> Ref {
        match &self.alias {
            Some(alias) => Ref::new([alias.clone(), self.column.clone()]),
            None => Ref::new([self.column.clone()]),
        }
    }
}

/// A scalar below a structured element or behind an association.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    /// Path of ids leading to the scalar.
    pub key: Vec<String>,
    /// Column name part appended to the element's own name.
    pub suffix: String,
    pub element: Arc<Element>,
}

/// One foreign key column of a managed association.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeyLeaf {
    /// Column of the target entity the key refers to.
    pub target_column: String,
    /// Appended to the association's flat name to give the source column.
    pub suffix: String,
    /// Path of the key inside the target.
    pub key: Vec<String>,
    pub element: Arc<Element>,
}

/// Scalars stored for `element`.
///
/// Scalars yield a single leaf with an empty key. Unmanaged associations
/// store nothing.
pub fn element_leaves(model: &Model, element: &Arc<Element>, path: &str) -> TransformResult<Vec<Leaf>> {
    match &element.kind {
        ElementKind::Scalar { .. } => Ok(vec![Leaf {
            key: Vec::new(),
            suffix: String::new(),
            element: element.clone(),
        }]),
        ElementKind::Struct { elements } => {
            let mut leaves = Vec::new();
            for child in elements.values() {
                for leaf in element_leaves(model, child, path)? {
                    let mut key = vec![child.name.clone()];
                    key.extend(leaf.key);
                    leaves.push(Leaf {
                        key,
                        suffix: join(&child.name, &leaf.suffix),
                        element: leaf.element,
                    });
                }
            }
            Ok(leaves)
        }
        ElementKind::Association(assoc) if assoc.is_managed() => Ok(foreign_keys(model, element, path)?
            .into_iter()
            .map(|fk| Leaf {
                key: fk.key,
                suffix: fk.suffix,
                element: fk.element,
            })
            .collect()),
        ElementKind::Association(_) => Ok(Vec::new()),
    }
}

/// Foreign key columns of the managed association `element`.
pub fn foreign_keys(model: &Model, element: &Element, path: &str) -> TransformResult<Vec<ForeignKeyLeaf>> {
    let missing = || TransformError::MissingForeignKeys {
        step: element.name.clone(),
        path: path.to_string(),
    };
    let assoc = element.association().ok_or_else(missing)?;
    let keys = assoc.keys.as_ref().ok_or_else(missing)?;
    let target = model.require_entity(&assoc.target)?;

    let mut leaves = Vec::new();
    for fk in keys {
        let mut key_element: Option<&Arc<Element>> = None;
        for id in &fk.path {
            key_element = match key_element {
                None => target.element(id),
                Some(parent) => parent.child(id),
            };
            if key_element.is_none() {
                return Err(TransformError::unresolvable(id, fk.path.join(".")));
            }
        }
        let Some(key_element) = key_element else {
            return Err(missing());
        };

        for leaf in element_leaves(model, key_element, path)? {
            let mut key = fk.path.clone();
            key.extend(leaf.key);
            leaves.push(ForeignKeyLeaf {
                target_column: join(&key_element.flat_name, &leaf.suffix),
                suffix: join(&fk.name(), &leaf.suffix),
                key,
                element: leaf.element,
            });
        }
    }

    if leaves.is_empty() {
        return Err(missing());
    }
    Ok(leaves)
}

/// The columns behind a resolved reference.
pub(crate) fn flatten(model: &Model, r: &Ref) -> TransformResult<Vec<FlatLeaf>> {
    let n = r.steps.len();
    let mut alias = r.links.first().and_then(|l| l.alias.clone());
    let start = usize::from(matches!(
        r.links.first().map(|l| &l.definition),
        Some(Definition::TableAlias { .. })
    ));
    if start >= n {
        return Err(TransformError::AssociationAsValue { path: r.path() });
    }

    for i in start..n - 1 {
        let link = &r.links[i];
        let element = link
            .element()
            .ok_or_else(|| TransformError::unresolvable(&r.steps[i].id, r.path()))?;
        if !element.is_association() {
            continue;
        }
        if let Some(join) = &link.join {
            alias = Some(join.clone());
            continue;
        }

        // foreign key access: `author.ID` reads `author_ID`
        let rest: Vec<String> = r.steps[i + 1..].iter().map(|s| s.id.clone()).collect();
        let leaves: Vec<FlatLeaf> = foreign_keys(model, element, &r.path())?
            .into_iter()
            .filter(|fk| fk.key.starts_with(&rest))
            .map(|fk| {
                let key = fk.key[rest.len()..].to_vec();
                FlatLeaf {
                    alias: alias.clone(),
                    column: join(&element.flat_name, &fk.suffix),
                    element: fk.element,
                    suffix: key.join("_"),
                    key,
                }
            })
            .collect();
        if leaves.is_empty() {
            return Err(TransformError::unresolvable(&rest[0], r.path()));
        }
        return Ok(leaves);
    }

    let element = r
        .leaf_element()
        .ok_or_else(|| TransformError::AssociationAsValue { path: r.path() })?;
    match &element.kind {
        ElementKind::Scalar { .. } => Ok(vec![FlatLeaf {
            alias,
            column: element.flat_name.clone(),
            element: element.clone(),
            key: Vec::new(),
            suffix: String::new(),
        }]),
        ElementKind::Association(assoc) if !assoc.is_managed() => {
            Err(TransformError::AssociationAsValue { path: r.path() })
        }
        _ => Ok(element_leaves(model, element, &r.path())?
            .into_iter()
            .map(|leaf| FlatLeaf {
                alias: alias.clone(),
                column: join(&element.flat_name, &leaf.suffix),
                element: leaf.element,
                key: leaf.key,
                suffix: leaf.suffix,
            })
            .collect()),
    }
}

/// Whether a leaf is stored in a table.
pub(crate) fn is_persisted(model: &Model, leaf: &FlatLeaf) -> bool {
    !leaf.element.is_virtual
        && !model
            .entity(&leaf.element.parent)
            .is_some_and(|e| e.persistence_skip)
}

/// `a_b`, or `a` when `b` is empty.
pub(crate) fn join(a: &str, b: &str) -> String {
    if b.is_empty() {
        a.to_string()
    } else {
        format!("{}_{}", a, b)
    }
}
