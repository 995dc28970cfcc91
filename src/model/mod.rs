//! Schema model: entities, elements and associations.
//!
//! The model is immutable once loaded and shared behind [`Arc`], so a single
//! instance can serve any number of concurrent transformations.

mod calculated;
mod loader;

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::cqn::Expr;
use crate::error::{TransformError, TransformResult};

pub use calculated::{CalculatedCycleError, ElementRef};

/// Type of binary elements that wildcards may leave out.
pub const LARGE_BINARY: &str = "cds.LargeBinary";

/// Errors raised while loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to parse model: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid definition \"{name}\": {message}")]
    InvalidDefinition { name: String, message: String },

    #[error(transparent)]
    CalculatedCycle(#[from] CalculatedCycleError),
}

/// A compiled schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    pub definitions: IndexMap<String, Arc<Entity>>,
    /// Entities list the leaves of their structured elements as flat
    /// elements of their own, next to the structures.
    pub unfolded: bool,
}

impl Model {
    pub fn entity(&self, name: &str) -> Option<&Arc<Entity>> {
        self.definitions.get(name)
    }

    pub fn require_entity(&self, name: &str) -> TransformResult<&Arc<Entity>> {
        self.entity(name)
            .ok_or_else(|| TransformError::UnknownEntity(name.to_string()))
    }

    /// The localized variant of `entity`, if the model has one and the entity
    /// did not opt out of localization.
    pub fn localized(&self, entity: &Entity, prefix: &str) -> Option<&Arc<Entity>> {
        if !entity.localized {
            return None;
        }
        self.entity(&format!("{}.{}", prefix, entity.name))
    }
}

/// An entity (table or view).
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub name: String,
    pub elements: IndexMap<String, Arc<Element>>,
    /// `@cds.persistence.skip`: not backed by a table.
    pub persistence_skip: bool,
    /// `false` when annotated `@cds.localized: false`.
    pub localized: bool,
}

impl Entity {
    pub fn element(&self, name: &str) -> Option<&Arc<Element>> {
        self.elements.get(name)
    }

    /// Primary key elements in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &Arc<Element>> {
        self.elements.values().filter(|e| e.key && !e.is_virtual)
    }

    /// Default alias: the last segment of the qualified name.
    pub fn implicit_alias(&self) -> &str {
        implicit_alias(&self.name)
    }

    /// Flat names of everything below the entity's structured elements.
    ///
    /// An unfolded model lists these again as elements of the entity.
    pub fn struct_leaf_names(&self) -> HashSet<&str> {
        fn collect<'e>(element: &'e Element, out: &mut HashSet<&'e str>) {
            for child in element.struct_elements().into_iter().flat_map(|c| c.values()) {
                out.insert(child.flat_name.as_str());
                collect(child, out);
            }
        }
        let mut out = HashSet::new();
        for element in self.elements.values() {
            collect(element, &mut out);
        }
        out
    }
}

/// Last segment of a dotted name.
pub fn implicit_alias(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// An element of an entity or of a structured element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    /// Name of the owning entity.
    pub parent: String,
    /// Column name: the path from the entity joined with `_`.
    pub flat_name: String,
    pub kind: ElementKind,
    pub key: bool,
    pub is_virtual: bool,
    /// Defining expression of a calculated element.
    pub value: Option<Expr>,
    /// `@odata.foreignKey4`: generated foreign key of the named association.
    pub foreign_key_of: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Scalar { type_name: Option<String> },
    Struct { elements: IndexMap<String, Arc<Element>> },
    Association(Association),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub target: String,
    pub composition: bool,
    pub to_many: bool,
    /// Foreign keys of a managed association.
    pub keys: Option<Vec<ForeignKey>>,
    /// Condition of an unmanaged association.
    pub on: Option<Vec<Expr>>,
}

impl Association {
    pub fn is_managed(&self) -> bool {
        self.keys.is_some()
    }
}

/// One foreign key of a managed association.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKey {
    /// Path to the key element inside the target.
    pub path: Vec<String>,
    pub alias: Option<String>,
}

impl ForeignKey {
    /// Name of the key as part of the association's column names.
    pub fn name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.path.join("_"))
    }
}

impl Element {
    pub fn scalar(name: impl Into<String>, type_name: Option<&str>) -> Self {
        let name = name.into();
        Self {
            flat_name: name.clone(),
            name,
            parent: String::new(),
            kind: ElementKind::Scalar {
                type_name: type_name.map(str::to_string),
            },
            key: false,
            is_virtual: false,
            value: None,
            foreign_key_of: None,
        }
    }

    pub fn association(&self) -> Option<&Association> {
        match &self.kind {
            ElementKind::Association(assoc) => Some(assoc),
            _ => None,
        }
    }

    pub fn struct_elements(&self) -> Option<&IndexMap<String, Arc<Element>>> {
        match &self.kind {
            ElementKind::Struct { elements } => Some(elements),
            _ => None,
        }
    }

    pub fn is_association(&self) -> bool {
        self.association().is_some()
    }

    pub fn is_struct(&self) -> bool {
        self.struct_elements().is_some()
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, ElementKind::Scalar { .. })
    }

    pub fn is_calculated(&self) -> bool {
        self.value.is_some()
    }

    pub fn type_name(&self) -> Option<&str> {
        match &self.kind {
            ElementKind::Scalar { type_name } => type_name.as_deref(),
            _ => None,
        }
    }

    /// Elements reachable by the next path step.
    pub fn child(&self, name: &str) -> Option<&Arc<Element>> {
        self.struct_elements().and_then(|elements| elements.get(name))
    }
}
