//! Loading a [`Model`] from CSN JSON.
//!
//! Only the parts of CSN the transformation needs are read: entity
//! definitions with their elements, association targets, foreign keys,
//! on-conditions, cardinalities, calculated values and the few annotations
//! that influence query generation. Everything else is ignored.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{calculated, Association, Element, ElementKind, Entity, ForeignKey, Model, ModelError};
use crate::cqn::Expr;

const ASSOCIATION: &str = "cds.Association";
const COMPOSITION: &str = "cds.Composition";

#[derive(Debug, Deserialize)]
struct RawCsn {
    #[serde(default)]
    definitions: IndexMap<String, RawDefinition>,
    #[serde(default)]
    meta: Option<RawMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default)]
    unfolded: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    kind: String,
    #[serde(default)]
    elements: IndexMap<String, RawElement>,
    #[serde(rename = "@cds.persistence.skip", default)]
    persistence_skip: bool,
    #[serde(rename = "@cds.localized", default)]
    localized: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawElement {
    #[serde(rename = "type", default)]
    type_name: Option<String>,
    #[serde(default)]
    key: bool,
    #[serde(rename = "virtual", default)]
    is_virtual: bool,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    keys: Option<Vec<RawForeignKey>>,
    #[serde(default)]
    on: Option<Vec<Expr>>,
    #[serde(default)]
    cardinality: Option<RawCardinality>,
    #[serde(default)]
    elements: Option<IndexMap<String, RawElement>>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(rename = "@odata.foreignKey4", default)]
    foreign_key4: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawForeignKey {
    #[serde(rename = "ref")]
    path: Vec<String>,
    #[serde(rename = "as", default)]
    alias: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawCardinality {
    #[serde(default)]
    max: Option<Value>,
}

impl RawCardinality {
    fn is_to_many(&self) -> bool {
        match &self.max {
            Some(Value::String(s)) => s == "*",
            Some(Value::Number(n)) => n.as_u64().is_some_and(|n| n > 1),
            _ => false,
        }
    }
}

impl Model {
    /// Load a model from CSN JSON text.
    pub fn from_csn_str(text: &str) -> Result<Self, ModelError> {
        let raw: RawCsn = serde_json::from_str(text)?;
        build(raw)
    }

    /// Load a model from a parsed CSN JSON value.
    pub fn from_csn_value(value: Value) -> Result<Self, ModelError> {
        let raw: RawCsn = serde_json::from_value(value)?;
        build(raw)
    }

    /// Load a model from a CSN JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path)?;
        Self::from_csn_str(&content)
    }
}

fn build(raw: RawCsn) -> Result<Model, ModelError> {
    let mut definitions = IndexMap::new();

    for (name, definition) in &raw.definitions {
        if definition.kind != "entity" {
            continue;
        }

        let mut elements = IndexMap::new();
        for (element_name, element) in &definition.elements {
            let built = build_element(&raw, name, element_name, element, &[])?;
            elements.insert(element_name.clone(), built);
        }

        definitions.insert(
            name.clone(),
            Arc::new(Entity {
                name: name.clone(),
                elements,
                persistence_skip: definition.persistence_skip,
                localized: definition.localized.unwrap_or(true),
            }),
        );
    }

    let unfolded = raw
        .meta
        .and_then(|m| m.unfolded)
        .is_some_and(|v| !matches!(v, Value::Bool(false) | Value::Null));

    let model = Model {
        definitions,
        unfolded,
    };
    calculated::validate_no_cycles(&model)?;

    debug!(
        entities = model.definitions.len(),
        unfolded = model.unfolded,
        "loaded model"
    );
    Ok(model)
}

fn build_element(
    csn: &RawCsn,
    entity: &str,
    name: &str,
    raw: &RawElement,
    prefix: &[String],
) -> Result<Arc<Element>, ModelError> {
    let mut path = prefix.to_vec();
    path.push(name.to_string());

    let kind = build_kind(csn, entity, name, raw, &path)?;
    let value = match &raw.value {
        // values stored on write are plain columns for reading
        Some(v) if v.get("stored").and_then(Value::as_bool) == Some(true) => None,
        Some(v) => Some(
            serde_json::from_value::<Expr>(v.clone()).map_err(|e| ModelError::InvalidDefinition {
                name: format!("{}:{}", entity, path.join(".")),
                message: format!("invalid calculated value: {}", e),
            })?,
        ),
        None => None,
    };

    Ok(Arc::new(Element {
        name: name.to_string(),
        parent: entity.to_string(),
        flat_name: path.join("_"),
        kind,
        key: raw.key,
        is_virtual: raw.is_virtual,
        value,
        foreign_key_of: raw.foreign_key4.clone(),
    }))
}

fn build_kind(
    csn: &RawCsn,
    entity: &str,
    name: &str,
    raw: &RawElement,
    path: &[String],
) -> Result<ElementKind, ModelError> {
    let type_name = raw.type_name.as_deref();
    let is_association = matches!(type_name, Some(ASSOCIATION) | Some(COMPOSITION)) || raw.target.is_some();

    if is_association {
        let target = raw
            .target
            .clone()
            .ok_or_else(|| ModelError::InvalidDefinition {
                name: format!("{}:{}", entity, name),
                message: "association without target".to_string(),
            })?;

        let keys = if raw.on.is_some() {
            None
        } else {
            Some(match &raw.keys {
                Some(keys) => keys
                    .iter()
                    .map(|k| ForeignKey {
                        path: k.path.clone(),
                        alias: k.alias.clone(),
                    })
                    .collect(),
                None => default_foreign_keys(csn, &target),
            })
        };

        return Ok(ElementKind::Association(Association {
            composition: type_name == Some(COMPOSITION),
            to_many: raw.cardinality.as_ref().is_some_and(RawCardinality::is_to_many),
            keys,
            on: raw.on.clone(),
            target,
        }));
    }

    let struct_elements = raw.elements.as_ref().or_else(|| {
        type_name
            .and_then(|t| csn.definitions.get(t))
            .filter(|d| d.kind == "type" && !d.elements.is_empty())
            .map(|d| &d.elements)
    });

    if let Some(elements) = struct_elements {
        let mut children = IndexMap::new();
        for (child_name, child) in elements {
            children.insert(
                child_name.clone(),
                build_element(csn, entity, child_name, child, path)?,
            );
        }
        return Ok(ElementKind::Struct { elements: children });
    }

    Ok(ElementKind::Scalar {
        type_name: raw.type_name.clone(),
    })
}

/// Keys of a managed association that declares none: the target's primary key.
fn default_foreign_keys(csn: &RawCsn, target: &str) -> Vec<ForeignKey> {
    csn.definitions
        .get(target)
        .map(|definition| {
            definition
                .elements
                .iter()
                .filter(|(_, e)| e.key && !e.is_virtual)
                .map(|(name, _)| ForeignKey {
                    path: vec![name.clone()],
                    alias: None,
                })
                .collect()
        })
        .unwrap_or_default()
}
