//! Dependency check for calculated elements.
//!
//! A calculated element is substituted by its defining expression wherever
//! it is read. Definitions that refer to each other in a circle would make
//! that substitution endless, so such models are rejected at load time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use super::{Element, Entity, Model};
use crate::cqn::Expr;

/// A calculated element, identified by entity and element path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub entity: String,
    pub element: String,
}

impl fmt::Display for ElementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.element)
    }
}

/// Calculated elements whose definitions depend on each other.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculatedCycleError {
    pub cycles: Vec<Vec<ElementRef>>,
}

impl fmt::Display for CalculatedCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Circular dependencies between calculated elements:")?;
        for (i, cycle) in self.cycles.iter().enumerate() {
            let path = cycle
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(" → ");
            writeln!(f, "  Cycle {}: {} → (back to start)", i + 1, path)?;
        }
        Ok(())
    }
}

impl std::error::Error for CalculatedCycleError {}

struct DependencyGraph {
    graph: DiGraph<ElementRef, ()>,
    nodes: HashMap<ElementRef, NodeIndex>,
}

impl DependencyGraph {
    fn node(&mut self, element: ElementRef) -> NodeIndex {
        if let Some(idx) = self.nodes.get(&element) {
            return *idx;
        }
        let idx = self.graph.add_node(element.clone());
        self.nodes.insert(element, idx);
        idx
    }

    fn detect_cycles(&self) -> Vec<Vec<ElementRef>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| {
                // A single node is only a cycle if it has a self-loop
                if scc.len() == 1 {
                    self.graph.edges_connecting(scc[0], scc[0]).next().is_some()
                } else {
                    true
                }
            })
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).cloned())
                    .collect()
            })
            .collect()
    }
}

pub(super) fn validate_no_cycles(model: &Model) -> Result<(), CalculatedCycleError> {
    let mut deps = DependencyGraph {
        graph: DiGraph::new(),
        nodes: HashMap::new(),
    };

    for entity in model.definitions.values() {
        let mut calculated = Vec::new();
        collect_calculated(entity.elements.values(), &mut calculated);

        for element in calculated {
            let from = deps.node(ElementRef {
                entity: entity.name.clone(),
                element: element.flat_name.clone(),
            });
            let mut refs = Vec::new();
            if let Some(value) = &element.value {
                collect_paths(std::slice::from_ref(value), &mut refs);
            }
            for path in refs {
                if let Some(to) = resolve_calculated(model, entity, &path) {
                    let to = deps.node(to);
                    deps.graph.add_edge(from, to, ());
                }
            }
        }
    }

    let cycles = deps.detect_cycles();
    if cycles.is_empty() {
        Ok(())
    } else {
        Err(CalculatedCycleError { cycles })
    }
}

fn collect_calculated<'a>(
    elements: impl Iterator<Item = &'a Arc<Element>>,
    out: &mut Vec<&'a Arc<Element>>,
) {
    for element in elements {
        if element.is_calculated() {
            out.push(element);
        }
        if let Some(children) = element.struct_elements() {
            collect_calculated(children.values(), out);
        }
    }
}

fn collect_paths(tokens: &[Expr], out: &mut Vec<Vec<String>>) {
    for token in tokens {
        match token {
            Expr::Ref(r) => out.push(r.steps.iter().map(|s| s.id.clone()).collect()),
            Expr::Func { args, .. } => collect_paths(args, out),
            Expr::Xpr(inner) | Expr::List(inner) => collect_paths(inner, out),
            _ => {}
        }
    }
}

/// The calculated element a path ends in, if any.
fn resolve_calculated(model: &Model, entity: &Arc<Entity>, path: &[String]) -> Option<ElementRef> {
    let mut owner = entity.clone();
    let mut element = owner.element(path.first()?)?.clone();

    for id in &path[1..] {
        let next = if let Some(assoc) = element.association() {
            owner = model.entity(&assoc.target)?.clone();
            owner.element(id)?.clone()
        } else {
            element.child(id)?.clone()
        };
        element = next;
    }

    element.is_calculated().then(|| ElementRef {
        entity: owner.name.clone(),
        element: element.flat_name.clone(),
    })
}
