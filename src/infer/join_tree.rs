//! Joins required by path expressions.
//!
//! Every association traversal in a join-relevant position becomes a node
//! here. Paths sharing a prefix share its nodes: `author.name` and
//! `author.country.code` both read through the same `author` join. A node is
//! identified by its parent, the steps leading to it and its infix filter,
//! so `author[age > 40].name` gets a join of its own.

use std::sync::Arc;

use tracing::debug;

use crate::cqn::Expr;
use crate::model::{Element, Entity};
use crate::transform::alias::AliasScope;

/// One association traversal.
#[derive(Debug, Clone)]
pub struct JoinNode {
    pub alias: String,
    /// Alias of the table the association belongs to.
    pub source_alias: String,
    pub parent: Option<usize>,
    /// Step ids from the source table to the association, structure
    /// steps included.
    pub path: Vec<String>,
    /// Infix filter of the association step, unresolved.
    pub filter: Vec<Expr>,
    pub element: Arc<Element>,
    pub target: Arc<Entity>,
    pub children: Vec<usize>,
}

/// Arena of join nodes in first-use order.
#[derive(Debug, Clone, Default)]
pub struct JoinTree {
    nodes: Vec<JoinNode>,
}

/// Where a new join hangs in the tree.
#[derive(Debug, Clone, Copy)]
pub enum JoinParent<'a> {
    /// A source of the query, by alias.
    Source(&'a str),
    Node(usize),
}

impl JoinTree {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> &JoinNode {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[JoinNode] {
        &self.nodes
    }

    /// Find the node for a traversal or create it with a fresh alias.
    pub fn join(
        &mut self,
        parent: JoinParent<'_>,
        path: Vec<String>,
        filter: &[Expr],
        element: Arc<Element>,
        target: Arc<Entity>,
        scope: &mut AliasScope<'_>,
    ) -> usize {
        let (parent_index, source_alias) = match parent {
            JoinParent::Source(alias) => (None, alias.to_string()),
            JoinParent::Node(index) => (Some(index), self.nodes[index].alias.clone()),
        };

        let existing = self.nodes.iter().position(|n| {
            n.parent == parent_index
                && n.source_alias == source_alias
                && n.path == path
                && n.filter == filter
        });
        if let Some(index) = existing {
            return index;
        }

        let candidate = path.last().map(String::as_str).unwrap_or(element.name.as_str());
        let alias = scope.next_available(candidate);
        debug!(alias = %alias, source = %source_alias, target = %target.name, "added join");

        let index = self.nodes.len();
        self.nodes.push(JoinNode {
            alias,
            source_alias,
            parent: parent_index,
            path,
            filter: filter.to_vec(),
            element,
            target,
            children: Vec::new(),
        });
        if let Some(parent) = parent_index {
            self.nodes[parent].children.push(index);
        }
        index
    }

    /// Nodes in join order: each root followed by its subtree, depth first.
    pub fn pre_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            if node.parent.is_none() {
                self.visit(index, &mut order);
            }
        }
        order
    }

    fn visit(&self, index: usize, order: &mut Vec<usize>) {
        order.push(index);
        for child in &self.nodes[index].children {
            self.visit(*child, order);
        }
    }
}
