//! Read-only traversal over the program graph.
//!
//! Whole-program scans are O(graph size). They only run in response to user
//! edits, never per frame.

use std::collections::HashSet;

use crate::binding_store::BindingId;
use crate::program::{Node, NodeId, Program};

/// Lazy pre-order walk over every node below a root, excluding the root.
///
/// Cloning the iterator (or calling `descendants_of` again) restarts the walk.
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    program: &'a Program,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            let Some(node) = self.program.get(id) else {
                continue;
            };
            let before = self.stack.len();
            self.stack.extend(node.children());
            self.stack[before..].reverse();
            return Some(node);
        }
        None
    }
}

pub fn descendants_of(program: &Program, root: NodeId) -> Descendants<'_> {
    let mut stack: Vec<NodeId> = program
        .get(root)
        .map(|n| n.children().collect())
        .unwrap_or_default();
    stack.reverse();
    Descendants { program, stack }
}

/// Ids of `root` and everything below it.
pub fn subtree_ids(program: &Program, root: NodeId) -> HashSet<NodeId> {
    let mut ids: HashSet<NodeId> = descendants_of(program, root).map(|n| n.id).collect();
    if program.contains(root) {
        ids.insert(root);
    }
    ids
}

/// A field that currently references a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub node: NodeId,
    /// Index into the node's field list.
    pub index: usize,
    pub binding: BindingId,
}

fn binding_fields(node: &Node) -> impl Iterator<Item = FieldRef> + '_ {
    node.fields.iter().enumerate().filter_map(move |(index, field)| {
        field.get().map(|binding| FieldRef {
            node: node.id,
            index,
            binding,
        })
    })
}

/// Every binding reference on `root` and its descendants, root first.
pub fn binding_fields_of(program: &Program, root: NodeId) -> impl Iterator<Item = FieldRef> + '_ {
    program
        .get(root)
        .into_iter()
        .chain(descendants_of(program, root))
        .flat_map(binding_fields)
}

/// Every field in the program that references `binding`.
pub fn references_to(program: &Program, binding: BindingId) -> impl Iterator<Item = FieldRef> + '_ {
    program
        .nodes()
        .flat_map(binding_fields)
        .filter(move |r| r.binding == binding)
}

pub fn reference_count(program: &Program, binding: BindingId) -> usize {
    references_to(program, binding).count()
}

/// True if any field outside `subtree` references `binding`.
pub fn is_referenced_outside(program: &Program, binding: BindingId, subtree: &HashSet<NodeId>) -> bool {
    references_to(program, binding).any(|r| !subtree.contains(&r.node))
}

/// True if a node being deleted still references `binding`.
pub fn is_referenced_while_disposing(program: &Program, binding: BindingId) -> bool {
    references_to(program, binding)
        .any(|r| program.get(r.node).is_some_and(|n| n.disposing))
}

/// True if some live creator other than `node` names `binding` in its identity field.
pub fn shares_identity(program: &Program, binding: BindingId, node: NodeId) -> bool {
    program
        .nodes()
        .filter(|n| n.id != node && !n.disposing)
        .any(|n| n.identity_binding() == Some(binding))
}

/// True if `binding` is the identity binding of any live creator.
pub fn is_identity_binding(program: &Program, binding: BindingId) -> bool {
    program
        .nodes()
        .filter(|n| !n.disposing)
        .any(|n| n.identity_binding() == Some(binding))
}
