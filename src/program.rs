//! Program graph for the block editor.
//!
//! A program is a forest of nodes. Each node owns its fields and its children
//! (named slots plus an optional `next` chain link). Parents are held as a
//! plain id, never as ownership, so the tree can be walked upward through the
//! program without reference cycles.

use std::collections::BTreeMap;

use crate::binding_store::BindingId;

/// Unique identifier for program nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

/// Identity capability of an object-creating node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySlot {
    /// Naming family prefix, e.g. `sphere`.
    pub family: String,
    /// Name of the field that holds the node's object identifier.
    pub field: String,
    /// Type tag used when a binding has to be minted without a template.
    pub type_tag: Option<String>,
}

/// What a node is, decided once when it is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Creates a mesh/sound/instrument and names it through an identity field.
    Creator(IdentitySlot),
    /// Any other block.
    Statement,
}

impl NodeKind {
    pub fn identity(&self) -> Option<&IdentitySlot> {
        match self {
            NodeKind::Creator(slot) => Some(slot),
            NodeKind::Statement => None,
        }
    }
}

/// Value held by a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Literal(String),
    /// Reference to a binding, possibly unset.
    Binding(Option<BindingId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Literal(value.into()),
        }
    }

    pub fn binding(name: impl Into<String>, binding: BindingId) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Binding(Some(binding)),
        }
    }

    /// The referenced binding, if this is a set binding field.
    pub fn get(&self) -> Option<BindingId> {
        match self.value {
            FieldValue::Binding(id) => id,
            FieldValue::Literal(_) => None,
        }
    }

    /// Point this field at a binding. Returns false for literal fields.
    pub fn set(&mut self, binding: BindingId) -> bool {
        match &mut self.value {
            FieldValue::Binding(id) => {
                *id = Some(binding);
                true
            }
            FieldValue::Literal(_) => false,
        }
    }

    pub fn is_binding(&self) -> bool {
        matches!(self.value, FieldValue::Binding(_))
    }
}

/// A named child slot (statement input or value input).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub name: String,
    pub child: Option<NodeId>,
}

/// Where a child hangs off its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Slot(String),
    Next,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub type_tag: String,
    pub kind: NodeKind,
    /// Back-reference to the parent, by id only.
    pub parent: Option<NodeId>,
    pub fields: Vec<Field>,
    pub slots: Vec<Slot>,
    pub next: Option<NodeId>,
    /// Set while the node is being deleted in the current event batch.
    pub disposing: bool,
}

impl Node {
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn identity(&self) -> Option<&IdentitySlot> {
        self.kind.identity()
    }

    /// Binding currently named by this node's identity field.
    pub fn identity_binding(&self) -> Option<BindingId> {
        let slot = self.identity()?;
        self.field(&slot.field)?.get()
    }

    /// Direct children: slots in declaration order, then the `next` link.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .filter_map(|s| s.child)
            .chain(self.next)
    }
}

/// Structural failure when editing the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    UnknownNode(NodeId),
    MissingField { node: NodeId, field: String },
    NotABindingField { node: NodeId, field: String },
    /// Attaching would make a node its own ancestor.
    Cycle { child: NodeId, parent: NodeId },
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::UnknownNode(id) => write!(f, "unknown node {:?}", id),
            GraphError::MissingField { node, field } => {
                write!(f, "node {:?} has no field '{}'", node, field)
            }
            GraphError::NotABindingField { node, field } => {
                write!(f, "field '{}' on node {:?} does not hold a binding", field, node)
            }
            GraphError::Cycle { child, parent } => {
                write!(f, "cannot attach {:?} under its own descendant {:?}", child, parent)
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// The whole program: every node, indexed by id.
#[derive(Debug, Default)]
pub struct Program {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u64,
}

impl Program {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn new_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    /// Insert a detached node and return its ID.
    pub fn insert(&mut self, type_tag: impl Into<String>, kind: NodeKind, fields: Vec<Field>) -> NodeId {
        let id = self.new_id();
        self.nodes.insert(
            id,
            Node {
                id,
                type_tag: type_tag.into(),
                kind,
                parent: None,
                fields,
                slots: Vec::new(),
                next: None,
                disposing: false,
            },
        );
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Exists and is not being deleted.
    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| !n.disposing)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes without a parent that are not being deleted.
    pub fn top_level(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .values()
            .filter(|n| n.parent.is_none() && !n.disposing)
    }

    /// Walk parent links up to the top-level ancestor.
    pub fn root_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.nodes.get(&id)?;
        while let Some(parent) = current.parent.and_then(|p| self.nodes.get(&p)) {
            current = parent;
        }
        Some(current.id)
    }

    pub fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        let mut cursor = self.nodes.get(&of).and_then(|n| n.parent);
        while let Some(id) = cursor {
            if id == ancestor {
                return true;
            }
            cursor = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    /// Unlink a node from its parent. The node keeps its own subtree.
    pub fn detach(&mut self, child: NodeId) -> Result<(), GraphError> {
        let parent = self
            .nodes
            .get(&child)
            .ok_or(GraphError::UnknownNode(child))?
            .parent;
        if let Some(parent_id) = parent {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                for slot in &mut parent.slots {
                    if slot.child == Some(child) {
                        slot.child = None;
                    }
                }
                if parent.next == Some(child) {
                    parent.next = None;
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        Ok(())
    }

    /// Attach `child` under `parent`. A node already occupying the target
    /// position is detached and becomes top-level.
    pub fn attach(&mut self, child: NodeId, parent: NodeId, at: Attachment) -> Result<(), GraphError> {
        if !self.contains(child) {
            return Err(GraphError::UnknownNode(child));
        }
        if !self.contains(parent) {
            return Err(GraphError::UnknownNode(parent));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(GraphError::Cycle { child, parent });
        }

        self.detach(child)?;

        let displaced = {
            let parent_node = self
                .nodes
                .get_mut(&parent)
                .ok_or(GraphError::UnknownNode(parent))?;
            match at {
                Attachment::Next => parent_node.next.replace(child),
                Attachment::Slot(name) => {
                    match parent_node.slots.iter_mut().find(|s| s.name == name) {
                        Some(slot) => slot.child.replace(child),
                        None => {
                            parent_node.slots.push(Slot {
                                name,
                                child: Some(child),
                            });
                            None
                        }
                    }
                }
            }
        };

        if let Some(old) = displaced {
            if let Some(node) = self.nodes.get_mut(&old) {
                node.parent = None;
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    /// Binding referenced by a named field.
    pub fn field_binding(&self, node: NodeId, field: &str) -> Result<Option<BindingId>, GraphError> {
        let n = self.nodes.get(&node).ok_or(GraphError::UnknownNode(node))?;
        let f = n.field(field).ok_or_else(|| GraphError::MissingField {
            node,
            field: field.to_string(),
        })?;
        if !f.is_binding() {
            return Err(GraphError::NotABindingField {
                node,
                field: field.to_string(),
            });
        }
        Ok(f.get())
    }

    /// Point a named field at a binding. Returns the previous reference.
    pub fn set_field_binding(
        &mut self,
        node: NodeId,
        field: &str,
        binding: BindingId,
    ) -> Result<Option<BindingId>, GraphError> {
        let index = self
            .nodes
            .get(&node)
            .ok_or(GraphError::UnknownNode(node))?
            .field_index(field)
            .ok_or_else(|| GraphError::MissingField {
                node,
                field: field.to_string(),
            })?;
        self.set_binding_at(node, index, binding)
    }

    /// Point the field at `index` on `node` at a binding.
    pub fn set_binding_at(
        &mut self,
        node: NodeId,
        index: usize,
        binding: BindingId,
    ) -> Result<Option<BindingId>, GraphError> {
        let n = self.nodes.get_mut(&node).ok_or(GraphError::UnknownNode(node))?;
        let f = n.fields.get_mut(index).ok_or_else(|| GraphError::MissingField {
            node,
            field: format!("#{}", index),
        })?;
        let previous = f.get();
        if !f.set(binding) {
            return Err(GraphError::NotABindingField {
                node,
                field: f.name.clone(),
            });
        }
        Ok(previous)
    }

    /// Copy a subtree. Copies keep every field value, so binding references
    /// are shared with the source. Returns the new ids in pre-order, root first.
    pub fn copy_subtree(&mut self, root: NodeId, deep: bool) -> Result<Vec<NodeId>, GraphError> {
        let source = self.nodes.get(&root).ok_or(GraphError::UnknownNode(root))?.clone();
        let copy_id = self.insert(source.type_tag.clone(), source.kind.clone(), source.fields.clone());
        let mut created = vec![copy_id];
        if !deep {
            return Ok(created);
        }

        for slot in &source.slots {
            if let Some(child) = slot.child {
                let child_ids = self.copy_subtree(child, true)?;
                self.attach(child_ids[0], copy_id, Attachment::Slot(slot.name.clone()))?;
                created.extend(child_ids);
            }
        }
        if let Some(next) = source.next {
            let next_ids = self.copy_subtree(next, true)?;
            self.attach(next_ids[0], copy_id, Attachment::Next)?;
            created.extend(next_ids);
        }
        Ok(created)
    }

    /// Flag a subtree as being deleted. Returns the flagged ids, root first.
    pub fn mark_disposing(&mut self, root: NodeId) -> Result<Vec<NodeId>, GraphError> {
        if !self.contains(root) {
            return Err(GraphError::UnknownNode(root));
        }
        let mut marked = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.disposing = true;
                marked.push(id);
                let children: Vec<NodeId> = node.children().collect();
                stack.extend(children.into_iter().rev());
            }
        }
        Ok(marked)
    }

    /// Remove every node flagged as disposing. Returns how many were removed.
    pub fn sweep_disposed(&mut self) -> usize {
        let doomed: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.disposing)
            .map(|n| n.id)
            .collect();
        for id in &doomed {
            // Unlink from a surviving parent first.
            let _ = self.detach(*id);
        }
        for id in &doomed {
            self.nodes.remove(id);
        }
        doomed.len()
    }
}
