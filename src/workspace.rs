//! The editor workspace: program graph, binding store and event dispatch.
//!
//! Host edits go through `Workspace` so every mutation raises the matching
//! `ChangeEvent`. The engine writes through the same methods, wrapped in
//! `with_transaction` so its own writes never re-enter it.

use crate::binding_store::{BindingId, BindingStore, MemoryBindingStore, MintError};
use crate::events::{ChangeEvent, ChangeKind, EventBus, GroupId};
use crate::graph_walker;
use crate::program::{Attachment, Field, GraphError, NodeId, NodeKind, Program};

/// How the host delivers a duplicated subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Copy the whole subtree, then raise one `Created` per node, root first.
    Whole,
    /// Copy only the root. The rest is pasted in later as separate events.
    RootOnly,
}

pub struct Workspace<S: BindingStore = MemoryBindingStore> {
    pub program: Program,
    pub store: S,
    events: EventBus,
    /// Owned by the host: true while a saved program is being restored.
    bulk_loading: bool,
}

impl Workspace<MemoryBindingStore> {
    pub fn in_memory() -> Self {
        Self::new(MemoryBindingStore::new())
    }
}

impl<S: BindingStore> Workspace<S> {
    pub fn new(store: S) -> Self {
        Self {
            program: Program::new(),
            store,
            events: EventBus::new(),
            bulk_loading: false,
        }
    }

    pub fn is_bulk_loading(&self) -> bool {
        self.bulk_loading
    }

    pub fn set_bulk_loading(&mut self, loading: bool) {
        self.bulk_loading = loading;
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn emit(&mut self, event: ChangeEvent) {
        self.events.emit(event);
    }

    /// Run `f` with dispatch disabled. Nothing it writes is queued.
    pub fn with_suppressed_events<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.events.suppress();
        let result = f(self);
        self.events.resume();
        result
    }

    /// Run `f` with dispatch disabled, then raise one grouped summary event
    /// covering every node it touched. Returns the summary's group, if any.
    pub fn with_transaction<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> (R, Option<GroupId>) {
        self.events.begin_transaction();
        let result = self.with_suppressed_events(f);
        let group = self.events.end_transaction();
        (result, group)
    }

    // ---- host edits -------------------------------------------------------

    /// Create a detached node and raise `Created`.
    pub fn create_node(&mut self, type_tag: &str, kind: NodeKind, fields: Vec<Field>) -> NodeId {
        let id = self.program.insert(type_tag, kind, fields);
        self.events.emit(ChangeEvent::created(id));
        id
    }

    /// Move a node under a parent and raise `Moved`.
    pub fn attach(&mut self, child: NodeId, parent: NodeId, at: Attachment) -> Result<(), GraphError> {
        self.program.attach(child, parent, at)?;
        self.events
            .emit(ChangeEvent::with_nodes(ChangeKind::Moved, vec![child, parent]));
        Ok(())
    }

    /// Move a node to the top level and raise `Moved`.
    pub fn detach(&mut self, child: NodeId) -> Result<(), GraphError> {
        self.program.detach(child)?;
        self.events.emit(ChangeEvent::new(ChangeKind::Moved, child));
        Ok(())
    }

    /// Copy a subtree the way the editor's duplicate command does: the copy
    /// keeps every binding reference of the source. Returns the new root.
    pub fn duplicate_subtree(&mut self, root: NodeId, delivery: Delivery) -> Result<NodeId, GraphError> {
        let created = self
            .program
            .copy_subtree(root, delivery == Delivery::Whole)?;
        for id in &created {
            self.events.emit(ChangeEvent::created(*id));
        }
        Ok(created[0])
    }

    /// Flag a subtree for deletion and raise `Deleted`. The nodes stay in the
    /// graph, marked disposing, until `sweep_disposed`.
    pub fn delete_subtree(&mut self, root: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let marked = self.program.mark_disposing(root)?;
        self.events
            .emit(ChangeEvent::with_nodes(ChangeKind::Deleted, marked.clone()));
        Ok(marked)
    }

    pub fn sweep_disposed(&mut self) -> usize {
        self.program.sweep_disposed()
    }

    /// Point a named field at a binding and raise `FieldChanged`.
    pub fn set_field(&mut self, node: NodeId, field: &str, binding: BindingId) -> Result<(), GraphError> {
        let previous = self.program.set_field_binding(node, field, binding)?;
        if previous != Some(binding) {
            self.events
                .emit(ChangeEvent::new(ChangeKind::FieldChanged, node));
        }
        Ok(())
    }

    /// Point the field at `index` on `node` at a binding and raise `FieldChanged`.
    pub fn set_field_at(&mut self, node: NodeId, index: usize, binding: BindingId) -> Result<(), GraphError> {
        let previous = self.program.set_binding_at(node, index, binding)?;
        if previous != Some(binding) {
            self.events
                .emit(ChangeEvent::new(ChangeKind::FieldChanged, node));
        }
        Ok(())
    }

    // ---- bindings ---------------------------------------------------------

    pub fn binding_name(&self, id: BindingId) -> Option<&str> {
        self.store.get_by_id(id).map(|b| b.name.as_str())
    }

    /// Existing binding with this name, or a newly created one.
    pub fn binding_named(&mut self, name: &str, type_tag: Option<&str>) -> Result<BindingId, MintError> {
        match self.store.get_by_name(name) {
            Some(binding) => Ok(binding.id),
            None => self.store.create(name, type_tag),
        }
    }

    /// Delete a binding only if no field references it anymore.
    pub fn delete_binding_if_unreferenced(&mut self, id: BindingId) -> bool {
        if graph_walker::reference_count(&self.program, id) > 0 {
            return false;
        }
        self.store.delete(id)
    }

    /// Mint a binding under the first candidate that is free and accepted by
    /// the store. Refused names are skipped; at most `max_attempts` tried.
    pub fn mint_first_free(
        &mut self,
        candidates: impl IntoIterator<Item = String>,
        type_tag: Option<&str>,
        max_attempts: u32,
    ) -> Result<BindingId, MintError> {
        for name in candidates.into_iter().take(max_attempts as usize) {
            if self.store.name_exists(&name) {
                continue;
            }
            match self.store.create(&name, type_tag) {
                Ok(id) => return Ok(id),
                Err(e) => log::debug!("Store refused to mint '{}': {}", name, e),
            }
        }
        Err(MintError::Exhausted {
            attempts: max_attempts,
        })
    }

    /// Rename a binding to the first candidate that is free and accepted.
    /// Reaching the binding's current name stops the scan without a write.
    pub fn rename_first_free(
        &mut self,
        id: BindingId,
        candidates: impl IntoIterator<Item = String>,
        max_attempts: u32,
    ) -> Result<String, MintError> {
        let current = self
            .binding_name(id)
            .ok_or(MintError::UnknownBinding(id))?
            .to_string();
        for name in candidates.into_iter().take(max_attempts as usize) {
            if name == current {
                return Ok(name);
            }
            if self.store.name_exists(&name) {
                continue;
            }
            match self.store.rename(id, &name) {
                Ok(()) => return Ok(name),
                Err(e) => log::debug!("Store refused to rename '{}' to '{}': {}", current, name, e),
            }
        }
        Err(MintError::Exhausted {
            attempts: max_attempts,
        })
    }

    /// Binding name as the engine sees it: unknown ids read as "".
    pub fn name_or_empty(&self, id: Option<BindingId>) -> String {
        id.and_then(|id| self.binding_name(id))
            .unwrap_or_default()
            .to_string()
    }
}
