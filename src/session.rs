//! Host-side event loop around the engine.
//!
//! A `Session` owns the workspace and the engine, and delivers queued events
//! to the engine one at a time, in order. Disposed nodes are swept only after
//! the engine has seen the event that deleted them.

use crate::binding_store::{BindingStore, MemoryBindingStore};
use crate::config::EngineConfig;
use crate::engine::IdentityEngine;
use crate::events::ChangeEvent;
use crate::program::{Field, NodeId};
use crate::workspace::Workspace;

/// Events kept for observers before the oldest are dropped.
const MAX_JOURNAL: usize = 1_000;

pub struct Session<S: BindingStore = MemoryBindingStore> {
    pub workspace: Workspace<S>,
    pub engine: IdentityEngine,
    pub config: EngineConfig,
    /// Every delivered event, including engine summaries, oldest first.
    journal: Vec<ChangeEvent>,
}

impl Session<MemoryBindingStore> {
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(config, MemoryBindingStore::new())
    }
}

impl<S: BindingStore> Session<S> {
    pub fn new(config: EngineConfig, store: S) -> Self {
        Self {
            workspace: Workspace::new(store),
            engine: IdentityEngine::new(&config),
            config,
            journal: Vec::new(),
        }
    }

    /// Create a block; its kind comes from the configured families.
    pub fn create_node(&mut self, node_type: &str, fields: Vec<Field>) -> NodeId {
        let kind = self.config.kind_for(node_type);
        self.workspace.create_node(node_type, kind, fields)
    }

    /// Deliver every queued event to the engine. Returns how many were delivered.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.workspace.events_mut().pop() {
            self.engine.handle(&mut self.workspace, &event);
            self.journal.push(event);
            delivered += 1;
        }
        if self.journal.len() > MAX_JOURNAL {
            let excess = self.journal.len() - MAX_JOURNAL;
            self.journal.drain(0..excess);
        }
        let swept = self.workspace.sweep_disposed();
        if swept > 0 {
            log::debug!("Swept {} deleted node(s)", swept);
        }
        delivered
    }

    /// Restore a saved program. `build` runs with the bulk-loading flag set,
    /// so the engine ignores every event it raises; naming state is then
    /// rebuilt from the loaded bindings.
    pub fn load_program<R>(&mut self, build: impl FnOnce(&mut Workspace<S>) -> R) -> R {
        self.workspace.set_bulk_loading(true);
        let result = build(&mut self.workspace);
        self.pump();
        self.workspace.set_bulk_loading(false);
        self.engine.reset_for_program(&self.workspace);
        result
    }

    pub fn journal(&self) -> &[ChangeEvent] {
        &self.journal
    }

    pub fn take_journal(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.journal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChangeKind;
    use crate::workspace::Delivery;

    #[test]
    fn test_pump_delivers_and_records_summary() {
        let mut session = Session::in_memory(EngineConfig::default());
        let b = session.workspace.store.create("box1", None).unwrap();
        let original = session.create_node("create_box", vec![Field::binding("ID_VAR", b)]);
        session.pump();
        session.take_journal();

        session.workspace.duplicate_subtree(original, Delivery::Whole).unwrap();
        let delivered = session.pump();

        // The host's Created plus the engine's grouped summary.
        assert_eq!(delivered, 2);
        let journal = session.journal();
        assert_eq!(journal[0].kind, ChangeKind::Created);
        assert_eq!(journal[1].kind, ChangeKind::FieldChanged);
        assert!(journal[1].group_id.is_some());
    }

    #[test]
    fn test_load_program_resets_families() {
        let mut session = Session::in_memory(EngineConfig::default());
        session.load_program(|ws| {
            let b = ws.store.create("sphere3", None).unwrap();
            let kind = EngineConfig::default().kind_for("create_sphere");
            ws.create_node("create_sphere", kind, vec![Field::binding("ID_VAR", b)]);
        });

        assert!(!session.workspace.is_bulk_loading());
        assert_eq!(session.engine.families().next_index("sphere"), 4);
        assert_eq!(session.workspace.store.names(), vec!["sphere3".to_string()]);
    }
}
