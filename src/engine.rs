//! Event routing for identifier resolution.
//!
//! `IdentityEngine` sees every host event once. For each event it first lets
//! every node with a pending retarget finish its work, then handles a creation
//! of a creator block: a duplicate gets split off its original's binding, a
//! fresh block goes through creation naming.

use crate::binding_store::BindingStore;
use crate::config::EngineConfig;
use crate::creation_namer;
use crate::diagnostics::{Diagnostics, EngineDiagnostic};
use crate::events::{ChangeEvent, ChangeKind};
use crate::naming::NamingFamilies;
use crate::program::NodeId;
use crate::resolver::{PendingRetarget, Resolution, Resolver};
use crate::workspace::Workspace;

pub struct IdentityEngine {
    resolver: Resolver,
    families: NamingFamilies,
    diagnostics: Diagnostics,
    max_mint_attempts: u32,
    /// Family prefixes recomputed on program load.
    prefixes: Vec<String>,
}

impl IdentityEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            resolver: Resolver::new(config.max_mint_attempts),
            families: NamingFamilies::new(),
            diagnostics: Diagnostics::new(config.max_diagnostics),
            max_mint_attempts: config.max_mint_attempts.max(1),
            prefixes: config.prefixes().map(str::to_string).collect(),
        }
    }

    pub fn families(&self) -> &NamingFamilies {
        &self.families
    }

    pub fn families_mut(&mut self) -> &mut NamingFamilies {
        &mut self.families
    }

    pub fn pending(&self, node: NodeId) -> Option<&PendingRetarget> {
        self.resolver.pending(node)
    }

    pub fn pending_count(&self) -> usize {
        self.resolver.pending_nodes().len()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<EngineDiagnostic> {
        self.diagnostics.take()
    }

    /// Handle one event. Never fails: problems become diagnostics.
    pub fn handle<S: BindingStore>(&mut self, ws: &mut Workspace<S>, event: &ChangeEvent) -> Option<Resolution> {
        if ws.is_bulk_loading() {
            return None;
        }
        // Our own transaction summaries are for outside observers.
        if event.is_summary {
            return None;
        }

        let target = event.target();

        // Unfinished retargets run before anything else on this event.
        // A deleted target is included so its record is dropped.
        for node in self.resolver.pending_nodes() {
            if Some(node) == target && event.kind != ChangeKind::Deleted {
                continue;
            }
            self.resolver
                .finish_pending(ws, node, &mut self.families, &mut self.diagnostics);
        }

        if event.kind == ChangeKind::Deleted {
            return None;
        }
        let node = target?;
        let slot = ws.program.get(node)?.identity()?.clone();

        let resolution = self.resolver.on_event(
            ws,
            node,
            event,
            &slot,
            &mut self.families,
            &mut self.diagnostics,
        );
        if resolution == Resolution::NotDuplicated {
            creation_namer::on_create(
                ws,
                node,
                event,
                &slot,
                &mut self.families,
                self.max_mint_attempts,
                &mut self.diagnostics,
            );
        }
        Some(resolution)
    }

    /// Start over for a freshly loaded program: forget pending work and
    /// derive every family's next index from the bindings that exist.
    pub fn reset_for_program<S: BindingStore>(&mut self, ws: &Workspace<S>) {
        self.resolver.clear();
        self.families.reset();
        let names = ws.store.names();
        for prefix in &self.prefixes {
            self.families.recompute(prefix, names.iter().map(String::as_str));
        }
        log::info!(
            "Program loaded: {} nodes, {} bindings, {} families",
            ws.program.len(),
            names.len(),
            self.families.len()
        );
    }
}
