//! Identity resolution for duplicated creator blocks.
//!
//! When the editor duplicates a creator block, the copy arrives still pointing
//! at the original's binding. The resolver detects that sharing, gives the copy
//! its own binding, repoints the copy's subtree, folds in bindings that only
//! the copy uses, and keeps the family numbering dense.
//!
//! Duplicated subtrees can arrive over several events. After a split the node
//! keeps a `PendingRetarget` so that stale references delivered later are
//! repointed too. Per node the state machine is `Idle -> PendingSplit -> Idle`.

use std::collections::{BTreeMap, BTreeSet};

use crate::binding_store::{BindingId, BindingStore, MintError};
use crate::diagnostics::{Diagnostics, EngineDiagnostic};
use crate::events::{ChangeEvent, ChangeKind};
use crate::graph_walker::{self, FieldRef};
use crate::naming::{self, NamingFamilies};
use crate::program::{IdentitySlot, NodeId};
use crate::workspace::Workspace;

/// Split still absorbing late pieces of a duplicated subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRetarget {
    /// The binding shared with the original.
    pub from: BindingId,
    /// The binding minted for the copy.
    pub to: BindingId,
    pub family: String,
    pub type_tag: Option<String>,
}

/// What the resolver did for one node and one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Not a creation of this node, or nothing to do.
    Idle,
    /// Fresh creation; the binding is not shared. Creation naming applies.
    NotDuplicated,
    /// The node got its own binding.
    Split { from: BindingId, to: BindingId },
    /// Abandoned for this pass (missing field, refused mint, disposed node).
    Skipped,
}

#[derive(Debug)]
pub struct Resolver {
    pending: BTreeMap<NodeId, PendingRetarget>,
    max_mint_attempts: u32,
}

impl Resolver {
    pub fn new(max_mint_attempts: u32) -> Self {
        Self {
            pending: BTreeMap::new(),
            max_mint_attempts: max_mint_attempts.max(1),
        }
    }

    pub fn pending(&self, node: NodeId) -> Option<&PendingRetarget> {
        self.pending.get(&node)
    }

    pub fn pending_nodes(&self) -> Vec<NodeId> {
        self.pending.keys().copied().collect()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Run the resolver for `node` on one event.
    ///
    /// Unfinished work on the node always completes first, so a quick second
    /// duplication cannot split against a half-retargeted subtree.
    pub fn on_event<S: BindingStore>(
        &mut self,
        ws: &mut Workspace<S>,
        node: NodeId,
        event: &ChangeEvent,
        slot: &IdentitySlot,
        families: &mut NamingFamilies,
        diags: &mut Diagnostics,
    ) -> Resolution {
        if ws.is_bulk_loading() {
            return Resolution::Idle;
        }

        self.finish_pending(ws, node, families, diags);

        if event.kind != ChangeKind::Created || !event.targets(node) || event.is_replay {
            return Resolution::Idle;
        }
        if !ws.program.is_live(node) {
            return Resolution::Skipped;
        }

        let shared = match ws.program.field_binding(node, &slot.field) {
            Ok(Some(binding)) => binding,
            Ok(None) => return Resolution::NotDuplicated,
            Err(_) => {
                diags.record(EngineDiagnostic::missing_field(node, &slot.field));
                return Resolution::Skipped;
            }
        };

        // The editor's copy keeps the original reference, so a duplicate is
        // a creator whose binding another creator also names.
        if !graph_walker::shares_identity(&ws.program, shared, node) {
            return Resolution::NotDuplicated;
        }

        self.split(ws, node, shared, slot, families, diags)
    }

    /// Complete a pending retarget on `node`. Returns true if anything was
    /// still pointing at the stale binding.
    pub fn finish_pending<S: BindingStore>(
        &mut self,
        ws: &mut Workspace<S>,
        node: NodeId,
        families: &mut NamingFamilies,
        diags: &mut Diagnostics,
    ) -> bool {
        let Some(pending) = self.pending.get(&node).cloned() else {
            return false;
        };
        if !ws.program.is_live(node) || ws.store.get_by_id(pending.to).is_none() {
            log::debug!("Dropping pending retarget on node {}", node.0);
            self.pending.remove(&node);
            return false;
        }

        let stale: Vec<FieldRef> = graph_walker::binding_fields_of(&ws.program, node)
            .filter(|r| r.binding == pending.from)
            .collect();
        if stale.is_empty() {
            log::debug!("Node {} settled on binding {}", node.0, pending.to.0);
            self.pending.remove(&node);
            return false;
        }

        let max_attempts = self.max_mint_attempts;
        ws.with_transaction(|ws| {
            retarget(ws, &stale, pending.to);
            if !ws.program.is_live(node) {
                return;
            }
            adopt_isolated(ws, node, pending.to, &pending.family, pending.type_tag.as_deref());
            if !ws.program.is_live(node) {
                return;
            }
            renumber(ws, node, pending.to, &pending.family, families, max_attempts, diags);
        });
        log::debug!(
            "Retargeted {} late reference(s) under node {}",
            stale.len(),
            node.0
        );
        true
    }

    fn split<S: BindingStore>(
        &mut self,
        ws: &mut Workspace<S>,
        node: NodeId,
        old: BindingId,
        slot: &IdentitySlot,
        families: &mut NamingFamilies,
        diags: &mut Diagnostics,
    ) -> Resolution {
        let template = ws.store.get_by_id(old).cloned();
        if template.is_none() {
            diags.record(EngineDiagnostic::unresolved(node, old));
        }
        let old_name = template.as_ref().map(|b| b.name.clone()).unwrap_or_default();
        let type_tag = template
            .as_ref()
            .and_then(|b| b.type_tag.clone())
            .or_else(|| slot.type_tag.clone());
        // User-chosen names keep their stem and are never renumbered.
        let custom = !old_name.is_empty() && !families.is_family_name(&old_name, &slot.family);
        let prefix = slot.family.as_str();
        let max_attempts = self.max_mint_attempts;

        let (outcome, _) = ws.with_transaction(|ws| -> Result<BindingId, MintError> {
            let minted = if custom {
                let mut name = old_name.clone();
                let candidates = std::iter::from_fn(move || {
                    name = naming::increment_custom_name(&name);
                    Some(name.clone())
                });
                ws.mint_first_free(candidates, type_tag.as_deref(), max_attempts)?
            } else {
                let start = naming::lowest_available_suffix(prefix, |name| ws.store.name_exists(name));
                let candidates = (start..).map(|n| format!("{}{}", prefix, n));
                ws.mint_first_free(candidates, type_tag.as_deref(), max_attempts)?
            };
            recompute_family(ws, prefix, families);

            if let Err(e) = ws.set_field(node, &slot.field, minted) {
                log::debug!("Could not rebind node {}: {}", node.0, e);
                return Ok(minted);
            }

            let stale: Vec<FieldRef> = graph_walker::binding_fields_of(&ws.program, node)
                .filter(|r| r.binding == old)
                .collect();
            retarget(ws, &stale, minted);
            if !ws.program.is_live(node) {
                return Ok(minted);
            }

            adopt_isolated(ws, node, minted, prefix, type_tag.as_deref());
            if !ws.program.is_live(node) {
                return Ok(minted);
            }

            if !custom {
                renumber(ws, node, minted, prefix, families, max_attempts, diags);
            }
            Ok(minted)
        });

        match outcome {
            Ok(minted) => {
                log::debug!(
                    "Split node {} off binding '{}' into '{}'",
                    node.0,
                    old_name,
                    ws.name_or_empty(Some(minted))
                );
                if ws.program.is_live(node) {
                    self.pending.insert(
                        node,
                        PendingRetarget {
                            from: old,
                            to: minted,
                            family: slot.family.clone(),
                            type_tag,
                        },
                    );
                }
                Resolution::Split { from: old, to: minted }
            }
            Err(e) => {
                diags.record(EngineDiagnostic::mint_failure(
                    node,
                    format!("could not mint a binding for '{}': {}", old_name, e),
                ));
                Resolution::Skipped
            }
        }
    }
}

fn retarget<S: BindingStore>(ws: &mut Workspace<S>, refs: &[FieldRef], to: BindingId) {
    for r in refs {
        if let Err(e) = ws.set_field_at(r.node, r.index, to) {
            log::debug!("Skipping retarget on node {}: {}", r.node.0, e);
        }
    }
}

fn recompute_family<S: BindingStore>(ws: &Workspace<S>, prefix: &str, families: &mut NamingFamilies) {
    let names = ws.store.names();
    families.recompute(prefix, names.iter().map(String::as_str));
}

/// Fold bindings that are used only inside `root`'s subtree into `target`.
///
/// A candidate must be type-compatible, carry the family prefix, not be some
/// creator's identity, and have every reference inside the subtree. Candidates
/// referenced from a node that is mid-deletion are left alone.
fn adopt_isolated<S: BindingStore>(
    ws: &mut Workspace<S>,
    root: NodeId,
    target: BindingId,
    prefix: &str,
    family_type: Option<&str>,
) -> usize {
    let subtree = graph_walker::subtree_ids(&ws.program, root);
    let candidates: BTreeSet<BindingId> = graph_walker::binding_fields_of(&ws.program, root)
        .map(|r| r.binding)
        .filter(|b| *b != target)
        .collect();

    let mut adopted = 0;
    for candidate in candidates {
        let Some(binding) = ws.store.get_by_id(candidate) else {
            continue;
        };
        let compatible = match (binding.type_tag.as_deref(), family_type) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        if !compatible || !binding.name.starts_with(prefix) {
            continue;
        }
        let name = binding.name.clone();

        if graph_walker::is_identity_binding(&ws.program, candidate) {
            continue;
        }
        if graph_walker::is_referenced_while_disposing(&ws.program, candidate) {
            log::debug!("Not adopting '{}': referenced from a node being deleted", name);
            continue;
        }
        if graph_walker::is_referenced_outside(&ws.program, candidate, &subtree) {
            continue;
        }

        let refs: Vec<FieldRef> = graph_walker::references_to(&ws.program, candidate).collect();
        retarget(ws, &refs, target);
        if ws.delete_binding_if_unreferenced(candidate) {
            log::debug!("Adopted '{}' into binding {}", name, target.0);
        }
        adopted += 1;
    }
    adopted
}

/// Rename `binding` to the lowest free suffix of its family.
fn renumber<S: BindingStore>(
    ws: &mut Workspace<S>,
    node: NodeId,
    binding: BindingId,
    prefix: &str,
    families: &mut NamingFamilies,
    max_attempts: u32,
    diags: &mut Diagnostics,
) {
    let Some(current) = ws.binding_name(binding).map(str::to_string) else {
        return;
    };
    if !families.is_family_name(&current, prefix) {
        return;
    }

    let start = naming::lowest_available_suffix(prefix, |name| {
        name != current && ws.store.name_exists(name)
    });
    let candidates = (start..).map(|n| format!("{}{}", prefix, n));
    match ws.rename_first_free(binding, candidates, max_attempts) {
        Ok(name) if name != current => {
            log::debug!("Renumbered '{}' to '{}'", current, name);
            // Renames touch no field; report the users so the summary covers them.
            let users: Vec<NodeId> = graph_walker::references_to(&ws.program, binding)
                .map(|r| r.node)
                .collect();
            if !users.is_empty() {
                ws.emit(ChangeEvent::with_nodes(ChangeKind::FieldChanged, users));
            }
        }
        Ok(_) => {}
        Err(e) => diags.record(EngineDiagnostic::mint_failure(
            node,
            format!("could not renumber '{}': {}", current, e),
        )),
    }
    recompute_family(ws, prefix, families);
}
