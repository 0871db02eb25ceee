//! Naming for freshly created creator blocks.
//!
//! A routine family name (`sphere3`) is replaced by the family's next index;
//! a user-chosen name has its trailing number incremented (`myStar3` ->
//! `myStar4`, `myStar` -> `myStar1`). A binding of that name is reused if the
//! store already has one and no other creator names it; a name another
//! creator owns is passed over like a refused one.

use crate::binding_store::{BindingId, BindingStore};
use crate::diagnostics::{Diagnostics, EngineDiagnostic};
use crate::events::{ChangeEvent, ChangeKind};
use crate::graph_walker;
use crate::naming::{self, NamingFamilies};
use crate::program::{IdentitySlot, NodeId};
use crate::workspace::Workspace;

/// Give a freshly created node its name. Returns the binding it ends up on,
/// or `None` when the event does not qualify or the store refused every name.
pub fn on_create<S: BindingStore>(
    ws: &mut Workspace<S>,
    node: NodeId,
    event: &ChangeEvent,
    slot: &IdentitySlot,
    families: &mut NamingFamilies,
    max_attempts: u32,
    diags: &mut Diagnostics,
) -> Option<BindingId> {
    if event.kind != ChangeKind::Created
        || !event.targets(node)
        || event.is_replay
        || ws.is_bulk_loading()
    {
        return None;
    }

    let current = match ws.program.field_binding(node, &slot.field) {
        Ok(binding) => binding,
        Err(_) => {
            diags.record(EngineDiagnostic::missing_field(node, &slot.field));
            return None;
        }
    };
    if let Some(id) = current {
        if ws.store.get_by_id(id).is_none() {
            diags.record(EngineDiagnostic::unresolved(node, id));
        }
    }
    let name = ws.name_or_empty(current);
    let type_tag = current
        .and_then(|id| ws.store.get_by_id(id))
        .and_then(|b| b.type_tag.clone())
        .or_else(|| slot.type_tag.clone());

    let chosen = if name.is_empty() || families.is_family_name(&name, &slot.family) {
        family_binding(ws, node, &slot.family, type_tag.as_deref(), families, max_attempts)
    } else {
        custom_binding(ws, node, &name, type_tag.as_deref(), max_attempts)
    };

    let Some(chosen) = chosen else {
        diags.record(EngineDiagnostic::mint_failure(
            node,
            format!("no usable name for '{}' after {} attempts", name, max_attempts),
        ));
        return None;
    };

    if current != Some(chosen) {
        ws.with_transaction(|ws| {
            if let Err(e) = ws.set_field(node, &slot.field, chosen) {
                log::debug!("Could not name node {}: {}", node.0, e);
            }
        });
        log::debug!(
            "Named node {} '{}' (was '{}')",
            node.0,
            ws.name_or_empty(Some(chosen)),
            name
        );
    }
    Some(chosen)
}

/// `prefix + next index`, reused or minted; the index advances on every try.
fn family_binding<S: BindingStore>(
    ws: &mut Workspace<S>,
    node: NodeId,
    prefix: &str,
    type_tag: Option<&str>,
    families: &mut NamingFamilies,
    max_attempts: u32,
) -> Option<BindingId> {
    for _ in 0..max_attempts {
        let candidate = format!("{}{}", prefix, families.take_next(prefix));
        if let Some(id) = claim(ws, node, &candidate, type_tag) {
            return Some(id);
        }
    }
    None
}

/// Incremented custom name, reused or minted.
fn custom_binding<S: BindingStore>(
    ws: &mut Workspace<S>,
    node: NodeId,
    name: &str,
    type_tag: Option<&str>,
    max_attempts: u32,
) -> Option<BindingId> {
    let mut candidate = name.to_string();
    for _ in 0..max_attempts {
        candidate = naming::increment_custom_name(&candidate);
        if let Some(id) = claim(ws, node, &candidate, type_tag) {
            return Some(id);
        }
    }
    None
}

/// The binding called `candidate` for `node`: an existing one nobody else
/// creates, or a fresh one. `None` if the name is owned or refused.
fn claim<S: BindingStore>(
    ws: &mut Workspace<S>,
    node: NodeId,
    candidate: &str,
    type_tag: Option<&str>,
) -> Option<BindingId> {
    if let Some(existing) = ws.store.get_by_name(candidate).map(|b| b.id) {
        if graph_walker::shares_identity(&ws.program, existing, node) {
            log::debug!("'{}' already names another creator", candidate);
            return None;
        }
    }
    match ws.binding_named(candidate, type_tag) {
        Ok(id) => Some(id),
        Err(e) => {
            log::debug!("Store refused '{}': {}", candidate, e);
            None
        }
    }
}
