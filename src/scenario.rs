//! Scripted editing sessions.
//!
//! A scenario is a JSON document describing a starting program (restored as a
//! bulk load) and a list of host edits. Each edit is applied and the engine is
//! pumped before the next one, the way the editor delivers user actions.
//!
//! ```json
//! {
//!   "bindings": [{ "name": "star1" }],
//!   "program": [
//!     { "key": "a", "nodeType": "create_star", "fields": { "ID_VAR": { "binding": "star1" } } }
//!   ],
//!   "steps": [
//!     { "op": "duplicate", "key": "b", "source": "a" }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::binding_store::{BindingStore, MemoryBindingStore};
use crate::config::EngineConfig;
use crate::diagnostics::EngineDiagnostic;
use crate::events::ChangeEvent;
use crate::graph_walker;
use crate::program::{Attachment, Field, NodeId};
use crate::session::Session;
use crate::workspace::{Delivery, Workspace};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingSeed {
    pub name: String,
    #[serde(default)]
    pub type_tag: Option<String>,
}

/// A field value: a binding reference by name, or a literal.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldSeed {
    Binding { binding: String },
    Literal(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    pub key: String,
    /// Slot name; absent means the `next` link.
    #[serde(default)]
    pub slot: Option<String>,
}

impl ParentRef {
    fn attachment(&self) -> Attachment {
        match &self.slot {
            Some(slot) => Attachment::Slot(slot.clone()),
            None => Attachment::Next,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSeed {
    pub key: String,
    pub node_type: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldSeed>,
    #[serde(default)]
    pub parent: Option<ParentRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    /// Create a block (from the toolbox, or a replayed creation).
    Create {
        node: NodeSeed,
        #[serde(default)]
        replay: bool,
    },
    /// Duplicate a block and its subtree; the copy is registered as `key`.
    #[serde(rename_all = "camelCase")]
    Duplicate {
        key: String,
        source: String,
        #[serde(default)]
        root_only: bool,
    },
    Attach { key: String, parent: ParentRef },
    Detach { key: String },
    Delete { key: String },
    SetField {
        key: String,
        field: String,
        binding: String,
    },
    /// Re-deliver a node's creation as an undo/redo replay.
    Replay { key: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub bindings: Vec<BindingSeed>,
    #[serde(default)]
    pub program: Vec<NodeSeed>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingRow {
    pub name: String,
    pub type_tag: Option<String>,
    pub references: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRow {
    pub key: Option<String>,
    pub id: u64,
    pub node_type: String,
    pub parent: Option<u64>,
    pub identity: Option<String>,
}

/// Snapshot of bindings, nodes and engine state after a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub bindings: Vec<BindingRow>,
    pub nodes: Vec<NodeRow>,
    pub families: BTreeMap<String, u32>,
    pub diagnostics: Vec<EngineDiagnostic>,
}

impl ScenarioReport {
    /// Plain-text rendering for the terminal.
    pub fn to_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Bindings:");
        for b in &self.bindings {
            let _ = writeln!(
                out,
                "  {:<24} {:<12} refs={}",
                b.name,
                b.type_tag.as_deref().unwrap_or("-"),
                b.references
            );
        }
        let _ = writeln!(out, "Nodes:");
        for n in &self.nodes {
            let _ = writeln!(
                out,
                "  #{:<4} {:<8} {:<20} {}",
                n.id,
                n.key.as_deref().unwrap_or("-"),
                n.node_type,
                n.identity.as_deref().unwrap_or("")
            );
        }
        let _ = writeln!(out, "Families:");
        for (prefix, next) in &self.families {
            let _ = writeln!(out, "  {:<24} next={}", prefix, next);
        }
        if !self.diagnostics.is_empty() {
            let _ = writeln!(out, "Diagnostics:");
            for d in &self.diagnostics {
                let _ = writeln!(out, "  [{:?}] {}", d.kind, d.message);
            }
        }
        out
    }
}

/// Applies scenario steps to a session, tracking nodes by key.
pub struct ScenarioRunner {
    pub session: Session<MemoryBindingStore>,
    keys: HashMap<String, NodeId>,
}

impl ScenarioRunner {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            session: Session::in_memory(config),
            keys: HashMap::new(),
        }
    }

    /// Load the scenario's program and apply every step.
    pub fn run(config: EngineConfig, scenario: &Scenario) -> Result<Self> {
        let mut runner = Self::new(config);
        runner.load(&scenario.bindings, &scenario.program)?;
        for (i, step) in scenario.steps.iter().enumerate() {
            runner
                .apply_step(step)
                .map_err(|e| anyhow!("Step {} failed: {}", i + 1, e))?;
        }
        Ok(runner)
    }

    /// Restore bindings and nodes as a bulk load.
    pub fn load(&mut self, bindings: &[BindingSeed], nodes: &[NodeSeed]) -> Result<()> {
        let config = self.session.config.clone();
        let keys = &mut self.keys;
        self.session.load_program(|ws| -> Result<()> {
            for seed in bindings {
                ws.binding_named(&seed.name, seed.type_tag.as_deref())?;
            }
            for seed in nodes {
                let fields = build_fields(ws, &seed.fields)?;
                let id = ws.create_node(&seed.node_type, config.kind_for(&seed.node_type), fields);
                keys.insert(seed.key.clone(), id);
                if let Some(parent) = &seed.parent {
                    let parent_id = lookup(keys, ws, &parent.key)?;
                    ws.attach(id, parent_id, parent.attachment())?;
                }
            }
            Ok(())
        })
    }

    pub fn apply_step(&mut self, step: &Step) -> Result<()> {
        match step {
            Step::Create { node, replay } => {
                let ws = &mut self.session.workspace;
                let fields = build_fields(ws, &node.fields)?;
                let kind = self.session.config.kind_for(&node.node_type);
                let id = if *replay {
                    let id = ws.program.insert(node.node_type.as_str(), kind, fields);
                    ws.emit(ChangeEvent::created(id).replayed());
                    id
                } else {
                    ws.create_node(&node.node_type, kind, fields)
                };
                self.keys.insert(node.key.clone(), id);
                if let Some(parent) = &node.parent {
                    let parent_id = lookup(&self.keys, ws, &parent.key)?;
                    ws.attach(id, parent_id, parent.attachment())?;
                }
            }
            Step::Duplicate { key, source, root_only } => {
                let ws = &mut self.session.workspace;
                let source_id = lookup(&self.keys, ws, source)?;
                let delivery = if *root_only { Delivery::RootOnly } else { Delivery::Whole };
                ws.events_mut().open_host_group();
                let copy = ws.duplicate_subtree(source_id, delivery);
                ws.events_mut().close_host_group();
                self.keys.insert(key.clone(), copy?);
            }
            Step::Attach { key, parent } => {
                let ws = &mut self.session.workspace;
                let child = lookup(&self.keys, ws, key)?;
                let parent_id = lookup(&self.keys, ws, &parent.key)?;
                ws.attach(child, parent_id, parent.attachment())?;
            }
            Step::Detach { key } => {
                let ws = &mut self.session.workspace;
                let child = lookup(&self.keys, ws, key)?;
                ws.detach(child)?;
            }
            Step::Delete { key } => {
                let ws = &mut self.session.workspace;
                let root = lookup(&self.keys, ws, key)?;
                ws.delete_subtree(root)?;
            }
            Step::SetField { key, field, binding } => {
                let ws = &mut self.session.workspace;
                let node = lookup(&self.keys, ws, key)?;
                let id = ws.binding_named(binding, None)?;
                ws.set_field(node, field, id)?;
            }
            Step::Replay { key } => {
                let ws = &mut self.session.workspace;
                let node = lookup(&self.keys, ws, key)?;
                ws.emit(ChangeEvent::created(node).replayed());
            }
        }
        self.session.pump();
        Ok(())
    }

    pub fn node(&self, key: &str) -> Option<NodeId> {
        self.keys
            .get(key)
            .copied()
            .filter(|id| self.session.workspace.program.contains(*id))
    }

    /// Name of the binding in a node's field, if any.
    pub fn field_name(&self, key: &str, field: &str) -> Option<String> {
        let ws = &self.session.workspace;
        let id = ws.program.field_binding(self.node(key)?, field).ok()??;
        ws.binding_name(id).map(str::to_string)
    }

    pub fn report(&self) -> ScenarioReport {
        let ws = &self.session.workspace;
        let key_of: HashMap<NodeId, &str> = self
            .keys
            .iter()
            .map(|(k, id)| (*id, k.as_str()))
            .collect();

        let bindings = ws
            .store
            .enumerate_all()
            .map(|b| BindingRow {
                name: b.name.clone(),
                type_tag: b.type_tag.clone(),
                references: graph_walker::reference_count(&ws.program, b.id),
            })
            .collect();

        let nodes = ws
            .program
            .nodes()
            .map(|n| NodeRow {
                key: key_of.get(&n.id).map(|k| k.to_string()),
                id: n.id.0,
                node_type: n.type_tag.clone(),
                parent: n.parent.map(|p| p.0),
                identity: n
                    .identity_binding()
                    .and_then(|b| ws.binding_name(b))
                    .map(str::to_string),
            })
            .collect();

        let families = self
            .session
            .config
            .prefixes()
            .map(|p| (p.to_string(), self.session.engine.families().next_index(p)))
            .collect();

        ScenarioReport {
            bindings,
            nodes,
            families,
            diagnostics: self.session.engine.diagnostics().iter().cloned().collect(),
        }
    }
}

fn lookup<S: BindingStore>(keys: &HashMap<String, NodeId>, ws: &Workspace<S>, key: &str) -> Result<NodeId> {
    let id = keys
        .get(key)
        .copied()
        .ok_or_else(|| anyhow!("Unknown node key '{}'", key))?;
    if !ws.program.contains(id) {
        return Err(anyhow!("Node '{}' has been deleted", key));
    }
    Ok(id)
}

fn build_fields<S: BindingStore>(ws: &mut Workspace<S>, seeds: &BTreeMap<String, FieldSeed>) -> Result<Vec<Field>> {
    let mut fields = Vec::with_capacity(seeds.len());
    for (name, seed) in seeds {
        let field = match seed {
            FieldSeed::Binding { binding } => Field::binding(name.as_str(), ws.binding_named(binding, None)?),
            FieldSeed::Literal(value) => Field::literal(name.as_str(), value.as_str()),
        };
        fields.push(field);
    }
    Ok(fields)
}
