//! Structured engine diagnostics.
//!
//! The engine never fails into the host event loop. Anything that goes wrong
//! during a pass is recorded here instead, the affected rename or split is
//! skipped, and the next qualifying event gets another chance to fix it.

use std::collections::VecDeque;

use serde::Serialize;

use crate::binding_store::BindingId;
use crate::program::NodeId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A creator node lacks its identity field.
    MissingField,
    /// A field references a binding id the store does not know.
    UnresolvedBindingId,
    /// The store refused every candidate name.
    MintFailure,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineDiagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub node: Option<u64>,
    pub binding: Option<u64>,
}

impl EngineDiagnostic {
    pub fn missing_field(node: NodeId, field: &str) -> Self {
        Self {
            kind: DiagnosticKind::MissingField,
            message: format!("node {} has no identity field '{}'", node.0, field),
            node: Some(node.0),
            binding: None,
        }
    }

    pub fn unresolved(node: NodeId, binding: BindingId) -> Self {
        Self {
            kind: DiagnosticKind::UnresolvedBindingId,
            message: format!("node {} references unknown binding {}", node.0, binding.0),
            node: Some(node.0),
            binding: Some(binding.0),
        }
    }

    pub fn mint_failure(node: NodeId, message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::MintFailure,
            message: message.into(),
            node: Some(node.0),
            binding: None,
        }
    }
}

/// Bounded queue of diagnostics; the oldest entries are dropped first.
#[derive(Debug)]
pub struct Diagnostics {
    entries: VecDeque<EngineDiagnostic>,
    capacity: usize,
}

impl Diagnostics {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, diag: EngineDiagnostic) {
        log::warn!("{:?}: {}", diag.kind, diag.message);
        self.entries.push_back(diag);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &EngineDiagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&mut self) -> Vec<EngineDiagnostic> {
        self.entries.drain(..).collect()
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new(32)
    }
}
