//! Change events and the dispatch queue.
//!
//! The host editor reports every mutation as a `ChangeEvent`. Events are queued
//! and delivered one at a time, in program order. Multi-step engine writes run
//! with dispatch suppressed and are summarised by one synthetic grouped event,
//! so observers (undo stack, renderer sync) see a single step.

use std::collections::VecDeque;

use serde::Serialize;

use crate::program::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    FieldChanged,
    Moved,
    Deleted,
}

/// Identifier shared by events that form one undoable step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GroupId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Affected nodes. The first entry is the node the event targets.
    pub node_ids: Vec<NodeId>,
    pub group_id: Option<GroupId>,
    /// Set when undo/redo replays a recorded event.
    pub is_replay: bool,
    /// Set on the summary an engine transaction leaves behind.
    pub is_summary: bool,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, node: NodeId) -> Self {
        Self {
            kind,
            node_ids: vec![node],
            group_id: None,
            is_replay: false,
            is_summary: false,
        }
    }

    pub fn with_nodes(kind: ChangeKind, node_ids: Vec<NodeId>) -> Self {
        Self {
            kind,
            node_ids,
            group_id: None,
            is_replay: false,
            is_summary: false,
        }
    }

    pub fn created(node: NodeId) -> Self {
        Self::new(ChangeKind::Created, node)
    }

    pub fn in_group(mut self, group: GroupId) -> Self {
        self.group_id = Some(group);
        self
    }

    pub fn replayed(mut self) -> Self {
        self.is_replay = true;
        self
    }

    /// The node the event is about (not one of its descendants).
    pub fn target(&self) -> Option<NodeId> {
        self.node_ids.first().copied()
    }

    pub fn targets(&self, node: NodeId) -> bool {
        self.target() == Some(node)
    }
}

/// Writes collected while a transaction is open.
#[derive(Debug)]
struct OpenTransaction {
    group: GroupId,
    affected: Vec<NodeId>,
    depth: u32,
}

/// Event queue with suppression and grouping.
#[derive(Debug, Default)]
pub struct EventBus {
    queue: VecDeque<ChangeEvent>,
    /// Nesting depth of `suppress` calls. Events raised while > 0 are not queued.
    suppressed: u32,
    transaction: Option<OpenTransaction>,
    /// Group assigned to host events while a host group is open.
    host_group: Option<GroupId>,
    next_group: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_group(&mut self) -> GroupId {
        self.next_group += 1;
        GroupId(self.next_group)
    }

    /// Raise an event. Suppressed events are folded into the open transaction.
    pub fn emit(&mut self, mut event: ChangeEvent) {
        if self.suppressed > 0 {
            if let Some(tx) = self.transaction.as_mut() {
                for id in event.node_ids {
                    if !tx.affected.contains(&id) {
                        tx.affected.push(id);
                    }
                }
            }
            return;
        }
        if event.group_id.is_none() {
            event.group_id = self.host_group;
        }
        self.queue.push_back(event);
    }

    pub fn suppress(&mut self) {
        self.suppressed += 1;
    }

    pub fn resume(&mut self) {
        self.suppressed = self.suppressed.saturating_sub(1);
    }

    /// Open (or nest into) an engine transaction.
    pub fn begin_transaction(&mut self) -> GroupId {
        if let Some(tx) = self.transaction.as_mut() {
            tx.depth += 1;
            return tx.group;
        }
        let group = self.new_group();
        self.transaction = Some(OpenTransaction {
            group,
            affected: Vec::new(),
            depth: 1,
        });
        group
    }

    /// Close a transaction level. The outermost close queues the summary
    /// event, or nothing if no write happened.
    pub fn end_transaction(&mut self) -> Option<GroupId> {
        let tx = self.transaction.as_mut()?;
        tx.depth -= 1;
        if tx.depth > 0 {
            return None;
        }
        let tx = self.transaction.take()?;
        if tx.affected.is_empty() {
            return None;
        }
        let mut summary = ChangeEvent::with_nodes(ChangeKind::FieldChanged, tx.affected).in_group(tx.group);
        summary.is_summary = true;
        self.queue.push_back(summary);
        Some(tx.group)
    }

    /// Tag subsequent host events with one group (e.g. a paste).
    pub fn open_host_group(&mut self) -> GroupId {
        let group = self.new_group();
        self.host_group = Some(group);
        group
    }

    pub fn close_host_group(&mut self) {
        self.host_group = None;
    }

    pub fn pop(&mut self) -> Option<ChangeEvent> {
        self.queue.pop_front()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_queues_in_order() {
        let mut bus = EventBus::new();
        bus.emit(ChangeEvent::created(NodeId(1)));
        bus.emit(ChangeEvent::new(ChangeKind::Moved, NodeId(2)));

        assert_eq!(bus.pending(), 2);
        assert_eq!(bus.pop().unwrap().kind, ChangeKind::Created);
        assert_eq!(bus.pop().unwrap().target(), Some(NodeId(2)));
        assert!(bus.pop().is_none());
    }

    #[test]
    fn test_suppressed_writes_become_one_summary() {
        let mut bus = EventBus::new();
        let group = bus.begin_transaction();
        bus.suppress();
        bus.emit(ChangeEvent::new(ChangeKind::FieldChanged, NodeId(1)));
        bus.emit(ChangeEvent::new(ChangeKind::FieldChanged, NodeId(2)));
        bus.emit(ChangeEvent::new(ChangeKind::FieldChanged, NodeId(1)));
        bus.resume();
        assert_eq!(bus.end_transaction(), Some(group));

        assert_eq!(bus.pending(), 1);
        let summary = bus.pop().unwrap();
        assert_eq!(summary.node_ids, vec![NodeId(1), NodeId(2)]);
        assert_eq!(summary.group_id, Some(group));
        assert!(summary.is_summary);
    }

    #[test]
    fn test_empty_transaction_emits_nothing() {
        let mut bus = EventBus::new();
        bus.begin_transaction();
        bus.suppress();
        bus.resume();
        assert_eq!(bus.end_transaction(), None);
        assert!(bus.is_empty());
    }

    #[test]
    fn test_nested_transaction_merges() {
        let mut bus = EventBus::new();
        let outer = bus.begin_transaction();
        let inner = bus.begin_transaction();
        assert_eq!(outer, inner);

        bus.suppress();
        bus.emit(ChangeEvent::new(ChangeKind::FieldChanged, NodeId(3)));
        bus.resume();
        assert_eq!(bus.end_transaction(), None);
        assert_eq!(bus.end_transaction(), Some(outer));
        assert_eq!(bus.pending(), 1);
    }

    #[test]
    fn test_host_group_tags_events() {
        let mut bus = EventBus::new();
        let group = bus.open_host_group();
        bus.emit(ChangeEvent::created(NodeId(1)));
        bus.close_host_group();
        bus.emit(ChangeEvent::created(NodeId(2)));

        let first = bus.pop().unwrap();
        assert_eq!(first.group_id, Some(group));
        assert!(!first.is_summary);
        assert_eq!(bus.pop().unwrap().group_id, None);
    }

    #[test]
    fn test_summary_flag_is_carried_by_the_event_only() {
        let mut bus = EventBus::new();
        for n in 0..3 {
            bus.begin_transaction();
            bus.suppress();
            bus.emit(ChangeEvent::new(ChangeKind::FieldChanged, NodeId(n)));
            bus.resume();
            bus.end_transaction();
        }
        let summaries: Vec<_> = std::iter::from_fn(|| bus.pop()).collect();
        assert_eq!(summaries.len(), 3);
        assert!(summaries.iter().all(|e| e.is_summary));

        // A host event reusing a summary's group is still a host event.
        let group = summaries[0].group_id.unwrap();
        bus.emit(ChangeEvent::new(ChangeKind::Moved, NodeId(7)).in_group(group));
        assert!(!bus.pop().unwrap().is_summary);
    }
}
