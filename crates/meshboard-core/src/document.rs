//! Document state: versioned collections, the mutation wrapper and the
//! undo/redo history.
//!
//! All local mutation passes through [`Document::apply`], which is the only
//! path by which edits reach storage and broadcast. Remote input is never
//! applied directly; it goes through [`Document::merge_remote`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::element::{next_version, random_nonce, Connection, Element, ElementId, Versioned};
use crate::merge::merge;

/// Maximum number of undo states to keep.
const MAX_UNDO_HISTORY: usize = 50;

/// A snapshot of document state for undo/redo. Local-only, never
/// transmitted.
#[derive(Debug, Clone)]
struct Snapshot {
    elements: HashMap<ElementId, Element>,
    connections: HashMap<ElementId, Connection>,
}

/// The reconciled collections, as exchanged with peers and storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagramState {
    pub elements: HashMap<ElementId, Element>,
    pub connections: HashMap<ElementId, Connection>,
}

/// The local peer's authoritative diagram state.
///
/// Exactly one local writer mutates these collections; everything arriving
/// from the mesh is reconciled through the merge resolver first.
#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: HashMap<ElementId, Element>,
    connections: HashMap<ElementId, Connection>,
    undo_stack: Vec<Snapshot>,
    redo_stack: Vec<Snapshot>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document from loaded state (no history entry).
    pub fn from_state(state: DiagramState) -> Self {
        Self {
            elements: state.elements,
            connections: state.connections,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn elements(&self) -> &HashMap<ElementId, Element> {
        &self.elements
    }

    pub fn connections(&self) -> &HashMap<ElementId, Connection> {
        &self.connections
    }

    pub fn get_element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    pub fn get_connection(&self, id: ElementId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Elements that are live (not tombstoned), the set a renderer draws.
    pub fn live_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.values().filter(|e| !e.is_deleted)
    }

    /// Clone of the current collections, for broadcast or persistence.
    pub fn state(&self) -> DiagramState {
        DiagramState {
            elements: self.elements.clone(),
            connections: self.connections.clone(),
        }
    }

    /// Run a local mutation through the versioning wrapper.
    ///
    /// The updater receives working copies of both collections. Afterwards:
    /// records whose content changed (or which are new) get a fresh
    /// version + nonce and are forced live; records the updater removed are
    /// re-inserted as tombstones with a fresh stamp; if nothing changed the
    /// call is a complete no-op. On change, the pre-mutation snapshot is
    /// pushed onto the undo stack (capped, oldest evicted), the redo stack
    /// is cleared, and `true` is returned so the caller persists and
    /// broadcasts.
    pub fn apply<F>(&mut self, updater: F) -> bool
    where
        F: FnOnce(&mut HashMap<ElementId, Element>, &mut HashMap<ElementId, Connection>),
    {
        let mut next_elements = self.elements.clone();
        let mut next_connections = self.connections.clone();
        updater(&mut next_elements, &mut next_connections);

        let elements_changed = stamp_changes(&self.elements, &mut next_elements);
        let connections_changed = stamp_changes(&self.connections, &mut next_connections);
        if !elements_changed && !connections_changed {
            return false;
        }

        self.push_undo();
        self.elements = next_elements;
        self.connections = next_connections;
        true
    }

    /// Mirror the local selection set onto the `is_selected` flags.
    ///
    /// Selection is presentation-only state: it is never stamped, merged
    /// or transmitted, so it deliberately bypasses the versioning wrapper.
    pub fn set_selected_flags(&mut self, selected: &std::collections::HashSet<ElementId>) {
        for element in self.elements.values_mut() {
            element.is_selected = selected.contains(&element.id);
        }
    }

    /// Reconcile remote collections into the local ones.
    ///
    /// Never touches the history stacks: merging in remote edits is not a
    /// local edit. Returns true if the local collections changed, so the
    /// caller can persist and re-render.
    pub fn merge_remote(
        &mut self,
        remote_elements: &HashMap<ElementId, Element>,
        remote_connections: &HashMap<ElementId, Connection>,
    ) -> bool {
        let merged_elements = merge(&self.elements, remote_elements);
        let merged_connections = merge(&self.connections, remote_connections);
        let changed =
            merged_elements != self.elements || merged_connections != self.connections;
        if changed {
            self.elements = merged_elements;
            self.connections = merged_connections;
        }
        changed
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            elements: self.elements.clone(),
            connections: self.connections.clone(),
        }
    }

    fn push_undo(&mut self) {
        self.undo_stack.push(self.snapshot());
        self.redo_stack.clear();
        if self.undo_stack.len() > MAX_UNDO_HISTORY {
            self.undo_stack.remove(0);
        }
    }

    /// Restore the previous snapshot. Restoring history is not itself a
    /// new edit, so nothing is re-stamped.
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop() {
            Some(snapshot) => {
                self.redo_stack.push(self.snapshot());
                self.elements = snapshot.elements;
                self.connections = snapshot.connections;
                true
            }
            None => false,
        }
    }

    /// Restore the most recently undone snapshot.
    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(snapshot) => {
                self.undo_stack.push(self.snapshot());
                self.elements = snapshot.elements;
                self.connections = snapshot.connections;
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }
}

/// Structural content comparison: equal up to the version stamp.
fn same_content<T: Versioned + Clone + PartialEq>(a: &T, b: &T) -> bool {
    let mut a = a.clone();
    let mut b = b.clone();
    a.clear_stamp();
    b.clear_stamp();
    a == b
}

/// Stamp every changed or new record in `next`, and synthesize tombstones
/// for records present in `prev` but removed by the updater. Returns
/// whether anything differs from `prev`.
fn stamp_changes<T: Versioned + Clone + PartialEq>(
    prev: &HashMap<ElementId, T>,
    next: &mut HashMap<ElementId, T>,
) -> bool {
    let mut changed = false;

    for record in next.values_mut() {
        match prev.get(&record.id()) {
            Some(before) if same_content(before, record) => {}
            _ => {
                record.stamp(next_version(record.version()), random_nonce());
                changed = true;
            }
        }
    }

    for (id, before) in prev {
        if !next.contains_key(id) {
            let mut tombstone = before.clone();
            tombstone.mark_deleted(next_version(before.version()), random_nonce());
            next.insert(*id, tombstone);
            changed = true;
        }
    }

    changed
}
