//! The editing session: the single local writer.
//!
//! Owns the document, the active tool, the selection, the gesture state
//! machine and the presence cache. Pointer input comes in, committed edits
//! come out as queued full-state broadcasts plus a persistence request;
//! remote input is fed through [`Session::handle_mesh_message`]. Nothing
//! else mutates the document.

use std::collections::HashSet;

use kurbo::{Point, Rect};

use crate::connector::side_of;
use crate::document::{DiagramState, Document};
use crate::element::{ArrowDirection, Connection, Element, ElementId, ElementKind};
use crate::presence::{CursorPosition, PeerPresence, PresenceMap};
use crate::selection::{element_at_point, elements_in_rect, hit_test_handles, HandleKind};
use crate::transform;
use crate::transform::{
    capture_geometry, pointer_angle_delta, rotation_centroid, Gesture, ROTATION_THRESHOLD,
};
use crate::transport::MeshMessage;

/// Body hit tolerance in screen pixels, divided by zoom like handles.
const POINTER_HIT_TOLERANCE: f64 = 4.0;

/// The active editing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Rectangle,
    Ellipse,
    Diamond,
    Rhombus,
    Freedraw,
    Line,
    Arrow,
    Text,
}

impl Tool {
    /// The element kind a creation tool produces (None for Select).
    fn element_kind(self) -> Option<ElementKind> {
        match self {
            Tool::Select => None,
            Tool::Rectangle => Some(ElementKind::Rectangle),
            Tool::Ellipse => Some(ElementKind::Ellipse),
            Tool::Diamond => Some(ElementKind::Diamond),
            Tool::Rhombus => Some(ElementKind::Rhombus),
            Tool::Freedraw => Some(ElementKind::Freedraw),
            Tool::Line => Some(ElementKind::Line),
            Tool::Arrow => Some(ElementKind::Arrow),
            Tool::Text => Some(ElementKind::Text),
        }
    }
}

/// One collaborative editing session over a single diagram.
pub struct Session {
    document: Document,
    tool: Tool,
    selection: HashSet<ElementId>,
    gesture: Gesture,
    /// Element being drawn, not yet committed to the document.
    draft: Option<Element>,
    presence: PresenceMap,
    local_presence: PeerPresence,
    outgoing: Vec<MeshMessage>,
    needs_save: bool,
    zoom: f64,
}

impl Session {
    pub fn new() -> Self {
        Self::with_document(Document::new())
    }

    /// Resume a session over loaded state.
    pub fn with_document(document: Document) -> Self {
        Self {
            document,
            tool: Tool::default(),
            selection: HashSet::new(),
            gesture: Gesture::Idle,
            draft: None,
            presence: PresenceMap::new(),
            local_presence: PeerPresence::new(String::new(), String::new(), String::new()),
            outgoing: Vec::new(),
            needs_save: false,
            zoom: 1.0,
        }
    }

    // --- Views ---

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn state(&self) -> DiagramState {
        self.document.state()
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn selected_element_ids(&self) -> &HashSet<ElementId> {
        &self.selection
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    /// The in-progress element, for local preview.
    pub fn draft(&self) -> Option<&Element> {
        self.draft.as_ref()
    }

    /// Current state with the in-progress transform applied transiently,
    /// for rendering mid-drag. The document itself is untouched until the
    /// gesture commits at pointer up.
    pub fn preview_state(&self) -> DiagramState {
        let mut state = self.document.state();
        match &self.gesture {
            Gesture::Resizing {
                direction,
                origin,
                current,
                captured,
            } => {
                transform::apply_resize(&mut state.elements, captured, *direction, *current - *origin);
                let moved: Vec<ElementId> = captured.keys().copied().collect();
                transform::reanchor_connected(&mut state.elements, &state.connections, &moved);
            }
            Gesture::Translating {
                origin,
                current,
                captured,
            } => {
                transform::apply_translation(&mut state.elements, captured, *current - *origin);
                let moved: Vec<ElementId> = captured.keys().copied().collect();
                transform::reanchor_connected(&mut state.elements, &state.connections, &moved);
            }
            Gesture::Rotating {
                centroid,
                accumulated,
                ..
            } => {
                let ids: Vec<ElementId> = self.selection.iter().copied().collect();
                transform::apply_rotation_increment(&mut state.elements, &ids, *centroid, *accumulated);
                transform::reanchor_connected(&mut state.elements, &state.connections, &ids);
            }
            Gesture::Idle | Gesture::Drawing { .. } | Gesture::MarqueeSelecting { .. } => {}
        }
        state
    }

    /// Presence of every known remote peer.
    pub fn peer_states(&self) -> impl Iterator<Item = &PeerPresence> {
        self.presence.iter()
    }

    // --- Configuration ---

    pub fn set_tool(&mut self, tool: Tool) {
        self.tool = tool;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom.max(f64::EPSILON);
    }

    /// Adopt the identity assigned by the signaling server.
    pub fn set_local_identity(&mut self, peer_id: String, name: String, color: String) {
        self.local_presence.peer_id = peer_id;
        self.local_presence.peer_name = name;
        self.local_presence.peer_color = color;
    }

    // --- Pointer input ---

    /// Start a gesture. Priority order: rotation handle, resize handle,
    /// the active creation tool, then translate over an element under the
    /// pointer, then marquee.
    pub fn pointer_down(&mut self, point: Point, shift: bool) {
        self.local_presence.cursor = Some(CursorPosition {
            x: point.x,
            y: point.y,
        });

        let (handle_hit, centroid) = {
            let selected = self.selected_refs();
            (
                hit_test_handles(&selected, point, self.zoom),
                rotation_centroid(selected.iter().copied()),
            )
        };
        match handle_hit {
            Some(HandleKind::Rotate) => {
                self.gesture = Gesture::Rotating {
                    centroid,
                    last_pointer: point,
                    accumulated: 0.0,
                };
                return;
            }
            Some(HandleKind::Resize(direction)) => {
                let captured =
                    capture_geometry(self.document.elements(), self.selection.iter().copied());
                self.gesture = Gesture::Resizing {
                    direction,
                    origin: point,
                    current: point,
                    captured,
                };
                return;
            }
            None => {}
        }

        if let Some(kind) = self.tool.element_kind() {
            self.begin_drawing(kind, point);
            return;
        }

        let tolerance = POINTER_HIT_TOLERANCE / self.zoom;
        match element_at_point(self.document.elements().values(), point, tolerance) {
            Some(id) => {
                if !self.selection.contains(&id) {
                    if !shift {
                        self.selection.clear();
                    }
                    self.selection.insert(id);
                    self.sync_selection_flags();
                }
                let captured =
                    capture_geometry(self.document.elements(), self.selection.iter().copied());
                self.gesture = Gesture::Translating {
                    origin: point,
                    current: point,
                    captured,
                };
            }
            None => {
                if !shift {
                    self.selection.clear();
                    self.sync_selection_flags();
                }
                self.gesture = Gesture::MarqueeSelecting {
                    origin: point,
                    current: point,
                    additive: shift,
                };
            }
        }
    }

    /// Advance the active gesture.
    pub fn pointer_move(&mut self, point: Point) {
        self.local_presence.cursor = Some(CursorPosition {
            x: point.x,
            y: point.y,
        });

        match &mut self.gesture {
            Gesture::Drawing { start, .. } => {
                if let Some(draft) = &mut self.draft {
                    update_draft(draft, *start, point);
                    self.local_presence.current_element = Some(draft.clone());
                }
            }
            Gesture::Rotating {
                centroid,
                last_pointer,
                accumulated,
            } => {
                let delta = pointer_angle_delta(*centroid, *last_pointer, point);
                // Below the jitter threshold the pointer sample is ignored
                // entirely, so tiny wobbles accumulate until they matter.
                if delta.abs() >= ROTATION_THRESHOLD {
                    *accumulated += delta;
                    *last_pointer = point;
                }
            }
            Gesture::Resizing { current, .. }
            | Gesture::Translating { current, .. }
            | Gesture::MarqueeSelecting { current, .. } => {
                *current = point;
            }
            Gesture::Idle => {}
        }
        self.queue_presence();
    }

    /// Finish the active gesture, committing at most one document edit.
    pub fn pointer_up(&mut self, point: Point, shift: bool) {
        let gesture = std::mem::take(&mut self.gesture);
        match gesture {
            Gesture::Idle => {}
            Gesture::Drawing { start, .. } => self.commit_draft(start, point),
            Gesture::Resizing {
                direction,
                origin,
                captured,
                ..
            } => {
                let delta = point - origin;
                let moved: Vec<ElementId> = captured.keys().copied().collect();
                let committed = self.document.apply(|elements, connections| {
                    transform::apply_resize(elements, &captured, direction, delta);
                    transform::reanchor_connected(elements, connections, &moved);
                });
                self.after_commit(committed);
            }
            Gesture::Translating {
                origin, captured, ..
            } => {
                let delta = point - origin;
                let moved: Vec<ElementId> = captured.keys().copied().collect();
                let committed = self.document.apply(|elements, connections| {
                    transform::apply_translation(elements, &captured, delta);
                    transform::reanchor_connected(elements, connections, &moved);
                });
                self.after_commit(committed);
            }
            Gesture::Rotating {
                centroid,
                accumulated,
                ..
            } => {
                let ids: Vec<ElementId> = self.selection.iter().copied().collect();
                if accumulated != 0.0 {
                    let committed = self.document.apply(|elements, connections| {
                        transform::apply_rotation_increment(
                            elements,
                            &ids,
                            centroid,
                            accumulated,
                        );
                        transform::reanchor_connected(elements, connections, &ids);
                    });
                    self.after_commit(committed);
                }
            }
            Gesture::MarqueeSelecting {
                origin, additive, ..
            } => {
                let rect = Rect::from_points(origin, point);
                let hit = elements_in_rect(self.document.elements().values(), rect);
                if !additive && !shift {
                    self.selection.clear();
                }
                self.selection.extend(hit);
                self.sync_selection_flags();
            }
        }
        self.queue_presence();
    }

    // --- Drawing ---

    fn begin_drawing(&mut self, kind: ElementKind, start: Point) {
        let draft = match kind {
            ElementKind::Freedraw => Element::new_freedraw(vec![start]),
            k if k.is_linear() => Element::new_linear(k, start, start),
            k => Element::new(k, start.x, start.y, 0.0, 0.0),
        };
        self.gesture = Gesture::Drawing {
            element_id: draft.id,
            start,
        };
        self.local_presence.is_drawing = true;
        self.local_presence.current_element = Some(draft.clone());
        self.draft = Some(draft);
        self.queue_presence();
    }

    fn commit_draft(&mut self, start: Point, point: Point) {
        let Some(mut draft) = self.draft.take() else {
            return;
        };
        update_draft(&mut draft, start, point);
        finalize_draft_bounds(&mut draft);

        // Arrows dropped onto shapes get a connection record binding them.
        let connection = if draft.kind == ElementKind::Arrow {
            self.bind_arrow(&mut draft)
        } else {
            None
        };

        let draft_id = draft.id;
        let committed = self.document.apply(move |elements, connections| {
            if let Some((conn, touched)) = connection {
                for id in touched {
                    if let Some(shape) = elements.get_mut(&id) {
                        shape.connection_ids.push(conn.id);
                    }
                }
                connections.insert(conn.id, conn);
            }
            elements.insert(draft.id, draft);
        });
        self.after_commit(committed);

        self.selection.clear();
        self.selection.insert(draft_id);
        self.sync_selection_flags();

        self.local_presence.is_drawing = false;
        self.local_presence.current_element = None;
        self.queue_presence();
    }

    /// Attach an arrow draft to any live shapes under its endpoints.
    /// Returns the connection plus the ids of the shapes it touches.
    fn bind_arrow(&self, arrow: &mut Element) -> Option<(Connection, Vec<ElementId>)> {
        let tolerance = POINTER_HIT_TOLERANCE / self.zoom;
        let shape_under = |point: Option<Point>| {
            point.and_then(|p| {
                element_at_point(
                    self.document
                        .elements()
                        .values()
                        .filter(|e| !e.kind.is_linear() && e.kind != ElementKind::Freedraw),
                    p,
                    tolerance,
                )
            })
        };

        let start_hit = shape_under(arrow.start_point);
        let end_hit = shape_under(arrow.end_point);
        if start_hit.is_none() && end_hit.is_none() {
            return None;
        }

        let mut connection = Connection::new(arrow.id);
        let mut touched = Vec::new();
        if let (Some(id), Some(anchor)) = (start_hit, arrow.start_point) {
            if let Some(shape) = self.document.get_element(id) {
                connection.attach_start(shape, anchor);
                arrow.start_side = Some(side_of(shape, anchor));
                touched.push(id);
            }
        }
        if let (Some(id), Some(anchor)) = (end_hit, arrow.end_point) {
            if let Some(shape) = self.document.get_element(id) {
                connection.attach_end(shape, anchor);
                arrow.end_side = Some(side_of(shape, anchor));
                touched.push(id);
            }
        }
        arrow.connection_id = Some(connection.id);
        Some((connection, touched))
    }

    // --- Editing commands ---

    /// Tombstone every selected element, plus the connection records of any
    /// selected arrows.
    pub fn delete_selected(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        let doomed: HashSet<ElementId> = self.selection.drain().collect();
        let committed = self.document.apply(|elements, connections| {
            connections.retain(|_, c| !doomed.contains(&c.arrow_element_id));
            elements.retain(|id, _| !doomed.contains(id));
        });
        self.sync_selection_flags();
        self.after_commit(committed);
    }

    pub fn undo(&mut self) -> bool {
        let done = self.document.undo();
        // Restored state is broadcast as-is; the stamps inside it already
        // say everything the merge resolver needs.
        self.after_commit(done);
        done
    }

    pub fn redo(&mut self) -> bool {
        let done = self.document.redo();
        self.after_commit(done);
        done
    }

    pub fn can_undo(&self) -> bool {
        self.document.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.document.can_redo()
    }

    // --- Remote input ---

    /// Feed one message received from the mesh.
    pub fn handle_mesh_message(&mut self, message: MeshMessage) {
        match message {
            MeshMessage::StateSync {
                elements,
                connections,
            } => {
                if self.document.merge_remote(&elements, &connections) {
                    // Merged-in edits are persisted but not re-broadcast;
                    // the sender already told everyone.
                    self.needs_save = true;
                    self.selection
                        .retain(|id| self.document.get_element(*id).is_some_and(|e| !e.is_deleted));
                    self.sync_selection_flags();
                }
            }
            MeshMessage::PeerSync { presence } => {
                if presence.peer_id != self.local_presence.peer_id {
                    self.presence.update(presence);
                }
            }
        }
    }

    /// Forget a departed peer's presence.
    pub fn peer_left(&mut self, peer_id: &str) {
        self.presence.remove(peer_id);
    }

    // --- Output queues ---

    /// Drain queued outgoing mesh messages.
    pub fn take_outgoing(&mut self) -> Vec<MeshMessage> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn has_outgoing(&self) -> bool {
        !self.outgoing.is_empty()
    }

    /// True once since the last committed or merged change; the caller
    /// persists the current state in response.
    pub fn take_save_request(&mut self) -> bool {
        std::mem::take(&mut self.needs_save)
    }

    // --- Internals ---

    fn selected_refs(&self) -> Vec<&Element> {
        self.selection
            .iter()
            .filter_map(|id| self.document.get_element(*id))
            .collect()
    }

    fn sync_selection_flags(&mut self) {
        self.document.set_selected_flags(&self.selection);
        self.local_presence.selected_element_ids = self.selection.iter().copied().collect();
    }

    fn after_commit(&mut self, committed: bool) {
        if !committed {
            return;
        }
        let state = self.document.state();
        self.outgoing.push(MeshMessage::StateSync {
            elements: state.elements,
            connections: state.connections,
        });
        self.needs_save = true;
    }

    fn queue_presence(&mut self) {
        if self.local_presence.peer_id.is_empty() {
            return;
        }
        self.local_presence.version += 1;
        self.outgoing.push(MeshMessage::PeerSync {
            presence: self.local_presence.clone(),
        });
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Stretch a draft element from the gesture origin toward the pointer.
fn update_draft(draft: &mut Element, start: Point, point: Point) {
    match draft.kind {
        ElementKind::Freedraw => draft.points.push(point),
        ElementKind::Line | ElementKind::Arrow => {
            draft.end_point = Some(point);
            if draft.kind == ElementKind::Arrow {
                draft.direction = Some(ArrowDirection::between(start, point));
            }
        }
        _ => {
            // Box anchored at the gesture origin, growing toward the
            // pointer in any quadrant.
            let rect = Rect::from_points(start, point);
            draft.x = rect.x0;
            draft.y = rect.y0;
            draft.width = rect.width();
            draft.height = rect.height();
        }
    }
}

/// Reconcile the stored box with derived geometry before commit.
fn finalize_draft_bounds(draft: &mut Element) {
    let bounds = draft.bounds();
    draft.x = bounds.x0;
    draft.y = bounds.y0;
    draft.width = bounds.width();
    draft.height = bounds.height();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw_rect(session: &mut Session, from: Point, to: Point) -> ElementId {
        session.set_tool(Tool::Rectangle);
        session.pointer_down(from, false);
        session.pointer_move(to);
        session.pointer_up(to, false);
        session.set_tool(Tool::Select);
        *session.selected_element_ids().iter().next().unwrap()
    }

    #[test]
    fn test_draw_commits_and_queues_broadcast() {
        let mut session = Session::new();
        let id = draw_rect(
            &mut session,
            Point::new(10.0, 10.0),
            Point::new(110.0, 60.0),
        );

        let element = session.document().get_element(id).unwrap();
        assert_eq!(element.kind, ElementKind::Rectangle);
        assert_eq!(element.width, 100.0);
        assert_eq!(element.height, 50.0);

        assert!(session.take_save_request());
        let outgoing = session.take_outgoing();
        assert!(outgoing
            .iter()
            .any(|m| matches!(m, MeshMessage::StateSync { .. })));
    }

    #[test]
    fn test_translate_gesture_single_undo_step() {
        let mut session = Session::new();
        let id = draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        session.take_outgoing();

        session.pointer_down(Point::new(50.0, 50.0), false);
        session.pointer_move(Point::new(80.0, 50.0));
        session.pointer_move(Point::new(120.0, 90.0));
        session.pointer_up(Point::new(150.0, 110.0), false);

        let element = session.document().get_element(id).unwrap();
        assert_eq!(element.x, 100.0);
        assert_eq!(element.y, 60.0);

        // One gesture, one history entry: a single undo restores the
        // pre-drag position.
        assert!(session.undo());
        let element = session.document().get_element(id).unwrap();
        assert_eq!(element.x, 0.0);
    }

    #[test]
    fn test_marquee_selects_overlapping() {
        let mut session = Session::new();
        let a = draw_rect(&mut session, Point::new(10.0, 10.0), Point::new(40.0, 40.0));
        let b = draw_rect(&mut session, Point::new(60.0, 10.0), Point::new(90.0, 40.0));
        let far = draw_rect(
            &mut session,
            Point::new(500.0, 500.0),
            Point::new(540.0, 540.0),
        );

        session.pointer_down(Point::new(200.0, 200.0), false);
        session.pointer_move(Point::new(0.0, 0.0));
        session.pointer_up(Point::new(0.0, 0.0), false);

        let selected = session.selected_element_ids();
        assert!(selected.contains(&a));
        assert!(selected.contains(&b));
        assert!(!selected.contains(&far));
    }

    #[test]
    fn test_delete_selected_tombstones() {
        let mut session = Session::new();
        let id = draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0));
        session.delete_selected();

        let element = session.document().get_element(id).unwrap();
        assert!(element.is_deleted);
        assert!(session.selected_element_ids().is_empty());
    }

    #[test]
    fn test_arrow_between_shapes_creates_connection() {
        let mut session = Session::new();
        let a = draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(100.0, 100.0));
        let b = draw_rect(
            &mut session,
            Point::new(300.0, 0.0),
            Point::new(400.0, 100.0),
        );

        session.set_tool(Tool::Arrow);
        session.pointer_down(Point::new(100.0, 50.0), false);
        session.pointer_up(Point::new(300.0, 50.0), false);

        assert_eq!(session.document().connections().len(), 1);
        let connection = session.document().connections().values().next().unwrap();
        assert_eq!(connection.start_element_id, Some(a));
        assert_eq!(connection.end_element_id, Some(b));
        assert!(connection.start_angle.is_some());
        assert!(connection.end_angle.is_some());

        let arrow = session
            .document()
            .get_element(connection.arrow_element_id)
            .unwrap();
        assert_eq!(arrow.connection_id, Some(connection.id));
        assert!(session
            .document()
            .get_element(a)
            .unwrap()
            .connection_ids
            .contains(&connection.id));
    }

    #[test]
    fn test_remote_state_sync_merges_without_history() {
        let mut session = Session::new();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0));

        let mut remote = Session::new();
        let remote_id = draw_rect(&mut remote, Point::new(90.0, 0.0), Point::new(140.0, 50.0));
        let state = remote.state();

        session.handle_mesh_message(MeshMessage::StateSync {
            elements: state.elements,
            connections: state.connections,
        });

        assert!(session.document().get_element(remote_id).is_some());
        assert!(session.take_save_request());
        // Merging is not a local edit: only the draw is undoable.
        assert!(session.undo());
        assert!(!session.can_undo());
    }

    #[test]
    fn test_remote_delete_drops_from_selection() {
        let mut session = Session::new();
        let id = draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(50.0, 50.0));
        assert!(session.selected_element_ids().contains(&id));

        let mut state = session.state();
        let element = state.elements.get_mut(&id).unwrap();
        element.is_deleted = true;
        element.version += 1;

        session.handle_mesh_message(MeshMessage::StateSync {
            elements: state.elements,
            connections: state.connections,
        });
        assert!(!session.selected_element_ids().contains(&id));
    }

    #[test]
    fn test_peer_sync_updates_presence() {
        let mut session = Session::new();
        session.set_local_identity(
            "me".to_string(),
            "anon-0".to_string(),
            "#000000".to_string(),
        );

        let them = PeerPresence::new(
            "them".to_string(),
            "anon-1".to_string(),
            "#ff5722".to_string(),
        );
        session.handle_mesh_message(MeshMessage::PeerSync { presence: them });
        assert_eq!(session.peer_states().count(), 1);

        // Echoes of our own presence are ignored.
        let me = PeerPresence::new(
            "me".to_string(),
            "anon-0".to_string(),
            "#000000".to_string(),
        );
        session.handle_mesh_message(MeshMessage::PeerSync { presence: me });
        assert_eq!(session.peer_states().count(), 1);

        session.peer_left("them");
        assert_eq!(session.peer_states().count(), 0);
    }

    #[test]
    fn test_resize_via_handle_floors_at_minimum() {
        let mut session = Session::new();
        let id = draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(100.0, 100.0));

        // Grab the east handle and drag far past the west edge.
        session.pointer_down(Point::new(100.0, 50.0), false);
        assert!(matches!(session.gesture(), Gesture::Resizing { .. }));
        session.pointer_up(Point::new(-500.0, 50.0), false);

        let element = session.document().get_element(id).unwrap();
        assert_eq!(element.width, crate::selection::MIN_ELEMENT_SIZE);
    }

    #[test]
    fn test_handles_win_over_creation_tool() {
        let mut session = Session::new();
        draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(100.0, 100.0));

        // The still-selected rectangle's rotation handle sits above its
        // top-center. A creation tool must not start drawing there.
        session.set_tool(Tool::Ellipse);
        session.pointer_down(Point::new(50.0, -25.0), false);
        assert!(matches!(session.gesture(), Gesture::Rotating { .. }));
        assert!(session.draft().is_none());
        session.pointer_up(Point::new(50.0, -25.0), false);

        // Away from any handle the tool draws as usual.
        session.pointer_down(Point::new(300.0, 300.0), false);
        assert!(matches!(session.gesture(), Gesture::Drawing { .. }));
    }

    #[test]
    fn test_preview_tracks_pointer_mid_drag() {
        let mut session = Session::new();
        let id = draw_rect(&mut session, Point::new(0.0, 0.0), Point::new(100.0, 100.0));

        session.pointer_down(Point::new(50.0, 50.0), false);
        session.pointer_move(Point::new(80.0, 70.0));

        match session.gesture() {
            Gesture::Translating { current, .. } => {
                assert_eq!(*current, Point::new(80.0, 70.0));
            }
            other => panic!("expected translation, got {other:?}"),
        }
        // The document holds the pre-drag position until the gesture
        // commits; the preview already shows the dragged one.
        assert_eq!(session.document().get_element(id).unwrap().x, 0.0);
        let preview = session.preview_state();
        assert_eq!(preview.elements[&id].x, 30.0);
        assert_eq!(preview.elements[&id].y, 20.0);

        session.pointer_up(Point::new(80.0, 70.0), false);
        assert_eq!(session.document().get_element(id).unwrap().x, 30.0);
    }

    #[test]
    fn test_presence_not_queued_without_identity() {
        let mut session = Session::new();
        session.pointer_move(Point::new(5.0, 5.0));
        assert!(!session.has_outgoing());

        session.set_local_identity("me".to_string(), "n".to_string(), "c".to_string());
        session.pointer_move(Point::new(6.0, 6.0));
        let outgoing = session.take_outgoing();
        assert!(matches!(outgoing[0], MeshMessage::PeerSync { .. }));
    }
}
