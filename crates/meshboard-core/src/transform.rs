//! Transforms over selected elements: resize, rotate, translate, plus the
//! tagged gesture state machine driving them.
//!
//! A single continuous pointer gesture is in exactly one mode; the tagged
//! variants carry the captured pre-gesture geometry, which makes invalid
//! flag combinations unrepresentable.

use std::collections::HashMap;

use kurbo::{Point, Vec2};

use crate::connector::reanchor_arrow;
use crate::element::{Connection, Element, ElementId, ElementKind};
use crate::selection::{rotated_corners, ResizeDirection, MIN_ELEMENT_SIZE};

/// Minimum incremental rotation applied per pointer move, to damp jitter.
pub const ROTATION_THRESHOLD: f64 = 0.01;

/// Geometry of one element captured at gesture start.
#[derive(Debug, Clone)]
pub struct CapturedGeometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub start_point: Option<Point>,
    pub end_point: Option<Point>,
    pub points: Vec<Point>,
}

impl CapturedGeometry {
    pub fn of(element: &Element) -> Self {
        Self {
            x: element.x,
            y: element.y,
            width: element.width,
            height: element.height,
            start_point: element.start_point,
            end_point: element.end_point,
            points: element.points.clone(),
        }
    }
}

/// State of a single continuous pointer gesture.
#[derive(Debug, Clone, Default)]
pub enum Gesture {
    #[default]
    Idle,
    /// Creating a new element; its id is already in the working set.
    Drawing { element_id: ElementId, start: Point },
    Resizing {
        direction: ResizeDirection,
        origin: Point,
        /// Latest pointer position; `current - origin` is the live delta.
        current: Point,
        captured: HashMap<ElementId, CapturedGeometry>,
    },
    Rotating {
        /// Centroid of the rotated corners of every selected element,
        /// fixed at gesture start.
        centroid: Point,
        /// Pointer position of the last accepted increment.
        last_pointer: Point,
        /// Total angle accumulated so far, applied once at gesture end.
        accumulated: f64,
    },
    Translating {
        origin: Point,
        /// Latest pointer position; `current - origin` is the live delta.
        current: Point,
        captured: HashMap<ElementId, CapturedGeometry>,
    },
    MarqueeSelecting {
        origin: Point,
        current: Point,
        /// Shift held: union with the pre-existing selection.
        additive: bool,
    },
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }
}

/// Capture the pre-gesture geometry of a set of elements.
pub fn capture_geometry(
    elements: &HashMap<ElementId, Element>,
    ids: impl IntoIterator<Item = ElementId>,
) -> HashMap<ElementId, CapturedGeometry> {
    ids.into_iter()
        .filter_map(|id| elements.get(&id).map(|e| (id, CapturedGeometry::of(e))))
        .collect()
}

/// Resize one element from its captured box by a signed pointer delta.
///
/// Each direction moves only its own edges (`nw` shifts the origin and
/// shrinks both dimensions, `e` only grows the width). Width and height
/// are clamped to a 5-unit floor with the opposite edge held fixed.
pub fn resize_element(
    element: &mut Element,
    captured: &CapturedGeometry,
    direction: ResizeDirection,
    delta: Vec2,
) {
    let (mut x, mut y) = (captured.x, captured.y);
    let (mut width, mut height) = (captured.width, captured.height);

    match direction {
        ResizeDirection::E => width += delta.x,
        ResizeDirection::W => {
            x += delta.x;
            width -= delta.x;
        }
        ResizeDirection::S => height += delta.y,
        ResizeDirection::N => {
            y += delta.y;
            height -= delta.y;
        }
        ResizeDirection::Se => {
            width += delta.x;
            height += delta.y;
        }
        ResizeDirection::Sw => {
            x += delta.x;
            width -= delta.x;
            height += delta.y;
        }
        ResizeDirection::Ne => {
            width += delta.x;
            y += delta.y;
            height -= delta.y;
        }
        ResizeDirection::Nw => {
            x += delta.x;
            width -= delta.x;
            y += delta.y;
            height -= delta.y;
        }
    }

    if width < MIN_ELEMENT_SIZE {
        if matches!(
            direction,
            ResizeDirection::W | ResizeDirection::Nw | ResizeDirection::Sw
        ) {
            // Keep the right edge fixed while the width bottoms out.
            x = captured.x + captured.width - MIN_ELEMENT_SIZE;
        }
        width = MIN_ELEMENT_SIZE;
    }
    if height < MIN_ELEMENT_SIZE {
        if matches!(
            direction,
            ResizeDirection::N | ResizeDirection::Ne | ResizeDirection::Nw
        ) {
            y = captured.y + captured.height - MIN_ELEMENT_SIZE;
        }
        height = MIN_ELEMENT_SIZE;
    }

    element.x = x;
    element.y = y;
    element.width = width;
    element.height = height;
}

/// Resize every captured element by the same raw delta applied to its own
/// box (no proportional scaling of the group).
pub fn apply_resize(
    elements: &mut HashMap<ElementId, Element>,
    captured: &HashMap<ElementId, CapturedGeometry>,
    direction: ResizeDirection,
    delta: Vec2,
) {
    for (id, geometry) in captured {
        if let Some(element) = elements.get_mut(id) {
            resize_element(element, geometry, direction, delta);
        }
    }
}

/// Translate one element from its captured geometry by a raw delta,
/// carrying endpoints and the freedraw point list along uniformly.
pub fn translate_element(element: &mut Element, captured: &CapturedGeometry, delta: Vec2) {
    element.x = captured.x + delta.x;
    element.y = captured.y + delta.y;
    element.start_point = captured
        .start_point
        .map(|p| Point::new(p.x + delta.x, p.y + delta.y));
    element.end_point = captured
        .end_point
        .map(|p| Point::new(p.x + delta.x, p.y + delta.y));
    if element.kind == ElementKind::Freedraw {
        element.points = captured
            .points
            .iter()
            .map(|p| Point::new(p.x + delta.x, p.y + delta.y))
            .collect();
    }
}

/// Translate every captured element by the same raw delta.
pub fn apply_translation(
    elements: &mut HashMap<ElementId, Element>,
    captured: &HashMap<ElementId, CapturedGeometry>,
    delta: Vec2,
) {
    for (id, geometry) in captured {
        if let Some(element) = elements.get_mut(id) {
            translate_element(element, geometry, delta);
        }
    }
}

/// Centroid of the rotated corners of all given elements.
pub fn rotation_centroid<'a, I>(elements: I) -> Point
where
    I: IntoIterator<Item = &'a Element>,
{
    let mut sum = Vec2::ZERO;
    let mut count = 0usize;
    for element in elements {
        for corner in rotated_corners(element) {
            sum += corner.to_vec2();
            count += 1;
        }
    }
    if count == 0 {
        Point::ZERO
    } else {
        (sum / count as f64).to_point()
    }
}

/// Incremental angle between two pointer positions as seen from a pivot.
pub fn pointer_angle_delta(pivot: Point, previous: Point, current: Point) -> f64 {
    let a0 = (previous.y - pivot.y).atan2(previous.x - pivot.x);
    let a1 = (current.y - pivot.y).atan2(current.x - pivot.x);
    let mut delta = a1 - a0;
    // Shortest arc.
    if delta > std::f64::consts::PI {
        delta -= crate::element::TAU;
    } else if delta < -std::f64::consts::PI {
        delta += crate::element::TAU;
    }
    delta
}

/// Rotate every selected element by an angle increment around the group
/// centroid: the element's own angle accumulates (mod 2π) and its center
/// orbits the centroid.
pub fn apply_rotation_increment(
    elements: &mut HashMap<ElementId, Element>,
    ids: &[ElementId],
    centroid: Point,
    increment: f64,
) {
    for id in ids {
        if let Some(element) = elements.get_mut(id) {
            element.set_angle(element.angle + increment);
            let center = element.center();
            let new_center = crate::selection::rotate_around(center, centroid, increment);
            let dx = new_center.x - center.x;
            let dy = new_center.y - center.y;
            element.x += dx;
            element.y += dy;
            if let Some(p) = element.start_point {
                element.start_point = Some(Point::new(p.x + dx, p.y + dy));
            }
            if let Some(p) = element.end_point {
                element.end_point = Some(Point::new(p.x + dx, p.y + dy));
            }
            for p in &mut element.points {
                *p = Point::new(p.x + dx, p.y + dy);
            }
        }
    }
}

/// Re-anchor every non-selected arrow whose connection references one of
/// the moved elements, keeping attached arrows glued to their shapes.
pub fn reanchor_connected(
    elements: &mut HashMap<ElementId, Element>,
    connections: &HashMap<ElementId, Connection>,
    moved: &[ElementId],
) {
    for connection in connections.values().filter(|c| !c.is_deleted) {
        let touches_moved = connection
            .start_element_id
            .map(|id| moved.contains(&id))
            .unwrap_or(false)
            || connection
                .end_element_id
                .map(|id| moved.contains(&id))
                .unwrap_or(false);
        if !touches_moved || moved.contains(&connection.arrow_element_id) {
            continue;
        }
        let Some(arrow) = elements.get(&connection.arrow_element_id) else {
            continue;
        };
        if arrow.is_deleted {
            continue;
        }
        let mut arrow = arrow.clone();
        reanchor_arrow(&mut arrow, connection, elements);
        elements.insert(arrow.id, arrow);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{wrap_angle, Connection, TAU};

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Element {
        Element::new(ElementKind::Rectangle, x, y, w, h)
    }

    fn single_capture(element: &Element) -> HashMap<ElementId, CapturedGeometry> {
        let mut map = HashMap::new();
        map.insert(element.id, CapturedGeometry::of(element));
        map
    }

    #[test]
    fn test_resize_east_grows_width_only() {
        let mut e = rect(10.0, 10.0, 100.0, 50.0);
        let captured = CapturedGeometry::of(&e);
        resize_element(&mut e, &captured, ResizeDirection::E, Vec2::new(30.0, 99.0));
        assert_eq!((e.x, e.y), (10.0, 10.0));
        assert_eq!((e.width, e.height), (130.0, 50.0));
    }

    #[test]
    fn test_resize_nw_shifts_origin_and_shrinks() {
        let mut e = rect(10.0, 10.0, 100.0, 50.0);
        let captured = CapturedGeometry::of(&e);
        resize_element(&mut e, &captured, ResizeDirection::Nw, Vec2::new(20.0, 5.0));
        assert_eq!((e.x, e.y), (30.0, 15.0));
        assert_eq!((e.width, e.height), (80.0, 45.0));
    }

    #[test]
    fn test_resize_floor() {
        let mut e = rect(0.0, 0.0, 100.0, 100.0);
        let captured = CapturedGeometry::of(&e);
        // Drag the west edge far past the east edge.
        resize_element(&mut e, &captured, ResizeDirection::W, Vec2::new(500.0, 0.0));
        assert_eq!(e.width, MIN_ELEMENT_SIZE);
        // The right edge stays put.
        assert!((e.x + e.width - 100.0).abs() < 1e-9);

        resize_element(&mut e, &captured, ResizeDirection::Se, Vec2::new(-500.0, -500.0));
        assert_eq!(e.width, MIN_ELEMENT_SIZE);
        assert_eq!(e.height, MIN_ELEMENT_SIZE);
    }

    #[test]
    fn test_multi_resize_same_raw_delta() {
        let a = rect(0.0, 0.0, 100.0, 100.0);
        let b = rect(200.0, 0.0, 40.0, 40.0);
        let mut elements: HashMap<ElementId, Element> =
            [(a.id, a.clone()), (b.id, b.clone())].into();
        let mut captured = single_capture(&a);
        captured.extend(single_capture(&b));

        apply_resize(&mut elements, &captured, ResizeDirection::S, Vec2::new(0.0, 25.0));
        assert_eq!(elements[&a.id].height, 125.0);
        assert_eq!(elements[&b.id].height, 65.0);
    }

    #[test]
    fn test_rotation_wrap() {
        let e = rect(0.0, 0.0, 100.0, 100.0);
        let id = e.id;
        let mut elements: HashMap<ElementId, Element> = [(id, e)].into();
        let centroid = rotation_centroid(elements.values());

        // Eight increments summing to exactly 2π.
        for _ in 0..8 {
            apply_rotation_increment(&mut elements, &[id], centroid, TAU / 8.0);
        }
        assert!(wrap_angle(elements[&id].angle).abs() < 1e-9);
        // And the center comes back home.
        let center = elements[&id].center();
        assert!((center.x - 50.0).abs() < 1e-9);
        assert!((center.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_rotation_orbits_centroid() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(90.0, 90.0, 10.0, 10.0);
        let (ida, idb) = (a.id, b.id);
        let mut elements: HashMap<ElementId, Element> = [(ida, a), (idb, b)].into();
        let centroid = rotation_centroid(elements.values());

        apply_rotation_increment(&mut elements, &[ida, idb], centroid, std::f64::consts::PI);
        // A half turn swaps the two centers.
        let ca = elements[&ida].center();
        let cb = elements[&idb].center();
        assert!((ca.x - 95.0).abs() < 1e-9 && (ca.y - 95.0).abs() < 1e-9);
        assert!((cb.x - 5.0).abs() < 1e-9 && (cb.y - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_pointer_angle_delta_shortest_arc() {
        let pivot = Point::ZERO;
        let delta = pointer_angle_delta(
            pivot,
            Point::new(1.0, -0.1),
            Point::new(1.0, 0.1),
        );
        assert!(delta > 0.0 && delta < 0.5);
    }

    #[test]
    fn test_translate_carries_points() {
        let mut stroke = Element::new_freedraw(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 5.0),
        ]);
        let captured = CapturedGeometry::of(&stroke);
        translate_element(&mut stroke, &captured, Vec2::new(7.0, -3.0));
        assert_eq!(stroke.points[0], Point::new(7.0, -3.0));
        assert_eq!(stroke.points[1], Point::new(17.0, 2.0));
    }

    #[test]
    fn test_translation_reanchors_connected_arrow() {
        let shape = rect(0.0, 0.0, 100.0, 100.0);
        let mut arrow = Element::new_linear(
            ElementKind::Arrow,
            Point::new(100.0, 50.0),
            Point::new(300.0, 50.0),
        );
        let mut conn = Connection::new(arrow.id);
        conn.attach_start(&shape, Point::new(100.0, 50.0));
        arrow.connection_id = Some(conn.id);
        let (shape_id, arrow_id) = (shape.id, arrow.id);

        let mut elements: HashMap<ElementId, Element> =
            [(shape_id, shape.clone()), (arrow_id, arrow)].into();
        let connections: HashMap<ElementId, Connection> = [(conn.id, conn.clone())].into();

        let captured = capture_geometry(&elements, [shape_id]);
        apply_translation(&mut elements, &captured, Vec2::new(25.0, 40.0));
        reanchor_connected(&mut elements, &connections, &[shape_id]);

        // The bound endpoint moved by the same delta; the stored polar
        // angle is untouched.
        let start = elements[&arrow_id].start_point.unwrap();
        assert!((start.x - 125.0).abs() < 1e-9);
        assert!((start.y - 90.0).abs() < 1e-9);
        assert_eq!(connections[&conn.id].start_angle, conn.start_angle);
        // The unbound end stays where it was.
        let end = elements[&arrow_id].end_point.unwrap();
        assert_eq!(end, Point::new(300.0, 50.0));
    }
}
