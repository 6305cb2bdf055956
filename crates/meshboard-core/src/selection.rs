//! Selection handles, hit testing and marquee selection.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

use crate::element::{Element, ElementId};

/// Handle size in screen pixels.
pub const HANDLE_SIZE: f64 = 16.0;
/// Handle hit tolerance in screen pixels (handle size × 1.5); divide by
/// the camera zoom so handles stay easy to grab when zoomed out.
pub const HANDLE_HIT_TOLERANCE: f64 = 24.0;
/// Distance from the selection's top edge to the rotation handle.
pub const ROTATE_HANDLE_OFFSET: f64 = 25.0;
/// Minimum element width/height after a resize.
pub const MIN_ELEMENT_SIZE: f64 = 5.0;

/// The eight resize directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeDirection {
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
    Nw,
}

impl ResizeDirection {
    pub const ALL: [ResizeDirection; 8] = [
        ResizeDirection::Nw,
        ResizeDirection::N,
        ResizeDirection::Ne,
        ResizeDirection::E,
        ResizeDirection::Se,
        ResizeDirection::S,
        ResizeDirection::Sw,
        ResizeDirection::W,
    ];

    /// Unit offset of this handle from the box center, in half-extents.
    fn unit_offset(self) -> (f64, f64) {
        match self {
            ResizeDirection::Nw => (-1.0, -1.0),
            ResizeDirection::N => (0.0, -1.0),
            ResizeDirection::Ne => (1.0, -1.0),
            ResizeDirection::E => (1.0, 0.0),
            ResizeDirection::Se => (1.0, 1.0),
            ResizeDirection::S => (0.0, 1.0),
            ResizeDirection::Sw => (-1.0, 1.0),
            ResizeDirection::W => (-1.0, 0.0),
        }
    }
}

/// Type of selection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Resize(ResizeDirection),
    Rotate,
}

/// A selection handle with its position in world coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub position: Point,
    pub kind: HandleKind,
}

impl Handle {
    pub fn new(position: Point, kind: HandleKind) -> Self {
        Self { position, kind }
    }

    /// Check if a point (in world coordinates) hits this handle.
    /// `tolerance` should be adjusted for camera zoom.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        let dx = point.x - self.position.x;
        let dy = point.y - self.position.y;
        dx * dx + dy * dy <= tolerance * tolerance
    }
}

/// Rotate a point around a center.
pub fn rotate_around(point: Point, center: Point, angle: f64) -> Point {
    let cos = angle.cos();
    let sin = angle.sin();
    let dx = point.x - center.x;
    let dy = point.y - center.y;
    Point::new(
        center.x + dx * cos - dy * sin,
        center.y + dx * sin + dy * cos,
    )
}

/// Corners of an element's box, rotated by its angle around its center.
pub fn rotated_corners(element: &Element) -> [Point; 4] {
    let b = element.bounds();
    let c = b.center();
    [
        rotate_around(Point::new(b.x0, b.y0), c, element.angle),
        rotate_around(Point::new(b.x1, b.y0), c, element.angle),
        rotate_around(Point::new(b.x1, b.y1), c, element.angle),
        rotate_around(Point::new(b.x0, b.y1), c, element.angle),
    ]
}

/// Axis-aligned bounding box of a set of elements (None if empty).
pub fn group_bounds<'a, I>(elements: I) -> Option<Rect>
where
    I: IntoIterator<Item = &'a Element>,
{
    let mut result: Option<Rect> = None;
    for element in elements {
        let bounds = element.bounds();
        result = Some(match result {
            Some(r) => r.union(bounds),
            None => bounds,
        });
    }
    result
}

/// Handles for a single selected element. Resize handles sit on the
/// rotated box; the rotation handle floats above the rotated top-center.
pub fn element_handles(element: &Element) -> Vec<Handle> {
    let bounds = element.bounds();
    let center = bounds.center();
    let half_w = bounds.width() / 2.0;
    let half_h = bounds.height() / 2.0;

    let mut handles: Vec<Handle> = ResizeDirection::ALL
        .iter()
        .map(|&dir| {
            let (ux, uy) = dir.unit_offset();
            let local = Point::new(center.x + ux * half_w, center.y + uy * half_h);
            Handle::new(
                rotate_around(local, center, element.angle),
                HandleKind::Resize(dir),
            )
        })
        .collect();

    let top = Point::new(center.x, center.y - half_h - ROTATE_HANDLE_OFFSET);
    handles.push(Handle::new(
        rotate_around(top, center, element.angle),
        HandleKind::Rotate,
    ));
    handles
}

/// Handles for a multi-selection: the group's axis-aligned bounding box is
/// itself never rotated, so handles sit on the plain AABB.
pub fn group_handles(bounds: Rect) -> Vec<Handle> {
    let center = bounds.center();
    let half_w = bounds.width() / 2.0;
    let half_h = bounds.height() / 2.0;

    let mut handles: Vec<Handle> = ResizeDirection::ALL
        .iter()
        .map(|&dir| {
            let (ux, uy) = dir.unit_offset();
            Handle::new(
                Point::new(center.x + ux * half_w, center.y + uy * half_h),
                HandleKind::Resize(dir),
            )
        })
        .collect();

    handles.push(Handle::new(
        Point::new(center.x, bounds.y0 - ROTATE_HANDLE_OFFSET),
        HandleKind::Rotate,
    ));
    handles
}

/// Handles for the current selection (single element or group).
pub fn selection_handles(selected: &[&Element]) -> Vec<Handle> {
    match selected {
        [] => Vec::new(),
        [single] => element_handles(single),
        many => group_bounds(many.iter().copied())
            .map(group_handles)
            .unwrap_or_default(),
    }
}

/// Find which handle (if any) is hit at the given point. The rotation
/// handle takes priority where it overlaps a resize handle's tolerance.
pub fn hit_test_handles(selected: &[&Element], point: Point, zoom: f64) -> Option<HandleKind> {
    let tolerance = HANDLE_HIT_TOLERANCE / zoom.max(f64::EPSILON);
    let handles = selection_handles(selected);
    handles
        .iter()
        .find(|h| h.kind == HandleKind::Rotate && h.hit_test(point, tolerance))
        .or_else(|| handles.iter().find(|h| h.hit_test(point, tolerance)))
        .map(|h| h.kind)
}

/// Topmost live element under a point, if any.
pub fn element_at_point<'a, I>(elements: I, point: Point, tolerance: f64) -> Option<ElementId>
where
    I: IntoIterator<Item = &'a Element>,
{
    elements
        .into_iter()
        .filter(|e| !e.is_deleted && e.hit_test(point, tolerance))
        .map(|e| e.id)
        .last()
}

/// Live elements whose bounding box overlaps the marquee rectangle.
/// Open intersection: boxes that merely touch an edge do not count.
pub fn elements_in_rect<'a, I>(elements: I, rect: Rect) -> Vec<ElementId>
where
    I: IntoIterator<Item = &'a Element>,
{
    elements
        .into_iter()
        .filter(|e| !e.is_deleted && rect.intersect(e.bounds()).area() > 0.0)
        .map(|e| e.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;

    #[test]
    fn test_single_selection_handle_count() {
        let rect = Element::new(ElementKind::Rectangle, 0.0, 0.0, 100.0, 50.0);
        let handles = element_handles(&rect);
        // 8 resize directions + 1 rotation handle
        assert_eq!(handles.len(), 9);
        assert!(matches!(handles[8].kind, HandleKind::Rotate));
    }

    #[test]
    fn test_rotation_handle_follows_angle() {
        let mut rect = Element::new(ElementKind::Rectangle, 0.0, 0.0, 100.0, 100.0);
        let upright = element_handles(&rect);
        let top = upright.last().unwrap().position;
        assert!((top.x - 50.0).abs() < 1e-9);
        assert!((top.y - (-ROTATE_HANDLE_OFFSET)).abs() < 1e-9);

        // Quarter turn puts the handle to the right of center.
        rect.angle = std::f64::consts::FRAC_PI_2;
        let turned = element_handles(&rect);
        let side = turned.last().unwrap().position;
        assert!((side.x - (50.0 + 50.0 + ROTATE_HANDLE_OFFSET)).abs() < 1e-9);
        assert!((side.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_group_handles_unrotated() {
        let mut a = Element::new(ElementKind::Rectangle, 0.0, 0.0, 50.0, 50.0);
        a.angle = 1.0;
        let b = Element::new(ElementKind::Ellipse, 100.0, 100.0, 50.0, 50.0);
        let handles = selection_handles(&[&a, &b]);
        assert_eq!(handles.len(), 9);
        // Rotation handle sits above the unrotated group AABB top-center.
        let rotate = handles.last().unwrap();
        assert!((rotate.position.x - 75.0).abs() < 1.0);
        assert!(rotate.position.y < 0.0);
    }

    #[test]
    fn test_handle_tolerance_scales_with_zoom() {
        let rect = Element::new(ElementKind::Rectangle, 0.0, 0.0, 100.0, 100.0);
        // Zoomed out, a point well away from the corner still grabs it.
        let near_corner = Point::new(-40.0, -40.0);
        assert!(hit_test_handles(&[&rect], near_corner, 0.4).is_some());
        assert!(hit_test_handles(&[&rect], near_corner, 2.0).is_none());
    }

    #[test]
    fn test_marquee_open_intersection() {
        let inside = Element::new(ElementKind::Rectangle, 10.0, 10.0, 20.0, 20.0);
        let touching = Element::new(ElementKind::Rectangle, 100.0, 0.0, 20.0, 20.0);
        let outside = Element::new(ElementKind::Rectangle, 500.0, 500.0, 20.0, 20.0);
        let marquee = Rect::new(0.0, 0.0, 100.0, 100.0);

        let hits = elements_in_rect([&inside, &touching, &outside], marquee);
        assert_eq!(hits, vec![inside.id]);
    }

    #[test]
    fn test_marquee_three_rectangles_one_circle() {
        // Three overlapping rectangles inside the marquee, one ellipse out.
        let r1 = Element::new(ElementKind::Rectangle, 10.0, 10.0, 40.0, 40.0);
        let r2 = Element::new(ElementKind::Rectangle, 30.0, 30.0, 40.0, 40.0);
        let r3 = Element::new(ElementKind::Rectangle, 50.0, 20.0, 40.0, 40.0);
        let circle = Element::new(ElementKind::Ellipse, 300.0, 300.0, 40.0, 40.0);
        let marquee = Rect::new(0.0, 0.0, 120.0, 120.0);

        let hits = elements_in_rect([&r1, &r2, &r3, &circle], marquee);
        assert_eq!(hits.len(), 3);
        assert!(!hits.contains(&circle.id));
    }

    #[test]
    fn test_tombstones_are_not_selectable() {
        let mut rect = Element::new(ElementKind::Rectangle, 0.0, 0.0, 50.0, 50.0);
        rect.is_deleted = true;
        assert!(element_at_point([&rect], Point::new(25.0, 25.0), 0.0).is_none());
        assert!(elements_in_rect([&rect], Rect::new(-10.0, -10.0, 100.0, 100.0)).is_empty());
    }
}
