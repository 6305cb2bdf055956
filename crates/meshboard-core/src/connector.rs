//! Connector anchoring and routing.
//!
//! Computes where an arrow visually attaches to the elements its connection
//! references, and the intermediate routing points that keep the stroke out
//! of the connected shape's interior. A connector whose referenced element
//! is deleted or missing falls back to its own literal stored endpoints.

use std::collections::HashMap;

use kurbo::{Point, Rect, Vec2};

use crate::element::{Connection, Element, ElementId, Side};

/// Padding between a shape's border and the rendered attachment point.
pub const ANCHOR_PADDING: f64 = 10.0;
/// Length of the escape segment emitted perpendicular to the attached side.
pub const ESCAPE_OFFSET: f64 = 15.0;
/// Arrowhead chevron size.
pub const HEAD_SIZE: f64 = 12.0;

/// Outward unit normal of a bounding-box side.
pub fn side_normal(side: Side) -> Vec2 {
    match side {
        Side::Top => Vec2::new(0.0, -1.0),
        Side::Bottom => Vec2::new(0.0, 1.0),
        Side::Left => Vec2::new(-1.0, 0.0),
        Side::Right => Vec2::new(1.0, 0.0),
    }
}

/// Anchor point on an element for a stored polar angle θ:
/// `center + (width/2·cosθ, height/2·sinθ)`.
///
/// This ellipse parameterization does not re-intersect the literal
/// rectangle edge as the aspect ratio changes, so anchors can drift
/// slightly off a resized rectangle's border. Accepted approximation;
/// other logic depends on the visible behavior, so it stays.
pub fn anchor_point(bounds: Rect, angle: f64) -> Point {
    let c = bounds.center();
    Point::new(
        c.x + bounds.width() / 2.0 * angle.cos(),
        c.y + bounds.height() / 2.0 * angle.sin(),
    )
}

/// Attachment point "outside" an element by a fixed padding.
///
/// A side fixed at creation pins the anchor to that side's midpoint;
/// otherwise the anchor is found by ray-casting from the element's center
/// toward the far endpoint and intersecting the padded bounding rectangle.
pub fn outside_point(element: &Element, side: Option<Side>, far: Point) -> Point {
    let bounds = element.bounds();
    let c = bounds.center();
    if let Some(side) = side {
        let n = side_normal(side);
        return Point::new(
            c.x + n.x * (bounds.width() / 2.0 + ANCHOR_PADDING),
            c.y + n.y * (bounds.height() / 2.0 + ANCHOR_PADDING),
        );
    }

    let dx = far.x - c.x;
    let dy = far.y - c.y;
    if dx.abs() < f64::EPSILON && dy.abs() < f64::EPSILON {
        return Point::new(c.x, bounds.y0 - ANCHOR_PADDING);
    }
    let half_w = bounds.width() / 2.0 + ANCHOR_PADDING;
    let half_h = bounds.height() / 2.0 + ANCHOR_PADDING;
    let tx = if dx.abs() < f64::EPSILON {
        f64::INFINITY
    } else {
        half_w / dx.abs()
    };
    let ty = if dy.abs() < f64::EPSILON {
        f64::INFINITY
    } else {
        half_h / dy.abs()
    };
    let t = tx.min(ty);
    Point::new(c.x + dx * t, c.y + dy * t)
}

/// Derive which side of an element an anchor lies on.
pub fn side_of(element: &Element, anchor: Point) -> Side {
    let c = element.center();
    let bounds = element.bounds();
    // Normalize by half-extents so flat shapes pick the dominant axis.
    let nx = (anchor.x - c.x) / (bounds.width() / 2.0).max(f64::EPSILON);
    let ny = (anchor.y - c.y) / (bounds.height() / 2.0).max(f64::EPSILON);
    if nx.abs() >= ny.abs() {
        if nx >= 0.0 {
            Side::Right
        } else {
            Side::Left
        }
    } else if ny >= 0.0 {
        Side::Bottom
    } else {
        Side::Top
    }
}

/// Re-anchor an arrow's bound endpoints from the current boxes of the
/// elements its connection references.
///
/// Used after every move/resize/rotate so attached arrows stay glued to
/// their shapes without being part of the selection. Unbound endpoints and
/// dangling references are left untouched.
pub fn reanchor_arrow(
    arrow: &mut Element,
    connection: &Connection,
    elements: &HashMap<ElementId, Element>,
) {
    let live = |id: &Option<ElementId>| {
        id.and_then(|id| elements.get(&id)).filter(|e| !e.is_deleted)
    };
    if let (Some(element), Some(angle)) =
        (live(&connection.start_element_id), connection.start_angle)
    {
        arrow.start_point = Some(anchor_point(element.bounds(), angle));
    }
    if let (Some(element), Some(angle)) = (live(&connection.end_element_id), connection.end_angle)
    {
        arrow.end_point = Some(anchor_point(element.bounds(), angle));
    }
}

/// Routing points emitted for one attached endpoint, walking away from the
/// shape toward `far`. The escape point always comes first.
fn escape_route(element: &Element, side: Side, anchor: Point, far: Point) -> Vec<Point> {
    let n = side_normal(side);
    let escape = Point::new(anchor.x + n.x * ESCAPE_OFFSET, anchor.y + n.y * ESCAPE_OFFSET);
    let bounds = element.bounds();
    let c = bounds.center();

    let mut points = vec![escape];
    match side {
        Side::Left | Side::Right => {
            let expected = (far.x - c.x) * n.x >= 0.0;
            if expected {
                // Direct L: run horizontally to the target column, then drop.
                points.push(Point::new(far.x, escape.y));
            } else {
                // U: clear the shape vertically before doubling back.
                let clear_y = if far.y >= c.y {
                    bounds.y1 + ANCHOR_PADDING + ESCAPE_OFFSET
                } else {
                    bounds.y0 - ANCHOR_PADDING - ESCAPE_OFFSET
                };
                points.push(Point::new(escape.x, clear_y));
                points.push(Point::new(far.x, clear_y));
            }
        }
        Side::Top | Side::Bottom => {
            let expected = (far.y - c.y) * n.y >= 0.0;
            if expected {
                points.push(Point::new(escape.x, far.y));
            } else {
                let clear_x = if far.x >= c.x {
                    bounds.x1 + ANCHOR_PADDING + ESCAPE_OFFSET
                } else {
                    bounds.x0 - ANCHOR_PADDING - ESCAPE_OFFSET
                };
                points.push(Point::new(clear_x, escape.y));
                points.push(Point::new(clear_x, far.y));
            }
        }
    }
    points
}

/// Compute the full routed polyline for an arrow, start to end.
///
/// With no attached endpoints the path is a single straight segment.
/// Attached endpoints contribute a padded outside anchor, an escape point
/// perpendicular to the attachment side, and an L- or U-shaped detour
/// depending on which side of the attached element's centerline the far
/// endpoint lies.
pub fn route(
    arrow: &Element,
    connection: Option<&Connection>,
    elements: &HashMap<ElementId, Element>,
) -> Vec<Point> {
    let literal_start = arrow.start_point.unwrap_or(Point::ZERO);
    let literal_end = arrow.end_point.unwrap_or(Point::ZERO);

    let live = |id: Option<ElementId>| {
        id.and_then(|id| elements.get(&id)).filter(|e| !e.is_deleted)
    };
    let (start_el, end_el) = match connection {
        Some(conn) => (live(conn.start_element_id), live(conn.end_element_id)),
        None => (None, None),
    };

    let start_anchor = match start_el {
        Some(el) => outside_point(el, arrow.start_side, literal_end),
        None => literal_start,
    };
    let end_anchor = match end_el {
        Some(el) => outside_point(el, arrow.end_side, literal_start),
        None => literal_end,
    };

    let mut points = vec![start_anchor];
    if let Some(el) = start_el {
        let side = arrow.start_side.unwrap_or_else(|| side_of(el, start_anchor));
        points.extend(escape_route(el, side, start_anchor, end_anchor));
    }
    if let Some(el) = end_el {
        let side = arrow.end_side.unwrap_or_else(|| side_of(el, end_anchor));
        let mut tail = escape_route(el, side, end_anchor, start_anchor);
        tail.reverse();
        points.extend(tail);
    }
    points.push(end_anchor);
    points
}

/// Arrowhead: a filled triangular chevron at the end of the route.
///
/// Orientation comes from the fixed end-side if present (pointing into the
/// shape), otherwise from the vector of the final routing segment. Returns
/// `[tip, left, right]`, or None for a degenerate route.
pub fn arrowhead(route: &[Point], end_side: Option<Side>) -> Option<[Point; 3]> {
    let tip = *route.last()?;
    let dir = match end_side {
        Some(side) => {
            let n = side_normal(side);
            Vec2::new(-n.x, -n.y)
        }
        None => {
            let prev = route.get(route.len().checked_sub(2)?)?;
            let d = Vec2::new(tip.x - prev.x, tip.y - prev.y);
            let len = d.hypot();
            if len < f64::EPSILON {
                return None;
            }
            d / len
        }
    };
    let perp = Vec2::new(-dir.y, dir.x);
    let back = Point::new(tip.x - dir.x * HEAD_SIZE, tip.y - dir.y * HEAD_SIZE);
    Some([
        tip,
        Point::new(back.x + perp.x * HEAD_SIZE * 0.5, back.y + perp.y * HEAD_SIZE * 0.5),
        Point::new(back.x - perp.x * HEAD_SIZE * 0.5, back.y - perp.y * HEAD_SIZE * 0.5),
    ])
}
