//! Versioned diagram records: elements and connections.
//!
//! Every record carries a `version` (wall-clock-like, monotonically
//! increasing), a random `version_nonce` tie-breaker and an `is_deleted`
//! tombstone flag. Deleted records are retained and re-stamped, never
//! physically removed, so deletions can propagate through merges.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for elements and connections.
pub type ElementId = Uuid;

/// Full angle in radians.
pub const TAU: f64 = std::f64::consts::TAU;

/// Wrap an angle into `[0, 2π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    angle.rem_euclid(TAU)
}

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }
}

/// Element variant discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Diamond,
    Rhombus,
    Freedraw,
    Line,
    Arrow,
    Text,
}

impl ElementKind {
    /// Linear elements carry explicit start/end points.
    pub fn is_linear(self) -> bool {
        matches!(self, ElementKind::Line | ElementKind::Arrow)
    }
}

/// Side of an element's bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Top,
    Bottom,
    Left,
    Right,
}

/// Coarse direction of an arrow, from the dominant axis of end − start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ArrowDirection {
    /// Derive the coarse direction of the segment `start → end`.
    pub fn between(start: Point, end: Point) -> Self {
        let dx = end.x - start.x;
        let dy = end.y - start.y;
        if dx.abs() >= dy.abs() {
            if dx >= 0.0 {
                ArrowDirection::Right
            } else {
                ArrowDirection::Left
            }
        } else if dy >= 0.0 {
            ArrowDirection::Down
        } else {
            ArrowDirection::Up
        }
    }
}

/// Style properties for elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementStyle {
    /// Stroke color.
    pub stroke_color: Rgba,
    /// Fill color (None = no fill).
    #[serde(default)]
    pub fill_color: Option<Rgba>,
    /// Stroke width.
    pub stroke_width: f64,
    /// Overall opacity (0.0 = fully transparent, 1.0 = fully opaque).
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Corner radius (0 = sharp corners).
    #[serde(default)]
    pub corner_radius: f64,
    /// Font size for text content.
    #[serde(default = "default_font_size")]
    pub font_size: f64,
}

fn default_opacity() -> f64 {
    1.0
}

fn default_font_size() -> f64 {
    20.0
}

impl Default for ElementStyle {
    fn default() -> Self {
        Self {
            stroke_color: Rgba::black(),
            fill_color: None,
            stroke_width: 2.0,
            opacity: 1.0,
            corner_radius: 0.0,
            font_size: 20.0,
        }
    }
}

/// A shape, stroke, connector or text block in the diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    /// Top-left corner of the bounding box.
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation around the center, radians, wrapped mod 2π.
    #[serde(default)]
    pub angle: f64,
    pub style: ElementStyle,
    /// Text content (text elements, shape labels).
    #[serde(default)]
    pub text: Option<String>,
    /// Raw point list for freedraw strokes, in world coordinates.
    #[serde(default)]
    pub points: Vec<Point>,
    /// Start point for lines and arrows.
    #[serde(default)]
    pub start_point: Option<Point>,
    /// End point for lines and arrows.
    #[serde(default)]
    pub end_point: Option<Point>,
    /// Connection record driving this arrow (arrows only).
    #[serde(default)]
    pub connection_id: Option<ElementId>,
    /// Side the arrow start was fixed to at creation.
    #[serde(default)]
    pub start_side: Option<Side>,
    /// Side the arrow end was fixed to at creation.
    #[serde(default)]
    pub end_side: Option<Side>,
    /// Coarse arrow direction.
    #[serde(default)]
    pub direction: Option<ArrowDirection>,
    /// Back-references to connections touching this element.
    #[serde(default)]
    pub connection_ids: Vec<ElementId>,
    /// Local-only selection flag; never serialized or merged.
    #[serde(skip)]
    pub is_selected: bool,
    /// Wall-clock-like version stamp. Missing on the wire decodes as 0
    /// (lowest priority) so a corrupt peer cannot poison a merge.
    #[serde(default)]
    pub version: u64,
    /// Random tie-breaker for equal versions.
    #[serde(default)]
    pub version_nonce: u32,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
}

impl Element {
    /// Create a new boxed element with a fresh identity and version stamp.
    pub fn new(kind: ElementKind, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            x,
            y,
            width,
            height,
            angle: 0.0,
            style: ElementStyle::default(),
            text: None,
            points: Vec::new(),
            start_point: None,
            end_point: None,
            connection_id: None,
            start_side: None,
            end_side: None,
            direction: None,
            connection_ids: Vec::new(),
            is_selected: false,
            version: next_version(0),
            version_nonce: random_nonce(),
            is_deleted: false,
        }
    }

    /// Create a new line or arrow between two points.
    pub fn new_linear(kind: ElementKind, start: Point, end: Point) -> Self {
        debug_assert!(kind.is_linear());
        let x = start.x.min(end.x);
        let y = start.y.min(end.y);
        let mut element = Self::new(kind, x, y, (end.x - start.x).abs(), (end.y - start.y).abs());
        element.start_point = Some(start);
        element.end_point = Some(end);
        if kind == ElementKind::Arrow {
            element.direction = Some(ArrowDirection::between(start, end));
        }
        element
    }

    /// Create a new freedraw stroke from captured points.
    pub fn new_freedraw(points: Vec<Point>) -> Self {
        let bounds = bounds_of(&points);
        let mut element = Self::new(
            ElementKind::Freedraw,
            bounds.x0,
            bounds.y0,
            bounds.width(),
            bounds.height(),
        );
        element.points = points;
        element
    }

    /// Axis-aligned bounding box, ignoring rotation.
    pub fn bounds(&self) -> Rect {
        match self.kind {
            ElementKind::Line | ElementKind::Arrow => {
                match (self.start_point, self.end_point) {
                    (Some(s), Some(e)) => Rect::new(
                        s.x.min(e.x),
                        s.y.min(e.y),
                        s.x.max(e.x),
                        s.y.max(e.y),
                    ),
                    _ => self.box_rect(),
                }
            }
            ElementKind::Freedraw if !self.points.is_empty() => bounds_of(&self.points),
            _ => self.box_rect(),
        }
    }

    fn box_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    /// Center of the bounding box.
    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    /// Check if a point (in world coordinates) hits this element's box.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.bounds().inflate(tolerance, tolerance).contains(point)
    }

    /// Set the rotation, wrapped into `[0, 2π)`.
    pub fn set_angle(&mut self, angle: f64) {
        self.angle = wrap_angle(angle);
    }
}

fn bounds_of(points: &[Point]) -> Rect {
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if points.is_empty() {
        Rect::ZERO
    } else {
        Rect::new(min_x, min_y, max_x, max_y)
    }
}

/// The logical binding between an arrow element and the shape(s) its ends
/// are attached to, independent of the arrow's own element record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ElementId,
    /// The visual arrow this connection drives.
    pub arrow_element_id: ElementId,
    #[serde(default)]
    pub start_element_id: Option<ElementId>,
    #[serde(default)]
    pub end_element_id: Option<ElementId>,
    /// Polar angle (radians) from the start element's center to the point
    /// where the arrow was anchored at creation time. Defined iff
    /// `start_element_id` is set.
    #[serde(default)]
    pub start_angle: Option<f64>,
    /// Same, for the end element.
    #[serde(default)]
    pub end_angle: Option<f64>,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub version_nonce: u32,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Connection {
    /// Create a new connection for an arrow, with a fresh version stamp.
    pub fn new(arrow_element_id: ElementId) -> Self {
        Self {
            id: Uuid::new_v4(),
            arrow_element_id,
            start_element_id: None,
            end_element_id: None,
            start_angle: None,
            end_angle: None,
            version: next_version(0),
            version_nonce: random_nonce(),
            is_deleted: false,
        }
    }

    /// Attach the start of the arrow to an element, capturing the polar
    /// angle from the element's center to the anchor point.
    pub fn attach_start(&mut self, element: &Element, anchor: Point) {
        let c = element.center();
        self.start_element_id = Some(element.id);
        self.start_angle = Some((anchor.y - c.y).atan2(anchor.x - c.x));
    }

    /// Attach the end of the arrow to an element.
    pub fn attach_end(&mut self, element: &Element, anchor: Point) {
        let c = element.center();
        self.end_element_id = Some(element.id);
        self.end_angle = Some((anchor.y - c.y).atan2(anchor.x - c.x));
    }
}

/// Shared surface of versioned records, the seam between the merge
/// resolver, the versioning wrapper and both record types.
pub trait Versioned {
    fn id(&self) -> ElementId;
    fn version(&self) -> u64;
    fn version_nonce(&self) -> u32;
    fn is_deleted(&self) -> bool;
    /// Stamp a fresh version and force the record live.
    fn stamp(&mut self, version: u64, nonce: u32);
    /// Turn the record into a tombstone with a fresh stamp.
    fn mark_deleted(&mut self, version: u64, nonce: u32);
    /// Zero the version stamp; used for structural content comparison.
    fn clear_stamp(&mut self);
}

macro_rules! impl_versioned {
    ($ty:ty) => {
        impl Versioned for $ty {
            fn id(&self) -> ElementId {
                self.id
            }
            fn version(&self) -> u64 {
                self.version
            }
            fn version_nonce(&self) -> u32 {
                self.version_nonce
            }
            fn is_deleted(&self) -> bool {
                self.is_deleted
            }
            fn stamp(&mut self, version: u64, nonce: u32) {
                self.version = version;
                self.version_nonce = nonce;
                self.is_deleted = false;
            }
            fn mark_deleted(&mut self, version: u64, nonce: u32) {
                self.version = version;
                self.version_nonce = nonce;
                self.is_deleted = true;
            }
            fn clear_stamp(&mut self) {
                self.version = 0;
                self.version_nonce = 0;
            }
        }
    };
}

impl_versioned!(Element);
impl_versioned!(Connection);

/// Next version stamp: unix-epoch milliseconds, clamped so that repeated
/// local edits within one millisecond still increase strictly.
pub fn next_version(prev: u64) -> u64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    now.max(prev + 1)
}

/// Generate a random version nonce.
/// Uses a counter + hash approach that works on all platforms; the counter
/// is mixed with sub-second clock entropy so concurrent peers diverge.
pub fn random_nonce() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};

    static NONCE_COUNTER: AtomicU32 = AtomicU32::new(1);

    let counter = NONCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let entropy = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    // splitmix32-style finalizer
    let mut x = (counter ^ entropy).wrapping_mul(0x9E37_79B9);
    x ^= x >> 16;
    x = x.wrapping_mul(0x85EB_CA6B);
    x ^= x >> 13;
    x = x.wrapping_mul(0xC2B2_AE35);
    x ^= x >> 16;
    x
}
