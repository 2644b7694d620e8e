//! Geometry utilities for annotation editing
//!
//! Annotations are stored in document space (the page's intrinsic coordinate
//! system). Interaction happens in view space (on-screen pixels at the current
//! zoom and rotation). Everything in this module is pure; the actual
//! point transform is delegated to a [`ViewportConversion`].

use serde::{Deserialize, Serialize};

/// A point in either document or view space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    /// Create a new point
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Calculate distance to another point
    pub fn distance_to(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned rectangle with non-negative width and height
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Build a normalized rectangle from two opposite corners in any order
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (b.x - a.x).abs(),
            height: (b.y - a.y).abs(),
        }
    }

    pub fn min_corner(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn max_corner(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Inclusive containment test
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}

/// Quadrilateral covering one line of selected text
///
/// Eight numbers in PDF QuadPoints order: upper-left, upper-right,
/// lower-left, lower-right. The winding encodes which edge is the text
/// baseline, so conversions never re-sort corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quad(pub [f32; 8]);

impl Quad {
    /// Create a quad from its four corners in QuadPoints order
    pub fn from_corners(corners: [Point; 4]) -> Self {
        let [a, b, c, d] = corners;
        Self([a.x, a.y, b.x, b.y, c.x, c.y, d.x, d.y])
    }

    /// Quad covering an axis-aligned rectangle, with the lower edge at `rect.y`
    pub fn from_rect(rect: Rect) -> Self {
        let top = rect.y + rect.height;
        Self::from_corners([
            Point::new(rect.x, top),
            Point::new(rect.x + rect.width, top),
            Point::new(rect.x, rect.y),
            Point::new(rect.x + rect.width, rect.y),
        ])
    }

    pub fn corners(&self) -> [Point; 4] {
        let q = &self.0;
        [
            Point::new(q[0], q[1]),
            Point::new(q[2], q[3]),
            Point::new(q[4], q[5]),
            Point::new(q[6], q[7]),
        ]
    }

    /// Corners in perimeter order (UL, UR, LR, LL)
    fn perimeter(&self) -> [Point; 4] {
        let [ul, ur, ll, lr] = self.corners();
        [ul, ur, lr, ll]
    }

    /// Axis-aligned bounding box of this quad
    pub fn bounds(&self) -> Rect {
        let corners = self.corners();
        let mut min = corners[0];
        let mut max = corners[0];
        for corner in corners.iter().skip(1) {
            min.x = min.x.min(corner.x);
            min.y = min.y.min(corner.y);
            max.x = max.x.max(corner.x);
            max.y = max.y.max(corner.y);
        }
        Rect::from_corners(min, max)
    }
}

/// Errors raised by a viewport conversion capability
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ViewportError {
    #[error("viewport scale must be positive, got {0}")]
    InvalidScale(f32),
    #[error("viewport rotation must be a multiple of 90 degrees, got {0}")]
    InvalidRotation(i32),
    #[error("page size must be positive, got {width}x{height}")]
    InvalidPageSize { width: f32, height: f32 },
    #[error("viewport backend error: {0}")]
    Backend(String),
}

/// Converts single points between document and view space
///
/// Supplied by whatever renders pages; it alone knows the scale, rotation
/// and intrinsic page size in effect.
pub trait ViewportConversion {
    fn to_document(&self, point: Point) -> Result<Point, ViewportError>;
    fn to_view(&self, point: Point) -> Result<Point, ViewportError>;
}

/// Stock viewport for a page rendered at `scale` and rotated clockwise
///
/// Document space has its origin at the bottom-left with y up (PDF user
/// space). View space is y-down pixels of the rotated, scaled page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    scale: f32,
    rotation: u16,
    page_width: f32,
    page_height: f32,
}

impl PageViewport {
    pub fn new(
        scale: f32,
        rotation: i32,
        page_width: f32,
        page_height: f32,
    ) -> Result<Self, ViewportError> {
        if !(scale > 0.0) || !scale.is_finite() {
            return Err(ViewportError::InvalidScale(scale));
        }
        if rotation % 90 != 0 {
            return Err(ViewportError::InvalidRotation(rotation));
        }
        if !(page_width > 0.0 && page_height > 0.0) {
            return Err(ViewportError::InvalidPageSize {
                width: page_width,
                height: page_height,
            });
        }

        Ok(Self {
            scale,
            rotation: rotation.rem_euclid(360) as u16,
            page_width,
            page_height,
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn rotation(&self) -> u16 {
        self.rotation
    }

    /// Size of the rendered page in view pixels
    pub fn view_size(&self) -> (f32, f32) {
        let (w, h) = (self.page_width * self.scale, self.page_height * self.scale);
        if self.rotation % 180 == 0 {
            (w, h)
        } else {
            (h, w)
        }
    }
}

impl ViewportConversion for PageViewport {
    fn to_view(&self, point: Point) -> Result<Point, ViewportError> {
        let (w, h) = (self.page_width, self.page_height);
        // Flip to y-down before rotating clockwise.
        let (u, v) = (point.x, h - point.y);
        let (rx, ry) = match self.rotation {
            0 => (u, v),
            90 => (h - v, u),
            180 => (w - u, h - v),
            _ => (v, w - u),
        };
        Ok(Point::new(rx * self.scale, ry * self.scale))
    }

    fn to_document(&self, point: Point) -> Result<Point, ViewportError> {
        let (w, h) = (self.page_width, self.page_height);
        let (rx, ry) = (point.x / self.scale, point.y / self.scale);
        let (u, v) = match self.rotation {
            0 => (rx, ry),
            90 => (ry, h - rx),
            180 => (w - rx, h - ry),
            _ => (w - ry, rx),
        };
        Ok(Point::new(u, h - v))
    }
}

pub fn point_to_document_space(
    point: Point,
    viewport: &impl ViewportConversion,
) -> Result<Point, ViewportError> {
    viewport.to_document(point)
}

pub fn point_to_view_space(
    point: Point,
    viewport: &impl ViewportConversion,
) -> Result<Point, ViewportError> {
    viewport.to_view(point)
}

/// Convert a rectangle to document space
///
/// Rotation and axis flips can swap which corner is the minimum, so the
/// converted corners are always re-normalized.
pub fn rect_to_document_space(
    rect: &Rect,
    viewport: &impl ViewportConversion,
) -> Result<Rect, ViewportError> {
    let a = viewport.to_document(rect.min_corner())?;
    let b = viewport.to_document(rect.max_corner())?;
    Ok(Rect::from_corners(a, b))
}

/// Convert a rectangle to view space, re-normalizing the result
pub fn rect_to_view_space(
    rect: &Rect,
    viewport: &impl ViewportConversion,
) -> Result<Rect, ViewportError> {
    let a = viewport.to_view(rect.min_corner())?;
    let b = viewport.to_view(rect.max_corner())?;
    Ok(Rect::from_corners(a, b))
}

pub fn quad_to_view_space(
    quad: &Quad,
    viewport: &impl ViewportConversion,
) -> Result<Quad, ViewportError> {
    convert_quad(quad, |p| viewport.to_view(p))
}

pub fn quad_to_document_space(
    quad: &Quad,
    viewport: &impl ViewportConversion,
) -> Result<Quad, ViewportError> {
    convert_quad(quad, |p| viewport.to_document(p))
}

fn convert_quad(
    quad: &Quad,
    mut convert: impl FnMut(Point) -> Result<Point, ViewportError>,
) -> Result<Quad, ViewportError> {
    let [a, b, c, d] = quad.corners();
    Ok(Quad::from_corners([convert(a)?, convert(b)?, convert(c)?, convert(d)?]))
}

/// Bounding box across every corner of every quad
///
/// Returns `None` for an empty slice.
pub fn bounding_box_of(quads: &[Quad]) -> Option<Rect> {
    let mut iter = quads.iter().map(Quad::bounds);
    let first = iter.next()?;
    let (mut min, mut max) = (first.min_corner(), first.max_corner());
    for bounds in iter {
        min.x = min.x.min(bounds.x);
        min.y = min.y.min(bounds.y);
        max.x = max.x.max(bounds.x + bounds.width);
        max.y = max.y.max(bounds.y + bounds.height);
    }
    Some(Rect::from_corners(min, max))
}

pub fn point_in_rect(point: &Point, rect: &Rect) -> bool {
    rect.contains(point)
}

/// Ray-casting containment test over the quad perimeter
///
/// Points exactly on an edge may land either way.
pub fn point_in_quad(point: &Point, quad: &Quad) -> bool {
    let polygon = quad.perimeter();
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > point.y) != (pj.y > point.y)
            && point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Compass position of a resize handle
///
/// North is the edge with the smaller y (view-space convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlePosition {
    Nw,
    N,
    Ne,
    E,
    Se,
    S,
    Sw,
    W,
}

impl HandlePosition {
    pub const ALL: [HandlePosition; 8] = [
        HandlePosition::Nw,
        HandlePosition::N,
        HandlePosition::Ne,
        HandlePosition::E,
        HandlePosition::Se,
        HandlePosition::S,
        HandlePosition::Sw,
        HandlePosition::W,
    ];

    /// Canonical resize cursor for this direction
    pub fn cursor(self) -> &'static str {
        match self {
            HandlePosition::Nw | HandlePosition::Se => "nwse-resize",
            HandlePosition::Ne | HandlePosition::Sw => "nesw-resize",
            HandlePosition::N | HandlePosition::S => "ns-resize",
            HandlePosition::E | HandlePosition::W => "ew-resize",
        }
    }

    fn moves_west(self) -> bool {
        matches!(self, HandlePosition::Nw | HandlePosition::W | HandlePosition::Sw)
    }

    fn moves_east(self) -> bool {
        matches!(self, HandlePosition::Ne | HandlePosition::E | HandlePosition::Se)
    }

    fn moves_north(self) -> bool {
        matches!(self, HandlePosition::Nw | HandlePosition::N | HandlePosition::Ne)
    }

    fn moves_south(self) -> bool {
        matches!(self, HandlePosition::Sw | HandlePosition::S | HandlePosition::Se)
    }
}

/// Resize handle with its hit area
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResizeHandle {
    pub position: HandlePosition,
    /// Square hit area centred on the anchor point
    pub bounds: Rect,
    pub cursor: &'static str,
}

impl ResizeHandle {
    pub fn anchor(&self) -> Point {
        self.bounds.center()
    }

    pub fn hit_test(&self, point: &Point) -> bool {
        self.bounds.contains(point)
    }
}

/// The eight resize handles of a rectangle, in `nw, n, ne, e, se, s, sw, w` order
pub fn resize_handles(rect: &Rect, handle_size: f32) -> [ResizeHandle; 8] {
    let (left, top) = (rect.x, rect.y);
    let (right, bottom) = (rect.x + rect.width, rect.y + rect.height);
    let center = rect.center();
    let half = handle_size / 2.0;

    HandlePosition::ALL.map(|position| {
        let anchor = match position {
            HandlePosition::Nw => Point::new(left, top),
            HandlePosition::N => Point::new(center.x, top),
            HandlePosition::Ne => Point::new(right, top),
            HandlePosition::E => Point::new(right, center.y),
            HandlePosition::Se => Point::new(right, bottom),
            HandlePosition::S => Point::new(center.x, bottom),
            HandlePosition::Sw => Point::new(left, bottom),
            HandlePosition::W => Point::new(left, center.y),
        };
        ResizeHandle {
            position,
            bounds: Rect::new(anchor.x - half, anchor.y - half, handle_size, handle_size),
            cursor: position.cursor(),
        }
    })
}

/// Drag `handle` by (`dx`, `dy`) without letting the rectangle flip
///
/// Width and height are clamped to `min_size`; for west/north handles the
/// opposite edge stays fixed at its pre-drag position.
pub fn apply_resize(rect: &Rect, handle: HandlePosition, dx: f32, dy: f32, min_size: f32) -> Rect {
    let mut left = rect.x;
    let mut top = rect.y;
    let mut right = rect.x + rect.width;
    let mut bottom = rect.y + rect.height;

    if handle.moves_west() {
        left += dx;
    }
    if handle.moves_east() {
        right += dx;
    }
    if handle.moves_north() {
        top += dy;
    }
    if handle.moves_south() {
        bottom += dy;
    }

    if right - left < min_size {
        if handle.moves_west() {
            left = right - min_size;
        } else {
            right = left + min_size;
        }
    }
    if bottom - top < min_size {
        if handle.moves_north() {
            top = bottom - min_size;
        } else {
            bottom = top + min_size;
        }
    }

    Rect::new(left, top, right - left, bottom - top)
}

/// Perpendicular distance from `point` to the chord `start`-`end`
fn perpendicular_distance(point: &Point, start: &Point, end: &Point) -> f32 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length < f32::EPSILON {
        return point.distance_to(start);
    }
    ((dy * point.x - dx * point.y + end.x * start.y - end.y * start.x) / length).abs()
}

/// Ramer–Douglas–Peucker path simplification
///
/// Paths of two points or fewer come back unchanged. On equal maximum
/// distances the first point wins, which keeps the output deterministic
/// and makes the function idempotent for a fixed `epsilon`.
pub fn simplify_path(points: &[Point], epsilon: f32) -> Vec<Point> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut keep = vec![false; points.len()];
    keep[0] = true;
    keep[points.len() - 1] = true;

    let mut stack = vec![(0, points.len() - 1)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }

        let mut max_distance = 0.0;
        let mut max_index = first;
        for i in first + 1..last {
            let distance = perpendicular_distance(&points[i], &points[first], &points[last]);
            if distance > max_distance {
                max_distance = distance;
                max_index = i;
            }
        }

        if max_index != first && max_distance > epsilon {
            keep[max_index] = true;
            stack.push((first, max_index));
            stack.push((max_index, last));
        }
    }

    points
        .iter()
        .zip(keep)
        .filter_map(|(point, kept)| kept.then_some(*point))
        .collect()
}
