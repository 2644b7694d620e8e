//! Annotation data model
//!
//! Every annotation kind shares identity, page and style fields; the
//! kind-specific geometry lives in [`AnnotationKind`]. All geometry is stored
//! in document space and keyed on the original page index, so page deletion
//! and reordering never rewrite annotations.

use crate::geometry::{bounding_box_of, point_in_quad, Point, Quad, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable annotation identifier
///
/// Generated as a UUID v4 string; persisted snapshots may carry any string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AnnotationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for AnnotationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AnnotationId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RGBA color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create an opaque color
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Convert to normalized RGBA values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            self.a as f32 / 255.0,
        )
    }
}

impl Color {
    pub const RED: Color = Color { r: 255, g: 0, b: 0, a: 255 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255, a: 255 };
    pub const YELLOW: Color = Color { r: 255, g: 255, b: 0, a: 255 };
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
}

/// Visual styling shared by all annotation kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationStyle {
    pub color: Color,

    /// Opacity (0.0 = transparent, 1.0 = opaque)
    pub opacity: f32,

    /// Stroke width in points; export falls back to its default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
}

impl AnnotationStyle {
    pub fn new(color: Color, opacity: f32) -> Self {
        Self {
            color,
            opacity: opacity.clamp(0.0, 1.0),
            stroke_width: None,
            font_size: None,
            font_family: None,
        }
    }

    /// Semi-transparent yellow, the usual highlighter look
    pub fn yellow_highlight() -> Self {
        Self::new(Color::YELLOW, 0.4)
    }

    /// Opaque red pen used for shapes, lines and ink
    pub fn red_markup() -> Self {
        Self::new(Color::RED, 1.0).with_stroke_width(2.0)
    }

    pub fn with_stroke_width(mut self, width: f32) -> Self {
        self.stroke_width = Some(width);
        self
    }

    pub fn with_font(mut self, family: impl Into<String>, size: f32) -> Self {
        self.font_family = Some(family.into());
        self.font_size = Some(size);
        self
    }
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        Self::new(Color::BLACK, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkupKind {
    Highlight,
    Underline,
    Strikethrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Line,
    Arrow,
}

/// One continuous freehand stroke
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InkPath {
    pub points: Vec<Point>,
}

impl InkPath {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }
}

/// Kind-specific annotation payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnnotationKind {
    /// Text markup over one or more line quads
    Markup {
        markup: MarkupKind,
        quad_points: Vec<Quad>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_text: Option<String>,
    },

    /// Sticky note; `is_open` only drives the popup in the view
    Note {
        position: Point,
        content: String,
        #[serde(default)]
        is_open: bool,
    },

    Shape { shape: ShapeKind, rect: Rect },

    Line { line: LineKind, start: Point, end: Point },

    Ink { paths: Vec<InkPath> },

    Text { rect: Rect, content: String },
}

impl AnnotationKind {
    /// Discriminant name as the user sees it
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationKind::Markup { markup, .. } => match markup {
                MarkupKind::Highlight => "highlight",
                MarkupKind::Underline => "underline",
                MarkupKind::Strikethrough => "strikethrough",
            },
            AnnotationKind::Note { .. } => "note",
            AnnotationKind::Shape { shape, .. } => match shape {
                ShapeKind::Rectangle => "rectangle",
                ShapeKind::Ellipse => "ellipse",
            },
            AnnotationKind::Line { line, .. } => match line {
                LineKind::Line => "line",
                LineKind::Arrow => "arrow",
            },
            AnnotationKind::Ink { .. } => "ink",
            AnnotationKind::Text { .. } => "text",
        }
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A single annotation on an original page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,

    /// Original (pre-deletion, pre-reorder) page index
    pub page_index: u32,

    pub style: AnnotationStyle,

    pub created_at: i64,

    pub updated_at: i64,

    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl Annotation {
    /// Create a new annotation with a generated ID
    pub fn new(page_index: u32, kind: AnnotationKind, style: AnnotationStyle) -> Self {
        Self::with_id(AnnotationId::new(), page_index, kind, style)
    }

    /// Create an annotation with a specific ID (for deserialization and tests)
    pub fn with_id(
        id: impl Into<AnnotationId>,
        page_index: u32,
        kind: AnnotationKind,
        style: AnnotationStyle,
    ) -> Self {
        let now = now_millis();
        Self { id: id.into(), page_index, style, created_at: now, updated_at: now, kind }
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Whether this annotation's kind carries `field`
    pub fn supports(&self, field: PatchField) -> bool {
        use AnnotationKind as K;
        match field {
            PatchField::Style | PatchField::UpdatedAt => true,
            PatchField::QuadPoints | PatchField::SelectedText => matches!(self.kind, K::Markup { .. }),
            PatchField::Position | PatchField::IsOpen => matches!(self.kind, K::Note { .. }),
            PatchField::Content => matches!(self.kind, K::Note { .. } | K::Text { .. }),
            PatchField::Rect => matches!(self.kind, K::Shape { .. } | K::Text { .. }),
            PatchField::Start | PatchField::End => matches!(self.kind, K::Line { .. }),
            PatchField::Paths => matches!(self.kind, K::Ink { .. }),
        }
    }

    /// Overwrite the fields present in `patch`
    ///
    /// Fields the kind does not carry are ignored; callers validate first.
    pub fn apply_patch(&mut self, patch: &AnnotationPatch) {
        if let Some(style) = &patch.style {
            self.style = style.clone();
        }
        if let Some(updated_at) = patch.updated_at {
            self.updated_at = updated_at;
        }

        match &mut self.kind {
            AnnotationKind::Markup { quad_points, selected_text, .. } => {
                if let Some(value) = &patch.quad_points {
                    *quad_points = value.clone();
                }
                if let Some(value) = &patch.selected_text {
                    *selected_text = value.clone();
                }
            }
            AnnotationKind::Note { position, content, is_open } => {
                if let Some(value) = patch.position {
                    *position = value;
                }
                if let Some(value) = &patch.content {
                    *content = value.clone();
                }
                if let Some(value) = patch.is_open {
                    *is_open = value;
                }
            }
            AnnotationKind::Shape { rect, .. } => {
                if let Some(value) = patch.rect {
                    *rect = value;
                }
            }
            AnnotationKind::Line { start, end, .. } => {
                if let Some(value) = patch.start {
                    *start = value;
                }
                if let Some(value) = patch.end {
                    *end = value;
                }
            }
            AnnotationKind::Ink { paths } => {
                if let Some(value) = &patch.paths {
                    *paths = value.clone();
                }
            }
            AnnotationKind::Text { rect, content } => {
                if let Some(value) = patch.rect {
                    *rect = value;
                }
                if let Some(value) = &patch.content {
                    *content = value.clone();
                }
            }
        }
    }

    /// Bounding box in document space, used for selection outlines
    ///
    /// Notes report their anchor point as a zero-size box.
    pub fn bounding_box(&self) -> Option<Rect> {
        match &self.kind {
            AnnotationKind::Markup { quad_points, .. } => bounding_box_of(quad_points),
            AnnotationKind::Note { position, .. } => Some(Rect::from_corners(*position, *position)),
            AnnotationKind::Shape { rect, .. } | AnnotationKind::Text { rect, .. } => Some(*rect),
            AnnotationKind::Line { start, end, .. } => Some(Rect::from_corners(*start, *end)),
            AnnotationKind::Ink { paths } => {
                let mut points = paths.iter().flat_map(|path| path.points.iter());
                let first = *points.next()?;
                let (min, max) = points.fold((first, first), |(min, max), p| {
                    (Point::new(min.x.min(p.x), min.y.min(p.y)), Point::new(max.x.max(p.x), max.y.max(p.y)))
                });
                Some(Rect::from_corners(min, max))
            }
        }
    }

    /// Check if a document-space point hits this annotation
    pub fn hit_test(&self, point: &Point, tolerance: f32) -> bool {
        match &self.kind {
            AnnotationKind::Markup { quad_points, .. } => {
                quad_points.iter().any(|quad| point_in_quad(point, quad))
            }
            AnnotationKind::Note { position, .. } => point.distance_to(position) <= tolerance,
            AnnotationKind::Shape { rect, .. } | AnnotationKind::Text { rect, .. } => {
                let expanded = Rect::new(
                    rect.x - tolerance,
                    rect.y - tolerance,
                    rect.width + tolerance * 2.0,
                    rect.height + tolerance * 2.0,
                );
                expanded.contains(point)
            }
            AnnotationKind::Line { start, end, .. } => {
                point_near_line_segment(point, start, end, tolerance)
            }
            AnnotationKind::Ink { paths } => paths.iter().any(|path| {
                path.points
                    .windows(2)
                    .any(|pair| point_near_line_segment(point, &pair[0], &pair[1], tolerance))
            }),
        }
    }
}

fn point_near_line_segment(point: &Point, start: &Point, end: &Point, tolerance: f32) -> bool {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start) <= tolerance;
    }

    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    let closest = Point::new(start.x + t * dx, start.y + t * dy);
    point.distance_to(&closest) <= tolerance
}

/// Names of the patchable annotation fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchField {
    Style,
    QuadPoints,
    SelectedText,
    Position,
    Content,
    IsOpen,
    Rect,
    Start,
    End,
    Paths,
    UpdatedAt,
}

impl fmt::Display for PatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PatchField::Style => "style",
            PatchField::QuadPoints => "quad_points",
            PatchField::SelectedText => "selected_text",
            PatchField::Position => "position",
            PatchField::Content => "content",
            PatchField::IsOpen => "is_open",
            PatchField::Rect => "rect",
            PatchField::Start => "start",
            PatchField::End => "end",
            PatchField::Paths => "paths",
            PatchField::UpdatedAt => "updated_at",
        };
        f.write_str(name)
    }
}

/// Partial set of annotation fields
///
/// Used both for the forward `changes` of an update and for the same-keyed
/// `previous_state` that undoes it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationPatch {
    pub style: Option<AnnotationStyle>,
    pub quad_points: Option<Vec<Quad>>,
    pub selected_text: Option<Option<String>>,
    pub position: Option<Point>,
    pub content: Option<String>,
    pub is_open: Option<bool>,
    pub rect: Option<Rect>,
    pub start: Option<Point>,
    pub end: Option<Point>,
    pub paths: Option<Vec<InkPath>>,
    pub updated_at: Option<i64>,
}

impl AnnotationPatch {
    /// Fields present in this patch
    pub fn fields(&self) -> Vec<PatchField> {
        let present = [
            (self.style.is_some(), PatchField::Style),
            (self.quad_points.is_some(), PatchField::QuadPoints),
            (self.selected_text.is_some(), PatchField::SelectedText),
            (self.position.is_some(), PatchField::Position),
            (self.content.is_some(), PatchField::Content),
            (self.is_open.is_some(), PatchField::IsOpen),
            (self.rect.is_some(), PatchField::Rect),
            (self.start.is_some(), PatchField::Start),
            (self.end.is_some(), PatchField::End),
            (self.paths.is_some(), PatchField::Paths),
            (self.updated_at.is_some(), PatchField::UpdatedAt),
        ];
        present.into_iter().filter_map(|(set, field)| set.then_some(field)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Capture the current values of `annotation` for every key in `keys`
    ///
    /// Fails with the first key the annotation's kind does not carry.
    pub fn snapshot_of(annotation: &Annotation, keys: &AnnotationPatch) -> Result<Self, PatchField> {
        if let Some(field) = keys.fields().into_iter().find(|field| !annotation.supports(*field)) {
            return Err(field);
        }

        let mut snapshot = AnnotationPatch {
            style: keys.style.as_ref().map(|_| annotation.style.clone()),
            updated_at: keys.updated_at.map(|_| annotation.updated_at),
            ..Default::default()
        };

        match &annotation.kind {
            AnnotationKind::Markup { quad_points, selected_text, .. } => {
                snapshot.quad_points = keys.quad_points.as_ref().map(|_| quad_points.clone());
                snapshot.selected_text = keys.selected_text.as_ref().map(|_| selected_text.clone());
            }
            AnnotationKind::Note { position, content, is_open } => {
                snapshot.position = keys.position.map(|_| *position);
                snapshot.content = keys.content.as_ref().map(|_| content.clone());
                snapshot.is_open = keys.is_open.map(|_| *is_open);
            }
            AnnotationKind::Shape { rect, .. } => {
                snapshot.rect = keys.rect.map(|_| *rect);
            }
            AnnotationKind::Line { start, end, .. } => {
                snapshot.start = keys.start.map(|_| *start);
                snapshot.end = keys.end.map(|_| *end);
            }
            AnnotationKind::Ink { paths } => {
                snapshot.paths = keys.paths.as_ref().map(|_| paths.clone());
            }
            AnnotationKind::Text { rect, content } => {
                snapshot.rect = keys.rect.map(|_| *rect);
                snapshot.content = keys.content.as_ref().map(|_| content.clone());
            }
        }

        Ok(snapshot)
    }
}
