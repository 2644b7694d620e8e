//! Export compositor
//!
//! Reconciles the page structure edits (deletion, reordering, rotation) with
//! the stored annotation geometry and drives a [`PageSink`] that produces the
//! output document. Annotations keep their original page index, so the only
//! bridge between the two is the `original -> output` remap built from the
//! display order.

use crate::annotation::{Annotation, AnnotationKind, Color, LineKind, MarkupKind, ShapeKind};
use crate::config::ExportStyle;
use crate::geometry::{Point, Quad, Rect};
use crate::model::ModelStore;
use std::collections::HashMap;

/// Stroke and fill settings for a drawn primitive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paint {
    pub stroke: Option<Color>,
    pub fill: Option<Color>,
    pub opacity: f32,
    pub stroke_width: f32,
}

impl Paint {
    pub fn stroke(color: Color, width: f32, opacity: f32) -> Self {
        Self { stroke: Some(color), fill: None, opacity, stroke_width: width }
    }

    pub fn fill(color: Color, opacity: f32) -> Self {
        Self { stroke: None, fill: Some(color), opacity, stroke_width: 0.0 }
    }

    pub fn fill_and_stroke(color: Color, width: f32, opacity: f32) -> Self {
        Self { stroke: Some(color), fill: Some(color), opacity, stroke_width: width }
    }
}

/// Font settings for drawn text
#[derive(Debug, Clone, PartialEq)]
pub struct TextPaint {
    pub color: Color,
    pub opacity: f32,
    pub font_family: String,
    pub font_size: f32,
}

/// Page-manipulation capability that builds the output document
///
/// Page arguments are output indices as returned by [`PageSink::append_page`].
/// All geometry is in document space of the source page.
pub trait PageSink {
    type Output;
    type Error;

    /// Copy source page `source_index` to the end of the output; returns its output index
    fn append_page(&mut self, source_index: u32) -> Result<usize, Self::Error>;

    fn set_rotation(&mut self, page: usize, degrees: u16) -> Result<(), Self::Error>;

    fn draw_rect(&mut self, page: usize, rect: &Rect, paint: &Paint) -> Result<(), Self::Error>;

    /// Ellipse inscribed in `rect`
    fn draw_ellipse(&mut self, page: usize, rect: &Rect, paint: &Paint) -> Result<(), Self::Error>;

    fn draw_line(&mut self, page: usize, start: Point, end: Point, paint: &Paint) -> Result<(), Self::Error>;

    /// Open polyline through `points`
    fn draw_path(&mut self, page: usize, points: &[Point], paint: &Paint) -> Result<(), Self::Error>;

    /// Left-aligned text starting at the top of `rect`, clipped to it
    fn draw_text(&mut self, page: usize, rect: &Rect, text: &str, paint: &TextPaint) -> Result<(), Self::Error>;

    fn finish(self) -> Result<Self::Output, Self::Error>;
}

/// Map each surviving original page to its output index
pub fn page_remap(display_order: &[u32]) -> HashMap<u32, usize> {
    display_order.iter().enumerate().map(|(output, &original)| (original, output)).collect()
}

/// Produce the output document through `sink`
///
/// Pages are emitted in display order with their accumulated rotation, then
/// each surviving page's annotations are drawn onto it. Sink errors are
/// returned unchanged and the model is never modified.
pub fn export_document<M, S>(model: &M, mut sink: S, style: &ExportStyle) -> Result<S::Output, S::Error>
where
    M: ModelStore + ?Sized,
    S: PageSink,
{
    let order = model.display_order();
    let remap = page_remap(order);
    let mut drawn = 0usize;

    for &original in order {
        let output = sink.append_page(original)?;
        debug_assert_eq!(remap.get(&original), Some(&output));

        let rotation = model.rotation(original);
        if rotation != 0 {
            sink.set_rotation(output, rotation)?;
        }

        let mut annotations = model.by_page(original);
        annotations.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        for annotation in annotations {
            draw_annotation(&mut sink, output, annotation, style)?;
            drawn += 1;
        }
    }

    let dropped = model.all_annotations().len().saturating_sub(drawn);
    tracing::info!(pages = order.len(), annotations = drawn, dropped, "exported document");
    sink.finish()
}

fn draw_annotation<S: PageSink>(
    sink: &mut S,
    page: usize,
    annotation: &Annotation,
    style: &ExportStyle,
) -> Result<(), S::Error> {
    let color = annotation.style.color;
    let opacity = annotation.style.opacity;
    let width = annotation.style.stroke_width.unwrap_or(style.default_stroke_width);

    match &annotation.kind {
        AnnotationKind::Markup { markup, quad_points, .. } => {
            for quad in quad_points {
                match markup {
                    MarkupKind::Highlight => {
                        sink.draw_rect(page, &quad.bounds(), &Paint::fill(color, opacity))?;
                    }
                    MarkupKind::Underline | MarkupKind::Strikethrough => {
                        let (start, end) = markup_line(quad, *markup);
                        sink.draw_line(page, start, end, &Paint::stroke(color, width, opacity))?;
                    }
                }
            }
        }

        AnnotationKind::Note { position, content, .. } => {
            let icon = Rect::new(position.x, position.y, style.note_icon_size, style.note_icon_size);
            sink.draw_rect(page, &icon, &Paint::fill(color, opacity))?;
            if !content.is_empty() {
                let text_rect = Rect::new(
                    position.x + style.note_icon_size + style.note_text_gap,
                    position.y,
                    style.note_text_width,
                    style.note_icon_size,
                );
                sink.draw_text(page, &text_rect, content, &text_paint(annotation, style))?;
            }
        }

        AnnotationKind::Shape { shape, rect } => {
            let paint = Paint::fill_and_stroke(color, width, opacity);
            match shape {
                ShapeKind::Rectangle => sink.draw_rect(page, rect, &paint)?,
                ShapeKind::Ellipse => sink.draw_ellipse(page, rect, &paint)?,
            }
        }

        AnnotationKind::Line { line, start, end } => {
            let paint = Paint::stroke(color, width, opacity);
            sink.draw_line(page, *start, *end, &paint)?;
            if *line == LineKind::Arrow {
                if let Some([left, right]) = arrowhead(*start, *end, style) {
                    sink.draw_line(page, *end, left, &paint)?;
                    sink.draw_line(page, *end, right, &paint)?;
                }
            }
        }

        AnnotationKind::Ink { paths } => {
            let paint = Paint::stroke(color, width, opacity);
            for path in paths.iter().filter(|path| path.points.len() >= 2) {
                sink.draw_path(page, &path.points, &paint)?;
            }
        }

        AnnotationKind::Text { rect, content } => {
            sink.draw_text(page, rect, content, &text_paint(annotation, style))?;
        }
    }

    Ok(())
}

fn text_paint(annotation: &Annotation, style: &ExportStyle) -> TextPaint {
    TextPaint {
        color: annotation.style.color,
        opacity: annotation.style.opacity,
        font_family: annotation
            .style
            .font_family
            .clone()
            .unwrap_or_else(|| style.default_font_family.clone()),
        font_size: annotation.style.font_size.unwrap_or(style.default_font_size),
    }
}

/// Horizontal line across a quad for underline and strikethrough
fn markup_line(quad: &Quad, markup: MarkupKind) -> (Point, Point) {
    let [ul, ur, ll, lr] = quad.corners();
    let y = match markup {
        MarkupKind::Underline => (ll.y + lr.y) / 2.0,
        _ => (ul.y + ur.y + ll.y + lr.y) / 4.0,
    };
    let bounds = quad.bounds();
    (Point::new(bounds.x, y), Point::new(bounds.x + bounds.width, y))
}

/// End points of the two arrowhead segments, none for zero-length lines
fn arrowhead(start: Point, end: Point, style: &ExportStyle) -> Option<[Point; 2]> {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    if dx.abs() < f32::EPSILON && dy.abs() < f32::EPSILON {
        return None;
    }

    let angle = dy.atan2(dx);
    let spread = style.arrow_head_angle_deg.to_radians();
    let length = style.arrow_head_length;
    let wing = |offset: f32| {
        let a = angle + std::f32::consts::PI + offset;
        Point::new(end.x + length * a.cos(), end.y + length * a.sin())
    };
    Some([wing(-spread), wing(spread)])
}

/// A primitive captured by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Rect { rect: Rect, paint: Paint },
    Ellipse { rect: Rect, paint: Paint },
    Line { start: Point, end: Point, paint: Paint },
    Path { points: Vec<Point>, paint: Paint },
    Text { rect: Rect, text: String, paint: TextPaint },
}

/// One output page as recorded
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordedPage {
    pub source_index: u32,
    pub rotation: u16,
    pub commands: Vec<DrawCommand>,
}

/// Errors from [`RecordingSink`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordingError {
    #[error("output page {page} does not exist (pages={len})")]
    NoSuchPage { page: usize, len: usize },
    #[error("source page {page} out of range (page_count={page_count})")]
    SourceOutOfRange { page: u32, page_count: u32 },
}

/// In-memory sink that records every call per output page
///
/// Used for previews and for checking export without a PDF backend.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    source_page_count: Option<u32>,
    pages: Vec<RecordedPage>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `append_page` calls beyond the source document
    pub fn with_source_page_count(mut self, page_count: u32) -> Self {
        self.source_page_count = Some(page_count);
        self
    }

    fn page_mut(&mut self, page: usize) -> Result<&mut RecordedPage, RecordingError> {
        let len = self.pages.len();
        self.pages.get_mut(page).ok_or(RecordingError::NoSuchPage { page, len })
    }

    fn record(&mut self, page: usize, command: DrawCommand) -> Result<(), RecordingError> {
        self.page_mut(page)?.commands.push(command);
        Ok(())
    }
}

impl PageSink for RecordingSink {
    type Output = Vec<RecordedPage>;
    type Error = RecordingError;

    fn append_page(&mut self, source_index: u32) -> Result<usize, Self::Error> {
        if let Some(page_count) = self.source_page_count {
            if source_index >= page_count {
                return Err(RecordingError::SourceOutOfRange { page: source_index, page_count });
            }
        }
        self.pages.push(RecordedPage { source_index, ..Default::default() });
        Ok(self.pages.len() - 1)
    }

    fn set_rotation(&mut self, page: usize, degrees: u16) -> Result<(), Self::Error> {
        self.page_mut(page)?.rotation = degrees;
        Ok(())
    }

    fn draw_rect(&mut self, page: usize, rect: &Rect, paint: &Paint) -> Result<(), Self::Error> {
        self.record(page, DrawCommand::Rect { rect: *rect, paint: *paint })
    }

    fn draw_ellipse(&mut self, page: usize, rect: &Rect, paint: &Paint) -> Result<(), Self::Error> {
        self.record(page, DrawCommand::Ellipse { rect: *rect, paint: *paint })
    }

    fn draw_line(&mut self, page: usize, start: Point, end: Point, paint: &Paint) -> Result<(), Self::Error> {
        self.record(page, DrawCommand::Line { start, end, paint: *paint })
    }

    fn draw_path(&mut self, page: usize, points: &[Point], paint: &Paint) -> Result<(), Self::Error> {
        self.record(page, DrawCommand::Path { points: points.to_vec(), paint: *paint })
    }

    fn draw_text(&mut self, page: usize, rect: &Rect, text: &str, paint: &TextPaint) -> Result<(), Self::Error> {
        self.record(page, DrawCommand::Text { rect: *rect, text: text.to_owned(), paint: paint.clone() })
    }

    fn finish(self) -> Result<Self::Output, Self::Error> {
        Ok(self.pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationStyle, InkPath};
    use crate::model::DocumentModel;

    fn export(model: &DocumentModel) -> Vec<RecordedPage> {
        export_document(model, RecordingSink::new(), &ExportStyle::default()).unwrap()
    }

    fn single(model: &DocumentModel) -> Vec<DrawCommand> {
        let mut pages = export(model);
        pages.remove(0).commands
    }

    #[test]
    fn test_page_remap_follows_display_order() {
        let remap = page_remap(&[2, 0, 3]);
        assert_eq!(remap.get(&2), Some(&0));
        assert_eq!(remap.get(&0), Some(&1));
        assert_eq!(remap.get(&3), Some(&2));
        assert_eq!(remap.get(&1), None);
    }

    #[test]
    fn test_highlight_fills_quad_bounds() {
        let mut model = DocumentModel::new(1);
        model.insert(Annotation::with_id(
            "h",
            0,
            AnnotationKind::Markup {
                markup: MarkupKind::Highlight,
                quad_points: vec![
                    Quad::from_rect(Rect::new(10.0, 700.0, 100.0, 12.0)),
                    Quad::from_rect(Rect::new(10.0, 686.0, 60.0, 12.0)),
                ],
                selected_text: None,
            },
            AnnotationStyle::yellow_highlight(),
        ));

        let commands = single(&model);
        assert_eq!(commands.len(), 2);
        assert_eq!(
            commands[0],
            DrawCommand::Rect { rect: Rect::new(10.0, 700.0, 100.0, 12.0), paint: Paint::fill(Color::YELLOW, 0.4) }
        );
    }

    #[test]
    fn test_underline_and_strikethrough_positions() {
        let quad = Quad::from_rect(Rect::new(0.0, 100.0, 50.0, 10.0));
        let mut model = DocumentModel::new(1);
        for (id, markup) in [("u", MarkupKind::Underline), ("s", MarkupKind::Strikethrough)] {
            let mut annotation = Annotation::with_id(
                id,
                0,
                AnnotationKind::Markup { markup, quad_points: vec![quad], selected_text: None },
                AnnotationStyle::red_markup(),
            );
            annotation.created_at = if id == "u" { 1 } else { 2 };
            model.insert(annotation);
        }

        let commands = single(&model);
        let lines: Vec<_> = commands
            .iter()
            .map(|command| match command {
                DrawCommand::Line { start, end, .. } => (*start, *end),
                other => panic!("expected a line, got {other:?}"),
            })
            .collect();
        assert_eq!(lines[0], (Point::new(0.0, 100.0), Point::new(50.0, 100.0)));
        assert_eq!(lines[1], (Point::new(0.0, 105.0), Point::new(50.0, 105.0)));
    }

    #[test]
    fn test_arrow_draws_two_head_segments() {
        let mut model = DocumentModel::new(1);
        model.insert(Annotation::with_id(
            "a",
            0,
            AnnotationKind::Line { line: LineKind::Arrow, start: Point::new(0.0, 0.0), end: Point::new(100.0, 0.0) },
            AnnotationStyle::red_markup(),
        ));

        let commands = single(&model);
        assert_eq!(commands.len(), 3);
        for command in &commands[1..] {
            let DrawCommand::Line { start, end, .. } = command else {
                panic!("expected a line");
            };
            assert_eq!(*start, Point::new(100.0, 0.0));
            assert!((start.distance_to(end) - 10.0).abs() < 1e-3);
            // Both wings point back along the shaft at 30 degrees.
            assert!((end.x - (100.0 - 10.0 * 30f32.to_radians().cos())).abs() < 1e-3);
            assert!((end.y.abs() - 5.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_zero_length_arrow_has_no_head() {
        let mut model = DocumentModel::new(1);
        let point = Point::new(5.0, 5.0);
        model.insert(Annotation::with_id(
            "a",
            0,
            AnnotationKind::Line { line: LineKind::Arrow, start: point, end: point },
            AnnotationStyle::red_markup(),
        ));
        assert_eq!(single(&model).len(), 1);
    }

    #[test]
    fn test_note_square_and_text() {
        let mut model = DocumentModel::new(1);
        model.insert(Annotation::with_id(
            "n",
            0,
            AnnotationKind::Note { position: Point::new(20.0, 30.0), content: "todo".into(), is_open: true },
            AnnotationStyle::default(),
        ));
        model.insert(Annotation::with_id(
            "empty",
            0,
            AnnotationKind::Note { position: Point::new(0.0, 0.0), content: String::new(), is_open: false },
            AnnotationStyle::default(),
        ));

        let commands = single(&model);
        let texts: Vec<_> = commands
            .iter()
            .filter_map(|command| match command {
                DrawCommand::Text { rect, text, .. } => Some((rect, text)),
                _ => None,
            })
            .collect();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].0.x, 40.0);
        assert_eq!(texts[0].1, "todo");
        assert_eq!(commands.len(), 3);
    }

    #[test]
    fn test_ink_skips_single_point_paths() {
        let mut model = DocumentModel::new(1);
        model.insert(Annotation::with_id(
            "i",
            0,
            AnnotationKind::Ink {
                paths: vec![
                    InkPath::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0), Point::new(2.0, 0.0)]),
                    InkPath::new(vec![Point::new(9.0, 9.0)]),
                ],
            },
            AnnotationStyle::red_markup(),
        ));
        let commands = single(&model);
        assert_eq!(commands.len(), 1);
        assert!(matches!(&commands[0], DrawCommand::Path { points, .. } if points.len() == 3));
    }

    #[test]
    fn test_text_uses_style_font_or_default() {
        let mut model = DocumentModel::new(1);
        model.insert(Annotation::with_id(
            "t",
            0,
            AnnotationKind::Text { rect: Rect::new(0.0, 0.0, 80.0, 20.0), content: "hello".into() },
            AnnotationStyle::default().with_font("Courier", 9.0),
        ));
        let commands = single(&model);
        let DrawCommand::Text { paint, .. } = &commands[0] else {
            panic!("expected text");
        };
        assert_eq!(paint.font_family, "Courier");
        assert_eq!(paint.font_size, 9.0);
    }

    #[test]
    fn test_shapes_use_default_stroke_width() {
        let mut model = DocumentModel::new(1);
        model.insert(Annotation::with_id(
            "e",
            0,
            AnnotationKind::Shape { shape: ShapeKind::Ellipse, rect: Rect::new(0.0, 0.0, 10.0, 20.0) },
            AnnotationStyle::new(Color::BLUE, 0.5),
        ));
        let commands = single(&model);
        assert_eq!(
            commands[0],
            DrawCommand::Ellipse {
                rect: Rect::new(0.0, 0.0, 10.0, 20.0),
                paint: Paint::fill_and_stroke(Color::BLUE, 1.0, 0.5),
            }
        );
    }

    #[test]
    fn test_structure_edits_are_reflected() {
        let mut model = DocumentModel::new(3);
        model.set_order(vec![2, 0]);
        model.mark_deleted(1);
        model.set_rotation(0, 270);

        let pages = export(&model);
        assert_eq!(pages.len(), 2);
        assert_eq!((pages[0].source_index, pages[0].rotation), (2, 0));
        assert_eq!((pages[1].source_index, pages[1].rotation), (0, 270));
    }

    #[test]
    fn test_sink_errors_propagate() {
        let model = DocumentModel::new(3);
        let sink = RecordingSink::new().with_source_page_count(2);
        let result = export_document(&model, sink, &ExportStyle::default());
        assert_eq!(result, Err(RecordingError::SourceOutOfRange { page: 2, page_count: 2 }));
    }
}
