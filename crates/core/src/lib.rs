//! Markup edit-state engine
//!
//! Annotation and page-structure state for an open PDF, the operation log
//! that mutates it with linear undo/redo, and the export compositor that
//! turns it into an output document through a [`PageSink`].

pub mod annotation;
pub mod config;
pub mod export;
pub mod geometry;
pub mod model;
pub mod ops_log;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationPatch, AnnotationStyle, Color, InkPath, LineKind,
    MarkupKind, PatchField, ShapeKind,
};
pub use config::{ConfigError, EngineConfig, ExportStyle};
pub use export::{
    export_document, page_remap, DrawCommand, PageSink, Paint, RecordedPage, RecordingError, RecordingSink,
    TextPaint,
};
pub use geometry::{
    apply_resize, bounding_box_of, point_in_quad, point_in_rect, point_to_document_space, point_to_view_space,
    quad_to_document_space, quad_to_view_space, rect_to_document_space, rect_to_view_space, resize_handles,
    simplify_path, HandlePosition, PageViewport, Point, Quad, Rect, ResizeHandle, ViewportConversion,
    ViewportError,
};
pub use model::{DocumentModel, ModelState, ModelStore};
pub use ops_log::{EditError, OpsLog, Operation};
