//! Engine configuration
//!
//! Configuration can be loaded from a JSON file, environment variables, or
//! created programmatically. Every field has a default, so a partial file
//! only overrides what it names.

use crate::geometry::{apply_resize, resize_handles, simplify_path, HandlePosition, Point, Rect, ResizeHandle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {0}")]
    InvalidValue(String),
}

/// Fixed drawing parameters used by the export compositor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportStyle {
    /// Stroke width when an annotation's style leaves it unset
    pub default_stroke_width: f32,
    /// Length of each arrowhead segment, in points
    pub arrow_head_length: f32,
    /// Half-angle between the shaft and each arrowhead segment, in degrees
    pub arrow_head_angle_deg: f32,
    /// Side of the square drawn for a note
    pub note_icon_size: f32,
    /// Gap between the note square and its text
    pub note_text_gap: f32,
    /// Maximum width of a note's text block
    pub note_text_width: f32,
    pub default_font_size: f32,
    pub default_font_family: String,
}

impl Default for ExportStyle {
    fn default() -> Self {
        Self {
            default_stroke_width: 1.0,
            arrow_head_length: 10.0,
            arrow_head_angle_deg: 30.0,
            note_icon_size: 16.0,
            note_text_gap: 4.0,
            note_text_width: 200.0,
            default_font_size: 12.0,
            default_font_family: "Helvetica".to_owned(),
        }
    }
}

/// Interaction and export settings for the edit engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Side of a resize handle in view pixels
    pub handle_size: f32,
    /// Smallest width/height a resize may produce, in document units
    pub min_resize: f32,
    /// Ramer–Douglas–Peucker tolerance applied to finished ink strokes
    pub simplify_epsilon: f32,
    pub export: ExportStyle,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            handle_size: 8.0,
            min_resize: 4.0,
            simplify_epsilon: 0.75,
            export: ExportStyle::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_handle_size(mut self, size: f32) -> Self {
        self.handle_size = size;
        self
    }

    pub fn with_min_resize(mut self, size: f32) -> Self {
        self.min_resize = size;
        self
    }

    pub fn with_simplify_epsilon(mut self, epsilon: f32) -> Self {
        self.simplify_epsilon = epsilon;
        self
    }

    pub fn with_export_style(mut self, export: ExportStyle) -> Self {
        self.export = export;
        self
    }

    /// Resize handles of `rect` at the configured handle size
    pub fn resize_handles(&self, rect: &Rect) -> [ResizeHandle; 8] {
        resize_handles(rect, self.handle_size)
    }

    /// Drag `handle`, never shrinking below the configured minimum
    pub fn apply_resize(&self, rect: &Rect, handle: HandlePosition, dx: f32, dy: f32) -> Rect {
        apply_resize(rect, handle, dx, dy, self.min_resize)
    }

    /// Simplify a finished ink stroke with the configured tolerance
    pub fn simplify(&self, points: &[Point]) -> Vec<Point> {
        simplify_path(points, self.simplify_epsilon)
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `MARKUP_HANDLE_SIZE`: resize handle size (default: 8)
    /// - `MARKUP_MIN_RESIZE`: minimum resize size (default: 4)
    /// - `MARKUP_SIMPLIFY_EPSILON`: ink simplification tolerance (default: 0.75)
    /// - `MARKUP_ARROW_HEAD_LENGTH`: exported arrowhead length (default: 10)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = env_f32("MARKUP_HANDLE_SIZE")? {
            config.handle_size = value;
        }
        if let Some(value) = env_f32("MARKUP_MIN_RESIZE")? {
            config.min_resize = value;
        }
        if let Some(value) = env_f32("MARKUP_SIMPLIFY_EPSILON")? {
            config.simplify_epsilon = value;
        }
        if let Some(value) = env_f32("MARKUP_ARROW_HEAD_LENGTH")? {
            config.export.arrow_head_length = value;
        }

        Ok(config)
    }

    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }
}

fn env_f32(key: &str) -> Result<Option<f32>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(Some)
            .ok_or_else(|| ConfigError::InvalidValue(key.to_owned())),
        Err(_) => Ok(None),
    }
}
