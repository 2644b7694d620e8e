//! lopdf backend for the export compositor
//!
//! [`LopdfPageSink`] builds a new PDF from a source document: every appended
//! page is deep-copied with its inherited attributes resolved, user rotation
//! is added to the page's own `/Rotate`, and annotation primitives are drawn
//! into an extra content stream layered over the original page content.

mod canvas;
mod copy;

use canvas::PageCanvas;
use copy::{number, page_tree_map, resolve, ObjectCopier};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use markup_core::{ModelStore, OpsLog, PageSink, Paint, Point, Rect, TextPaint};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PdfSinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("source page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("output page {page} does not exist (pages={len})")]
    NoSuchOutputPage { page: usize, len: usize },
    #[error("source page {0} was already appended")]
    DuplicatePage(u32),
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
}

struct OutputPage {
    id: ObjectId,
    source_index: u32,
    canvas: PageCanvas,
}

/// [`PageSink`] writing a new PDF document with lopdf
pub struct LopdfPageSink {
    source: Document,
    /// Source page object ids by zero-based page index
    source_pages: Vec<ObjectId>,
    target: Document,
    pages_id: ObjectId,
    id_map: HashMap<ObjectId, ObjectId>,
    pages: Vec<OutputPage>,
}

impl LopdfPageSink {
    /// Create an empty output document that copies pages from `source`
    pub fn new(source: Document) -> Result<Self, PdfSinkError> {
        if source.is_encrypted() {
            return Err(PdfSinkError::EncryptedUnsupported);
        }

        let source_pages: Vec<ObjectId> = source.get_pages().into_values().collect();
        let mut target = Document::with_version(source.version.clone());
        let pages_id = target.new_object_id();
        let id_map = page_tree_map(&source, &source_pages, &mut target, pages_id);

        Ok(Self { source, source_pages, target, pages_id, id_map, pages: Vec::new() })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfSinkError> {
        Self::new(Document::load_mem(bytes)?)
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, PdfSinkError> {
        Self::new(Document::load(path)?)
    }

    pub fn source_page_count(&self) -> u32 {
        self.source_pages.len() as u32
    }

    fn page_mut(&mut self, page: usize) -> Result<&mut OutputPage, PdfSinkError> {
        let len = self.pages.len();
        self.pages.get_mut(page).ok_or(PdfSinkError::NoSuchOutputPage { page, len })
    }

    fn canvas(&mut self, page: usize) -> Result<&mut PageCanvas, PdfSinkError> {
        Ok(&mut self.page_mut(page)?.canvas)
    }

    /// Wrap the original content in `q`/`Q` and append the overlay stream
    fn write_overlay(&mut self, page_id: ObjectId, canvas: PageCanvas) -> Result<(), PdfSinkError> {
        let page = self.target.get_dictionary(page_id)?;
        let (origin_x, origin_y) = media_box_origin(&self.target, page)?;
        let existing = match page.get(b"Contents") {
            Ok(Object::Array(items)) => items.clone(),
            Ok(object) => vec![object.clone()],
            Err(_) => Vec::new(),
        };

        let mut operations = vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("cm", vec![1.into(), 0.into(), 0.into(), 1.into(), origin_x.into(), origin_y.into()]),
        ];
        operations.extend(canvas.operations);
        operations.push(Operation::new("Q", vec![]));

        let prefix = Content { operations: vec![Operation::new("q", vec![])] }.encode()?;
        let overlay = Content { operations }.encode()?;
        let prefix_id = self.target.add_object(Stream::new(dictionary! {}, prefix));
        let overlay_id = self.target.add_object(Stream::new(dictionary! {}, overlay));

        let mut contents = vec![Object::Reference(prefix_id)];
        contents.extend(existing);
        contents.push(Object::Reference(overlay_id));

        let mut resources = match self.target.get_dictionary(page_id)?.get(b"Resources") {
            Ok(object) => resolve(&self.target, object)?.as_dict()?.clone(),
            Err(_) => Dictionary::new(),
        };
        let graphics_states = canvas.graphics_states.into_iter().map(|(name, opacity)| {
            (name, Object::Dictionary(dictionary! { "Type" => "ExtGState", "CA" => opacity, "ca" => opacity }))
        });
        add_resources(&self.target, &mut resources, "ExtGState", graphics_states)?;
        let fonts = canvas.fonts.into_iter().map(|(name, base_font)| {
            let font = dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base_font,
                "Encoding" => "WinAnsiEncoding",
            };
            (name, Object::Dictionary(font))
        });
        add_resources(&self.target, &mut resources, "Font", fonts)?;

        let page = self.target.get_dictionary_mut(page_id)?;
        page.set("Contents", Object::Array(contents));
        page.set("Resources", Object::Dictionary(resources));
        Ok(())
    }
}

/// Merge entries into a resource category, copying a shared sub-dictionary first
fn add_resources(
    doc: &Document,
    resources: &mut Dictionary,
    category: &str,
    entries: impl Iterator<Item = (String, Object)>,
) -> Result<(), lopdf::Error> {
    let mut entries = entries.peekable();
    if entries.peek().is_none() {
        return Ok(());
    }
    let mut dict = match resources.get(category.as_bytes()) {
        Ok(object) => resolve(doc, object)?.as_dict()?.clone(),
        Err(_) => Dictionary::new(),
    };
    for (name, object) in entries {
        dict.set(name, object);
    }
    resources.set(category, Object::Dictionary(dict));
    Ok(())
}

fn media_box_origin(doc: &Document, page: &Dictionary) -> Result<(f32, f32), lopdf::Error> {
    let Ok(media_box) = page.get(b"MediaBox") else {
        return Ok((0.0, 0.0));
    };
    let values: Vec<f32> = resolve(doc, media_box)?.as_array()?.iter().filter_map(number).collect();
    match values.as_slice() {
        [x1, y1, x2, y2] => Ok((x1.min(*x2), y1.min(*y2))),
        _ => Ok((0.0, 0.0)),
    }
}

impl PageSink for LopdfPageSink {
    type Output = Vec<u8>;
    type Error = PdfSinkError;

    fn append_page(&mut self, source_index: u32) -> Result<usize, Self::Error> {
        let page_count = self.source_page_count();
        let source_id = *self
            .source_pages
            .get(source_index as usize)
            .ok_or(PdfSinkError::PageOutOfRange { page: source_index, page_count })?;
        if self.pages.iter().any(|page| page.source_index == source_index) {
            return Err(PdfSinkError::DuplicatePage(source_index));
        }

        let mut copier = ObjectCopier::new(&self.source, &mut self.target, &mut self.id_map);
        let page_id = copier.copy_page(source_id)?;
        self.target.get_dictionary_mut(page_id)?.set("Parent", Object::Reference(self.pages_id));

        tracing::debug!(source_index, output_index = self.pages.len(), "copied page");
        self.pages.push(OutputPage { id: page_id, source_index, canvas: PageCanvas::default() });
        Ok(self.pages.len() - 1)
    }

    fn set_rotation(&mut self, page: usize, degrees: u16) -> Result<(), Self::Error> {
        let page_id = self.page_mut(page)?.id;
        let dict = self.target.get_dictionary_mut(page_id)?;
        let intrinsic = dict.get(b"Rotate").ok().and_then(number).unwrap_or(0.0) as i64;
        let rotation = (intrinsic + i64::from(degrees)).rem_euclid(360);
        dict.set("Rotate", rotation);
        Ok(())
    }

    fn draw_rect(&mut self, page: usize, rect: &Rect, paint: &Paint) -> Result<(), Self::Error> {
        self.canvas(page)?.rect(rect, paint);
        Ok(())
    }

    fn draw_ellipse(&mut self, page: usize, rect: &Rect, paint: &Paint) -> Result<(), Self::Error> {
        self.canvas(page)?.ellipse(rect, paint);
        Ok(())
    }

    fn draw_line(&mut self, page: usize, start: Point, end: Point, paint: &Paint) -> Result<(), Self::Error> {
        self.canvas(page)?.line(start, end, paint);
        Ok(())
    }

    fn draw_path(&mut self, page: usize, points: &[Point], paint: &Paint) -> Result<(), Self::Error> {
        self.canvas(page)?.path(points, paint);
        Ok(())
    }

    fn draw_text(&mut self, page: usize, rect: &Rect, text: &str, paint: &TextPaint) -> Result<(), Self::Error> {
        self.canvas(page)?.text(rect, text, paint);
        Ok(())
    }

    fn finish(mut self) -> Result<Self::Output, Self::Error> {
        let pages = std::mem::take(&mut self.pages);
        let mut kids = Vec::with_capacity(pages.len());
        for page in pages {
            if !page.canvas.is_empty() {
                self.write_overlay(page.id, page.canvas)?;
            }
            kids.push(Object::Reference(page.id));
        }

        let count = kids.len() as i64;
        self.target.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => kids, "Count" => count }),
        );
        let catalog_id = self.target.add_object(dictionary! { "Type" => "Catalog", "Pages" => self.pages_id });
        self.target.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        self.target.save_to(&mut bytes)?;
        tracing::info!(pages = count, bytes = bytes.len(), "wrote PDF");
        Ok(bytes)
    }
}

/// Export the edited document as PDF bytes
pub fn export_pdf<M: ModelStore>(log: &OpsLog<M>, source: Document) -> Result<Vec<u8>, PdfSinkError> {
    log.export_with(LopdfPageSink::new(source)?)
}
