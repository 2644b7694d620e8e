//! Operation log with linear undo/redo
//!
//! Every user edit becomes one [`Operation`]. Before an operation is logged
//! the engine validates it against the model and fills in the prior state it
//! needs to invert itself, so undo never consults anything outside the
//! operation. Rejected operations leave the model untouched and are not
//! recorded.

use crate::annotation::{now_millis, Annotation, AnnotationId, AnnotationPatch, PatchField};
use crate::config::{EngineConfig, ExportStyle};
use crate::export::{export_document, PageSink};
use crate::model::{normalize_rotation, sorted_snapshot, DocumentModel, ModelStore};

/// Validation failures and replay errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("annotation {0} not found")]
    AnnotationNotFound(AnnotationId),
    #[error("annotation {0} already exists")]
    DuplicateAnnotation(AnnotationId),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("page {0} is deleted")]
    PageDeleted(u32),
    #[error("cannot delete the last remaining page")]
    LastPage,
    #[error("rotation delta {0} is not a multiple of 90 degrees")]
    InvalidRotation(i32),
    #[error("display position {position} out of range (pages shown={len})")]
    DisplayPositionOutOfRange { position: usize, len: usize },
    #[error("update carries no changes")]
    EmptyChanges,
    #[error("field {field} does not apply to {kind} annotations")]
    FieldNotApplicable { field: PatchField, kind: &'static str },
    #[error("operation would not change the document")]
    NoChange,
    #[error("logged operation no longer matches the model: {0}")]
    InconsistentLog(String),
}

/// One invertible edit
///
/// Prior-state fields (`previous_state`, `previous_rotation`, the deleted
/// annotation snapshot and `display_position`) are captured by
/// [`OpsLog::apply`]; whatever the caller puts there is replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    AddAnnotation {
        annotation: Annotation,
    },
    UpdateAnnotation {
        annotation_id: AnnotationId,
        changes: AnnotationPatch,
        previous_state: AnnotationPatch,
    },
    DeleteAnnotation {
        /// Complete snapshot so undo can resurrect it
        annotation: Annotation,
    },
    RotatePage {
        page_index: u32,
        delta: i32,
        previous_rotation: u16,
    },
    DeletePage {
        page_index: u32,
        /// Position in the display order at deletion time
        display_position: usize,
    },
    ReorderPages {
        from_index: usize,
        to_index: usize,
    },
}

impl Operation {
    pub fn add_annotation(annotation: Annotation) -> Self {
        Operation::AddAnnotation { annotation }
    }

    pub fn update_annotation(annotation_id: impl Into<AnnotationId>, changes: AnnotationPatch) -> Self {
        Operation::UpdateAnnotation {
            annotation_id: annotation_id.into(),
            changes,
            previous_state: AnnotationPatch::default(),
        }
    }

    pub fn delete_annotation(annotation: Annotation) -> Self {
        Operation::DeleteAnnotation { annotation }
    }

    pub fn rotate_page(page_index: u32, delta: i32) -> Self {
        Operation::RotatePage { page_index, delta, previous_rotation: 0 }
    }

    pub fn delete_page(page_index: u32) -> Self {
        Operation::DeletePage { page_index, display_position: 0 }
    }

    /// Move the page at display position `from_index` to `to_index`
    pub fn reorder_pages(from_index: usize, to_index: usize) -> Self {
        Operation::ReorderPages { from_index, to_index }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::AddAnnotation { .. } => "add_annotation",
            Operation::UpdateAnnotation { .. } => "update_annotation",
            Operation::DeleteAnnotation { .. } => "delete_annotation",
            Operation::RotatePage { .. } => "rotate_page",
            Operation::DeletePage { .. } => "delete_page",
            Operation::ReorderPages { .. } => "reorder_pages",
        }
    }
}

/// The single writer of document edit state
pub struct OpsLog<M: ModelStore = DocumentModel> {
    model: M,
    config: EngineConfig,

    /// Every operation ever applied, in order
    history: Vec<Operation>,
    undo_stack: Vec<Operation>,
    redo_stack: Vec<Operation>,
}

impl OpsLog<DocumentModel> {
    /// Create an engine over an empty model for a document with `page_count` pages
    pub fn new(page_count: u32) -> Self {
        Self::with_model(DocumentModel::new(page_count))
    }
}

impl<M: ModelStore> OpsLog<M> {
    pub fn with_model(model: M) -> Self {
        Self {
            model,
            config: EngineConfig::default(),
            history: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_export_style(mut self, export_style: ExportStyle) -> Self {
        self.config.export = export_style;
        self
    }

    /// Interaction settings for editors driving this log
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Read-only view of the model for renderers
    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn history(&self) -> &[Operation] {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn by_page(&self, page_index: u32) -> Vec<&Annotation> {
        self.model.by_page(page_index)
    }

    pub fn by_id(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.model.by_id(id)
    }

    /// Clone of every annotation, for persistence
    pub fn snapshot_annotations(&self) -> Vec<Annotation> {
        sorted_snapshot(self.model.all_annotations())
    }

    /// Validate, record and perform an edit
    ///
    /// # Errors
    /// Returns a validation error if the edit is impossible or would change
    /// nothing; the model and the log are then left as they were.
    pub fn apply(&mut self, operation: Operation) -> Result<(), EditError> {
        let operation = match self.prepare(operation) {
            Ok(operation) => operation,
            Err(err) => {
                tracing::debug!(error = %err, "rejected operation");
                return Err(err);
            }
        };

        forward(&mut self.model, &operation)?;
        tracing::debug!(op = operation.name(), "applied operation");

        self.history.push(operation.clone());
        self.undo_stack.push(operation);
        self.redo_stack.clear();
        Ok(())
    }

    /// Delete an annotation by id, snapshotting it for undo
    pub fn delete_annotation(&mut self, id: &AnnotationId) -> Result<(), EditError> {
        let annotation =
            self.model.by_id(id).cloned().ok_or_else(|| EditError::AnnotationNotFound(id.clone()))?;
        self.apply(Operation::delete_annotation(annotation))
    }

    /// Revert the most recent operation
    ///
    /// Returns `Ok(false)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<bool, EditError> {
        let Some(operation) = self.undo_stack.pop() else {
            return Ok(false);
        };

        if let Err(err) = reverse(&mut self.model, &operation) {
            tracing::warn!(op = operation.name(), error = %err, "undo failed");
            self.undo_stack.push(operation);
            return Err(err);
        }

        tracing::debug!(op = operation.name(), "undid operation");
        self.redo_stack.push(operation);
        Ok(true)
    }

    /// Re-apply the most recently undone operation
    ///
    /// Returns `Ok(false)` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<bool, EditError> {
        let Some(operation) = self.redo_stack.pop() else {
            return Ok(false);
        };

        if let Err(err) = forward(&mut self.model, &operation) {
            tracing::warn!(op = operation.name(), error = %err, "redo failed");
            self.redo_stack.push(operation);
            return Err(err);
        }

        tracing::debug!(op = operation.name(), "redid operation");
        self.undo_stack.push(operation);
        Ok(true)
    }

    /// Produce the output document through `sink`
    ///
    /// Errors from the sink are returned unchanged; the model is never touched.
    pub fn export_with<S: PageSink>(&self, sink: S) -> Result<S::Output, S::Error> {
        export_document(&self.model, sink, &self.config.export)
    }

    /// Tear down all state when the document closes
    pub fn close(&mut self) {
        self.model.clear();
        self.history.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    fn check_page(&self, page_index: u32) -> Result<(), EditError> {
        let page_count = self.model.page_count();
        if page_index >= page_count {
            return Err(EditError::PageOutOfRange { page: page_index, page_count });
        }
        if self.model.is_deleted(page_index) {
            return Err(EditError::PageDeleted(page_index));
        }
        Ok(())
    }

    fn current(&self, id: &AnnotationId) -> Result<&Annotation, EditError> {
        self.model.by_id(id).ok_or_else(|| EditError::AnnotationNotFound(id.clone()))
    }

    /// Validate against the model and capture the prior state for undo
    fn prepare(&self, operation: Operation) -> Result<Operation, EditError> {
        match operation {
            Operation::AddAnnotation { annotation } => {
                self.check_page(annotation.page_index)?;
                if self.model.by_id(&annotation.id).is_some() {
                    return Err(EditError::DuplicateAnnotation(annotation.id));
                }
                Ok(Operation::AddAnnotation { annotation })
            }

            Operation::UpdateAnnotation { annotation_id, mut changes, .. } => {
                let current = self.current(&annotation_id)?;
                if changes.is_empty() {
                    return Err(EditError::EmptyChanges);
                }
                let stamp = changes.updated_at.unwrap_or_else(now_millis);
                changes.updated_at = Some(stamp.max(current.updated_at));
                let previous_state = AnnotationPatch::snapshot_of(current, &changes).map_err(|field| {
                    EditError::FieldNotApplicable { field, kind: current.kind_name() }
                })?;
                Ok(Operation::UpdateAnnotation { annotation_id, changes, previous_state })
            }

            Operation::DeleteAnnotation { annotation } => {
                let snapshot = self.current(&annotation.id)?.clone();
                Ok(Operation::DeleteAnnotation { annotation: snapshot })
            }

            Operation::RotatePage { page_index, delta, .. } => {
                self.check_page(page_index)?;
                if delta % 90 != 0 {
                    return Err(EditError::InvalidRotation(delta));
                }
                if delta % 360 == 0 {
                    return Err(EditError::NoChange);
                }
                let previous_rotation = self.model.rotation(page_index);
                Ok(Operation::RotatePage { page_index, delta, previous_rotation })
            }

            Operation::DeletePage { page_index, .. } => {
                self.check_page(page_index)?;
                let order = self.model.display_order();
                if order.len() <= 1 {
                    return Err(EditError::LastPage);
                }
                let display_position = order.iter().position(|&page| page == page_index).ok_or_else(|| {
                    EditError::InconsistentLog(format!("page {page_index} missing from display order"))
                })?;
                Ok(Operation::DeletePage { page_index, display_position })
            }

            Operation::ReorderPages { from_index, to_index } => {
                let len = self.model.display_order().len();
                for position in [from_index, to_index] {
                    if position >= len {
                        return Err(EditError::DisplayPositionOutOfRange { position, len });
                    }
                }
                if from_index == to_index {
                    return Err(EditError::NoChange);
                }
                Ok(Operation::ReorderPages { from_index, to_index })
            }
        }
    }
}

/// Move one display-order entry, shifting the others
fn moved(order: &[u32], from: usize, to: usize) -> Result<Vec<u32>, EditError> {
    if from >= order.len() || to >= order.len() {
        return Err(EditError::InconsistentLog(format!(
            "cannot move display position {from} to {to} in {} pages",
            order.len()
        )));
    }
    let mut order = order.to_vec();
    let page = order.remove(from);
    order.insert(to, page);
    Ok(order)
}

fn inconsistent(operation: &Operation, detail: impl std::fmt::Display) -> EditError {
    EditError::InconsistentLog(format!("{}: {detail}", operation.name()))
}

/// Perform the forward mutation of a prepared operation
fn forward<M: ModelStore>(model: &mut M, operation: &Operation) -> Result<(), EditError> {
    match operation {
        Operation::AddAnnotation { annotation } => {
            if !model.insert(annotation.clone()) {
                return Err(inconsistent(operation, format!("annotation {} already present", annotation.id)));
            }
        }
        Operation::UpdateAnnotation { annotation_id, changes, .. } => {
            if !model.patch(annotation_id, changes) {
                return Err(inconsistent(operation, format!("annotation {annotation_id} missing")));
            }
        }
        Operation::DeleteAnnotation { annotation } => {
            if model.remove(&annotation.id).is_none() {
                return Err(inconsistent(operation, format!("annotation {} missing", annotation.id)));
            }
        }
        Operation::RotatePage { page_index, delta, previous_rotation } => {
            let rotation = normalize_rotation(i32::from(*previous_rotation) + delta.rem_euclid(360));
            model.set_rotation(*page_index, i32::from(rotation));
        }
        Operation::DeletePage { page_index, .. } => {
            let order = model.display_order();
            let position = order
                .iter()
                .position(|page| page == page_index)
                .ok_or_else(|| inconsistent(operation, format!("page {page_index} not displayed")))?;
            let mut order = order.to_vec();
            order.remove(position);
            model.set_order(order);
            model.mark_deleted(*page_index);
        }
        Operation::ReorderPages { from_index, to_index } => {
            let order = moved(model.display_order(), *from_index, *to_index)?;
            model.set_order(order);
        }
    }
    Ok(())
}

/// Perform the inverse mutation of a logged operation
fn reverse<M: ModelStore>(model: &mut M, operation: &Operation) -> Result<(), EditError> {
    match operation {
        Operation::AddAnnotation { annotation } => {
            if model.remove(&annotation.id).is_none() {
                return Err(inconsistent(operation, format!("annotation {} missing", annotation.id)));
            }
        }
        Operation::UpdateAnnotation { annotation_id, previous_state, .. } => {
            if !model.patch(annotation_id, previous_state) {
                return Err(inconsistent(operation, format!("annotation {annotation_id} missing")));
            }
        }
        Operation::DeleteAnnotation { annotation } => {
            if !model.insert(annotation.clone()) {
                return Err(inconsistent(operation, format!("annotation {} already present", annotation.id)));
            }
        }
        Operation::RotatePage { page_index, previous_rotation, .. } => {
            model.set_rotation(*page_index, i32::from(*previous_rotation));
        }
        Operation::DeletePage { page_index, display_position } => {
            let order = model.display_order();
            if order.contains(page_index) {
                return Err(inconsistent(operation, format!("page {page_index} already displayed")));
            }
            let mut order = order.to_vec();
            let position = (*display_position).min(order.len());
            order.insert(position, *page_index);
            model.set_order(order);
            model.unmark_deleted(*page_index);
        }
        Operation::ReorderPages { from_index, to_index } => {
            let order = moved(model.display_order(), *to_index, *from_index)?;
            model.set_order(order);
        }
    }
    Ok(())
}
