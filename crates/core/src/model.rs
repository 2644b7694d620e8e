//! Annotation and page-structure state
//!
//! The model is deliberately dumb: it stores annotations, per-page rotation,
//! deleted pages and the display order, and exposes raw mutators. It never
//! computes inverses or records history; that belongs to
//! [`OpsLog`](crate::ops_log::OpsLog), which drives the model through the
//! [`ModelStore`] trait so it can be tested against a double.

use crate::annotation::{Annotation, AnnotationId, AnnotationPatch};
use crate::geometry::Point;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Normalize a rotation to `[0, 360)`
pub fn normalize_rotation(degrees: i32) -> u16 {
    degrees.rem_euclid(360) as u16
}

/// Clone annotations into a stable order (page, creation time, id)
pub fn sorted_snapshot<'a>(annotations: impl IntoIterator<Item = &'a Annotation>) -> Vec<Annotation> {
    let mut snapshot: Vec<Annotation> = annotations.into_iter().cloned().collect();
    snapshot.sort_by(|a, b| (a.page_index, a.created_at, &a.id).cmp(&(b.page_index, b.created_at, &b.id)));
    snapshot
}

/// Read and raw-write access to document edit state
pub trait ModelStore {
    /// Number of pages in the source document (never changes)
    fn page_count(&self) -> u32;
    fn by_id(&self, id: &AnnotationId) -> Option<&Annotation>;
    fn by_page(&self, page_index: u32) -> Vec<&Annotation>;
    /// Every annotation, including those on deleted pages
    fn all_annotations(&self) -> Vec<&Annotation>;
    /// Accumulated rotation of an original page, normalized
    fn rotation(&self, page_index: u32) -> u16;
    fn is_deleted(&self, page_index: u32) -> bool;
    fn display_order(&self) -> &[u32];

    /// Insert an annotation; returns false if the id is already present
    fn insert(&mut self, annotation: Annotation) -> bool;
    fn remove(&mut self, id: &AnnotationId) -> Option<Annotation>;
    /// Overwrite the fields in `patch`; returns false if the id is unknown
    fn patch(&mut self, id: &AnnotationId, patch: &AnnotationPatch) -> bool;
    fn set_rotation(&mut self, page_index: u32, degrees: i32);
    fn mark_deleted(&mut self, page_index: u32);
    fn unmark_deleted(&mut self, page_index: u32);
    fn set_order(&mut self, order: Vec<u32>);
    /// Drop every annotation and structural edit
    fn clear(&mut self);
}

/// Structural and annotation state compared for deep equality
#[derive(Debug, Clone, PartialEq)]
pub struct ModelState {
    pub annotations: BTreeMap<AnnotationId, Annotation>,
    pub page_rotations: BTreeMap<u32, u16>,
    pub deleted_pages: BTreeSet<u32>,
    pub display_order: Vec<u32>,
}

/// Canonical in-memory edit state for one open document
#[derive(Debug, Clone)]
pub struct DocumentModel {
    page_count: u32,

    /// All annotations indexed by ID
    annotations: HashMap<AnnotationId, Annotation>,

    /// Annotation IDs per original page
    by_page: HashMap<u32, Vec<AnnotationId>>,

    /// Non-zero rotations only
    page_rotations: BTreeMap<u32, u16>,

    deleted_pages: BTreeSet<u32>,

    display_order: Vec<u32>,
}

impl DocumentModel {
    /// Create an empty model for a freshly loaded document
    pub fn new(page_count: u32) -> Self {
        Self {
            page_count,
            annotations: HashMap::new(),
            by_page: HashMap::new(),
            page_rotations: BTreeMap::new(),
            deleted_pages: BTreeSet::new(),
            display_order: (0..page_count).collect(),
        }
    }

    /// Restore a model from persisted annotations
    ///
    /// Annotations on pages the document does not have, and repeated IDs,
    /// are dropped.
    pub fn with_annotations(page_count: u32, annotations: impl IntoIterator<Item = Annotation>) -> Self {
        let mut model = Self::new(page_count);
        for annotation in annotations {
            if annotation.page_index >= page_count {
                tracing::warn!(
                    id = %annotation.id,
                    page = annotation.page_index,
                    page_count,
                    "dropping persisted annotation on missing page"
                );
                continue;
            }
            let id = annotation.id.clone();
            if !model.insert(annotation) {
                tracing::warn!(%id, "dropping duplicate persisted annotation");
            }
        }
        model
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn deleted_pages(&self) -> &BTreeSet<u32> {
        &self.deleted_pages
    }

    /// Non-zero page rotations keyed by original index
    pub fn page_rotations(&self) -> &BTreeMap<u32, u16> {
        &self.page_rotations
    }

    /// All annotations in a stable order (page, creation time, id)
    pub fn snapshot_annotations(&self) -> Vec<Annotation> {
        sorted_snapshot(self.all_annotations())
    }

    /// Annotations on `page_index` hit by a document-space point
    pub fn hit_test(&self, page_index: u32, point: &Point, tolerance: f32) -> Vec<&Annotation> {
        self.by_page(page_index)
            .into_iter()
            .filter(|annotation| annotation.hit_test(point, tolerance))
            .collect()
    }

    /// Full state for deep-equality checks
    pub fn state(&self) -> ModelState {
        ModelState {
            annotations: self
                .annotations
                .iter()
                .map(|(id, annotation)| (id.clone(), annotation.clone()))
                .collect(),
            page_rotations: self.page_rotations.clone(),
            deleted_pages: self.deleted_pages.clone(),
            display_order: self.display_order.clone(),
        }
    }
}

impl ModelStore for DocumentModel {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn by_id(&self, id: &AnnotationId) -> Option<&Annotation> {
        self.annotations.get(id)
    }

    fn by_page(&self, page_index: u32) -> Vec<&Annotation> {
        self.by_page
            .get(&page_index)
            .map(|ids| ids.iter().filter_map(|id| self.annotations.get(id)).collect())
            .unwrap_or_default()
    }

    fn all_annotations(&self) -> Vec<&Annotation> {
        self.annotations.values().collect()
    }

    fn rotation(&self, page_index: u32) -> u16 {
        self.page_rotations.get(&page_index).copied().unwrap_or(0)
    }

    fn is_deleted(&self, page_index: u32) -> bool {
        self.deleted_pages.contains(&page_index)
    }

    fn display_order(&self) -> &[u32] {
        &self.display_order
    }

    fn insert(&mut self, annotation: Annotation) -> bool {
        if self.annotations.contains_key(&annotation.id) {
            return false;
        }
        let id = annotation.id.clone();
        self.by_page.entry(annotation.page_index).or_default().push(id.clone());
        self.annotations.insert(id, annotation);
        true
    }

    fn remove(&mut self, id: &AnnotationId) -> Option<Annotation> {
        let annotation = self.annotations.remove(id)?;
        if let Some(page_annotations) = self.by_page.get_mut(&annotation.page_index) {
            page_annotations.retain(|aid| aid != id);
            if page_annotations.is_empty() {
                self.by_page.remove(&annotation.page_index);
            }
        }
        Some(annotation)
    }

    fn patch(&mut self, id: &AnnotationId, patch: &AnnotationPatch) -> bool {
        match self.annotations.get_mut(id) {
            Some(annotation) => {
                annotation.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    fn set_rotation(&mut self, page_index: u32, degrees: i32) {
        match normalize_rotation(degrees) {
            0 => {
                self.page_rotations.remove(&page_index);
            }
            normalized => {
                self.page_rotations.insert(page_index, normalized);
            }
        }
    }

    fn mark_deleted(&mut self, page_index: u32) {
        self.deleted_pages.insert(page_index);
    }

    fn unmark_deleted(&mut self, page_index: u32) {
        self.deleted_pages.remove(&page_index);
    }

    fn set_order(&mut self, order: Vec<u32>) {
        self.display_order = order;
    }

    fn clear(&mut self) {
        self.annotations.clear();
        self.by_page.clear();
        self.page_rotations.clear();
        self.deleted_pages.clear();
        self.display_order = (0..self.page_count).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationKind, AnnotationStyle, ShapeKind};
    use crate::geometry::Rect;

    fn rectangle(id: &str, page: u32) -> Annotation {
        Annotation::with_id(
            id,
            page,
            AnnotationKind::Shape { shape: ShapeKind::Rectangle, rect: Rect::new(10.0, 10.0, 50.0, 40.0) },
            AnnotationStyle::red_markup(),
        )
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(0), 0);
        assert_eq!(normalize_rotation(450), 90);
        assert_eq!(normalize_rotation(-90), 270);
        assert_eq!(normalize_rotation(-720), 0);
    }

    #[test]
    fn test_new_model_has_identity_order() {
        let model = DocumentModel::new(4);
        assert_eq!(model.display_order(), &[0, 1, 2, 3]);
        assert!(model.deleted_pages().is_empty());
        assert_eq!(model.rotation(2), 0);
    }

    #[test]
    fn test_insert_and_query_by_page() {
        let mut model = DocumentModel::new(3);
        assert!(model.insert(rectangle("a", 0)));
        assert!(model.insert(rectangle("b", 1)));
        assert!(model.insert(rectangle("c", 1)));
        assert!(!model.insert(rectangle("c", 2)));

        assert_eq!(model.annotation_count(), 3);
        assert_eq!(model.by_page(1).len(), 2);
        assert!(model.by_page(2).is_empty());
        assert_eq!(model.by_id(&"a".into()).map(|a| a.page_index), Some(0));
    }

    #[test]
    fn test_remove_cleans_page_index() {
        let mut model = DocumentModel::new(2);
        model.insert(rectangle("a", 1));
        let removed = model.remove(&"a".into()).expect("annotation should exist");
        assert_eq!(removed.id, AnnotationId::from("a"));
        assert!(model.by_page(1).is_empty());
        assert!(model.remove(&"a".into()).is_none());
    }

    #[test]
    fn test_set_rotation_normalizes_and_forgets_zero() {
        let mut model = DocumentModel::new(2);
        model.set_rotation(1, -90);
        assert_eq!(model.rotation(1), 270);
        model.set_rotation(1, 360);
        assert_eq!(model.rotation(1), 0);
        assert!(model.page_rotations().is_empty());
    }

    #[test]
    fn test_snapshot_is_sorted_by_page() {
        let mut model = DocumentModel::new(3);
        model.insert(rectangle("z", 2));
        model.insert(rectangle("y", 0));
        let ids: Vec<_> = model.snapshot_annotations().into_iter().map(|a| a.page_index).collect();
        assert_eq!(ids, vec![0, 2]);
    }

    #[test]
    fn test_with_annotations_drops_out_of_range() {
        let model = DocumentModel::with_annotations(2, vec![rectangle("a", 0), rectangle("b", 5)]);
        assert_eq!(model.annotation_count(), 1);
    }

    #[test]
    fn test_clear_resets_structure() {
        let mut model = DocumentModel::new(3);
        model.insert(rectangle("a", 0));
        model.set_rotation(0, 90);
        model.mark_deleted(2);
        model.set_order(vec![1, 0]);

        model.clear();
        assert_eq!(model.state(), DocumentModel::new(3).state());
    }

    #[test]
    fn test_hit_test_filters_page() {
        let mut model = DocumentModel::new(2);
        model.insert(rectangle("a", 0));
        model.insert(rectangle("b", 1));
        let hits = model.hit_test(0, &Point::new(20.0, 20.0), 0.0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, AnnotationId::from("a"));
    }
}
