//! Annotation snapshot persistence
//!
//! Snapshots are stored per document key as a versioned JSON envelope under
//! the platform data directory (or an explicit root). [`DebouncedWriter`]
//! batches the writes triggered by a burst of edits.

mod writer;

pub use writer::{DebouncedWriter, PersistenceConfig};

use directories::ProjectDirs;
use markup_core::Annotation;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("unable to resolve local data directory")]
    NoDataDirectory,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid document key {0:?}")]
    InvalidKey(String),
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotEnvelope {
    version: u32,
    annotations: Vec<Annotation>,
}

impl Storage {
    pub fn from_default_project() -> Result<Self, StorageError> {
        let dirs = ProjectDirs::from("dev", "PdfMarkup", "PdfMarkup").ok_or(StorageError::NoDataDirectory)?;

        Ok(Self { root: dirs.data_local_dir().join("annotations") })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the snapshot stored for `key`; an absent file is an empty snapshot
    pub fn load_annotations(&self, key: &str) -> Result<Vec<Annotation>, StorageError> {
        let path = self.snapshot_path(key)?;
        if !path.exists() {
            return Ok(Vec::new());
        }

        let bytes = fs::read(path)?;
        let envelope: SnapshotEnvelope = serde_json::from_slice(&bytes)?;
        if envelope.version > SNAPSHOT_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedVersion(envelope.version));
        }

        Ok(envelope.annotations)
    }

    /// Replace the snapshot for `key` (temp file + rename)
    pub fn save_annotations(&self, key: &str, annotations: &[Annotation]) -> Result<(), StorageError> {
        let path = self.snapshot_path(key)?;
        fs::create_dir_all(&self.root)?;

        let envelope = SnapshotEnvelope { version: SNAPSHOT_SCHEMA_VERSION, annotations: annotations.to_vec() };
        let bytes = serde_json::to_vec_pretty(&envelope)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;

        tracing::info!(key, count = annotations.len(), "saved annotation snapshot");
        Ok(())
    }

    /// Remove the snapshot for `key`; returns whether one existed
    pub fn delete_annotations(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.snapshot_path(key)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn snapshot_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key.len() <= 128
            && !key.starts_with('.')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StorageError::InvalidKey(key.to_owned()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markup_core::{AnnotationKind, AnnotationStyle, Point};

    fn note(id: &str) -> Annotation {
        Annotation::with_id(
            id,
            0,
            AnnotationKind::Note { position: Point::new(1.0, 2.0), content: "hi".to_owned(), is_open: false },
            AnnotationStyle::default(),
        )
    }

    #[test]
    fn annotations_round_trip() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        let annotations = vec![note("a"), note("b")];
        store.save_annotations("report-2024", &annotations).expect("save should succeed");
        let loaded = store.load_annotations("report-2024").expect("load should succeed");

        assert_eq!(loaded, annotations);
        assert!(!temp.path().join("report-2024.json.tmp").exists());
    }

    #[test]
    fn load_empty_when_file_absent() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path().join("missing"));

        let loaded = store.load_annotations("doc").expect("load should succeed");
        assert!(loaded.is_empty());
    }

    #[test]
    fn rejects_path_like_keys() {
        let store = Storage::with_root("/nonexistent");
        for key in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(store.load_annotations(key), Err(StorageError::InvalidKey(_))), "{key}");
        }
    }

    #[test]
    fn rejects_newer_schema() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        fs::write(temp.path().join("doc.json"), r#"{ "version": 99, "annotations": [] }"#).unwrap();

        let store = Storage::with_root(temp.path());
        assert!(matches!(store.load_annotations("doc"), Err(StorageError::UnsupportedVersion(99))));
    }

    #[test]
    fn delete_reports_presence() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let store = Storage::with_root(temp.path());

        store.save_annotations("doc", &[note("a")]).unwrap();
        assert!(store.delete_annotations("doc").unwrap());
        assert!(!store.delete_annotations("doc").unwrap());
    }
}
