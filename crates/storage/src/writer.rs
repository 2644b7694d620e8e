//! Debounced snapshot writer
//!
//! Editing marks the writer dirty with the latest snapshot; a background
//! thread persists it once the edits settle, so a burst of operations costs
//! one write.

use crate::{Storage, StorageError};
use markup_core::Annotation;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// Configuration for the debounced writer
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Quiet period after the last change before writing
    pub debounce: Duration,

    /// Maximum time a change may stay unwritten while edits keep arriving
    pub max_debounce: Duration,

    /// If false, only [`DebouncedWriter::flush`] writes
    pub enable_auto_save: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_secs(2), max_debounce: Duration::from_secs(10), enable_auto_save: true }
    }
}

#[derive(Debug)]
struct Pending {
    first_marked_at: Instant,
    last_marked_at: Instant,
    snapshot: Option<Vec<Annotation>>,
    /// Set when a background write fails; cleared by the next edit
    failed: bool,
}

impl Pending {
    fn new() -> Self {
        let now = Instant::now();
        Self { first_marked_at: now, last_marked_at: now, snapshot: None, failed: false }
    }

    fn mark_dirty(&mut self, snapshot: Vec<Annotation>) {
        let now = Instant::now();
        if self.snapshot.is_none() {
            self.first_marked_at = now;
        }
        self.last_marked_at = now;
        self.snapshot = Some(snapshot);
        self.failed = false;
    }

    fn should_write(&self, config: &PersistenceConfig) -> bool {
        self.snapshot.is_some()
            && !self.failed
            && (self.last_marked_at.elapsed() >= config.debounce
                || self.first_marked_at.elapsed() >= config.max_debounce)
    }
}

struct Shared {
    storage: Storage,
    key: String,
    pending: Mutex<Pending>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the pending snapshot, holding the lock so marks wait for it
    fn write_pending(&self) -> Result<bool, StorageError> {
        let mut pending = self.pending();
        let Some(snapshot) = pending.snapshot.as_ref() else {
            return Ok(false);
        };
        self.storage.save_annotations(&self.key, snapshot)?;
        pending.snapshot = None;
        Ok(true)
    }
}

/// Persists the latest annotation snapshot of one document in the background
pub struct DebouncedWriter {
    config: PersistenceConfig,
    shared: Arc<Shared>,
    should_stop: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl DebouncedWriter {
    pub fn new(storage: Storage, key: impl Into<String>, config: PersistenceConfig) -> Self {
        let shared = Arc::new(Shared { storage, key: key.into(), pending: Mutex::new(Pending::new()) });
        let should_stop = Arc::new(AtomicBool::new(false));

        let thread_handle = config.enable_auto_save.then(|| {
            spawn_background_thread(Arc::clone(&shared), Arc::clone(&should_stop), config.clone())
        });

        Self { config, shared, should_stop, thread_handle }
    }

    /// Record the latest snapshot; it is written once edits settle
    pub fn mark_dirty(&self, snapshot: Vec<Annotation>) {
        self.shared.pending().mark_dirty(snapshot);
    }

    pub fn is_dirty(&self) -> bool {
        self.shared.pending().snapshot.is_some()
    }

    /// Write any pending snapshot now
    ///
    /// Returns `Ok(true)` if a write was performed, `Ok(false)` if nothing
    /// was pending. A failed write stays pending.
    pub fn flush(&self) -> Result<bool, StorageError> {
        self.shared.write_pending()
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }
}

fn spawn_background_thread(
    shared: Arc<Shared>,
    should_stop: Arc<AtomicBool>,
    config: PersistenceConfig,
) -> thread::JoinHandle<()> {
    let check_interval = (config.debounce / 4).clamp(Duration::from_millis(5), Duration::from_millis(500));

    thread::spawn(move || {
        while !should_stop.load(Ordering::Acquire) {
            let due = shared.pending().should_write(&config);
            if due {
                if let Err(err) = shared.write_pending() {
                    tracing::warn!(key = %shared.key, error = %err, "background snapshot write failed");
                    // Not retried until the next edit or an explicit flush.
                    shared.pending().failed = true;
                }
            }
            thread::sleep(check_interval);
        }
    })
}

impl Drop for DebouncedWriter {
    fn drop(&mut self) {
        self.should_stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        if let Err(err) = self.flush() {
            tracing::warn!(key = %self.shared.key, error = %err, "final snapshot write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use markup_core::{AnnotationKind, AnnotationStyle, Rect, ShapeKind};

    fn snapshot(count: usize) -> Vec<Annotation> {
        (0..count)
            .map(|i| {
                Annotation::with_id(
                    format!("shape-{i}"),
                    0,
                    AnnotationKind::Shape { shape: ShapeKind::Rectangle, rect: Rect::new(0.0, 0.0, 5.0, 5.0) },
                    AnnotationStyle::red_markup(),
                )
            })
            .collect()
    }

    fn manual() -> PersistenceConfig {
        PersistenceConfig { enable_auto_save: false, ..Default::default() }
    }

    #[test]
    fn flush_when_clean_writes_nothing() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let writer = DebouncedWriter::new(Storage::with_root(temp.path()), "doc", manual());

        assert!(!writer.is_dirty());
        assert!(!writer.flush().unwrap());
        assert!(!temp.path().join("doc.json").exists());
    }

    #[test]
    fn flush_writes_latest_snapshot() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let storage = Storage::with_root(temp.path());
        let writer = DebouncedWriter::new(storage.clone(), "doc", manual());

        writer.mark_dirty(snapshot(1));
        writer.mark_dirty(snapshot(3));
        assert!(writer.is_dirty());

        assert!(writer.flush().unwrap());
        assert!(!writer.is_dirty());
        assert_eq!(storage.load_annotations("doc").unwrap().len(), 3);
    }

    #[test]
    fn auto_save_disabled_keeps_changes_pending() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let config = PersistenceConfig {
            debounce: Duration::from_millis(20),
            max_debounce: Duration::from_millis(40),
            enable_auto_save: false,
        };
        let writer = DebouncedWriter::new(Storage::with_root(temp.path()), "doc", config);

        writer.mark_dirty(snapshot(1));
        thread::sleep(Duration::from_millis(100));
        assert!(writer.is_dirty());
    }

    #[test]
    fn background_thread_writes_after_debounce() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let storage = Storage::with_root(temp.path());
        let config = PersistenceConfig {
            debounce: Duration::from_millis(40),
            max_debounce: Duration::from_secs(5),
            enable_auto_save: true,
        };
        let writer = DebouncedWriter::new(storage.clone(), "doc", config);

        writer.mark_dirty(snapshot(2));
        let deadline = Instant::now() + Duration::from_secs(5);
        while writer.is_dirty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert!(!writer.is_dirty());
        assert_eq!(storage.load_annotations("doc").unwrap().len(), 2);
    }

    #[test]
    fn drop_flushes_pending_snapshot() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let storage = Storage::with_root(temp.path());
        {
            let writer = DebouncedWriter::new(storage.clone(), "doc", manual());
            writer.mark_dirty(snapshot(4));
        }
        assert_eq!(storage.load_annotations("doc").unwrap().len(), 4);
    }

    #[test]
    fn failed_background_write_waits_for_next_edit() {
        let config = PersistenceConfig { debounce: Duration::ZERO, max_debounce: Duration::ZERO, enable_auto_save: true };
        let mut pending = Pending::new();
        pending.mark_dirty(snapshot(1));
        assert!(pending.should_write(&config));

        pending.failed = true;
        assert!(!pending.should_write(&config));

        pending.mark_dirty(snapshot(2));
        assert!(pending.should_write(&config));
    }

    #[test]
    fn background_failure_keeps_snapshot_for_flush() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let config = PersistenceConfig {
            debounce: Duration::from_millis(10),
            max_debounce: Duration::from_millis(20),
            enable_auto_save: true,
        };

        let writer = DebouncedWriter::new(Storage::with_root(&blocker), "doc", config);
        writer.mark_dirty(snapshot(1));
        let deadline = Instant::now() + Duration::from_secs(5);
        while !writer.shared.pending().failed && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(writer.shared.pending().failed);
        assert!(writer.is_dirty());
        assert!(writer.flush().is_err());
    }

    #[test]
    fn failed_write_stays_pending() {
        let temp = tempfile::tempdir().expect("temp dir should be created");
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let writer = DebouncedWriter::new(Storage::with_root(&blocker), "doc", manual());
        writer.mark_dirty(snapshot(1));
        assert!(writer.flush().is_err());
        assert!(writer.is_dirty());
    }
}
