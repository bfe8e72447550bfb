//! Record persistence: the capability the pipeline and handlers are given,
//! plus a JSON-Lines backed store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::PersistenceError;

/// A hashed image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub hash: u64,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, hash: u64) -> Self {
        Self {
            path: path.into(),
            hash,
        }
    }
}

/// An image whose hash request is out but whose result has not been recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHashImage {
    pub path: PathBuf,
}

impl PendingHashImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Record lookup and insert.
///
/// A routine miss is `Ok(false)`; `Err` means the record state is unknown.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn is_path_recorded(&self, path: &Path) -> Result<bool, PersistenceError>;

    /// Record a hash. Clears any pending entry for the same path.
    async fn add_record(&self, record: ImageRecord) -> Result<(), PersistenceError>;

    /// Note that a hash has been requested for `image`.
    async fn add_pending(&self, image: PendingHashImage) -> Result<(), PersistenceError>;

    /// Pending images in the order they were added.
    async fn pending_images(&self) -> Result<Vec<PendingHashImage>, PersistenceError>;
}

/// Records kept in memory and, optionally, appended to a JSON-Lines file.
///
/// Pending entries are never written to disk; a restarted run simply
/// re-submits whatever was not recorded.
pub struct RecordStore {
    state: Mutex<StoreState>,
}

struct StoreState {
    records: HashMap<PathBuf, u64>,
    pending: Vec<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl RecordStore {
    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(StoreState {
                records: HashMap::new(),
                pending: Vec::new(),
                writer: None,
            }),
        }
    }

    /// Load existing records from `path` and append new ones to it.
    ///
    /// Lines that fail to parse are skipped with a warning; those images will
    /// simply be hashed again.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let mut records = HashMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                PersistenceError::with_source(format!("Failed to read {}", path.display()), e)
            })?;

            let mut skipped_lines = 0u64;
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ImageRecord>(line) {
                    Ok(record) => {
                        records.insert(record.path, record.hash);
                    }
                    Err(_) => skipped_lines += 1,
                }
            }
            if skipped_lines > 0 {
                tracing::warn!(
                    "{skipped_lines} lines in {:?} could not be parsed; those images will be rehashed",
                    path
                );
            }
            tracing::info!("Loaded {} records from {:?}", records.len(), path);
        } else if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PersistenceError::with_source(format!("Failed to create {}", parent.display()), e)
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                PersistenceError::with_source(format!("Failed to open {}", path.display()), e)
            })?;

        Ok(Self {
            state: Mutex::new(StoreState {
                records,
                pending: Vec::new(),
                writer: Some(BufWriter::new(file)),
            }),
        })
    }

    /// Number of recorded images.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recorded hash for `path`, if any.
    pub fn hash_of(&self, path: &Path) -> Option<u64> {
        self.lock().records.get(path).copied()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Persistence for RecordStore {
    async fn is_path_recorded(&self, path: &Path) -> Result<bool, PersistenceError> {
        Ok(self.lock().records.contains_key(path))
    }

    async fn add_record(&self, record: ImageRecord) -> Result<(), PersistenceError> {
        let mut state = self.lock();

        if let Some(writer) = state.writer.as_mut() {
            serde_json::to_writer(&mut *writer, &record)
                .map_err(|e| PersistenceError::with_source("Failed to serialize record", e))?;
            writeln!(writer)
                .and_then(|_| writer.flush())
                .map_err(|e| PersistenceError::with_source("Failed to write record", e))?;
        }

        state.pending.retain(|p| p != &record.path);
        state.records.insert(record.path, record.hash);
        Ok(())
    }

    async fn add_pending(&self, image: PendingHashImage) -> Result<(), PersistenceError> {
        let mut state = self.lock();
        if !state.pending.contains(&image.path) {
            state.pending.push(image.path);
        }
        Ok(())
    }

    async fn pending_images(&self) -> Result<Vec<PendingHashImage>, PersistenceError> {
        Ok(self
            .lock()
            .pending
            .iter()
            .cloned()
            .map(PendingHashImage::new)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_record_marks_path_recorded() {
        let store = RecordStore::in_memory();
        let path = Path::new("/pics/a.jpg");
        assert!(!store.is_path_recorded(path).await.unwrap());

        store.add_record(ImageRecord::new(path, 99)).await.unwrap();
        assert!(store.is_path_recorded(path).await.unwrap());
        assert_eq!(store.hash_of(path), Some(99));
    }

    #[tokio::test]
    async fn test_pending_keeps_order_and_clears_on_record() {
        let store = RecordStore::in_memory();
        for name in ["/b.jpg", "/a.jpg", "/c.jpg", "/a.jpg"] {
            store.add_pending(PendingHashImage::new(name)).await.unwrap();
        }
        store.add_record(ImageRecord::new("/a.jpg", 1)).await.unwrap();

        let pending = store.pending_images().await.unwrap();
        assert_eq!(
            pending,
            vec![PendingHashImage::new("/b.jpg"), PendingHashImage::new("/c.jpg")]
        );
    }

    #[tokio::test]
    async fn test_open_reloads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.jsonl");

        {
            let store = RecordStore::open(&path).unwrap();
            store.add_record(ImageRecord::new("/x.png", 7)).await.unwrap();
            store.add_record(ImageRecord::new("/y.png", 8)).await.unwrap();
        }

        let reopened = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.hash_of(Path::new("/y.png")), Some(8));
    }

    #[tokio::test]
    async fn test_open_skips_unparsable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        std::fs::write(
            &path,
            "{\"path\":\"/ok.jpg\",\"hash\":5}\nnot json\n\n{\"path\":3}\n",
        )
        .unwrap();

        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.is_path_recorded(Path::new("/ok.jpg")).await.unwrap());
    }
}
