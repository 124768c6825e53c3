//! Cached sanctions document with staleness-aware reload
//!
//! The store owns one immutable `Arc<SanctionsDocument>` snapshot at a time.
//! Readers clone the `Arc` under a short read lock and match without holding
//! any lock. Reload, merge and persist run under the write lock, so there is
//! a single writer and snapshots are swapped whole.
//!
//! Staleness: the cache records the backing file's modification time when it
//! was read (or written). If the file's current modification time is newer,
//! the next `current_data()` call rereads it.

use crate::domain::types::{SanctionList, SanctionsDocument};
use parking_lot::RwLock;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by the list store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Document exists but could not be read
    #[error("failed to read sanctions document {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Document content is not a valid sanctions document
    #[error("malformed sanctions document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize sanctions document: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Temp write or atomic rename did not land
    #[error("failed to persist sanctions document {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Cached snapshot plus the modification time it corresponds to
struct Cache {
    doc: Arc<SanctionsDocument>,
    /// None until the first load
    loaded_at: Option<SystemTime>,
}

/// Owner of the cached sanctions document for one backing path
pub struct ListStore {
    path: PathBuf,
    cache: RwLock<Cache>,
    /// Number of times the backing file was actually read
    load_count: AtomicU64,
}

impl ListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(Cache { doc: Arc::new(SanctionsDocument::new()), loaded_at: None }),
            load_count: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// How many times the backing document has been read from disk
    pub fn load_count(&self) -> u64 {
        self.load_count.load(Ordering::Relaxed)
    }

    /// Current document, reloading first if the backing file is newer than the cache.
    /// A missing file yields (and caches) an empty document.
    pub fn current_data(&self) -> Result<Arc<SanctionsDocument>, StoreError> {
        let modified = self.file_modified()?;
        {
            let cache = self.cache.read();
            if !is_stale(&cache, modified) {
                return Ok(Arc::clone(&cache.doc));
            }
        }

        let mut cache = self.cache.write();
        // Another caller may have reloaded while we waited for the write lock
        let modified = self.file_modified()?;
        if is_stale(&cache, modified) {
            self.reload_locked(&mut cache, modified)?;
        }
        Ok(Arc::clone(&cache.doc))
    }

    /// Fold updated lists into the cached document without persisting.
    /// Returns true if any stored list was replaced or added.
    pub fn merge(&self, updates: SanctionsDocument) -> Result<bool, StoreError> {
        let mut cache = self.cache.write();
        self.refresh_locked(&mut cache)?;

        let (merged, replaced) = merged_document(&cache.doc, updates);
        if replaced.is_empty() {
            return Ok(false);
        }

        info!(replaced = ?replaced, "store_merged");
        cache.doc = Arc::new(merged);
        Ok(true)
    }

    /// Atomically write the cached document to the backing path.
    /// A store that has never loaded reads the document first, so the
    /// empty placeholder never overwrites lists on disk. Unpersisted merges
    /// are kept even if the file changed since.
    pub fn persist(&self) -> Result<(), StoreError> {
        let mut cache = self.cache.write();
        if cache.loaded_at.is_none() {
            let modified = self.file_modified()?;
            self.reload_locked(&mut cache, modified)?;
        }
        let modified = write_document(&self.path, &cache.doc)?;
        cache.loaded_at = Some(modified);
        Ok(())
    }

    /// Merge and persist under one exclusive section.
    ///
    /// The merged snapshot is published only after the write lands, so a
    /// persist failure leaves the previous snapshot in place. Nothing is
    /// written when no list changed.
    pub fn apply_update(&self, updates: SanctionsDocument) -> Result<Vec<String>, StoreError> {
        let mut cache = self.cache.write();
        self.refresh_locked(&mut cache)?;

        let (merged, replaced) = merged_document(&cache.doc, updates);
        if replaced.is_empty() {
            debug!("store_update_unchanged");
            return Ok(replaced);
        }

        let modified = write_document(&self.path, &merged)?;
        cache.doc = Arc::new(merged);
        cache.loaded_at = Some(modified);
        info!(replaced = ?replaced, path = %self.path.display(), "store_update_applied");
        Ok(replaced)
    }

    /// The given list's `updated` timestamp, or the store's last load time
    /// (epoch seconds) when no list is named
    pub fn last_updated(&self, list_id: Option<&str>) -> Result<Option<i64>, StoreError> {
        let doc = self.current_data()?;
        match list_id {
            Some(id) => Ok(doc.get(id).map(|list| list.updated)),
            None => Ok(self.cache.read().loaded_at.map(epoch_secs)),
        }
    }

    fn file_modified(&self) -> Result<Option<SystemTime>, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) => meta
                .modified()
                .map(Some)
                .map_err(|source| StoreError::Read { path: self.path.clone(), source }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read { path: self.path.clone(), source }),
        }
    }

    fn refresh_locked(&self, cache: &mut Cache) -> Result<(), StoreError> {
        let modified = self.file_modified()?;
        if is_stale(cache, modified) {
            self.reload_locked(cache, modified)?;
        }
        Ok(())
    }

    fn reload_locked(
        &self,
        cache: &mut Cache,
        modified: Option<SystemTime>,
    ) -> Result<(), StoreError> {
        let Some(modified) = modified else {
            if cache.loaded_at.is_some() && !cache.doc.is_empty() {
                warn!(path = %self.path.display(), "store_document_disappeared");
            }
            debug!(path = %self.path.display(), "store_document_missing");
            cache.doc = Arc::new(SanctionsDocument::new());
            cache.loaded_at = Some(UNIX_EPOCH);
            return Ok(());
        };

        let doc = read_document(&self.path)?;
        self.load_count.fetch_add(1, Ordering::Relaxed);
        info!(
            path = %self.path.display(),
            lists = %doc.len(),
            modified = %epoch_secs(modified),
            "store_loaded"
        );
        cache.doc = Arc::new(doc);
        cache.loaded_at = Some(modified);
        Ok(())
    }
}

fn is_stale(cache: &Cache, modified: Option<SystemTime>) -> bool {
    match (cache.loaded_at, modified) {
        (None, _) => true,
        (Some(loaded_at), Some(modified)) => modified > loaded_at,
        // File vanished after a successful load; fall back to empty
        (Some(loaded_at), None) => loaded_at != UNIX_EPOCH,
    }
}

/// Apply incoming lists on top of `current`.
/// A list is replaced when absent or strictly older than the incoming one.
/// An incoming list whose kind differs from the stored one is refused.
fn merged_document(
    current: &SanctionsDocument,
    updates: SanctionsDocument,
) -> (SanctionsDocument, Vec<String>) {
    let mut merged = current.clone();
    let mut replaced = Vec::new();

    for (list_id, incoming) in updates {
        if should_replace(&list_id, merged.get(&list_id), &incoming) {
            replaced.push(list_id.clone());
            merged.insert(list_id, incoming);
        } else {
            debug!(list = %list_id, updated = %incoming.updated, "store_merge_skipped");
        }
    }

    (merged, replaced)
}

fn should_replace(list_id: &str, stored: Option<&SanctionList>, incoming: &SanctionList) -> bool {
    match stored {
        None => true,
        Some(stored) if stored.kind() != incoming.kind() => {
            warn!(
                list = %list_id,
                stored = %stored.kind().as_str(),
                incoming = %incoming.kind().as_str(),
                "store_merge_kind_mismatch"
            );
            false
        }
        Some(stored) => stored.updated < incoming.updated,
    }
}

fn read_document(path: &Path) -> Result<SanctionsDocument, StoreError> {
    let file =
        File::open(path).map_err(|source| StoreError::Read { path: path.to_path_buf(), source })?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })
}

/// Write to a temp file in the target directory, fsync, then rename over the target.
/// Returns the new file's modification time.
fn write_document(path: &Path, doc: &SanctionsDocument) -> Result<SystemTime, StoreError> {
    let persist_err = |source: io::Error| StoreError::Persist { path: path.to_path_buf(), source };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(persist_err)?;
    }

    let mut tmp = NamedTempFile::new_in(dir).map_err(persist_err)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, doc)?;
        writer.write_all(b"\n").map_err(persist_err)?;
        writer.flush().map_err(persist_err)?;
    }
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(path).map_err(|e| persist_err(e.error))?;

    let modified = fs::metadata(path).and_then(|meta| meta.modified()).map_err(persist_err)?;
    info!(path = %path.display(), lists = %doc.len(), "store_persisted");
    Ok(modified)
}

fn epoch_secs(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
