//! Edit store persisted as two JSON files in one directory.
//!
//! `saved.json` holds created and modified features, `deleted.json` the
//! features marked for deletion. Each file is a JSON array of features. A
//! mutation stages both files before renaming either into place, so a failed
//! write leaves the pair as it was.

use std::io;
use std::sync::{Arc, Weak};

use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use osm_sync_core::{EditListener, EditMap, EditStore, ElementRef, Feature, Provenance};
use osm_sync_fs::StagedFile;
use parking_lot::Mutex;
use thiserror::Error;

/// File holding created and modified features.
pub const SAVED_FILE_NAME: &str = "saved.json";
/// File holding features marked for deletion.
pub const DELETED_FILE_NAME: &str = "deleted.json";

/// Errors raised while loading or persisting edits.
#[derive(Debug, Error)]
pub enum EditStoreError {
    /// The store directory or one of its files could not be accessed.
    #[error("edit store I/O failed for {path}: {source}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A store file does not contain a JSON array of features.
    #[error("failed to parse edits in {path}: {source}")]
    Parse {
        /// File being parsed.
        path: Utf8PathBuf,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// Edits could not be encoded for writing.
    #[error("failed to encode edits for {path}: {source}")]
    Encode {
        /// File being written.
        path: Utf8PathBuf,
        /// Encoder error.
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Edits {
    saved: EditMap,
    deleted: EditMap,
}

/// [`EditStore`] backed by JSON files.
///
/// Mutations persist before they become visible: a failed write leaves both
/// the files and the in-memory view unchanged. Listeners are notified after
/// the write, outside the store's locks, so they may read the store.
///
/// # Examples
/// ```no_run
/// use osm_sync_core::{EditStore, ElementRef};
/// use osm_sync_data::JsonEditStore;
///
/// let store = JsonEditStore::open("edits".into())?;
/// store.discard(ElementRef::node(-1))?;
/// assert_eq!(store.pending_count(), store.saved().len() + store.deleted().len());
/// # Ok::<(), osm_sync_data::EditStoreError>(())
/// ```
pub struct JsonEditStore {
    dir: Utf8PathBuf,
    edits: Mutex<Edits>,
    listeners: Mutex<Vec<Weak<dyn EditListener>>>,
}

impl std::fmt::Debug for JsonEditStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonEditStore")
            .field("dir", &self.dir)
            .field("edits", &*self.edits.lock())
            .finish_non_exhaustive()
    }
}

impl JsonEditStore {
    /// Open the store in `dir`, creating the directory when missing.
    ///
    /// Missing files are treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`EditStoreError::Io`] when the directory cannot be created or
    /// a file cannot be read, and [`EditStoreError::Parse`] when a file holds
    /// something other than a feature array.
    pub fn open(dir: Utf8PathBuf) -> Result<Self, EditStoreError> {
        osm_sync_fs::ensure_dir(&dir).map_err(|source| EditStoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let edits = Edits {
            saved: load_map(&dir.join(SAVED_FILE_NAME))?,
            deleted: load_map(&dir.join(DELETED_FILE_NAME))?,
        };
        info!(
            "opened edit store at {dir}: {} saved, {} deleted",
            edits.saved.len(),
            edits.deleted.len()
        );
        Ok(Self {
            dir,
            edits: Mutex::new(edits),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Directory holding the store files.
    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Save a created or modified feature under its own identity.
    ///
    /// Saving a feature withdraws any pending deletion of it.
    ///
    /// # Errors
    ///
    /// Returns an error when the store files cannot be written.
    pub fn save(&self, feature: Feature) -> Result<(), EditStoreError> {
        self.mutate(|edits| {
            edits.deleted.remove(&feature.id);
            edits.saved.insert(feature.id, feature);
        })
    }

    /// Mark a feature for deletion, dropping any saved edits of it.
    ///
    /// Locally created features never reached the server, so deleting one
    /// only forgets it.
    ///
    /// # Errors
    ///
    /// Returns an error when the store files cannot be written.
    pub fn mark_deleted(&self, feature: Feature) -> Result<(), EditStoreError> {
        self.mutate(|edits| {
            edits.saved.remove(&feature.id);
            if !feature.id.is_local() {
                let id = feature.id;
                edits
                    .deleted
                    .insert(id, feature.with_provenance(Provenance::MarkedForDeletion));
            }
        })
    }

    /// Forget any saved or deleted state for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error when the store files cannot be written.
    pub fn discard(&self, id: ElementRef) -> Result<(), EditStoreError> {
        self.mutate(|edits| {
            edits.saved.remove(&id);
            edits.deleted.remove(&id);
        })
    }

    fn mutate(&self, change: impl FnOnce(&mut Edits)) -> Result<(), EditStoreError> {
        {
            let mut edits = self.edits.lock();
            let mut next = edits.clone();
            change(&mut next);
            if next == *edits {
                return Ok(());
            }
            self.persist(&edits, &next)?;
            *edits = next;
        }
        self.notify();
        Ok(())
    }

    fn persist(&self, previous: &Edits, edits: &Edits) -> Result<(), EditStoreError> {
        let saved_path = self.dir.join(SAVED_FILE_NAME);
        let deleted_path = self.dir.join(DELETED_FILE_NAME);
        let saved = stage_map(&saved_path, &edits.saved)?;
        let deleted = match stage_map(&deleted_path, &edits.deleted) {
            Ok(staged) => staged,
            Err(err) => {
                discard_staged(saved, &saved_path);
                return Err(err);
            }
        };
        if let Err(source) = saved.commit() {
            discard_staged(deleted, &deleted_path);
            return Err(EditStoreError::Io {
                path: saved_path,
                source,
            });
        }
        if let Err(source) = deleted.commit() {
            // saved.json already moved; put the previous contents back.
            if let Err(err) = store_map(&saved_path, &previous.saved) {
                warn!("failed to restore {saved_path} after a partial write: {err}");
            }
            return Err(EditStoreError::Io {
                path: deleted_path,
                source,
            });
        }
        debug!(
            "persisted {} saved and {} deleted edits to {}",
            edits.saved.len(),
            edits.deleted.len(),
            self.dir
        );
        Ok(())
    }

    fn notify(&self) {
        let listeners: Vec<Arc<dyn EditListener>> = {
            let mut listeners = self.listeners.lock();
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_edit_store_changed();
        }
    }
}

impl EditStore for JsonEditStore {
    fn saved(&self) -> EditMap {
        self.edits.lock().saved.clone()
    }

    fn deleted(&self) -> EditMap {
        self.edits.lock().deleted.clone()
    }

    fn subscribe(&self, listener: Weak<dyn EditListener>) {
        self.listeners.lock().push(listener);
    }
}

fn load_map(path: &Utf8Path) -> Result<EditMap, EditStoreError> {
    let bytes = match osm_sync_fs::read_file(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(EditMap::new()),
        Err(source) => {
            return Err(EditStoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let features: Vec<Feature> =
        serde_json::from_slice(&bytes).map_err(|source| EditStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(features
        .into_iter()
        .map(|feature| (feature.id, feature))
        .collect())
}

fn encode_map(path: &Utf8Path, map: &EditMap) -> Result<Vec<u8>, EditStoreError> {
    let features: Vec<&Feature> = map.values().collect();
    serde_json::to_vec_pretty(&features).map_err(|source| EditStoreError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

fn stage_map(path: &Utf8Path, map: &EditMap) -> Result<StagedFile, EditStoreError> {
    let bytes = encode_map(path, map)?;
    osm_sync_fs::stage_file(path, &bytes).map_err(|source| EditStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn store_map(path: &Utf8Path, map: &EditMap) -> Result<(), EditStoreError> {
    let bytes = encode_map(path, map)?;
    osm_sync_fs::write_file_atomically(path, &bytes).map_err(|source| EditStoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn discard_staged(staged: StagedFile, path: &Utf8Path) {
    if let Err(err) = staged.discard() {
        warn!("failed to remove staged copy of {path}: {err}");
    }
}
