//! Persisted key/value session state.
//!
//! [`SessionStore`] is the single source of truth for the `token` and `user`
//! keys. It is a cheap handle: clones share the same backend and the same
//! change channel, so a write through one clone is visible to every reader and
//! announced to every subscriber. The store never expires anything.

use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read session state at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write session state at {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("session state at {path} is not a JSON object of strings")]
    Corrupt { path: PathBuf },
}

/// Storage medium behind a [`SessionStore`].
pub trait StorageBackend: Send + Sync {
    /// # Errors
    /// Returns an error if the medium cannot be read.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Writes every entry or none of them.
    ///
    /// # Errors
    /// Returns an error if the medium cannot be written.
    fn save(&self, entries: &[(&str, &str)]) -> Result<(), StoreError>;

    /// Removes every key or none of them; returns the keys that were present.
    ///
    /// # Errors
    /// Returns an error if the medium cannot be written.
    fn delete(&self, keys: &[&str]) -> Result<Vec<String>, StoreError>;
}

/// Notification emitted after a successful write or removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreChange {
    Set { key: String },
    Removed { key: String },
}

impl StoreChange {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Set { key } | Self::Removed { key } => key,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn StorageBackend>,
    changes: broadcast::Sender<StoreChange>,
}

impl SessionStore {
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { backend, changes }
    }

    /// Ephemeral store, lost when the process exits.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::default()))
    }

    /// File-backed store; the file is created on first write.
    ///
    /// # Errors
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(FileBackend::open(path)?)))
    }

    /// # Errors
    /// Returns an error if the backend cannot be read.
    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.backend.load(key)
    }

    /// # Errors
    /// Returns an error if the backend cannot be written.
    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_all(&[(key, value)])
    }

    /// Writes several keys in one backend operation; on error none is written.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    pub fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        self.backend.save(entries)?;
        for (key, _) in entries {
            self.notify(StoreChange::Set {
                key: (*key).to_string(),
            });
        }
        Ok(())
    }

    /// Removing a missing key is not an error and emits no change.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.remove_all(&[key])
    }

    /// Removes several keys in one backend operation; on error none is removed.
    ///
    /// # Errors
    /// Returns an error if the backend cannot be written.
    pub fn remove_all(&self, keys: &[&str]) -> Result<(), StoreError> {
        for key in self.backend.delete(keys)? {
            self.notify(StoreChange::Removed { key });
        }
        Ok(())
    }

    /// Subscribes to changes made after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // No subscribers is the common case.
        let _ = self.changes.send(change);
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, String>>,
}

impl StorageBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut stored = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (key, value) in entries {
            stored.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn delete(&self, keys: &[&str]) -> Result<Vec<String>, StoreError> {
        let mut stored = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(keys
            .iter()
            .filter(|key| stored.remove(**key).is_some())
            .map(|key| (*key).to_string())
            .collect())
    }
}

/// JSON object of string values on disk, mirrored in memory. Every write
/// rewrites the whole document through a sibling temp file and a rename.
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileBackend {
    /// # Errors
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = read_document(&path)?;
        debug!(path = %path.display(), keys = entries.len(), "session state loaded");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let document: Map<String, Value> = entries
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect();
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, Value::Object(document).to_string()).map_err(write_err)?;
        fs::rename(&tmp_path, &self.path).map_err(write_err)
    }
}

impl StorageBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn save(&self, entries: &[(&str, &str)]) -> Result<(), StoreError> {
        let mut stored = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = stored.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(&next)?;
        *stored = next;
        Ok(())
    }

    fn delete(&self, keys: &[&str]) -> Result<Vec<String>, StoreError> {
        let mut stored = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = stored.clone();
        let removed: Vec<String> = keys
            .iter()
            .filter(|key| next.remove(**key).is_some())
            .map(|key| (*key).to_string())
            .collect();
        if removed.is_empty() {
            return Ok(removed);
        }
        self.persist(&next)?;
        *stored = next;
        Ok(removed)
    }
}

fn read_document(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(source) => {
            return Err(StoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let corrupt = || StoreError::Corrupt {
        path: path.to_path_buf(),
    };
    let Ok(Value::Object(document)) = serde_json::from_str::<Value>(&raw) else {
        return Err(corrupt());
    };

    document
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(value) => Ok((key, value)),
            _ => Err(corrupt()),
        })
        .collect()
}
