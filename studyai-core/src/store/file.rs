//! JSON file-backed storage.
//!
//! The whole map is kept in memory and rewritten to disk on every mutation.
//! The file is created lazily on the first write, so a fresh install with no
//! session leaves nothing on disk.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Secret, SecretStore, StoreError};

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileStoreData {
    /// Version of the file format (for future migrations).
    version: u32,

    entries: BTreeMap<String, Secret>,
}

impl Default for FileStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            entries: BTreeMap::new(),
        }
    }
}

/// File-backed durable store.
pub struct FileStore {
    path: PathBuf,

    /// Loaded lazily; `None` until first access.
    data: RwLock<Option<FileStoreData>>,
}

impl FileStore {
    /// Create a store backed by the given file path.
    ///
    /// Nothing is read until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            data: RwLock::new(None),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Result<FileStoreData, StoreError> {
        if !path.exists() {
            return Ok(FileStoreData::default());
        }
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Ok(FileStoreData::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn persist(&self, data: &FileStoreData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    /// Run `f` against the loaded data under the write lock.
    ///
    /// When `f` reports a change, the file is rewritten before the lock is
    /// released so concurrent writers cannot persist out of order.
    fn with_data<T>(
        &self,
        f: impl FnOnce(&mut FileStoreData) -> (T, bool),
    ) -> Result<T, StoreError> {
        let mut guard = self.data.write().map_err(|e| StoreError::BackendError {
            message: format!("lock poisoned: {}", e),
        })?;
        if guard.is_none() {
            *guard = Some(Self::load(&self.path)?);
        }
        let data = guard.get_or_insert_with(FileStoreData::default);
        let (out, changed) = f(data);
        if changed {
            self.persist(data)?;
        }
        Ok(out)
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

#[async_trait]
impl SecretStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Secret>, StoreError> {
        self.with_data(|data| (data.entries.get(key).cloned(), false))
    }

    async fn set(&self, key: &str, secret: &Secret) -> Result<(), StoreError> {
        self.with_data(|data| {
            data.entries.insert(key.to_string(), secret.clone());
            ((), true)
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_data(|data| ((), data.entries.remove(key).is_some()))
    }
}
