//! Key/value persistence for list membership, cache snapshots and stars.
//!
//! Values are JSON documents. Reads never fail: anything unreadable comes
//! back as [`Stored::Corrupt`] so callers can fall back to defaults while
//! still knowing why.

use serde::Serialize;
use serde::de::DeserializeOwned;
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
#[cfg(test)]
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised while writing to storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize value: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of reading one key.
#[derive(Debug, Clone, PartialEq)]
pub enum Stored<T> {
    Loaded(T),
    Missing,
    Corrupt(String),
}

#[cfg(test)]
impl<T> Stored<T> {
    pub fn loaded(self) -> Option<T> {
        match self {
            Stored::Loaded(value) => Some(value),
            Stored::Missing | Stored::Corrupt(_) => None,
        }
    }
}

/// Raw string storage, one value per key.
pub trait Storage: Send + Sync {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Typed helpers layered over any [`Storage`].
pub trait StorageExt: Storage {
    fn read<T: DeserializeOwned>(&self, key: &str) -> Stored<T> {
        match self.get_raw(key) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Stored::Loaded(value),
                Err(e) => Stored::Corrupt(e.to_string()),
            },
            Ok(None) => Stored::Missing,
            Err(e) => Stored::Corrupt(e.to_string()),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}

/// Storage key for a list's membership.
pub fn membership_key(stem: &str) -> String {
    format!("list.{}", stem)
}

/// Storage key for a list's cache snapshot.
pub fn cache_key(stem: &str) -> String {
    format!("cache.{}", stem)
}

pub const STARRED_KEY: &str = "starred";

/// One JSON file per key inside a data directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default data directory for the board.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("watchboard"))
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

impl Storage for FileStorage {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set_raw(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }
}
