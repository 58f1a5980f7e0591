//! JSON file backend used when the host has no usable keychain.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::warn;

use super::SecretBackend;
use crate::error::StoreError;

/// File name of the fallback store inside the application config directory.
pub const DEFAULT_STORE_FILE: &str = "srtgo/config.json";

/// Flat `"service:key" -> value` map persisted as a single JSON object.
///
/// Every read parses the whole file. Every write loads, mutates and replaces
/// the whole file while holding `write_lock`, so writers in the same process
/// never lose each other's updates.
pub struct FileBackend {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileBackend {
    /// Create a backend persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Default location under the user's config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_STORE_FILE)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), "failed to read credential file: {err}");
                return BTreeMap::new();
            }
        };
        if contents.trim().is_empty() {
            return BTreeMap::new();
        }
        match serde_json::from_str(&contents) {
            Ok(map) => map,
            Err(err) => {
                warn!(path = %self.path.display(), "ignoring unreadable credential file: {err}");
                BTreeMap::new()
            }
        }
    }

    fn write(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|source| StoreError::Io {
            path: parent.clone(),
            source,
        })?;

        let serialised = serde_json::to_vec_pretty(map)?;
        let mut staged = NamedTempFile::new_in(&parent).map_err(|source| StoreError::Io {
            path: parent.clone(),
            source,
        })?;
        let staged_path = staged.path().to_path_buf();
        staged
            .write_all(&serialised)
            .and_then(|()| staged.flush())
            .map_err(|source| StoreError::Io {
                path: staged_path,
                source,
            })?;
        staged.persist(&self.path).map_err(|err| StoreError::Io {
            path: self.path.clone(),
            source: err.error,
        })?;
        Ok(())
    }
}

fn entry_key(service: &str, key: &str) -> String {
    format!("{service}:{key}")
}

impl SecretBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    fn get(&self, service: &str, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load().remove(&entry_key(service, key)))
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut map = self.load();
        map.insert(entry_key(service, key), value.to_string());
        self.write(&map)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut map = self.load();
        if map.remove(&entry_key(service, key)).is_none() {
            return Ok(());
        }
        self.write(&map)
    }
}
