//! Credential storage with automatic keychain fallback.
//!
//! [`CredentialStore`] fronts a [`SecretBackend`]. On first use it probes the
//! secure backend once; if the host reports that no keychain is available the
//! store switches to the JSON [`FileBackend`] for the rest of its lifetime.
//! Reads never fail: backend errors degrade to "absent". Writes report
//! [`StoreError`] to the caller.

mod file;
mod secure;

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::{
    config::{BackendPreference, StoreConfig},
    error::StoreError,
};

pub use file::{FileBackend, DEFAULT_STORE_FILE};
pub use secure::KeyringBackend;

/// Key-value secret storage addressed by `(service, key)`.
pub trait SecretBackend: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Check that the backend can be used on this host.
    ///
    /// Returns [`StoreError::NoBackend`] when the host has no such storage.
    fn probe(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Read a value; `Ok(None)` when the key was never set.
    fn get(&self, service: &str, key: &str) -> Result<Option<String>, StoreError>;

    /// Create or replace a value.
    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a value; removing an absent key succeeds.
    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError>;
}

/// Process-wide credential store; construct once and share behind an `Arc`.
pub struct CredentialStore {
    candidate: Mutex<Option<Box<dyn SecretBackend>>>,
    fallback_path: PathBuf,
    selected: OnceCell<Box<dyn SecretBackend>>,
}

impl CredentialStore {
    /// Store that probes `secure` on first use and falls back to a JSON file at `fallback_path`.
    pub fn new(secure: Box<dyn SecretBackend>, fallback_path: impl Into<PathBuf>) -> Self {
        Self {
            candidate: Mutex::new(Some(secure)),
            fallback_path: fallback_path.into(),
            selected: OnceCell::new(),
        }
    }

    /// Store that never consults the keychain.
    pub fn file_only(path: impl Into<PathBuf>) -> Self {
        Self {
            candidate: Mutex::new(None),
            fallback_path: path.into(),
            selected: OnceCell::new(),
        }
    }

    /// Build the store described by the application configuration.
    pub fn from_config(config: &StoreConfig) -> Self {
        match config.backend {
            BackendPreference::Auto => {
                Self::new(Box::new(KeyringBackend::new()), config.path.clone())
            }
            BackendPreference::File => Self::file_only(config.path.clone()),
        }
    }

    /// Location of the fallback file.
    pub fn fallback_path(&self) -> &Path {
        &self.fallback_path
    }

    /// Name of the backend in use, selecting it if that has not happened yet.
    pub fn backend_name(&self) -> &'static str {
        self.backend().name()
    }

    /// Read a value, treating any backend failure as absent.
    pub fn get(&self, service: &str, key: &str) -> Option<String> {
        match self.backend().get(service, key) {
            Ok(value) => value,
            Err(err) => {
                warn!(service, key, "credential read failed, treating as absent: {err}");
                None
            }
        }
    }

    /// Create or replace a value.
    pub fn set(&self, service: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.backend().set(service, key, value)
    }

    /// Remove a value; absent keys are ignored.
    pub fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        self.backend().delete(service, key)
    }

    fn backend(&self) -> &dyn SecretBackend {
        &**self.selected.get_or_init(|| self.select())
    }

    fn select(&self) -> Box<dyn SecretBackend> {
        let Some(secure) = self.candidate.lock().take() else {
            info!(path = %self.fallback_path.display(), "using file credential store");
            return Box::new(FileBackend::new(self.fallback_path.clone()));
        };

        match secure.probe() {
            Ok(()) => {
                info!(backend = secure.name(), "using secure credential store");
                secure
            }
            Err(StoreError::NoBackend(reason)) => {
                warn!(
                    backend = secure.name(),
                    path = %self.fallback_path.display(),
                    "secure credential store unavailable ({reason}); falling back to file"
                );
                Box::new(FileBackend::new(self.fallback_path.clone()))
            }
            Err(err) => {
                warn!(backend = secure.name(), "credential store probe failed: {err}");
                secure
            }
        }
    }
}
