//! OS keychain backend.

use keyring::{
    credential::CredentialPersistence,
    default::default_credential_builder,
    Entry,
};

use super::SecretBackend;
use crate::error::StoreError;

const PROBE_SERVICE: &str = "srtgo";
const PROBE_KEY: &str = "__probe__";

/// Credentials kept in the platform keychain (macOS Keychain, Windows
/// Credential Manager).
///
/// Stores that forget secrets before they are deleted, such as the Linux
/// kernel keyutils store which is cleared on reboot, fail the probe with
/// [`StoreError::NoBackend`] so settings land in the JSON file instead.
#[derive(Debug, Default)]
pub struct KeyringBackend;

impl KeyringBackend {
    /// Create a keychain backend.
    pub fn new() -> Self {
        Self
    }

    fn entry(service: &str, key: &str) -> Result<Entry, StoreError> {
        Entry::new(service, key).map_err(map_error)
    }
}

fn map_error(err: keyring::Error) -> StoreError {
    match err {
        keyring::Error::NoStorageAccess(inner) | keyring::Error::PlatformFailure(inner) => {
            StoreError::NoBackend(inner.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Accept only stores that keep a secret until it is deleted.
pub(super) fn require_persistent(persistence: CredentialPersistence) -> Result<(), StoreError> {
    if matches!(persistence, CredentialPersistence::UntilDelete) {
        return Ok(());
    }
    // `CredentialPersistence` does not implement `Debug`; spell out the names.
    let persistence = match persistence {
        CredentialPersistence::EntryOnly => "EntryOnly",
        CredentialPersistence::ProcessOnly => "ProcessOnly",
        CredentialPersistence::UntilReboot => "UntilReboot",
        CredentialPersistence::UntilDelete => "UntilDelete",
        _ => "Unknown",
    };
    Err(StoreError::NoBackend(format!(
        "keychain does not keep secrets across restarts ({persistence})"
    )))
}

impl SecretBackend for KeyringBackend {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn probe(&self) -> Result<(), StoreError> {
        require_persistent(default_credential_builder().persistence())?;
        match Self::entry(PROBE_SERVICE, PROBE_KEY)?.get_password() {
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(map_error(err)),
        }
    }

    fn get(&self, service: &str, key: &str) -> Result<Option<String>, StoreError> {
        match Self::entry(service, key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(map_error(err)),
        }
    }

    fn set(&self, service: &str, key: &str, value: &str) -> Result<(), StoreError> {
        Self::entry(service, key)?
            .set_password(value)
            .map_err(map_error)
    }

    fn delete(&self, service: &str, key: &str) -> Result<(), StoreError> {
        match Self::entry(service, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(map_error(err)),
        }
    }
}
