//! Label-addressed secret storage.
//!
//! This module provides:
//! - `SecretStore`: the narrow interface the gate needs from a platform store
//! - `SecretRecord`: one entry as it is created
//! - `MemoryStore`: an in-process store
//! - `KeychainStore` (macOS): generic-password items in the login keychain
//!
//! The platform guarantees each call is atomic; no extra locking is done.

#[cfg(target_os = "macos")]
mod keychain;
mod memory;

#[cfg(target_os = "macos")]
pub use keychain::KeychainStore;
pub use memory::MemoryStore;

use std::rc::Rc;

use thiserror::Error;

use crate::capability::ReleaseCap;
use crate::request::SecretLabel;
use crate::secret::Secret;

/// Store failures. Never carry payload bytes.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No entry carries the label.
    #[error("no entry with that label")]
    NotFound,

    /// An entry with the label already exists.
    #[error("an entry with that label already exists")]
    DuplicateEntry,

    /// The backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wraps a backend error message.
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend(message.into())
    }
}

/// One entry as created by the gate. Never updated or deleted afterwards.
#[derive(Debug)]
pub struct SecretRecord {
    /// Lookup key
    pub label: SecretLabel,
    /// Account attribute, the cache id of the request that created it
    pub account: String,
    /// The PIN
    pub payload: Secret<Vec<u8>>,
}

/// CRUD-like interface over a platform secure-storage service.
pub trait SecretStore {
    /// Checks whether an entry exists without touching its payload.
    ///
    /// This must be a metadata-only lookup: it may not unlock, decrypt or
    /// prompt.
    fn exists(&self, label: &SecretLabel) -> Result<bool, StoreError>;

    /// Reads the payload of an entry.
    ///
    /// Requires a [`ReleaseCap`], so callers must pass the release gate
    /// first.
    fn read(&self, label: &SecretLabel, cap: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError>;

    /// Creates a new entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateEntry`] if the label is already taken.
    fn create(&self, record: &SecretRecord) -> Result<(), StoreError>;
}

impl<T: SecretStore + ?Sized> SecretStore for &T {
    fn exists(&self, label: &SecretLabel) -> Result<bool, StoreError> {
        (**self).exists(label)
    }

    fn read(&self, label: &SecretLabel, cap: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError> {
        (**self).read(label, cap)
    }

    fn create(&self, record: &SecretRecord) -> Result<(), StoreError> {
        (**self).create(record)
    }
}

impl<T: SecretStore + ?Sized> SecretStore for Rc<T> {
    fn exists(&self, label: &SecretLabel) -> Result<bool, StoreError> {
        (**self).exists(label)
    }

    fn read(&self, label: &SecretLabel, cap: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError> {
        (**self).read(label, cap)
    }

    fn create(&self, record: &SecretRecord) -> Result<(), StoreError> {
        (**self).create(record)
    }
}

impl<T: SecretStore + ?Sized> SecretStore for Box<T> {
    fn exists(&self, label: &SecretLabel) -> Result<bool, StoreError> {
        (**self).exists(label)
    }

    fn read(&self, label: &SecretLabel, cap: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError> {
        (**self).read(label, cap)
    }

    fn create(&self, record: &SecretRecord) -> Result<(), StoreError> {
        (**self).create(record)
    }
}
