use std::cell::RefCell;
use std::collections::HashMap;

use zeroize::Zeroize;

use super::{SecretRecord, SecretStore, StoreError};
use crate::capability::ReleaseCap;
use crate::request::SecretLabel;
use crate::secret::Secret;

struct Entry {
    account: String,
    payload: Vec<u8>,
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.payload.zeroize();
    }
}

/// In-process [`SecretStore`].
///
/// Entries live only as long as the store. Useful for running the gate
/// without a platform keychain, and as the store behind the tests.
///
/// # Example
///
/// ```
/// use pinentry_gate::{MemoryStore, SecretLabel, SecretStore};
///
/// let store = MemoryStore::new();
/// let label = SecretLabel::from_parts("Alice", "alice@example.com", "A1B2C3D4");
///
/// assert!(!store.exists(&label).unwrap());
/// store.insert(&label, "cache-1", b"1234");
/// assert!(store.exists(&label).unwrap());
/// ```
#[derive(Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<SecretLabel, Entry>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry directly, bypassing duplicate checks.
    ///
    /// This models a second writer such as a prompt helper that saves the
    /// PIN on its own.
    pub fn insert(&self, label: &SecretLabel, account: &str, payload: &[u8]) {
        self.entries.borrow_mut().insert(
            label.clone(),
            Entry {
                account: account.to_string(),
                payload: payload.to_vec(),
            },
        );
    }

    /// Returns the account attribute of an entry.
    pub fn account(&self, label: &SecretLabel) -> Option<String> {
        self.entries
            .borrow()
            .get(label)
            .map(|entry| entry.account.clone())
    }

    /// Compares a stored payload with `expected` without handing it out.
    pub fn payload_matches(&self, label: &SecretLabel, expected: &[u8]) -> bool {
        self.entries
            .borrow()
            .get(label)
            .is_some_and(|entry| entry.payload == expected)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl SecretStore for MemoryStore {
    fn exists(&self, label: &SecretLabel) -> Result<bool, StoreError> {
        Ok(self.entries.borrow().contains_key(label))
    }

    fn read(&self, label: &SecretLabel, _cap: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError> {
        self.entries
            .borrow()
            .get(label)
            .map(|entry| Secret::new(entry.payload.clone()))
            .ok_or(StoreError::NotFound)
    }

    fn create(&self, record: &SecretRecord) -> Result<(), StoreError> {
        let mut entries = self.entries.borrow_mut();
        if entries.contains_key(&record.label) {
            return Err(StoreError::DuplicateEntry);
        }

        entries.insert(
            record.label.clone(),
            Entry {
                account: record.account.clone(),
                payload: record.payload.expose_secret().clone(),
            },
        );
        Ok(())
    }
}
