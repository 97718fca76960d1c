use core_foundation::base::{CFType, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::data::CFData;
use core_foundation::dictionary::{CFDictionary, CFMutableDictionary};
use core_foundation::string::CFString;
use security_framework::base::Error as SecError;
use security_framework::item::{
    add_item, ItemAddOptions, ItemAddValue, ItemClass, ItemSearchOptions, Limit, SearchResult,
};

use super::{SecretRecord, SecretStore, StoreError};
use crate::capability::ReleaseCap;
use crate::request::SecretLabel;
use crate::secret::Secret;

const ERR_SEC_DUPLICATE_ITEM: i32 = -25299;
const ERR_SEC_ITEM_NOT_FOUND: i32 = -25300;

// Values of kSecAttrAccessible, kSecAttrAccessibleWhenUnlocked and
// kSecAttrSynchronizable.
const ATTR_ACCESSIBLE: &str = "pdmn";
const ACCESSIBLE_WHEN_UNLOCKED: &str = "ak";
const ATTR_SYNCHRONIZABLE: &str = "sync";

/// [`SecretStore`] over generic-password items in the user's keychain.
///
/// Items are found by label alone, so entries saved by the prompt helper
/// itself are seen too. Items created here get the configured service
/// (`GnuPG` by default) and the request's cache id as account. They are
/// readable only while the device is unlocked and never synchronized.
#[derive(Debug, Clone)]
pub struct KeychainStore {
    service: String,
}

impl KeychainStore {
    /// Creates a store that tags new items with `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

fn backend(err: SecError) -> StoreError {
    StoreError::backend(format!("keychain status {}", err.code()))
}

impl SecretStore for KeychainStore {
    fn exists(&self, label: &SecretLabel) -> Result<bool, StoreError> {
        // Attributes only: asking for data would trigger an access prompt.
        let found = ItemSearchOptions::new()
            .class(ItemClass::generic_password())
            .label(label.as_str())
            .load_attributes(true)
            .limit(Limit::Max(1))
            .search();

        match found {
            Ok(results) => Ok(results.len() == 1),
            Err(err) if err.code() == ERR_SEC_ITEM_NOT_FOUND => Ok(false),
            Err(err) => Err(backend(err)),
        }
    }

    fn read(&self, label: &SecretLabel, _cap: ReleaseCap) -> Result<Secret<Vec<u8>>, StoreError> {
        let found = ItemSearchOptions::new()
            .class(ItemClass::generic_password())
            .label(label.as_str())
            .load_data(true)
            .limit(Limit::Max(1))
            .search();

        let mut results = match found {
            Ok(results) => results,
            Err(err) if err.code() == ERR_SEC_ITEM_NOT_FOUND => return Err(StoreError::NotFound),
            Err(err) => return Err(backend(err)),
        };

        if results.len() > 1 {
            return Err(StoreError::backend("multiple entries matched the label"));
        }
        match results.pop() {
            Some(SearchResult::Data(data)) => Ok(Secret::new(data)),
            Some(_) => Err(StoreError::backend("keychain returned no data")),
            None => Err(StoreError::NotFound),
        }
    }

    fn create(&self, record: &SecretRecord) -> Result<(), StoreError> {
        let mut options = ItemAddOptions::new(ItemAddValue::Data {
            class: ItemClass::generic_password(),
            data: CFData::from_buffer(record.payload.expose_secret()),
        });
        options
            .set_label(record.label.as_str())
            .set_service(&self.service)
            .set_account_name(&record.account);

        match add_item(with_protection(&options.to_dictionary())) {
            Ok(()) => Ok(()),
            Err(err) if err.code() == ERR_SEC_DUPLICATE_ITEM => Err(StoreError::DuplicateEntry),
            Err(err) => Err(backend(err)),
        }
    }
}

/// Adds the accessibility class and the no-sync flag to an add query.
fn with_protection(query: &CFDictionary) -> CFDictionary {
    let mut query = CFMutableDictionary::from(query);
    for (key, value) in protection_attributes() {
        query.set(key.as_CFTypeRef(), value.as_CFTypeRef());
    }
    query.to_immutable()
}

fn protection_attributes() -> [(CFString, CFType); 2] {
    [
        (
            CFString::from_static_string(ATTR_ACCESSIBLE),
            CFString::from_static_string(ACCESSIBLE_WHEN_UNLOCKED).as_CFType(),
        ),
        (
            CFString::from_static_string(ATTR_SYNCHRONIZABLE),
            CFBoolean::false_value().as_CFType(),
        ),
    ]
}
