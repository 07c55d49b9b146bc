use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{CredentialStore, ImportSummary, ShortcutStore, StoreData};
use crate::classifier::InputClassifier;
use crate::error::Result;
use crate::models::{CredentialEntry, Service, ShortcutEntry};

/// Non-persistent store, for embedding and tests.
#[derive(Default)]
pub struct MemoryStore {
    classifier: InputClassifier,
    data: Mutex<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with `(keyword, replacement)` pairs.
    pub fn with_shortcuts<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let store = Self::new();
        for (keyword, replacement) in pairs {
            store.save_shortcut(keyword, replacement)?;
        }
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, StoreData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ShortcutStore for MemoryStore {
    fn get_shortcuts(&self) -> Result<HashMap<String, String>> {
        Ok(self.lock().shortcut_map())
    }

    fn list_shortcuts(&self) -> Result<Vec<ShortcutEntry>> {
        Ok(self.lock().list_shortcuts())
    }

    fn shortcut(&self, keyword: &str) -> Result<Option<ShortcutEntry>> {
        Ok(self.lock().shortcut(keyword))
    }

    fn save_shortcut(&self, keyword: &str, replacement: &str) -> Result<()> {
        self.lock()
            .save_shortcut(&self.classifier, keyword, replacement)
    }

    fn delete_shortcut(&self, keyword: &str) -> Result<()> {
        self.lock().delete_shortcut(keyword)
    }
}

impl CredentialStore for MemoryStore {
    fn credential_keywords(&self) -> Result<Vec<String>> {
        Ok(self.lock().credential_keywords())
    }

    fn get_next_credential(&self, keyword: &str) -> Result<Option<String>> {
        Ok(self.lock().next_credential(keyword))
    }

    fn services(&self) -> Result<Vec<Service>> {
        Ok(self.lock().services())
    }

    fn add_service(&self, code: &str, name: &str, shortcut: &str) -> Result<Service> {
        self.lock()
            .add_service(&self.classifier, code, name, shortcut)
    }

    fn add_credential(&self, service_code: &str, content: &str) -> Result<CredentialEntry> {
        self.lock().add_credential(service_code, content)
    }

    fn import_credentials(&self, service_code: &str, contents: &[String]) -> Result<ImportSummary> {
        self.lock().import_credentials(service_code, contents)
    }

    fn credentials(&self, service_code: &str) -> Result<Vec<CredentialEntry>> {
        self.lock().credentials(service_code)
    }

    fn reset_credential_usage(&self, service_code: Option<&str>) -> Result<usize> {
        self.lock().reset_credential_usage(service_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delete_missing_shortcut_is_not_found() {
        let store = MemoryStore::with_shortcuts([("sig", "Regards")]).unwrap();
        store.delete_shortcut("sig").unwrap();
        assert!(matches!(
            store.delete_shortcut("sig"),
            Err(crate::TypeswapError::NotFound(_))
        ));
    }

    #[test]
    fn save_updates_existing_keyword() {
        let store = MemoryStore::with_shortcuts([("sig", "Regards")]).unwrap();
        store.save_shortcut("sig", "Cheers").unwrap();
        let all = store.list_shortcuts().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].replacement, "Cheers");
    }
}
