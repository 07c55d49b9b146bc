//! Persistent store collaborator.
//!
//! The pipeline treats storage as an opaque key/value service: it pulls the
//! shortcut map on (re)load and asks for the next credential of a service
//! keyword. Everything else here exists for the front end that edits the
//! store.

mod json;
mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::{InputClassifier, TextRole};
use crate::credentials::{next_credential_index, next_position};
use crate::error::{Result, TypeswapError};
use crate::models::{CredentialEntry, Service, ShortcutEntry};

pub trait ShortcutStore: Send + Sync {
    /// All shortcuts as `keyword -> replacement`.
    fn get_shortcuts(&self) -> Result<HashMap<String, String>>;

    fn list_shortcuts(&self) -> Result<Vec<ShortcutEntry>>;

    fn shortcut(&self, keyword: &str) -> Result<Option<ShortcutEntry>>;

    /// Insert or update a shortcut.
    fn save_shortcut(&self, keyword: &str, replacement: &str) -> Result<()>;

    fn delete_shortcut(&self, keyword: &str) -> Result<()>;
}

pub trait CredentialStore: Send + Sync {
    /// Keywords that resolve through credential rotation.
    fn credential_keywords(&self) -> Result<Vec<String>>;

    /// Hand out the next credential for a service keyword and mark it used.
    fn get_next_credential(&self, keyword: &str) -> Result<Option<String>>;

    fn services(&self) -> Result<Vec<Service>>;

    fn add_service(&self, code: &str, name: &str, shortcut: &str) -> Result<Service>;

    fn add_credential(&self, service_code: &str, content: &str) -> Result<CredentialEntry>;

    fn import_credentials(&self, service_code: &str, contents: &[String]) -> Result<ImportSummary>;

    fn credentials(&self, service_code: &str) -> Result<Vec<CredentialEntry>>;

    /// Clear usage marks for one service, or for all of them. Returns how
    /// many credentials were reset.
    fn reset_credential_usage(&self, service_code: Option<&str>) -> Result<usize>;
}

/// A full storage backend.
pub trait Store: ShortcutStore + CredentialStore {}

impl<T: ShortcutStore + CredentialStore> Store for T {}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Serialized shape of the store, shared by the file and memory backends.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub(crate) struct StoreData {
    #[serde(default)]
    shortcuts: Vec<ShortcutEntry>,
    #[serde(default)]
    services: Vec<Service>,
    #[serde(default)]
    credentials: Vec<CredentialEntry>,
    #[serde(default)]
    next_id: u64,
}

impl StoreData {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub(crate) fn shortcut_map(&self) -> HashMap<String, String> {
        self.shortcuts
            .iter()
            .map(|entry| (entry.keyword.clone(), entry.replacement.clone()))
            .collect()
    }

    pub(crate) fn list_shortcuts(&self) -> Vec<ShortcutEntry> {
        let mut entries = self.shortcuts.clone();
        entries.sort_by(|a, b| a.keyword.cmp(&b.keyword));
        entries
    }

    pub(crate) fn shortcut(&self, keyword: &str) -> Option<ShortcutEntry> {
        self.shortcuts.iter().find(|e| e.keyword == keyword).cloned()
    }

    pub(crate) fn save_shortcut(
        &mut self,
        classifier: &InputClassifier,
        keyword: &str,
        replacement: &str,
    ) -> Result<()> {
        classifier.validate(keyword, TextRole::Shortcut)?;
        classifier.validate(replacement, TextRole::Content)?;

        match self.shortcuts.iter_mut().find(|e| e.keyword == keyword) {
            Some(entry) => entry.update_replacement(replacement.to_string()),
            None => self.shortcuts.push(ShortcutEntry::new(
                keyword.to_string(),
                replacement.to_string(),
            )),
        }
        Ok(())
    }

    pub(crate) fn delete_shortcut(&mut self, keyword: &str) -> Result<()> {
        let before = self.shortcuts.len();
        self.shortcuts.retain(|entry| entry.keyword != keyword);
        if self.shortcuts.len() == before {
            return Err(TypeswapError::NotFound(format!("shortcut '{}'", keyword)));
        }
        Ok(())
    }

    pub(crate) fn credential_keywords(&self) -> Vec<String> {
        self.services.iter().map(|s| s.shortcut.clone()).collect()
    }

    pub(crate) fn services(&self) -> Vec<Service> {
        let mut services = self.services.clone();
        services.sort_by(|a, b| a.name.cmp(&b.name));
        services
    }

    pub(crate) fn add_service(
        &mut self,
        classifier: &InputClassifier,
        code: &str,
        name: &str,
        shortcut: &str,
    ) -> Result<Service> {
        classifier.validate(shortcut, TextRole::Shortcut)?;
        if code.trim().is_empty() || name.trim().is_empty() {
            return Err(TypeswapError::Store(
                "service code and name cannot be empty".to_string(),
            ));
        }
        if self
            .services
            .iter()
            .any(|s| s.code == code || s.shortcut == shortcut)
        {
            return Err(TypeswapError::Store(format!(
                "service '{}' or keyword '{}' already exists",
                code, shortcut
            )));
        }

        let service = Service {
            id: self.allocate_id(),
            code: code.to_string(),
            name: name.to_string(),
            shortcut: shortcut.to_string(),
        };
        self.services.push(service.clone());
        Ok(service)
    }

    fn service_id(&self, code: &str) -> Result<u64> {
        self.services
            .iter()
            .find(|s| s.code == code)
            .map(|s| s.id)
            .ok_or_else(|| TypeswapError::NotFound(format!("service '{}'", code)))
    }

    fn service_credentials(&self, service_id: u64) -> Vec<CredentialEntry> {
        self.credentials
            .iter()
            .filter(|c| c.service_id == service_id)
            .cloned()
            .collect()
    }

    pub(crate) fn add_credential(
        &mut self,
        service_code: &str,
        content: &str,
    ) -> Result<CredentialEntry> {
        let service_id = self.service_id(service_code)?;
        if content.trim().is_empty() {
            return Err(TypeswapError::Store(
                "credential content cannot be empty".to_string(),
            ));
        }

        let position = next_position(&self.service_credentials(service_id));
        let entry = CredentialEntry {
            id: self.allocate_id(),
            service_id,
            content: content.to_string(),
            position,
            last_used: None,
        };
        self.credentials.push(entry.clone());
        Ok(entry)
    }

    pub(crate) fn import_credentials(
        &mut self,
        service_code: &str,
        contents: &[String],
    ) -> Result<ImportSummary> {
        let service_id = self.service_id(service_code)?;
        let mut summary = ImportSummary::default();

        for raw in contents {
            let content = raw.trim();
            if content.is_empty() {
                continue;
            }
            let duplicate = self
                .credentials
                .iter()
                .any(|c| c.service_id == service_id && c.content == content);
            if duplicate {
                summary.skipped += 1;
                continue;
            }
            self.add_credential(service_code, content)?;
            summary.imported += 1;
        }

        Ok(summary)
    }

    pub(crate) fn credentials(&self, service_code: &str) -> Result<Vec<CredentialEntry>> {
        let service_id = self.service_id(service_code)?;
        let mut entries = self.service_credentials(service_id);
        entries.sort_by_key(|c| c.position);
        Ok(entries)
    }

    /// Rotate the service behind `keyword`; a wrap-around clears the other
    /// usage marks so the rotation keeps cycling.
    pub(crate) fn next_credential(&mut self, keyword: &str) -> Option<String> {
        let service_id = self.services.iter().find(|s| s.shortcut == keyword)?.id;

        let indices: Vec<usize> = self
            .credentials
            .iter()
            .enumerate()
            .filter(|(_, c)| c.service_id == service_id)
            .map(|(i, _)| i)
            .collect();
        let service_creds: Vec<CredentialEntry> =
            indices.iter().map(|&i| self.credentials[i].clone()).collect();

        let next = next_credential_index(&service_creds)?;
        let chosen = indices[next.index];

        if next.wrapped {
            debug!(service_id, "Credential rotation wrapped around");
            for &i in &indices {
                self.credentials[i].last_used = None;
            }
        }
        self.credentials[chosen].last_used = Some(Utc::now());
        Some(self.credentials[chosen].content.clone())
    }

    pub(crate) fn reset_credential_usage(&mut self, service_code: Option<&str>) -> Result<usize> {
        let service_id = service_code.map(|code| self.service_id(code)).transpose()?;
        let mut reset = 0;
        for cred in &mut self.credentials {
            if service_id.map_or(true, |id| cred.service_id == id) && cred.last_used.is_some() {
                cred.last_used = None;
                reset += 1;
            }
        }
        Ok(reset)
    }
}
