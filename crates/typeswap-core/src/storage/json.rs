use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{CredentialStore, ImportSummary, ShortcutStore, StoreData};
use crate::classifier::InputClassifier;
use crate::config::{ensure_config_dir, DB_FILENAME};
use crate::error::Result;
use crate::models::{CredentialEntry, Service, ShortcutEntry};

/// Modification time and length of the backing file.
type Fingerprint = (SystemTime, u64);

struct Loaded {
    data: StoreData,
    seen: Option<Fingerprint>,
    /// Set whenever an edit by another process is picked up, until
    /// [`JsonStore::take_external_changes`] reports it.
    external_edit: bool,
}

/// Store backed by a single JSON file.
///
/// One handle is shared by every caller. The file is re-read whenever its
/// modification time moves, so edits made by another process (the CLI
/// while the engine runs) become visible on the next read.
pub struct JsonStore {
    path: PathBuf,
    classifier: InputClassifier,
    state: Mutex<Loaded>,
}

fn fingerprint(path: &Path) -> Option<Fingerprint> {
    let metadata = fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

fn read_data(path: &Path) -> Result<StoreData> {
    if !path.exists() {
        return Ok(StoreData::default());
    }

    let content = fs::read_to_string(path)?;

    // Handle empty database file
    if content.trim().is_empty() {
        return Ok(StoreData::default());
    }

    serde_json::from_str(&content).map_err(|e| e.into())
}

impl JsonStore {
    /// Open (or lazily create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = read_data(&path)?;
        debug!(path = %path.display(), "Opened store");
        Ok(Self::from_parts(path, data))
    }

    /// Open the store in the default config directory.
    pub fn open_default() -> Result<Self> {
        let dir = ensure_config_dir()?;
        Self::open(dir.join(DB_FILENAME))
    }

    fn from_parts(path: PathBuf, data: StoreData) -> Self {
        let seen = fingerprint(&path);
        Self {
            path,
            classifier: InputClassifier::default(),
            state: Mutex::new(Loaded {
                data,
                seen,
                external_edit: false,
            }),
        }
    }

    pub fn with_classifier(mut self, classifier: InputClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when another process edited the file since the last call,
    /// whether or not this handle has already re-read it. Clears the flag.
    pub fn take_external_changes(&self) -> Result<bool> {
        let mut state = self.refreshed()?;
        Ok(std::mem::take(&mut state.external_edit))
    }

    fn lock(&self) -> MutexGuard<'_, Loaded> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn refreshed(&self) -> Result<MutexGuard<'_, Loaded>> {
        let mut state = self.lock();
        let current = fingerprint(&self.path);
        if current.is_some() && current != state.seen {
            debug!(path = %self.path.display(), "Store changed on disk, reloading");
            state.data = read_data(&self.path)?;
            state.seen = current;
            state.external_edit = true;
        }
        Ok(state)
    }

    fn read<R>(&self, f: impl FnOnce(&StoreData) -> R) -> Result<R> {
        let state = self.refreshed()?;
        Ok(f(&state.data))
    }

    fn write<R>(&self, f: impl FnOnce(&mut StoreData) -> Result<R>) -> Result<R> {
        let mut state = self.refreshed()?;
        // Mutate a copy so a failed save leaves memory matching the file.
        let mut data = state.data.clone();
        let result = f(&mut data)?;
        self.persist(&data)?;
        state.data = data;
        state.seen = fingerprint(&self.path);
        Ok(result)
    }

    fn persist(&self, data: &StoreData) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !dir.exists() {
            info!(path = %dir.display(), "Creating store directory");
            fs::create_dir_all(&dir)?;
        }

        let serialized = serde_json::to_string_pretty(data)?;
        let mut file = NamedTempFile::new_in(&dir)?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        file.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl ShortcutStore for JsonStore {
    fn get_shortcuts(&self) -> Result<HashMap<String, String>> {
        self.read(StoreData::shortcut_map)
    }

    fn list_shortcuts(&self) -> Result<Vec<ShortcutEntry>> {
        self.read(StoreData::list_shortcuts)
    }

    fn shortcut(&self, keyword: &str) -> Result<Option<ShortcutEntry>> {
        self.read(|data| data.shortcut(keyword))
    }

    fn save_shortcut(&self, keyword: &str, replacement: &str) -> Result<()> {
        let classifier = self.classifier.clone();
        self.write(|data| data.save_shortcut(&classifier, keyword, replacement))
    }

    fn delete_shortcut(&self, keyword: &str) -> Result<()> {
        self.write(|data| data.delete_shortcut(keyword))
    }
}

impl CredentialStore for JsonStore {
    fn credential_keywords(&self) -> Result<Vec<String>> {
        self.read(StoreData::credential_keywords)
    }

    fn get_next_credential(&self, keyword: &str) -> Result<Option<String>> {
        self.write(|data| Ok(data.next_credential(keyword)))
    }

    fn services(&self) -> Result<Vec<Service>> {
        self.read(StoreData::services)
    }

    fn add_service(&self, code: &str, name: &str, shortcut: &str) -> Result<Service> {
        let classifier = self.classifier.clone();
        self.write(|data| data.add_service(&classifier, code, name, shortcut))
    }

    fn add_credential(&self, service_code: &str, content: &str) -> Result<CredentialEntry> {
        self.write(|data| data.add_credential(service_code, content))
    }

    fn import_credentials(&self, service_code: &str, contents: &[String]) -> Result<ImportSummary> {
        self.write(|data| data.import_credentials(service_code, contents))
    }

    fn credentials(&self, service_code: &str) -> Result<Vec<CredentialEntry>> {
        self.read(|data| data.credentials(service_code))?
    }

    fn reset_credential_usage(&self, service_code: Option<&str>) -> Result<usize> {
        self.write(|data| data.reset_credential_usage(service_code))
    }
}
