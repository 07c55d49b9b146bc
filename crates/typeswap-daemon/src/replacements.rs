//! In-memory projection of the store: the known words, the credential
//! keywords and the two lookup caches.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::{debug, info, warn};
use typeswap_core::storage::{CredentialStore, ShortcutStore};
use typeswap_core::{Config, InputClassifier, ReplacementCache, Result, Store, TextRole};

use crate::{read, write};

#[derive(Debug, Default)]
struct Definitions {
    words: HashMap<String, String>,
    credential_keywords: HashSet<String>,
}

pub struct ReplacementTable {
    definitions: RwLock<Definitions>,
    replacements: ReplacementCache,
    credentials: ReplacementCache,
    classifier: InputClassifier,
    credential_prefix: String,
    pin_credentials: bool,
}

impl ReplacementTable {
    pub fn new(config: &Config) -> Self {
        Self {
            definitions: RwLock::new(Definitions::default()),
            replacements: ReplacementCache::new(config.replacement_cache_capacity),
            credentials: ReplacementCache::new(config.credential_cache_capacity),
            classifier: InputClassifier::from_config(config),
            credential_prefix: config.credential_prefix.clone(),
            pin_credentials: config.pin_credentials,
        }
    }

    /// Pull the shortcut and credential definitions from `store`, replacing
    /// whatever was loaded before. Returns the number of usable words.
    pub fn load(&self, store: &dyn Store) -> Result<usize> {
        let shortcuts = store.get_shortcuts()?;
        let service_keywords = store.credential_keywords()?;

        let mut definitions = write(&self.definitions);
        self.clear_caches();

        let total = shortcuts.len();
        let mut words: HashMap<String, String> = shortcuts
            .into_iter()
            .filter(|(keyword, _)| self.classifier.is_valid(keyword, TextRole::Shortcut))
            .collect();
        let rejected = total - words.len();
        let mut credential_keywords = HashSet::new();
        for keyword in service_keywords {
            if self.classifier.is_valid(&keyword, TextRole::Shortcut) {
                words.entry(keyword.clone()).or_default();
                credential_keywords.insert(keyword);
            }
        }

        for (keyword, replacement) in &words {
            if !replacement.is_empty() && self.classifier.is_valid(replacement, TextRole::Content) {
                self.replacements.set(keyword, replacement);
            }
        }

        credential_keywords.extend(
            words
                .keys()
                .filter(|keyword| keyword.starts_with(&self.credential_prefix))
                .cloned(),
        );

        if rejected > 0 {
            warn!(rejected, "Skipped invalid shortcut keywords");
        }
        info!(
            words = words.len(),
            credentials = credential_keywords.len(),
            "Loaded replacements"
        );
        debug!(cached = self.replacements.len(), "Primed replacement cache");

        let count = words.len();
        *definitions = Definitions {
            words,
            credential_keywords,
        };
        Ok(count)
    }

    pub fn is_known(&self, word: &str) -> bool {
        read(&self.definitions).words.contains_key(word)
    }

    pub fn is_credential(&self, word: &str) -> bool {
        read(&self.definitions).credential_keywords.contains(word)
    }

    pub fn len(&self) -> usize {
        read(&self.definitions).words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find the replacement for `word`.
    ///
    /// Credential keywords go to the credential cache and then the store's
    /// rotation; everything else to the replacement cache and then the
    /// loaded map.
    pub fn resolve(&self, word: &str, store: &dyn Store) -> Result<Option<String>> {
        let definitions = read(&self.definitions);

        if definitions.credential_keywords.contains(word) {
            if self.pin_credentials {
                if let Some(value) = self.credentials.get(word) {
                    return Ok(Some(value));
                }
            }
            let value = store.get_next_credential(word)?;
            if let Some(value) = &value {
                if self.pin_credentials {
                    self.credentials.set(word, value);
                }
            }
            return Ok(value);
        }

        if let Some(value) = self.replacements.get(word) {
            return Ok(Some(value));
        }
        match definitions.words.get(word) {
            Some(value) if !value.is_empty() => {
                self.replacements.set(word, value);
                Ok(Some(value.clone()))
            }
            _ => Ok(None),
        }
    }

    pub fn clear_caches(&self) {
        self.replacements.clear();
        self.credentials.clear();
    }

    /// Entries held by both caches together.
    pub fn cache_population(&self) -> usize {
        self.replacements.len() + self.credentials.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeswap_core::MemoryStore;

    fn store() -> MemoryStore {
        let store = MemoryStore::with_shortcuts([("sig", "Best regards"), ("addr", "1 Main St")])
            .unwrap();
        store.add_service("netflix", "Netflix", "@nf").unwrap();
        for content in ["first", "second"] {
            store.add_credential("netflix", content).unwrap();
        }
        store
    }

    #[test]
    fn load_merges_service_keywords() {
        let store = store();
        let table = ReplacementTable::new(&Config::default());
        assert_eq!(table.load(&store).unwrap(), 3);
        assert!(table.is_known("sig"));
        assert!(table.is_known("@nf"));
        assert!(table.is_credential("@nf"));
        assert!(!table.is_credential("sig"));
        assert!(!table.is_known("nope"));
    }

    #[test]
    fn load_primes_replacement_cache() {
        let store = store();
        let table = ReplacementTable::new(&Config::default());
        table.load(&store).unwrap();
        assert_eq!(table.cache_population(), 2);
        table.clear_caches();
        assert_eq!(table.cache_population(), 0);
        assert_eq!(
            table.resolve("addr", &store).unwrap().as_deref(),
            Some("1 Main St")
        );
        assert_eq!(table.cache_population(), 1);
    }

    #[test]
    fn pinned_credentials_are_cached() {
        let store = store();
        let table = ReplacementTable::new(&Config::default());
        table.load(&store).unwrap();
        assert_eq!(table.resolve("@nf", &store).unwrap().as_deref(), Some("first"));
        assert_eq!(table.resolve("@nf", &store).unwrap().as_deref(), Some("first"));

        // A reload drops the pinned value and the rotation moves on.
        table.load(&store).unwrap();
        assert_eq!(table.resolve("@nf", &store).unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn unpinned_credentials_rotate_every_time() {
        let store = store();
        let config = Config {
            pin_credentials: false,
            ..Config::default()
        };
        let table = ReplacementTable::new(&config);
        table.load(&store).unwrap();
        assert_eq!(table.resolve("@nf", &store).unwrap().as_deref(), Some("first"));
        assert_eq!(table.resolve("@nf", &store).unwrap().as_deref(), Some("second"));
        assert_eq!(table.resolve("@nf", &store).unwrap().as_deref(), Some("first"));
    }

    #[test]
    fn invalid_keywords_never_become_known() {
        let store = MemoryStore::new();
        store.save_shortcut("ok", "fine").unwrap();
        let table = ReplacementTable::new(&Config {
            max_shortcut_len: 2,
            ..Config::default()
        });
        store.save_shortcut("long", "skipped").unwrap();
        assert_eq!(table.load(&store).unwrap(), 1);
        assert!(!table.is_known("long"));
    }
}
