pub mod cache;
pub mod classifier;
pub mod clipboard;
pub mod config;
pub mod credentials;
pub mod error;
pub mod injector;
pub mod keyboard;
pub mod models;
pub mod platform;
pub mod storage;

// Re-export common items for convenience
pub use cache::ReplacementCache;
pub use classifier::{InputClassifier, TextRole, ValidationError};
pub use clipboard::{ClipboardTransaction, RetryPolicy};
pub use config::{get_config_dir, Config};
pub use error::{Result, TypeswapError};
pub use injector::InputInjector;
pub use keyboard::{BoundaryKey, KeyInput};
pub use models::{CredentialEntry, Service, ShortcutEntry};
pub use platform::{KeyHandler, MockPlatform, NativePlatform, Platform};
pub use storage::{JsonStore, MemoryStore, Store};
