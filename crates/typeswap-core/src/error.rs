use std::io;

use thiserror::Error;

use crate::classifier::ValidationError;

#[derive(Debug, Error)]
pub enum TypeswapError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Rejected input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Input injection error: {0}")]
    InputInjection(String),

    #[error("Keyboard hook error: {0}")]
    Hook(String),

    #[error("Substitution failed: {0}")]
    SubstitutionFailed(String),

    #[error("Failed to start: {0}")]
    Startup(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TypeswapError {
    /// Errors worth retrying with backoff: the clipboard or the input queue
    /// may be held by another process for a moment.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TypeswapError::Clipboard(_) | TypeswapError::InputInjection(_)
        )
    }

    pub fn is_startup(&self) -> bool {
        matches!(self, TypeswapError::Startup(_) | TypeswapError::Hook(_))
    }
}

pub type Result<T> = std::result::Result<T, TypeswapError>;
