use thiserror::Error;
use tracing::warn;

use crate::config::Config;

pub const DEFAULT_MAX_SHORTCUT_LEN: usize = 50;
pub const DEFAULT_MAX_CONTENT_LEN: usize = 10_000;

/// Punctuation allowed in a shortcut keyword, besides ASCII letters and digits.
const SHORTCUT_PUNCTUATION: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?/~` \"'\\";

/// Control characters never allowed to reach the input injector.
const BLOCKED_CONTENT_CHARS: [char; 5] = ['\u{0}', '\u{1}', '\u{2}', '\u{3}', '\u{4}'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRole {
    /// A typed keyword.
    Shortcut,
    /// Expansion text about to be pasted.
    Content,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("text is empty")]
    Empty,
    #[error("text is {len} characters long (max {max})")]
    TooLong { len: usize, max: usize },
    #[error("shortcut contains invalid character {0:?}")]
    InvalidChar(char),
    #[error("shortcut cannot be only whitespace")]
    OnlyWhitespace,
    #[error("shortcut cannot start or end with whitespace")]
    SurroundingWhitespace,
    #[error("text contains blocked control character {0:?}")]
    BlockedChar(char),
}

#[derive(Debug, Clone)]
pub struct InputClassifier {
    max_shortcut_len: usize,
    max_content_len: usize,
}

impl Default for InputClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SHORTCUT_LEN, DEFAULT_MAX_CONTENT_LEN)
    }
}

impl InputClassifier {
    pub fn new(max_shortcut_len: usize, max_content_len: usize) -> Self {
        Self {
            max_shortcut_len,
            max_content_len,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_shortcut_len, config.max_content_len)
    }

    pub fn validate(&self, text: &str, role: TextRole) -> Result<(), ValidationError> {
        if text.is_empty() {
            return Err(ValidationError::Empty);
        }

        let max = match role {
            TextRole::Shortcut => self.max_shortcut_len,
            TextRole::Content => self.max_content_len,
        };
        let len = text.chars().count();
        if len > max {
            return Err(ValidationError::TooLong { len, max });
        }

        match role {
            TextRole::Shortcut => validate_shortcut(text),
            TextRole::Content => validate_content(text),
        }
    }

    /// Like [`validate`](Self::validate), logging the rejection reason.
    pub fn is_valid(&self, text: &str, role: TextRole) -> bool {
        match self.validate(text, role) {
            Ok(()) => true,
            Err(err) => {
                warn!(?role, "Rejected input: {}", err);
                false
            }
        }
    }
}

fn is_shortcut_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || SHORTCUT_PUNCTUATION.contains(c)
}

fn validate_shortcut(text: &str) -> Result<(), ValidationError> {
    if let Some(bad) = text.chars().find(|c| !is_shortcut_char(*c)) {
        return Err(ValidationError::InvalidChar(bad));
    }
    if text.chars().all(char::is_whitespace) {
        return Err(ValidationError::OnlyWhitespace);
    }
    let starts = text.chars().next().is_some_and(char::is_whitespace);
    let ends = text.chars().next_back().is_some_and(char::is_whitespace);
    if starts || ends {
        return Err(ValidationError::SurroundingWhitespace);
    }
    Ok(())
}

fn validate_content(text: &str) -> Result<(), ValidationError> {
    match text.chars().find(|c| BLOCKED_CONTENT_CHARS.contains(c)) {
        Some(bad) => Err(ValidationError::BlockedChar(bad)),
        None => Ok(()),
    }
}
