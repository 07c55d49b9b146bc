//! Save / set / restore protocol around the shared clipboard.
//!
//! Another process may hold the clipboard open for a moment, so every access
//! goes through a [`RetryPolicy`] with exponential backoff.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use crate::config::Config;
use crate::error::{Result, TypeswapError};
use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.clipboard_retry_attempts, config.clipboard_base_delay())
    }

    /// Pause before attempt number `attempt` (zero-based): none before the
    /// first, `base * 2^attempt` afterwards.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    /// Run `op` until it succeeds or the attempt budget is spent. Errors
    /// that are not transient end the loop immediately.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_error = None;
        for attempt in 0..self.attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => return Err(err),
                Err(err) => {
                    warn!(attempt = attempt + 1, "{} attempt failed: {}", what, err);
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(TypeswapError::Clipboard(format!(
            "{} failed after {} attempts: {}",
            what, self.attempts, reason
        )))
    }
}

pub struct ClipboardTransaction {
    platform: Arc<dyn Platform>,
    retry: RetryPolicy,
}

/// Puts the saved clipboard back when dropped, so the restore also runs when
/// the protected action unwinds.
struct RestoreGuard<'a> {
    transaction: &'a ClipboardTransaction,
    original: Option<String>,
}

impl Drop for RestoreGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.transaction.restore(self.original.as_deref()) {
            error!("Failed to restore clipboard: {}", err);
        }
    }
}

impl ClipboardTransaction {
    pub fn new(platform: Arc<dyn Platform>, retry: RetryPolicy) -> Self {
        Self { platform, retry }
    }

    /// Read the clipboard text, `None` if it holds none.
    pub fn read(&self) -> Result<Option<String>> {
        self.retry
            .run("Clipboard read", || self.platform.read_clipboard())
    }

    /// Write `text` and read it back, retrying until the clipboard really
    /// holds it.
    pub fn write_verified(&self, text: &str) -> Result<()> {
        self.retry.run("Clipboard write", || {
            self.platform.write_clipboard(text)?;
            match self.platform.read_clipboard()? {
                Some(current) if current == text => Ok(()),
                _ => Err(TypeswapError::Clipboard(
                    "clipboard verification failed".to_string(),
                )),
            }
        })
    }

    /// Put `original` back; an originally empty clipboard is cleared.
    pub fn restore(&self, original: Option<&str>) -> Result<()> {
        self.retry.run("Clipboard restore", || match original {
            Some(text) => self.platform.write_clipboard(text),
            None => self.platform.clear_clipboard(),
        })
    }

    /// Place `text` on the clipboard for the duration of `action`, then put
    /// the previous contents back whatever the outcome.
    ///
    /// Failing to save the current contents aborts before anything is
    /// touched. Failing to restore is logged and does not change the result.
    pub fn substitute<T>(&self, text: &str, action: impl FnOnce() -> Result<T>) -> Result<T> {
        let original = self.read()?;
        debug!(saved = original.is_some(), "Saved clipboard");

        let _guard = RestoreGuard {
            transaction: self,
            original,
        };
        self.write_verified(text)?;
        action()
    }
}
