use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};
use typeswap_core::{
    ClipboardTransaction, InputInjector, Result, RetryPolicy, TypeswapError,
};

use crate::buffer::TypedBuffer;
use crate::context::AppContext;
use crate::events::{EventBus, PipelineEvent};
use crate::lock;
use crate::state::SharedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionOutcome {
    Performed,
    /// Skipped because the previous substitution was too recent.
    Debounced,
}

/// Erases a typed word in the focused application and pastes its
/// replacement through the clipboard.
pub struct Substitution {
    clipboard: ClipboardTransaction,
    injector: InputInjector,
    /// Held for the whole save/paste/restore sequence.
    clipboard_lock: Mutex<()>,
    last_replacement: Mutex<Option<Instant>>,
    min_interval: Duration,
    settle_delay: Duration,
    state: Arc<SharedState>,
    buffer: Arc<Mutex<TypedBuffer>>,
    events: Arc<EventBus>,
}

/// Flags the pipeline as mid-replacement; dropping it clears the flag and
/// the typed buffer whatever the outcome.
struct ReplacingGuard<'a> {
    state: &'a SharedState,
    buffer: &'a Mutex<TypedBuffer>,
}

impl<'a> ReplacingGuard<'a> {
    fn enter(state: &'a SharedState, buffer: &'a Mutex<TypedBuffer>) -> Self {
        state.set_replacing(true);
        Self { state, buffer }
    }
}

impl Drop for ReplacingGuard<'_> {
    fn drop(&mut self) {
        self.state.set_replacing(false);
        lock(self.buffer).clear();
    }
}

impl Substitution {
    pub fn new(
        ctx: &AppContext,
        state: Arc<SharedState>,
        buffer: Arc<Mutex<TypedBuffer>>,
        events: Arc<EventBus>,
    ) -> Self {
        let config = &ctx.config;
        Self {
            clipboard: ClipboardTransaction::new(
                Arc::clone(&ctx.platform),
                RetryPolicy::from_config(config),
            ),
            injector: InputInjector::from_config(Arc::clone(&ctx.platform), config),
            clipboard_lock: Mutex::new(()),
            last_replacement: Mutex::new(None),
            min_interval: config.min_replacement_interval(),
            settle_delay: config.settle_delay(),
            state,
            buffer,
            events,
        }
    }

    /// Replace `typed` (plus the boundary key that ended it) with
    /// `replacement`.
    pub fn perform(&self, typed: &str, replacement: &str) -> Result<SubstitutionOutcome> {
        let _replacing = ReplacingGuard::enter(&self.state, &self.buffer);
        let _exclusive = lock(&self.clipboard_lock);

        if let Some(last) = *lock(&self.last_replacement) {
            if last.elapsed() < self.min_interval {
                debug!("Skipping replacement, too soon after the previous one");
                return Ok(SubstitutionOutcome::Debounced);
            }
        }

        let erase = typed.chars().count() + 1;
        self.clipboard
            .substitute(replacement, || {
                thread::sleep(self.settle_delay);
                self.injector.erase(erase)?;
                self.injector.paste()
            })
            .map_err(|e| {
                error!("Replacement failed: {}", e);
                TypeswapError::SubstitutionFailed(e.to_string())
            })?;

        *lock(&self.last_replacement) = Some(Instant::now());
        self.state.record_success();
        info!(erased = erase, "Replaced typed word");
        debug!(typed, "Replacement details");

        self.events.emit(PipelineEvent::Replaced {
            typed: typed.to_string(),
            replacement: replacement.to_string(),
        });
        Ok(SubstitutionOutcome::Performed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use typeswap_core::{Config, MemoryStore, MockPlatform, Platform};

    fn quick_config(min_interval_ms: u64) -> Config {
        Config {
            min_replacement_interval_ms: min_interval_ms,
            clipboard_base_delay_ms: 0,
            settle_delay_ms: 0,
            backspace_delay_ms: 0,
            paste_delay_ms: 0,
            ..Config::default()
        }
    }

    struct Fixture {
        substitution: Substitution,
        mock: Arc<MockPlatform>,
        state: Arc<SharedState>,
        buffer: Arc<Mutex<TypedBuffer>>,
        events: Arc<EventBus>,
    }

    fn fixture(config: Config) -> Fixture {
        let mock = Arc::new(MockPlatform::with_clipboard("clipboard before"));
        let ctx = AppContext::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::clone(&mock) as Arc<dyn Platform>,
        );
        let state = Arc::new(SharedState::default());
        let buffer = Arc::new(Mutex::new(TypedBuffer::new(100)));
        let events = Arc::new(EventBus::new(1).unwrap());
        let substitution = Substitution::new(
            &ctx,
            Arc::clone(&state),
            Arc::clone(&buffer),
            Arc::clone(&events),
        );
        Fixture {
            substitution,
            mock,
            state,
            buffer,
            events,
        }
    }

    #[test]
    fn replaces_word_and_boundary() {
        let fx = fixture(quick_config(0));
        let events = fx.events.subscribe();
        fx.mock.type_text("Thanks, sig ");

        let outcome = fx.substitution.perform("sig", "Best regards").unwrap();
        assert_eq!(outcome, SubstitutionOutcome::Performed);
        assert_eq!(fx.mock.document(), "Thanks, Best regards");
        assert_eq!(fx.mock.pasted(), vec!["Best regards".to_string()]);
        assert_eq!(fx.mock.clipboard().as_deref(), Some("clipboard before"));
        assert!(fx.state.is_healthy());
        assert!(fx.state.snapshot().last_successful_replacement.is_some());
        assert_eq!(
            events.try_recv().unwrap(),
            PipelineEvent::Replaced {
                typed: "sig".to_string(),
                replacement: "Best regards".to_string(),
            }
        );
    }

    #[test]
    fn second_substitution_within_interval_is_skipped() {
        let fx = fixture(quick_config(60_000));
        fx.mock.type_text("sig ");
        assert_eq!(
            fx.substitution.perform("sig", "Best regards").unwrap(),
            SubstitutionOutcome::Performed
        );
        let strokes = fx.mock.strokes().len();

        fx.mock.type_text("sig ");
        assert_eq!(
            fx.substitution.perform("sig", "Best regards").unwrap(),
            SubstitutionOutcome::Debounced
        );
        assert_eq!(fx.mock.strokes().len(), strokes);
        assert_eq!(fx.mock.document(), "Best regardssig ");
    }

    #[test]
    fn failed_injection_restores_clipboard_and_clears_state() {
        let fx = fixture(quick_config(0));
        fx.mock.type_text("sig ");
        lock(&fx.buffer).push('x');
        fx.mock.fail_injections(1);

        let err = fx.substitution.perform("sig", "Best regards").unwrap_err();
        assert!(matches!(err, TypeswapError::SubstitutionFailed(_)));
        assert_eq!(fx.mock.clipboard().as_deref(), Some("clipboard before"));
        assert_eq!(fx.mock.document(), "sig ");
        assert!(!fx.state.is_replacing());
        assert!(lock(&fx.buffer).is_empty());
    }

    #[test]
    fn unreadable_clipboard_fails_without_touching_screen() {
        let fx = fixture(Config {
            clipboard_retry_attempts: 2,
            ..quick_config(0)
        });
        fx.mock.type_text("sig ");
        fx.mock.fail_reads(2);

        assert!(fx.substitution.perform("sig", "Best regards").is_err());
        assert!(fx.mock.strokes().is_empty());
        assert_eq!(fx.mock.clipboard_writes(), 0);
    }
}
