use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};
use typeswap_core::{InputClassifier, Result, TextRole, TypeswapError};

use crate::engine::{Inner, Run};
use crate::queue::{Job, Next};
use crate::substitution::SubstitutionOutcome;

pub(crate) fn spawn_worker(inner: Arc<Inner>, run: Arc<Run>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("typeswap-worker".to_string())
        .spawn(move || process_queue(&inner, &run))
}

/// Drain the run's queue until it is stopped. Nothing in here may end the
/// thread early: errors and panics are counted and escalate to recovery.
fn process_queue(inner: &Arc<Inner>, run: &Run) {
    debug!("Replacement worker started");
    inner.bind_injector_thread(run);
    let config = Arc::clone(&inner.ctx.config);
    let classifier = InputClassifier::from_config(&config);
    let mut consecutive_errors = 0u32;

    while run.is_active() {
        if !inner.supervisor.check_resources(run.queue()) {
            warn!("Resource check failed, waiting before continuing");
            run.sleep(config.unhealthy_backoff());
            continue;
        }

        let word = match run.queue().next(config.queue_poll_interval()) {
            Next::Job(Job::Word(word)) => word,
            Next::Job(Job::Stop) | Next::Closed => break,
            Next::Timeout => continue,
        };

        let result = catch_unwind(AssertUnwindSafe(|| process_word(inner, &classifier, &word)))
            .unwrap_or_else(|_| {
                Err(TypeswapError::SubstitutionFailed(
                    "replacement worker panicked".to_string(),
                ))
            });

        match result {
            Ok(()) => consecutive_errors = 0,
            Err(err) => {
                consecutive_errors += 1;
                error!(
                    attempt = consecutive_errors,
                    "Error in replacement queue: {}", err
                );
                if consecutive_errors >= config.max_consecutive_errors {
                    error!("Too many consecutive errors, attempting service recovery");
                    inner.state.set_healthy(false);
                    if let Err(err) = inner.recover_or_restart(run) {
                        error!("Pipeline could not be revived: {}", err);
                    }
                    consecutive_errors = 0;
                }
                run.sleep(config.error_backoff());
            }
        }
    }
    debug!("Replacement worker stopped");
}

fn process_word(inner: &Inner, classifier: &InputClassifier, word: &str) -> Result<()> {
    if let Err(err) = classifier.validate(word, TextRole::Shortcut) {
        warn!("Invalid shortcut rejected: {}", err);
        return Ok(());
    }

    let Some(replacement) = inner.table.resolve(word, inner.ctx.store.as_ref())? else {
        debug!("No replacement available for typed word");
        return Ok(());
    };

    if let Err(err) = classifier.validate(&replacement, TextRole::Content) {
        warn!("Invalid replacement rejected: {}", err);
        return Ok(());
    }

    match inner.substitution.perform(word, &replacement)? {
        SubstitutionOutcome::Performed => {}
        SubstitutionOutcome::Debounced => debug!("Replacement debounced"),
    }
    Ok(())
}
