use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{error, trace};
use typeswap_core::{KeyInput, Platform, Result};

use crate::buffer::TypedBuffer;
use crate::lock;
use crate::queue::WorkQueue;
use crate::replacements::ReplacementTable;
use crate::state::SharedState;

/// Turns key-down events into completed words for the worker.
///
/// Runs on the hook's thread, so it never blocks on anything slower than
/// the buffer lock and never lets a panic escape.
pub struct KeystrokeDispatcher {
    buffer: Arc<Mutex<TypedBuffer>>,
    table: Arc<ReplacementTable>,
    state: Arc<SharedState>,
    queue: WorkQueue,
    active: Arc<AtomicBool>,
}

impl KeystrokeDispatcher {
    pub fn new(
        buffer: Arc<Mutex<TypedBuffer>>,
        table: Arc<ReplacementTable>,
        state: Arc<SharedState>,
        queue: WorkQueue,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            buffer,
            table,
            state,
            queue,
            active,
        }
    }

    pub fn handle(&self, input: KeyInput) {
        if !self.active.load(Ordering::SeqCst) || self.state.is_replacing() {
            return;
        }

        if catch_unwind(AssertUnwindSafe(|| self.dispatch(input))).is_err() {
            error!("Key event handling failed, clearing buffer");
            lock(&self.buffer).clear();
        }
    }

    fn dispatch(&self, input: KeyInput) {
        match input {
            KeyInput::Boundary(_) => {
                let word = lock(&self.buffer).take_word();
                if word.is_empty() {
                    return;
                }
                if self.table.is_known(&word) {
                    trace!(len = word.chars().count(), "Queueing known word");
                    self.queue.push(word);
                } else {
                    trace!("No match for typed word");
                }
            }
            KeyInput::Backspace => {
                lock(&self.buffer).pop();
            }
            KeyInput::Char(c) => {
                if !lock(&self.buffer).push(c) {
                    trace!("Typed buffer full, ignoring key");
                }
            }
            KeyInput::Other => {}
        }
    }
}

/// Route the platform's keyboard hook into `dispatcher`.
pub fn start_keyboard_listener(
    platform: &dyn Platform,
    dispatcher: Arc<KeystrokeDispatcher>,
) -> Result<()> {
    platform.hook_keyboard(Arc::new(move |input| dispatcher.handle(input)))
}
