//! Simulated desktop for tests.
//!
//! The mock keeps a clipboard, a focused "document" that reacts to typed and
//! injected keys the way a text field would, and counters for injecting
//! transient failures.

use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{KeyHandler, Platform};
use crate::error::{Result, TypeswapError};
use crate::keyboard::{BoundaryKey, KeyDirection, KeyInput, KeyStroke, VirtualKey};

#[derive(Default)]
struct Faults {
    read_failures: usize,
    write_failures: usize,
    /// Writes that report success but leave the clipboard untouched.
    lost_writes: usize,
    injection_failures: usize,
    hook_failure: Option<String>,
}

#[derive(Default)]
struct Desktop {
    clipboard: Option<String>,
    document: String,
    strokes: Vec<KeyStroke>,
    pasted: Vec<String>,
    control_down: bool,
    /// (injecting thread, target thread)
    attached: Option<(u32, u32)>,
    faults: Faults,
    clipboard_reads: usize,
    clipboard_writes: usize,
}

/// A [`Platform`] that never touches the real system.
#[derive(Default)]
pub struct MockPlatform {
    desktop: Mutex<Desktop>,
    handler: Mutex<Option<KeyHandler>>,
    foreground: Option<u32>,
}

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(1000);

thread_local! {
    static THREAD_ID: Cell<u32> = const { Cell::new(0) };
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clipboard(text: &str) -> Self {
        let mock = Self::new();
        mock.desktop().clipboard = Some(text.to_string());
        mock
    }

    /// Pretend a foreground window owned by `thread` has focus.
    pub fn with_foreground_thread(mut self, thread: u32) -> Self {
        self.foreground = Some(thread);
        self
    }

    fn desktop(&self) -> MutexGuard<'_, Desktop> {
        self.desktop.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current_handler(&self) -> Option<KeyHandler> {
        self.handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Simulate the user pressing a key in the focused field. Returns false
    /// when no hook is installed (the key still reaches the document).
    pub fn press(&self, input: KeyInput) -> bool {
        {
            let mut desktop = self.desktop();
            match input {
                KeyInput::Char(c) => desktop.document.push(c),
                KeyInput::Boundary(BoundaryKey::Space) => desktop.document.push(' '),
                KeyInput::Boundary(BoundaryKey::Enter) => desktop.document.push('\n'),
                KeyInput::Backspace => {
                    desktop.document.pop();
                }
                KeyInput::Other => {}
            }
        }

        match self.current_handler() {
            Some(handler) => {
                handler(input);
                true
            }
            None => false,
        }
    }

    /// Type `text` character by character; spaces and newlines become
    /// boundary keys.
    pub fn type_text(&self, text: &str) {
        for c in text.chars() {
            let input = match c {
                ' ' => KeyInput::Boundary(BoundaryKey::Space),
                '\n' => KeyInput::Boundary(BoundaryKey::Enter),
                c => KeyInput::Char(c),
            };
            self.press(input);
        }
    }

    pub fn set_clipboard(&self, text: Option<&str>) {
        self.desktop().clipboard = text.map(str::to_string);
    }

    pub fn clipboard(&self) -> Option<String> {
        self.desktop().clipboard.clone()
    }

    pub fn document(&self) -> String {
        self.desktop().document.clone()
    }

    pub fn strokes(&self) -> Vec<KeyStroke> {
        self.desktop().strokes.clone()
    }

    /// Clipboard contents at the moment of each paste chord.
    pub fn pasted(&self) -> Vec<String> {
        self.desktop().pasted.clone()
    }

    pub fn clipboard_writes(&self) -> usize {
        self.desktop().clipboard_writes
    }

    pub fn clipboard_reads(&self) -> usize {
        self.desktop().clipboard_reads
    }

    /// Foreground thread currently attached to, if any.
    pub fn attached_thread(&self) -> Option<u32> {
        self.desktop().attached.map(|(_, target)| target)
    }

    /// The attached (injecting thread, target thread) pair.
    pub fn attachment(&self) -> Option<(u32, u32)> {
        self.desktop().attached
    }

    pub fn is_hooked(&self) -> bool {
        self.current_handler().is_some()
    }

    pub fn fail_reads(&self, count: usize) {
        self.desktop().faults.read_failures = count;
    }

    pub fn fail_writes(&self, count: usize) {
        self.desktop().faults.write_failures = count;
    }

    pub fn lose_writes(&self, count: usize) {
        self.desktop().faults.lost_writes = count;
    }

    pub fn fail_injections(&self, count: usize) {
        self.desktop().faults.injection_failures = count;
    }

    pub fn fail_hook(&self, reason: Option<&str>) {
        self.desktop().faults.hook_failure = reason.map(str::to_string);
    }
}

fn take_fault(counter: &mut usize) -> bool {
    if *counter > 0 {
        *counter -= 1;
        true
    } else {
        false
    }
}

impl Platform for MockPlatform {
    fn read_clipboard(&self) -> Result<Option<String>> {
        let mut desktop = self.desktop();
        desktop.clipboard_reads += 1;
        if take_fault(&mut desktop.faults.read_failures) {
            return Err(TypeswapError::Clipboard("clipboard is locked".to_string()));
        }
        Ok(desktop.clipboard.clone())
    }

    fn write_clipboard(&self, text: &str) -> Result<()> {
        let mut desktop = self.desktop();
        desktop.clipboard_writes += 1;
        if take_fault(&mut desktop.faults.write_failures) {
            return Err(TypeswapError::Clipboard("clipboard is locked".to_string()));
        }
        if take_fault(&mut desktop.faults.lost_writes) {
            return Ok(());
        }
        desktop.clipboard = Some(text.to_string());
        Ok(())
    }

    fn clear_clipboard(&self) -> Result<()> {
        self.desktop().clipboard = None;
        Ok(())
    }

    fn send_key_events(&self, strokes: &[KeyStroke]) -> Result<()> {
        let mut desktop = self.desktop();
        if take_fault(&mut desktop.faults.injection_failures) {
            return Err(TypeswapError::InputInjection(
                "input was blocked".to_string(),
            ));
        }

        for stroke in strokes {
            desktop.strokes.push(*stroke);
            match (stroke.key, stroke.direction) {
                (VirtualKey::Backspace, KeyDirection::Press) => {
                    desktop.document.pop();
                }
                (VirtualKey::Control, direction) => {
                    desktop.control_down = direction == KeyDirection::Press;
                }
                (VirtualKey::V, KeyDirection::Press) => {
                    if desktop.control_down {
                        let pasted = desktop.clipboard.clone().unwrap_or_default();
                        desktop.document.push_str(&pasted);
                        desktop.pasted.push(pasted);
                    } else {
                        desktop.document.push('v');
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn hook_keyboard(&self, handler: KeyHandler) -> Result<()> {
        if let Some(reason) = self.desktop().faults.hook_failure.clone() {
            return Err(TypeswapError::Hook(reason));
        }
        *self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&handler));
        Ok(())
    }

    fn unhook_keyboard(&self) -> Result<()> {
        *self
            .handler
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }

    fn foreground_input_thread(&self) -> Option<u32> {
        self.foreground
    }

    fn current_thread_id(&self) -> u32 {
        THREAD_ID.with(|id| {
            if id.get() == 0 {
                id.set(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed));
            }
            id.get()
        })
    }

    fn attach_input(&self, thread: u32, target: u32, attach: bool) -> Result<()> {
        let mut desktop = self.desktop();
        if attach {
            desktop.attached = Some((thread, target));
            return Ok(());
        }
        // Detaching a pair that was never attached fails, as it does natively.
        if desktop.attached != Some((thread, target)) {
            return Err(TypeswapError::InputInjection(format!(
                "thread {} is not attached to thread {}",
                thread, target
            )));
        }
        desktop.attached = None;
        Ok(())
    }
}
