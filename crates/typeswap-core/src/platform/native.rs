use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use arboard::Clipboard;
use crossbeam_channel::RecvTimeoutError;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use tracing::{debug, error, trace};

use super::{KeyHandler, Platform};
use crate::error::{Result, TypeswapError};
use crate::keyboard::{classify_event, KeyDirection, KeyStroke, VirtualKey};

/// How long a fresh listener gets to fail before the hook counts as acquired.
const HOOK_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

type HandlerSlot = Arc<Mutex<Option<KeyHandler>>>;

fn lock_slot(slot: &HandlerSlot) -> MutexGuard<'_, Option<KeyHandler>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The real desktop backend.
///
/// `rdev::listen` cannot be cancelled, so the listener thread is started once
/// and lives for the rest of the process; hooking and unhooking swap the
/// handler it forwards to.
pub struct NativePlatform {
    clipboard: Mutex<Option<Clipboard>>,
    handler: HandlerSlot,
    listening: Arc<AtomicBool>,
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl NativePlatform {
    pub fn new() -> Self {
        Self {
            clipboard: Mutex::new(None),
            handler: Arc::new(Mutex::new(None)),
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `f` against a lazily created clipboard handle. The handle is
    /// dropped after a failure so the next call starts from a fresh one.
    fn with_clipboard<T>(
        &self,
        f: impl FnOnce(&mut Clipboard) -> std::result::Result<T, arboard::Error>,
    ) -> Result<T> {
        let mut guard = self
            .clipboard
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if guard.is_none() {
            let clipboard = Clipboard::new().map_err(|e| TypeswapError::Clipboard(e.to_string()))?;
            *guard = Some(clipboard);
        }

        let clipboard = guard
            .as_mut()
            .ok_or_else(|| TypeswapError::Clipboard("clipboard unavailable".to_string()))?;
        match f(clipboard) {
            Ok(value) => Ok(value),
            Err(arboard::Error::ContentNotAvailable) => {
                Err(TypeswapError::NotFound("clipboard text".to_string()))
            }
            Err(err) => {
                *guard = None;
                Err(TypeswapError::Clipboard(err.to_string()))
            }
        }
    }

    fn start_listener(&self) -> Result<()> {
        if self.listening.load(Ordering::SeqCst) {
            return Ok(());
        }

        let slot = Arc::clone(&self.handler);
        let listening = Arc::clone(&self.listening);
        let (err_tx, err_rx) = crossbeam_channel::bounded::<String>(1);

        listening.store(true, Ordering::SeqCst);
        let spawned = thread::Builder::new()
            .name("typeswap-hook".to_string())
            .spawn(move || {
                let callback = move |event: rdev::Event| {
                    let Some(input) = classify_event(&event) else {
                        return;
                    };
                    let handler = lock_slot(&slot).clone();
                    if let Some(handler) = handler {
                        handler(input);
                    }
                };

                if let Err(e) = rdev::listen(callback) {
                    error!("Keyboard listener failed: {:?}", e);
                    let _ = err_tx.send(format!("{:?}", e));
                }
                listening.store(false, Ordering::SeqCst);
            });

        if let Err(e) = spawned {
            self.listening.store(false, Ordering::SeqCst);
            return Err(TypeswapError::Hook(e.to_string()));
        }

        match err_rx.recv_timeout(HOOK_PROBE_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                debug!("Keyboard listener running");
                Ok(())
            }
            Ok(reason) => Err(TypeswapError::Hook(reason)),
            Err(RecvTimeoutError::Disconnected) => Err(TypeswapError::Hook(
                "keyboard listener exited immediately".to_string(),
            )),
        }
    }
}

/// Create a keyboard controller
fn create_keyboard_controller() -> Result<Enigo> {
    Enigo::new(&Settings::default()).map_err(|err| {
        TypeswapError::InputInjection(format!("Failed to create keyboard controller: {}", err))
    })
}

fn enigo_key(key: VirtualKey) -> Key {
    match key {
        VirtualKey::Backspace => Key::Backspace,
        #[cfg(target_os = "macos")]
        VirtualKey::Control => Key::Meta,
        #[cfg(not(target_os = "macos"))]
        VirtualKey::Control => Key::Control,
        VirtualKey::V => Key::Unicode('v'),
    }
}

fn enigo_direction(direction: KeyDirection) -> Direction {
    match direction {
        KeyDirection::Press => Direction::Press,
        KeyDirection::Release => Direction::Release,
    }
}

impl Platform for NativePlatform {
    fn read_clipboard(&self) -> Result<Option<String>> {
        match self.with_clipboard(|cb| cb.get_text()) {
            Ok(text) => Ok(Some(text)),
            Err(TypeswapError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn write_clipboard(&self, text: &str) -> Result<()> {
        self.with_clipboard(|cb| cb.set_text(text))
    }

    fn clear_clipboard(&self) -> Result<()> {
        self.with_clipboard(|cb| cb.clear())
    }

    fn send_key_events(&self, strokes: &[KeyStroke]) -> Result<()> {
        let mut keyboard = create_keyboard_controller()?;
        for stroke in strokes {
            trace!(?stroke, "Injecting key");
            keyboard
                .key(enigo_key(stroke.key), enigo_direction(stroke.direction))
                .map_err(|err| {
                    TypeswapError::InputInjection(format!("Failed to send {:?}: {}", stroke, err))
                })?;
        }
        Ok(())
    }

    fn hook_keyboard(&self, handler: KeyHandler) -> Result<()> {
        *lock_slot(&self.handler) = Some(handler);
        if let Err(err) = self.start_listener() {
            *lock_slot(&self.handler) = None;
            return Err(err);
        }
        Ok(())
    }

    fn unhook_keyboard(&self) -> Result<()> {
        *lock_slot(&self.handler) = None;
        Ok(())
    }

    #[cfg(windows)]
    fn foreground_input_thread(&self) -> Option<u32> {
        use windows_sys::Win32::UI::WindowsAndMessaging::{
            GetForegroundWindow, GetWindowThreadProcessId,
        };

        // SAFETY: plain Win32 queries without pointer arguments we own.
        unsafe {
            let window = GetForegroundWindow();
            if window.is_null() {
                return None;
            }
            let thread = GetWindowThreadProcessId(window, std::ptr::null_mut());
            (thread != 0).then_some(thread)
        }
    }

    #[cfg(not(windows))]
    fn foreground_input_thread(&self) -> Option<u32> {
        None
    }

    #[cfg(windows)]
    fn current_thread_id(&self) -> u32 {
        // SAFETY: no arguments, always succeeds.
        unsafe { windows_sys::Win32::System::Threading::GetCurrentThreadId() }
    }

    #[cfg(not(windows))]
    fn current_thread_id(&self) -> u32 {
        0
    }

    #[cfg(windows)]
    fn attach_input(&self, thread: u32, target: u32, attach: bool) -> Result<()> {
        use windows_sys::Win32::System::Threading::AttachThreadInput;

        // SAFETY: AttachThreadInput only takes thread ids.
        let ok = unsafe { AttachThreadInput(thread, target, i32::from(attach)) };
        if ok == 0 {
            tracing::warn!(thread, target, attach, "AttachThreadInput failed");
            return Err(TypeswapError::InputInjection(format!(
                "failed to {} input queue of thread {} to thread {}",
                if attach { "attach" } else { "detach" },
                thread,
                target
            )));
        }
        Ok(())
    }

    #[cfg(not(windows))]
    fn attach_input(&self, thread: u32, target: u32, attach: bool) -> Result<()> {
        trace!(
            thread,
            target,
            attach,
            "Input queue association not needed on this platform"
        );
        Ok(())
    }
}
