//! Narrow interface over the native input and clipboard APIs.
//!
//! The pipeline only talks to the operating system through [`Platform`].
//! [`NativePlatform`] backs it with rdev, enigo and arboard; [`MockPlatform`]
//! simulates a focused text field for tests.

mod mock;
mod native;

pub use mock::MockPlatform;
pub use native::NativePlatform;

use std::sync::Arc;

use crate::error::Result;
use crate::keyboard::{KeyInput, KeyStroke};

/// Callback invoked on the hook's thread for every key-down.
pub type KeyHandler = Arc<dyn Fn(KeyInput) + Send + Sync>;

pub trait Platform: Send + Sync {
    /// Current clipboard text, or `None` when it holds no text.
    fn read_clipboard(&self) -> Result<Option<String>>;

    fn write_clipboard(&self, text: &str) -> Result<()>;

    fn clear_clipboard(&self) -> Result<()>;

    /// Inject the strokes in order.
    fn send_key_events(&self, strokes: &[KeyStroke]) -> Result<()>;

    /// Route global key-down events to `handler`, replacing any previous one.
    fn hook_keyboard(&self, handler: KeyHandler) -> Result<()>;

    fn unhook_keyboard(&self) -> Result<()>;

    /// Thread owning the foreground window's input queue, where the
    /// platform has such a thing.
    fn foreground_input_thread(&self) -> Option<u32>;

    /// Platform id of the calling thread, as used by [`Platform::attach_input`].
    fn current_thread_id(&self) -> u32;

    /// Associate (or dissociate) `thread`'s input queue with `target`'s.
    /// Both ids are explicit, so this may be called from any thread.
    fn attach_input(&self, thread: u32, target: u32, attach: bool) -> Result<()>;
}
