use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::keyboard::{KeyStroke, VirtualKey};
use crate::platform::Platform;

/// Synthesizes the backspaces and paste chord that replace a typed word.
pub struct InputInjector {
    platform: Arc<dyn Platform>,
    backspace_delay: Duration,
    paste_delay: Duration,
}

impl InputInjector {
    pub fn new(platform: Arc<dyn Platform>, backspace_delay: Duration, paste_delay: Duration) -> Self {
        Self {
            platform,
            backspace_delay,
            paste_delay,
        }
    }

    pub fn from_config(platform: Arc<dyn Platform>, config: &Config) -> Self {
        Self::new(platform, config.backspace_delay(), config.paste_delay())
    }

    /// Send `count` backspace press/release pairs, pausing after each.
    pub fn erase(&self, count: usize) -> Result<()> {
        debug!(count, "Erasing typed text");
        for _ in 0..count {
            self.platform.send_key_events(&[
                KeyStroke::press(VirtualKey::Backspace),
                KeyStroke::release(VirtualKey::Backspace),
            ])?;
            if !self.backspace_delay.is_zero() {
                thread::sleep(self.backspace_delay);
            }
        }
        Ok(())
    }

    /// Press the paste chord, with a settle pause on both sides.
    pub fn paste(&self) -> Result<()> {
        thread::sleep(self.paste_delay);
        self.platform.send_key_events(&[
            KeyStroke::press(VirtualKey::Control),
            KeyStroke::press(VirtualKey::V),
            KeyStroke::release(VirtualKey::V),
            KeyStroke::release(VirtualKey::Control),
        ])?;
        thread::sleep(self.paste_delay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MockPlatform;

    fn injector(mock: &Arc<MockPlatform>) -> InputInjector {
        InputInjector::new(
            Arc::clone(mock) as Arc<dyn Platform>,
            Duration::ZERO,
            Duration::ZERO,
        )
    }

    #[test]
    fn erase_sends_press_release_pairs() {
        let mock = Arc::new(MockPlatform::new());
        mock.type_text("sig ");
        injector(&mock).erase(4).unwrap();

        let strokes = mock.strokes();
        assert_eq!(strokes.len(), 8);
        assert!(strokes.chunks(2).all(|pair| pair
            == [
                KeyStroke::press(VirtualKey::Backspace),
                KeyStroke::release(VirtualKey::Backspace)
            ]));
        assert_eq!(mock.document(), "");
    }

    #[test]
    fn paste_chord_order() {
        let mock = Arc::new(MockPlatform::with_clipboard("Best regards"));
        injector(&mock).paste().unwrap();
        assert_eq!(
            mock.strokes(),
            vec![
                KeyStroke::press(VirtualKey::Control),
                KeyStroke::press(VirtualKey::V),
                KeyStroke::release(VirtualKey::V),
                KeyStroke::release(VirtualKey::Control),
            ]
        );
        assert_eq!(mock.document(), "Best regards");
    }

    #[test]
    fn injection_failure_propagates() {
        let mock = Arc::new(MockPlatform::new());
        mock.fail_injections(1);
        assert!(injector(&mock).erase(2).is_err());
    }
}
