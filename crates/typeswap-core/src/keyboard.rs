use rdev::{self, EventType, Key as RdevKey};

/// A key-down event, reduced to what the dispatcher cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Space or Enter: ends the current word.
    Boundary(BoundaryKey),
    Backspace,
    /// A single printable character.
    Char(char),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKey {
    Space,
    Enter,
}

/// Keys the injector synthesizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualKey {
    Backspace,
    /// The paste modifier (Ctrl, or Cmd on macOS).
    Control,
    V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDirection {
    Press,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub key: VirtualKey,
    pub direction: KeyDirection,
}

impl KeyStroke {
    pub fn press(key: VirtualKey) -> Self {
        Self {
            key,
            direction: KeyDirection::Press,
        }
    }

    pub fn release(key: VirtualKey) -> Self {
        Self {
            key,
            direction: KeyDirection::Release,
        }
    }
}

/// The single character a key press produced, as reported by the event
/// name. Shifted symbols and layout-specific characters arrive this way too.
pub fn event_char(event: &rdev::Event) -> Option<char> {
    let name = event.name.as_deref()?;
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Classify a raw rdev event. Only key presses produce input; everything
/// else (releases, mouse) is `None`.
pub fn classify_event(event: &rdev::Event) -> Option<KeyInput> {
    let key = match event.event_type {
        EventType::KeyPress(key) => key,
        _ => return None,
    };

    let input = match key {
        RdevKey::Space => KeyInput::Boundary(BoundaryKey::Space),
        RdevKey::Return | RdevKey::KpReturn => KeyInput::Boundary(BoundaryKey::Enter),
        RdevKey::Backspace => KeyInput::Backspace,
        _ => match event_char(event) {
            Some(c) if !c.is_control() => KeyInput::Char(c),
            _ => KeyInput::Other,
        },
    };
    Some(input)
}
