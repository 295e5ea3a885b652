//! Keystroke-based text injection
//!
//! Synthesizes backspaces and per-character keystrokes through a uinput
//! virtual keyboard. Because uinput events enter at the kernel level, this
//! works identically on Wayland and X11.
//!
//! Characters are mapped through a US keyboard layout table. Anything outside
//! the table (non-US punctuation, emoji) is skipped with a one-time advisory;
//! the clipboard backend handles arbitrary text.

use super::{Edit, Injector};
use crate::error::InjectError;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key};

/// One synthesized keystroke: a key plus an optional shift chord
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Keypress {
    key: Key,
    shift: bool,
}

impl Keypress {
    const fn plain(key: Key) -> Self {
        Self { key, shift: false }
    }

    const fn shifted(key: Key) -> Self {
        Self { key, shift: true }
    }
}

/// Keystroke-based injection backend
pub struct KeystrokeInjector {
    device: VirtualDevice,
    /// Advisory about unmappable characters is logged once per process
    warned_unmappable: bool,
}

impl KeystrokeInjector {
    pub fn new() -> Result<Self, InjectError> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::KEY_LEFTSHIFT);
        keys.insert(Key::KEY_BACKSPACE);

        // Register every key the char table can produce
        for code in 0u32..=0x7f {
            if let Some(ch) = char::from_u32(code) {
                if let Some(kp) = char_to_keypress(ch) {
                    keys.insert(kp.key);
                }
            }
        }

        let device = VirtualDeviceBuilder::new()
            .map_err(|e| InjectError::Synthesis(format!("uinput: {}", e)))?
            .name("talki-keys")
            .with_keys(&keys)
            .map_err(|e| InjectError::Synthesis(format!("uinput: {}", e)))?
            .build()
            .map_err(|e| InjectError::Synthesis(format!("uinput: {}", e)))?;

        Ok(Self {
            device,
            warned_unmappable: false,
        })
    }

    /// Emit one full keystroke (shift chord included)
    fn tap(&mut self, kp: Keypress) -> Result<(), InjectError> {
        let mut events = Vec::with_capacity(4);
        if kp.shift {
            events.push(key_event(Key::KEY_LEFTSHIFT, 1));
        }
        events.push(key_event(kp.key, 1));
        events.push(key_event(kp.key, 0));
        if kp.shift {
            events.push(key_event(Key::KEY_LEFTSHIFT, 0));
        }
        self.device
            .emit(&events)
            .map_err(|e| InjectError::Synthesis(e.to_string()))?;
        Ok(())
    }

    fn type_char(&mut self, ch: char) -> Result<(), InjectError> {
        match char_to_keypress(ch) {
            Some(kp) => self.tap(kp),
            None => Err(InjectError::UnmappableCharacter(ch)),
        }
    }
}

#[async_trait::async_trait]
impl Injector for KeystrokeInjector {
    async fn apply(&mut self, edit: &Edit) -> Result<(), InjectError> {
        if edit.is_noop() {
            return Ok(());
        }

        for _ in 0..edit.delete {
            self.tap(Keypress::plain(Key::KEY_BACKSPACE))?;
        }

        for ch in edit.append.chars() {
            match self.type_char(ch) {
                Ok(()) => {}
                Err(InjectError::UnmappableCharacter(ch)) => {
                    // Skip just this character and keep typing the rest
                    if !self.warned_unmappable {
                        tracing::warn!(
                            "Skipping character {:?}: no US-layout keystroke for it. \
                             Consider inject mode \"clipboard\" for full Unicode support.",
                            ch
                        );
                        self.warned_unmappable = true;
                    } else {
                        tracing::debug!("Skipping unmappable character {:?}", ch);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "keystroke (uinput)"
    }
}

fn key_event(key: Key, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), value)
}

/// Map a character to a US-layout keystroke
fn char_to_keypress(ch: char) -> Option<Keypress> {
    if ch.is_ascii_lowercase() {
        return letter_key(ch).map(Keypress::plain);
    }
    if ch.is_ascii_uppercase() {
        return letter_key(ch.to_ascii_lowercase()).map(Keypress::shifted);
    }
    if ch.is_ascii_digit() {
        return digit_key(ch).map(Keypress::plain);
    }

    let kp = match ch {
        ' ' => Keypress::plain(Key::KEY_SPACE),
        '\n' => Keypress::plain(Key::KEY_ENTER),
        '\t' => Keypress::plain(Key::KEY_TAB),

        '-' => Keypress::plain(Key::KEY_MINUS),
        '_' => Keypress::shifted(Key::KEY_MINUS),
        '=' => Keypress::plain(Key::KEY_EQUAL),
        '+' => Keypress::shifted(Key::KEY_EQUAL),

        '[' => Keypress::plain(Key::KEY_LEFTBRACE),
        '{' => Keypress::shifted(Key::KEY_LEFTBRACE),
        ']' => Keypress::plain(Key::KEY_RIGHTBRACE),
        '}' => Keypress::shifted(Key::KEY_RIGHTBRACE),
        '\\' => Keypress::plain(Key::KEY_BACKSLASH),
        '|' => Keypress::shifted(Key::KEY_BACKSLASH),

        ';' => Keypress::plain(Key::KEY_SEMICOLON),
        ':' => Keypress::shifted(Key::KEY_SEMICOLON),
        '\'' => Keypress::plain(Key::KEY_APOSTROPHE),
        '"' => Keypress::shifted(Key::KEY_APOSTROPHE),
        '`' => Keypress::plain(Key::KEY_GRAVE),
        '~' => Keypress::shifted(Key::KEY_GRAVE),

        ',' => Keypress::plain(Key::KEY_COMMA),
        '<' => Keypress::shifted(Key::KEY_COMMA),
        '.' => Keypress::plain(Key::KEY_DOT),
        '>' => Keypress::shifted(Key::KEY_DOT),
        '/' => Keypress::plain(Key::KEY_SLASH),
        '?' => Keypress::shifted(Key::KEY_SLASH),

        '!' => Keypress::shifted(Key::KEY_1),
        '@' => Keypress::shifted(Key::KEY_2),
        '#' => Keypress::shifted(Key::KEY_3),
        '$' => Keypress::shifted(Key::KEY_4),
        '%' => Keypress::shifted(Key::KEY_5),
        '^' => Keypress::shifted(Key::KEY_6),
        '&' => Keypress::shifted(Key::KEY_7),
        '*' => Keypress::shifted(Key::KEY_8),
        '(' => Keypress::shifted(Key::KEY_9),
        ')' => Keypress::shifted(Key::KEY_0),

        _ => return None,
    };

    Some(kp)
}

fn letter_key(ch: char) -> Option<Key> {
    let key = match ch {
        'a' => Key::KEY_A,
        'b' => Key::KEY_B,
        'c' => Key::KEY_C,
        'd' => Key::KEY_D,
        'e' => Key::KEY_E,
        'f' => Key::KEY_F,
        'g' => Key::KEY_G,
        'h' => Key::KEY_H,
        'i' => Key::KEY_I,
        'j' => Key::KEY_J,
        'k' => Key::KEY_K,
        'l' => Key::KEY_L,
        'm' => Key::KEY_M,
        'n' => Key::KEY_N,
        'o' => Key::KEY_O,
        'p' => Key::KEY_P,
        'q' => Key::KEY_Q,
        'r' => Key::KEY_R,
        's' => Key::KEY_S,
        't' => Key::KEY_T,
        'u' => Key::KEY_U,
        'v' => Key::KEY_V,
        'w' => Key::KEY_W,
        'x' => Key::KEY_X,
        'y' => Key::KEY_Y,
        'z' => Key::KEY_Z,
        _ => return None,
    };
    Some(key)
}

fn digit_key(ch: char) -> Option<Key> {
    let key = match ch {
        '0' => Key::KEY_0,
        '1' => Key::KEY_1,
        '2' => Key::KEY_2,
        '3' => Key::KEY_3,
        '4' => Key::KEY_4,
        '5' => Key::KEY_5,
        '6' => Key::KEY_6,
        '7' => Key::KEY_7,
        '8' => Key::KEY_8,
        '9' => Key::KEY_9,
        _ => return None,
    };
    Some(key)
}
