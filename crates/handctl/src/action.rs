//! Input actions and the gesture-to-action mapping.

use std::{fmt, str::FromStr};

use crate::gesture::{Gesture, GestureKey};
use crate::hand::Handedness;
use crate::settings::{Assignment, Settings};

/// A key or mouse button that can be pressed and released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Key(KeyCode),
    Mouse(MouseButton),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

/// A keyboard key.
///
/// Named keys use the `Key.<name>` notation in settings files, every other key is given as the
/// single character it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Space,
    Enter,
    Esc,
    Tab,
    Backspace,
    Delete,
    Shift,
    Ctrl,
    Alt,
    Cmd,
    CapsLock,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

const NAMED_KEYS: &[(&str, KeyCode)] = &[
    ("space", KeyCode::Space),
    ("enter", KeyCode::Enter),
    ("esc", KeyCode::Esc),
    ("tab", KeyCode::Tab),
    ("backspace", KeyCode::Backspace),
    ("delete", KeyCode::Delete),
    ("shift", KeyCode::Shift),
    ("ctrl", KeyCode::Ctrl),
    ("alt", KeyCode::Alt),
    ("cmd", KeyCode::Cmd),
    ("caps_lock", KeyCode::CapsLock),
    ("up", KeyCode::Up),
    ("down", KeyCode::Down),
    ("left", KeyCode::Left),
    ("right", KeyCode::Right),
    ("home", KeyCode::Home),
    ("end", KeyCode::End),
    ("page_up", KeyCode::PageUp),
    ("page_down", KeyCode::PageDown),
];

impl KeyCode {
    fn from_name(name: &str) -> Option<Self> {
        if let Some(n) = name.strip_prefix('f').and_then(|n| n.parse::<u8>().ok()) {
            return (1..=12).contains(&n).then_some(KeyCode::F(n));
        }
        NAMED_KEYS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, key)| *key)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyCode::Char(c) => write!(f, "{c}"),
            KeyCode::F(n) => write!(f, "Key.f{n}"),
            key => match NAMED_KEYS.iter().find(|(_, k)| k == key) {
                Some((name, _)) => write!(f, "Key.{name}"),
                None => write!(f, "{key:?}"),
            },
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Key(key) => fmt::Display::fmt(key, f),
            Action::Mouse(MouseButton::Left) => f.write_str("mouse_left"),
            Action::Mouse(MouseButton::Right) => f.write_str("mouse_right"),
            Action::Mouse(MouseButton::Middle) => f.write_str("mouse_middle"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid action `{0}` (expected a single character, `Key.<name>`, `mouse_left`, `mouse_right`, `mouse_middle` or `none`)")]
pub struct InvalidAction(pub String);

/// Parses an action string.
///
/// Returns `Ok(None)` for the special action `none` (and the empty string), which disables a
/// gesture.
pub fn parse_action(s: &str) -> Result<Option<Action>, InvalidAction> {
    let err = || InvalidAction(s.to_string());
    match s {
        "" | "none" => return Ok(None),
        "mouse_left" => return Ok(Some(Action::Mouse(MouseButton::Left))),
        "mouse_right" => return Ok(Some(Action::Mouse(MouseButton::Right))),
        "mouse_middle" => return Ok(Some(Action::Mouse(MouseButton::Middle))),
        _ => {}
    }

    if let Some(name) = s.strip_prefix("Key.") {
        return KeyCode::from_name(name)
            .map(|key| Some(Action::Key(key)))
            .ok_or_else(err);
    }

    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_control() => Ok(Some(Action::Key(KeyCode::Char(c)))),
        _ => Err(err()),
    }
}

impl FromStr for Action {
    type Err = InvalidAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_action(s)?.ok_or_else(|| InvalidAction(s.to_string()))
    }
}

/// Returns the assignment key a physical hand's gesture maps to.
///
/// With `mirror_controls` enabled, the left hand triggers the right hand's assignments and vice
/// versa.
pub fn control_key(settings: &Settings, hand: Handedness, gesture: Gesture) -> GestureKey {
    let hand = if settings.mirror_controls {
        hand.opposite()
    } else {
        hand
    };
    GestureKey::new(hand, gesture)
}

/// Looks up the assignment for a gesture performed with a physical hand.
pub fn lookup(settings: &Settings, hand: Handedness, gesture: Gesture) -> Option<&Assignment> {
    settings
        .assignments
        .get(control_key(settings, hand, gesture))
}
