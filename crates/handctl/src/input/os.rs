//! OS input injection through [`enigo`].

use enigo::{Button, Enigo, Key, Keyboard, Mouse, Settings};

use crate::action::{Action, KeyCode, MouseButton};

use super::{Direction, InputError, InputSink};

/// Injects input events into the operating system.
pub struct EnigoSink {
    enigo: Enigo,
}

impl EnigoSink {
    /// Connects to the platform's input injection facility.
    pub fn new() -> anyhow::Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow::anyhow!("failed to initialize input injection: {e:?}"))?;
        Ok(Self { enigo })
    }
}

impl InputSink for EnigoSink {
    fn send(&mut self, action: Action, direction: Direction) -> Result<(), InputError> {
        let dir = match direction {
            Direction::Press => enigo::Direction::Press,
            Direction::Release => enigo::Direction::Release,
        };
        let res = match action {
            Action::Key(key) => self.enigo.key(map_key(key), dir),
            Action::Mouse(button) => self.enigo.button(map_button(button), dir),
        };
        res.map_err(|e| InputError {
            action,
            direction,
            message: format!("{e:?}"),
        })
    }
}

fn map_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn map_key(key: KeyCode) -> Key {
    match key {
        KeyCode::Char(c) => Key::Unicode(c),
        KeyCode::Space => Key::Space,
        KeyCode::Enter => Key::Return,
        KeyCode::Esc => Key::Escape,
        KeyCode::Tab => Key::Tab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Shift => Key::Shift,
        KeyCode::Ctrl => Key::Control,
        KeyCode::Alt => Key::Alt,
        KeyCode::Cmd => Key::Meta,
        KeyCode::CapsLock => Key::CapsLock,
        KeyCode::Up => Key::UpArrow,
        KeyCode::Down => Key::DownArrow,
        KeyCode::Left => Key::LeftArrow,
        KeyCode::Right => Key::RightArrow,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::F(n) => match n {
            1 => Key::F1,
            2 => Key::F2,
            3 => Key::F3,
            4 => Key::F4,
            5 => Key::F5,
            6 => Key::F6,
            7 => Key::F7,
            8 => Key::F8,
            9 => Key::F9,
            10 => Key::F10,
            11 => Key::F11,
            _ => Key::F12,
        },
    }
}
