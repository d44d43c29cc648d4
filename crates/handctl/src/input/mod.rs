//! Synthetic keyboard and mouse input.

mod os;

use std::{
    fmt,
    sync::{Arc, Mutex},
    time::Instant,
};

use crate::action::Action;

pub use self::os::EnigoSink;

/// Error returned when the operating system rejects a synthetic input event.
#[derive(Debug, thiserror::Error)]
#[error("failed to {direction} `{action}`: {message}")]
pub struct InputError {
    pub action: Action,
    pub direction: Direction,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Press,
    Release,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Press => "press",
            Direction::Release => "release",
        })
    }
}

/// A destination for synthetic input events.
pub trait InputSink {
    /// Presses or releases the key or mouse button designated by `action`.
    fn send(&mut self, action: Action, direction: Direction) -> Result<(), InputError>;
}

impl<S: InputSink + ?Sized> InputSink for Box<S> {
    fn send(&mut self, action: Action, direction: Direction) -> Result<(), InputError> {
        (**self).send(action, direction)
    }
}

/// An [`InputSink`] that only logs the events it receives.
///
/// Used for dry runs.
#[derive(Debug, Default)]
pub struct LogSink;

impl InputSink for LogSink {
    fn send(&mut self, action: Action, direction: Direction) -> Result<(), InputError> {
        log::info!("{direction} {action}");
        Ok(())
    }
}

/// A recorded input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub action: Action,
    pub direction: Direction,
    pub at: Instant,
}

/// An [`InputSink`] that records every event it receives.
///
/// Clones share the same event log, so a clone can be handed to a dispatcher while the original
/// is used to inspect the events. Individual calls can be made to fail with
/// [`RecordingSink::fail_next`].
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

#[derive(Debug, Default)]
struct Recording {
    events: Vec<InputEvent>,
    failures: usize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` calls to [`InputSink::send`] fail without recording anything.
    pub fn fail_next(&self, count: usize) {
        self.lock().failures = count;
    }

    /// Returns all events recorded so far.
    pub fn events(&self) -> Vec<InputEvent> {
        self.lock().events.clone()
    }

    /// Returns the recorded events, dropping timestamps.
    pub fn sequence(&self) -> Vec<(Direction, Action)> {
        self.lock()
            .events
            .iter()
            .map(|ev| (ev.direction, ev.action))
            .collect()
    }

    pub fn clear(&self) {
        self.lock().events.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl InputSink for RecordingSink {
    fn send(&mut self, action: Action, direction: Direction) -> Result<(), InputError> {
        let mut rec = self.lock();
        if rec.failures > 0 {
            rec.failures -= 1;
            return Err(InputError {
                action,
                direction,
                message: "simulated failure".into(),
            });
        }
        rec.events.push(InputEvent {
            action,
            direction,
            at: Instant::now(),
        });
        Ok(())
    }
}
