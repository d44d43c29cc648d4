//! Settings file model.
//!
//! Settings are stored as JSON. Every field is optional, missing fields take their default
//! values, so a file only needs to contain what it changes:
//!
//! ```json
//! {
//!     "mirror_controls": true,
//!     "thresholds": { "pinch_dist": 0.04 },
//!     "assignments": {
//!         "left_pinch": "w",
//!         "right_two": { "action": "mouse_left", "mode": "repeat", "repeat_hz": 5, "tap_ms": 40 }
//!     }
//! }
//! ```
//!
//! A bare action string is shorthand for a [`Mode::Hold`] assignment.

pub mod watch;

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::action::{parse_action, Action, InvalidAction, KeyCode, MouseButton};
use crate::gesture::{Gesture, GestureKey, UnknownGestureKey};
use crate::hand::Handedness;

/// Default file name of the settings file.
pub const DEFAULT_PATH: &str = "settings.json";

const DEFAULT_REPEAT_HZ: f32 = 8.0;
const DEFAULT_TAP_MS: u32 = 40;

/// Repeat frequencies below this are raised to it.
const MIN_REPEAT_HZ: f32 = 1.0;

/// Error produced when loading or validating a settings file.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to access settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    UnknownGesture(#[from] UnknownGestureKey),
    #[error("assignment `{key}`: {source}")]
    InvalidAction {
        key: GestureKey,
        #[source]
        source: InvalidAction,
    },
    #[error("`{field}` must be a positive, finite number (got {value})")]
    InvalidValue { field: String, value: f32 },
}

/// The complete application configuration.
///
/// A [`Settings`] value is never mutated while it is in use. Reloading produces a new value that
/// replaces the old one (see [`watch::SettingsStore`]).
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Mirror the camera view, as if looking into a mirror.
    pub mirror_view: bool,
    /// Swap the left and right hand assignments.
    pub mirror_controls: bool,
    /// Report landmark and gesture details for every frame.
    pub debug_draw: bool,
    pub thresholds: Thresholds,
    pub assignments: Assignments,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mirror_view: true,
            mirror_controls: false,
            debug_draw: true,
            thresholds: Thresholds::default(),
            assignments: Assignments::default(),
        }
    }
}

/// Gesture classification thresholds, in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Thumb and index fingertips closer than this form a pinch.
    pub pinch_dist: f32,
    /// Minimum horizontal distance between index and middle fingertips for a two-finger split.
    pub two_split_min: f32,
    /// Hands detected with a lower score than this are ignored.
    pub min_confidence: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pinch_dist: 0.05,
            two_split_min: 0.02,
            min_confidence: 0.5,
        }
    }
}

impl Thresholds {
    fn validate(&self) -> Result<(), SettingsError> {
        for (field, value) in [
            ("thresholds.pinch_dist", self.pinch_dist),
            ("thresholds.two_split_min", self.two_split_min),
        ] {
            check_positive(field, value)?;
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(SettingsError::InvalidValue {
                field: "thresholds.min_confidence".into(),
                value: self.min_confidence,
            });
        }
        Ok(())
    }
}

/// How an assigned action is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Press when the gesture starts, release when it ends.
    #[default]
    Hold,
    /// Tap repeatedly while the gesture is held.
    Repeat,
}

/// The action assigned to a gesture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    pub action: Action,
    pub mode: Mode,
    /// Taps per second in [`Mode::Repeat`].
    pub repeat_hz: f32,
    /// How long each tap holds the input down in [`Mode::Repeat`].
    pub tap_ms: u32,
}

impl Assignment {
    pub fn new(action: Action, mode: Mode) -> Self {
        Self {
            action,
            mode,
            repeat_hz: DEFAULT_REPEAT_HZ,
            tap_ms: DEFAULT_TAP_MS,
        }
    }

    pub fn repeat(action: Action, repeat_hz: f32, tap_ms: u32) -> Self {
        Self {
            action,
            mode: Mode::Repeat,
            repeat_hz,
            tap_ms,
        }
    }

    /// Time between the starts of two taps.
    pub fn period(&self) -> Duration {
        Duration::from_secs_f32(1.0 / self.repeat_hz.max(MIN_REPEAT_HZ))
    }

    /// Time a tap holds the input down.
    pub fn tap(&self) -> Duration {
        Duration::from_millis(self.tap_ms.into())
    }
}

/// Table of gesture assignments.
///
/// Gestures without an entry do nothing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignments {
    map: BTreeMap<GestureKey, Assignment>,
}

impl Assignments {
    pub fn get(&self, key: GestureKey) -> Option<&Assignment> {
        self.map.get(&key)
    }

    pub fn insert(&mut self, key: GestureKey, assignment: Assignment) -> Option<Assignment> {
        self.map.insert(key, assignment)
    }

    pub fn remove(&mut self, key: GestureKey) -> Option<Assignment> {
        self.map.remove(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (GestureKey, &Assignment)> + '_ {
        self.map.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Settings {
    /// Returns the default settings with the starter assignments written by `handctl init`.
    pub fn with_default_assignments() -> Self {
        let mut settings = Settings::default();
        let key = |c| Action::Key(KeyCode::Char(c));
        for (hand, gesture, action) in [
            (Handedness::Left, Gesture::Pinch, key('w')),
            (Handedness::Right, Gesture::Pinch, key('s')),
            (Handedness::Left, Gesture::Fist, key('d')),
            (Handedness::Right, Gesture::Fist, key('a')),
        ] {
            settings
                .assignments
                .insert(GestureKey::new(hand, gesture), Assignment::new(action, Mode::Hold));
        }
        settings.assignments.insert(
            GestureKey::new(Handedness::Right, Gesture::TwoSplit),
            Assignment::repeat(Action::Mouse(MouseButton::Left), 5.0, DEFAULT_TAP_MS),
        );
        settings
    }

    /// Parses and validates settings from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let raw: RawSettings = serde_json::from_str(json)?;
        raw.try_into()
    }

    /// Serializes the settings to pretty-printed JSON.
    pub fn to_json(&self) -> String {
        // Serializing plain maps, strings and numbers cannot fail.
        serde_json::to_string_pretty(&RawSettings::from(self)).unwrap_or_default()
    }

    /// Loads settings from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Loads settings from a file, falling back to the defaults if that fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => {
                log::info!("loaded settings from {}", path.display());
                settings
            }
            Err(SettingsError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                log::info!("{} does not exist, using default settings", path.display());
                Settings::default()
            }
            Err(e) => {
                log::warn!("{e}; using default settings");
                Settings::default()
            }
        }
    }

    /// Writes the settings to a file, replacing its contents.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let mut json = self.to_json();
        json.push('\n');
        fs::write(path, json).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn check_positive(field: &str, value: f32) -> Result<(), SettingsError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue {
            field: field.into(),
            value,
        })
    }
}

/// On-disk representation of [`Settings`].
#[derive(Serialize, Deserialize)]
#[serde(default)]
struct RawSettings {
    mirror_view: bool,
    mirror_controls: bool,
    debug_draw: bool,
    thresholds: Thresholds,
    assignments: BTreeMap<String, RawAssignment>,
}

impl Default for RawSettings {
    fn default() -> Self {
        let defaults = Settings::default();
        Self {
            mirror_view: defaults.mirror_view,
            mirror_controls: defaults.mirror_controls,
            debug_draw: defaults.debug_draw,
            thresholds: defaults.thresholds,
            assignments: BTreeMap::new(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawAssignment {
    Action(String),
    Full {
        action: String,
        #[serde(default)]
        mode: Mode,
        #[serde(default = "default_repeat_hz")]
        repeat_hz: f32,
        #[serde(default = "default_tap_ms")]
        tap_ms: u32,
    },
}

fn default_repeat_hz() -> f32 {
    DEFAULT_REPEAT_HZ
}

fn default_tap_ms() -> u32 {
    DEFAULT_TAP_MS
}

impl TryFrom<RawSettings> for Settings {
    type Error = SettingsError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        raw.thresholds.validate()?;

        let mut assignments = Assignments::default();
        for (key, entry) in raw.assignments {
            let key: GestureKey = key.parse()?;
            let (action, mode, repeat_hz, tap_ms) = match entry {
                RawAssignment::Action(action) => {
                    (action, Mode::Hold, DEFAULT_REPEAT_HZ, DEFAULT_TAP_MS)
                }
                RawAssignment::Full {
                    action,
                    mode,
                    repeat_hz,
                    tap_ms,
                } => (action, mode, repeat_hz, tap_ms),
            };
            check_positive(&format!("assignments.{key}.repeat_hz"), repeat_hz)?;
            let action = parse_action(&action)
                .map_err(|source| SettingsError::InvalidAction { key, source })?;

            match action {
                Some(action) => {
                    if assignments
                        .insert(
                            key,
                            Assignment {
                                action,
                                mode,
                                repeat_hz,
                                tap_ms,
                            },
                        )
                        .is_some()
                    {
                        // `left_two` and `left_two_split` name the same gesture.
                        log::warn!("gesture `{key}` is assigned more than once, using the last entry");
                    }
                }
                None => {
                    assignments.remove(key);
                }
            }
        }

        Ok(Settings {
            mirror_view: raw.mirror_view,
            mirror_controls: raw.mirror_controls,
            debug_draw: raw.debug_draw,
            thresholds: raw.thresholds,
            assignments,
        })
    }
}

impl From<&Settings> for RawSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            mirror_view: settings.mirror_view,
            mirror_controls: settings.mirror_controls,
            debug_draw: settings.debug_draw,
            thresholds: settings.thresholds,
            assignments: settings
                .assignments
                .iter()
                .map(|(key, a)| {
                    (
                        key.to_string(),
                        RawAssignment::Full {
                            action: a.action.to_string(),
                            mode: a.mode,
                            repeat_hz: a.repeat_hz,
                            tap_ms: a.tap_ms,
                        },
                    )
                })
                .collect(),
        }
    }
}
