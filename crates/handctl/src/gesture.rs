//! Geometric gesture classification.
//!
//! Gestures are recognized from a single frame's landmarks with a handful of distance and
//! ordering predicates. The classifier keeps no state between frames.

use std::{fmt, str::FromStr};

use crate::hand::{
    landmark::{HandLandmarks, LandmarkIdx},
    HandObservation, Handedness,
};
use crate::settings::Thresholds;

/// A fingertip counts as extended when it is this far above its PIP joint.
const EXTENSION_MARGIN: f32 = 0.01;

/// A classified hand pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Gesture {
    /// Thumb tip touching the index finger tip.
    Pinch,
    /// All four fingers folded.
    Fist,
    /// Index and middle finger extended and spread apart, the others folded (a "V").
    TwoSplit,
}

impl Gesture {
    pub const ALL: [Gesture; 3] = [Gesture::Pinch, Gesture::Fist, Gesture::TwoSplit];

    /// Returns the suffix used for this gesture in gesture keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Gesture::Pinch => "pinch",
            Gesture::Fist => "fist",
            Gesture::TwoSplit => "two",
        }
    }

    /// Returns the label shown in status lines.
    pub fn label(self) -> &'static str {
        match self {
            Gesture::Pinch => "Pinch",
            Gesture::Fist => "Fist",
            Gesture::TwoSplit => "Two",
        }
    }
}

/// Identifies a gesture performed with a specific hand, eg. `left_pinch`.
///
/// This is the key type of the assignment table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GestureKey {
    pub hand: Handedness,
    pub gesture: Gesture,
}

impl GestureKey {
    pub fn new(hand: Handedness, gesture: Gesture) -> Self {
        Self { hand, gesture }
    }

    /// Returns all valid gesture keys.
    pub fn all() -> impl Iterator<Item = GestureKey> {
        Handedness::ALL.into_iter().flat_map(|hand| {
            Gesture::ALL
                .into_iter()
                .map(move |gesture| GestureKey::new(hand, gesture))
        })
    }
}

impl fmt::Display for GestureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.hand.as_str(), self.gesture.as_str())
    }
}

/// Error returned when parsing a string that does not name a [`GestureKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown gesture key `{0}` (expected `left_` or `right_` followed by `pinch`, `fist` or `two`)")]
pub struct UnknownGestureKey(pub String);

impl FromStr for GestureKey {
    type Err = UnknownGestureKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || UnknownGestureKey(s.to_string());
        let (hand, gesture) = s.split_once('_').ok_or_else(err)?;
        let hand = match hand {
            "left" => Handedness::Left,
            "right" => Handedness::Right,
            _ => return Err(err()),
        };
        let gesture = match gesture {
            "pinch" => Gesture::Pinch,
            "fist" => Gesture::Fist,
            "two" | "two_split" => Gesture::TwoSplit,
            _ => return Err(err()),
        };
        Ok(GestureKey::new(hand, gesture))
    }
}

/// Classifies a hand observation.
///
/// Returns `None` if no gesture is recognized, or if the observation is unusable (incomplete
/// landmarks or a detection score below the configured minimum).
///
/// If several gestures match at once, pinch takes precedence over two-split, which takes
/// precedence over fist.
pub fn classify(hand: &HandObservation, thresholds: &Thresholds) -> Option<Gesture> {
    if hand.score < thresholds.min_confidence {
        return None;
    }
    classify_landmarks(&hand.landmarks, thresholds)
}

/// Classifies a landmark set without looking at the detection score.
pub fn classify_landmarks(lms: &HandLandmarks, thresholds: &Thresholds) -> Option<Gesture> {
    if !lms.is_complete() {
        return None;
    }

    if is_pinch(lms, thresholds.pinch_dist) {
        Some(Gesture::Pinch)
    } else if is_two_split(lms, thresholds.two_split_min) {
        Some(Gesture::TwoSplit)
    } else if is_fist(lms) {
        Some(Gesture::Fist)
    } else {
        None
    }
}

fn is_pinch(lms: &HandLandmarks, pinch_dist: f32) -> bool {
    lms.distance_2d(LandmarkIdx::ThumbTip, LandmarkIdx::IndexFingerTip) < pinch_dist
}

fn is_fist(lms: &HandLandmarks) -> bool {
    use LandmarkIdx::*;

    // Y points down, so a folded fingertip is *below* its knuckle.
    [
        (IndexFingerTip, IndexFingerMcp),
        (MiddleFingerTip, MiddleFingerMcp),
        (RingFingerTip, RingFingerMcp),
        (PinkyTip, PinkyMcp),
    ]
    .into_iter()
    .all(|(tip, mcp)| lms.y(tip) > lms.y(mcp))
}

fn is_two_split(lms: &HandLandmarks, split_min: f32) -> bool {
    use LandmarkIdx::*;

    let index = finger_extended(lms, IndexFingerTip, IndexFingerPip);
    let middle = finger_extended(lms, MiddleFingerTip, MiddleFingerPip);
    let ring = finger_extended(lms, RingFingerTip, RingFingerPip);
    let pinky = finger_extended(lms, PinkyTip, PinkyPip);
    let split = (lms.x(IndexFingerTip) - lms.x(MiddleFingerTip)).abs() > split_min;

    index && middle && !ring && !pinky && split
}

fn finger_extended(lms: &HandLandmarks, tip: LandmarkIdx, pip: LandmarkIdx) -> bool {
    lms.y(tip) + EXTENSION_MARGIN < lms.y(pip)
}
