//! Per-frame hand observations.

pub mod landmark;

use std::fmt;

use serde::Deserialize;

use self::landmark::HandLandmarks;

/// Which hand a set of landmarks belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
pub enum Handedness {
    #[serde(alias = "left")]
    Left,
    #[serde(alias = "right")]
    Right,
}

impl Handedness {
    pub const ALL: [Handedness; 2] = [Handedness::Left, Handedness::Right];

    /// Returns the other hand.
    pub fn opposite(self) -> Self {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }

    /// Returns the prefix used for this hand in gesture keys (`left`, `right`).
    pub fn as_str(self) -> &'static str {
        match self {
            Handedness::Left => "left",
            Handedness::Right => "right",
        }
    }
}

impl fmt::Display for Handedness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        })
    }
}

/// A single detected hand.
#[derive(Debug, Clone)]
pub struct HandObservation {
    pub handedness: Handedness,
    /// Detection confidence in range `0.0..=1.0`.
    pub score: f32,
    pub landmarks: HandLandmarks,
}

impl HandObservation {
    /// Mirrors the observation horizontally.
    ///
    /// Flipping the camera image before running the landmark network flips both the landmark
    /// X coordinates and the handedness the network reports, so both are flipped here.
    pub fn mirror(&mut self) {
        self.handedness = self.handedness.opposite();
        self.landmarks.flip_horizontal_in_place();
    }
}

/// All hands observed in one camera frame.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub hands: Vec<HandObservation>,
}

impl Frame {
    pub fn new(hands: Vec<HandObservation>) -> Self {
        Self { hands }
    }

    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    /// Returns the most confident observation labeled `handedness`, if any.
    pub fn hand(&self, handedness: Handedness) -> Option<&HandObservation> {
        self.hands
            .iter()
            .filter(|hand| hand.handedness == handedness)
            .max_by(|a, b| a.score.total_cmp(&b.score))
    }

    pub fn mirror(&mut self) {
        self.hands.iter_mut().for_each(HandObservation::mirror);
    }
}

#[cfg(test)]
mod tests {
    use super::landmark::NUM_LANDMARKS;
    use super::*;

    fn hand(handedness: Handedness, score: f32) -> HandObservation {
        HandObservation {
            handedness,
            score,
            landmarks: HandLandmarks::new(vec![[0.1, 0.2, 0.0]; NUM_LANDMARKS]),
        }
    }

    #[test]
    fn picks_most_confident_duplicate() {
        let frame = Frame::new(vec![
            hand(Handedness::Left, 0.6),
            hand(Handedness::Left, 0.9),
            hand(Handedness::Right, 0.3),
        ]);
        assert_eq!(frame.hand(Handedness::Left).unwrap().score, 0.9);
        assert_eq!(frame.hand(Handedness::Right).unwrap().score, 0.3);
    }

    #[test]
    fn mirror_swaps_handedness() {
        let mut frame = Frame::new(vec![hand(Handedness::Left, 0.8)]);
        frame.mirror();
        assert!(frame.hand(Handedness::Left).is_none());
        let right = frame.hand(Handedness::Right).unwrap();
        approx::assert_relative_eq!(right.landmarks.positions()[0][0], 0.9);
    }
}
