//! Hand landmark sets.

use serde::Deserialize;

/// Number of landmarks in a complete hand landmark set.
pub const NUM_LANDMARKS: usize = 21;

type Position = [f32; 3];

/// Landmark positions of a single hand, in normalized image coordinates.
///
/// X and Y are in range `0.0..=1.0` relative to the image width and height, with Y pointing
/// *down* (like the image rows the landmark network was fed). Z is a relative depth and unused by
/// the gesture predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    positions: Box<[Position]>,
}

impl HandLandmarks {
    /// Creates a landmark set from raw positions.
    ///
    /// Any number of positions is accepted. Use [`HandLandmarks::is_complete`] to check whether
    /// the set is usable for gesture classification.
    pub fn new(positions: impl Into<Box<[Position]>>) -> Self {
        Self {
            positions: positions.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns whether all [`NUM_LANDMARKS`] landmarks are present and have finite coordinates.
    pub fn is_complete(&self) -> bool {
        self.positions.len() == NUM_LANDMARKS
            && self
                .positions
                .iter()
                .all(|p| p.iter().all(|c| c.is_finite()))
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    /// Returns a landmark's position, or `None` if the set does not contain it.
    pub fn get(&self, idx: LandmarkIdx) -> Option<Position> {
        self.positions.get(idx as usize).copied()
    }

    #[inline]
    pub fn x(&self, idx: LandmarkIdx) -> f32 {
        self.positions[idx as usize][0]
    }

    #[inline]
    pub fn y(&self, idx: LandmarkIdx) -> f32 {
        self.positions[idx as usize][1]
    }

    /// Returns the 2D distance between two landmarks, ignoring depth.
    pub fn distance_2d(&self, a: LandmarkIdx, b: LandmarkIdx) -> f32 {
        (self.x(a) - self.x(b)).hypot(self.y(a) - self.y(b))
    }

    /// Mirrors all landmarks horizontally, as if the camera image had been flipped.
    pub fn flip_horizontal_in_place(&mut self) {
        for pos in self.positions_mut() {
            pos[0] = 1.0 - pos[0];
        }
    }

    /// Computes the center of the palm by averaging the landmarks surrounding it.
    pub fn palm_center(&self) -> Position {
        let mut center = [0.0; 3];
        let mut count = 0;
        for pos in PALM_LANDMARKS.iter().filter_map(|lm| self.get(*lm)) {
            center[0] += pos[0];
            center[1] += pos[1];
            center[2] += pos[2];
            count += 1;
        }
        if count == 0 {
            return center;
        }
        center.map(|c| c / count as f32)
    }
}

/// Raw landmark as transmitted by landmark sources.
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct RawLandmark {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

impl FromIterator<RawLandmark> for HandLandmarks {
    fn from_iter<T: IntoIterator<Item = RawLandmark>>(iter: T) -> Self {
        Self::new(
            iter.into_iter()
                .map(|lm| [lm.x, lm.y, lm.z])
                .collect::<Vec<_>>(),
        )
    }
}

/// Names for the hand pose landmarks.
///
/// The numbering follows the MediaPipe hand landmark model.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

const PALM_LANDMARKS: &[LandmarkIdx] = {
    use LandmarkIdx::*;
    &[
        Wrist,
        ThumbCmc,
        IndexFingerMcp,
        MiddleFingerMcp,
        RingFingerMcp,
        PinkyMcp,
    ]
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness() {
        assert!(HandLandmarks::new(vec![[0.5; 3]; NUM_LANDMARKS]).is_complete());
        assert!(!HandLandmarks::new(vec![[0.5; 3]; 20]).is_complete());

        let mut positions = vec![[0.5; 3]; NUM_LANDMARKS];
        positions[7][1] = f32::NAN;
        assert!(!HandLandmarks::new(positions).is_complete());
    }

    #[test]
    fn flip() {
        let mut lms = HandLandmarks::new(vec![[0.25, 0.5, 0.0]; NUM_LANDMARKS]);
        lms.flip_horizontal_in_place();
        assert_eq!(lms.x(LandmarkIdx::Wrist), 0.75);
        assert_eq!(lms.y(LandmarkIdx::Wrist), 0.5);
    }

    #[test]
    fn palm_center_of_partial_set() {
        let lms = HandLandmarks::new(vec![[0.2, 0.4, 0.0], [0.4, 0.6, 0.0]]);
        let center = lms.palm_center();
        approx::assert_relative_eq!(center[0], 0.3);
        approx::assert_relative_eq!(center[1], 0.5);
    }
}
