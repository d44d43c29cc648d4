//! Landmark sources.
//!
//! Hand landmarks are computed by an external perception stack. This module reads its output,
//! one JSON document per camera frame and line:
//!
//! ```json
//! {"hands": [{"handedness": "Left", "score": 0.93, "landmarks": [{"x": 0.51, "y": 0.62, "z": -0.01}, ...]}]}
//! ```
//!
//! `landmarks` lists the 21 landmarks of the MediaPipe hand model in order. `score` defaults to
//! `1.0` and `z` to `0.0` if omitted. A document may carry an `"error"` string instead, which is
//! logged and yields an empty frame.

mod process;
mod replay;

use std::{
    io::{self, BufRead},
    path::PathBuf,
};

use serde::Deserialize;

use crate::hand::{
    landmark::{HandLandmarks, RawLandmark},
    Frame, HandObservation, Handedness,
};

pub use self::process::ProcessSource;
pub use self::replay::ReplaySource;

/// Error indicating that no (more) frames can be captured.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to start landmark source `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to open landmark recording {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read landmarks: {0}")]
    Read(#[from] io::Error),
    #[error("landmark stream ended")]
    Ended,
}

/// A stream of per-frame hand observations.
pub trait LandmarkSource {
    /// Blocks until the next frame is available and returns it.
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

impl<S: LandmarkSource + ?Sized> LandmarkSource for Box<S> {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        (**self).next_frame()
    }
}

#[derive(Deserialize)]
struct FrameJson {
    #[serde(default)]
    hands: Vec<HandJson>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct HandJson {
    handedness: Handedness,
    #[serde(default = "default_score")]
    score: f32,
    landmarks: Vec<RawLandmark>,
}

fn default_score() -> f32 {
    1.0
}

/// Parses one line of landmark output.
///
/// Returns `Ok(None)` for lines that do not contain a frame (blank lines and anything not
/// starting with `{`, like a `READY` banner printed by the producer).
pub fn parse_line(line: &str) -> Result<Option<Frame>, serde_json::Error> {
    let line = line.trim();
    if !line.starts_with('{') {
        if !line.is_empty() {
            log::debug!("ignoring landmark source output: {line}");
        }
        return Ok(None);
    }

    let json: FrameJson = serde_json::from_str(line)?;
    if let Some(error) = json.error {
        log::warn!("landmark source error: {error}");
    }
    let hands = json
        .hands
        .into_iter()
        .map(|hand| HandObservation {
            handedness: hand.handedness,
            score: hand.score,
            landmarks: hand.landmarks.into_iter().collect::<HandLandmarks>(),
        })
        .collect();
    Ok(Some(Frame::new(hands)))
}

/// Reads frames from a line-oriented reader.
struct LineReader<R> {
    reader: R,
    line: String,
    lineno: usize,
}

impl<R: BufRead> LineReader<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            lineno: 0,
        }
    }

    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Err(CaptureError::Ended);
            }
            self.lineno += 1;
            match parse_line(&self.line) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => log::warn!("skipping malformed landmark line {}: {e}", self.lineno),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frames() {
        let frame = parse_line(
            r#"{"hands": [{"handedness": "Right", "score": 0.8, "landmarks": [{"x": 0.1, "y": 0.2, "z": 0.3}, {"x": 0.4, "y": 0.5}]}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(frame.hands.len(), 1);
        let hand = &frame.hands[0];
        assert_eq!(hand.handedness, Handedness::Right);
        assert_eq!(hand.score, 0.8);
        assert_eq!(hand.landmarks.positions(), &[[0.1, 0.2, 0.3], [0.4, 0.5, 0.0]]);
    }

    #[test]
    fn non_frame_lines() {
        assert!(parse_line("READY\n").unwrap().is_none());
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line(r#"{"hands": [{"handedness": "Up"}]}"#).is_err());

        let frame = parse_line(r#"{"error": "camera busy"}"#).unwrap().unwrap();
        assert!(frame.is_empty());
    }

    #[test]
    fn line_reader_skips_garbage_and_ends() {
        let input = "READY\n{oops}\n{\"hands\": []}\n\n{\"hands\": [{\"handedness\": \"left\", \"landmarks\": []}]}\n";
        let mut reader = LineReader::new(input.as_bytes());
        assert!(reader.next_frame().unwrap().is_empty());
        let frame = reader.next_frame().unwrap();
        assert_eq!(frame.hands[0].handedness, Handedness::Left);
        assert_eq!(frame.hands[0].score, 1.0);
        assert!(matches!(reader.next_frame(), Err(CaptureError::Ended)));
    }
}
