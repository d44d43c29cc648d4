use std::{
    fs::File,
    io::BufReader,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use crate::hand::Frame;

use super::{CaptureError, LandmarkSource, LineReader};

/// Plays back a landmark recording.
///
/// Recordings use the same line format the live source emits, so capturing a session is just a
/// matter of redirecting the producer's output into a file.
pub struct ReplaySource {
    reader: LineReader<BufReader<File>>,
    frame_time: Option<Duration>,
    next_frame_at: Option<Instant>,
}

impl ReplaySource {
    /// Opens the recording at `path`.
    ///
    /// If `fps` is given, frames are delivered at that rate. Otherwise they are delivered as fast
    /// as they can be read.
    pub fn open(path: &Path, fps: Option<f32>) -> Result<Self, CaptureError> {
        let file = File::open(path).map_err(|source| CaptureError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let frame_time = fps.and_then(frame_interval);

        log::info!("replaying landmarks from {}", path.display());
        Ok(Self {
            reader: LineReader::new(BufReader::new(file)),
            frame_time,
            next_frame_at: None,
        })
    }

    fn pace(&mut self) {
        let Some(frame_time) = self.frame_time else {
            return;
        };
        let now = Instant::now();
        match self.next_frame_at {
            Some(at) if at > now => {
                thread::sleep(at - now);
                self.next_frame_at = Some(at + frame_time);
            }
            // First frame, or we fell behind: restart the schedule from now.
            _ => self.next_frame_at = Some(now + frame_time),
        }
    }
}

/// Returns the time between two frames at `fps`, or `None` if that is not a usable rate.
fn frame_interval(fps: f32) -> Option<Duration> {
    let time = (fps.is_finite() && fps > 0.0)
        .then(|| Duration::try_from_secs_f32(1.0 / fps).ok())
        .flatten();
    if time.is_none() {
        log::warn!("ignoring invalid replay frame rate {fps}, replaying as fast as possible");
    }
    time
}

impl LandmarkSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let frame = self.reader.next_frame()?;
        self.pace();
        Ok(frame)
    }
}
