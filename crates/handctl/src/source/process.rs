use std::{
    io::BufReader,
    process::{Child, ChildStdout, Command, Stdio},
};

use crate::hand::Frame;

use super::{CaptureError, LandmarkSource, LineReader};

/// Reads landmarks from the standard output of a child process.
///
/// The process is typically a small script wrapping the camera and a hand landmark network. It
/// is killed when the [`ProcessSource`] is dropped.
pub struct ProcessSource {
    child: Child,
    reader: LineReader<BufReader<ChildStdout>>,
}

impl ProcessSource {
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, CaptureError> {
        let spawn_error = |source| CaptureError::Spawn {
            program: program.to_string(),
            source,
        };

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                child.kill().ok();
                return Err(spawn_error(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "child process has no stdout",
                )));
            }
        };

        log::info!("started landmark source `{program}` (pid {})", child.id());
        Ok(Self {
            child,
            reader: LineReader::new(BufReader::new(stdout)),
        })
    }
}

impl LandmarkSource for ProcessSource {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let result = self.reader.next_frame();
        if let Err(CaptureError::Ended) = &result {
            match self.child.try_wait() {
                Ok(Some(status)) => log::warn!("landmark source exited with {status}"),
                Ok(None) => log::warn!("landmark source closed its output"),
                Err(e) => log::warn!("failed to query landmark source status: {e}"),
            }
        }
        result
    }
}

impl Drop for ProcessSource {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            log::debug!("stopping landmark source (pid {})", self.child.id());
            self.child.kill().ok();
        }
        self.child.wait().ok();
    }
}
