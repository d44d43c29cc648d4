//! The per-frame processing cycle.
//!
//! Each frame goes through the same steps: take a settings snapshot, mirror the observations if
//! requested, classify the most confident hand of each side, map the gestures to gesture keys and
//! hand them to the [`Dispatcher`]. A one-line status summary is sent to a reporter whenever it
//! changes.

use std::{
    fmt, io,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, Instant},
};

use itertools::Itertools;
use pawawwewism::Worker;

use crate::{
    action::control_key,
    dispatch::Dispatcher,
    gesture::{classify, Gesture},
    hand::{Frame, Handedness},
    input::{InputError, InputSink},
    settings::watch::SettingsStore,
    source::{CaptureError, LandmarkSource},
    timer::{FpsCounter, Timer},
};

/// Gesture state of one hand side.
#[derive(Debug, Clone, Copy)]
struct HandState {
    gesture: Option<Gesture>,
    since: Instant,
}

/// Summary of a processed frame.
///
/// Displays as `Left: Pinch | Right: Idle`, or `No hands` if no hand is visible.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    /// Visible hands and their gesture, left hand first.
    pub hands: Vec<(Handedness, Option<Gesture>)>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hands.is_empty() {
            return f.write_str("No hands");
        }
        let parts = self.hands.iter().map(|(hand, gesture)| {
            let label = gesture.map_or("Idle", Gesture::label);
            format!("{hand}: {label}")
        });
        write!(f, "{}", parts.format(" | "))
    }
}

/// Spawns a worker that logs every [`Status`] it receives.
pub fn status_reporter() -> io::Result<Worker<Status>> {
    Worker::builder()
        .name("status reporter")
        .spawn(|status: Status| log::info!("{status}"))
}

pub struct Pipeline<S: InputSink> {
    store: SettingsStore,
    dispatcher: Dispatcher<S>,
    hands: [HandState; 2],
    status: Status,
    reporter: Option<Worker<Status>>,
    t_classify: Timer,
    t_dispatch: Timer,
}

impl<S: InputSink> Pipeline<S> {
    pub fn new(store: SettingsStore, sink: S) -> Self {
        let now = Instant::now();
        Self {
            store,
            dispatcher: Dispatcher::new(sink),
            hands: [HandState {
                gesture: None,
                since: now,
            }; 2],
            status: Status::default(),
            reporter: None,
            t_classify: Timer::new("classify"),
            t_dispatch: Timer::new("dispatch"),
        }
    }

    /// Sends status changes to `reporter`.
    pub fn with_reporter(mut self, reporter: Worker<Status>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher<S> {
        &self.dispatcher
    }

    /// Returns the status of the last processed frame.
    pub fn status(&self) -> &Status {
        &self.status
    }

    /// Returns the gesture `hand` is currently performing.
    pub fn gesture(&self, hand: Handedness) -> Option<Gesture> {
        self.hands[hand as usize].gesture
    }

    /// Returns how long `hand` has been performing its current gesture.
    pub fn gesture_duration(&self, hand: Handedness, now: Instant) -> Option<Duration> {
        let state = &self.hands[hand as usize];
        state.gesture.map(|_| now.saturating_duration_since(state.since))
    }

    /// Processes one frame observed at `now`.
    pub fn process(&mut self, mut frame: Frame, now: Instant) {
        let settings = self.store.snapshot();
        if settings.mirror_view {
            frame.mirror();
        }

        let mut active = Vec::with_capacity(2);
        let mut status = Status::default();
        self.t_classify.time(|| {
            for hand in Handedness::ALL {
                let observation = frame.hand(hand);
                let gesture = observation.and_then(|obs| classify(obs, &settings.thresholds));

                if let Some(obs) = observation {
                    status.hands.push((hand, gesture));
                    if settings.debug_draw {
                        let [x, y, _] = obs.landmarks.palm_center();
                        log::debug!(
                            "{hand} hand: score {:.2}, palm at ({x:.3}, {y:.3}), {} landmarks, gesture {}",
                            obs.score,
                            obs.landmarks.len(),
                            gesture.map_or("none", Gesture::as_str),
                        );
                    }
                }
                if let Some(gesture) = gesture {
                    active.push(control_key(&settings, hand, gesture));
                }

                let state = &mut self.hands[hand as usize];
                if state.gesture != gesture {
                    if let Some(prev) = state.gesture {
                        log::debug!(
                            "{hand} hand: {} ended after {:.2?}",
                            prev.as_str(),
                            now.saturating_duration_since(state.since),
                        );
                    }
                    if let Some(gesture) = gesture {
                        log::debug!("{hand} hand: {} started", gesture.as_str());
                    }
                    state.gesture = gesture;
                    state.since = now;
                }
            }
        });

        self.t_dispatch
            .time(|| self.dispatcher.update_all(&active, &settings.assignments, now));

        if status != self.status {
            if let Some(reporter) = &mut self.reporter {
                reporter.send(status.clone());
            }
            self.status = status;
        }
    }

    /// Processes frames from `source` until it fails or `stop` is set.
    ///
    /// Every held input is released before this returns. Returns `Ok(())` if `stop` was set.
    pub fn run<L: LandmarkSource + ?Sized>(
        &mut self,
        source: &mut L,
        stop: &AtomicBool,
    ) -> Result<(), CaptureError> {
        let mut fps = FpsCounter::new("capture");
        let result = loop {
            if stop.load(Ordering::Relaxed) {
                break Ok(());
            }
            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => break Err(e),
            };
            self.process(frame, Instant::now());
            fps.tick_with([&self.t_classify, &self.t_dispatch]);
        };

        self.reset();
        result
    }

    /// Forgets all gestures and releases every held input.
    pub fn reset(&mut self) {
        let now = Instant::now();
        for state in &mut self.hands {
            state.gesture = None;
            state.since = now;
        }
        if let Err(e) = self.release_all() {
            log::error!("failed to release inputs: {e}");
        }
    }

    pub fn release_all(&mut self) -> Result<(), InputError> {
        self.dispatcher.release_all()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::{
        action::{Action, KeyCode},
        gesture::tests::{fist, open_hand, pinch},
        hand::{landmark::HandLandmarks, HandObservation},
        input::{Direction, RecordingSink},
        settings::{Assignment, Mode, Settings},
    };

    fn key(c: char) -> Action {
        Action::Key(KeyCode::Char(c))
    }

    fn obs(handedness: Handedness, landmarks: HandLandmarks) -> HandObservation {
        HandObservation {
            handedness,
            score: 0.9,
            landmarks,
        }
    }

    fn settings() -> Settings {
        let mut settings = Settings {
            mirror_view: false,
            debug_draw: false,
            ..Settings::default()
        };
        for (name, c) in [("left_pinch", 'a'), ("right_pinch", 'b'), ("left_fist", 'c')] {
            settings
                .assignments
                .insert(name.parse().unwrap(), Assignment::new(key(c), Mode::Hold));
        }
        settings
    }

    struct Frames(VecDeque<Frame>);

    impl LandmarkSource for Frames {
        fn next_frame(&mut self) -> Result<Frame, CaptureError> {
            self.0.pop_front().ok_or(CaptureError::Ended)
        }
    }

    #[test]
    fn status_line() {
        assert_eq!(Status::default().to_string(), "No hands");
        let status = Status {
            hands: vec![
                (Handedness::Left, Some(Gesture::Pinch)),
                (Handedness::Right, None),
            ],
        };
        assert_eq!(status.to_string(), "Left: Pinch | Right: Idle");
        let status = Status {
            hands: vec![(Handedness::Right, Some(Gesture::TwoSplit))],
        };
        assert_eq!(status.to_string(), "Right: Two");
    }

    #[test]
    fn gestures_drive_inputs() {
        let sink = RecordingSink::new();
        let mut pipeline = Pipeline::new(SettingsStore::new(settings()), sink.clone());
        let t0 = Instant::now();

        pipeline.process(Frame::new(vec![obs(Handedness::Left, pinch())]), t0);
        assert_eq!(pipeline.gesture(Handedness::Left), Some(Gesture::Pinch));
        assert_eq!(pipeline.status().to_string(), "Left: Pinch");

        let t1 = t0 + Duration::from_millis(30);
        pipeline.process(Frame::new(vec![obs(Handedness::Left, pinch())]), t1);
        assert_eq!(
            pipeline.gesture_duration(Handedness::Left, t1),
            Some(Duration::from_millis(30))
        );

        // Hand leaves the view.
        pipeline.process(Frame::default(), t0 + Duration::from_millis(60));
        assert_eq!(pipeline.gesture(Handedness::Left), None);
        assert_eq!(pipeline.status().to_string(), "No hands");

        assert_eq!(
            sink.sequence(),
            [(Direction::Press, key('a')), (Direction::Release, key('a'))]
        );
    }

    #[test]
    fn mirror_controls_swaps_hands() {
        let mut settings = settings();
        settings.mirror_controls = true;
        let sink = RecordingSink::new();
        let mut pipeline = Pipeline::new(SettingsStore::new(settings), sink.clone());

        pipeline.process(
            Frame::new(vec![obs(Handedness::Left, pinch())]),
            Instant::now(),
        );
        // Classification is unaffected.
        assert_eq!(pipeline.gesture(Handedness::Left), Some(Gesture::Pinch));
        assert_eq!(sink.sequence(), [(Direction::Press, key('b'))]);
    }

    #[test]
    fn mirror_view_flips_handedness() {
        let mut settings = settings();
        settings.mirror_view = true;
        let sink = RecordingSink::new();
        let mut pipeline = Pipeline::new(SettingsStore::new(settings), sink.clone());

        pipeline.process(
            Frame::new(vec![obs(Handedness::Right, fist())]),
            Instant::now(),
        );
        assert_eq!(pipeline.gesture(Handedness::Left), Some(Gesture::Fist));
        assert_eq!(pipeline.status().to_string(), "Left: Fist");
        assert_eq!(sink.sequence(), [(Direction::Press, key('c'))]);
    }

    #[test]
    fn reload_applies_to_next_frame() {
        let store = SettingsStore::new(settings());
        let sink = RecordingSink::new();
        let mut pipeline = Pipeline::new(store.clone(), sink.clone());
        let t0 = Instant::now();

        pipeline.process(Frame::new(vec![obs(Handedness::Left, pinch())]), t0);
        assert_eq!(pipeline.gesture(Handedness::Left), Some(Gesture::Pinch));

        // The fixture's thumb is 0.01 away from the index finger.
        let mut stricter = settings();
        stricter.thresholds.pinch_dist = 0.005;
        store.replace(stricter);

        pipeline.process(
            Frame::new(vec![obs(Handedness::Left, pinch())]),
            t0 + Duration::from_millis(30),
        );
        assert_eq!(pipeline.gesture(Handedness::Left), None);
        assert_eq!(
            sink.sequence(),
            [(Direction::Press, key('a')), (Direction::Release, key('a'))]
        );
    }

    #[test]
    fn run_releases_on_exit() {
        let sink = RecordingSink::new();
        let mut pipeline = Pipeline::new(SettingsStore::new(settings()), sink.clone());
        let mut source = Frames(
            [
                Frame::new(vec![obs(Handedness::Right, open_hand())]),
                Frame::new(vec![
                    obs(Handedness::Right, pinch()),
                    obs(Handedness::Left, fist()),
                ]),
            ]
            .into(),
        );

        let result = pipeline.run(&mut source, &AtomicBool::new(false));
        assert!(matches!(result, Err(CaptureError::Ended)));
        assert!(!pipeline.dispatcher().is_holding());
        assert_eq!(pipeline.gesture(Handedness::Right), None);

        let events = sink.sequence();
        assert_eq!(events.len(), 4);
        assert!(events[..2].contains(&(Direction::Press, key('b'))));
        assert!(events[..2].contains(&(Direction::Press, key('c'))));
        assert!(events[2..].iter().all(|(dir, _)| *dir == Direction::Release));
    }

    #[test]
    fn run_stops_when_requested() {
        let sink = RecordingSink::new();
        let mut pipeline = Pipeline::new(SettingsStore::new(settings()), sink.clone());
        let mut source = Frames([Frame::new(vec![obs(Handedness::Left, pinch())])].into());

        pipeline.run(&mut source, &AtomicBool::new(true)).unwrap();
        assert!(sink.events().is_empty());
    }
}
