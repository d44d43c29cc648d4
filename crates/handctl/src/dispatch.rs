//! Turns gesture activity into press and release events.
//!
//! Each gesture key with an assignment runs a small state machine:
//!
//! - [`Mode::Hold`]: the input is pressed when the gesture starts and released when it ends.
//! - [`Mode::Repeat`]: while the gesture is active, the input is tapped every
//!   [`Assignment::period`], each tap holding it down for [`Assignment::tap`]. The first tap
//!   happens immediately. A tap is never released and pressed again in the same update, so taps
//!   at least as long as the period still reach the OS as separate presses.
//!
//! The dispatcher never sleeps. All timing is based on the `now` passed to
//! [`Dispatcher::update`], so taps are only as precise as the update rate.
//!
//! Input events that fail are logged and retried on the next update. Physical inputs are
//! reference counted: if two gestures press the same key, it goes down once and is released
//! when the last of them ends.

use std::{
    collections::{BTreeMap, HashMap},
    time::Instant,
};

use crate::action::Action;
use crate::gesture::GestureKey;
use crate::input::{Direction, InputError, InputSink};
use crate::settings::{Assignment, Assignments, Mode};

/// How often a release is attempted in [`Dispatcher::release_all`] before giving up.
const RELEASE_ATTEMPTS: usize = 3;

/// Externally visible state of a gesture key's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Inactive,
    Held,
    Repeating,
}

pub struct Dispatcher<S: InputSink> {
    sessions: BTreeMap<GestureKey, Session>,
    outputs: Outputs<S>,
}

struct Session {
    assignment: Assignment,
    kind: SessionKind,
    /// Whether this session currently owns a press of `assignment.action`.
    down: bool,
    /// Set once the gesture has ended but releasing the input failed.
    ending: bool,
}

enum SessionKind {
    Held,
    Repeating {
        next_tap: Instant,
        release_at: Option<Instant>,
    },
}

impl<S: InputSink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sessions: BTreeMap::new(),
            outputs: Outputs {
                sink,
                held: HashMap::new(),
            },
        }
    }

    pub fn sink(&self) -> &S {
        &self.outputs.sink
    }

    pub fn state(&self, key: GestureKey) -> SessionState {
        match self.sessions.get(&key) {
            None => SessionState::Inactive,
            Some(session) if session.ending => SessionState::Inactive,
            Some(Session {
                kind: SessionKind::Held,
                ..
            }) => SessionState::Held,
            Some(Session {
                kind: SessionKind::Repeating { .. },
                ..
            }) => SessionState::Repeating,
        }
    }

    /// Returns whether any input is currently held down.
    pub fn is_holding(&self) -> bool {
        !self.outputs.held.is_empty()
    }

    /// Updates every gesture key.
    ///
    /// `active` lists the gesture keys that are active in the current frame.
    pub fn update_all(&mut self, active: &[GestureKey], assignments: &Assignments, now: Instant) {
        for key in GestureKey::all() {
            self.update(key, active.contains(&key), assignments.get(key), now);
        }
    }

    /// Advances the state machine of a single gesture key.
    ///
    /// `assignment` is the key's current assignment. If it differs from the one the running
    /// session was started with, the session is ended and a new one is started.
    pub fn update(
        &mut self,
        key: GestureKey,
        active: bool,
        assignment: Option<&Assignment>,
        now: Instant,
    ) {
        let wanted = if active { assignment.copied() } else { None };

        if let Some(session) = self.sessions.get_mut(&key) {
            if session.ending || Some(session.assignment) != wanted {
                session.ending = true;
                if session.down {
                    if !self.outputs.release(session.assignment.action) {
                        return;
                    }
                    session.down = false;
                }
                log::debug!("{key}: inactive");
                self.sessions.remove(&key);
            }
        }

        let Some(assignment) = wanted else { return };
        let session = self.sessions.entry(key).or_insert_with(|| {
            log::debug!("{key}: {:?} {}", assignment.mode, assignment.action);
            Session {
                assignment,
                kind: match assignment.mode {
                    Mode::Hold => SessionKind::Held,
                    Mode::Repeat => SessionKind::Repeating {
                        next_tap: now,
                        release_at: None,
                    },
                },
                down: false,
                ending: false,
            }
        });

        let action = session.assignment.action;
        match &mut session.kind {
            SessionKind::Held => {
                if !session.down && self.outputs.press(action) {
                    session.down = true;
                }
            }
            SessionKind::Repeating {
                next_tap,
                release_at,
            } => {
                let mut released = false;
                if let Some(at) = *release_at {
                    if session.down && now >= at && self.outputs.release(action) {
                        session.down = false;
                        *release_at = None;
                        released = true;
                    }
                }
                // A tap that lasts until the next one starts would merge with it, so the next
                // press waits for the following update.
                if !session.down && !released && now >= *next_tap && self.outputs.press(action) {
                    session.down = true;
                    *release_at = Some(now + session.assignment.tap());
                    let period = session.assignment.period();
                    *next_tap += period;
                    if *next_tap <= now {
                        // Fell behind by more than a period, don't try to catch up.
                        *next_tap = now + period;
                    }
                }
            }
        }
    }

    /// Ends all sessions and releases every input that is still held down.
    ///
    /// Releases are attempted a few times. If an input still cannot be released, the last error
    /// is returned, but the dispatcher forgets about the input either way.
    pub fn release_all(&mut self) -> Result<(), InputError> {
        self.sessions.clear();
        let mut result = Ok(());
        for (action, _) in self.outputs.held.drain() {
            let mut attempt = 0;
            loop {
                match self.outputs.sink.send(action, Direction::Release) {
                    Ok(()) => break,
                    Err(e) => {
                        attempt += 1;
                        if attempt == RELEASE_ATTEMPTS {
                            log::error!("{e}; input may remain pressed");
                            result = Err(e);
                            break;
                        }
                        log::warn!("{e}; retrying");
                    }
                }
            }
        }
        result
    }
}

impl<S: InputSink> Drop for Dispatcher<S> {
    fn drop(&mut self) {
        if self.is_holding() {
            self.release_all().ok();
        }
    }
}

/// Reference-counted access to the input sink.
struct Outputs<S> {
    sink: S,
    held: HashMap<Action, usize>,
}

impl<S: InputSink> Outputs<S> {
    /// Acquires a press of `action`. Returns `false` if the press could not be delivered.
    fn press(&mut self, action: Action) -> bool {
        if let Some(count) = self.held.get_mut(&action) {
            *count += 1;
            return true;
        }
        match self.sink.send(action, Direction::Press) {
            Ok(()) => {
                self.held.insert(action, 1);
                true
            }
            Err(e) => {
                log::warn!("{e}; retrying next frame");
                false
            }
        }
    }

    /// Gives up a press of `action`. Returns `false` if the release could not be delivered.
    fn release(&mut self, action: Action) -> bool {
        match self.held.get_mut(&action) {
            None => true,
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => match self.sink.send(action, Direction::Release) {
                Ok(()) => {
                    self.held.remove(&action);
                    true
                }
                Err(e) => {
                    log::warn!("{e}; retrying next frame");
                    false
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::action::KeyCode;
    use crate::gesture::Gesture;
    use crate::hand::Handedness;
    use crate::input::RecordingSink;

    const W: Action = Action::Key(KeyCode::Char('w'));
    const E: Action = Action::Key(KeyCode::Char('e'));

    fn left_pinch() -> GestureKey {
        GestureKey::new(Handedness::Left, Gesture::Pinch)
    }

    fn right_pinch() -> GestureKey {
        GestureKey::new(Handedness::Right, Gesture::Pinch)
    }

    fn ms(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn setup() -> (Dispatcher<RecordingSink>, RecordingSink, Instant) {
        let sink = RecordingSink::new();
        (Dispatcher::new(sink.clone()), sink, Instant::now())
    }

    #[test]
    fn hold_presses_once_per_activation() {
        let (mut d, sink, t0) = setup();
        let hold = Assignment::new(W, Mode::Hold);

        for cycle in 0..3u64 {
            let base = t0 + ms(cycle * 1000);
            for i in 0..10 {
                d.update(left_pinch(), true, Some(&hold), base + ms(i * 10));
                assert_eq!(d.state(left_pinch()), SessionState::Held);
            }
            for i in 10..20 {
                d.update(left_pinch(), false, Some(&hold), base + ms(i * 10));
                assert_eq!(d.state(left_pinch()), SessionState::Inactive);
            }
        }

        let expected = [(Direction::Press, W), (Direction::Release, W)].repeat(3);
        assert_eq!(sink.sequence(), expected);
    }

    /// Runs a gesture for `active_ms`, updating every 10ms, and returns the times (relative to
    /// the start) at which events were emitted.
    fn run_repeat(
        assignment: Assignment,
        active_ms: u64,
        total_ms: u64,
    ) -> Vec<(u64, Direction)> {
        let (mut d, sink, t0) = setup();
        let mut timeline = Vec::new();
        let mut seen = 0;
        for t in (0..total_ms).step_by(10) {
            d.update(left_pinch(), t < active_ms, Some(&assignment), t0 + ms(t));
            let seq = sink.sequence();
            for (dir, _) in &seq[seen..] {
                timeline.push((t, *dir));
            }
            seen = seq.len();
        }
        timeline
    }

    #[test]
    fn repeat_taps_at_configured_rate() {
        let timeline = run_repeat(Assignment::repeat(W, 2.0, 50), 1000, 1000);
        assert_eq!(
            timeline,
            [
                (0, Direction::Press),
                (50, Direction::Release),
                (500, Direction::Press),
                (550, Direction::Release),
            ]
        );
    }

    #[test]
    fn deactivation_releases_in_flight_tap() {
        let timeline = run_repeat(Assignment::repeat(W, 2.0, 50), 20, 2000);
        assert_eq!(timeline, [(0, Direction::Press), (20, Direction::Release)]);
    }

    #[test]
    fn repeat_state_machine() {
        let (mut d, _sink, t0) = setup();
        let repeat = Assignment::repeat(W, 10.0, 40);
        assert_eq!(d.state(left_pinch()), SessionState::Inactive);
        d.update(left_pinch(), true, Some(&repeat), t0);
        assert_eq!(d.state(left_pinch()), SessionState::Repeating);
        assert!(d.is_holding());
        d.update(left_pinch(), false, Some(&repeat), t0 + ms(10));
        assert_eq!(d.state(left_pinch()), SessionState::Inactive);
        assert!(!d.is_holding());
    }

    #[test]
    fn failed_press_is_retried() {
        let (mut d, sink, t0) = setup();
        let hold = Assignment::new(W, Mode::Hold);

        sink.fail_next(1);
        d.update(left_pinch(), true, Some(&hold), t0);
        assert!(sink.events().is_empty());
        assert!(!d.is_holding());

        d.update(left_pinch(), true, Some(&hold), t0 + ms(10));
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);
    }

    #[test]
    fn failed_release_is_retried() {
        let (mut d, sink, t0) = setup();
        let hold = Assignment::new(W, Mode::Hold);

        d.update(left_pinch(), true, Some(&hold), t0);
        sink.fail_next(1);
        d.update(left_pinch(), false, Some(&hold), t0 + ms(10));
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);
        assert!(d.is_holding());

        // Reactivating delivers the pending release before pressing again.
        d.update(left_pinch(), true, Some(&hold), t0 + ms(20));
        d.update(left_pinch(), false, Some(&hold), t0 + ms(30));
        assert_eq!(
            sink.sequence(),
            [(Direction::Press, W), (Direction::Release, W), (Direction::Press, W), (Direction::Release, W)]
        );
        assert!(!d.is_holding());
    }

    #[test]
    fn shared_inputs_are_reference_counted() {
        let (mut d, sink, t0) = setup();
        let hold = Assignment::new(W, Mode::Hold);

        d.update(left_pinch(), true, Some(&hold), t0);
        d.update(right_pinch(), true, Some(&hold), t0);
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);

        d.update(left_pinch(), false, Some(&hold), t0 + ms(10));
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);

        d.update(right_pinch(), false, Some(&hold), t0 + ms(20));
        assert_eq!(sink.sequence(), [(Direction::Press, W), (Direction::Release, W)]);
    }

    #[test]
    fn changed_assignment_restarts_session() {
        let (mut d, sink, t0) = setup();
        d.update(left_pinch(), true, Some(&Assignment::new(W, Mode::Hold)), t0);
        d.update(left_pinch(), true, Some(&Assignment::new(E, Mode::Hold)), t0 + ms(10));
        d.update(left_pinch(), true, None, t0 + ms(20));
        assert_eq!(
            sink.sequence(),
            [
                (Direction::Press, W),
                (Direction::Release, W),
                (Direction::Press, E),
                (Direction::Release, E),
            ]
        );
    }

    #[test]
    fn release_all_and_drop_release_everything() {
        let (mut d, sink, t0) = setup();
        let mut assignments = Assignments::default();
        assignments.insert(left_pinch(), Assignment::new(W, Mode::Hold));
        assignments.insert(right_pinch(), Assignment::repeat(E, 5.0, 40));

        d.update_all(&[left_pinch(), right_pinch()], &assignments, t0);
        assert_eq!(sink.sequence().len(), 2);
        d.release_all().unwrap();
        assert!(!d.is_holding());
        assert_eq!(d.state(left_pinch()), SessionState::Inactive);
        let released = sink
            .sequence()
            .into_iter()
            .filter(|(dir, _)| *dir == Direction::Release)
            .count();
        assert_eq!(released, 2);

        sink.clear();
        d.update_all(&[left_pinch()], &assignments, t0 + ms(10));
        drop(d);
        assert_eq!(
            sink.sequence(),
            [(Direction::Press, W), (Direction::Release, W)]
        );
    }
    #[test]
    fn failed_taps_keep_their_schedule() {
        let (mut d, sink, t0) = setup();
        let repeat = Assignment::repeat(W, 2.0, 50);

        sink.fail_next(1);
        d.update(left_pinch(), true, Some(&repeat), t0);
        assert!(sink.events().is_empty());
        assert!(!d.is_holding());

        d.update(left_pinch(), true, Some(&repeat), t0 + ms(10));
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);

        // The tap release fails once and goes through on the next update.
        sink.fail_next(1);
        d.update(left_pinch(), true, Some(&repeat), t0 + ms(60));
        assert!(d.is_holding());
        d.update(left_pinch(), true, Some(&repeat), t0 + ms(70));
        assert!(!d.is_holding());
        assert_eq!(sink.sequence(), [(Direction::Press, W), (Direction::Release, W)]);

        // The next tap is still due 500ms after the first scheduled one.
        d.update(left_pinch(), true, Some(&repeat), t0 + ms(490));
        assert_eq!(sink.sequence().len(), 2);
        d.update(left_pinch(), true, Some(&repeat), t0 + ms(500));
        assert_eq!(sink.sequence().last(), Some(&(Direction::Press, W)));

        // A release failing while the gesture ends is still delivered later.
        sink.fail_next(1);
        d.update(left_pinch(), false, Some(&repeat), t0 + ms(510));
        assert!(d.is_holding());
        d.update(left_pinch(), false, Some(&repeat), t0 + ms(520));
        assert!(!d.is_holding());
        assert_eq!(sink.sequence().last(), Some(&(Direction::Release, W)));
    }

    #[test]
    fn release_all_gives_up_after_retries() {
        let (mut d, sink, t0) = setup();
        let hold = Assignment::new(W, Mode::Hold);

        d.update(left_pinch(), true, Some(&hold), t0);
        sink.fail_next(RELEASE_ATTEMPTS - 1);
        d.release_all().unwrap();
        assert_eq!(sink.sequence(), [(Direction::Press, W), (Direction::Release, W)]);

        sink.clear();
        d.update(left_pinch(), true, Some(&hold), t0 + ms(10));
        sink.fail_next(RELEASE_ATTEMPTS);
        let err = d.release_all().unwrap_err();
        assert_eq!(err.action, W);
        assert_eq!(err.direction, Direction::Release);
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);

        // The input is forgotten, so dropping does not try again.
        assert!(!d.is_holding());
        drop(d);
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);
    }

    #[test]
    fn long_taps_stay_separate() {
        let (mut d, sink, t0) = setup();
        let repeat = Assignment::repeat(W, 10.0, 200);

        d.update(left_pinch(), true, Some(&repeat), t0);
        d.update(left_pinch(), true, Some(&repeat), t0 + ms(100));
        assert_eq!(sink.sequence(), [(Direction::Press, W)]);

        d.update(left_pinch(), true, Some(&repeat), t0 + ms(200));
        assert_eq!(sink.sequence(), [(Direction::Press, W), (Direction::Release, W)]);

        d.update(left_pinch(), true, Some(&repeat), t0 + ms(210));
        assert_eq!(
            sink.sequence(),
            [(Direction::Press, W), (Direction::Release, W), (Direction::Press, W)]
        );
    }
}
