//! Annotation loop as a pure state machine.
//!
//! Key presses and player callbacks become [`ReviewEvent`]s; [`ReviewMachine::transition`]
//! returns the next machine and the [`Effect`]s the driver has to carry out. Nothing in
//! here touches the filesystem or a player, so every rule can be tested directly.

pub const MIN_SPEED: f64 = 0.25;
pub const MAX_SPEED: f64 = 2.0;
pub const SPEED_STEP: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewState {
    /// A trial is loaded (or being loaded) and playback has not started.
    Idle,
    Playing,
    Paused,
    /// A mark is being written; the next trial is loaded once it succeeds.
    Advancing,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewEvent {
    Start,
    TogglePlay,
    /// Single-frame step; pauses playback first.
    StepFrames(i64),
    /// Multi-frame jump; also pauses first.
    JumpFrames(i64),
    /// Relative seek in seconds.
    Seek(f64),
    /// Absolute seek in seconds (timeline clicks).
    SeekTo(f64),
    SpeedUp,
    SpeedDown,
    MarkAndAdvance,
    MarkNoFrame,
    MarkRecorded,
    MarkFailed,
    TrialLoaded,
    LoadFailed,
    Previous,
    Next,
    NextUnmarked,
    Select(usize),
    /// Leave the completion screen and keep reviewing the last trial.
    ContinueReviewing,
    /// Jump straight to completion (resume with nothing left to mark).
    Finish,
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Play,
    Pause,
    SeekBy(f64),
    SeekTo(f64),
    StepFrames(i64),
    SetSpeed(f64),
    /// Record the frame currently shown for the trial at this position.
    RecordMark(usize),
    RecordNoFrame(usize),
    LoadTrial(usize),
    PersistPosition(usize),
    Merge,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewMachine {
    pub state: ReviewState,
    pub position: usize,
    pub trial_count: usize,
    pub speed: f64,
}

impl ReviewMachine {
    pub fn new(position: usize, trial_count: usize) -> Self {
        Self {
            state: ReviewState::Idle,
            position: position.min(trial_count.saturating_sub(1)),
            trial_count,
            speed: 1.0,
        }
    }

    fn with_state(&self, state: ReviewState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// `marked[i]` tells whether the trial at position `i` already has a mark.
    pub fn transition(&self, event: &ReviewEvent, marked: &[bool]) -> (ReviewMachine, Vec<Effect>) {
        use ReviewEvent as E;
        use ReviewState as S;

        let unchanged = || (self.clone(), Vec::new());

        match (self.state, event) {
            (_, E::Quit) => (self.clone(), vec![Effect::PersistPosition(self.position), Effect::Exit]),

            (S::Idle, E::Start) => {
                if self.trial_count == 0 {
                    (self.with_state(S::Done), Vec::new())
                } else {
                    (self.clone(), vec![Effect::LoadTrial(self.position)])
                }
            }
            (S::Idle, E::TrialLoaded) => (self.clone(), vec![Effect::SetSpeed(self.speed)]),
            (S::Idle, E::LoadFailed) => self.advance(),

            (S::Playing, E::TogglePlay) => (self.with_state(S::Paused), vec![Effect::Pause]),
            (S::Idle | S::Paused, E::TogglePlay) => (self.with_state(S::Playing), vec![Effect::Play]),

            (S::Playing, E::StepFrames(n) | E::JumpFrames(n)) => {
                (self.with_state(S::Paused), vec![Effect::Pause, Effect::StepFrames(*n)])
            }
            (S::Idle | S::Paused, E::StepFrames(n) | E::JumpFrames(n)) => {
                (self.with_state(S::Paused), vec![Effect::StepFrames(*n)])
            }
            (S::Idle | S::Playing | S::Paused, E::Seek(delta)) => (self.clone(), vec![Effect::SeekBy(*delta)]),
            (S::Idle | S::Playing | S::Paused, E::SeekTo(t)) => (self.clone(), vec![Effect::SeekTo(*t)]),

            (S::Idle | S::Playing | S::Paused, E::SpeedUp) => self.change_speed(self.speed * SPEED_STEP),
            (S::Idle | S::Playing | S::Paused, E::SpeedDown) => self.change_speed(self.speed / SPEED_STEP),

            (S::Idle | S::Playing | S::Paused, E::MarkAndAdvance) => {
                self.begin_advance(Effect::RecordMark(self.position))
            }
            (S::Idle | S::Playing | S::Paused, E::MarkNoFrame) => {
                self.begin_advance(Effect::RecordNoFrame(self.position))
            }
            (S::Advancing, E::MarkRecorded) => self.advance(),
            (S::Advancing, E::MarkFailed) => (self.with_state(S::Paused), Vec::new()),

            (S::Idle | S::Playing | S::Paused | S::Done, E::Previous) => {
                if self.position == 0 {
                    unchanged()
                } else {
                    self.load(self.position - 1)
                }
            }
            (S::Idle | S::Playing | S::Paused, E::Next) => {
                if self.position + 1 >= self.trial_count {
                    unchanged()
                } else {
                    self.load(self.position + 1)
                }
            }
            (S::Idle | S::Playing | S::Paused | S::Done, E::Select(index)) => {
                if *index >= self.trial_count {
                    unchanged()
                } else {
                    self.load(*index)
                }
            }
            (S::Idle | S::Playing | S::Paused | S::Done, E::NextUnmarked) => {
                match next_unmarked(self.position, self.trial_count, marked) {
                    Some(index) => self.load(index),
                    None => unchanged(),
                }
            }

            (S::Done, E::ContinueReviewing) => (self.with_state(S::Paused), Vec::new()),
            (S::Idle | S::Playing | S::Paused, E::Finish) => self.finish(),

            _ => unchanged(),
        }
    }

    fn change_speed(&self, requested: f64) -> (ReviewMachine, Vec<Effect>) {
        let speed = clamp_speed(requested);
        if speed == self.speed {
            return (self.clone(), Vec::new());
        }
        let next = Self {
            speed,
            ..self.clone()
        };
        (next, vec![Effect::SetSpeed(speed)])
    }

    fn begin_advance(&self, record: Effect) -> (ReviewMachine, Vec<Effect>) {
        let mut effects = Vec::new();
        if self.state == ReviewState::Playing {
            effects.push(Effect::Pause);
        }
        effects.push(record);
        (self.with_state(ReviewState::Advancing), effects)
    }

    fn advance(&self) -> (ReviewMachine, Vec<Effect>) {
        if self.position + 1 < self.trial_count {
            self.load(self.position + 1)
        } else {
            self.finish()
        }
    }

    fn finish(&self) -> (ReviewMachine, Vec<Effect>) {
        (
            self.with_state(ReviewState::Done),
            vec![Effect::Merge, Effect::PersistPosition(self.position)],
        )
    }

    fn load(&self, index: usize) -> (ReviewMachine, Vec<Effect>) {
        let next = Self {
            state: ReviewState::Idle,
            position: index,
            ..self.clone()
        };
        (next, vec![Effect::LoadTrial(index), Effect::PersistPosition(index)])
    }

    pub fn is_done(&self) -> bool {
        self.state == ReviewState::Done
    }

    pub fn can_mark(&self) -> bool {
        matches!(
            self.state,
            ReviewState::Idle | ReviewState::Playing | ReviewState::Paused
        )
    }
}

/// Multiplicative speed steps, rounded to hundredths and clamped to the allowed range.
pub fn clamp_speed(speed: f64) -> f64 {
    let rounded = (speed * 100.0).round() / 100.0;
    rounded.clamp(MIN_SPEED, MAX_SPEED)
}

/// First unmarked position after `from`, wrapping around to the start.
pub fn next_unmarked(from: usize, trial_count: usize, marked: &[bool]) -> Option<usize> {
    let is_marked = |i: usize| marked.get(i).copied().unwrap_or(false);
    (from + 1..trial_count)
        .chain(0..from.min(trial_count))
        .find(|&i| !is_marked(i))
}

/// Where a resumed session starts. `None` means every trial is already marked.
pub fn resume_position(stored: usize, marked: &[bool], skip_marked: bool) -> Option<usize> {
    let trial_count = marked.len();
    if trial_count == 0 {
        return None;
    }
    let position = stored.min(trial_count - 1);
    if !skip_marked || !marked[position] {
        return Some(position);
    }
    next_unmarked(position, trial_count, marked)
}
