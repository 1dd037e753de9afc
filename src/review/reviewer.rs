use crate::core::{Mark, MergeSummary, SessionStore, Trial};
use crate::review::player::{frame_index, frame_time, Player};
use crate::review::state::{resume_position, Effect, ReviewEvent, ReviewMachine, ReviewState};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default)]
pub struct ReviewOptions {
    /// Start at the first unmarked trial instead of the stored position.
    pub skip_marked: bool,
    /// Show relative path and group even if the session was created blind.
    pub show_trial_info: bool,
    /// Overrides the frame rate reported by the player.
    pub fps_override: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

/// Trial metadata that is only shown outside blind mode.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialInfo {
    pub relative_path: String,
    pub group: String,
}

/// Drives one review session: feeds events through the state machine and
/// carries out the resulting effects against the session store and the player.
pub struct Reviewer<P: Player> {
    store: SessionStore,
    trials: Vec<Trial>,
    marks: Vec<Option<Mark>>,
    machine: ReviewMachine,
    player: P,
    options: ReviewOptions,
    finish_on_start: bool,
    status: Option<StatusMessage>,
    last_merge: Option<MergeSummary>,
}

impl<P: Player> Reviewer<P> {
    /// `trials` must already be in review order.
    pub fn new(
        store: SessionStore,
        trials: Vec<Trial>,
        player: P,
        options: ReviewOptions,
    ) -> Result<Self, crate::core::SessionError> {
        let stored = store.marks()?;
        let marks: Vec<Option<Mark>> = trials.iter().map(|t| stored.get(&t.id).copied()).collect();
        let marked: Vec<bool> = marks.iter().map(Option::is_some).collect();

        let resume = resume_position(store.position(), &marked, options.skip_marked);
        let finish_on_start = resume.is_none() && !trials.is_empty();
        let position = resume.unwrap_or(trials.len().saturating_sub(1));

        log::info!(
            "Reviewing {} trials ({} already marked), starting at index {}",
            trials.len(),
            stored.len(),
            position
        );

        Ok(Self {
            machine: ReviewMachine::new(position, trials.len()),
            store,
            trials,
            marks,
            player,
            options,
            finish_on_start,
            status: None,
            last_merge: None,
        })
    }

    /// Loads the first trial. Opens straight into the completion state when
    /// every trial is marked and marked trials are being skipped.
    pub fn start(&mut self) -> Flow {
        let flow = self.handle(ReviewEvent::Start);
        if flow == Flow::Continue && self.finish_on_start {
            self.finish_on_start = false;
            let flow = self.handle(ReviewEvent::Finish);
            self.set_status("All videos have already been scored", false);
            return flow;
        }
        flow
    }

    pub fn handle(&mut self, event: ReviewEvent) -> Flow {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            log::debug!("Review event {:?} in state {:?}", event, self.machine.state);
            let marked = self.marked();
            let (next, effects) = self.machine.transition(&event, &marked);
            self.machine = next;

            for effect in effects {
                if effect == Effect::Exit {
                    return Flow::Exit;
                }
                if let Some(follow_up) = self.apply(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
        Flow::Continue
    }

    fn apply(&mut self, effect: Effect) -> Option<ReviewEvent> {
        match effect {
            Effect::Play => self.player.play(),
            Effect::Pause => self.player.pause(),
            Effect::SeekBy(delta) => self.player.seek_by(delta),
            Effect::SeekTo(seconds) => self.player.seek_to(seconds),
            Effect::StepFrames(frames) => self.player.step_frames(frames),
            Effect::SetSpeed(speed) => self.player.set_speed(speed),
            Effect::RecordMark(index) => {
                let frame = self.shown_frame();
                return Some(self.record(index, Mark::Frame(frame)));
            }
            Effect::RecordNoFrame(index) => return Some(self.record(index, Mark::NoFrame)),
            Effect::LoadTrial(index) => return Some(self.load(index)),
            Effect::PersistPosition(index) => {
                if let Err(e) = self.store.set_position(index) {
                    log::error!("Failed to save position: {}", e);
                    self.set_status(format!("Failed to save position: {}", e), true);
                }
            }
            Effect::Merge => {
                self.merge();
            }
            Effect::Exit => {}
        }
        None
    }

    fn record(&mut self, index: usize, mark: Mark) -> ReviewEvent {
        let Some(id) = self.trials.get(index).map(|t| t.id.clone()) else {
            return ReviewEvent::MarkFailed;
        };
        match self.store.record_mark(&id, mark) {
            Ok(()) => {
                self.marks[index] = Some(mark);
                self.set_status(format!("Saved {} for {}", describe(mark), id), false);
                ReviewEvent::MarkRecorded
            }
            Err(e) => {
                log::error!("Failed to record mark for {}: {}", id, e);
                self.set_status(format!("Mark NOT saved for {}: {}", id, e), true);
                ReviewEvent::MarkFailed
            }
        }
    }

    fn load(&mut self, index: usize) -> ReviewEvent {
        let Some(trial) = self.trials.get(index).cloned() else {
            return ReviewEvent::LoadFailed;
        };
        if let Err(e) = self.player.open(&trial.path) {
            log::error!("Skipping {}: {}", trial.relative_path, e);
            self.set_status(format!("Could not open {}: {}", trial.id, e), true);
            return ReviewEvent::LoadFailed;
        }

        if let Some(Mark::Frame(frame)) = self.marks[index] {
            let fps = self.fps();
            self.player.seek_to(frame_time(frame, fps));
        }
        log::info!("Loaded trial {}/{}: {}", index + 1, self.trials.len(), trial.id);
        ReviewEvent::TrialLoaded
    }

    fn merge(&mut self) -> bool {
        match self.store.merge(&self.trials) {
            Ok(summary) => {
                self.set_status(
                    format!("Saved {} results to {}", summary.rows, summary.path.display()),
                    false,
                );
                self.last_merge = Some(summary);
                true
            }
            Err(e) => {
                log::error!("Failed to merge results: {}", e);
                self.set_status(format!("Failed to merge results: {}", e), true);
                false
            }
        }
    }

    /// Rewrites `results.csv` from the marks so far, without leaving the current trial.
    pub fn merge_now(&mut self) -> bool {
        self.merge()
    }

    fn marked(&self) -> Vec<bool> {
        self.marks.iter().map(Option::is_some).collect()
    }

    fn set_status(&mut self, text: impl Into<String>, is_error: bool) {
        self.status = Some(StatusMessage {
            text: text.into(),
            is_error,
        });
    }

    pub fn fps(&self) -> f64 {
        self.options
            .fps_override
            .filter(|fps| *fps > 0.0)
            .unwrap_or_else(|| self.player.frame_rate())
    }

    pub fn current_frame(&self) -> u64 {
        frame_index(self.player.time(), self.fps(), self.player.frame_count())
    }

    /// Frame on screen, which is what a mark records.
    pub fn shown_frame(&self) -> u64 {
        frame_index(self.player.shown_time(), self.fps(), self.player.frame_count())
    }

    pub fn state(&self) -> ReviewState {
        self.machine.state
    }

    pub fn speed(&self) -> f64 {
        self.machine.speed
    }

    pub fn is_done(&self) -> bool {
        self.machine.is_done()
    }

    pub fn can_mark(&self) -> bool {
        self.machine.can_mark()
    }

    pub fn position(&self) -> usize {
        self.machine.position
    }

    pub fn trial_count(&self) -> usize {
        self.trials.len()
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn current_trial(&self) -> Option<&Trial> {
        self.trials.get(self.machine.position)
    }

    pub fn current_mark(&self) -> Option<Mark> {
        self.marks.get(self.machine.position).copied().flatten()
    }

    pub fn mark_at(&self, index: usize) -> Option<Mark> {
        self.marks.get(index).copied().flatten()
    }

    pub fn marked_count(&self) -> usize {
        self.marks.iter().filter(|m| m.is_some()).count()
    }

    pub fn is_blind(&self) -> bool {
        self.store.blind_mode() && !self.options.show_trial_info
    }

    /// Path and group of the current trial, hidden in blind mode.
    pub fn trial_info(&self) -> Option<TrialInfo> {
        if self.is_blind() {
            return None;
        }
        self.current_trial().map(|trial| TrialInfo {
            relative_path: trial.relative_path.clone(),
            group: trial.group.clone(),
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn status(&self) -> Option<&StatusMessage> {
        self.status.as_ref()
    }

    pub fn report(&mut self, text: impl Into<String>, is_error: bool) {
        self.set_status(text, is_error);
    }

    pub fn last_merge(&self) -> Option<&MergeSummary> {
        self.last_merge.as_ref()
    }
}

fn describe(mark: Mark) -> String {
    match mark {
        Mark::Frame(frame) => format!("frame {}", frame),
        Mark::NoFrame => "no frame".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RESULTS_FILE;
    use crate::review::player::fake::FakePlayer;
    use std::path::Path;

    fn trials(root: &Path, count: usize) -> Vec<Trial> {
        (0..count)
            .map(|i| Trial::from_path(root, &root.join(format!("349/hab/t{:02}.mp4", i))).unwrap())
            .collect()
    }

    fn new_session(tmp: &tempfile::TempDir, blind: bool) -> SessionStore {
        SessionStore::create(&tmp.path().join("session1"), &tmp.path().join("videos"), blind, "").unwrap()
    }

    fn reopen(tmp: &tempfile::TempDir) -> SessionStore {
        SessionStore::open(&tmp.path().join("session1")).unwrap()
    }

    fn mark_at(reviewer: &mut Reviewer<FakePlayer>, seconds: f64) {
        reviewer.handle(ReviewEvent::SeekTo(seconds));
        reviewer.handle(ReviewEvent::MarkAndAdvance);
    }

    #[test]
    fn test_mark_at_two_seconds_records_frame_sixty() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 2), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        reviewer.start();
        assert_eq!(reviewer.state(), ReviewState::Idle);

        mark_at(&mut reviewer, 2.0);
        assert_eq!(reviewer.store().read_mark("t00").unwrap(), Some(Mark::Frame(60)));
        assert_eq!(reviewer.position(), 1);
        assert_eq!(reviewer.player().opened.len(), 2);
    }

    #[test]
    fn test_resume_after_three_marks() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let all = trials(&videos, 10);

        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), all.clone(), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        reviewer.start();
        for i in 0..3 {
            mark_at(&mut reviewer, 1.0 + i as f64);
        }
        assert_eq!(reviewer.handle(ReviewEvent::Quit), Flow::Exit);

        let resumed =
            Reviewer::new(reopen(&tmp), all, FakePlayer::new(30.0, 300), ReviewOptions::default()).unwrap();
        assert_eq!(resumed.position(), 3);
        assert_eq!(resumed.marked_count(), 3);
        assert_eq!(resumed.mark_at(0), Some(Mark::Frame(30)));
        assert_eq!(resumed.mark_at(2), Some(Mark::Frame(90)));
    }

    #[test]
    fn test_resume_stays_on_trial_after_earlier_video_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let all = trials(&videos, 3);
        let mut store = new_session(&tmp, true);
        store.set_order(all.iter().map(|t| t.relative_path.clone()).collect()).unwrap();
        store.record_mark("t00", Mark::Frame(3)).unwrap();
        store.set_position(1).unwrap();

        let mut store = reopen(&tmp);
        let remaining = store.ordered_trials(&all[1..], &mut rand::rng()).unwrap();
        let resumed = Reviewer::new(store, remaining, FakePlayer::new(30.0, 300), ReviewOptions::default()).unwrap();

        assert_eq!(resumed.current_trial().map(|t| t.id.as_str()), Some("t01"));
        assert_eq!(resumed.current_mark(), None);
    }

    #[test]
    fn test_mark_records_frame_on_screen() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 2), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        reviewer.start();
        reviewer.handle(ReviewEvent::TogglePlay);
        reviewer.handle(ReviewEvent::SeekTo(2.0));
        // Decoding has only caught up to one second
        reviewer.player_mut().shown = Some(1.0);
        assert_eq!(reviewer.current_frame(), 60);
        assert_eq!(reviewer.shown_frame(), 30);

        reviewer.handle(ReviewEvent::MarkAndAdvance);
        assert_eq!(reviewer.store().read_mark("t00").unwrap(), Some(Mark::Frame(30)));
    }

    #[test]
    fn test_merge_now_writes_results_mid_session() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 3), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        reviewer.start();
        mark_at(&mut reviewer, 1.0);
        assert!(!reviewer.store().results_path().exists());

        assert!(reviewer.merge_now());
        let csv = std::fs::read_to_string(reviewer.store().results_path()).unwrap();
        assert!(csv.contains("t00,30,349/hab/t00.mp4,349/hab,session1,"));
        assert_eq!(reviewer.position(), 1);
        assert_ne!(reviewer.state(), ReviewState::Done);
    }

    #[test]
    fn test_skip_marked_resumes_at_first_unmarked() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let all = trials(&videos, 4);
        let store = new_session(&tmp, true);
        store.record_mark("t00", Mark::Frame(1)).unwrap();
        store.record_mark("t01", Mark::NoFrame).unwrap();

        let options = ReviewOptions {
            skip_marked: true,
            ..Default::default()
        };
        let reviewer = Reviewer::new(store, all, FakePlayer::new(30.0, 300), options).unwrap();
        assert_eq!(reviewer.position(), 2);
    }

    #[test]
    fn test_all_marked_opens_done_and_merges() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let store = new_session(&tmp, true);
        store.record_mark("t00", Mark::Frame(4)).unwrap();
        store.record_mark("t01", Mark::Frame(5)).unwrap();

        let options = ReviewOptions {
            skip_marked: true,
            ..Default::default()
        };
        let mut reviewer = Reviewer::new(store, trials(&videos, 2), FakePlayer::new(30.0, 300), options).unwrap();
        reviewer.start();
        assert_eq!(reviewer.state(), ReviewState::Done);
        assert!(reviewer.store().dir().join(RESULTS_FILE).exists());
    }

    #[test]
    fn test_marking_last_trial_merges_results() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 2), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        reviewer.start();
        mark_at(&mut reviewer, 0.5);
        reviewer.handle(ReviewEvent::MarkNoFrame);

        assert_eq!(reviewer.state(), ReviewState::Done);
        assert_eq!(reviewer.position(), 1);
        assert_eq!(reviewer.last_merge().map(|m| m.rows), Some(2));

        let csv = std::fs::read_to_string(reviewer.store().results_path()).unwrap();
        assert!(csv.contains("t00,15,349/hab/t00.mp4,349/hab,session1,"));
        assert!(csv.contains("t01,,349/hab/t01.mp4,349/hab,session1,"));
    }

    #[test]
    fn test_failed_write_keeps_trial() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 3), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        reviewer.start();
        std::fs::remove_dir_all(reviewer.store().per_trial_dir()).unwrap();

        mark_at(&mut reviewer, 1.0);
        assert_eq!(reviewer.position(), 0);
        assert_eq!(reviewer.state(), ReviewState::Paused);
        assert_eq!(reviewer.marked_count(), 0);
        assert!(reviewer.status().map_or(false, |s| s.is_error));
    }

    #[test]
    fn test_unopenable_video_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let all = trials(&videos, 3);
        let mut player = FakePlayer::new(30.0, 300);
        player.broken.insert(all[0].path.clone());

        let mut reviewer = Reviewer::new(new_session(&tmp, true), all, player, ReviewOptions::default()).unwrap();
        reviewer.start();
        assert_eq!(reviewer.position(), 1);
        assert_eq!(reviewer.state(), ReviewState::Idle);
        assert!(reviewer.status().map_or(false, |s| s.is_error));
    }

    #[test]
    fn test_revisiting_marked_trial_seeks_to_mark() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let store = new_session(&tmp, true);
        store.record_mark("t00", Mark::Frame(45)).unwrap();

        let mut reviewer =
            Reviewer::new(store, trials(&videos, 2), FakePlayer::new(30.0, 300), ReviewOptions::default()).unwrap();
        reviewer.start();
        assert_eq!(reviewer.current_frame(), 45);

        reviewer.handle(ReviewEvent::Next);
        assert_eq!(reviewer.current_frame(), 0);
        reviewer.handle(ReviewEvent::Previous);
        assert_eq!(reviewer.current_frame(), 45);
    }

    #[test]
    fn test_fps_override_changes_recorded_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let options = ReviewOptions {
            fps_override: Some(60.0),
            ..Default::default()
        };
        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 2), FakePlayer::new(30.0, 300), options).unwrap();
        reviewer.start();
        mark_at(&mut reviewer, 2.0);
        assert_eq!(reviewer.store().read_mark("t00").unwrap(), Some(Mark::Frame(120)));
    }

    #[test]
    fn test_speed_changes_reach_player() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let mut reviewer =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 1), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        reviewer.start();
        for _ in 0..30 {
            reviewer.handle(ReviewEvent::SpeedUp);
        }
        assert_eq!(reviewer.player().speed, 2.0);
        for _ in 0..60 {
            reviewer.handle(ReviewEvent::SpeedDown);
        }
        assert_eq!(reviewer.player().speed, 0.25);
    }

    #[test]
    fn test_blind_mode_hides_trial_info() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        let mut blind =
            Reviewer::new(new_session(&tmp, true), trials(&videos, 1), FakePlayer::new(30.0, 300), ReviewOptions::default())
                .unwrap();
        blind.start();
        assert!(blind.trial_info().is_none());

        let options = ReviewOptions {
            show_trial_info: true,
            ..Default::default()
        };
        let shown = Reviewer::new(reopen(&tmp), trials(&videos, 1), FakePlayer::new(30.0, 300), options).unwrap();
        assert_eq!(
            shown.trial_info(),
            Some(TrialInfo {
                relative_path: "349/hab/t00.mp4".into(),
                group: "349/hab".into(),
            })
        );
    }
}
