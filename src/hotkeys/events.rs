use crate::review::ReviewEvent;

/// What a key press asks the app to do.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    Review(ReviewEvent),
    GeneratePlots,
    /// Show or hide the trial list for picking a video directly.
    ToggleTrialList,
}

impl KeyAction {
    /// Whether holding the key down should keep firing the action.
    pub fn repeats(&self) -> bool {
        matches!(
            self,
            KeyAction::Review(
                ReviewEvent::StepFrames(_)
                    | ReviewEvent::JumpFrames(_)
                    | ReviewEvent::Seek(_)
                    | ReviewEvent::SpeedUp
                    | ReviewEvent::SpeedDown
            )
        )
    }
}

/// Shortcut reference shown in the instructions panel.
pub const KEY_HELP: &[(&str, &str)] = &[
    ("Space", "Play / pause"),
    (", / .", "Previous / next frame"),
    ("Left / Right", "Seek back / forward"),
    ("Shift + Left / Right", "Jump frames back / forward"),
    ("[ / ]", "Slower / faster"),
    ("Enter", "Mark frame and go to next video"),
    ("Esc", "Mark as no frame and go to next video"),
    ("Ctrl + Left / Right", "Previous / next video"),
    ("Ctrl + Space", "Show / hide video list"),
    ("Ctrl + Shift + Space", "Next unmarked video"),
    ("Ctrl + P", "Generate summary plots"),
    ("Ctrl + Q", "Save and quit"),
];
