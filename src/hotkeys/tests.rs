#[cfg(test)]
mod tests {
    use super::super::{KeyAction, KeyBindings};
    use crate::core::AppConfig;
    use crate::review::ReviewEvent;
    use egui::{Key, Modifiers};

    fn bindings() -> KeyBindings {
        KeyBindings::new(&AppConfig::default())
    }

    fn review(event: ReviewEvent) -> Option<KeyAction> {
        Some(KeyAction::Review(event))
    }

    #[test]
    fn test_playback_keys() {
        let keys = bindings();
        assert_eq!(keys.map_key(Key::Space, Modifiers::NONE), review(ReviewEvent::TogglePlay));
        assert_eq!(keys.map_key(Key::Comma, Modifiers::NONE), review(ReviewEvent::StepFrames(-1)));
        assert_eq!(keys.map_key(Key::Period, Modifiers::NONE), review(ReviewEvent::StepFrames(1)));
        assert_eq!(keys.map_key(Key::ArrowLeft, Modifiers::NONE), review(ReviewEvent::Seek(-5.0)));
        assert_eq!(keys.map_key(Key::ArrowRight, Modifiers::SHIFT), review(ReviewEvent::JumpFrames(15)));
        assert_eq!(keys.map_key(Key::CloseBracket, Modifiers::NONE), review(ReviewEvent::SpeedUp));
    }

    #[test]
    fn test_marking_keys() {
        let keys = bindings();
        assert_eq!(keys.map_key(Key::Enter, Modifiers::NONE), review(ReviewEvent::MarkAndAdvance));
        assert_eq!(keys.map_key(Key::Escape, Modifiers::NONE), review(ReviewEvent::MarkNoFrame));
    }

    #[test]
    fn test_command_keys() {
        let keys = bindings();
        assert_eq!(keys.map_key(Key::ArrowLeft, Modifiers::COMMAND), review(ReviewEvent::Previous));
        assert_eq!(keys.map_key(Key::ArrowRight, Modifiers::COMMAND), review(ReviewEvent::Next));
        assert_eq!(
            keys.map_key(Key::Space, Modifiers::COMMAND | Modifiers::SHIFT),
            review(ReviewEvent::NextUnmarked)
        );
        assert_eq!(keys.map_key(Key::Space, Modifiers::COMMAND), Some(KeyAction::ToggleTrialList));
        assert_eq!(keys.map_key(Key::P, Modifiers::COMMAND), Some(KeyAction::GeneratePlots));
        assert_eq!(keys.map_key(Key::Q, Modifiers::COMMAND), review(ReviewEvent::Quit));
        assert_eq!(keys.map_key(Key::Enter, Modifiers::COMMAND), None);
    }

    #[test]
    fn test_bindings_follow_config() {
        let mut config = AppConfig::default();
        config.seek_seconds = 2.0;
        config.jump_frames = 30;
        let keys = KeyBindings::new(&config);
        assert_eq!(keys.map_key(Key::ArrowRight, Modifiers::NONE), review(ReviewEvent::Seek(2.0)));
        assert_eq!(keys.map_key(Key::ArrowLeft, Modifiers::SHIFT), review(ReviewEvent::JumpFrames(-30)));
    }

    #[test]
    fn test_only_navigation_repeats() {
        assert!(KeyAction::Review(ReviewEvent::StepFrames(1)).repeats());
        assert!(!KeyAction::Review(ReviewEvent::MarkAndAdvance).repeats());
        assert!(!KeyAction::GeneratePlots.repeats());
        assert!(!KeyAction::ToggleTrialList.repeats());
    }
}
