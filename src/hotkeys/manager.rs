use crate::core::AppConfig;
use crate::hotkeys::KeyAction;
use crate::review::ReviewEvent;
use egui::{Key, Modifiers};

/// Maps egui key presses in the review window to actions.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    seek_seconds: f64,
    jump_frames: i64,
}

impl KeyBindings {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            seek_seconds: config.seek_seconds,
            jump_frames: config.jump_frames,
        }
    }

    pub fn map_key(&self, key: Key, modifiers: Modifiers) -> Option<KeyAction> {
        let review = |event| Some(KeyAction::Review(event));

        if modifiers.command {
            return match key {
                Key::Space if modifiers.shift => review(ReviewEvent::NextUnmarked),
                Key::Space => Some(KeyAction::ToggleTrialList),
                Key::ArrowLeft => review(ReviewEvent::Previous),
                Key::ArrowRight => review(ReviewEvent::Next),
                Key::P => Some(KeyAction::GeneratePlots),
                Key::Q => review(ReviewEvent::Quit),
                _ => None,
            };
        }

        match key {
            Key::Space => review(ReviewEvent::TogglePlay),
            Key::Comma => review(ReviewEvent::StepFrames(-1)),
            Key::Period => review(ReviewEvent::StepFrames(1)),
            Key::ArrowLeft if modifiers.shift => review(ReviewEvent::JumpFrames(-self.jump_frames)),
            Key::ArrowRight if modifiers.shift => review(ReviewEvent::JumpFrames(self.jump_frames)),
            Key::ArrowLeft => review(ReviewEvent::Seek(-self.seek_seconds)),
            Key::ArrowRight => review(ReviewEvent::Seek(self.seek_seconds)),
            Key::OpenBracket => review(ReviewEvent::SpeedDown),
            Key::CloseBracket => review(ReviewEvent::SpeedUp),
            Key::Enter => review(ReviewEvent::MarkAndAdvance),
            Key::Escape => review(ReviewEvent::MarkNoFrame),
            _ => None,
        }
    }

    /// Drains this frame's key presses into actions, in the order they arrived.
    pub fn collect(&self, ctx: &egui::Context) -> Vec<KeyAction> {
        ctx.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key,
                        pressed: true,
                        repeat,
                        modifiers,
                        ..
                    } => self
                        .map_key(*key, *modifiers)
                        .filter(|action| !*repeat || action.repeats()),
                    _ => None,
                })
                .collect()
        })
    }
}
