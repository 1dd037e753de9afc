use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User preferences shared by every session, stored next to other app configs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Seconds moved by Left/Right.
    #[serde(default = "default_seek_seconds")]
    pub seek_seconds: f64,
    /// Frames moved by Shift+Left/Right.
    #[serde(default = "default_jump_frames")]
    pub jump_frames: i64,
    #[serde(default = "default_frames_around")]
    pub frames_before: u32,
    #[serde(default = "default_frames_around")]
    pub frames_after: u32,
    /// Decoded preview frames kept per video.
    #[serde(default = "default_frame_cache_size")]
    pub frame_cache_size: usize,
    /// Preview frames are scaled down to this width.
    #[serde(default = "default_preview_width")]
    pub preview_max_width: u32,
    /// Used when ffprobe reports no usable frame rate.
    #[serde(default = "default_frame_rate")]
    pub fallback_frame_rate: f64,
    #[serde(default)]
    pub last_input_directory: Option<PathBuf>,
}

fn default_seek_seconds() -> f64 {
    5.0
}

fn default_jump_frames() -> i64 {
    15
}

fn default_frames_around() -> u32 {
    3
}

fn default_frame_cache_size() -> usize {
    64
}

fn default_preview_width() -> u32 {
    1280
}

fn default_frame_rate() -> f64 {
    30.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            seek_seconds: default_seek_seconds(),
            jump_frames: default_jump_frames(),
            frames_before: default_frames_around(),
            frames_after: default_frames_around(),
            frame_cache_size: default_frame_cache_size(),
            preview_max_width: default_preview_width(),
            fallback_frame_rate: default_frame_rate(),
            last_input_directory: None,
        }
    }
}

impl AppConfig {
    /// Loads the user config, writing defaults when the file is missing or corrupt.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            log::info!("No preferences at {}, using defaults", path.display());
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read preferences from {}", path.display()))?;
        match serde_json::from_str::<Self>(&content) {
            Ok(config) => {
                log::debug!("Loaded preferences from {}", path.display());
                Ok(config.sanitized())
            }
            Err(e) => {
                log::warn!("Preferences at {} are unreadable ({}), resetting to defaults", path.display(), e);
                let config = Self::default();
                config.save_to(path)?;
                Ok(config)
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write preferences to {}", path.display()))
    }

    fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("frame-reviewer")
            .join("config.json")
    }

    /// Replaces nonsensical values (hand-edited files) with defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if !(self.seek_seconds.is_finite() && self.seek_seconds > 0.0) {
            self.seek_seconds = defaults.seek_seconds;
        }
        if self.jump_frames <= 0 {
            self.jump_frames = defaults.jump_frames;
        }
        if self.frame_cache_size == 0 {
            self.frame_cache_size = defaults.frame_cache_size;
        }
        if self.preview_max_width < 64 {
            self.preview_max_width = defaults.preview_max_width;
        }
        if !(self.fallback_frame_rate.is_finite() && self.fallback_frame_rate > 0.0) {
            self.fallback_frame_rate = defaults.fallback_frame_rate;
        }
        self
    }
}
