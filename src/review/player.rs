use crate::core::VideoError;
use std::path::Path;

/// Playback capability the review loop drives.
///
/// Times are in seconds from the start of the video. Implementations clamp
/// seeks to the video duration.
pub trait Player {
    fn open(&mut self, path: &Path) -> Result<(), VideoError>;
    fn play(&mut self);
    fn pause(&mut self);
    fn is_playing(&self) -> bool;
    fn seek_to(&mut self, seconds: f64);
    fn step_frames(&mut self, frames: i64);
    fn time(&self) -> f64;
    fn frame_rate(&self) -> f64;
    /// Total frame count when the container reports one.
    fn frame_count(&self) -> Option<u64>;
    fn set_speed(&mut self, speed: f64);

    fn seek_by(&mut self, delta: f64) {
        let target = (self.time() + delta).max(0.0);
        self.seek_to(target);
    }

    /// Time of the frame actually on screen. Lags [`Player::time`] while
    /// playback runs ahead of decoding.
    fn shown_time(&self) -> f64 {
        self.time()
    }

    /// Frame index under the playhead.
    fn current_frame(&self) -> u64 {
        frame_index(self.time(), self.frame_rate(), self.frame_count())
    }
}

/// Nearest frame to `time`, clamped to the last frame when the count is known.
pub fn frame_index(time: f64, fps: f64, frame_count: Option<u64>) -> u64 {
    if !(time.is_finite() && fps.is_finite()) || time <= 0.0 || fps <= 0.0 {
        return 0;
    }
    let frame = (time * fps).round() as u64;
    match frame_count {
        Some(count) if count > 0 => frame.min(count - 1),
        _ => frame,
    }
}

/// Start time of a frame, the inverse of [`frame_index`].
pub fn frame_time(frame: u64, fps: f64) -> f64 {
    if fps > 0.0 {
        frame as f64 / fps
    } else {
        0.0
    }
}
