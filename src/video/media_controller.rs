use crate::core::{AppConfig, VideoError};
use crate::review::{frame_time, Player};
use crate::video::{VideoInfo, VideoProcessor};
use egui::{Context, TextureHandle};
use image::RgbaImage;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq)]
pub enum MediaControllerState {
    Unloaded,
    Ready,
    Playing,
    Paused,
    Error(String),
}

impl MediaControllerState {
    pub fn can_play(&self) -> bool {
        matches!(self, MediaControllerState::Ready | MediaControllerState::Paused)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, MediaControllerState::Playing)
    }

    pub fn can_seek(&self) -> bool {
        matches!(
            self,
            MediaControllerState::Ready | MediaControllerState::Playing | MediaControllerState::Paused
        )
    }

    pub fn display_text(&self) -> &str {
        match self {
            MediaControllerState::Unloaded => "No video loaded",
            MediaControllerState::Ready => "Ready",
            MediaControllerState::Playing => "Playing",
            MediaControllerState::Paused => "Paused",
            MediaControllerState::Error(msg) => msg,
        }
    }
}

enum DecodeCommand {
    Frame(FrameRequest),
    Shutdown,
}

#[derive(Debug, Clone)]
struct FrameRequest {
    generation: u64,
    path: PathBuf,
    frame: u64,
    fps: f64,
    max_width: u32,
}

struct DecodedFrame {
    generation: u64,
    frame: u64,
    image: Result<RgbaImage, VideoError>,
}

/// ffmpeg-backed [`Player`] for the review window.
///
/// Playback time is a wall clock scaled by the speed factor. The frame under
/// the playhead is decoded on a worker thread and cached as a texture.
pub struct FfmpegPlayer {
    command_sender: mpsc::Sender<DecodeCommand>,
    frame_receiver: mpsc::Receiver<DecodedFrame>,
    thread_handle: Option<JoinHandle<()>>,

    state: MediaControllerState,
    video_path: Option<PathBuf>,
    info: Option<VideoInfo>,
    position: f64,
    play_anchor: Option<(Instant, f64)>,
    speed: f64,
    fallback_frame_rate: f64,
    max_width: u32,

    // Bumped on every open so late frames from the previous video are dropped
    generation: u64,
    textures: LruCache<u64, TextureHandle>,
    pending: Option<u64>,
    displayed: Option<u64>,
    failed: Option<u64>,
}

impl FfmpegPlayer {
    pub fn new(config: &AppConfig) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::channel();

        let thread_handle = thread::spawn(move || {
            decode_thread(cmd_rx, frame_tx);
        });

        let capacity = NonZeroUsize::new(config.frame_cache_size).unwrap_or(NonZeroUsize::MIN);

        Self {
            command_sender: cmd_tx,
            frame_receiver: frame_rx,
            thread_handle: Some(thread_handle),
            state: MediaControllerState::Unloaded,
            video_path: None,
            info: None,
            position: 0.0,
            play_anchor: None,
            speed: 1.0,
            fallback_frame_rate: config.fallback_frame_rate,
            max_width: config.preview_max_width,
            generation: 0,
            textures: LruCache::new(capacity),
            pending: None,
            displayed: None,
            failed: None,
        }
    }

    pub fn state(&self) -> &MediaControllerState {
        &self.state
    }

    pub fn duration(&self) -> f64 {
        self.info.as_ref().map_or(0.0, |info| info.duration)
    }

    /// Texture for the most recently decoded frame near the playhead.
    pub fn texture(&mut self) -> Option<TextureHandle> {
        let frame = self.displayed?;
        self.textures.get(&frame).cloned()
    }

    /// Pulls decoded frames from the worker and requests the one under the
    /// playhead. Call once per repaint.
    pub fn update(&mut self, ctx: &Context) {
        if self.state == MediaControllerState::Playing && self.time() >= self.duration() {
            log::debug!("Reached end of video");
            self.pause();
            self.position = self.duration();
        }

        while let Ok(decoded) = self.frame_receiver.try_recv() {
            if decoded.generation != self.generation {
                continue;
            }
            if self.pending == Some(decoded.frame) {
                self.pending = None;
            }
            match decoded.image {
                Ok(image) => {
                    let size = [image.width() as usize, image.height() as usize];
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw());
                    let texture = ctx.load_texture(
                        format!("video_frame_{}", decoded.frame),
                        color_image,
                        egui::TextureOptions::LINEAR,
                    );
                    self.textures.put(decoded.frame, texture);
                    self.displayed = Some(decoded.frame);
                }
                Err(e) => {
                    log::warn!("Frame decode failed: {}", e);
                    self.failed = Some(decoded.frame);
                }
            }
        }

        if let Some(path) = self.video_path.clone() {
            let target = self.current_frame();
            if self.textures.contains(&target) {
                self.displayed = Some(target);
            } else if self.pending.is_none() && self.failed != Some(target) {
                self.request_frame(path, target);
            }
        }

        if self.state == MediaControllerState::Playing || self.pending.is_some() {
            ctx.request_repaint();
        }
    }

    fn request_frame(&mut self, path: PathBuf, frame: u64) {
        let request = FrameRequest {
            generation: self.generation,
            path,
            frame,
            fps: self.frame_rate(),
            max_width: self.max_width,
        };
        if self.command_sender.send(DecodeCommand::Frame(request)).is_ok() {
            self.pending = Some(frame);
        } else {
            log::error!("Frame decoder stopped");
        }
    }

    fn reanchor(&mut self) {
        if self.play_anchor.is_some() {
            self.play_anchor = Some((Instant::now(), self.position));
        }
    }
}

impl Player for FfmpegPlayer {
    fn open(&mut self, path: &Path) -> Result<(), VideoError> {
        self.generation += 1;
        self.textures.clear();
        self.pending = None;
        self.displayed = None;
        self.failed = None;
        self.play_anchor = None;
        self.position = 0.0;

        match VideoProcessor::probe(path) {
            Ok(info) => {
                log::info!(
                    "Opened {} ({:.2}s at {:.3} fps, {:?} frames)",
                    path.display(),
                    info.duration,
                    info.frame_rate,
                    info.frame_count
                );
                self.info = Some(info);
                self.video_path = Some(path.to_path_buf());
                self.state = MediaControllerState::Ready;
                Ok(())
            }
            Err(e) => {
                self.info = None;
                self.video_path = None;
                self.state = MediaControllerState::Error(e.to_string());
                Err(e)
            }
        }
    }

    fn play(&mut self) {
        if !self.state.can_play() {
            log::warn!("Cannot play in state: {:?}", self.state);
            return;
        }
        if self.position >= self.duration() {
            self.position = 0.0;
        }
        self.play_anchor = Some((Instant::now(), self.position));
        self.state = MediaControllerState::Playing;
    }

    fn pause(&mut self) {
        if !self.state.can_pause() {
            return;
        }
        // Stop on the frame the user is looking at, not on the clock
        self.position = self.shown_time();
        self.play_anchor = None;
        self.state = MediaControllerState::Paused;
    }

    fn is_playing(&self) -> bool {
        self.state == MediaControllerState::Playing
    }

    fn seek_to(&mut self, seconds: f64) {
        if !self.state.can_seek() {
            log::warn!("Cannot seek in state: {:?}", self.state);
            return;
        }
        self.position = seconds.clamp(0.0, self.duration());
        self.reanchor();
    }

    fn step_frames(&mut self, frames: i64) {
        let last = self.info.as_ref().map_or(0, |info| info.last_frame()) as i64;
        let target = (self.current_frame() as i64 + frames).clamp(0, last);
        self.seek_to(frame_time(target as u64, self.frame_rate()));
    }

    fn time(&self) -> f64 {
        match self.play_anchor {
            Some((started, from)) => {
                let elapsed = started.elapsed().as_secs_f64() * self.speed;
                (from + elapsed).min(self.duration())
            }
            None => self.position,
        }
    }

    fn shown_time(&self) -> f64 {
        match self.displayed {
            Some(frame) => frame_time(frame, self.frame_rate()),
            None => self.time(),
        }
    }

    fn frame_rate(&self) -> f64 {
        self.info
            .as_ref()
            .map_or(self.fallback_frame_rate, |info| info.frame_rate)
    }

    fn frame_count(&self) -> Option<u64> {
        self.info.as_ref().and_then(|info| info.frame_count)
    }

    fn set_speed(&mut self, speed: f64) {
        self.position = self.time();
        self.speed = speed;
        self.reanchor();
    }
}

fn decode_thread(cmd_rx: mpsc::Receiver<DecodeCommand>, frame_tx: mpsc::Sender<DecodedFrame>) {
    log::debug!("Frame decoder started");
    while let Ok(command) = cmd_rx.recv() {
        let mut request = match command {
            DecodeCommand::Frame(request) => request,
            DecodeCommand::Shutdown => break,
        };

        // Only the newest request matters
        let mut shutdown = false;
        while let Ok(newer) = cmd_rx.try_recv() {
            match newer {
                DecodeCommand::Frame(newer) => request = newer,
                DecodeCommand::Shutdown => shutdown = true,
            }
        }
        if shutdown {
            break;
        }

        let image =
            VideoProcessor::extract_frame(&request.path, request.frame, request.fps, Some(request.max_width));
        let decoded = DecodedFrame {
            generation: request.generation,
            frame: request.frame,
            image,
        };
        if frame_tx.send(decoded).is_err() {
            break;
        }
    }
    log::debug!("Frame decoder stopped");
}

impl Drop for FfmpegPlayer {
    fn drop(&mut self) {
        let _ = self.command_sender.send(DecodeCommand::Shutdown);

        if let Some(handle) = self.thread_handle.take() {
            // An ffmpeg call may still be running; wait briefly
            for _ in 0..10 {
                if handle.is_finished() {
                    let _ = handle.join();
                    return;
                }
                thread::sleep(Duration::from_millis(50));
            }
            log::warn!("Frame decoder did not shut down cleanly");
        }
    }
}
