//! Montage images of the marked frames, one PNG per group.

use crate::core::session::{read_mark_files, PER_TRIAL_DIR, SUMMARY_DIR};
use crate::core::{build_lookup, discover_trials, DiscoveryError, Mark, VideoError, ROOT_GROUP, UNKNOWN_GROUP};
use crate::video::{VideoInfo, VideoProcessor};
use anyhow::Context;
use image::{imageops, Rgba, RgbaImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const ALL_TRIALS_FILE: &str = "all_trials.png";

const CELL_MAX_WIDTH: u32 = 320;
const PADDING: u32 = 6;
const BORDER: u32 = 4;
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);
const HIGHLIGHT: Rgba<u8> = Rgba([220, 20, 20, 255]);

/// One frame column in a trial's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub frame: u64,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTrial {
    pub trial: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RenderReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<SkippedTrial>,
    /// Output images that had no renderable rows and were not written.
    pub empty: Vec<PathBuf>,
}

/// Where montage frames come from.
pub trait FrameSource {
    fn probe(&self, video: &Path) -> Result<VideoInfo, VideoError>;
    fn frame(&self, video: &Path, frame: u64, fps: f64) -> Result<RgbaImage, VideoError>;
}

/// Frames decoded with ffprobe/ffmpeg, scaled down to montage cells.
pub struct FfmpegFrames;

impl FrameSource for FfmpegFrames {
    fn probe(&self, video: &Path) -> Result<VideoInfo, VideoError> {
        VideoProcessor::probe(video)
    }

    fn frame(&self, video: &Path, frame: u64, fps: f64) -> Result<RgbaImage, VideoError> {
        VideoProcessor::extract_frame(video, frame, fps, Some(CELL_MAX_WIDTH))
    }
}

struct PlannedRow {
    trial: String,
    mark: Mark,
    video: Option<PathBuf>,
}

/// Renders every group of marked trials in `session_dir` against the videos in `video_root`.
pub fn render_summary(
    session_dir: &Path,
    video_root: &Path,
    frames_before: u32,
    frames_after: u32,
) -> anyhow::Result<RenderReport> {
    render_summary_with(&FfmpegFrames, session_dir, video_root, frames_before, frames_after)
}

pub fn render_summary_with(
    source: &impl FrameSource,
    session_dir: &Path,
    video_root: &Path,
    frames_before: u32,
    frames_after: u32,
) -> anyhow::Result<RenderReport> {
    let marks = read_mark_files(&session_dir.join(PER_TRIAL_DIR))?;
    let trials = match discover_trials(video_root) {
        Ok(trials) => trials,
        Err(DiscoveryError::NoVideos(_) | DiscoveryError::RootMissing(_)) => {
            log::warn!("No videos found under {}", video_root.display());
            Vec::new()
        }
        Err(e) => return Err(e).context("Failed to scan video folder"),
    };
    let lookup = build_lookup(&trials);
    let summary_dir = session_dir.join(SUMMARY_DIR);

    let mut report = RenderReport::default();
    let mut plans: BTreeMap<PathBuf, Vec<PlannedRow>> = BTreeMap::new();
    for file in marks {
        let Some(mark) = file.mark else {
            report.skipped.push(SkippedTrial {
                trial: file.trial,
                reason: "unreadable mark file".to_string(),
            });
            continue;
        };
        let trial = lookup.get(&file.trial);
        let group = trial.map_or(UNKNOWN_GROUP, |t| t.group.as_str());
        plans
            .entry(output_path(&summary_dir, group))
            .or_default()
            .push(PlannedRow {
                trial: file.trial,
                mark,
                video: trial.map(|t| t.path.clone()),
            });
    }

    for (path, rows) in plans {
        let mut images = Vec::with_capacity(rows.len());
        for row in &rows {
            match render_row(source, row, frames_before, frames_after) {
                Ok(cells) => images.push(cells),
                Err(e) => {
                    log::warn!("Skipping {} in summary: {}", row.trial, e);
                    report.skipped.push(SkippedTrial {
                        trial: row.trial.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if images.is_empty() {
            log::warn!("No renderable trials for {}", path.display());
            report.empty.push(path);
            continue;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        compose_grid(&images)
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Created plot: {} ({} trials)", path.display(), images.len());
        report.written.push(path);
    }

    Ok(report)
}

fn render_row(
    source: &impl FrameSource,
    row: &PlannedRow,
    frames_before: u32,
    frames_after: u32,
) -> Result<Vec<(RgbaImage, bool)>, VideoError> {
    let video = row
        .video
        .as_ref()
        .ok_or_else(|| VideoError::Missing(PathBuf::from(&row.trial)))?;
    let info = source.probe(video)?;

    column_frames(row.mark, frames_before, frames_after, info.last_frame())
        .into_iter()
        .map(|column| {
            source
                .frame(video, column.frame, info.frame_rate)
                .map(|image| (image, column.highlighted))
        })
        .collect()
}

/// Frames shown for one trial.
///
/// A marked trial shows `before` frames, the mark, then `after` frames, each
/// clamped into the video. A trial marked as having no frame shows the same
/// number of frames spread evenly over the video, none highlighted.
pub fn column_frames(mark: Mark, before: u32, after: u32, last_frame: u64) -> Vec<Column> {
    let count = before as u64 + after as u64 + 1;
    match mark {
        Mark::Frame(marked) => {
            let marked = marked.min(last_frame) as i64;
            (-(before as i64)..=after as i64)
                .map(|offset| Column {
                    frame: (marked + offset).clamp(0, last_frame as i64) as u64,
                    highlighted: offset == 0,
                })
                .collect()
        }
        Mark::NoFrame => {
            let total = last_frame + 1;
            let step = if count > 1 { (total / (count - 1)).max(1) } else { total };
            (0..count)
                .map(|i| Column {
                    frame: (i * step).min(last_frame),
                    highlighted: false,
                })
                .collect()
        }
    }
}

/// `349/hab` -> `summary_plots/349/hab.png`; root and unknown groups share `all_trials.png`.
pub fn output_path(summary_dir: &Path, group: &str) -> PathBuf {
    let group = group.trim_matches('/');
    if group.is_empty() || group == ROOT_GROUP || group == UNKNOWN_GROUP {
        return summary_dir.join(ALL_TRIALS_FILE);
    }
    match group.rsplit_once('/') {
        Some((parent, leaf)) => summary_dir.join(parent).join(format!("{}.png", leaf)),
        None => summary_dir.join(format!("{}.png", group)),
    }
}

fn compose_grid(rows: &[Vec<(RgbaImage, bool)>]) -> RgbaImage {
    let cell_w = rows.iter().flatten().map(|(img, _)| img.width()).max().unwrap_or(1);
    let cell_h = rows.iter().flatten().map(|(img, _)| img.height()).max().unwrap_or(1);
    let cols = rows.iter().map(Vec::len).max().unwrap_or(1) as u32;
    let pitch_x = cell_w + PADDING;
    let pitch_y = cell_h + PADDING;

    let mut grid = RgbaImage::from_pixel(
        cols * pitch_x + PADDING,
        rows.len() as u32 * pitch_y + PADDING,
        BACKGROUND,
    );

    for (r, row) in rows.iter().enumerate() {
        for (c, (cell, highlighted)) in row.iter().enumerate() {
            let x = PADDING + c as u32 * pitch_x;
            let y = PADDING + r as u32 * pitch_y;
            imageops::overlay(&mut grid, cell, x as i64, y as i64);
            if *highlighted {
                draw_border(&mut grid, x, y, cell.width(), cell.height());
            }
        }
    }
    grid
}

fn draw_border(image: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32) {
    let right = (x + width).min(image.width());
    let bottom = (y + height).min(image.height());
    for py in y..bottom {
        for px in x..right {
            let edge = px < x + BORDER || px + BORDER >= right || py < y + BORDER || py + BORDER >= bottom;
            if edge {
                image.put_pixel(px, py, HIGHLIGHT);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionStore;

    fn frames(columns: &[Column]) -> Vec<u64> {
        columns.iter().map(|c| c.frame).collect()
    }

    #[test]
    fn test_columns_around_mark() {
        let columns = column_frames(Mark::Frame(100), 3, 3, 500);
        assert_eq!(frames(&columns), vec![97, 98, 99, 100, 101, 102, 103]);
        let highlighted: Vec<_> = columns.iter().filter(|c| c.highlighted).map(|c| c.frame).collect();
        assert_eq!(highlighted, vec![100]);
    }

    #[test]
    fn test_columns_clamp_at_video_edges() {
        assert_eq!(frames(&column_frames(Mark::Frame(1), 3, 3, 500)), vec![0, 0, 0, 1, 2, 3, 4]);
        assert_eq!(frames(&column_frames(Mark::Frame(9), 2, 2, 10)), vec![7, 8, 9, 10, 10]);
        assert_eq!(frames(&column_frames(Mark::Frame(50), 1, 1, 10)), vec![9, 10, 10]);
    }

    #[test]
    fn test_no_frame_spreads_columns() {
        let columns = column_frames(Mark::NoFrame, 3, 3, 59);
        assert_eq!(frames(&columns), vec![0, 10, 20, 30, 40, 50, 59]);
        assert!(columns.iter().all(|c| !c.highlighted));

        assert_eq!(frames(&column_frames(Mark::NoFrame, 1, 1, 0)), vec![0, 0, 0]);
    }

    #[test]
    fn test_output_paths_mirror_groups() {
        let dir = Path::new("/s/summary_plots");
        assert_eq!(output_path(dir, "349/hab"), dir.join("349").join("hab.png"));
        assert_eq!(output_path(dir, "a/b/c"), dir.join("a/b").join("c.png"));
        assert_eq!(output_path(dir, "349"), dir.join("349.png"));
        assert_eq!(output_path(dir, "."), dir.join(ALL_TRIALS_FILE));
        assert_eq!(output_path(dir, "unknown"), dir.join(ALL_TRIALS_FILE));
    }

    #[test]
    fn test_grid_highlights_marked_cell() {
        let cell = RgbaImage::from_pixel(20, 10, Rgba([0, 255, 0, 255]));
        let rows = vec![vec![(cell.clone(), false), (cell.clone(), true)]];
        let grid = compose_grid(&rows);

        assert_eq!(grid.width(), 2 * (20 + PADDING) + PADDING);
        assert_eq!(grid.height(), 10 + 2 * PADDING);
        assert_eq!(*grid.get_pixel(PADDING, PADDING), Rgba([0, 255, 0, 255]));
        let marked_x = PADDING + 20 + PADDING;
        assert_eq!(*grid.get_pixel(marked_x, PADDING), HIGHLIGHT);
        assert_eq!(*grid.get_pixel(marked_x + 10, PADDING + 5), Rgba([0, 255, 0, 255]));
    }

    /// Solid 20x10 cells whose green channel is the frame number.
    struct SolidFrames {
        unreadable: &'static str,
    }

    impl FrameSource for SolidFrames {
        fn probe(&self, video: &Path) -> Result<VideoInfo, VideoError> {
            if video.file_stem().and_then(|s| s.to_str()) == Some(self.unreadable) {
                return Err(VideoError::Probe {
                    path: video.to_path_buf(),
                    reason: "corrupt header".to_string(),
                });
            }
            Ok(VideoInfo {
                duration: 10.0,
                frame_rate: 30.0,
                frame_count: Some(300),
                width: 20,
                height: 10,
            })
        }

        fn frame(&self, _video: &Path, frame: u64, _fps: f64) -> Result<RgbaImage, VideoError> {
            Ok(RgbaImage::from_pixel(20, 10, cell_color(frame)))
        }
    }

    fn cell_color(frame: u64) -> Rgba<u8> {
        Rgba([0, frame as u8, 255, 255])
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_group_keeps_rows_that_render() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        touch(&videos.join("349/hab/good.mp4"));
        touch(&videos.join("349/hab/bad.mp4"));
        let store = SessionStore::create(&tmp.path().join("s"), &videos, true, "").unwrap();
        store.record_mark("good", Mark::Frame(100)).unwrap();
        store.record_mark("bad", Mark::Frame(50)).unwrap();

        let source = SolidFrames { unreadable: "bad" };
        let report = render_summary_with(&source, store.dir(), &videos, 3, 3).unwrap();

        let path = store.summary_dir().join("349").join("hab.png");
        assert_eq!(report.written, vec![path.clone()]);
        assert!(report.empty.is_empty());
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.trial.as_str()).collect();
        assert_eq!(skipped, vec!["bad"]);

        let montage = image::open(&path).unwrap().to_rgba8();
        assert_eq!(montage.height(), 10 + 2 * PADDING);
        assert_eq!(montage.width(), 7 * (20 + PADDING) + PADDING);

        let cell_x = |column: u32| PADDING + column * (20 + PADDING);
        assert_eq!(*montage.get_pixel(cell_x(0) + 10, PADDING + 5), cell_color(97));
        assert_eq!(*montage.get_pixel(cell_x(6) + 10, PADDING + 5), cell_color(103));
        assert_eq!(*montage.get_pixel(cell_x(3), PADDING), HIGHLIGHT);
        assert_eq!(*montage.get_pixel(cell_x(3) + 10, PADDING + 5), cell_color(100));
        assert_ne!(*montage.get_pixel(cell_x(2), PADDING), HIGHLIGHT);
    }

    #[test]
    fn test_missing_video_folder_skips_every_trial() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        let store = SessionStore::create(&tmp.path().join("s"), &videos, true, "").unwrap();
        store.record_mark("a", Mark::Frame(3)).unwrap();
        store.record_mark("b", Mark::NoFrame).unwrap();

        let source = SolidFrames { unreadable: "" };
        let report = render_summary_with(&source, store.dir(), &tmp.path().join("moved"), 3, 3).unwrap();
        assert!(report.written.is_empty());
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.trial.as_str()).collect();
        assert_eq!(skipped, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_videos_are_skipped_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let videos = tmp.path().join("videos");
        std::fs::create_dir_all(&videos).unwrap();
        let store = SessionStore::create(&tmp.path().join("s"), &videos, true, "").unwrap();
        store.record_mark("gone", Mark::Frame(10)).unwrap();
        std::fs::write(store.per_trial_dir().join("broken.txt"), "not a number").unwrap();

        let report = render_summary(store.dir(), &videos, 3, 3).unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.empty, vec![store.summary_dir().join(ALL_TRIALS_FILE)]);
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.trial.as_str()).collect();
        assert_eq!(skipped, vec!["broken", "gone"]);
    }
}
