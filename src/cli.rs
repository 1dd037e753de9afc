use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Mark one frame per video across a folder of videos.
#[derive(Debug, Parser)]
#[command(name = "frame-reviewer", version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Review videos and mark one frame each
    Review(ReviewArgs),
    /// Merge per-trial marks into results.csv
    Merge(MergeArgs),
    /// Render montage images of the marked frames
    Plots(PlotsArgs),
}

#[derive(Debug, Args)]
pub struct ReviewArgs {
    /// Folder containing the videos (a folder picker opens if omitted)
    pub folder: Option<PathBuf>,

    /// Same as FOLDER
    #[arg(long = "input-folder", visible_alias = "input", conflicts_with = "folder")]
    pub input_folder: Option<PathBuf>,

    /// Name of the session folder to create
    #[arg(long, required_unless_present = "continue_session")]
    pub name: Option<String>,

    /// Free-text description stored with the session
    #[arg(long, default_value = "")]
    pub description: String,

    /// Show video path and group while reviewing
    #[arg(long)]
    pub show_trial_info: bool,

    /// Continue an existing session folder
    #[arg(long = "continue", value_name = "SESSION")]
    pub continue_session: Option<PathBuf>,

    /// Start at the first trial without a mark
    #[arg(long)]
    pub skip_marked: bool,

    /// Delete the session folder before starting
    #[arg(long, conflicts_with = "continue_session")]
    pub clean: bool,

    /// Do not ask for confirmation with --clean
    #[arg(long)]
    pub yes: bool,

    /// Compute frame numbers with this frame rate instead of the video's
    #[arg(long, value_parser = parse_fps)]
    pub fps: Option<f64>,
}

impl ReviewArgs {
    pub fn video_folder(&self) -> Option<&Path> {
        self.input_folder.as_deref().or(self.folder.as_deref())
    }
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Session folder containing per_trial/
    pub output_folder: PathBuf,

    /// Video folder used to fill in paths and groups (defaults to the session's)
    #[arg(long)]
    pub video_folder: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct PlotsArgs {
    /// Session folder containing per_trial/
    pub output_folder: PathBuf,

    /// Video folder to read frames from (defaults to the session's)
    #[arg(long)]
    pub video_folder: Option<PathBuf>,

    /// Frames shown before the marked frame
    #[arg(long, default_value_t = 3)]
    pub frames_before: u32,

    /// Frames shown after the marked frame
    #[arg(long, default_value_t = 3)]
    pub frames_after: u32,
}

fn parse_fps(value: &str) -> Result<f64, String> {
    let fps: f64 = value.parse().map_err(|_| format!("'{}' is not a number", value))?;
    if fps.is_finite() && fps > 0.0 {
        Ok(fps)
    } else {
        Err("frame rate must be positive".to_string())
    }
}
