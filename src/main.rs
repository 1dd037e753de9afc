mod cli;
mod core;
mod gui;
mod hotkeys;
mod review;
mod video;

use crate::cli::{Cli, Command, MergeArgs, PlotsArgs, ReviewArgs};
use crate::core::{discover_trials, AppConfig, DiscoveryError, SessionStore, Trial};
use crate::gui::ReviewApp;
use crate::review::{ReviewOptions, Reviewer};
use crate::video::{render_summary, FfmpegPlayer};
use anyhow::Context;
use clap::Parser;
use std::io::Write;
use std::path::{Path, PathBuf};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Command::Review(args) => run_review(args),
        Command::Merge(args) => run_merge(args),
        Command::Plots(args) => run_plots(args),
    }
}

fn init_logging(debug: bool) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if debug {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn run_review(args: ReviewArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::load()?;

    let (mut store, video_root, trials) = match &args.continue_session {
        Some(session_dir) => {
            let store = SessionStore::open(session_dir)?;
            let video_root = match args.video_folder() {
                Some(folder) => folder.to_path_buf(),
                None => store
                    .input_folder()
                    .map(Path::to_path_buf)
                    .context("Session has no stored input folder; pass the video folder")?,
            };
            let trials = discover_trials(&video_root)?;
            (store, video_root, trials)
        }
        None => {
            let name = args.name.as_deref().context("--name is required for a new session")?;
            let session_dir = PathBuf::from(name);

            if args.clean && session_dir.exists() {
                if !args.yes && !confirm(&format!("Delete {} and all its marks?", session_dir.display()))? {
                    println!("Aborted");
                    return Ok(());
                }
                std::fs::remove_dir_all(&session_dir)
                    .with_context(|| format!("Failed to delete {}", session_dir.display()))?;
                log::info!("Removed existing session {}", session_dir.display());
            }

            let video_root = match args.video_folder() {
                Some(folder) => folder.to_path_buf(),
                None => pick_video_folder(&config).context("No video folder selected")?,
            };

            // Fail on an empty or ambiguous tree before creating anything on disk
            let trials = discover_trials(&video_root)?;

            let store = SessionStore::create(&session_dir, &video_root, !args.show_trial_info, &args.description)?;
            config.last_input_directory = Some(video_root.clone());
            if let Err(e) = config.save() {
                log::warn!("Failed to save config: {}", e);
            }
            (store, video_root, trials)
        }
    };

    let trials = store.ordered_trials(&trials, &mut rand::rng())?;

    let options = ReviewOptions {
        skip_marked: args.skip_marked,
        show_trial_info: args.show_trial_info,
        fps_override: args.fps,
    };
    let player = FfmpegPlayer::new(&config);
    let reviewer = Reviewer::new(store, trials, player, options)?;

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("Frame Reviewer"),
        ..Default::default()
    };

    eframe::run_native(
        "Frame Reviewer",
        native_options,
        Box::new(move |cc| Ok(Box::new(ReviewApp::new(cc, config, reviewer, video_root)))),
    )
    .map_err(|e| anyhow::anyhow!("Failed to run app: {}", e))?;

    Ok(())
}

fn run_merge(args: MergeArgs) -> anyhow::Result<()> {
    let store = SessionStore::open(&args.output_folder)?;
    let trials = match resolve_video_root(&store, args.video_folder) {
        Some(root) => discover_or_empty(&root)?,
        None => {
            log::warn!("No video folder known; relative paths and groups will be empty");
            Vec::new()
        }
    };

    let summary = store.merge(&trials)?;
    println!("Wrote {} rows to {}", summary.rows, summary.path.display());
    if !summary.unmatched.is_empty() {
        println!(
            "{} marks have no matching video: {}",
            summary.unmatched.len(),
            summary.unmatched.join(", ")
        );
    }
    Ok(())
}

fn run_plots(args: PlotsArgs) -> anyhow::Result<()> {
    let store = SessionStore::open(&args.output_folder)?;
    let video_root = resolve_video_root(&store, args.video_folder)
        .context("No video folder known for this session; pass --video-folder")?;

    println!("Rendering {} marked trials from {}", store.mark_count()?, store.dir().display());
    let report = render_summary(store.dir(), &video_root, args.frames_before, args.frames_after)?;
    for path in &report.written {
        println!("Created {}", path.display());
    }
    for skipped in &report.skipped {
        println!("Skipped {}: {}", skipped.trial, skipped.reason);
    }
    for path in &report.empty {
        println!("Nothing to render for {}", path.display());
    }
    println!(
        "{} images written, {} trials skipped",
        report.written.len(),
        report.skipped.len()
    );
    Ok(())
}

fn resolve_video_root(store: &SessionStore, explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| store.input_folder().map(Path::to_path_buf))
}

fn discover_or_empty(root: &Path) -> anyhow::Result<Vec<Trial>> {
    match discover_trials(root) {
        Ok(trials) => Ok(trials),
        Err(DiscoveryError::NoVideos(_) | DiscoveryError::RootMissing(_)) => {
            log::warn!("No videos found under {}", root.display());
            Ok(Vec::new())
        }
        Err(e) => Err(e.into()),
    }
}

fn pick_video_folder(config: &AppConfig) -> Option<PathBuf> {
    let mut dialog = rfd::FileDialog::new().set_title("Select folder containing videos");
    if let Some(dir) = &config.last_input_directory {
        dialog = dialog.set_directory(dir);
    }
    dialog.pick_folder()
}

fn confirm(question: &str) -> anyhow::Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
