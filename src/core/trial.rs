use crate::core::DiscoveryError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const VIDEO_EXTENSIONS: [&str; 4] = ["avi", "mp4", "mov", "mkv"];

/// Group used for trials that live directly in the input root.
pub const ROOT_GROUP: &str = ".";

/// Group used in results for marks without a matching video.
pub const UNKNOWN_GROUP: &str = "unknown";

/// One video file subject to annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trial {
    pub id: String,
    /// Path relative to the input root, always `/`-separated.
    pub relative_path: String,
    pub group: String,
    pub path: PathBuf,
}

impl Trial {
    pub fn from_path(root: &Path, path: &Path) -> Option<Self> {
        let id = path.file_stem()?.to_str()?.to_string();
        let relative = path.strip_prefix(root).ok()?;
        let relative_path = to_slash_path(relative);
        let group = group_of(&relative_path);

        Some(Trial {
            id,
            relative_path,
            group,
            path: path.to_path_buf(),
        })
    }
}

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Parent directory chain of a relative path, e.g. "349/hab/a.mp4" -> "349/hab".
pub fn group_of(relative_path: &str) -> String {
    match relative_path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => ROOT_GROUP.to_string(),
    }
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks `root` recursively and returns every video as a trial, sorted by relative path.
pub fn discover_trials(root: &Path) -> Result<Vec<Trial>, DiscoveryError> {
    if !root.is_dir() {
        return Err(DiscoveryError::RootMissing(root.to_path_buf()));
    }

    let mut trials = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| DiscoveryError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() || !is_video_file(entry.path()) {
            continue;
        }
        match Trial::from_path(root, entry.path()) {
            Some(trial) => trials.push(trial),
            None => log::warn!("Skipping video with unusable name: {}", entry.path().display()),
        }
    }

    if trials.is_empty() {
        return Err(DiscoveryError::NoVideos(root.to_path_buf()));
    }

    trials.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    let mut seen: HashMap<&str, &Trial> = HashMap::new();
    for trial in &trials {
        if let Some(previous) = seen.insert(trial.id.as_str(), trial) {
            return Err(DiscoveryError::DuplicateTrial {
                trial: trial.id.clone(),
                first: previous.relative_path.clone(),
                second: trial.relative_path.clone(),
            });
        }
    }

    log::info!("Discovered {} videos in {}", trials.len(), root.display());
    Ok(trials)
}

pub fn build_lookup(trials: &[Trial]) -> HashMap<String, Trial> {
    trials.iter().map(|t| (t.id.clone(), t.clone())).collect()
}
