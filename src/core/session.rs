use crate::core::{MergeSummary, SessionError, Trial};
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const README_FILE: &str = "README.md";
pub const PER_TRIAL_DIR: &str = "per_trial";
pub const RESULTS_FILE: &str = "results.csv";
pub const SUMMARY_DIR: &str = "summary_plots";

/// The annotated frame for one trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// 0-indexed frame number.
    Frame(u64),
    /// The reviewer declared that no frame applies.
    NoFrame,
}

impl Mark {
    /// Parses the contents of a per-trial file. `None` means the file is corrupt.
    pub fn parse(contents: &str) -> Option<Mark> {
        let trimmed = contents.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Some(Mark::NoFrame);
        }
        trimmed.parse::<u64>().ok().map(Mark::Frame)
    }

    pub fn frame(&self) -> Option<u64> {
        match self {
            Mark::Frame(frame) => Some(*frame),
            Mark::NoFrame => None,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::Frame(frame) => write!(f, "{}", frame),
            Mark::NoFrame => write!(f, "NaN"),
        }
    }
}

/// Persisted as `config.json` inside the session folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub input_folder: Option<PathBuf>,
    #[serde(default = "default_blind_mode")]
    pub blind_mode: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Trial relative paths in review order.
    #[serde(default)]
    pub video_order: Vec<String>,
    #[serde(default)]
    pub position: usize,
}

fn default_blind_mode() -> bool {
    true
}

/// A raw per-trial file as found on disk.
#[derive(Debug, Clone)]
pub struct MarkFile {
    pub trial: String,
    pub mark: Option<Mark>,
    pub modified: Option<DateTime<Utc>>,
}

pub struct SessionStore {
    dir: PathBuf,
    config: SessionConfig,
}

impl SessionStore {
    /// Creates a brand new session folder. Fails if `dir` already exists.
    pub fn create(
        dir: &Path,
        input_folder: &Path,
        blind_mode: bool,
        description: &str,
    ) -> Result<Self, SessionError> {
        if dir.exists() {
            return Err(SessionError::AlreadyExists(dir.to_path_buf()));
        }

        let per_trial = dir.join(PER_TRIAL_DIR);
        std::fs::create_dir_all(&per_trial).map_err(|e| SessionError::io(&per_trial, e))?;

        let store = SessionStore {
            dir: dir.to_path_buf(),
            config: SessionConfig {
                input_folder: Some(input_folder.to_path_buf()),
                blind_mode,
                description: description.to_string(),
                created_at: Some(Utc::now()),
                video_order: Vec::new(),
                position: 0,
            },
        };
        store.save_config()?;
        store.write_readme()?;

        log::info!("Created session '{}' at {}", store.name(), dir.display());
        Ok(store)
    }

    /// Reopens an existing session folder.
    pub fn open(dir: &Path) -> Result<Self, SessionError> {
        if !dir.is_dir() {
            return Err(SessionError::NotFound(dir.to_path_buf()));
        }

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(SessionError::ConfigMissing(dir.to_path_buf()));
        }
        let content =
            std::fs::read_to_string(&config_path).map_err(|e| SessionError::io(&config_path, e))?;
        let config: SessionConfig =
            serde_json::from_str(&content).map_err(|source| SessionError::ConfigUnreadable {
                path: config_path.clone(),
                source,
            })?;

        let store = SessionStore {
            dir: dir.to_path_buf(),
            config,
        };

        let per_trial = store.per_trial_dir();
        std::fs::create_dir_all(&per_trial).map_err(|e| SessionError::io(&per_trial, e))?;
        if !dir.join(README_FILE).exists() {
            store.write_readme()?;
        }

        log::info!(
            "Loaded session '{}' ({} trials in stored order, position {})",
            store.name(),
            store.config.video_order.len(),
            store.config.position
        );
        Ok(store)
    }

    /// Session name, used as the scorer column in results.
    pub fn name(&self) -> String {
        session_name(&self.dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn input_folder(&self) -> Option<&Path> {
        self.config.input_folder.as_deref()
    }

    pub fn blind_mode(&self) -> bool {
        self.config.blind_mode
    }

    pub fn position(&self) -> usize {
        self.config.position
    }

    pub fn per_trial_dir(&self) -> PathBuf {
        self.dir.join(PER_TRIAL_DIR)
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    pub fn summary_dir(&self) -> PathBuf {
        self.dir.join(SUMMARY_DIR)
    }

    pub fn mark_path(&self, trial: &str) -> Result<PathBuf, SessionError> {
        if trial.is_empty()
            || trial == "."
            || trial == ".."
            || trial.contains('/')
            || trial.contains('\\')
        {
            return Err(SessionError::InvalidTrial(trial.to_string()));
        }
        Ok(self.per_trial_dir().join(format!("{}.txt", trial)))
    }

    /// Writes (or overwrites) the single mark file for `trial`.
    pub fn record_mark(&self, trial: &str, mark: Mark) -> Result<(), SessionError> {
        let path = self.mark_path(trial)?;
        std::fs::write(&path, mark.to_string()).map_err(|e| SessionError::io(&path, e))?;
        log::info!("Updating {} with frame {}", trial, mark);
        Ok(())
    }

    pub fn read_mark(&self, trial: &str) -> Result<Option<Mark>, SessionError> {
        let path = self.mark_path(trial)?;
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| SessionError::io(&path, e))?;
        match Mark::parse(&content) {
            Some(mark) => Ok(Some(mark)),
            None => {
                log::warn!("Ignoring unreadable mark file {}", path.display());
                Ok(None)
            }
        }
    }

    pub fn mark_files(&self) -> Result<Vec<MarkFile>, SessionError> {
        read_mark_files(&self.per_trial_dir())
    }

    /// All valid marks keyed by trial id.
    pub fn marks(&self) -> Result<BTreeMap<String, Mark>, SessionError> {
        Ok(self
            .mark_files()?
            .into_iter()
            .filter_map(|file| file.mark.map(|mark| (file.trial, mark)))
            .collect())
    }

    pub fn mark_count(&self) -> Result<usize, SessionError> {
        Ok(self.marks()?.len())
    }

    pub fn set_position(&mut self, position: usize) -> Result<(), SessionError> {
        if self.config.position != position {
            self.config.position = position;
            self.save_config()?;
        }
        Ok(())
    }

    pub fn set_order(&mut self, order: Vec<String>) -> Result<(), SessionError> {
        self.config.video_order = order;
        self.save_config()
    }

    /// Returns the trials in review order, creating or repairing the stored order.
    ///
    /// A fresh session gets a shuffled order. On resume, stored entries that no
    /// longer exist are dropped and newly found videos are appended.
    pub fn ordered_trials<R: Rng + ?Sized>(
        &mut self,
        trials: &[Trial],
        rng: &mut R,
    ) -> Result<Vec<Trial>, SessionError> {
        if self.config.video_order.is_empty() {
            let mut ordered = trials.to_vec();
            ordered.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
            ordered.shuffle(rng);
            self.set_order(ordered.iter().map(|t| t.relative_path.clone()).collect())?;
            return Ok(ordered);
        }

        let by_path: HashMap<&str, &Trial> =
            trials.iter().map(|t| (t.relative_path.as_str(), t)).collect();

        let mut ordered = Vec::with_capacity(trials.len());
        let mut changed = false;
        // Entries dropped ahead of the stored position shift it back
        let mut dropped_before = 0;
        for (index, stored) in self.config.video_order.iter().enumerate() {
            match by_path.get(stored.as_str()) {
                Some(trial) => ordered.push((*trial).clone()),
                None => {
                    log::warn!("Video from stored order not found: {}", stored);
                    if index < self.config.position {
                        dropped_before += 1;
                    }
                    changed = true;
                }
            }
        }

        let known: HashSet<String> = ordered.iter().map(|t| t.id.clone()).collect();
        for trial in trials {
            if !known.contains(&trial.id) {
                log::info!("Appending new video to session order: {}", trial.relative_path);
                ordered.push(trial.clone());
                changed = true;
            }
        }

        if changed {
            let position = self.config.position - dropped_before;
            if dropped_before > 0 {
                log::info!("Stored position moved from {} to {}", self.config.position, position);
            }
            self.config.position = position;
            self.set_order(ordered.iter().map(|t| t.relative_path.clone()).collect())?;
        }
        Ok(ordered)
    }

    pub fn merge(&self, trials: &[Trial]) -> Result<MergeSummary, SessionError> {
        crate::core::merge_annotations(&self.dir, trials)
    }

    pub fn save_config(&self) -> Result<(), SessionError> {
        let path = self.dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(&self.config)?;
        std::fs::write(&path, content).map_err(|e| SessionError::io(&path, e))
    }

    fn write_readme(&self) -> Result<(), SessionError> {
        let description = if self.config.description.is_empty() {
            "No description provided."
        } else {
            self.config.description.as_str()
        };
        let input = self
            .config
            .input_folder
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let created = self
            .config
            .created_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());

        let content = format!(
            "# Video Frame Review Session: {}\n\n\
             ## Description\n{}\n\n\
             ## Configuration\n\
             - Input folder: {}\n\
             - Blind mode: {}\n\
             - Created: {}\n\n\
             ## Results\n\
             - Individual trial annotations: `{}/`\n\
             - Merged results: `{}`\n\
             - Summary plots: `{}/` (if generated)\n",
            self.name(),
            description,
            input,
            self.config.blind_mode,
            created,
            PER_TRIAL_DIR,
            RESULTS_FILE,
            SUMMARY_DIR,
        );

        let path = self.dir.join(README_FILE);
        std::fs::write(&path, content).map_err(|e| SessionError::io(&path, e))
    }
}

pub fn session_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

/// Reads every `*.txt` file in a per-trial folder, sorted by trial id.
pub fn read_mark_files(per_trial: &Path) -> Result<Vec<MarkFile>, SessionError> {
    if !per_trial.is_dir() {
        return Err(SessionError::MarksMissing(per_trial.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(per_trial).map_err(|e| SessionError::io(per_trial, e))? {
        let entry = entry.map_err(|e| SessionError::io(per_trial, e))?;
        let path = entry.path();
        if !path.is_file() || path.extension().map_or(true, |ext| ext != "txt") {
            continue;
        }
        let Some(trial) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let mark = match std::fs::read_to_string(&path) {
            Ok(content) => Mark::parse(&content),
            Err(e) => {
                log::warn!("Failed to read mark file {}: {}", path.display(), e);
                None
            }
        };
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);

        files.push(MarkFile {
            trial: trial.to_string(),
            mark,
            modified,
        });
    }

    files.sort_by(|a, b| a.trial.cmp(&b.trial));
    Ok(files)
}
