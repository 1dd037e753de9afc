use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Video folder not found: {0}")]
    RootMissing(PathBuf),
    #[error("No videos found in {0}")]
    NoVideos(PathBuf),
    #[error("Duplicate trial '{trial}': {first} and {second}")]
    DuplicateTrial {
        trial: String,
        first: String,
        second: String,
    },
    #[error("Failed to scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session folder already exists: {0}")]
    AlreadyExists(PathBuf),
    #[error("Session folder not found: {0}")]
    NotFound(PathBuf),
    #[error("config.json not found in {0}")]
    ConfigMissing(PathBuf),
    #[error("config.json in {path} is unreadable: {source}")]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("per_trial directory not found: {0}")]
    MarksMissing(PathBuf),
    #[error("Invalid trial name: {0:?}")]
    InvalidTrial(String),
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize session config: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl SessionError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("Video file does not exist: {0}")]
    Missing(PathBuf),
    #[error("Failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} failed on {path}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        path: PathBuf,
        stderr: String,
    },
    #[error("Could not read video info for {path}: {reason}")]
    Probe { path: PathBuf, reason: String },
    #[error("Could not decode frame {frame} of {path}: {reason}")]
    Decode {
        path: PathBuf,
        frame: u64,
        reason: String,
    },
}
