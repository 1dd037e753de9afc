use crate::core::session::{read_mark_files, session_name, PER_TRIAL_DIR, RESULTS_FILE};
use crate::core::{build_lookup, Mark, SessionError, Trial, UNKNOWN_GROUP};
use chrono::SecondsFormat;
use std::path::{Path, PathBuf};

pub const RESULT_COLUMNS: [&str; 6] = ["trial", "frame", "relative_path", "group", "scorer", "timestamp"];

/// One line of `results.csv`. Always derived from the per-trial files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub trial: String,
    pub mark: Option<Mark>,
    pub relative_path: String,
    pub group: String,
    pub scorer: String,
    pub timestamp: String,
}

impl ResultRow {
    fn fields(&self) -> [String; 6] {
        let frame = match self.mark {
            Some(Mark::Frame(frame)) => frame.to_string(),
            _ => String::new(),
        };
        [
            self.trial.clone(),
            frame,
            self.relative_path.clone(),
            self.group.clone(),
            self.scorer.clone(),
            self.timestamp.clone(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub path: PathBuf,
    pub rows: usize,
    /// Marks whose trial was not among the discovered videos.
    pub unmatched: Vec<String>,
}

/// Builds the result rows for a session folder without writing anything.
pub fn collect_rows(session_dir: &Path, trials: &[Trial]) -> Result<Vec<ResultRow>, SessionError> {
    let lookup = build_lookup(trials);
    let scorer = session_name(session_dir);

    let rows = read_mark_files(&session_dir.join(PER_TRIAL_DIR))?
        .into_iter()
        .map(|file| {
            let (relative_path, group) = match lookup.get(&file.trial) {
                Some(trial) => (trial.relative_path.clone(), trial.group.clone()),
                None => (String::new(), UNKNOWN_GROUP.to_string()),
            };
            ResultRow {
                trial: file.trial,
                mark: file.mark,
                relative_path,
                group,
                scorer: scorer.clone(),
                timestamp: file
                    .modified
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                    .unwrap_or_default(),
            }
        })
        .collect();
    Ok(rows)
}

/// Merges every per-trial mark into `results.csv`, overwriting any previous merge.
pub fn merge_annotations(session_dir: &Path, trials: &[Trial]) -> Result<MergeSummary, SessionError> {
    let mut rows = collect_rows(session_dir, trials)?;
    rows.sort_by(|a, b| a.trial.cmp(&b.trial));

    let unmatched = rows
        .iter()
        .filter(|row| row.relative_path.is_empty())
        .map(|row| row.trial.clone())
        .collect::<Vec<_>>();
    if !unmatched.is_empty() {
        log::warn!("{} marks have no matching video: {}", unmatched.len(), unmatched.join(", "));
    }

    let path = session_dir.join(RESULTS_FILE);
    std::fs::write(&path, render_csv(&rows)).map_err(|e| SessionError::io(&path, e))?;
    log::info!("Merged {} annotations to {}", rows.len(), path.display());

    Ok(MergeSummary {
        path,
        rows: rows.len(),
        unmatched,
    })
}

pub fn render_csv(rows: &[ResultRow]) -> String {
    let mut out = String::new();
    out.push_str(&RESULT_COLUMNS.join(","));
    out.push('\n');
    for row in rows {
        let fields = row.fields();
        let escaped: Vec<String> = fields.iter().map(|f| escape_field(f)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
