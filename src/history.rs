//! Move history for organizer runs, and undoing them.
//!
//! When history recording is enabled, every real organizer run that moves
//! files records the moves in a JSON file inside the organized directory.
//! Undo replays that log backwards.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// History file name inside an organized directory.
pub const HISTORY_FILE: &str = ".notetidy_history.json";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),
    #[error("No previous organization found in {}", .0.display())]
    NoHistory(PathBuf),
    #[error("Failed to write history file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read history file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid history file {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One file moved into a category folder.
///
/// Paths are relative to the organized directory, so a log stays valid
/// whatever the working directory of the run that undoes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    pub category: String,
}

/// All moves of one organizer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveLog {
    /// RFC 3339 timestamp of the run.
    pub timestamp: String,
    pub directory: PathBuf,
    pub moves: Vec<MoveRecord>,
}

impl MoveLog {
    pub fn new(directory: PathBuf) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            directory,
            moves: Vec::new(),
        }
    }

    pub fn add(&mut self, record: MoveRecord) {
        self.moves.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn path(directory: &Path) -> PathBuf {
        directory.join(HISTORY_FILE)
    }

    /// Writes the log, replacing any earlier one.
    pub fn save(&self, directory: &Path) -> Result<(), HistoryError> {
        let path = Self::path(directory);
        let json = serde_json::to_string_pretty(self).map_err(|source| HistoryError::Invalid {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| HistoryError::Write { path, source })
    }

    /// Loads the log of the last run, `None` if there is none.
    pub fn load(directory: &Path) -> Result<Option<Self>, HistoryError> {
        let path = Self::path(directory);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path).map_err(|source| HistoryError::Read {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| HistoryError::Invalid { path, source })
    }

    pub fn delete(directory: &Path) -> Result<(), HistoryError> {
        let path = Self::path(directory);
        if path.exists() {
            fs::remove_file(&path).map_err(|source| HistoryError::Write { path, source })?;
        }
        Ok(())
    }
}

/// What an undo achieved.
#[derive(Debug, Default)]
pub struct UndoReport {
    pub restored: usize,
    /// Moved files that are gone now.
    pub skipped: Vec<(PathBuf, String)>,
    pub failed: Vec<(PathBuf, String)>,
}

impl UndoReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Moves the files of the last run in `directory` back where they were.
///
/// # Arguments
///
/// * `directory` - The organized directory holding the move log. Relative or
///   absolute; recorded paths are resolved against it.
///
/// # Returns
///
/// An [`UndoReport`] with what was restored, skipped and failed. Returns an
/// error if the directory does not exist or has no readable move log.
///
/// # Edge Cases Handled
///
/// * **Moves are reverted newest first**
/// * **File not found**: skipped, the file was moved or deleted since
/// * **Original location occupied**: a failure; nothing is overwritten
/// * **Emptied category folder**: removed
/// * **Partial undo**: the log is kept so the remaining moves can be retried
///
/// # Examples
///
/// ```no_run
/// use notetidy::history;
/// use std::path::Path;
///
/// let report = history::undo(Path::new("线性代数")).unwrap();
/// println!("restored {} notes", report.restored);
/// ```
pub fn undo(directory: &Path) -> Result<UndoReport, HistoryError> {
    if !directory.is_dir() {
        return Err(HistoryError::DirectoryNotFound(directory.to_path_buf()));
    }

    let log = MoveLog::load(directory)?
        .ok_or_else(|| HistoryError::NoHistory(directory.to_path_buf()))?;

    let mut report = UndoReport::default();
    for record in log.moves.iter().rev() {
        let new_path = directory.join(&record.new_path);
        let original_path = directory.join(&record.original_path);

        if !new_path.exists() {
            report
                .skipped
                .push((record.new_path.clone(), "file not found".to_string()));
            continue;
        }
        if original_path.exists() {
            report.failed.push((
                record.new_path.clone(),
                format!("{} already exists", record.original_path.display()),
            ));
            continue;
        }

        match fs::rename(&new_path, &original_path) {
            Ok(()) => {
                report.restored += 1;
                if let Some(folder) = new_path.parent() {
                    // Fails while the folder still has other files.
                    let _ = fs::remove_dir(folder);
                }
            }
            Err(e) => report.failed.push((record.new_path.clone(), e.to_string())),
        }
    }

    if report.is_complete_success()
        && let Err(e) = MoveLog::delete(directory)
    {
        tracing::warn!(error = %e, "could not delete history file");
    }

    Ok(report)
}
