//! Sorting a folder of notes into topic subfolders.
//!
//! One run over a directory:
//! 1. list the Markdown files directly inside it, minus exclusions
//! 2. classify each by name into a bucket (destination folder)
//! 3. create the bucket folders and move the files (skipped in dry-run)
//! 4. save the move log, when history recording is enabled
//! 5. write the generated index (printed in dry-run)

use crate::classifier::{Classifier, strip_extension};
use crate::collector::{self, CollectError, ExclusionSet};
use crate::config::{ConfigError, OrganizeConfig};
use crate::history::{MoveLog, MoveRecord};
use crate::output::OutputFormatter;
use chrono::{DateTime, Local};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("Directory does not exist or is not a directory: {}", .0.display())]
    InvalidDirectory(PathBuf),
    #[error("Failed to read directory {}: {source}", .path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write index {}: {source}", .path.display())]
    WriteIndex {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Collect(#[from] CollectError),
}

/// Files assigned to one destination folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub description: String,
    /// File names, sorted.
    pub files: Vec<String>,
}

/// Destination folder name to bucket, ordered by folder name.
pub type CategoryBuckets = BTreeMap<String, Bucket>;

/// Total number of files across all buckets.
pub fn total_files(buckets: &CategoryBuckets) -> usize {
    buckets.values().map(|b| b.files.len()).sum()
}

/// Outcome of organizing one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    pub buckets: CategoryBuckets,
    pub created_folders: Vec<String>,
    pub moved: usize,
    /// File names that could not be moved, with the reason.
    pub failed_moves: Vec<(String, String)>,
    /// Path of the written index, `None` in dry-run or when nothing was found.
    pub index: Option<PathBuf>,
    /// Path of the saved move log, `None` unless history is recorded.
    pub history: Option<PathBuf>,
    pub dry_run: bool,
}

/// Organizes note directories according to an [`OrganizeConfig`].
pub struct Organizer {
    classifier: Classifier,
    exclusions: ExclusionSet,
    eligible: Regex,
    index_file: String,
    record_history: bool,
}

impl Organizer {
    pub fn new(config: &OrganizeConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            classifier: config.compile()?,
            exclusions: ExclusionSet::new(config.exclude.iter().cloned()),
            eligible: config.eligible_regex()?,
            index_file: config.index_file.clone(),
            record_history: config.record_history,
        })
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Whether a file or folder name must be left alone.
    pub fn should_exclude(&self, name: &str) -> bool {
        self.exclusions.matches(name)
    }

    /// Classifies the Markdown files directly inside `directory`.
    pub fn scan_directory(&self, directory: &Path) -> Result<CategoryBuckets, OrganizeError> {
        if !directory.is_dir() {
            return Err(OrganizeError::InvalidDirectory(directory.to_path_buf()));
        }
        let directory_name = dir_name(directory);

        let mut buckets = CategoryBuckets::new();
        for path in collector::list_markdown(directory, &self.exclusions)? {
            let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };

            let hit = self.classifier.classify(&file_name, &directory_name);
            buckets
                .entry(hit.folder.to_string())
                .or_insert_with(|| Bucket {
                    description: hit.description.to_string(),
                    files: Vec::new(),
                })
                .files
                .push(file_name);
        }

        for bucket in buckets.values_mut() {
            bucket.files.sort();
        }

        Ok(buckets)
    }

    /// Creates one folder per bucket, skipping existing ones.
    ///
    /// Returns the names of the folders that were created.
    pub fn create_subfolders(
        &self,
        directory: &Path,
        buckets: &CategoryBuckets,
    ) -> Result<Vec<String>, OrganizeError> {
        let mut created = Vec::new();
        for folder_name in buckets.keys() {
            let folder_path = directory.join(folder_name);
            if folder_path.exists() {
                continue;
            }
            fs::create_dir_all(&folder_path).map_err(|source| OrganizeError::CreateDir {
                path: folder_path.clone(),
                source,
            })?;
            OutputFormatter::success(&format!("Created folder: {}/", folder_name));
            created.push(folder_name.clone());
        }
        Ok(created)
    }

    /// Moves every bucketed file into its folder.
    ///
    /// Failures are reported and collected; remaining moves go ahead. An
    /// existing file at the destination is never overwritten.
    pub fn move_files(
        &self,
        directory: &Path,
        buckets: &CategoryBuckets,
        log: &mut MoveLog,
    ) -> Vec<(String, String)> {
        let mut failures = Vec::new();

        for (folder_name, bucket) in buckets {
            let folder_path = directory.join(folder_name);
            for file_name in &bucket.files {
                let src = directory.join(file_name);
                let dst = folder_path.join(file_name);

                if !src.exists() {
                    continue;
                }
                let result = if dst.exists() {
                    Err(format!("{} already exists", dst.display()))
                } else {
                    fs::rename(&src, &dst).map_err(|e| e.to_string())
                };

                match result {
                    Ok(()) => {
                        OutputFormatter::success(&format!("Moved: {} -> {}/", file_name, folder_name));
                        log.add(MoveRecord {
                            original_path: PathBuf::from(file_name),
                            new_path: Path::new(folder_name).join(file_name),
                            category: folder_name.clone(),
                        });
                    }
                    Err(reason) => {
                        OutputFormatter::error(&format!("Failed to move {}: {}", file_name, reason));
                        failures.push((file_name.clone(), reason));
                    }
                }
            }
        }

        failures
    }

    /// Renders the index document for `directory`.
    ///
    /// Sibling folders that are neither buckets nor excluded are listed under
    /// "Other Resources" with their item counts.
    pub fn generate_index(
        &self,
        directory: &Path,
        buckets: &CategoryBuckets,
        generated_at: DateTime<Local>,
    ) -> String {
        let dir_name = dir_name(directory);
        let mut lines = vec![
            format!("# {}", dir_name),
            String::new(),
            format!(
                "> 📚 Index generated at {}",
                generated_at.format("%Y-%m-%d %H:%M:%S")
            ),
            String::new(),
            "## 📖 Contents".to_string(),
            String::new(),
            format!(
                "**Total**: {} categories, {} notes",
                buckets.len(),
                total_files(buckets)
            ),
            String::new(),
        ];

        for (folder_name, bucket) in buckets {
            lines.push(format!("### {}", folder_name));
            lines.push(String::new());
            lines.push(format!("*{}*", bucket.description));
            lines.push(String::new());
            for file_name in &bucket.files {
                let display_name = strip_extension(file_name);
                lines.push(format!("- [[{}/{}|{}]]", folder_name, display_name, display_name));
            }
            lines.push(String::new());
        }

        lines.push("## 📁 Other Resources".to_string());
        lines.push(String::new());

        let others = self.other_folders(directory, buckets);
        if others.is_empty() {
            lines.push("*No other resources*".to_string());
        } else {
            for (folder, count) in others {
                if count > 0 {
                    lines.push(format!("- **{}/** ({} items)", folder, count));
                } else {
                    lines.push(format!("- **{}/**", folder));
                }
            }
        }

        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
        lines.push(format!("*tags: #{}*", dir_name));

        lines.join("\n")
    }

    /// Existing subfolders not produced by this run, with their entry counts.
    fn other_folders(&self, directory: &Path, buckets: &CategoryBuckets) -> Vec<(String, usize)> {
        let Ok(entries) = fs::read_dir(directory) else {
            return Vec::new();
        };

        let mut folders: Vec<(String, usize)> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !self.should_exclude(name) && !buckets.contains_key(name))
            .map(|name| {
                let count = fs::read_dir(directory.join(&name))
                    .map(|items| items.count())
                    .unwrap_or(0);
                (name, count)
            })
            .collect();

        folders.sort();
        folders
    }

    /// Writes the index, or prints it in dry-run.
    fn write_index(
        &self,
        directory: &Path,
        content: &str,
        dry_run: bool,
    ) -> Result<Option<PathBuf>, OrganizeError> {
        let index_path = directory.join(&self.index_file);

        if dry_run {
            OutputFormatter::dry_run_notice(&format!("Would write {}:", self.index_file));
            OutputFormatter::plain(&"=".repeat(60));
            OutputFormatter::plain(content);
            OutputFormatter::plain(&"=".repeat(60));
            return Ok(None);
        }

        fs::write(&index_path, content).map_err(|source| OrganizeError::WriteIndex {
            path: index_path.clone(),
            source,
        })?;
        OutputFormatter::success(&format!("Wrote index: {}", index_path.display()));
        Ok(Some(index_path))
    }

    /// Organizes one directory.
    ///
    /// # Arguments
    ///
    /// * `directory` - The note directory; only files directly inside it move
    /// * `dry_run` - Compute and print every step without touching the filesystem
    ///
    /// # Returns
    ///
    /// An [`OrganizeReport`] with the buckets, created folders and move
    /// results. A directory with nothing to organize yields an empty report
    /// and its existing index is left alone.
    ///
    /// Per-file move failures and a failed history save are reported and the
    /// run goes on, so the index is always written. Only an unreadable
    /// directory, a folder that cannot be created or an index that cannot be
    /// written is an error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use notetidy::config::OrganizeConfig;
    /// use notetidy::organizer::Organizer;
    /// use std::path::Path;
    ///
    /// let organizer = Organizer::new(&OrganizeConfig::default()).unwrap();
    /// let report = organizer.organize_directory(Path::new("线性代数"), true).unwrap();
    /// assert!(report.index.is_none());
    /// ```
    pub fn organize_directory(
        &self,
        directory: &Path,
        dry_run: bool,
    ) -> Result<OrganizeReport, OrganizeError> {
        OutputFormatter::header(&format!("Processing directory: {}", dir_name(directory)));

        let buckets = self.scan_directory(directory)?;
        let mut report = OrganizeReport {
            dry_run,
            ..Default::default()
        };

        if buckets.is_empty() {
            OutputFormatter::warning("No Markdown files to organize");
            return Ok(report);
        }

        OutputFormatter::info(&format!(
            "Found {} files in {} categories:",
            total_files(&buckets),
            buckets.len()
        ));
        let rows: Vec<(&str, usize)> = buckets
            .iter()
            .map(|(name, bucket)| (name.as_str(), bucket.files.len()))
            .collect();
        OutputFormatter::summary_table(&rows);

        if dry_run {
            for (folder_name, bucket) in &buckets {
                if !directory.join(folder_name).exists() {
                    OutputFormatter::dry_run_notice(&format!("Would create folder: {}/", folder_name));
                }
                for file_name in &bucket.files {
                    OutputFormatter::dry_run_notice(&format!(
                        "Would move: {} -> {}/",
                        file_name, folder_name
                    ));
                }
            }
        } else {
            report.created_folders = self.create_subfolders(directory, &buckets)?;

            let mut log = MoveLog::new(directory.to_path_buf());
            report.failed_moves = self.move_files(directory, &buckets, &mut log);
            report.moved = log.moves.len();
            if self.record_history && !log.is_empty() {
                report.history = save_history(directory, &log);
            }
        }

        let content = self.generate_index(directory, &buckets, Local::now());
        report.index = self.write_index(directory, &content, dry_run)?;
        report.buckets = buckets;

        if !report.failed_moves.is_empty() {
            OutputFormatter::warning(&format!(
                "{} files could not be moved. Please review errors above.",
                report.failed_moves.len()
            ));
        }
        OutputFormatter::success(&format!("Finished organizing {}", dir_name(directory)));

        Ok(report)
    }

    /// Immediate subdirectories of `base` eligible for organizing, sorted.
    ///
    /// A directory qualifies when it is not excluded and its name matches the
    /// eligibility pattern (by default: contains a CJK ideograph).
    pub fn find_eligible_directories(&self, base: &Path) -> Result<Vec<PathBuf>, OrganizeError> {
        let entries = fs::read_dir(base).map_err(|source| OrganizeError::ReadDir {
            path: base.to_path_buf(),
            source,
        })?;

        let mut directories: Vec<PathBuf> = entries
            .flatten()
            .filter(|entry| entry.path().is_dir())
            .filter(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                !self.should_exclude(&name) && self.eligible.is_match(&name)
            })
            .map(|entry| entry.path())
            .collect();

        directories.sort();
        Ok(directories)
    }
}

/// Saves the move log. A failure is a warning; the moves already happened.
fn save_history(directory: &Path, log: &MoveLog) -> Option<PathBuf> {
    match log.save(directory) {
        Ok(()) => Some(MoveLog::path(directory)),
        Err(e) => {
            OutputFormatter::warning(&format!("{}; this run cannot be undone", e));
            tracing::warn!(directory = %directory.display(), error = %e, "could not save move history");
            None
        }
    }
}

fn dir_name(directory: &Path) -> String {
    crate::concatenate::folder_title(directory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn organizer() -> Organizer {
        Organizer::new(&OrganizeConfig::default()).unwrap()
    }

    fn notes_dir(temp_dir: &TempDir, name: &str, files: &[&str]) -> PathBuf {
        let dir = temp_dir.path().join(name);
        fs::create_dir(&dir).unwrap();
        for file in files {
            fs::write(dir.join(file), format!("# {}", file)).unwrap();
        }
        dir
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 9, 15, 8, 30, 0).single().unwrap()
    }

    #[test]
    fn test_scan_linear_algebra_scenario() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "线性代数", &["Ch01_向量空间.md", "Ch02_矩阵.md", "其他.md"]);

        let buckets = organizer().scan_directory(&dir).unwrap();

        let summary: Vec<(&str, Vec<&str>)> = buckets
            .iter()
            .map(|(k, b)| (k.as_str(), b.files.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("01-向量与向量空间", vec!["Ch01_向量空间.md"]),
                ("02-矩阵理论", vec!["Ch02_矩阵.md"]),
                ("其他", vec!["其他.md"]),
            ]
        );
        assert_eq!(buckets["02-矩阵理论"].description, "Matrix Theory");
    }

    #[test]
    fn test_scan_skips_excluded_and_non_markdown() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(
            &temp_dir,
            "概率论",
            &["INDEX.md", "Exam 2023.md", "diagram.canvas", "notes.txt", "Ch1 事件.md"],
        );
        fs::create_dir(dir.join("sub")).unwrap();
        fs::write(dir.join("sub").join("deep.md"), "x").unwrap();

        let buckets = organizer().scan_directory(&dir).unwrap();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets["章节笔记"].files, vec!["Ch1 事件.md"]);
    }

    #[test]
    fn test_bucket_files_sorted() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "C++程序设计", &["z.md", "b.md", "m.md"]);

        let buckets = organizer().scan_directory(&dir).unwrap();
        assert_eq!(buckets["基础知识"].files, vec!["b.md", "m.md", "z.md"]);
    }

    #[test]
    fn test_scan_missing_directory() {
        let result = organizer().scan_directory(Path::new("/non/existent/笔记"));
        assert!(matches!(result, Err(OrganizeError::InvalidDirectory(_))));
    }

    #[test]
    fn test_generate_index() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "线性代数", &["Ch01_向量空间.md", "其他.md"]);
        fs::create_dir(dir.join("图片")).unwrap();
        fs::write(dir.join("图片").join("a.png"), "x").unwrap();
        fs::create_dir(dir.join("空")).unwrap();
        fs::create_dir(dir.join(".obsidian")).unwrap();

        let organizer = organizer();
        let buckets = organizer.scan_directory(&dir).unwrap();
        fs::create_dir(dir.join("其他")).unwrap();
        let index = organizer.generate_index(&dir, &buckets, fixed_time());

        let expected = "\
# 线性代数

> 📚 Index generated at 2024-09-15 08:30:00

## 📖 Contents

**Total**: 2 categories, 2 notes

### 01-向量与向量空间

*Vectors and Vector Spaces*

- [[01-向量与向量空间/Ch01_向量空间|Ch01_向量空间]]

### 其他

*Others*

- [[其他/其他|其他]]

## 📁 Other Resources

- **图片/** (1 items)
- **空/**

---

*tags: #线性代数*";
        assert_eq!(index, expected);
    }

    #[test]
    fn test_generate_index_without_other_folders() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "概率论", &["随笔.md"]);

        let organizer = organizer();
        let buckets = organizer.scan_directory(&dir).unwrap();
        let index = organizer.generate_index(&dir, &buckets, fixed_time());
        assert!(index.contains("*No other resources*"));
        assert!(index.contains("- [[笔记/随笔|随笔]]"));
    }

    #[test]
    fn test_move_never_overwrites() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "概率论", &["随笔.md", "日记.md"]);
        fs::create_dir(dir.join("笔记")).unwrap();
        fs::write(dir.join("笔记").join("随笔.md"), "older copy").unwrap();

        let report = organizer().organize_directory(&dir, false).unwrap();

        assert_eq!(report.moved, 1);
        assert_eq!(report.failed_moves.len(), 1);
        assert_eq!(report.failed_moves[0].0, "随笔.md");
        assert!(dir.join("随笔.md").is_file());
        assert_eq!(
            fs::read_to_string(dir.join("笔记").join("随笔.md")).unwrap(),
            "older copy"
        );
        assert!(dir.join("笔记").join("日记.md").is_file());
    }

    fn recording_organizer() -> Organizer {
        let config = OrganizeConfig {
            record_history: true,
            ..OrganizeConfig::default()
        };
        Organizer::new(&config).unwrap()
    }

    #[test]
    fn test_history_not_written_by_default() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "概率论", &["随笔.md"]);

        let report = organizer().organize_directory(&dir, false).unwrap();
        assert_eq!(report.moved, 1);
        assert!(report.history.is_none());
        assert!(!MoveLog::path(&dir).exists());
    }

    #[test]
    fn test_history_records_paths_relative_to_directory() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "线性代数", &["矩阵.md"]);

        let report = recording_organizer().organize_directory(&dir, false).unwrap();
        assert_eq!(report.history, Some(MoveLog::path(&dir)));

        let log = MoveLog::load(&dir).unwrap().unwrap();
        assert_eq!(log.moves.len(), 1);
        assert_eq!(log.moves[0].original_path, PathBuf::from("矩阵.md"));
        assert_eq!(log.moves[0].new_path, Path::new("02-矩阵理论").join("矩阵.md"));
    }

    #[test]
    fn test_failed_history_save_still_writes_index() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let dir = notes_dir(&temp_dir, "概率论", &["随笔.md"]);
        // A directory in the way makes the history write fail
        fs::create_dir(MoveLog::path(&dir)).unwrap();

        let report = recording_organizer().organize_directory(&dir, false).unwrap();

        assert_eq!(report.moved, 1);
        assert!(report.history.is_none());
        assert_eq!(report.index, Some(dir.join("INDEX.md")));
        assert!(dir.join("笔记").join("随笔.md").is_file());
        assert!(fs::read_to_string(dir.join("INDEX.md")).unwrap().contains("- [[笔记/随笔|随笔]]"));
    }

    #[test]
    fn test_find_eligible_directories() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let base = temp_dir.path();
        for name in ["线性代数", "数学分析", "english", "PDFs 资料", ".obsidian"] {
            fs::create_dir(base.join(name)).unwrap();
        }
        fs::write(base.join("文件.md"), "not a dir").unwrap();

        let found = organizer().find_eligible_directories(base).unwrap();
        assert_eq!(found, vec![base.join("数学分析"), base.join("线性代数")]);
    }
}
