//! Markdown file discovery.
//!
//! Walks a folder (optionally recursively), skipping anything whose name
//! contains an excluded substring, and returns the Markdown files sorted by
//! path so that the output order is stable between runs.

use glob::Pattern;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Extension (with dot) of the files collected.
pub const MARKDOWN_SUFFIX: &str = ".md";

/// Errors raised while listing a folder.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Invalid listing pattern for {}: {source}", .folder.display())]
    Pattern {
        folder: PathBuf,
        #[source]
        source: glob::PatternError,
    },
}

/// A Markdown document found under a base folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path as discovered (prefixed by the base folder).
    pub path: PathBuf,
    /// Path relative to the base folder.
    pub relative: PathBuf,
    /// File name without extension.
    pub stem: String,
}

impl FileEntry {
    fn new(path: PathBuf, base: &Path) -> Self {
        let relative = path
            .strip_prefix(base)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path,
            relative,
            stem,
        }
    }
}

/// Substring patterns that exclude a file or folder name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    patterns: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// Union of `defaults` and caller-supplied `extra` patterns.
    pub fn with_defaults(defaults: &[String], extra: &[String]) -> Self {
        Self::new(defaults.iter().chain(extra).cloned())
    }

    /// True if any pattern occurs in `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|pattern| name.contains(pattern.as_str()))
    }

    fn matches_os(&self, name: &OsStr) -> bool {
        self.matches(&name.to_string_lossy())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Whether `name` is a Markdown file name not hit by `exclusions`.
pub fn is_markdown_name(name: &str, exclusions: &ExclusionSet) -> bool {
    name.ends_with(MARKDOWN_SUFFIX) && !exclusions.matches(name)
}

/// Collects Markdown files under `folder`.
///
/// # Arguments
///
/// * `folder` - The root to search
/// * `recursive` - Descend into subdirectories, or list `folder` only
/// * `exclusions` - Name substrings that drop a file, or prune a subdirectory
///   before it is entered
///
/// # Returns
///
/// The files sorted by path string, each with its path relative to `folder`.
/// Symlinked notes are included in both modes; unreadable entries are skipped.
///
/// # Examples
///
/// ```no_run
/// use notetidy::collector::{ExclusionSet, collect};
/// use std::path::Path;
///
/// let files = collect(Path::new("线性代数"), true, &ExclusionSet::new([".obsidian"])).unwrap();
/// for file in &files {
///     println!("{}", file.relative.display());
/// }
/// ```
pub fn collect(
    folder: &Path,
    recursive: bool,
    exclusions: &ExclusionSet,
) -> Result<Vec<FileEntry>, CollectError> {
    let mut paths = if recursive {
        walk_markdown(folder, exclusions)
    } else {
        list_markdown(folder, exclusions)?
    };

    paths.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
    tracing::debug!(folder = %folder.display(), count = paths.len(), "collected markdown files");

    Ok(paths
        .into_iter()
        .map(|path| FileEntry::new(path, folder))
        .collect())
}

/// Lists the Markdown files directly inside `folder`, sorted by name.
pub fn list_markdown(folder: &Path, exclusions: &ExclusionSet) -> Result<Vec<PathBuf>, CollectError> {
    let escaped = Pattern::escape(&folder.to_string_lossy());
    let pattern = format!("{}/*{}", escaped, MARKDOWN_SUFFIX);

    let entries = glob::glob(&pattern).map_err(|source| CollectError::Pattern {
        folder: folder.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| !exclusions.matches_os(name))
        })
        .collect();

    paths.sort();
    Ok(paths)
}

fn walk_markdown(folder: &Path, exclusions: &ExclusionSet) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !exclusions.matches_os(entry.file_name())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unreadable entry");
                None
            }
        })
        // Symlinked notes count; `file_type` alone does not follow links.
        .filter(|entry| {
            entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
        })
        .filter(|entry| is_markdown_name(&entry.file_name().to_string_lossy(), exclusions))
        .map(|entry| entry.into_path())
        .collect()
}
