//! Builds the intermediate Markdown document fed to the converter.
//!
//! Layout:
//!
//! ```text
//! ---
//! title: <folder>
//! date: <YYYY-MM-DD>
//! ---
//!
//! # <folder>
//! > merge summary
//!
//! \newpage
//! ## Table of Contents
//! 1. first/relative/path.md
//! ...
//!
//! ---
//! # 📄 first/relative/path.md
//! <contents with headings demoted one level>
//!
//! \newpage
//! ...
//! ```

use crate::collector::FileEntry;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Page break understood by the LaTeX backends.
pub const PAGE_BREAK: &str = "\\newpage";

#[derive(Debug, Error)]
pub enum ConcatError {
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a concatenation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcatReport {
    pub output: PathBuf,
    /// Files whose contents were included.
    pub written: usize,
    /// Files replaced by an "unreadable" placeholder.
    pub unreadable: Vec<PathBuf>,
}

/// Concatenates `files` into `output_path`, titled after `base_folder`.
///
/// Creates or truncates the output. A file that cannot be read is logged and
/// replaced by a placeholder; only failures writing the output are errors.
pub fn concatenate(
    files: &[FileEntry],
    output_path: &Path,
    base_folder: &Path,
) -> Result<ConcatReport, ConcatError> {
    let to_error = |source| ConcatError::Write {
        path: output_path.to_path_buf(),
        source,
    };

    let file = File::create(output_path).map_err(to_error)?;
    let mut writer = BufWriter::new(file);
    let unreadable =
        write_document(&mut writer, files, &folder_title(base_folder), Local::now()).map_err(to_error)?;
    writer.flush().map_err(to_error)?;

    Ok(ConcatReport {
        output: output_path.to_path_buf(),
        written: files.len() - unreadable.len(),
        unreadable,
    })
}

/// Writes the whole document to `out` and returns the unreadable inputs.
pub fn write_document<W: Write>(
    out: &mut W,
    files: &[FileEntry],
    title: &str,
    generated_at: DateTime<Local>,
) -> io::Result<Vec<PathBuf>> {
    write_header(out, files.len(), title, generated_at)?;
    write_table_of_contents(out, files)?;

    let mut unreadable = Vec::new();
    for (i, entry) in files.iter().enumerate() {
        if i > 0 {
            write!(out, "\n{}\n\n", PAGE_BREAK)?;
        }

        writeln!(out, "---\n")?;
        writeln!(out, "# 📄 {}\n", display_relative(entry))?;

        match fs::read_to_string(&entry.path) {
            Ok(content) => {
                out.write_all(demote_headings(&normalize_newlines(&content)).as_bytes())?;
                out.write_all(b"\n\n")?;
            }
            Err(e) => {
                tracing::warn!(file = %entry.path.display(), error = %e, "failed to read file");
                writeln!(out, "*File unreadable: {}*\n", e)?;
                unreadable.push(entry.path.clone());
            }
        }
    }

    Ok(unreadable)
}

fn write_header<W: Write>(
    out: &mut W,
    count: usize,
    title: &str,
    generated_at: DateTime<Local>,
) -> io::Result<()> {
    writeln!(out, "---")?;
    writeln!(out, "title: {}", title)?;
    writeln!(out, "date: {}", generated_at.format("%Y-%m-%d"))?;
    writeln!(out, "---\n")?;
    writeln!(out, "# {}\n", title)?;
    writeln!(out, "> Merged from {} Markdown files", count)?;
    writeln!(out, "> Generated at: {}\n", generated_at.format("%Y-%m-%d %H:%M:%S"))?;
    Ok(())
}

fn write_table_of_contents<W: Write>(out: &mut W, files: &[FileEntry]) -> io::Result<()> {
    writeln!(out, "{}\n", PAGE_BREAK)?;
    writeln!(out, "## Table of Contents\n")?;
    for (i, entry) in files.iter().enumerate() {
        writeln!(out, "{}. {}", i + 1, display_relative(entry))?;
    }
    writeln!(out)
}

/// Pushes every heading line one level down.
///
/// Any line starting with `#` gains one more `#`; other lines are unchanged.
pub fn demote_headings(content: &str) -> String {
    content
        .split('\n')
        .map(|line| {
            if line.starts_with('#') {
                format!("#{}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Converts `\r\n` and lone `\r` line endings to `\n`.
pub fn normalize_newlines(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Document title for a base folder: its final path component.
pub fn folder_title(base_folder: &Path) -> String {
    base_folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| canonical_name(base_folder))
}

fn canonical_name(path: &Path) -> String {
    path.canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "notes".to_string())
}

fn display_relative(entry: &FileEntry) -> String {
    entry.relative.to_string_lossy().into_owned()
}
