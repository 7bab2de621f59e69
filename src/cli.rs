//! Command-line front ends for `md2pdf` and `organize-notes`.
//!
//! Parsing is done with clap; each `run_*` function maps the library result to
//! a [`Status`], which the binaries turn into the process exit code.

use crate::config::AppConfig;
use crate::history;
use crate::organizer::Organizer;
use crate::output::OutputFormatter;
use crate::pdf::{ConvertOptions, INSTALL_GUIDANCE, MarkdownToPdf, PdfError};
use crate::render::{CommandRunner, report_diagnostics};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Outcome of one tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

impl Status {
    /// Process exit code: 0 on success, 1 on failure.
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::Failure => 1,
        }
    }
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        ExitCode::from(status.code())
    }
}

/// Merge the Markdown files of a folder and convert them to one PDF.
#[derive(Parser, Debug)]
#[command(name = "md2pdf", version)]
#[command(after_help = "Examples:\n  md2pdf 线性代数\n  md2pdf 线性代数 -o linear_algebra.pdf\n  md2pdf 线性代数 --no-recursive\n  md2pdf 线性代数 --exclude .obsidian --exclude PDFs")]
pub struct Md2PdfArgs {
    /// Folder to convert
    pub folder: PathBuf,

    /// Output PDF name (default: <folder name>.pdf)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Include subfolders (default)
    #[arg(short, long, overrides_with = "no_recursive")]
    pub recursive: bool,

    /// Only the top-level folder
    #[arg(long, overrides_with = "recursive")]
    pub no_recursive: bool,

    /// Keep the intermediate concatenated Markdown file
    #[arg(short = 't', long = "temp")]
    pub keep_temp: bool,

    /// Exclude files and folders whose name contains PATTERN (repeatable)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Md2PdfArgs {
    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            folder: self.folder.clone(),
            output: self.output.clone(),
            recursive: !self.no_recursive,
            keep_intermediate: self.keep_temp,
            exclude: self.exclude.clone(),
        }
    }
}

/// Sort Markdown notes into topic folders and generate an index.
#[derive(Parser, Debug)]
#[command(name = "organize-notes", version)]
pub struct OrganizeArgs {
    /// Directories to organize, relative to --base (default: every directory
    /// whose name contains Chinese characters)
    pub directories: Vec<String>,

    /// Base directory the names are resolved against
    #[arg(long, default_value = ".")]
    pub base: PathBuf,

    /// Show what would happen without touching any file
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Move the files of the last run back (needs a run with --record-history)
    #[arg(long, conflicts_with_all = ["dry_run", "record_history"])]
    pub undo: bool,

    /// Save a move log so the run can be undone with --undo
    #[arg(long)]
    pub record_history: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Installs the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise warnings only, or debug with `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Option<AppConfig> {
    match AppConfig::load(path) {
        Ok(config) => Some(config),
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            None
        }
    }
}

/// Runs `md2pdf` with the system command runner.
pub fn run_md2pdf(args: &Md2PdfArgs) -> Status {
    let Some(config) = load_config(args.config.as_deref()) else {
        return Status::Failure;
    };
    run_md2pdf_with(&MarkdownToPdf::new(config.pdf), args)
}

/// Runs `md2pdf` with a prepared converter.
pub fn run_md2pdf_with<R: CommandRunner>(converter: &MarkdownToPdf<R>, args: &Md2PdfArgs) -> Status {
    match converter.convert_folder(&args.convert_options()) {
        Ok(report) => {
            OutputFormatter::header("Conversion complete");
            let location = report
                .pdf
                .output
                .canonicalize()
                .unwrap_or_else(|_| report.pdf.output.clone());
            OutputFormatter::success(&format!("Output: {}", location.display()));
            if let Some(size) = report.pdf.size_bytes {
                OutputFormatter::plain(&format!("   Size: {:.2} KB", size as f64 / 1024.0));
            }
            if report.pdf.fell_back {
                OutputFormatter::plain(&format!("   Engine: {} (fallback)", report.pdf.engine));
            }
            Status::Success
        }
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            match &e {
                PdfError::ConverterMissing { .. } => {
                    OutputFormatter::plain("  Install it with:");
                    for hint in INSTALL_GUIDANCE {
                        OutputFormatter::plain(&format!("    - {}", hint));
                    }
                }
                PdfError::Render(render) => report_diagnostics(render),
                _ => {}
            }
            OutputFormatter::error("Conversion failed");
            Status::Failure
        }
    }
}

/// Runs `organize-notes`.
///
/// Fails when the configuration cannot be loaded or compiled, or when any
/// directory fails to organize or undo.
pub fn run_organize(args: &OrganizeArgs) -> Status {
    let Some(mut config) = load_config(args.config.as_deref()) else {
        return Status::Failure;
    };
    config.organize.record_history |= args.record_history;
    let organizer = match Organizer::new(&config.organize) {
        Ok(organizer) => organizer,
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            return Status::Failure;
        }
    };

    if args.dry_run {
        OutputFormatter::dry_run_notice("Simulating, no files will be changed. Drop --dry-run to apply.");
    }

    let directories = match resolve_directories(&organizer, args) {
        Ok(directories) => directories,
        Err(message) => {
            OutputFormatter::error(&message);
            return Status::Failure;
        }
    };

    let mut failed = false;
    for directory in &directories {
        let ok = if args.undo {
            undo_directory(directory)
        } else {
            match organizer.organize_directory(directory, args.dry_run) {
                Ok(_) => true,
                Err(e) => {
                    OutputFormatter::error(&e.to_string());
                    false
                }
            }
        };
        failed |= !ok;
    }

    if failed { Status::Failure } else { Status::Success }
}

/// Named directories that exist, or the discovered ones when none are named.
fn resolve_directories(organizer: &Organizer, args: &OrganizeArgs) -> Result<Vec<PathBuf>, String> {
    if args.directories.is_empty() {
        let found = organizer
            .find_eligible_directories(&args.base)
            .map_err(|e| e.to_string())?;
        if found.is_empty() {
            OutputFormatter::warning("No directories with Chinese names found");
        } else {
            OutputFormatter::info(&format!("Found {} directories:", found.len()));
            for dir in &found {
                OutputFormatter::plain(&format!("  • {}", dir.display()));
            }
        }
        return Ok(found);
    }

    Ok(args
        .directories
        .iter()
        .filter_map(|name| {
            let directory = args.base.join(name);
            if directory.is_dir() {
                Some(directory)
            } else {
                OutputFormatter::warning(&format!("Not a directory, skipping: {}", name));
                None
            }
        })
        .collect())
}

fn undo_directory(directory: &Path) -> bool {
    OutputFormatter::header(&format!("Undoing organization of {}", directory.display()));

    match history::undo(directory) {
        Ok(report) => {
            OutputFormatter::success(&format!("Restored: {}", report.restored));
            for (path, reason) in &report.skipped {
                OutputFormatter::warning(&format!("Skipped {}: {}", path.display(), reason));
            }
            for (path, reason) in &report.failed {
                OutputFormatter::error(&format!("Failed {}: {}", path.display(), reason));
            }
            if !report.is_complete_success() {
                OutputFormatter::warning("History file was kept; fix the issues above and retry.");
            }
            report.failed.is_empty()
        }
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            false
        }
    }
}
