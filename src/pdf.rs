//! The `md2pdf` pipeline: collect, concatenate, render, clean up.

use crate::collector::{self, CollectError, ExclusionSet};
use crate::concatenate::{self, ConcatError, folder_title};
use crate::config::PdfConfig;
use crate::output::OutputFormatter;
use crate::render::{CommandRunner, RenderError, RenderReport, Renderer, SystemRunner};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix of the intermediate document, replacing `.pdf`.
pub const INTERMEDIATE_EXTENSION: &str = "combined.md";

/// Install hints printed when the converter is missing.
pub const INSTALL_GUIDANCE: [&str; 3] = [
    "Ubuntu/Debian: sudo apt-get install pandoc texlive-xetex",
    "macOS: brew install pandoc basictex",
    "Windows: download the installer from https://pandoc.org/installing.html",
];

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Folder does not exist: {}", .0.display())]
    FolderNotFound(PathBuf),
    #[error("Path is not a folder: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("{program} was not found on the search path")]
    ConverterMissing { program: String },
    #[error("No Markdown files found in {}", .0.display())]
    NoMarkdownFiles(PathBuf),
    #[error(transparent)]
    Collect(#[from] CollectError),
    #[error(transparent)]
    Concatenate(#[from] ConcatError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Caller choices for one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    pub folder: PathBuf,
    /// Output name; `<folder>.pdf` when absent.
    pub output: Option<String>,
    pub recursive: bool,
    /// Keep the intermediate Markdown document.
    pub keep_intermediate: bool,
    /// Extra exclusion substrings.
    pub exclude: Vec<String>,
}

impl ConvertOptions {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            output: None,
            recursive: true,
            keep_intermediate: false,
            exclude: Vec::new(),
        }
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertReport {
    pub pdf: RenderReport,
    pub files: usize,
    /// Path of the intermediate document when it was kept.
    pub intermediate: Option<PathBuf>,
}

/// Resolves the PDF path for `folder`, appending `.pdf` when missing.
pub fn output_pdf_path(folder: &Path, output: Option<&str>) -> PathBuf {
    let name = match output {
        Some(name) => name.to_string(),
        None => format!("{}.pdf", folder_title(folder)),
    };

    if name.ends_with(".pdf") {
        PathBuf::from(name)
    } else {
        PathBuf::from(format!("{}.pdf", name))
    }
}

/// Path of the intermediate document next to `pdf_path`.
pub fn intermediate_path(pdf_path: &Path) -> PathBuf {
    pdf_path.with_extension(INTERMEDIATE_EXTENSION)
}

/// Converts a folder of Markdown notes into one PDF.
pub struct MarkdownToPdf<R: CommandRunner = SystemRunner> {
    config: PdfConfig,
    runner: R,
}

impl MarkdownToPdf<SystemRunner> {
    pub fn new(config: PdfConfig) -> Self {
        Self::with_runner(config, SystemRunner)
    }
}

impl<R: CommandRunner> MarkdownToPdf<R> {
    pub fn with_runner(config: PdfConfig, runner: R) -> Self {
        Self { config, runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs the whole pipeline: collect, concatenate, render, clean up.
    ///
    /// # Arguments
    ///
    /// * `options` - Folder, output name, recursion, exclusions and whether to
    ///   keep the intermediate document
    ///
    /// # Returns
    ///
    /// A [`ConvertReport`] with the rendered PDF, the number of merged files
    /// and the kept intermediate path, if any.
    ///
    /// # Errors
    ///
    /// * **Missing or non-directory folder, missing converter**: checked
    ///   before anything is written
    /// * **No Markdown files**: nothing is written
    /// * **Render failure or timeout**: after the single engine fallback
    ///
    /// The intermediate document is removed afterwards unless
    /// `keep_intermediate` is set, also when rendering fails.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use notetidy::config::PdfConfig;
    /// use notetidy::pdf::{ConvertOptions, MarkdownToPdf};
    ///
    /// let converter = MarkdownToPdf::new(PdfConfig::default());
    /// let report = converter.convert_folder(&ConvertOptions::new("线性代数")).unwrap();
    /// println!("{}", report.pdf.output.display());
    /// ```
    pub fn convert_folder(&self, options: &ConvertOptions) -> Result<ConvertReport, PdfError> {
        let folder = options.folder.as_path();
        if !folder.exists() {
            return Err(PdfError::FolderNotFound(folder.to_path_buf()));
        }
        if !folder.is_dir() {
            return Err(PdfError::NotADirectory(folder.to_path_buf()));
        }
        if !self.runner.is_available(&self.config.converter) {
            return Err(PdfError::ConverterMissing {
                program: self.config.converter.clone(),
            });
        }

        OutputFormatter::header(&format!("Processing folder: {}", folder_title(folder)));
        OutputFormatter::info("Collecting Markdown files...");

        let exclusions = ExclusionSet::with_defaults(&self.config.default_excludes, &options.exclude);
        let files = collector::collect(folder, options.recursive, &exclusions)?;
        if files.is_empty() {
            return Err(PdfError::NoMarkdownFiles(folder.to_path_buf()));
        }
        OutputFormatter::success(&format!("Found {} Markdown files", files.len()));

        let pdf_path = output_pdf_path(folder, options.output.as_deref());
        let temp_path = intermediate_path(&pdf_path);

        OutputFormatter::info("Concatenating Markdown files...");
        let concat = concatenate::concatenate(&files, &temp_path, folder).inspect_err(|_| {
            let _ = fs::remove_file(&temp_path);
        })?;
        OutputFormatter::success(&format!(
            "Concatenated {} files into {}",
            files.len(),
            temp_path.display()
        ));
        if !concat.unreadable.is_empty() {
            OutputFormatter::warning(&format!(
                "{} files could not be read and were replaced by a placeholder",
                concat.unreadable.len()
            ));
        }

        let rendered =
            Renderer::new(&self.config, &self.runner).render(&temp_path, &pdf_path, &self.config.engine);

        let intermediate = if options.keep_intermediate {
            OutputFormatter::success(&format!("Kept intermediate file: {}", temp_path.display()));
            Some(temp_path)
        } else {
            self.remove_intermediate(&temp_path);
            None
        };

        Ok(ConvertReport {
            pdf: rendered?,
            files: files.len(),
            intermediate,
        })
    }

    fn remove_intermediate(&self, path: &Path) {
        if !path.exists() {
            return;
        }
        match fs::remove_file(path) {
            Ok(()) => OutputFormatter::success(&format!("Removed intermediate file: {}", path.display())),
            Err(e) => tracing::warn!(file = %path.display(), error = %e, "could not remove intermediate file"),
        }
    }
}
