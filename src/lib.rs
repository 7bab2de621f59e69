//! notetidy - tools for a folder of Markdown notes
//!
//! Two independent pipelines share this library:
//! - `md2pdf`: collect the Markdown files of a folder, concatenate them into one
//!   document and render it to PDF with pandoc
//! - `organize-notes`: sort notes into topic subfolders by filename rules and
//!   write an index of links

pub mod classifier;
pub mod cli;
pub mod collector;
pub mod concatenate;
pub mod config;
pub mod history;
pub mod organizer;
pub mod output;
pub mod pdf;
pub mod render;

pub use classifier::{Classification, Classifier};
pub use collector::{ExclusionSet, FileEntry, collect};
pub use config::{AppConfig, ConfigError, OrganizeConfig, PdfConfig};
pub use organizer::{CategoryBuckets, OrganizeError, OrganizeReport, Organizer};
pub use pdf::{ConvertOptions, ConvertReport, MarkdownToPdf, PdfError};
pub use render::{CommandOutput, CommandRunner, RenderError, Renderer, RunError, SystemRunner};
