//! Configuration for both note pipelines.
//!
//! Everything the tools used to hardcode (exclusion lists, pandoc settings,
//! font candidates and the per-subject classification tables) lives here as
//! data with built-in defaults. A TOML file can override any part of it:
//!
//! ```toml
//! [pdf]
//! engine = "xelatex"
//! fallback_engine = "lualatex"
//! default_excludes = [".obsidian", ".git"]
//!
//! [organize]
//! index_file = "INDEX.md"
//!
//! [[organize.domains]]
//! marker = "线性代数"
//! rules = [
//!     { pattern = "向量空间|向量组", folder = "01-向量与向量空间", description = "Vectors and Vector Spaces" },
//! ]
//!
//! [[organize.default_rules]]
//! pattern = ".*"
//! folder = "笔记"
//! description = "Notes"
//! ```
//!
//! Fields missing from the file keep their defaults.

use crate::classifier::{Classifier, CompiledRule, RuleTable};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = ".notetidy.toml";

/// Errors that can occur while loading or compiling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    /// Invalid TOML syntax or structure.
    #[error("Invalid configuration in {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },
    /// A classification or discovery pattern failed to compile.
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    /// IO error while reading configuration.
    #[error("IO error reading configuration {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Root configuration shared by `md2pdf` and `organize-notes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pdf: PdfConfig,
    pub organize: OrganizeConfig,
}

impl AppConfig {
    /// Load configuration, falling back to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if given (it must exist)
    /// 2. `.notetidy.toml` in the current directory
    /// 3. `~/.config/notetidy/config.toml`
    /// 4. built-in defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_FILE);
        if local_config.is_file() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("notetidy")
                .join("config.toml");
            if home_config.is_file() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content).map_err(|reason| ConfigError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }
}

/// Settings for the Markdown to PDF pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Document converter executable.
    pub converter: String,
    /// First-choice PDF engine.
    pub engine: String,
    /// Engine tried once when the first-choice engine exits non-zero.
    pub fallback_engine: String,
    /// Engines that accept a CJK font variable.
    pub complex_script_engines: Vec<String>,
    pub margin: String,
    pub font_size: String,
    pub toc_depth: u8,
    pub convert_timeout_secs: u64,
    /// Font discovery executable and its arguments.
    pub font_query_program: String,
    pub font_query_args: Vec<String>,
    pub font_query_timeout_secs: u64,
    /// Fonts tried in order against the discovery output.
    pub preferred_fonts: Vec<String>,
    pub default_font: String,
    /// Template variable the font is passed through.
    pub font_variable: String,
    /// Substrings always excluded during collection.
    pub default_excludes: Vec<String>,
    /// Maximum characters of converter output kept for diagnostics.
    pub diagnostic_limit: usize,
}

impl PdfConfig {
    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }

    pub fn font_query_timeout(&self) -> Duration {
        Duration::from_secs(self.font_query_timeout_secs)
    }

    /// Whether `engine` can typeset with the detected CJK font.
    pub fn supports_complex_script(&self, engine: &str) -> bool {
        self.complex_script_engines.iter().any(|e| e == engine)
    }
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            converter: "pandoc".to_string(),
            engine: "xelatex".to_string(),
            fallback_engine: "lualatex".to_string(),
            complex_script_engines: strings(&["xelatex", "lualatex"]),
            margin: "1in".to_string(),
            font_size: "12pt".to_string(),
            toc_depth: 3,
            convert_timeout_secs: 300,
            font_query_program: "fc-list".to_string(),
            font_query_args: strings(&[":lang=zh"]),
            font_query_timeout_secs: 10,
            preferred_fonts: strings(&[
                "Noto Sans CJK SC",
                "Noto Serif CJK SC",
                "WenQuanYi Micro Hei",
                "AR PL UMing CN",
                "SimSun",
                "STSong",
            ]),
            default_font: "Noto Sans CJK SC".to_string(),
            font_variable: "CJKmainfont".to_string(),
            default_excludes: strings(&[".obsidian", ".git", ".DS_Store", "PDFs", "attachments"]),
            diagnostic_limit: 500,
        }
    }
}

/// One classification rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Regex searched (unanchored) in the file's base name.
    pub pattern: String,
    /// Destination subfolder.
    pub folder: String,
    pub description: String,
}

/// A rule table selected when `marker` occurs in the directory name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRules {
    pub marker: String,
    pub rules: Vec<RuleSpec>,
}

/// Settings for the note organizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizeConfig {
    /// Name of the generated index inside each organized directory.
    pub index_file: String,
    /// Substrings of file and folder names that are never touched.
    pub exclude: Vec<String>,
    /// Directory names matching this regex are organized when none are named.
    pub eligible_pattern: String,
    /// Destination when no rule matches.
    pub fallback_folder: String,
    pub fallback_description: String,
    /// Domain tables, checked in order.
    pub domains: Vec<DomainRules>,
    /// Table used when no domain marker matches.
    pub default_rules: Vec<RuleSpec>,
    /// Write a move log so a run can be undone. Off unless asked for.
    pub record_history: bool,
}

impl OrganizeConfig {
    /// Compile every table into a [`Classifier`].
    ///
    /// All patterns are validated here so that classification itself cannot fail.
    pub fn compile(&self) -> Result<Classifier, ConfigError> {
        let domains = self
            .domains
            .iter()
            .map(|domain| {
                Ok(RuleTable::new(
                    Some(domain.marker.clone()),
                    compile_rules(&domain.rules)?,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let default_table = RuleTable::new(None, compile_rules(&self.default_rules)?);

        Ok(Classifier::new(
            domains,
            default_table,
            self.fallback_folder.clone(),
            self.fallback_description.clone(),
        ))
    }

    /// Compile the directory discovery pattern.
    pub fn eligible_regex(&self) -> Result<Regex, ConfigError> {
        compile_regex(&self.eligible_pattern)
    }
}

impl Default for OrganizeConfig {
    fn default() -> Self {
        Self {
            index_file: "INDEX.md".to_string(),
            exclude: strings(&[
                "INDEX.md",
                ".obsidian",
                "PDFs",
                "EXT",
                "Exam",
                ".DS_Store",
                "TOC.base",
                ".canvas",
            ]),
            eligible_pattern: r"[\x{4e00}-\x{9fff}]".to_string(),
            fallback_folder: "其他".to_string(),
            fallback_description: "Others".to_string(),
            domains: vec![
                DomainRules {
                    marker: "线性代数".to_string(),
                    rules: linear_algebra_rules(),
                },
                DomainRules {
                    marker: "数学分析".to_string(),
                    rules: math_analysis_rules(),
                },
                DomainRules {
                    marker: "C++".to_string(),
                    rules: vec![rule(".*", "基础知识", "Fundamentals")],
                },
            ],
            default_rules: vec![
                rule(r"^Ch\d+", "章节笔记", "Chapter Notes"),
                rule("^Course", "课程笔记", "Course Notes"),
                rule(".*", "笔记", "Notes"),
            ],
            record_history: false,
        }
    }
}

fn linear_algebra_rules() -> Vec<RuleSpec> {
    vec![
        rule("向量空间|向量组", "01-向量与向量空间", "Vectors and Vector Spaces"),
        rule("Ch01|向量和矩阵", "01-向量与向量空间", "Vectors and Vector Spaces"),
        rule("矩阵|可逆矩阵|分块矩阵", "02-矩阵理论", "Matrix Theory"),
        rule("Ch02|线性方程组|消元法", "03-线性方程组", "Linear Equations"),
        rule("Ch03|子空间", "04-线性空间", "Linear Spaces"),
        rule("Ch04|正交", "05-正交性", "Orthogonality"),
        rule("行列式|Ch05", "06-行列式", "Determinants"),
        rule("秩|相抵", "07-秩与相抵", "Rank and Equivalence"),
        rule("方阵", "08-方阵理论", "Square Matrix Theory"),
        rule("特征|递推", "09-特征值与递推", "Eigenvalues and Recurrence"),
        rule(r"^Course\d+\.\d+", "课程笔记", "Course Notes"),
        rule("MATLAB|数域|求和符号", "辅助工具", "Auxiliary Tools"),
    ]
}

fn math_analysis_rules() -> Vec<RuleSpec> {
    vec![
        rule("集合|实数|确界|连续统|有理数", "01-集合与实数系", "Sets and Real Numbers"),
        rule(
            "映射|函数的概念|函数的性质|函数的运算|对合函数|反三角函数",
            "02-映射与函数",
            "Mappings and Functions",
        ),
        rule("数列极限|收敛准则|康托尔", "03-数列极限", "Sequence Limits"),
        rule("函数极限|重要极限|无穷小量|无穷大量", "04-函数极限", "Function Limits"),
        rule("连续性|闭区间上的连续函数", "05-函数连续性", "Continuity"),
        rule("导数|微分", "06-导数与微分", "Derivatives and Differentials"),
        rule("不等式|双阶乘|区间的条件", "辅助工具", "Auxiliary Tools"),
        rule(r"^Course9\.15 关于", "课程笔记", "Course Notes"),
        rule("习题.*集族|证明题", "01-集合与实数系", "Sets and Real Numbers"),
        rule("习题.*补充", "习题集", "Exercise Collection"),
    ]
}

fn rule(pattern: &str, folder: &str, description: &str) -> RuleSpec {
    RuleSpec {
        pattern: pattern.to_string(),
        folder: folder.to_string(),
        description: description.to_string(),
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn compile_rules(rules: &[RuleSpec]) -> Result<Vec<CompiledRule>, ConfigError> {
    rules
        .iter()
        .map(|spec| {
            Ok(CompiledRule::new(
                compile_regex(&spec.pattern)?,
                spec.folder.clone(),
                spec.description.clone(),
            ))
        })
        .collect()
}

fn compile_regex(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_compiles() {
        let config = AppConfig::default();
        assert!(config.organize.compile().is_ok());
        assert!(config.organize.eligible_regex().is_ok());
    }

    #[test]
    fn test_history_is_opt_in() {
        assert!(!OrganizeConfig::default().record_history);

        let config = AppConfig::from_toml_str("[organize]\nrecord_history = true\n").unwrap();
        assert!(config.organize.record_history);
        assert_eq!(config.organize.index_file, "INDEX.md");
    }

    #[test]
    fn test_default_pdf_settings() {
        let pdf = PdfConfig::default();
        assert_eq!(pdf.engine, "xelatex");
        assert_eq!(pdf.fallback_engine, "lualatex");
        assert_eq!(pdf.toc_depth, 3);
        assert!(pdf.supports_complex_script("lualatex"));
        assert!(!pdf.supports_complex_script("pdflatex"));
        assert_eq!(pdf.convert_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [pdf]
            engine = "lualatex"
            "#,
        )
        .unwrap();

        assert_eq!(config.pdf.engine, "lualatex");
        assert_eq!(config.pdf.fallback_engine, "lualatex");
        assert_eq!(config.pdf.converter, "pandoc");
        assert_eq!(config.organize, OrganizeConfig::default());
    }

    #[test]
    fn test_custom_rule_tables_from_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [organize]
            fallback_folder = "misc"

            [[organize.domains]]
            marker = "Physics"
            rules = [
                { pattern = "^Lecture", folder = "lectures", description = "Lectures" },
            ]

            [[organize.default_rules]]
            pattern = "^Draft"
            folder = "drafts"
            description = "Drafts"
            "#,
        )
        .unwrap();

        assert_eq!(config.organize.domains.len(), 1);
        assert_eq!(config.organize.default_rules.len(), 1);
        assert_eq!(config.organize.index_file, "INDEX.md");

        let classifier = config.organize.compile().unwrap();
        assert_eq!(
            classifier.classify("Lecture01.md", "Physics I").folder,
            "lectures"
        );
        assert_eq!(classifier.classify("Draft.md", "Chemistry").folder, "drafts");
        assert_eq!(classifier.classify("Notes.md", "Chemistry").folder, "misc");
    }

    #[test]
    fn test_invalid_regex_returns_error() {
        let mut organize = OrganizeConfig::default();
        organize.default_rules.push(rule("[invalid(", "x", "x"));

        let result = organize.compile();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidRegexPattern { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[pdf\nengine = ").expect("Failed to write config");

        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ConfigInvalid { .. }));
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/non/existent/notetidy.toml")));
        assert!(matches!(result, Err(ConfigError::ConfigNotFound(_))));
    }
}
