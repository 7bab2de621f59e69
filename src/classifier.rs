//! Rule-table classification of note files.
//!
//! A [`Classifier`] owns one table per subject domain plus a default table.
//! The table is chosen by the directory name, then the file's base name is
//! matched against the table's rules in order and the first hit wins.
//!
//! # Examples
//!
//! ```
//! use notetidy::config::OrganizeConfig;
//!
//! let classifier = OrganizeConfig::default().compile().unwrap();
//! let hit = classifier.classify("Ch01_向量空间.md", "线性代数");
//! assert_eq!(hit.folder, "01-向量与向量空间");
//! ```

use regex::Regex;
use std::path::Path;

/// A compiled (pattern, destination, description) rule.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pattern: Regex,
    folder: String,
    description: String,
}

impl CompiledRule {
    pub fn new(pattern: Regex, folder: String, description: String) -> Self {
        Self {
            pattern,
            folder,
            description,
        }
    }

    fn matches(&self, base_name: &str) -> bool {
        self.pattern.is_match(base_name)
    }
}

/// An ordered list of rules, optionally keyed by a directory-name marker.
#[derive(Debug, Clone)]
pub struct RuleTable {
    marker: Option<String>,
    rules: Vec<CompiledRule>,
}

impl RuleTable {
    pub fn new(marker: Option<String>, rules: Vec<CompiledRule>) -> Self {
        Self { marker, rules }
    }

    /// The marker that selects this table, `None` for the default table.
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }

    fn first_match(&self, base_name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.matches(base_name))
    }
}

/// Where a file should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    /// Destination subfolder name.
    pub folder: &'a str,
    /// Human-readable description of the destination.
    pub description: &'a str,
}

/// Classifies note files by name using domain-specific rule tables.
#[derive(Debug, Clone)]
pub struct Classifier {
    domains: Vec<RuleTable>,
    default_table: RuleTable,
    fallback_folder: String,
    fallback_description: String,
}

impl Classifier {
    pub fn new(
        domains: Vec<RuleTable>,
        default_table: RuleTable,
        fallback_folder: String,
        fallback_description: String,
    ) -> Self {
        Self {
            domains,
            default_table,
            fallback_folder,
            fallback_description,
        }
    }

    /// Selects the rule table for a directory.
    ///
    /// Domain tables are checked in order; the first whose marker occurs in
    /// `directory_name` is used, otherwise the default table.
    pub fn table_for(&self, directory_name: &str) -> &RuleTable {
        self.domains
            .iter()
            .find(|table| {
                table
                    .marker()
                    .is_some_and(|marker| directory_name.contains(marker))
            })
            .unwrap_or(&self.default_table)
    }

    /// Classifies `file_name` found in a directory called `directory_name`.
    ///
    /// The extension is stripped before matching. When no rule of the selected
    /// table matches, the fallback destination is returned.
    pub fn classify(&self, file_name: &str, directory_name: &str) -> Classification<'_> {
        let base_name = strip_extension(file_name);

        match self.table_for(directory_name).first_match(base_name) {
            Some(rule) => Classification {
                folder: &rule.folder,
                description: &rule.description,
            },
            None => Classification {
                folder: &self.fallback_folder,
                description: &self.fallback_description,
            },
        }
    }
}

/// Returns the file name without its last extension.
pub fn strip_extension(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name)
}
