//! Terminal output for both tools.
//!
//! All user-facing messages go through [`OutputFormatter`] so that styling
//! stays consistent. Diagnostics meant for debugging use `tracing` instead.

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Prints styled messages, spinners and summary tables.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use notetidy::output::OutputFormatter;
    /// OutputFormatter::success("PDF written");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, to stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a bold section header preceded by a rule.
    pub fn header(header: &str) {
        println!("\n{}", "=".repeat(60).dimmed());
        println!("{}", header.bold());
        println!("{}", "=".repeat(60).dimmed());
    }

    /// Prints a dry-run notice.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Starts a ticking spinner for a long external call.
    ///
    /// Hidden automatically when stderr is not a terminal.
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }

    /// Prints a table of file counts per category.
    ///
    /// Rows are printed in the order given.
    ///
    /// ```no_run
    /// use notetidy::output::OutputFormatter;
    ///
    /// OutputFormatter::summary_table(&[("01-向量与向量空间", 3), ("其他", 1)]);
    /// ```
    pub fn summary_table(rows: &[(&str, usize)]) {
        let total: usize = rows.iter().map(|(_, count)| count).sum();

        let max_category_len = rows
            .iter()
            .map(|(name, _)| name.chars().count())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{} | {}",
            pad("Category", max_category_len).bold(),
            "Files".bold()
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in rows {
            println!(
                "{} | {} {}",
                pad(category, max_category_len),
                count.to_string().green(),
                file_word(*count)
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{} | {} {}",
            pad("Total", max_category_len).bold(),
            total.to_string().green().bold(),
            file_word(total)
        );
    }
}

fn file_word(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

// Pads by char count, not display width.
fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{}{}", text, " ".repeat(width.saturating_sub(len)))
}
