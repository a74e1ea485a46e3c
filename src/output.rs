//! Output formatting and styling module.
//!
//! All terminal output of the CLI goes through [`OutputFormatter`]: colored
//! status lines, one line per organize event, the summary table printed after
//! a sweep, and the spinner shown while watching.

use crate::file_category::{CategoryMap, DEFAULT_CATEGORY};
use crate::file_organizer::{OrganizeEvent, Outcome, SkipReason};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Counts of what happened during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    /// Files moved, per category.
    pub moved: BTreeMap<String, usize>,
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record(&mut self, event: &OrganizeEvent) {
        match &event.outcome {
            Outcome::Moved => *self.moved.entry(event.category.clone()).or_default() += 1,
            Outcome::Renamed => {
                *self.moved.entry(event.category.clone()).or_default() += 1;
                self.renamed += 1;
            }
            Outcome::Skipped { .. } => self.skipped += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn total_moved(&self) -> usize {
        self.moved.values().sum()
    }
}

impl<'a> FromIterator<&'a OrganizeEvent> for Summary {
    fn from_iter<I: IntoIterator<Item = &'a OrganizeEvent>>(iter: I) -> Self {
        let mut summary = Summary::default();
        for event in iter {
            summary.record(event);
        }
        summary
    }
}

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Status messages (success, error, warning, info)
/// - Rendering organize events as text or JSON lines
/// - The post-sweep summary table
/// - The spinner shown while a folder is watched
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidywatch::output::OutputFormatter;
    /// OutputFormatter::success("Category saved");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message to stderr in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Formats one event as a single colored line.
    ///
    /// Paths are shown relative to `root` where possible. Skips are only
    /// rendered when `verbose` is set; `None` means "print nothing".
    pub fn format_event(event: &OrganizeEvent, root: &Path, verbose: bool) -> Option<String> {
        let name = display_relative(&event.source_path, root);
        let line = match &event.outcome {
            Outcome::Moved | Outcome::Renamed => {
                let dest = event
                    .destination_path
                    .as_deref()
                    .map(|d| display_relative(d, root))
                    .unwrap_or_else(|| format!("{}/", event.category));
                let note = if event.outcome == Outcome::Renamed {
                    " (renamed)".yellow().to_string()
                } else {
                    String::new()
                };
                format!("{} {} → {}{}", "✓".green(), name, dest.cyan(), note)
            }
            Outcome::Skipped { reason } => {
                if !verbose {
                    return None;
                }
                format!("{} {} ({})", "·".dimmed(), name.dimmed(), skip_label(*reason))
            }
            Outcome::Failed { error } => format!("{} {}: {}", "✗".red(), name, error),
        };
        Some(line)
    }

    /// Formats one event as a JSON object on a single line.
    pub fn format_event_json(event: &OrganizeEvent) -> String {
        serde_json::to_string(event).unwrap_or_else(|e| {
            format!(r#"{{"error":"failed to serialize event: {}"}}"#, e)
        })
    }

    /// Prints an event in the selected format.
    pub fn event(event: &OrganizeEvent, root: &Path, json: bool, verbose: bool) {
        if json {
            println!("{}", Self::format_event_json(event));
        } else if let Some(line) = Self::format_event(event, root, verbose) {
            if matches!(event.outcome, Outcome::Failed { .. }) {
                eprintln!("{}", line);
            } else {
                println!("{}", line);
            }
        }
    }

    /// Creates the spinner shown while watching a folder.
    ///
    /// ```no_run
    /// use tidywatch::output::OutputFormatter;
    /// use std::path::Path;
    ///
    /// let spinner = OutputFormatter::watch_spinner(Path::new("/home/me/Downloads"));
    /// spinner.println("✓ a.pdf → Documents/a.pdf");
    /// spinner.finish_and_clear();
    /// ```
    pub fn watch_spinner(root: &Path) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(format!(
            "Watching {} (press Ctrl-C to stop)",
            root.display()
        ));
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }

    /// Prints a summary table with file statistics by category.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidywatch::output::{OutputFormatter, Summary};
    ///
    /// let mut summary = Summary::default();
    /// summary.moved.insert("Documents".to_string(), 15);
    /// summary.moved.insert("Images".to_string(), 8);
    /// OutputFormatter::summary_table(&summary);
    /// ```
    pub fn summary_table(summary: &Summary) {
        Self::header("SUMMARY");

        let width = summary
            .moved
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!("{:<width$} | {}", "Category".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));

        for (category, count) in &summary.moved {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                plural(*count),
                width = width
            );
        }

        println!("{}", "-".repeat(width + 10));
        let total = summary.total_moved();
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total.to_string().green().bold(),
            plural(total),
            width = width
        );

        if summary.renamed > 0 {
            Self::plain(&format!("{} renamed to avoid overwriting", summary.renamed));
        }
        if summary.skipped > 0 {
            Self::plain(&format!("{} left in place", summary.skipped));
        }
        if summary.failed > 0 {
            Self::warning(&format!(
                "{} {} could not be organized",
                summary.failed,
                plural(summary.failed)
            ));
        }
    }

    /// Prints the effective category mapping, one category per line.
    pub fn category_table(map: &CategoryMap) {
        Self::header("CATEGORIES");
        let width = map.categories().map(str::len).max().unwrap_or(0).max(8);
        for category in map.categories() {
            let extensions: Vec<_> = map
                .extensions_for(category)
                .iter()
                .map(|ext| format!(".{}", ext))
                .collect();
            println!(
                "{:<width$} | {}",
                category.bold(),
                extensions.join(" "),
                width = width
            );
        }
        println!(
            "{:<width$} | {}",
            DEFAULT_CATEGORY.bold(),
            "(everything else)".dimmed(),
            width = width
        );
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn skip_label(reason: SkipReason) -> &'static str {
    match reason {
        SkipReason::Directory => "directory",
        SkipReason::NotRegularFile => "not a regular file",
        SkipReason::AlreadyCategorized => "already in its category",
        SkipReason::OutsideRoot => "outside the watched folder",
        SkipReason::Filtered => "excluded by filters",
        SkipReason::Ignored => "used by tidywatch",
        SkipReason::NamedLikeCategory => "named like its category folder",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrganizeError;
    use std::path::PathBuf;

    fn event(name: &str, category: &str, outcome: Outcome) -> OrganizeEvent {
        let dest = matches!(outcome, Outcome::Moved | Outcome::Renamed)
            .then(|| PathBuf::from("/w").join(category).join(name));
        OrganizeEvent::new(PathBuf::from("/w").join(name), category.to_string(), dest, outcome)
    }

    #[test]
    fn test_summary_counts_outcomes() {
        let events = [
            event("a.pdf", "Documents", Outcome::Moved),
            event("b.pdf", "Documents", Outcome::Renamed),
            event("c.jpg", "Images", Outcome::Moved),
            event(
                ".x",
                "Other",
                Outcome::Skipped {
                    reason: SkipReason::Filtered,
                },
            ),
            event(
                "d.mp3",
                "Audio",
                Outcome::Failed {
                    error: OrganizeError::SourceMissing(PathBuf::from("/w/d.mp3")),
                },
            ),
        ];

        let summary: Summary = events.iter().collect();

        assert_eq!(summary.moved.get("Documents"), Some(&2));
        assert_eq!(summary.moved.get("Images"), Some(&1));
        assert_eq!(summary.total_moved(), 3);
        assert_eq!(summary.renamed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_format_event_hides_skips_unless_verbose() {
        colored::control::set_override(false);
        let root = Path::new("/w");
        let skipped = event(
            "folder",
            "Other",
            Outcome::Skipped {
                reason: SkipReason::Directory,
            },
        );
        let moved = event("a.pdf", "Documents", Outcome::Moved);

        assert!(OutputFormatter::format_event(&skipped, root, false).is_none());
        assert_eq!(
            OutputFormatter::format_event(&skipped, root, true).as_deref(),
            Some("· folder (directory)")
        );
        assert_eq!(
            OutputFormatter::format_event(&moved, root, false).as_deref(),
            Some("✓ a.pdf → Documents/a.pdf")
        );
    }

    #[test]
    fn test_json_line_is_single_line() {
        let line = OutputFormatter::format_event_json(&event("a.pdf", "Documents", Outcome::Renamed));
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["outcome"]["kind"], "renamed");
    }
}
