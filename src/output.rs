//! Output formatting and styling module.
//!
//! All user-facing CLI output goes through [`OutputFormatter`]: colored
//! status lines, the classification progress bar, and the plan and summary
//! tables. Diagnostics go through `tracing` on stderr instead.

use crate::file_organizer::TransactionResult;
use crate::history::{EntryStatus, TransactionRecord};
use crate::i18n::{Language, Message};
use crate::plan::Plan;
use crate::stats::Stats;
use crate::undo::UndoReport;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// ```no_run
    /// use smartsort::output::OutputFormatter;
    /// OutputFormatter::success("File organized successfully!");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark, on stderr.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    pub fn preview_notice(language: Language) {
        println!(
            "{}",
            format!("[PREVIEW] {}", language.text(Message::PreviewNotice)).yellow()
        );
    }

    /// Creates a progress bar for per-file work.
    ///
    /// ```no_run
    /// use smartsort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// One line per planned move, relative to the plan root.
    pub fn plan_table(plan: &Plan, language: Language) {
        Self::header(language.text(Message::PlanHeading));
        for entry in &plan.entries {
            println!(
                "  {} {} {} {}",
                relative(&plan.root, &entry.source),
                "→".cyan(),
                relative(&plan.root, &entry.destination).green(),
                format!("[{}]", entry.basis.label()).dimmed()
            );
        }
    }

    /// Per-entry status lines for problems of an apply run.
    pub fn entry_problems(result: &TransactionResult, root: &Path) {
        for entry in &result.entries {
            match &entry.status {
                EntryStatus::Conflict { reason } => Self::warning(&format!(
                    "{}: conflict: {}",
                    relative(root, &entry.source),
                    reason
                )),
                EntryStatus::Failed { reason } => Self::error(&format!(
                    "{}: failed: {}",
                    relative(root, &entry.source),
                    reason
                )),
                EntryStatus::Succeeded | EntryStatus::AlreadyApplied => {}
            }
        }
    }

    /// Prints the category table followed by status and classification counts.
    pub fn summary_table(stats: &Stats, language: Language) {
        Self::header(language.text(Message::Summary));

        let width = stats
            .by_category
            .keys()
            .map(|c| c.dir_name().len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            language.text(Message::CategoryColumn).bold(),
            language.text(Message::FilesColumn).bold(),
            width = width
        );
        println!("{}", "-".repeat(width + 10));
        for (category, count) in &stats.by_category {
            println!(
                "{:<width$} | {} {}",
                category.dir_name(),
                count.to_string().green(),
                file_word(*count, language),
                width = width
            );
        }
        println!("{}", "-".repeat(width + 10));
        println!(
            "{:<width$} | {} {}",
            language.text(Message::TotalRow).bold(),
            stats.total.to_string().green().bold(),
            file_word(stats.total, language),
            width = width
        );
        println!("{}", summary_details(stats, language).join(", ").dimmed());
    }

    pub fn transaction_header(record: &TransactionRecord) {
        let state = if record.is_reverted() {
            "reverted".yellow()
        } else if record.pending_restore() < record.moved_count() {
            format!(
                "partially undone, {} of {} left",
                record.pending_restore(),
                record.moved_count()
            )
            .yellow()
        } else {
            "active".green()
        };
        println!(
            "{} {} ({}, {})",
            "Transaction".bold(),
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            state
        );
    }

    pub fn undo_report(report: &UndoReport, root: &Path, language: Language) {
        for conflict in &report.conflicts {
            Self::warning(&format!(
                "{}: {}",
                relative(root, &conflict.path),
                conflict.reason
            ));
        }
        let line = format!(
            "{} ({} restored, transaction {})",
            if report.fully_reverted {
                language.text(Message::UndoDone)
            } else {
                language.text(Message::UndoPartial)
            },
            report.restored,
            report.transaction_id
        );
        if report.fully_reverted {
            Self::success(&line);
        } else {
            Self::warning(&line);
        }
    }
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn file_word(count: usize, language: Language) -> &'static str {
    match language {
        Language::En if count == 1 => "file",
        Language::En => "files",
        Language::Zh => "个",
    }
}

/// Status and classification counts under the category table.
fn summary_details(stats: &Stats, language: Language) -> Vec<String> {
    let label = |message| language.text(message);
    let moved = if stats.preview {
        Message::WouldMove
    } else {
        Message::Moved
    };
    let mut details = vec![
        format!("{} {}", label(moved), stats.moved),
        format!("{} {}", label(Message::AlreadyApplied), stats.already_applied),
        format!("{} {}", label(Message::Conflicts), stats.conflicts),
        format!("{} {}", label(Message::Failed), stats.failed),
        format!("{} {}", label(Message::ClassifiedByAi), stats.classified),
    ];
    if stats.degraded > 0 {
        details.push(format!("{} {}", label(Message::Degraded), stats.degraded));
    }
    if stats.skipped_size > 0 {
        details.push(format!("{} {}", label(Message::SkippedSize), stats.skipped_size));
    }
    if stats.skipped_type > 0 {
        details.push(format!("{} {}", label(Message::SkippedType), stats.skipped_type));
    }
    if let Some(confidence) = stats.average_confidence {
        details.push(format!(
            "{} {:.2}",
            label(Message::AverageConfidence),
            confidence
        ));
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_summary_says_would_move() {
        let stats = Stats {
            moved: 2,
            preview: true,
            ..Stats::default()
        };
        assert_eq!(summary_details(&stats, Language::En)[0], "would move 2");

        let committed = Stats {
            preview: false,
            ..stats
        };
        assert_eq!(summary_details(&committed, Language::En)[0], "moved 2");
    }

    #[test]
    fn test_summary_labels_follow_language() {
        let stats = Stats {
            conflicts: 1,
            skipped_size: 3,
            ..Stats::default()
        };
        let zh = summary_details(&stats, Language::Zh);
        assert!(zh.contains(&"冲突 1".to_string()));
        assert!(zh.contains(&"跳过（大小） 3".to_string()));
        assert!(zh.iter().all(|d| !d.contains("conflicts")));
    }
}
