//! Command orchestration for smartsort.
//!
//! Each command wires the library pieces together: scan, classify, plan,
//! then preview or commit; or undo; or a stats lookup. User-facing output
//! goes through [`OutputFormatter`].

use crate::classifier::{
    ClassificationOutcome, ClassificationPolicy, Classifier, classify_all, classify_candidate,
};
use crate::config::{AppConfig, ConfigError};
use crate::file_category::Category;
use crate::file_organizer::{ApplyOptions, FileOrganizer, Mode, OrganizeError, TransactionResult};
use crate::history::{LogStore, TransactionRecord};
use crate::i18n::{Language, Message};
use crate::journal;
use crate::output::OutputFormatter;
use crate::plan::{self, Plan};
use crate::provider::HttpClassifier;
use crate::scan::{Candidate, ScanReport, scan_directory};
use crate::stats::{self, Stats};
use crate::undo::UndoManager;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// How a command finished when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Some entries conflicted or failed.
    Partial,
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Organize(#[from] OrganizeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Cannot read input: {0}")]
    Prompt(#[from] io::Error),
    #[error("Cannot resolve {}: {source}", path.display())]
    InvalidPath { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct OrganizeArgs {
    pub dir: PathBuf,
    pub provider: Option<String>,
    pub preview: bool,
    pub recursive: bool,
    pub interactive: bool,
    pub yes: bool,
}

/// A CLI command to execute.
#[derive(Debug, Clone)]
pub enum Command {
    Organize(OrganizeArgs),
    Analyze {
        file: PathBuf,
        provider: Option<String>,
    },
    Undo {
        dir: PathBuf,
    },
    Stats {
        dir: PathBuf,
        id: Option<String>,
    },
}

/// Settings shared by every command.
pub struct CliContext {
    pub config: AppConfig,
    pub language: Language,
    /// Checked between entries while committing.
    pub cancel: Arc<AtomicBool>,
}

/// Runs one command to completion.
pub fn run(command: Command, ctx: &CliContext) -> Result<RunStatus, CliError> {
    match command {
        Command::Organize(args) => organize(&args, ctx),
        Command::Analyze { file, provider } => analyze(&file, provider.as_deref(), ctx),
        Command::Undo { dir } => undo(&dir, ctx),
        Command::Stats { dir, id } => show_stats(&dir, id.as_deref(), ctx),
    }
}

/// Makes Ctrl-C set `cancel` so a commit stops between entries.
///
/// A second Ctrl-C exits immediately with status 130.
pub fn install_interrupt_handler(cancel: &Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    let flag = Arc::clone(cancel);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
}

/// Scans `root`, classifies every candidate and builds the move plan.
///
/// `on_progress` is called after each classification.
pub fn plan_directory<F>(
    root: &Path,
    recursive: bool,
    config: &AppConfig,
    classifier: Option<&dyn Classifier>,
    on_progress: F,
) -> Result<(ScanReport, Plan), OrganizeError>
where
    F: FnMut(&Candidate, &ClassificationOutcome),
{
    let filters = config.compile_filters()?;
    let mapper = config.file_mapper()?;
    let categories: Vec<Category> = mapper.configured().collect();
    let policy = ClassificationPolicy::from_config(&config.organization);

    let report = scan_directory(root, recursive, &filters)?;
    let outcomes = classify_all(
        &report.candidates,
        classifier,
        &policy,
        &categories,
        on_progress,
    );
    let plan = plan::build_plan(root, &report.candidates, &outcomes, &mapper)?;
    Ok((report, plan))
}

/// Builds the classifier for the selected provider.
///
/// No provider selected means extension-only mode. A provider without an
/// API key is reported and also falls back to extension-only mode.
pub fn build_classifier(
    config: &AppConfig,
    provider_override: Option<&str>,
) -> Result<Option<HttpClassifier>, ConfigError> {
    let Some(name) = config.provider_name(provider_override) else {
        info!("No AI provider selected; categorizing by extension");
        return Ok(None);
    };
    let provider = config.provider(name)?;
    match HttpClassifier::new(name, provider) {
        Ok(classifier) => Ok(Some(classifier)),
        Err(e) => {
            OutputFormatter::warning(&format!("{}; categorizing by extension", e));
            Ok(None)
        }
    }
}

fn canonical_dir(dir: &Path) -> Result<PathBuf, CliError> {
    dir.canonicalize().map_err(|source| CliError::InvalidPath {
        path: dir.to_path_buf(),
        source,
    })
}

fn organize(args: &OrganizeArgs, ctx: &CliContext) -> Result<RunStatus, CliError> {
    let lang = ctx.language;
    let root = canonical_dir(&args.dir)?;
    OutputFormatter::info(&format!("{}: {}", lang.text(Message::Organizing), root.display()));
    if args.preview {
        OutputFormatter::preview_notice(lang);
    }

    let classifier = build_classifier(&ctx.config, args.provider.as_deref())?;
    let classifier_ref = classifier.as_ref().map(|c| c as &dyn Classifier);

    OutputFormatter::plain(lang.text(Message::Scanning));
    let mut progress = None;
    let (report, mut plan) = plan_directory(
        &root,
        args.recursive,
        &ctx.config,
        classifier_ref,
        |candidate, _| {
            let pb = progress.get_or_insert_with(|| {
                let pb = OutputFormatter::create_progress_bar(0);
                pb.set_message(lang.text(Message::Classifying));
                pb
            });
            pb.inc_length(1);
            pb.inc(1);
            pb.set_message(candidate.file_name());
        },
    )?;
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    for error in &report.errors {
        OutputFormatter::warning(&error.to_string());
    }
    if plan.is_empty() {
        OutputFormatter::info(lang.text(Message::NothingToDo));
        return Ok(if report.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        });
    }

    if args.interactive && !args.preview {
        let mut decisions = Vec::with_capacity(plan.len());
        for entry in &plan.entries {
            let prompt = format!(
                "{} {} -> {}?",
                lang.text(Message::ConfirmEntry),
                entry.source.strip_prefix(&root).unwrap_or(&entry.source).display(),
                entry
                    .destination
                    .strip_prefix(&root)
                    .unwrap_or(&entry.destination)
                    .display()
            );
            decisions.push(prompt_confirm(&prompt, Some(true))?);
        }
        let mut decisions = decisions.into_iter();
        plan.retain(|_| decisions.next().unwrap_or(false));
        if plan.is_empty() {
            OutputFormatter::warning(lang.text(Message::Aborted));
            return Ok(RunStatus::Success);
        }
    }

    OutputFormatter::plan_table(&plan, lang);

    let mode = if args.preview {
        Mode::Preview
    } else {
        let confirmed = args.yes
            || args.interactive
            || prompt_confirm(lang.text(Message::ConfirmCommit), Some(false))?;
        if !confirmed {
            OutputFormatter::warning(lang.text(Message::Aborted));
            return Ok(RunStatus::Success);
        }
        Mode::Commit
    };

    let store = LogStore::new(&root);
    let options = ApplyOptions {
        create_backup: ctx.config.organization.create_backup,
        cancel: Some(Arc::clone(&ctx.cancel)),
    };
    let result = FileOrganizer::apply(&plan, mode, &store, &options)?;
    let recovered = report_recovered(&result.recovered, lang);
    report_result(&result, &root, &report, lang);

    Ok(if recovered || result.has_problems() || !report.errors.is_empty() {
        RunStatus::Partial
    } else {
        RunStatus::Success
    })
}

fn report_result(result: &TransactionResult, root: &Path, scan: &ScanReport, lang: Language) {
    OutputFormatter::entry_problems(result, root);
    let mut stats = Stats::from_result(result);
    stats.failed += scan.errors.len();
    OutputFormatter::summary_table(&stats, lang);

    if result.was_cancelled() {
        OutputFormatter::warning(&format!(
            "{} ({})",
            lang.text(Message::Cancelled),
            result.not_attempted
        ));
    }
    if let Some(id) = &result.transaction_id {
        OutputFormatter::success(&format!("{}: {}", lang.text(Message::Committed), id));
    }
}

/// Warns about interrupted runs that were just logged; true if there were any.
fn report_recovered(records: &[TransactionRecord], lang: Language) -> bool {
    for record in records {
        OutputFormatter::warning(&format!(
            "{}: {} ({})",
            lang.text(Message::Interrupted),
            record.id,
            record.moved_count()
        ));
    }
    !records.is_empty()
}

fn analyze(file: &Path, provider: Option<&str>, ctx: &CliContext) -> Result<RunStatus, CliError> {
    let lang = ctx.language;
    let path = file.canonicalize().map_err(|source| CliError::InvalidPath {
        path: file.to_path_buf(),
        source,
    })?;
    let root = path.parent().unwrap_or(Path::new("/"));
    let candidate = Candidate::from_path(root, &path).map_err(OrganizeError::from)?;

    let mapper = ctx.config.file_mapper()?;
    let categories: Vec<Category> = mapper.configured().collect();
    let policy = ClassificationPolicy::from_config(&ctx.config.organization);
    let classifier = build_classifier(&ctx.config, provider)?;
    let outcome = classify_candidate(
        &candidate,
        classifier.as_ref().map(|c| c as &dyn Classifier),
        &policy,
        &categories,
    );
    let plan = plan::build_plan(
        root,
        std::slice::from_ref(&candidate),
        std::slice::from_ref(&outcome),
        &mapper,
    )
    .map_err(OrganizeError::from)?;

    OutputFormatter::header(lang.text(Message::Analysis));
    OutputFormatter::plain(&format!("File:       {}", candidate.file_name()));
    OutputFormatter::plain(&format!("Size:       {} bytes", candidate.size));
    if let Some(mime) = &candidate.mime_type {
        OutputFormatter::plain(&format!("MIME type:  {}", mime));
    }
    OutputFormatter::plain(&format!("Basis:      {}", outcome.basis.label()));
    if let Some(entry) = plan.entries.first() {
        OutputFormatter::plain(&format!("Category:   {}", entry.category));
        let name = entry
            .destination
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        OutputFormatter::plain(&format!("Suggested:  {}", name));
    }
    if let Some(suggestion) = &outcome.suggestion {
        if let Some(confidence) = suggestion.confidence {
            OutputFormatter::plain(&format!("Confidence: {:.2}", confidence));
        }
        if let Some(reason) = &suggestion.reason {
            OutputFormatter::plain(&format!("Reason:     {}", reason));
        }
    }
    Ok(RunStatus::Success)
}

fn undo(dir: &Path, ctx: &CliContext) -> Result<RunStatus, CliError> {
    let lang = ctx.language;
    let root = canonical_dir(dir)?;
    OutputFormatter::info(&format!("{} {}", lang.text(Message::Undoing), root.display()));

    let store = LogStore::new(&root);
    let report = UndoManager::undo(&root, &store)?;
    let recovered = report_recovered(&report.recovered, lang);
    OutputFormatter::undo_report(&report, &root, lang);

    Ok(if report.is_complete_success() && !recovered {
        RunStatus::Success
    } else {
        RunStatus::Partial
    })
}

fn show_stats(dir: &Path, id: Option<&str>, ctx: &CliContext) -> Result<RunStatus, CliError> {
    let root = canonical_dir(dir)?;
    let store = LogStore::new(&root);
    let pending = journal::pending_ids(&store)?;
    for id in &pending {
        OutputFormatter::warning(&format!(
            "{}: {}",
            ctx.language.text(Message::PendingJournal),
            id
        ));
    }
    let status = if pending.is_empty() {
        RunStatus::Success
    } else {
        RunStatus::Partial
    };

    match stats::transaction_summary(&store, id) {
        Ok((record, stats)) => {
            OutputFormatter::transaction_header(&record);
            OutputFormatter::summary_table(&stats, ctx.language);
            Ok(status)
        }
        Err(OrganizeError::NoTransaction { .. }) => {
            OutputFormatter::warning(ctx.language.text(Message::NoHistory));
            Ok(status)
        }
        Err(e) => Err(e.into()),
    }
}

/// Asks a yes/no question on stdin; empty input (or EOF) takes `default`.
fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();
    loop {
        input.clear();
        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }
        match input.trim().to_uppercase().as_str() {
            "Y" | "YES" => return Ok(true),
            "N" | "NO" => return Ok(false),
            "" => {
                if let Some(answer) = default {
                    return Ok(answer);
                }
            }
            other => warn!("Unrecognized answer '{}'", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    use tempfile::TempDir;

    fn context() -> CliContext {
        CliContext {
            config: AppConfig::default(),
            language: Language::En,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn test_undo_without_history_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = run(
            Command::Undo {
                dir: temp_dir.path().to_path_buf(),
            },
            &context(),
        );
        assert!(matches!(
            result,
            Err(CliError::Organize(OrganizeError::NoTransaction { .. }))
        ));
    }

    #[test]
    fn test_stats_flags_unlogged_run() {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::new(temp_dir.path());
        drop(journal::Journal::begin(&store, "crashed").unwrap());

        let status = run(
            Command::Stats {
                dir: temp_dir.path().to_path_buf(),
                id: None,
            },
            &context(),
        )
        .unwrap();
        assert_eq!(status, RunStatus::Partial);
    }

    #[cfg(unix)]
    #[test]
    fn test_ctrl_c_sets_cancel_flag() {
        let ctx = context();
        install_interrupt_handler(&ctx.cancel).unwrap();

        std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status()
            .unwrap();
        for _ in 0..100 {
            if ctx.cancel.load(Ordering::SeqCst) {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        assert!(ctx.cancel.load(Ordering::SeqCst));
    }

    #[test]
    fn test_no_provider_means_extension_mode() {
        let config = AppConfig::default();
        assert!(build_classifier(&config, None).unwrap().is_none());
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let config = AppConfig::default();
        assert!(matches!(
            build_classifier(&config, Some("nowhere")),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_provider_without_key_falls_back() {
        let mut config = AppConfig::default();
        config.ai_providers.insert(
            "smartsort-cli-test-keyless".to_string(),
            ProviderConfig {
                api_key: None,
                base_url: "http://localhost:9".to_string(),
                model: "m".to_string(),
                timeout_secs: 1,
            },
        );
        let classifier = build_classifier(&config, Some("smartsort-cli-test-keyless")).unwrap();
        assert!(classifier.is_none());
    }
}
