//! Transaction engine: applies a plan in preview or commit mode.
//!
//! Commit moves each planned file into its category directory, taking a
//! backup copy first, and appends one record to the directory's log once all
//! entries are processed. Preview runs the same checks and touches nothing.
//! A journal written ahead of each move lets the next commit or undo log a
//! run that died before its append.
use crate::config::ConfigError;
use crate::history::{AppliedEntry, EntryStatus, LogStore, TransactionRecord};
use crate::journal::{self, Journal};
use crate::lock::DirLock;
use crate::plan::{Plan, PlanEntry, PlanError};
use crate::scan::ScanError;
use chrono::Local;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that abort a whole operation.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// The base directory path is invalid or doesn't exist.
    #[error("Invalid base path {}: {source}", path.display())]
    InvalidBasePath { path: PathBuf, source: io::Error },
    #[error("Failed to create directory {}: {source}", path.display())]
    DirectoryCreationFailed { path: PathBuf, source: io::Error },
    #[error("Failed to write history file: {source}")]
    HistoryWriteFailed { source: io::Error },
    #[error("Failed to read history file: {source}")]
    HistoryReadFailed { source: io::Error },
    #[error("Invalid history file format: {reason}")]
    InvalidHistoryFormat { reason: String },
    /// Another process holds the directory lock.
    #[error("Directory is locked by another smartsort process ({})", path.display())]
    Locked { path: PathBuf },
    #[error("No transaction to undo in {}", root.display())]
    NoTransaction { root: PathBuf },
    #[error("Transaction {id} not found")]
    UnknownTransaction { id: String },
    /// Files were moved but the log append failed.
    #[error("{moved} file(s) were moved but no undo record could be written: {reason}")]
    UnloggedMoves { moved: usize, reason: String },
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Per-entry failure; recorded in the entry's status, never fatal.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("destination {} already exists", .0.display())]
    Conflict(PathBuf),
    #[error("{}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl EntryError {
    fn io(path: &Path, source: io::Error) -> Self {
        EntryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn into_status(self) -> EntryStatus {
        let reason = self.to_string();
        match self {
            EntryError::Conflict(_) => EntryStatus::Conflict { reason },
            EntryError::Io { .. } => EntryStatus::Failed { reason },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Preview,
    Commit,
}

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub create_backup: bool,
    /// Checked between entries; set it to stop after the current entry.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            create_backup: true,
            cancel: None,
        }
    }
}

impl ApplyOptions {
    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

/// What an `apply` call did (or, in preview, would do).
#[derive(Debug, Clone)]
pub struct TransactionResult {
    pub mode: Mode,
    /// Set when a record was written.
    pub transaction_id: Option<String>,
    pub entries: Vec<AppliedEntry>,
    /// Plan entries never reached because of cancellation.
    pub not_attempted: usize,
    /// Interrupted earlier commits logged before this one started.
    pub recovered: Vec<TransactionRecord>,
}

impl TransactionResult {
    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, EntryStatus::Succeeded))
    }

    pub fn already_applied(&self) -> usize {
        self.count(|s| matches!(s, EntryStatus::AlreadyApplied))
    }

    pub fn conflicts(&self) -> usize {
        self.count(|s| matches!(s, EntryStatus::Conflict { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, EntryStatus::Failed { .. }))
    }

    pub fn was_cancelled(&self) -> bool {
        self.not_attempted > 0
    }

    /// True when any entry conflicted or failed.
    pub fn has_problems(&self) -> bool {
        self.entries.iter().any(|e| e.status.is_problem())
    }

    fn count<F: Fn(&EntryStatus) -> bool>(&self, pred: F) -> usize {
        self.entries.iter().filter(|e| pred(&e.status)).count()
    }
}

/// Applies plans to the filesystem.
pub struct FileOrganizer;

impl FileOrganizer {
    /// Runs `plan` in the given mode.
    ///
    /// Commit holds the directory lock for the whole run. It first logs any
    /// earlier commit that was interrupted before its log append (see
    /// [`journal::recover_interrupted`]), then journals each entry before
    /// moving it. One record is appended when a file moved or an entry
    /// conflicted or failed. A failed append after moves is reported as
    /// [`OrganizeError::UnloggedMoves`] and the journal is kept for recovery.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use smartsort::file_organizer::{ApplyOptions, FileOrganizer, Mode};
    /// use smartsort::history::LogStore;
    /// use smartsort::plan::Plan;
    /// use std::path::Path;
    ///
    /// let root = Path::new("/path/to/downloads");
    /// let plan = Plan { root: root.to_path_buf(), ..Plan::default() };
    /// let store = LogStore::new(root);
    /// let result = FileOrganizer::apply(&plan, Mode::Preview, &store, &ApplyOptions::default());
    /// match result {
    ///     Ok(r) => println!("{} file(s) would move", r.succeeded()),
    ///     Err(e) => eprintln!("Organization failed: {}", e),
    /// }
    /// ```
    pub fn apply(
        plan: &Plan,
        mode: Mode,
        store: &LogStore,
        options: &ApplyOptions,
    ) -> OrganizeResult<TransactionResult> {
        validate_root(&plan.root)?;
        if mode == Mode::Preview {
            let entries: Vec<AppliedEntry> = plan
                .entries
                .iter()
                .take_while(|_| !options.is_cancelled())
                .map(Self::preview_entry)
                .collect();
            return Ok(TransactionResult {
                mode,
                transaction_id: None,
                not_attempted: plan.entries.len() - entries.len(),
                entries,
                recovered: Vec::new(),
            });
        }

        let _lock = DirLock::acquire(store)?;
        let recovered = journal::recover_interrupted(store)?;
        let id = store.next_id()?;
        let backup_root = options.create_backup.then(|| store.backup_dir(&id));
        let missing = missing_dirs(plan);
        let mut journal = Journal::begin(store, &id)?;

        let mut entries = Vec::with_capacity(plan.entries.len());
        for planned in &plan.entries {
            if options.is_cancelled() {
                info!(
                    "Cancelled after {} of {} entries",
                    entries.len(),
                    plan.entries.len()
                );
                break;
            }
            entries.push(Self::commit_entry(
                &plan.root,
                planned,
                backup_root.as_deref(),
                &mut journal,
            ));
        }
        let not_attempted = plan.entries.len() - entries.len();

        let mut result = TransactionResult {
            mode,
            transaction_id: None,
            entries,
            not_attempted,
            recovered,
        };

        let moved = result.succeeded();
        if moved == 0
            && let Some(dir) = &backup_root
            && dir.exists()
            && let Err(e) = fs::remove_dir_all(dir)
        {
            warn!("Could not remove empty backup {}: {}", dir.display(), e);
        }
        if moved == 0 && !result.has_problems() {
            journal.finish();
            debug!("Nothing moved; no transaction recorded");
            return Ok(result);
        }

        let record = TransactionRecord {
            id: id.clone(),
            created_at: Local::now(),
            root: plan.root.clone(),
            backup_root: backup_root.filter(|_| moved > 0),
            entries: result.entries.clone(),
            reverted_at: None,
            created_dirs: missing.into_iter().filter(|d| d.is_dir()).collect(),
            interrupted: false,
        };
        match store.append(&record) {
            Ok(()) => journal.finish(),
            Err(e) if moved > 0 => {
                return Err(OrganizeError::UnloggedMoves {
                    moved,
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                journal.finish();
                return Err(e);
            }
        }

        info!("Committed transaction {} ({} moved)", id, moved);
        result.transaction_id = Some(id);
        Ok(result)
    }

    fn preview_entry(planned: &PlanEntry) -> AppliedEntry {
        let status = match planned.source.symlink_metadata() {
            Err(e) if e.kind() == io::ErrorKind::NotFound => EntryStatus::AlreadyApplied,
            Err(e) => EntryError::io(&planned.source, e).into_status(),
            Ok(_) if planned.destination != planned.source && exists(&planned.destination) => {
                EntryError::Conflict(planned.destination.clone()).into_status()
            }
            Ok(_) => EntryStatus::Succeeded,
        };
        AppliedEntry::from_plan_entry(planned, status)
    }

    fn commit_entry(
        root: &Path,
        planned: &PlanEntry,
        backup_root: Option<&Path>,
        journal: &mut Journal,
    ) -> AppliedEntry {
        let mut applied = AppliedEntry::from_plan_entry(planned, EntryStatus::Succeeded);

        match planned.source.symlink_metadata() {
            Ok(metadata) => applied.size = metadata.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} already gone", planned.source.display());
                applied.status = EntryStatus::AlreadyApplied;
                return applied;
            }
            Err(e) => {
                applied.status = EntryError::io(&planned.source, e).into_status();
                return applied;
            }
        }

        match Self::move_with_backup(root, &applied, backup_root, journal) {
            Ok(backup) => {
                debug!(
                    "Moved {} -> {}",
                    planned.source.display(),
                    planned.destination.display()
                );
                applied.backup = backup;
            }
            Err(e) => {
                warn!("{}: {}", planned.source.display(), e);
                applied.status = e.into_status();
            }
        }
        applied
    }

    fn move_with_backup(
        root: &Path,
        applied: &AppliedEntry,
        backup_root: Option<&Path>,
        journal: &mut Journal,
    ) -> Result<Option<PathBuf>, EntryError> {
        if let Some(parent) = applied.destination.parent() {
            fs::create_dir_all(parent).map_err(|e| EntryError::io(parent, e))?;
        }
        if exists(&applied.destination) {
            return Err(EntryError::Conflict(applied.destination.clone()));
        }

        let guard = match backup_root {
            Some(dir) => Some(BackupGuard::create(root, &applied.source, dir)?),
            None => None,
        };
        let intent = AppliedEntry {
            backup: guard.as_ref().map(|g| g.path.clone()),
            ..applied.clone()
        };
        journal
            .record_intent(&intent)
            .map_err(|e| EntryError::io(journal.path(), e))?;
        move_no_clobber(&applied.source, &applied.destination)?;
        Ok(guard.map(BackupGuard::keep))
    }
}

/// Directories under the plan root that destinations need and that do not
/// exist yet, deepest first.
fn missing_dirs(plan: &Plan) -> Vec<PathBuf> {
    let mut missing = BTreeSet::new();
    for entry in &plan.entries {
        let mut dir = entry.destination.parent();
        while let Some(path) = dir {
            if path == plan.root || !path.starts_with(&plan.root) || exists(path) {
                break;
            }
            missing.insert(path.to_path_buf());
            dir = path.parent();
        }
    }
    let mut missing: Vec<PathBuf> = missing.into_iter().collect();
    missing.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
    missing
}

/// Backup copy that deletes itself unless [`BackupGuard::keep`] is called.
struct BackupGuard {
    path: PathBuf,
    armed: bool,
}

impl BackupGuard {
    fn create(root: &Path, source: &Path, backup_root: &Path) -> Result<Self, EntryError> {
        let relative = match source.strip_prefix(root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => PathBuf::from(source.file_name().unwrap_or(source.as_os_str())),
        };
        let path = backup_root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| EntryError::io(parent, e))?;
        }

        // Armed before copying so a partial copy is removed too.
        let guard = Self { path, armed: true };
        fs::copy(source, &guard.path).map_err(|e| EntryError::io(source, e))?;
        Ok(guard)
    }

    fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Could not remove partial backup {}: {}", self.path.display(), e);
        }
    }
}

fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

fn validate_root(root: &Path) -> OrganizeResult<()> {
    match fs::metadata(root) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(OrganizeError::InvalidBasePath {
            path: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        }),
        Err(e) => Err(OrganizeError::InvalidBasePath {
            path: root.to_path_buf(),
            source: e,
        }),
    }
}

/// Moves `source` to `destination`, refusing to replace an existing file.
///
/// Uses a hard link plus unlink so an existing destination fails atomically;
/// filesystems without hard links fall back to check-then-rename.
pub(crate) fn move_no_clobber(source: &Path, destination: &Path) -> Result<(), EntryError> {
    match fs::hard_link(source, destination) {
        Ok(()) => fs::remove_file(source).map_err(|e| {
            let _ = fs::remove_file(destination);
            EntryError::io(source, e)
        }),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(EntryError::Conflict(destination.to_path_buf()))
        }
        Err(e) => {
            debug!("hard link failed ({}); falling back to rename", e);
            if exists(destination) {
                return Err(EntryError::Conflict(destination.to_path_buf()));
            }
            fs::rename(source, destination).map_err(|e| EntryError::io(source, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationBasis;
    use crate::file_category::Category;
    use tempfile::TempDir;

    fn entry(root: &Path, name: &str, category: Category) -> PlanEntry {
        PlanEntry {
            source: root.join(name),
            destination: root.join("organized").join(category.dir_name()).join(name),
            category,
            disambiguator: None,
            basis: ClassificationBasis::Disabled,
            category_from_classifier: false,
            confidence: None,
            reason: None,
            size: 0,
        }
    }

    fn plan(root: &Path, entries: Vec<PlanEntry>) -> Plan {
        Plan {
            root: root.to_path_buf(),
            entries,
            ..Plan::default()
        }
    }

    #[test]
    fn test_commit_moves_and_backs_up() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("test.txt"), "test content").unwrap();

        let store = LogStore::new(root);
        let plan = plan(root, vec![entry(root, "test.txt", Category::Documents)]);
        let result =
            FileOrganizer::apply(&plan, Mode::Commit, &store, &ApplyOptions::default()).unwrap();

        assert_eq!(result.succeeded(), 1);
        assert!(!root.join("test.txt").exists());
        let moved = root.join("organized/documents/test.txt");
        assert_eq!(fs::read_to_string(&moved).unwrap(), "test content");

        let id = result.transaction_id.unwrap();
        let backup = store.backup_dir(&id).join("test.txt");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "test content");
        assert_eq!(result.entries[0].backup.as_deref(), Some(backup.as_path()));
        assert_eq!(result.entries[0].size, 12);

        let record = store.find(&id).unwrap().unwrap();
        assert_eq!(record.moved_count(), 1);
    }

    #[test]
    fn test_preview_touches_nothing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("test.txt"), "x").unwrap();

        let store = LogStore::new(root);
        let plan = plan(root, vec![entry(root, "test.txt", Category::Documents)]);
        let result =
            FileOrganizer::apply(&plan, Mode::Preview, &store, &ApplyOptions::default()).unwrap();

        assert_eq!(result.succeeded(), 1);
        assert!(result.transaction_id.is_none());
        assert!(root.join("test.txt").exists());
        assert!(!root.join("organized").exists());
        assert!(!store.state_dir().exists());
    }

    #[test]
    fn test_occupied_destination_is_conflict() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("test.txt"), "mine").unwrap();
        fs::create_dir_all(root.join("organized/documents")).unwrap();
        fs::write(root.join("organized/documents/test.txt"), "theirs").unwrap();

        let store = LogStore::new(root);
        let plan = plan(root, vec![entry(root, "test.txt", Category::Documents)]);
        let result =
            FileOrganizer::apply(&plan, Mode::Commit, &store, &ApplyOptions::default()).unwrap();

        assert_eq!(result.conflicts(), 1);
        assert!(result.has_problems());
        assert_eq!(fs::read_to_string(root.join("test.txt")).unwrap(), "mine");
        assert_eq!(
            fs::read_to_string(root.join("organized/documents/test.txt")).unwrap(),
            "theirs"
        );
        let id = result.transaction_id.unwrap();
        let record = store.find(&id).unwrap().unwrap();
        assert_eq!(record.moved_count(), 0);
        assert!(matches!(record.entries[0].status, EntryStatus::Conflict { .. }));
        assert!(record.backup_root.is_none());
        assert!(!store.backup_dir(&id).exists());
        assert!(store.latest_active().unwrap().is_none());
    }

    #[test]
    fn test_commit_records_created_dirs_only() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.png"), "b").unwrap();
        fs::create_dir_all(root.join("organized/images")).unwrap();

        let store = LogStore::new(root);
        let plan = plan(
            root,
            vec![
                entry(root, "a.txt", Category::Documents),
                entry(root, "b.png", Category::Images),
            ],
        );
        let result =
            FileOrganizer::apply(&plan, Mode::Commit, &store, &ApplyOptions::default()).unwrap();

        let record = store.find(&result.transaction_id.unwrap()).unwrap().unwrap();
        assert_eq!(record.created_dirs, vec![root.join("organized/documents")]);
        assert!(store.journal_dir().read_dir().unwrap().next().is_none());
    }

    #[test]
    fn test_commit_logs_earlier_interrupted_run() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let store = LogStore::new(root);

        // A run that died after moving a.txt but before its log append.
        let interrupted = entry(root, "a.txt", Category::Documents);
        fs::create_dir_all(root.join("organized/documents")).unwrap();
        fs::write(&interrupted.destination, "a").unwrap();
        let mut journal = Journal::begin(&store, "earlier").unwrap();
        journal
            .record_intent(&AppliedEntry::from_plan_entry(&interrupted, EntryStatus::Succeeded))
            .unwrap();
        drop(journal);

        fs::write(root.join("b.txt"), "b").unwrap();
        let plan = plan(root, vec![entry(root, "b.txt", Category::Documents)]);
        let result =
            FileOrganizer::apply(&plan, Mode::Commit, &store, &ApplyOptions::default()).unwrap();

        assert_eq!(result.recovered.len(), 1);
        assert_eq!(result.recovered[0].id, "earlier");
        let ids: Vec<String> = store.load_all().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids[0], "earlier");
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_missing_source_is_already_applied() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();

        let store = LogStore::new(root);
        let plan = plan(root, vec![entry(root, "gone.txt", Category::Documents)]);
        let result =
            FileOrganizer::apply(&plan, Mode::Commit, &store, &ApplyOptions::default()).unwrap();

        assert_eq!(result.already_applied(), 1);
        assert!(!result.has_problems());
        assert!(result.transaction_id.is_none());
    }

    #[test]
    fn test_cancel_stops_before_first_entry() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();

        let store = LogStore::new(root);
        let plan = plan(root, vec![entry(root, "a.txt", Category::Documents)]);
        let options = ApplyOptions {
            create_backup: true,
            cancel: Some(Arc::new(AtomicBool::new(true))),
        };
        let result = FileOrganizer::apply(&plan, Mode::Commit, &store, &options).unwrap();

        assert!(result.was_cancelled());
        assert!(result.entries.is_empty());
        assert!(root.join("a.txt").exists());
    }

    #[test]
    fn test_backups_can_be_disabled() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();

        let store = LogStore::new(root);
        let plan = plan(root, vec![entry(root, "a.txt", Category::Documents)]);
        let options = ApplyOptions {
            create_backup: false,
            cancel: None,
        };
        let result = FileOrganizer::apply(&plan, Mode::Commit, &store, &options).unwrap();

        assert_eq!(result.succeeded(), 1);
        assert!(result.entries[0].backup.is_none());
        let id = result.transaction_id.unwrap();
        assert!(!store.backup_dir(&id).exists());
    }

    #[test]
    fn test_move_no_clobber_refuses_existing() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let a = temp_dir.path().join("a");
        let b = temp_dir.path().join("b");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        assert!(matches!(move_no_clobber(&a, &b), Err(EntryError::Conflict(_))));
        assert_eq!(fs::read_to_string(&b).unwrap(), "b");
        assert!(a.exists());
    }

    #[test]
    fn test_invalid_base_path() {
        let root = Path::new("/non/existent/path");
        let store = LogStore::new(root);
        let result = FileOrganizer::apply(
            &plan(root, Vec::new()),
            Mode::Commit,
            &store,
            &ApplyOptions::default(),
        );
        assert!(matches!(result, Err(OrganizeError::InvalidBasePath { .. })));
    }
}
