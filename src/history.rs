//! Transaction log for one organized directory.
//!
//! Each committed transaction is one JSON line in
//! `<root>/.smartsort/history.jsonl`. Appends are fsynced; updates (undo
//! flags) rewrite the whole file through a temp file and rename.

use crate::classifier::ClassificationBasis;
use crate::file_category::Category;
use crate::file_organizer::{OrganizeError, OrganizeResult};
use crate::plan::PlanEntry;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// State directory created under the organized root.
pub const STATE_DIR: &str = ".smartsort";

const HISTORY_FILE: &str = "history.jsonl";
const BACKUPS_DIR: &str = "backups";
const LOCK_FILE: &str = "lock";
const JOURNAL_DIR: &str = "journal";
const ID_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Outcome of one entry of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryStatus {
    /// Moved (or, in preview, would be moved).
    Succeeded,
    /// Source already gone; nothing to do.
    AlreadyApplied,
    /// Destination occupied; source untouched.
    Conflict { reason: String },
    /// I/O failure; source untouched.
    Failed { reason: String },
}

impl EntryStatus {
    pub fn is_moved(&self) -> bool {
        matches!(self, EntryStatus::Succeeded)
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, EntryStatus::Conflict { .. } | EntryStatus::Failed { .. })
    }
}

/// One entry of a transaction as written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub category: Category,
    pub basis: ClassificationBasis,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Backup copy of the source, taken before it was moved.
    #[serde(default)]
    pub backup: Option<PathBuf>,
    pub size: u64,
    pub status: EntryStatus,
    /// Set once undo has moved this entry back.
    #[serde(default)]
    pub restored: bool,
}

impl AppliedEntry {
    pub fn from_plan_entry(entry: &PlanEntry, status: EntryStatus) -> Self {
        Self {
            source: entry.source.clone(),
            destination: entry.destination.clone(),
            category: entry.category,
            basis: entry.basis.clone(),
            confidence: entry.confidence,
            backup: None,
            size: entry.size,
            status,
            restored: false,
        }
    }
}

/// A committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub created_at: DateTime<Local>,
    pub root: PathBuf,
    #[serde(default)]
    pub backup_root: Option<PathBuf>,
    pub entries: Vec<AppliedEntry>,
    #[serde(default)]
    pub reverted_at: Option<DateTime<Local>>,
    /// Directories this transaction created; undo removes them when empty.
    #[serde(default)]
    pub created_dirs: Vec<PathBuf>,
    /// Rebuilt from the journal of a commit that never reached its log append.
    #[serde(default)]
    pub interrupted: bool,
}

impl TransactionRecord {
    pub fn is_reverted(&self) -> bool {
        self.reverted_at.is_some()
    }

    /// Number of entries whose file was moved.
    pub fn moved_count(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_moved()).count()
    }

    /// Moved entries that undo has not yet restored.
    pub fn pending_restore(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status.is_moved() && !e.restored)
            .count()
    }

    /// Not reverted and has at least one moved file.
    pub fn is_undoable(&self) -> bool {
        !self.is_reverted() && self.moved_count() > 0
    }
}

/// The transaction log and state paths of one root directory.
#[derive(Debug, Clone)]
pub struct LogStore {
    root: PathBuf,
    state_dir: PathBuf,
}

impl LogStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            state_dir: root.join(STATE_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join(HISTORY_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    /// Backup snapshot directory for transaction `id`.
    pub fn backup_dir(&self, id: &str) -> PathBuf {
        self.state_dir.join(BACKUPS_DIR).join(id)
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.state_dir.join(JOURNAL_DIR)
    }

    /// Write-ahead journal of the in-progress commit `id`.
    pub fn journal_path(&self, id: &str) -> PathBuf {
        self.journal_dir().join(format!("{}.jsonl", id))
    }

    pub fn ensure_state_dir(&self) -> OrganizeResult<()> {
        fs::create_dir_all(&self.state_dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
            path: self.state_dir.clone(),
            source: e,
        })
    }

    /// A fresh timestamp-based ID not used by any logged transaction, backup
    /// or journal.
    pub fn next_id(&self) -> OrganizeResult<String> {
        let used: HashSet<String> = self.load_all()?.into_iter().map(|r| r.id).collect();
        let base = Local::now().format(ID_FORMAT).to_string();
        let mut id = base.clone();
        let mut n = 1;
        while used.contains(&id)
            || self.backup_dir(&id).exists()
            || self.journal_path(&id).exists()
        {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        Ok(id)
    }

    /// Appends one record and syncs it to disk.
    ///
    /// A torn tail left by an interrupted append is cut off first, so the new
    /// record always starts on a line of its own.
    pub fn append(&self, record: &TransactionRecord) -> OrganizeResult<()> {
        self.ensure_state_dir()?;
        let line = encode_line(record)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(self.history_path())
            .map_err(|e| OrganizeError::HistoryWriteFailed { source: e })?;
        truncate_torn_tail(&mut file).map_err(|e| OrganizeError::HistoryWriteFailed { source: e })?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| OrganizeError::HistoryWriteFailed { source: e })?;

        debug!("Logged transaction {} ({} entries)", record.id, record.entries.len());
        Ok(())
    }

    /// All records, oldest first. A missing log is an empty history.
    ///
    /// A truncated final line (an interrupted append) is skipped with a
    /// warning; corruption anywhere else is an error.
    pub fn load_all(&self) -> OrganizeResult<Vec<TransactionRecord>> {
        let path = self.history_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OrganizeError::HistoryReadFailed { source: e }),
        };

        let lines: Vec<(usize, &str)> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();
        let last = lines.len().saturating_sub(1);

        let mut records = Vec::with_capacity(lines.len());
        for (position, (line_no, line)) in lines.into_iter().enumerate() {
            match serde_json::from_str::<TransactionRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) if position == last && !content.ends_with('\n') => {
                    warn!("Ignoring incomplete last line of {}: {}", path.display(), e);
                }
                Err(e) => {
                    return Err(OrganizeError::InvalidHistoryFormat {
                        reason: format!("line {}: {}", line_no + 1, e),
                    });
                }
            }
        }
        Ok(records)
    }

    /// The most recent transaction (reverted or not).
    pub fn latest(&self) -> OrganizeResult<Option<TransactionRecord>> {
        Ok(self.load_all()?.pop())
    }

    /// The most recent transaction that undo can still revert.
    ///
    /// Records where nothing moved (only conflicts or failures) are skipped.
    pub fn latest_active(&self) -> OrganizeResult<Option<TransactionRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .rev()
            .find(TransactionRecord::is_undoable))
    }

    pub fn find(&self, id: &str) -> OrganizeResult<Option<TransactionRecord>> {
        Ok(self.load_all()?.into_iter().find(|r| r.id == id))
    }

    /// Replaces the logged record carrying the same ID.
    pub fn update(&self, record: &TransactionRecord) -> OrganizeResult<()> {
        let mut records = self.load_all()?;
        let slot = records
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| OrganizeError::UnknownTransaction {
                id: record.id.clone(),
            })?;
        *slot = record.clone();
        self.rewrite(&records)
    }

    fn rewrite(&self, records: &[TransactionRecord]) -> OrganizeResult<()> {
        let mut data = String::new();
        for record in records {
            data.push_str(&encode_line(record)?);
        }
        atomic_write(&self.history_path(), data.as_bytes())
            .map_err(|e| OrganizeError::HistoryWriteFailed { source: e })
    }
}

fn encode_line(record: &TransactionRecord) -> OrganizeResult<String> {
    let mut line = serde_json::to_string(record).map_err(|e| OrganizeError::HistoryWriteFailed {
        source: io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON serialization failed: {}", e),
        ),
    })?;
    line.push('\n');
    Ok(line)
}

/// Cuts `file` back to its last newline if it ends mid-line.
fn truncate_torn_tail(file: &mut File) -> io::Result<()> {
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    if content.is_empty() || content.ends_with(b"\n") {
        return Ok(());
    }
    let keep = content
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |i| i + 1);
    warn!(
        "Dropping {} bytes of an incomplete history line",
        content.len() - keep
    );
    file.set_len(keep as u64)
}

/// Writes `data` to a sibling temp file, syncs it, and renames it over `path`.
fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.tmp", file_name));

    let written = File::create(&temp_path).and_then(|mut file| {
        file.write_all(data)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|_| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    sync_dir(parent);
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(dir) = File::open(dir) {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
