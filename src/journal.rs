//! Write-ahead journal for a commit in progress.
//!
//! Every entry is journaled after its backup is taken and before its file
//! moves. The journal is deleted once the transaction record is appended,
//! so a journal left behind belongs to a commit that never reached its log
//! append. [`recover_interrupted`] turns such journals into log records.

use crate::file_organizer::{OrganizeError, OrganizeResult};
use crate::history::{AppliedEntry, LogStore, TransactionRecord};
use chrono::Local;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Open journal of one commit.
pub struct Journal {
    path: PathBuf,
    file: File,
}

impl Journal {
    pub fn begin(store: &LogStore, id: &str) -> OrganizeResult<Self> {
        let dir = store.journal_dir();
        fs::create_dir_all(&dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
            path: dir.clone(),
            source: e,
        })?;
        let path = store.journal_path(id);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| OrganizeError::HistoryWriteFailed { source: e })?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records that `entry` is about to move. Synced before returning.
    pub fn record_intent(&mut self, entry: &AppliedEntry) -> io::Result<()> {
        let mut line = serde_json::to_string(entry).map_err(io::Error::other)?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        self.file.sync_data()
    }

    /// Deletes the journal; its transaction is logged or moved nothing.
    pub fn finish(self) {
        let Journal { path, file } = self;
        drop(file);
        if let Err(e) = fs::remove_file(&path) {
            warn!("Could not remove journal {}: {}", path.display(), e);
        }
    }
}

/// IDs of journals still on disk, oldest first.
pub fn pending_ids(store: &LogStore) -> OrganizeResult<Vec<String>> {
    let entries = match fs::read_dir(store.journal_dir()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(OrganizeError::HistoryReadFailed { source: e }),
    };
    let mut ids: Vec<String> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension()? != "jsonl" {
                return None;
            }
            Some(path.file_stem()?.to_str()?.to_string())
        })
        .collect();
    ids.sort();
    Ok(ids)
}

/// Appends a record for every commit that was interrupted before its log
/// append, then deletes the journals.
///
/// A journaled entry counts as moved when its source is gone and its
/// destination exists. The returned records are marked `interrupted` and
/// can be undone like any other transaction. Callers hold the directory
/// lock so a live commit's journal is never mistaken for a stale one.
pub fn recover_interrupted(store: &LogStore) -> OrganizeResult<Vec<TransactionRecord>> {
    let ids = pending_ids(store)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let logged: HashSet<String> = store.load_all()?.into_iter().map(|r| r.id).collect();
    let mut recovered = Vec::new();
    for id in ids {
        let path = store.journal_path(&id);
        if logged.contains(&id) {
            debug!("Journal {} was already logged", id);
        } else {
            let moved: Vec<AppliedEntry> = read_intents(&path)?
                .into_iter()
                .filter(was_moved)
                .collect();
            if moved.is_empty() {
                debug!("Journal {} moved nothing", id);
            } else {
                let backup_dir = store.backup_dir(&id);
                let record = TransactionRecord {
                    id: id.clone(),
                    created_at: Local::now(),
                    root: store.root().to_path_buf(),
                    backup_root: backup_dir.exists().then_some(backup_dir),
                    entries: moved,
                    reverted_at: None,
                    created_dirs: Vec::new(),
                    interrupted: true,
                };
                store.append(&record)?;
                warn!(
                    "Recovered interrupted transaction {} ({} moved)",
                    id,
                    record.moved_count()
                );
                recovered.push(record);
            }
        }
        if let Err(e) = fs::remove_file(&path) {
            warn!("Could not remove journal {}: {}", path.display(), e);
        }
    }
    Ok(recovered)
}

fn read_intents(path: &Path) -> OrganizeResult<Vec<AppliedEntry>> {
    let content =
        fs::read_to_string(path).map_err(|e| OrganizeError::HistoryReadFailed { source: e })?;
    let mut intents = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<AppliedEntry>(line) {
            Ok(entry) => intents.push(entry),
            Err(e) => warn!("Skipping unreadable line of {}: {}", path.display(), e),
        }
    }
    Ok(intents)
}

fn was_moved(entry: &AppliedEntry) -> bool {
    entry.source.symlink_metadata().is_err() && entry.destination.symlink_metadata().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationBasis;
    use crate::file_category::Category;
    use crate::history::EntryStatus;
    use tempfile::TempDir;

    fn intent(root: &Path, name: &str) -> AppliedEntry {
        AppliedEntry {
            source: root.join(name),
            destination: root.join("organized/documents").join(name),
            category: Category::Documents,
            basis: ClassificationBasis::Disabled,
            confidence: None,
            backup: None,
            size: 1,
            status: EntryStatus::Succeeded,
            restored: false,
        }
    }

    #[test]
    fn test_no_journal_recovers_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = LogStore::new(temp_dir.path());
        assert!(recover_interrupted(&store).unwrap().is_empty());
        assert!(!store.state_dir().exists());
    }

    #[test]
    fn test_interrupted_commit_is_logged_with_moved_entries_only() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let store = LogStore::new(root);

        // a.txt moved before the interruption; b.txt was journaled but never moved.
        fs::create_dir_all(root.join("organized/documents")).unwrap();
        fs::write(root.join("organized/documents/a.txt"), "a").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();

        let mut journal = Journal::begin(&store, "crashed").unwrap();
        journal.record_intent(&intent(root, "a.txt")).unwrap();
        journal.record_intent(&intent(root, "b.txt")).unwrap();
        drop(journal);
        assert_eq!(pending_ids(&store).unwrap(), vec!["crashed"]);

        let recovered = recover_interrupted(&store).unwrap();
        assert_eq!(recovered.len(), 1);
        assert!(recovered[0].interrupted);
        assert_eq!(recovered[0].entries.len(), 1);
        assert_eq!(recovered[0].entries[0].source, root.join("a.txt"));

        let active = store.latest_active().unwrap().unwrap();
        assert_eq!(active.id, "crashed");
        assert!(pending_ids(&store).unwrap().is_empty());
    }

    #[test]
    fn test_journal_of_logged_commit_is_just_removed() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let store = LogStore::new(root);
        fs::create_dir_all(root.join("organized/documents")).unwrap();
        fs::write(root.join("organized/documents/a.txt"), "a").unwrap();

        store
            .append(&TransactionRecord {
                id: "done".to_string(),
                created_at: Local::now(),
                root: root.to_path_buf(),
                backup_root: None,
                entries: vec![intent(root, "a.txt")],
                reverted_at: None,
                created_dirs: Vec::new(),
                interrupted: false,
            })
            .unwrap();
        let mut journal = Journal::begin(&store, "done").unwrap();
        journal.record_intent(&intent(root, "a.txt")).unwrap();
        drop(journal);

        assert!(recover_interrupted(&store).unwrap().is_empty());
        assert_eq!(store.load_all().unwrap().len(), 1);
        assert!(pending_ids(&store).unwrap().is_empty());
    }
}
