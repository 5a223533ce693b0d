//! Undo functionality for reverting the most recent organize run.
//!
//! Undo walks the latest un-reverted transaction in reverse order and moves
//! each file back if it is still where the transaction left it. Anything
//! that changed since is reported as a conflict and left alone.

use crate::file_organizer::{OrganizeError, OrganizeResult, move_no_clobber};
use crate::history::{AppliedEntry, LogStore, TransactionRecord};
use crate::journal;
use crate::lock::DirLock;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// An entry undo could not restore.
#[derive(Debug, Clone, PartialEq)]
pub struct UndoConflict {
    pub path: PathBuf,
    pub reason: String,
}

/// Represents the result of an undo operation.
#[derive(Debug)]
pub struct UndoReport {
    pub transaction_id: String,
    /// Files moved back by this call.
    pub restored: usize,
    pub conflicts: Vec<UndoConflict>,
    /// True once every moved entry of the transaction is restored.
    pub fully_reverted: bool,
    /// Folders created by the transaction and removed once empty.
    pub removed_dirs: usize,
    /// Interrupted commits logged before undoing; the first one is the
    /// transaction this call reverted.
    pub recovered: Vec<TransactionRecord>,
}

impl UndoReport {
    pub fn is_complete_success(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Manages undo operations for file organization.
pub struct UndoManager;

impl UndoManager {
    /// Undoes the most recent transaction that is not yet reverted.
    ///
    /// Returns [`OrganizeError::NoTransaction`] without touching the
    /// filesystem when there is nothing to undo.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use smartsort::history::LogStore;
    /// use smartsort::undo::UndoManager;
    /// use std::path::Path;
    ///
    /// let root = Path::new("/path/to/directory");
    /// match UndoManager::undo(root, &LogStore::new(root)) {
    ///     Ok(report) => println!("Restored {} files", report.restored),
    ///     Err(e) => eprintln!("Undo failed: {}", e),
    /// }
    /// ```
    pub fn undo(root: &Path, store: &LogStore) -> OrganizeResult<UndoReport> {
        if !root.is_dir() {
            return Err(OrganizeError::InvalidBasePath {
                path: root.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "base path does not exist",
                ),
            });
        }

        let no_transaction = || OrganizeError::NoTransaction {
            root: root.to_path_buf(),
        };
        // Checked before locking so an empty history leaves no state directory behind.
        if store.latest_active()?.is_none() && journal::pending_ids(store)?.is_empty() {
            return Err(no_transaction());
        }

        let _lock = DirLock::acquire(store)?;
        let recovered = journal::recover_interrupted(store)?;
        let mut record = store.latest_active()?.ok_or_else(no_transaction)?;
        info!("Undoing transaction {}", record.id);

        let mut restored = 0;
        let mut conflicts = Vec::new();
        for entry in record
            .entries
            .iter_mut()
            .rev()
            .filter(|e| e.status.is_moved() && !e.restored)
        {
            match Self::restore_entry(entry) {
                Ok(()) => {
                    entry.restored = true;
                    restored += 1;
                }
                Err(reason) => {
                    warn!("Cannot restore {}: {}", entry.source.display(), reason);
                    conflicts.push(UndoConflict {
                        path: entry.destination.clone(),
                        reason,
                    });
                }
            }
        }

        let fully_reverted = conflicts.is_empty();
        let mut removed_dirs = 0;
        if fully_reverted {
            record.reverted_at = Some(Local::now());
            removed_dirs = remove_created_dirs(&record.created_dirs);
        }
        store.update(&record)?;

        Ok(UndoReport {
            transaction_id: record.id,
            restored,
            conflicts,
            fully_reverted,
            removed_dirs,
            recovered,
        })
    }

    /// Moves one entry back to its source path.
    fn restore_entry(entry: &AppliedEntry) -> Result<(), String> {
        let metadata = entry
            .destination
            .symlink_metadata()
            .map_err(|_| "file not found at its organized location".to_string())?;
        if metadata.len() != entry.size {
            return Err(format!(
                "file changed since it was organized ({} bytes, expected {})",
                metadata.len(),
                entry.size
            ));
        }
        if entry.source.symlink_metadata().is_ok() {
            return Err(format!(
                "original location {} is occupied",
                entry.source.display()
            ));
        }

        if let Some(parent) = entry.source.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("cannot recreate {}: {}", parent.display(), e))?;
        }
        move_no_clobber(&entry.destination, &entry.source).map_err(|e| e.to_string())?;
        debug!(
            "Restored {} -> {}",
            entry.destination.display(),
            entry.source.display()
        );
        Ok(())
    }
}

/// Removes the transaction's created folders that are empty, deepest first.
fn remove_created_dirs(dirs: &[PathBuf]) -> usize {
    let mut dirs: Vec<&PathBuf> = dirs.iter().collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));

    let mut removed = 0;
    for dir in dirs {
        if is_empty_dir(dir) && fs::remove_dir(dir).is_ok() {
            removed += 1;
        }
    }
    removed
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationBasis;
    use crate::file_category::Category;
    use crate::file_organizer::{ApplyOptions, FileOrganizer, Mode};
    use crate::plan::{ORGANIZED_DIR, Plan, PlanEntry};

    use tempfile::TempDir;

    fn commit(root: &Path, names: &[(&str, Category)]) -> LogStore {
        let entries = names
            .iter()
            .map(|(name, category)| PlanEntry {
                source: root.join(name),
                destination: root
                    .join(ORGANIZED_DIR)
                    .join(category.dir_name())
                    .join(name),
                category: *category,
                disambiguator: None,
                basis: ClassificationBasis::Disabled,
                category_from_classifier: false,
                confidence: None,
                reason: None,
                size: 0,
            })
            .collect();
        let plan = Plan {
            root: root.to_path_buf(),
            entries,
            ..Plan::default()
        };
        let store = LogStore::new(root);
        FileOrganizer::apply(&plan, Mode::Commit, &store, &ApplyOptions::default())
            .expect("commit failed");
        store
    }

    #[test]
    fn test_undo_no_history() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();

        let result = UndoManager::undo(root, &LogStore::new(root));
        assert!(matches!(result, Err(OrganizeError::NoTransaction { .. })));
        assert!(!root.join(".smartsort").exists());
    }

    #[test]
    fn test_undo_multiple_files() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("image.png"), "image data").unwrap();
        fs::write(root.join("document.pdf"), "pdf data").unwrap();

        let store = commit(
            root,
            &[("image.png", Category::Images), ("document.pdf", Category::Documents)],
        );
        let report = UndoManager::undo(root, &store).expect("Undo failed");

        assert_eq!(report.restored, 2);
        assert!(report.fully_reverted);
        assert_eq!(fs::read_to_string(root.join("image.png")).unwrap(), "image data");
        assert_eq!(fs::read_to_string(root.join("document.pdf")).unwrap(), "pdf data");
        assert!(!root.join(ORGANIZED_DIR).exists());
        assert!(store.latest_active().unwrap().is_none());
    }

    #[test]
    fn test_undo_keeps_folders_that_existed_before() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::create_dir_all(root.join("organized/images")).unwrap();

        let store = commit(root, &[("a.txt", Category::Documents)]);
        let report = UndoManager::undo(root, &store).expect("Undo failed");

        assert_eq!(report.removed_dirs, 1);
        assert!(!root.join("organized/documents").exists());
        assert!(root.join("organized/images").is_dir());
    }

    #[test]
    fn test_undo_reverts_interrupted_commit() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let store = LogStore::new(root);

        // Moved by a run that died before writing its record.
        fs::create_dir_all(root.join("organized/documents")).unwrap();
        fs::write(root.join("organized/documents/a.txt"), "a").unwrap();
        let entry = AppliedEntry {
            source: root.join("a.txt"),
            destination: root.join("organized/documents/a.txt"),
            category: Category::Documents,
            basis: ClassificationBasis::Disabled,
            confidence: None,
            backup: None,
            size: 1,
            status: crate::history::EntryStatus::Succeeded,
            restored: false,
        };
        let mut pending = journal::Journal::begin(&store, "crashed").unwrap();
        pending.record_intent(&entry).unwrap();
        drop(pending);

        let report = UndoManager::undo(root, &store).expect("Undo failed");
        assert_eq!(report.recovered.len(), 1);
        assert_eq!(report.transaction_id, "crashed");
        assert_eq!(report.restored, 1);
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "a");
    }

    #[test]
    fn test_undo_twice_is_no_transaction() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();

        let store = commit(root, &[("a.txt", Category::Documents)]);
        UndoManager::undo(root, &store).expect("Undo failed");
        assert!(matches!(
            UndoManager::undo(root, &store),
            Err(OrganizeError::NoTransaction { .. })
        ));
    }

    #[test]
    fn test_undo_with_file_name_conflict() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("test.txt"), "original content").unwrap();

        let store = commit(root, &[("test.txt", Category::Documents)]);
        fs::write(root.join("test.txt"), "new content").unwrap();

        let report = UndoManager::undo(root, &store).expect("Undo failed");
        assert_eq!(report.restored, 0);
        assert_eq!(report.conflicts.len(), 1);
        assert!(!report.fully_reverted);
        assert_eq!(fs::read_to_string(root.join("test.txt")).unwrap(), "new content");
        assert!(root.join("organized/documents/test.txt").exists());
        assert!(store.latest_active().unwrap().is_some());
    }

    #[test]
    fn test_retry_after_conflict_only_touches_rest() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b.txt"), "b").unwrap();

        let store = commit(
            root,
            &[("a.txt", Category::Documents), ("b.txt", Category::Documents)],
        );
        fs::write(root.join("b.txt"), "intruder").unwrap();

        let first = UndoManager::undo(root, &store).expect("Undo failed");
        assert_eq!(first.restored, 1);
        assert_eq!(first.conflicts.len(), 1);

        fs::remove_file(root.join("b.txt")).unwrap();
        let second = UndoManager::undo(root, &store).expect("Undo failed");
        assert_eq!(second.restored, 1);
        assert!(second.fully_reverted);
        assert_eq!(first.transaction_id, second.transaction_id);
        assert_eq!(fs::read_to_string(root.join("b.txt")).unwrap(), "b");
    }

    #[test]
    fn test_undo_with_missing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        fs::write(root.join("a.txt"), "a").unwrap();

        let store = commit(root, &[("a.txt", Category::Documents)]);
        fs::remove_file(root.join("organized/documents/a.txt")).unwrap();

        let report = UndoManager::undo(root, &store).expect("Undo failed");
        assert_eq!(report.restored, 0);
        assert_eq!(report.conflicts.len(), 1);
    }

    #[test]
    fn test_undo_invalid_base_path() {
        let root = Path::new("/non/existent/path");
        assert!(UndoManager::undo(root, &LogStore::new(root)).is_err());
    }
}
