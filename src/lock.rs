//! Per-directory exclusive lock held by commit and undo.

use crate::file_organizer::{OrganizeError, OrganizeResult};
use crate::history::LogStore;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use tracing::debug;

/// Holds `<root>/.smartsort/lock` until dropped.
#[derive(Debug)]
pub struct DirLock {
    // The advisory lock is released when the file is closed.
    _file: File,
    path: PathBuf,
}

impl DirLock {
    /// Takes the lock without waiting; a held lock is [`OrganizeError::Locked`].
    pub fn acquire(store: &LogStore) -> OrganizeResult<Self> {
        store.ensure_state_dir()?;
        let path = store.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| OrganizeError::HistoryWriteFailed { source: e })?;

        fs2::FileExt::try_lock_exclusive(&file)
            .map_err(|_| OrganizeError::Locked { path: path.clone() })?;

        debug!("Acquired {}", path.display());
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
