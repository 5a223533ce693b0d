//! Directory scanning.
//!
//! Walks the root (optionally recursively) in file-name order, applies the
//! configured filters and emits [`Candidate`]s. The organized tree and the
//! tool's own state directory are never descended into.

use crate::config::CompiledFilters;
use crate::history::STATE_DIR;
use crate::plan::ORGANIZED_DIR;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Number of leading bytes kept as the content sample.
pub const SAMPLE_LEN: usize = 2000;

/// A file discovered by the scan, eligible for classification.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Path relative to the scanned root.
    pub relative_path: PathBuf,
    pub size: u64,
    /// Lower-cased extension without the dot.
    pub extension: Option<String>,
    /// Up to [`SAMPLE_LEN`] leading bytes.
    pub sample: Vec<u8>,
    /// MIME type sniffed from the sample's magic bytes.
    pub mime_type: Option<String>,
}

impl Candidate {
    /// Reads metadata and a content sample for `path`, which must lie under `root`.
    pub fn from_path(root: &Path, path: &Path) -> Result<Self, ScanError> {
        let unreadable = |source: io::Error| ScanError::Unreadable {
            path: path.to_path_buf(),
            source,
        };

        let metadata = path.metadata().map_err(unreadable)?;
        let mut sample = Vec::with_capacity(SAMPLE_LEN.min(metadata.len() as usize));
        File::open(path)
            .and_then(|file| file.take(SAMPLE_LEN as u64).read_to_end(&mut sample))
            .map_err(unreadable)?;

        let mime_type = infer::get(&sample).map(|kind| kind.mime_type().to_string());
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());
        let relative_path = path.strip_prefix(root).unwrap_or(path).to_path_buf();

        Ok(Self {
            path: path.to_path_buf(),
            relative_path,
            size: metadata.len(),
            extension,
            sample,
            mime_type,
        })
    }

    /// File name including extension.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// File name without its extension.
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Errors raised while scanning.
///
/// `RootUnreadable` aborts the scan; the others are collected per entry in
/// [`ScanReport::errors`] and the entry is skipped.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Cannot read directory {}: {source}", path.display())]
    RootUnreadable { path: PathBuf, source: io::Error },
    #[error("Cannot read {}: {source}", path.display())]
    Unreadable { path: PathBuf, source: io::Error },
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

impl ScanError {
    /// The path the error refers to, if known.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ScanError::RootUnreadable { path, .. } | ScanError::Unreadable { path, .. } => {
                Some(path)
            }
            ScanError::Walk(e) => e.path(),
        }
    }
}

/// Everything a scan found.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Candidates in deterministic (file-name sorted, depth-first) order.
    pub candidates: Vec<Candidate>,
    /// Entries that could not be read.
    pub errors: Vec<ScanError>,
    /// Files rejected by the filter rules.
    pub filtered: usize,
}

/// Scans `root` for candidate files.
pub fn scan_directory(
    root: &Path,
    recursive: bool,
    filters: &CompiledFilters,
) -> Result<ScanReport, ScanError> {
    std::fs::read_dir(root).map_err(|source| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_skipped_dir(entry, filters));

    let mut report = ScanReport::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                report.errors.push(ScanError::Walk(e));
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if !filters.should_include(relative) {
            debug!("Filtered out {}", relative.display());
            report.filtered += 1;
            continue;
        }

        match Candidate::from_path(root, entry.path()) {
            Ok(candidate) => report.candidates.push(candidate),
            Err(e) => {
                warn!("{}", e);
                report.errors.push(e);
            }
        }
    }

    debug!(
        "Scanned {}: {} candidates, {} filtered, {} errors",
        root.display(),
        report.candidates.len(),
        report.filtered,
        report.errors.len()
    );
    Ok(report)
}

fn is_skipped_dir(entry: &walkdir::DirEntry, filters: &CompiledFilters) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.depth() == 1 && (name == ORGANIZED_DIR || name == STATE_DIR) {
        return true;
    }
    !filters.hidden_enabled() && name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use std::fs;
    use tempfile::TempDir;

    fn default_filters() -> CompiledFilters {
        AppConfig::default().compile_filters().unwrap()
    }

    fn names(report: &ScanReport) -> Vec<String> {
        report
            .candidates
            .iter()
            .map(|c| c.relative_path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_scan_flat_directory_sorted() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("b.txt"), "b").unwrap();
        fs::write(temp_dir.path().join("a.pdf"), "%PDF-1.4").unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("sub").join("c.md"), "c").unwrap();

        let report = scan_directory(temp_dir.path(), false, &default_filters()).unwrap();
        assert_eq!(names(&report), vec!["a.pdf", "b.txt"]);
    }

    #[test]
    fn test_scan_recursive_skips_own_trees() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::create_dir_all(root.join(ORGANIZED_DIR).join("documents")).unwrap();
        fs::create_dir_all(root.join(STATE_DIR)).unwrap();
        fs::write(root.join("sub").join("c.md"), "c").unwrap();
        fs::write(root.join(ORGANIZED_DIR).join("documents").join("x.pdf"), "x").unwrap();
        fs::write(root.join(STATE_DIR).join("history.jsonl"), "").unwrap();
        fs::write(root.join(".hidden"), "h").unwrap();

        let report = scan_directory(root, true, &default_filters()).unwrap();
        assert_eq!(names(&report), vec!["sub/c.md"]);
        assert_eq!(report.filtered, 1);
    }

    #[test]
    fn test_candidate_metadata_and_sniffing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("Photo.PNG");
        let png = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
        fs::write(&path, png).unwrap();

        let candidate = Candidate::from_path(temp_dir.path(), &path).unwrap();
        assert_eq!(candidate.size, png.len() as u64);
        assert_eq!(candidate.extension.as_deref(), Some("png"));
        assert_eq!(candidate.mime_type.as_deref(), Some("image/png"));
        assert_eq!(candidate.stem(), "Photo");
        assert_eq!(candidate.relative_path, PathBuf::from("Photo.PNG"));
    }

    #[test]
    fn test_sample_is_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.txt");
        fs::write(&path, "x".repeat(SAMPLE_LEN * 3)).unwrap();

        let candidate = Candidate::from_path(temp_dir.path(), &path).unwrap();
        assert_eq!(candidate.sample.len(), SAMPLE_LEN);
        assert_eq!(candidate.size, (SAMPLE_LEN * 3) as u64);
    }

    #[test]
    fn test_scan_missing_root_is_fatal() {
        let result = scan_directory(Path::new("/non/existent/path"), true, &default_filters());
        assert!(matches!(result, Err(ScanError::RootUnreadable { .. })));
    }
}
