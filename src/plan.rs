//! Plan building: classification results to a collision-free move plan.
//!
//! Building a plan only reads the filesystem (to see whether a destination
//! is already occupied); it never creates, moves, or writes anything.

use crate::classifier::{ClassificationBasis, ClassificationOutcome};
use crate::file_category::{Category, FileMapper};
use crate::scan::Candidate;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Directory under the root that receives the category folders.
pub const ORGANIZED_DIR: &str = "organized";

/// Upper bound on `_N` suffixes tried for one destination.
pub const MAX_DISAMBIGUATION: u32 = 10_000;

const MAX_NAME_LEN: usize = 120;

/// One planned move.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub category: Category,
    /// The `_N` suffix added to make the destination unique, if any.
    pub disambiguator: Option<u32>,
    pub basis: ClassificationBasis,
    /// Whether the classifier's category was accepted.
    pub category_from_classifier: bool,
    pub confidence: Option<f32>,
    pub reason: Option<String>,
    pub size: u64,
}

/// An ordered, collision-free set of moves for one root.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub root: PathBuf,
    pub entries: Vec<PlanEntry>,
    pub category_counts: BTreeMap<Category, usize>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Keeps only the entries for which `keep` returns true, recomputing counts.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&PlanEntry) -> bool,
    {
        self.entries.retain(keep);
        self.category_counts = count_categories(&self.entries);
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("No free destination for {} after {attempts} attempts", destination.display())]
    CollisionsExhausted { destination: PathBuf, attempts: u32 },
    #[error("{candidates} candidates but {classifications} classifications")]
    LengthMismatch {
        candidates: usize,
        classifications: usize,
    },
}

/// Builds a plan, probing the real filesystem for occupied destinations.
pub fn build_plan(
    root: &Path,
    candidates: &[Candidate],
    classifications: &[ClassificationOutcome],
    mapper: &FileMapper,
) -> Result<Plan, PlanError> {
    build_plan_with(root, candidates, classifications, mapper, |path| {
        path.symlink_metadata().is_ok()
    })
}

/// Builds a plan with a caller-supplied "is this path occupied" probe.
pub fn build_plan_with<F>(
    root: &Path,
    candidates: &[Candidate],
    classifications: &[ClassificationOutcome],
    mapper: &FileMapper,
    occupied: F,
) -> Result<Plan, PlanError>
where
    F: Fn(&Path) -> bool,
{
    if candidates.len() != classifications.len() {
        return Err(PlanError::LengthMismatch {
            candidates: candidates.len(),
            classifications: classifications.len(),
        });
    }

    let organized = root.join(ORGANIZED_DIR);
    // Keys are lower-cased so case-insensitive filesystems never see two claims collide.
    let mut claimed: HashSet<String> = HashSet::new();
    let mut entries = Vec::with_capacity(candidates.len());

    for (candidate, outcome) in candidates.iter().zip(classifications) {
        let accepted = outcome
            .suggestion
            .as_ref()
            .and_then(|s| s.category.parse::<Category>().ok())
            .filter(|category| mapper.is_configured(*category));
        let category = accepted.unwrap_or_else(|| {
            mapper.categorize(candidate.mime_type.as_deref(), candidate.extension.as_deref())
        });

        let original_stem = candidate.stem();
        let extension = candidate
            .path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let stem = outcome
            .suggestion
            .as_ref()
            .and_then(|s| sanitize_name(&s.suggested_name, candidate.extension.as_deref()))
            .unwrap_or(original_stem);

        let category_dir = organized.join(category.dir_name());
        let (destination, disambiguator) =
            claim_destination(&category_dir, &stem, &extension, &candidate.path, &mut claimed, &occupied)?;

        if let Some(n) = disambiguator {
            debug!(
                "{} collides; using suffix _{}",
                candidate.relative_path.display(),
                n
            );
        }

        let suggestion = outcome.suggestion.as_ref();
        entries.push(PlanEntry {
            source: candidate.path.clone(),
            destination,
            category,
            disambiguator,
            basis: outcome.basis.clone(),
            category_from_classifier: accepted.is_some(),
            confidence: suggestion.and_then(|s| s.confidence),
            reason: suggestion.and_then(|s| s.reason.clone()),
            size: candidate.size,
        });
    }

    Ok(Plan {
        root: root.to_path_buf(),
        category_counts: count_categories(&entries),
        entries,
    })
}

fn claim_destination<F>(
    dir: &Path,
    stem: &str,
    extension: &str,
    source: &Path,
    claimed: &mut HashSet<String>,
    occupied: &F,
) -> Result<(PathBuf, Option<u32>), PlanError>
where
    F: Fn(&Path) -> bool,
{
    let mut is_free = |path: &Path| {
        let key = path.to_string_lossy().to_lowercase();
        let free = !claimed.contains(&key) && (path == source || !occupied(path));
        if free {
            claimed.insert(key);
        }
        free
    };

    let first = dir.join(format!("{}{}", stem, extension));
    if is_free(&first) {
        return Ok((first, None));
    }

    for n in 1..=MAX_DISAMBIGUATION {
        let candidate = dir.join(format!("{}_{}{}", stem, n, extension));
        if is_free(&candidate) {
            return Ok((candidate, Some(n)));
        }
    }

    Err(PlanError::CollisionsExhausted {
        destination: first,
        attempts: MAX_DISAMBIGUATION,
    })
}

fn count_categories(entries: &[PlanEntry]) -> BTreeMap<Category, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.category).or_insert(0) += 1;
    }
    counts
}

/// Turns a provider-suggested name into a safe file stem.
///
/// Drops a trailing extension, replaces characters that are invalid in file
/// names (and whitespace) with `_`, collapses runs of `_`, and trims `_`/`.`
/// from both ends. Returns `None` when nothing usable is left.
pub fn sanitize_name(raw: &str, extension: Option<&str>) -> Option<String> {
    let mut name = raw.trim();

    if let Some(ext) = extension {
        let suffix = format!(".{}", ext);
        let cut = name.len().saturating_sub(suffix.len());
        if cut > 0 && name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(&suffix) {
            name = &name[..cut];
        }
    }
    if let Some((head, tail)) = name.rsplit_once('.')
        && !head.is_empty()
        && (1..=5).contains(&tail.len())
        && tail.chars().all(|c| c.is_ascii_alphanumeric())
        && tail.chars().any(|c| c.is_ascii_alphabetic())
    {
        name = head;
    }

    let mut cleaned = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_whitespace() || c.is_control() || "<>:\"/\\|?*".contains(c) {
            '_'
        } else {
            c
        };
        if c == '_' && cleaned.ends_with('_') {
            continue;
        }
        cleaned.push(c);
    }

    let trimmed: String = cleaned
        .trim_matches(|c| c == '_' || c == '.')
        .chars()
        .take(MAX_NAME_LEN)
        .collect();
    let trimmed = trimmed.trim_end_matches(|c| c == '_' || c == '.');

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
