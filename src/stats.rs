//! Aggregate counts for plans, apply results and logged transactions.

use crate::classifier::ClassificationBasis;
use crate::file_category::Category;
use crate::file_organizer::{Mode, OrganizeError, OrganizeResult, TransactionResult};
use crate::history::{AppliedEntry, EntryStatus, LogStore, TransactionRecord};
use crate::plan::Plan;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub moved: usize,
    pub already_applied: usize,
    pub conflicts: usize,
    pub failed: usize,
    pub classified: usize,
    pub skipped_size: usize,
    pub skipped_type: usize,
    pub degraded: usize,
    pub total_bytes: u64,
    pub by_category: BTreeMap<Category, usize>,
    /// Mean classifier confidence over entries that reported one.
    pub average_confidence: Option<f32>,
    /// Counts describe a preview; `moved` means "would move".
    pub preview: bool,
}

impl Stats {
    /// Counts for a plan that has not been applied; status counts stay zero.
    pub fn from_plan(plan: &Plan) -> Self {
        let mut stats = Stats::default();
        let mut confidences = Vec::new();
        for entry in &plan.entries {
            stats.add(entry.category, &entry.basis, entry.size, entry.confidence, &mut confidences);
        }
        stats.average_confidence = mean(&confidences);
        stats
    }

    pub fn from_record(record: &TransactionRecord) -> Self {
        Self::from_entries(&record.entries)
    }

    pub fn from_result(result: &TransactionResult) -> Self {
        Self {
            preview: result.mode == Mode::Preview,
            ..Self::from_entries(&result.entries)
        }
    }

    fn from_entries(entries: &[AppliedEntry]) -> Self {
        let mut stats = Stats::default();
        let mut confidences = Vec::new();
        for entry in entries {
            stats.add(entry.category, &entry.basis, entry.size, entry.confidence, &mut confidences);
            match entry.status {
                EntryStatus::Succeeded => stats.moved += 1,
                EntryStatus::AlreadyApplied => stats.already_applied += 1,
                EntryStatus::Conflict { .. } => stats.conflicts += 1,
                EntryStatus::Failed { .. } => stats.failed += 1,
            }
        }
        stats.average_confidence = mean(&confidences);
        stats
    }

    fn add(
        &mut self,
        category: Category,
        basis: &ClassificationBasis,
        size: u64,
        confidence: Option<f32>,
        confidences: &mut Vec<f32>,
    ) {
        self.total += 1;
        self.total_bytes += size;
        *self.by_category.entry(category).or_insert(0) += 1;
        match basis {
            ClassificationBasis::Classifier => self.classified += 1,
            ClassificationBasis::Degraded { .. } => self.degraded += 1,
            ClassificationBasis::SkippedSize => self.skipped_size += 1,
            ClassificationBasis::SkippedType => self.skipped_type += 1,
            ClassificationBasis::Disabled => {}
        }
        if let Some(c) = confidence {
            confidences.push(c);
        }
    }
}

fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f32>() / values.len() as f32)
    }
}

/// Looks up a logged transaction by ID, or the latest one when `id` is `None`.
pub fn transaction_summary(
    store: &LogStore,
    id: Option<&str>,
) -> OrganizeResult<(TransactionRecord, Stats)> {
    let record = match id {
        Some(id) => store
            .find(id)?
            .ok_or_else(|| OrganizeError::UnknownTransaction { id: id.to_string() })?,
        None => store.latest()?.ok_or_else(|| OrganizeError::NoTransaction {
            root: store.root().to_path_buf(),
        })?,
    };
    let stats = Stats::from_record(&record);
    Ok((record, stats))
}
