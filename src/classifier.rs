//! Classifier adapter boundary.
//!
//! A [`Classifier`] proposes a category and a new base name for one file.
//! Any [`ClassifierError`] degrades that file to the extension rule; nothing
//! here can fail a run.

use crate::config::OrganizationConfig;
use crate::file_category::Category;
use crate::scan::Candidate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// What a classifier gets to look at.
#[derive(Debug, Clone)]
pub struct ClassifyRequest<'a> {
    pub path: &'a Path,
    pub file_name: String,
    pub extension: Option<&'a str>,
    pub size: u64,
    pub sample: &'a [u8],
    pub mime_type: Option<&'a str>,
    /// Categories the answer must come from.
    pub categories: &'a [Category],
}

impl<'a> ClassifyRequest<'a> {
    pub fn for_candidate(candidate: &'a Candidate, categories: &'a [Category]) -> Self {
        Self {
            path: &candidate.path,
            file_name: candidate.file_name(),
            extension: candidate.extension.as_deref(),
            size: candidate.size,
            sample: &candidate.sample,
            mime_type: candidate.mime_type.as_deref(),
            categories,
        }
    }
}

/// A classifier's proposal for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Category name as returned by the provider; validated by the plan builder.
    pub category: String,
    /// Proposed base name, with or without extension.
    pub suggested_name: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Why a classification attempt produced nothing.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("request timed out")]
    Timeout,
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited by provider")]
    RateLimit,
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {message}")]
    Provider { status: u16, message: String },
}

/// Proposes a category and name for a file.
pub trait Classifier {
    /// Short provider name for logs and reports.
    fn name(&self) -> &str;

    fn classify(&self, request: &ClassifyRequest<'_>) -> Result<Suggestion, ClassifierError>;
}

/// How the category of a file was (or will be) decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationBasis {
    /// The classifier answered.
    Classifier,
    /// The classifier failed; extension rule used.
    Degraded { reason: String },
    /// Larger than `max_file_size`; extension rule used.
    SkippedSize,
    /// Extension not in `supported_types`; extension rule used.
    SkippedType,
    /// No classifier configured; extension rule used.
    Disabled,
}

impl ClassificationBasis {
    /// Short label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            ClassificationBasis::Classifier => "ai",
            ClassificationBasis::Degraded { .. } => "degraded",
            ClassificationBasis::SkippedSize => "skipped (size)",
            ClassificationBasis::SkippedType => "skipped (type)",
            ClassificationBasis::Disabled => "extension",
        }
    }
}

/// The result of classifying one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    pub basis: ClassificationBasis,
    pub suggestion: Option<Suggestion>,
}

impl ClassificationOutcome {
    pub fn rule_based(basis: ClassificationBasis) -> Self {
        Self {
            basis,
            suggestion: None,
        }
    }

    pub fn classified(suggestion: Suggestion) -> Self {
        Self {
            basis: ClassificationBasis::Classifier,
            suggestion: Some(suggestion),
        }
    }
}

/// Which files are sent to the classifier at all.
#[derive(Debug, Clone)]
pub struct ClassificationPolicy {
    max_file_size: u64,
    supported_types: HashSet<String>,
}

impl ClassificationPolicy {
    pub fn new(max_file_size_bytes: u64, supported_types: HashSet<String>) -> Self {
        Self {
            max_file_size: max_file_size_bytes,
            supported_types,
        }
    }

    pub fn from_config(config: &OrganizationConfig) -> Self {
        Self::new(config.max_file_size_bytes(), config.supported_type_set())
    }

    /// `Err` carries the basis to record when the candidate is not eligible.
    pub fn check(&self, candidate: &Candidate) -> Result<(), ClassificationBasis> {
        if candidate.size > self.max_file_size {
            return Err(ClassificationBasis::SkippedSize);
        }
        match candidate.extension.as_deref() {
            Some(ext) if self.supported_types.contains(ext) => Ok(()),
            _ => Err(ClassificationBasis::SkippedType),
        }
    }
}

/// Classifies one candidate, degrading every failure to the extension rule.
pub fn classify_candidate(
    candidate: &Candidate,
    classifier: Option<&dyn Classifier>,
    policy: &ClassificationPolicy,
    categories: &[Category],
) -> ClassificationOutcome {
    if let Err(basis) = policy.check(candidate) {
        debug!("{}: {}", candidate.relative_path.display(), basis.label());
        return ClassificationOutcome::rule_based(basis);
    }

    let Some(classifier) = classifier else {
        return ClassificationOutcome::rule_based(ClassificationBasis::Disabled);
    };

    let request = ClassifyRequest::for_candidate(candidate, categories);
    match classifier.classify(&request) {
        Ok(suggestion) => {
            debug!(
                "{} classified by {} as {} ({})",
                candidate.relative_path.display(),
                classifier.name(),
                suggestion.category,
                suggestion.suggested_name
            );
            ClassificationOutcome::classified(suggestion)
        }
        Err(e) => {
            warn!(
                "Classifier {} failed for {}: {}; using extension rule",
                classifier.name(),
                candidate.relative_path.display(),
                e
            );
            ClassificationOutcome::rule_based(ClassificationBasis::Degraded {
                reason: e.to_string(),
            })
        }
    }
}

/// Classifies candidates in order, calling `on_progress` after each one.
pub fn classify_all<F>(
    candidates: &[Candidate],
    classifier: Option<&dyn Classifier>,
    policy: &ClassificationPolicy,
    categories: &[Category],
    mut on_progress: F,
) -> Vec<ClassificationOutcome>
where
    F: FnMut(&Candidate, &ClassificationOutcome),
{
    candidates
        .iter()
        .map(|candidate| {
            let outcome = classify_candidate(candidate, classifier, policy, categories);
            on_progress(candidate, &outcome);
            outcome
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixed(Result<Suggestion, ClassifierError>);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn classify(&self, _request: &ClassifyRequest<'_>) -> Result<Suggestion, ClassifierError> {
            self.0.clone()
        }
    }

    fn candidate(name: &str, size: u64) -> Candidate {
        Candidate {
            path: PathBuf::from("/root").join(name),
            relative_path: PathBuf::from(name),
            size,
            extension: Path::new(name)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase()),
            sample: Vec::new(),
            mime_type: None,
        }
    }

    fn policy() -> ClassificationPolicy {
        ClassificationPolicy::new(
            1024,
            ["pdf", "txt"].iter().map(|s| s.to_string()).collect(),
        )
    }

    fn suggestion() -> Suggestion {
        Suggestion {
            category: "documents".to_string(),
            suggested_name: "quarterly_report".to_string(),
            confidence: Some(0.9),
            reason: None,
        }
    }

    #[test]
    fn test_oversized_file_is_not_sent() {
        let classifier = Fixed(Ok(suggestion()));
        let outcome =
            classify_candidate(&candidate("big.pdf", 4096), Some(&classifier), &policy(), &[]);
        assert_eq!(outcome, ClassificationOutcome::rule_based(ClassificationBasis::SkippedSize));
    }

    #[test]
    fn test_unsupported_type_is_not_sent() {
        let classifier = Fixed(Ok(suggestion()));
        let outcome =
            classify_candidate(&candidate("clip.mp4", 10), Some(&classifier), &policy(), &[]);
        assert_eq!(outcome.basis, ClassificationBasis::SkippedType);

        let outcome = classify_candidate(&candidate("README", 10), Some(&classifier), &policy(), &[]);
        assert_eq!(outcome.basis, ClassificationBasis::SkippedType);
    }

    #[test]
    fn test_timeout_degrades() {
        let classifier = Fixed(Err(ClassifierError::Timeout));
        let outcome =
            classify_candidate(&candidate("invoice.pdf", 10), Some(&classifier), &policy(), &[]);
        assert!(outcome.suggestion.is_none());
        assert!(matches!(outcome.basis, ClassificationBasis::Degraded { .. }));
    }

    #[test]
    fn test_no_classifier_is_disabled() {
        let outcome = classify_candidate(&candidate("notes.txt", 10), None, &policy(), &[]);
        assert_eq!(outcome.basis, ClassificationBasis::Disabled);
    }

    #[test]
    fn test_classify_all_reports_progress_in_order() {
        let classifier = Fixed(Ok(suggestion()));
        let candidates = vec![candidate("a.pdf", 1), candidate("b.mp4", 1)];
        let mut seen = Vec::new();

        let outcomes = classify_all(&candidates, Some(&classifier), &policy(), &[], |c, _| {
            seen.push(c.file_name())
        });

        assert_eq!(seen, vec!["a.pdf", "b.mp4"]);
        assert_eq!(outcomes[0].basis, ClassificationBasis::Classifier);
        assert_eq!(outcomes[1].basis, ClassificationBasis::SkippedType);
    }

    #[test]
    fn test_basis_serializes_with_kind_tag() {
        let json = serde_json::to_string(&ClassificationBasis::Degraded {
            reason: "request timed out".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"degraded","reason":"request timed out"}"#);
    }
}
