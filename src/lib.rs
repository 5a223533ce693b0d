//! smartsort - AI-assisted directory organization with undo
//!
//! This library scans a directory, asks an optional AI classifier for a
//! category and a better name for each file, builds a collision-free move
//! plan into `<root>/organized/<category>/`, and applies it as a logged
//! transaction that can be previewed beforehand and undone afterwards.

pub mod classifier;
pub mod cli;
pub mod config;
pub mod file_category;
pub mod file_organizer;
pub mod history;
pub mod i18n;
pub mod journal;
pub mod lock;
pub mod logging;
pub mod output;
pub mod plan;
pub mod provider;
pub mod scan;
pub mod stats;
pub mod undo;

pub use classifier::{Classifier, ClassifierError, ClassifyRequest, Suggestion};
pub use config::{AppConfig, CompiledFilters, ConfigError};
pub use file_category::{Category, FileMapper};
pub use file_organizer::{ApplyOptions, FileOrganizer, Mode, OrganizeError, TransactionResult};
pub use history::{LogStore, TransactionRecord};
pub use plan::{Plan, PlanError, build_plan};
pub use stats::Stats;
pub use undo::{UndoManager, UndoReport};

pub use cli::{Command, RunStatus, run};
