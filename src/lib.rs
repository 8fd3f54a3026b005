//! AcousticBrainz dataset evaluation
//!
//! Datasets of labelled recordings, immutable snapshots of them, and the job
//! queue that trains and evaluates a classifier for each submitted snapshot.

pub mod config;
pub mod dataset;
pub mod dataset_eval;
pub mod evaluator;
pub mod lowlevel;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use dataset::{DatasetStore, SqliteDatasetStore};
pub use dataset_eval::{EvalJobStore, SqliteEvalJobStore};
pub use evaluator::{CommandTrainer, DatasetEvaluator, ModelTrainer};
pub use lowlevel::{LowLevelStore, SqliteLowLevelStore};
pub use sqlite_persistence::Database;
