//! Evaluator worker: turns pending local jobs into trained models.

mod history;
mod project;
mod trainer;
mod worker;

pub use history::{history_file_path, save_history_file};
pub use project::EvalProject;
pub use trainer::{CommandTrainer, ModelTrainer, TrainerError, TrainingOutcome, TrainingRequest};
pub use worker::DatasetEvaluator;
