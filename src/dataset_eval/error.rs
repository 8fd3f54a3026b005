use super::models::JobStatus;
use crate::dataset::DatasetError;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the evaluation job queue.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Bad request input. Nothing was written.
    #[error("{0}")]
    Validation(String),

    /// The dataset can't be evaluated in its current state.
    #[error("{0}")]
    IncompleteDataset(String),

    #[error("An evaluation job for dataset {0} already exists")]
    JobExists(Uuid),

    #[error("Evaluation job {0} not found")]
    JobNotFound(Uuid),

    #[error("Evaluation job {id} can't be deleted while {status}")]
    JobNotDeletable { id: Uuid, status: JobStatus },

    #[error("Incorrect job status: {0}")]
    IncorrectJobStatus(String),

    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Result of evaluation job {0} is already set")]
    ResultAlreadySet(Uuid),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error("Database error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for EvalError {
    fn from(e: rusqlite::Error) -> Self {
        EvalError::Store(e.into())
    }
}
