use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DatasetError {
    /// Malformed dataset, class or recording input. Nothing was written.
    #[error("{0}")]
    Validation(String),

    #[error("Dataset {0} not found")]
    NotFound(Uuid),

    #[error("{0}")]
    NoDataFound(String),

    #[error("Database error: {0}")]
    Store(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for DatasetError {
    fn from(e: rusqlite::Error) -> Self {
        DatasetError::Store(e.into())
    }
}
