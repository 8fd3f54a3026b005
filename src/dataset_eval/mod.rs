//! Dataset evaluation job queue.
//!
//! A job is created from an immutable snapshot of a dataset and moves through
//! `pending -> running -> done | failed`. Failed jobs are never retried;
//! submitting the dataset again creates a new snapshot and job.

pub mod artist_filter;
mod error;
mod job_store;
mod models;
pub(crate) mod schema;
pub mod validation;

pub use error::EvalError;
pub use job_store::{EvalJobStore, EvalResult, SqliteEvalJobStore};
pub use models::*;
