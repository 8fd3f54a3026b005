//! User-authored datasets: recordings grouped into labelled classes.

mod error;
mod import;
mod models;
pub(crate) mod schema;
pub(crate) mod snapshot;
mod store;
pub mod validation;

pub use error::DatasetError;
pub use import::classes_from_csv;
pub use models::*;
pub use store::{DatasetResult, DatasetStore, SqliteDatasetStore};
pub(crate) use store::load_dataset;
pub use validation::slugify;
