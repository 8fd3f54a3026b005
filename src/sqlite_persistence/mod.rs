mod database;
mod versioned_schema;

pub use database::{now, parse_uuid_column, Database, EVAL_DB_VERSIONED_SCHEMAS};
pub use versioned_schema::*;
