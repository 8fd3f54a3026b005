//! Tables for evaluation jobs and their train/test sets.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, ForeignKeyOnChange, SqlType, Table};
use anyhow::Result;
use rusqlite::Connection;

pub(crate) const DATASET_EVAL_JOBS_TABLE_V0: Table = Table {
    name: "dataset_eval_jobs",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "snapshot_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "dataset_snapshot",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("status", &SqlType::Text, non_null = true),
        sqlite_column!("status_msg", &SqlType::Text),
        sqlite_column!("options", &SqlType::Text, non_null = true),
        sqlite_column!("eval_location", &SqlType::Text, non_null = true),
        sqlite_column!("result", &SqlType::Text),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("updated", &SqlType::Integer, non_null = true),
    ],
    indices: &[
        ("idx_eval_jobs_queue", "status, eval_location, created"),
        ("idx_eval_jobs_snapshot", "snapshot_id"),
    ],
    unique_constraints: &[],
};

/// Added in version 1.
pub(crate) const DATASET_EVAL_SETS_TABLE_V1: Table = Table {
    name: "dataset_eval_sets",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "job_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "dataset_eval_jobs",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("train", &SqlType::Text, non_null = true),
        sqlite_column!("test", &SqlType::Text, non_null = true),
    ],
    indices: &[],
    unique_constraints: &[&["job_id"]],
};

pub(crate) fn create_eval_sets_table(conn: &Connection) -> Result<()> {
    DATASET_EVAL_SETS_TABLE_V1.create(conn)
}
