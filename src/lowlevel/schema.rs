use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table};

/// One row per submitted low-level document. A recording may have several
/// submissions, numbered from 0 by `submission_offset`.
pub(crate) const LOWLEVEL_TABLE_V0: Table = Table {
    name: "lowlevel",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("gid", &SqlType::Text, non_null = true),
        sqlite_column!("submission_offset", &SqlType::Integer, non_null = true),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!("submitted", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_lowlevel_gid", "gid")],
    unique_constraints: &[&["gid", "submission_offset"]],
};
