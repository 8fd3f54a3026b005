//! Tables holding user-authored datasets and their snapshots.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, ForeignKeyOnChange, SqlType, Table};

const DATASET_FK: ForeignKey = ForeignKey {
    foreign_table: "dataset",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

pub(crate) const DATASET_TABLE_V0: Table = Table {
    name: "dataset",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "description",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "public",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("author", &SqlType::Integer, non_null = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
        sqlite_column!("last_edited", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_dataset_author", "author")],
    unique_constraints: &[],
};

pub(crate) const DATASET_CLASS_TABLE_V0: Table = Table {
    name: "dataset_class",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "description",
            &SqlType::Text,
            non_null = true,
            default_value = Some("''")
        ),
        sqlite_column!(
            "dataset",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&DATASET_FK)
        ),
    ],
    indices: &[("idx_dataset_class_dataset", "dataset")],
    unique_constraints: &[&["dataset", "name"]],
};

pub(crate) const DATASET_CLASS_MEMBER_TABLE_V0: Table = Table {
    name: "dataset_class_member",
    columns: &[
        sqlite_column!(
            "class",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "dataset_class",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("mbid", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_dataset_class_member_mbid", "mbid")],
    unique_constraints: &[&["class", "mbid"]],
};

pub(crate) const DATASET_SNAPSHOT_TABLE_V0: Table = Table {
    name: "dataset_snapshot",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!(
            "dataset_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&DATASET_FK)
        ),
        sqlite_column!("data", &SqlType::Text, non_null = true),
        sqlite_column!("created", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_dataset_snapshot_dataset", "dataset_id")],
    unique_constraints: &[],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite_persistence::VersionedSchema;
    use rusqlite::Connection;

    const DATASET_TABLES: VersionedSchema = VersionedSchema {
        version: 0,
        tables: &[
            DATASET_TABLE_V0,
            DATASET_CLASS_TABLE_V0,
            DATASET_CLASS_MEMBER_TABLE_V0,
            DATASET_SNAPSHOT_TABLE_V0,
        ],
        migration: None,
    };

    #[test]
    fn test_dataset_tables_create_and_validate() {
        let conn = Connection::open_in_memory().unwrap();
        DATASET_TABLES.create(&conn).unwrap();
        DATASET_TABLES.validate(&conn).unwrap();
    }

    #[test]
    fn test_deleting_dataset_cascades_to_members_and_snapshots() {
        let conn = Connection::open_in_memory().unwrap();
        DATASET_TABLES.create(&conn).unwrap();

        conn.execute_batch(
            "INSERT INTO dataset (id, name, author, created, last_edited) VALUES ('d1', 'ds', 1, 0, 0);
             INSERT INTO dataset_class (id, name, dataset) VALUES (7, 'rock', 'd1');
             INSERT INTO dataset_class_member (class, mbid) VALUES (7, 'a');
             INSERT INTO dataset_snapshot (id, dataset_id, data, created) VALUES ('s1', 'd1', '{}', 0);
             DELETE FROM dataset WHERE id = 'd1';",
        )
        .unwrap();

        for table in ["dataset_class", "dataset_class_member", "dataset_snapshot"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 0, "{} should be empty", table);
        }
    }
}
