//! Snapshot persistence.
//!
//! Snapshots are written once and never updated. The helpers take a plain
//! `&Connection` so they can run inside a transaction opened by the caller
//! (job creation and job deletion both need that).

use super::models::{Snapshot, SnapshotData};
use crate::sqlite_persistence::{now, parse_uuid_column};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

pub(crate) fn insert_snapshot(
    conn: &Connection,
    dataset_id: &Uuid,
    data: &SnapshotData,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let json = serde_json::to_string(data).context("Failed to serialize snapshot")?;
    conn.execute(
        "INSERT INTO dataset_snapshot (id, dataset_id, data, created) VALUES (?1, ?2, ?3, ?4)",
        params![id.to_string(), dataset_id.to_string(), json, now()],
    )?;
    Ok(id)
}

fn row_to_snapshot(row: &rusqlite::Row) -> rusqlite::Result<(Uuid, Uuid, i64, String)> {
    Ok((
        parse_uuid_column(row, "id")?,
        parse_uuid_column(row, "dataset_id")?,
        row.get("created")?,
        row.get("data")?,
    ))
}

fn decode(raw: (Uuid, Uuid, i64, String)) -> Result<Snapshot> {
    let (id, dataset_id, created, data) = raw;
    let data: SnapshotData = serde_json::from_str(&data)
        .with_context(|| format!("Corrupted data in snapshot {}", id))?;
    Ok(Snapshot {
        id,
        dataset_id,
        created,
        data,
    })
}

pub(crate) fn load_snapshot(conn: &Connection, id: &Uuid) -> Result<Option<Snapshot>> {
    conn.query_row(
        "SELECT id, dataset_id, created, data FROM dataset_snapshot WHERE id = ?1",
        params![id.to_string()],
        row_to_snapshot,
    )
    .optional()?
    .map(decode)
    .transpose()
}

pub(crate) fn load_snapshots_for_dataset(
    conn: &Connection,
    dataset_id: &Uuid,
) -> Result<Vec<Snapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, dataset_id, created, data FROM dataset_snapshot
         WHERE dataset_id = ?1 ORDER BY created, rowid",
    )?;
    let rows = stmt
        .query_map(params![dataset_id.to_string()], row_to_snapshot)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(decode).collect()
}

/// Returns whether a snapshot was removed.
pub(crate) fn delete_snapshot(conn: &Connection, id: &Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM dataset_snapshot WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(deleted > 0)
}

pub(crate) fn delete_snapshots_for_dataset(conn: &Connection, dataset_id: &Uuid) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM dataset_snapshot WHERE dataset_id = ?1",
        params![dataset_id.to_string()],
    )?)
}
