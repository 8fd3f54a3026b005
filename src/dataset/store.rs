//! Dataset storage and persistence.
//!
//! Every mutation runs inside a single transaction. `create` and `update`
//! replace the class list wholesale (delete then re-insert), so readers never
//! observe a half-written dataset.

use super::error::DatasetError;
use super::models::*;
use super::snapshot;
use super::validation::{
    normalize_mbid, validate_class, validate_dataset, validate_name, validate_recordings,
};
use crate::dataset_eval::JobStatus;
use crate::sqlite_persistence::{now, parse_uuid_column, Database};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

pub type DatasetResult<T> = std::result::Result<T, DatasetError>;

/// Trait for dataset and snapshot storage operations.
pub trait DatasetStore: Send + Sync {
    // === Datasets ===

    /// Validate and insert a new dataset, returning its id.
    fn create(&self, input: &DatasetInput, author: UserId) -> DatasetResult<Uuid>;

    /// Replace name, description, visibility, author and the full class list.
    fn update(&self, id: &Uuid, input: &DatasetInput, author: UserId) -> DatasetResult<()>;

    fn get(&self, id: &Uuid) -> DatasetResult<Dataset>;

    /// Delete a dataset together with its classes and snapshots.
    fn delete(&self, id: &Uuid) -> DatasetResult<()>;

    fn update_dataset_meta(&self, id: &Uuid, meta: &DatasetMetaUpdate) -> DatasetResult<()>;

    /// Datasets authored by `user_id`, newest first.
    fn get_by_user(&self, user_id: UserId, public_only: bool) -> DatasetResult<Vec<Dataset>>;

    /// Public datasets paired with the status of their latest evaluation job.
    /// Datasets that were never submitted for evaluation are not listed.
    fn get_public_datasets(&self, filter: PublicStatusFilter) -> DatasetResult<Vec<PublicDataset>>;

    fn check_recording_in_dataset(&self, id: &Uuid, mbid: &str) -> DatasetResult<bool>;

    // === Incremental edits ===

    fn add_recordings(&self, id: &Uuid, change: &ClassRecordings) -> DatasetResult<()>;
    fn delete_recordings(&self, id: &Uuid, change: &ClassRecordings) -> DatasetResult<()>;

    /// Add a class. If a class with that name already exists its recordings
    /// are merged into it instead.
    fn add_class(&self, id: &Uuid, class: &ClassInput) -> DatasetResult<()>;

    /// Remove a class by name. Unknown names are ignored.
    fn delete_class(&self, id: &Uuid, class_name: &str) -> DatasetResult<()>;

    fn update_class(&self, id: &Uuid, update: &ClassUpdate) -> DatasetResult<()>;

    // === Snapshots ===

    /// Take an immutable copy of the dataset's current content.
    fn create_snapshot(&self, dataset_id: &Uuid) -> DatasetResult<Uuid>;

    fn get_snapshot(&self, id: &Uuid) -> DatasetResult<Snapshot>;

    /// Snapshots of a dataset, oldest first.
    fn get_snapshots_for_dataset(&self, dataset_id: &Uuid) -> DatasetResult<Vec<Snapshot>>;
}

pub struct SqliteDatasetStore {
    db: Database,
}

impl SqliteDatasetStore {
    pub fn new(db: Database) -> Self {
        SqliteDatasetStore { db }
    }
}

fn row_to_dataset_header(row: &rusqlite::Row) -> rusqlite::Result<Dataset> {
    Ok(Dataset {
        id: parse_uuid_column(row, "id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        public: row.get("public")?,
        author: row.get("author")?,
        created: row.get("created")?,
        last_edited: row.get("last_edited")?,
        classes: Vec::new(),
    })
}

fn load_classes(conn: &Connection, dataset_id: &Uuid) -> rusqlite::Result<Vec<DatasetClass>> {
    let mut class_stmt = conn.prepare(
        "SELECT id, name, description FROM dataset_class WHERE dataset = ?1 ORDER BY id",
    )?;
    let mut classes = class_stmt
        .query_map(params![dataset_id.to_string()], |row| {
            Ok(DatasetClass {
                id: row.get("id")?,
                name: row.get("name")?,
                description: row.get("description")?,
                recordings: Vec::new(),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut member_stmt =
        conn.prepare("SELECT mbid FROM dataset_class_member WHERE class = ?1 ORDER BY rowid")?;
    for class in classes.iter_mut() {
        class.recordings = member_stmt
            .query_map(params![class.id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
    }
    Ok(classes)
}

/// Load a dataset with all of its classes.
pub(crate) fn load_dataset(conn: &Connection, id: &Uuid) -> rusqlite::Result<Option<Dataset>> {
    let header = conn
        .query_row(
            "SELECT id, name, description, public, author, created, last_edited
             FROM dataset WHERE id = ?1",
            params![id.to_string()],
            row_to_dataset_header,
        )
        .optional()?;
    match header {
        Some(mut dataset) => {
            dataset.classes = load_classes(conn, id)?;
            Ok(Some(dataset))
        }
        None => Ok(None),
    }
}

fn dataset_exists(conn: &Connection, id: &Uuid) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM dataset WHERE id = ?1)",
        params![id.to_string()],
        |row| row.get(0),
    )
}

fn ensure_dataset_exists(conn: &Connection, id: &Uuid) -> DatasetResult<()> {
    if dataset_exists(conn, id)? {
        Ok(())
    } else {
        Err(DatasetError::NotFound(*id))
    }
}

fn touch(conn: &Connection, id: &Uuid) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE dataset SET last_edited = ?1 WHERE id = ?2",
        params![now(), id.to_string()],
    )?;
    Ok(())
}

fn find_class_id(conn: &Connection, dataset_id: &Uuid, name: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM dataset_class WHERE dataset = ?1 AND name = ?2",
        params![dataset_id.to_string(), name],
        |row| row.get(0),
    )
    .optional()
}

fn require_class_id(conn: &Connection, dataset_id: &Uuid, name: &str) -> DatasetResult<i64> {
    find_class_id(conn, dataset_id, name)?
        .ok_or_else(|| DatasetError::NoDataFound(format!("Class \"{}\" doesn't exist", name)))
}

/// Duplicates are ignored, so the first occurrence keeps its position.
/// MBIDs differing only in case are the same recording.
fn insert_members(conn: &Connection, class_id: i64, recordings: &[String]) -> rusqlite::Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO dataset_class_member (class, mbid) VALUES (?1, ?2)")?;
    for mbid in recordings {
        stmt.execute(params![class_id, normalize_mbid(mbid)])?;
    }
    Ok(())
}

fn insert_class(conn: &Connection, dataset_id: &Uuid, class: &ClassInput) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO dataset_class (name, description, dataset) VALUES (?1, ?2, ?3)",
        params![
            class.name,
            class.description.as_deref().unwrap_or(""),
            dataset_id.to_string()
        ],
    )?;
    let class_id = conn.last_insert_rowid();
    insert_members(conn, class_id, &class.recordings)?;
    Ok(class_id)
}

impl DatasetStore for SqliteDatasetStore {
    fn create(&self, input: &DatasetInput, author: UserId) -> DatasetResult<Uuid> {
        validate_dataset(input)?;

        let id = Uuid::new_v4();
        let timestamp = now();
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO dataset (id, name, description, public, author, created, last_edited)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                id.to_string(),
                input.name,
                input.description.as_deref().unwrap_or(""),
                input.public,
                author,
                timestamp
            ],
        )?;
        for class in &input.classes {
            insert_class(&tx, &id, class)?;
        }
        tx.commit()?;

        info!("Created dataset {} ({} classes)", id, input.classes.len());
        Ok(id)
    }

    fn update(&self, id: &Uuid, input: &DatasetInput, author: UserId) -> DatasetResult<()> {
        validate_dataset(input)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let updated = tx.execute(
            "UPDATE dataset SET name = ?1, description = ?2, public = ?3, author = ?4, last_edited = ?5
             WHERE id = ?6",
            params![
                input.name,
                input.description.as_deref().unwrap_or(""),
                input.public,
                author,
                now(),
                id.to_string()
            ],
        )?;
        if updated == 0 {
            return Err(DatasetError::NotFound(*id));
        }
        tx.execute(
            "DELETE FROM dataset_class WHERE dataset = ?1",
            params![id.to_string()],
        )?;
        for class in &input.classes {
            insert_class(&tx, id, class)?;
        }
        tx.commit()?;
        debug!("Replaced content of dataset {}", id);
        Ok(())
    }

    fn get(&self, id: &Uuid) -> DatasetResult<Dataset> {
        let conn = self.db.lock()?;
        load_dataset(&conn, id)?.ok_or(DatasetError::NotFound(*id))
    }

    fn delete(&self, id: &Uuid) -> DatasetResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        ensure_dataset_exists(&tx, id)?;
        // Jobs hang off snapshots and go with them
        let snapshots = snapshot::delete_snapshots_for_dataset(&tx, id)?;
        tx.execute("DELETE FROM dataset WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        info!("Deleted dataset {} and {} snapshot(s)", id, snapshots);
        Ok(())
    }

    fn update_dataset_meta(&self, id: &Uuid, meta: &DatasetMetaUpdate) -> DatasetResult<()> {
        if let Some(name) = &meta.name {
            validate_name("Dataset", name)?;
        }

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        ensure_dataset_exists(&tx, id)?;
        if let Some(name) = &meta.name {
            tx.execute(
                "UPDATE dataset SET name = ?1 WHERE id = ?2",
                params![name, id.to_string()],
            )?;
        }
        if let Some(description) = &meta.description {
            tx.execute(
                "UPDATE dataset SET description = ?1 WHERE id = ?2",
                params![description, id.to_string()],
            )?;
        }
        if let Some(public) = meta.public {
            tx.execute(
                "UPDATE dataset SET public = ?1 WHERE id = ?2",
                params![public, id.to_string()],
            )?;
        }
        touch(&tx, id)?;
        tx.commit()?;
        Ok(())
    }

    fn get_by_user(&self, user_id: UserId, public_only: bool) -> DatasetResult<Vec<Dataset>> {
        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, description, public, author, created, last_edited
             FROM dataset
             WHERE author = ?1 AND (public = 1 OR ?2 = 0)
             ORDER BY created DESC, rowid DESC",
        )?;
        let mut datasets = stmt
            .query_map(params![user_id, public_only], row_to_dataset_header)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for dataset in datasets.iter_mut() {
            dataset.classes = load_classes(&conn, &dataset.id)?;
        }
        Ok(datasets)
    }

    fn get_public_datasets(&self, filter: PublicStatusFilter) -> DatasetResult<Vec<PublicDataset>> {
        let status = match filter {
            PublicStatusFilter::All => None,
            PublicStatusFilter::Status(status) => Some(status.as_db_str()),
        };

        let conn = self.db.lock()?;
        let mut stmt = conn.prepare(
            "WITH latest_job AS (
                 SELECT s.dataset_id, j.status, j.created,
                        ROW_NUMBER() OVER (
                            PARTITION BY s.dataset_id ORDER BY j.created DESC, j.rowid DESC
                        ) AS position
                 FROM dataset_eval_jobs j
                 JOIN dataset_snapshot s ON s.id = j.snapshot_id
             )
             SELECT d.id, d.name, d.description, d.author, d.created,
                    l.status AS job_status, l.created AS job_created
             FROM dataset d
             JOIN latest_job l ON l.dataset_id = d.id AND l.position = 1
             WHERE d.public = 1 AND (?1 IS NULL OR l.status = ?1)
             ORDER BY l.created DESC, d.created DESC",
        )?;
        let rows = stmt
            .query_map(params![status], |row| {
                Ok((
                    parse_uuid_column(row, "id")?,
                    row.get::<_, String>("name")?,
                    row.get::<_, String>("description")?,
                    row.get::<_, UserId>("author")?,
                    row.get::<_, i64>("created")?,
                    row.get::<_, String>("job_status")?,
                    row.get::<_, i64>("job_created")?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, name, description, author, created, status, job_created)| -> DatasetResult<PublicDataset> {
                let status = JobStatus::from_db_str(&status)
                    .with_context(|| format!("Unknown job status {:?} in database", status))?;
                Ok(PublicDataset {
                    id,
                    name,
                    description,
                    author,
                    created,
                    status,
                    job_created,
                })
            })
            .collect()
    }

    fn check_recording_in_dataset(&self, id: &Uuid, mbid: &str) -> DatasetResult<bool> {
        let conn = self.db.lock()?;
        Ok(conn.query_row(
            "SELECT EXISTS(
                 SELECT 1 FROM dataset_class_member m
                 JOIN dataset_class c ON c.id = m.class
                 WHERE c.dataset = ?1 AND m.mbid = ?2
             )",
            params![id.to_string(), normalize_mbid(mbid)],
            |row| row.get(0),
        )?)
    }

    fn add_recordings(&self, id: &Uuid, change: &ClassRecordings) -> DatasetResult<()> {
        validate_recordings(&change.recordings)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        ensure_dataset_exists(&tx, id)?;
        let class_id = require_class_id(&tx, id, &change.class_name)?;
        insert_members(&tx, class_id, &change.recordings)?;
        touch(&tx, id)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_recordings(&self, id: &Uuid, change: &ClassRecordings) -> DatasetResult<()> {
        validate_recordings(&change.recordings)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        ensure_dataset_exists(&tx, id)?;
        let class_id = require_class_id(&tx, id, &change.class_name)?;
        {
            let mut stmt =
                tx.prepare("DELETE FROM dataset_class_member WHERE class = ?1 AND mbid = ?2")?;
            for mbid in &change.recordings {
                stmt.execute(params![class_id, normalize_mbid(mbid)])?;
            }
        }
        touch(&tx, id)?;
        tx.commit()?;
        Ok(())
    }

    fn add_class(&self, id: &Uuid, class: &ClassInput) -> DatasetResult<()> {
        validate_class(class)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        ensure_dataset_exists(&tx, id)?;
        match find_class_id(&tx, id, &class.name)? {
            Some(class_id) => insert_members(&tx, class_id, &class.recordings)?,
            None => {
                insert_class(&tx, id, class)?;
            }
        }
        touch(&tx, id)?;
        tx.commit()?;
        Ok(())
    }

    fn delete_class(&self, id: &Uuid, class_name: &str) -> DatasetResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        ensure_dataset_exists(&tx, id)?;
        let deleted = tx.execute(
            "DELETE FROM dataset_class WHERE dataset = ?1 AND name = ?2",
            params![id.to_string(), class_name],
        )?;
        if deleted > 0 {
            touch(&tx, id)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn update_class(&self, id: &Uuid, update: &ClassUpdate) -> DatasetResult<()> {
        if let Some(new_name) = &update.new_name {
            validate_name("Class", new_name)?;
        }

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        ensure_dataset_exists(&tx, id)?;
        let class_id = require_class_id(&tx, id, &update.name)?;
        if let Some(new_name) = &update.new_name {
            if new_name != &update.name && find_class_id(&tx, id, new_name)?.is_some() {
                return Err(DatasetError::Validation(format!(
                    "Class \"{}\" already exists",
                    new_name
                )));
            }
            tx.execute(
                "UPDATE dataset_class SET name = ?1 WHERE id = ?2",
                params![new_name, class_id],
            )?;
        }
        if let Some(description) = &update.description {
            tx.execute(
                "UPDATE dataset_class SET description = ?1 WHERE id = ?2",
                params![description, class_id],
            )?;
        }
        touch(&tx, id)?;
        tx.commit()?;
        Ok(())
    }

    fn create_snapshot(&self, dataset_id: &Uuid) -> DatasetResult<Uuid> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        let dataset = load_dataset(&tx, dataset_id)?.ok_or(DatasetError::NotFound(*dataset_id))?;
        let id = snapshot::insert_snapshot(&tx, dataset_id, &SnapshotData::from(&dataset))?;
        tx.commit()?;
        debug!("Created snapshot {} of dataset {}", id, dataset_id);
        Ok(id)
    }

    fn get_snapshot(&self, id: &Uuid) -> DatasetResult<Snapshot> {
        let conn = self.db.lock()?;
        snapshot::load_snapshot(&conn, id)?
            .ok_or_else(|| DatasetError::NoDataFound(format!("Can't find snapshot with ID: {}", id)))
    }

    fn get_snapshots_for_dataset(&self, dataset_id: &Uuid) -> DatasetResult<Vec<Snapshot>> {
        let conn = self.db.lock()?;
        Ok(snapshot::load_snapshots_for_dataset(&conn, dataset_id)?)
    }
}
