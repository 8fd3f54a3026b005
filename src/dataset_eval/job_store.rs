//! Evaluation job queue storage.
//!
//! Every status change goes through [`EvalJobStore`], which enforces the job
//! state machine. Operations that read and then write (enqueue, claim,
//! transitions, deletion) run in an IMMEDIATE transaction so that two
//! writers can't both act on the same observed state.

use super::error::EvalError;
use super::models::*;
use super::validation::validate_complete;
use crate::dataset::{load_dataset, snapshot, DatasetError, SnapshotData, UserId};
use crate::lowlevel::LowLevelStore;
use crate::sqlite_persistence::{now, parse_uuid_column, Database};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Trait for evaluation job queue operations.
pub trait EvalJobStore: Send + Sync {
    // === Enqueue ===

    /// Validate the dataset, snapshot it and queue a pending job.
    ///
    /// Fails with [`EvalError::JobExists`] while another job for the dataset
    /// is pending or running, and with [`EvalError::IncompleteDataset`] if
    /// the dataset is not ready for evaluation.
    fn evaluate_dataset(
        &self,
        dataset_id: &Uuid,
        options: &JobOptions,
        eval_location: EvalLocation,
    ) -> EvalResult<Uuid>;

    /// Whether a pending or running job exists for the dataset.
    fn job_exists(&self, dataset_id: &Uuid) -> EvalResult<bool>;

    // === Reads ===

    fn get_job(&self, id: &Uuid) -> EvalResult<Option<EvalJob>>;

    /// Oldest pending local job, without claiming it.
    fn get_next_pending_job(&self) -> EvalResult<Option<EvalJob>>;

    /// Jobs of a dataset, oldest first.
    fn get_jobs_for_dataset(&self, dataset_id: &Uuid) -> EvalResult<Vec<EvalJob>>;

    /// Pending remote jobs for datasets authored by `user_id`, oldest first.
    fn get_remote_pending_jobs_for_user(&self, user_id: UserId) -> EvalResult<Vec<EvalJob>>;

    fn get_sets_for_job(&self, id: &Uuid) -> EvalResult<Option<EvalSets>>;

    // === State transitions ===

    /// Atomically take the oldest pending local job and mark it running.
    fn claim_next_pending_job(&self) -> EvalResult<Option<EvalJob>>;

    fn set_job_status(
        &self,
        id: &Uuid,
        status: JobStatus,
        status_msg: Option<&str>,
    ) -> EvalResult<()>;

    /// Store the trainer's result on a running job. Status is left unchanged.
    fn set_job_result(&self, id: &Uuid, result: &Value) -> EvalResult<()>;

    /// Store the result and mark the job done in one step.
    fn complete_job(&self, id: &Uuid, result: &Value) -> EvalResult<()>;

    /// Delete a pending job together with its snapshot.
    fn delete_job(&self, id: &Uuid) -> EvalResult<()>;

    fn add_sets_to_job(&self, id: &Uuid, sets: &EvalSets) -> EvalResult<()>;
}

pub struct SqliteEvalJobStore {
    db: Database,
    lowlevel: Arc<dyn LowLevelStore>,
}

const JOB_SELECT: &str = "SELECT j.id, j.snapshot_id, s.dataset_id, j.status, j.status_msg,
            j.options, j.eval_location, j.result, j.created, j.updated
     FROM dataset_eval_jobs j
     JOIN dataset_snapshot s ON s.id = j.snapshot_id";

fn column_error(
    row: &rusqlite::Row,
    column: &str,
    err: Box<dyn std::error::Error + Send + Sync>,
) -> rusqlite::Error {
    let index = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err)
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &rusqlite::Row,
    column: &str,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(column)?;
    raw.map(|s| serde_json::from_str(&s).map_err(|e| column_error(row, column, Box::new(e))))
        .transpose()
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<EvalJob> {
    let status: String = row.get("status")?;
    let eval_location: String = row.get("eval_location")?;
    Ok(EvalJob {
        id: parse_uuid_column(row, "id")?,
        snapshot_id: parse_uuid_column(row, "snapshot_id")?,
        dataset_id: parse_uuid_column(row, "dataset_id")?,
        status: JobStatus::from_db_str(&status).ok_or_else(|| {
            column_error(row, "status", format!("unknown job status {}", status).into())
        })?,
        status_msg: row.get("status_msg")?,
        options: json_column(row, "options")?.unwrap_or_default(),
        eval_location: EvalLocation::from_db_str(&eval_location).ok_or_else(|| {
            column_error(
                row,
                "eval_location",
                format!("unknown eval location {}", eval_location).into(),
            )
        })?,
        result: json_column(row, "result")?,
        created: row.get("created")?,
        updated: row.get("updated")?,
    })
}

fn load_job(conn: &Connection, id: &Uuid) -> rusqlite::Result<Option<EvalJob>> {
    conn.query_row(
        &format!("{} WHERE j.id = ?1", JOB_SELECT),
        params![id.to_string()],
        row_to_job,
    )
    .optional()
}

fn load_jobs(conn: &Connection, filter: &str, param: &dyn rusqlite::ToSql) -> rusqlite::Result<Vec<EvalJob>> {
    let mut stmt = conn.prepare(&format!(
        "{} WHERE {} ORDER BY j.created, j.rowid",
        JOB_SELECT, filter
    ))?;
    let jobs = stmt
        .query_map([param], row_to_job)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(jobs)
}

fn job_exists_in(conn: &Connection, dataset_id: &Uuid) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM dataset_eval_jobs j
             JOIN dataset_snapshot s ON s.id = j.snapshot_id
             WHERE s.dataset_id = ?1 AND j.status IN ('pending', 'running')
         )",
        params![dataset_id.to_string()],
        |row| row.get(0),
    )
}

/// Status and whether a result is stored.
fn job_state(conn: &Connection, id: &Uuid) -> EvalResult<(JobStatus, bool)> {
    let state: Option<(String, bool)> = conn
        .query_row(
            "SELECT status, result IS NOT NULL FROM dataset_eval_jobs WHERE id = ?1",
            params![id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (status, has_result) = state.ok_or(EvalError::JobNotFound(*id))?;
    let status = JobStatus::from_db_str(&status)
        .ok_or_else(|| EvalError::IncorrectJobStatus(status.clone()))?;
    Ok((status, has_result))
}

fn ensure_transition(from: JobStatus, to: JobStatus) -> EvalResult<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EvalError::InvalidTransition { from, to })
    }
}

fn ensure_result_settable(id: &Uuid, status: JobStatus, has_result: bool) -> EvalResult<()> {
    if status != JobStatus::Running {
        return Err(EvalError::InvalidTransition {
            from: status,
            to: JobStatus::Done,
        });
    }
    if has_result {
        return Err(EvalError::ResultAlreadySet(*id));
    }
    Ok(())
}

impl SqliteEvalJobStore {
    pub fn new(db: Database, lowlevel: Arc<dyn LowLevelStore>) -> Self {
        SqliteEvalJobStore { db, lowlevel }
    }

    fn validated_content(&self, dataset_id: &Uuid) -> EvalResult<SnapshotData> {
        let dataset = {
            let conn = self.db.lock()?;
            if job_exists_in(&conn, dataset_id)? {
                return Err(EvalError::JobExists(*dataset_id));
            }
            load_dataset(&conn, dataset_id)?.ok_or(DatasetError::NotFound(*dataset_id))?
        };
        // Low-level lookups may need the connection, so it is released first
        let content = SnapshotData::from(&dataset);
        validate_complete(&content, self.lowlevel.as_ref())?;
        Ok(content)
    }
}

impl EvalJobStore for SqliteEvalJobStore {
    fn evaluate_dataset(
        &self,
        dataset_id: &Uuid,
        options: &JobOptions,
        eval_location: EvalLocation,
    ) -> EvalResult<Uuid> {
        options.validate()?;
        let options_json = serde_json::to_string(options).map_err(anyhow::Error::from)?;
        let content = self.validated_content(dataset_id)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // Re-checked under the write lock; a concurrent request may have won
        if job_exists_in(&tx, dataset_id)? {
            return Err(EvalError::JobExists(*dataset_id));
        }
        let still_there: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM dataset WHERE id = ?1)",
            params![dataset_id.to_string()],
            |row| row.get(0),
        )?;
        if !still_there {
            return Err(DatasetError::NotFound(*dataset_id).into());
        }

        let snapshot_id = snapshot::insert_snapshot(&tx, dataset_id, &content)?;
        let job_id = Uuid::new_v4();
        let timestamp = now();
        tx.execute(
            "INSERT INTO dataset_eval_jobs
                 (id, snapshot_id, status, status_msg, options, eval_location, result, created, updated)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, NULL, ?6, ?6)",
            params![
                job_id.to_string(),
                snapshot_id.to_string(),
                JobStatus::Pending.as_db_str(),
                options_json,
                eval_location.as_db_str(),
                timestamp
            ],
        )?;
        tx.commit()?;

        info!(
            "Queued {} evaluation job {} for dataset {} (snapshot {})",
            eval_location.as_db_str(),
            job_id,
            dataset_id,
            snapshot_id
        );
        Ok(job_id)
    }

    fn job_exists(&self, dataset_id: &Uuid) -> EvalResult<bool> {
        let conn = self.db.lock()?;
        Ok(job_exists_in(&conn, dataset_id)?)
    }

    fn get_job(&self, id: &Uuid) -> EvalResult<Option<EvalJob>> {
        let conn = self.db.lock()?;
        Ok(load_job(&conn, id)?)
    }

    fn get_next_pending_job(&self) -> EvalResult<Option<EvalJob>> {
        let conn = self.db.lock()?;
        let job = conn
            .query_row(
                &format!(
                    "{} WHERE j.status = 'pending' AND j.eval_location = 'local'
                     ORDER BY j.created, j.rowid LIMIT 1",
                    JOB_SELECT
                ),
                [],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn get_jobs_for_dataset(&self, dataset_id: &Uuid) -> EvalResult<Vec<EvalJob>> {
        let conn = self.db.lock()?;
        Ok(load_jobs(&conn, "s.dataset_id = ?1", &dataset_id.to_string())?)
    }

    fn get_remote_pending_jobs_for_user(&self, user_id: UserId) -> EvalResult<Vec<EvalJob>> {
        let conn = self.db.lock()?;
        Ok(load_jobs(
            &conn,
            "j.status = 'pending' AND j.eval_location = 'remote'
             AND s.dataset_id IN (SELECT id FROM dataset WHERE author = ?1)",
            &user_id,
        )?)
    }

    fn get_sets_for_job(&self, id: &Uuid) -> EvalResult<Option<EvalSets>> {
        let conn = self.db.lock()?;
        let raw: Option<(String, String)> = conn
            .query_row(
                "SELECT train, test FROM dataset_eval_sets WHERE job_id = ?1",
                params![id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((train, test)) = raw else {
            return Ok(None);
        };
        let parse = |s: &str| -> EvalResult<ClassMapping> {
            serde_json::from_str(s).map_err(|e| EvalError::Store(e.into()))
        };
        Ok(Some(EvalSets {
            train: parse(&train)?,
            test: parse(&test)?,
        }))
    }

    fn claim_next_pending_job(&self) -> EvalResult<Option<EvalJob>> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let next: Option<String> = tx
            .query_row(
                "SELECT id FROM dataset_eval_jobs
                 WHERE status = 'pending' AND eval_location = 'local'
                 ORDER BY created, rowid LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let Some(next) = next else {
            return Ok(None);
        };

        let claimed = tx.execute(
            "UPDATE dataset_eval_jobs SET status = 'running', updated = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now(), next],
        )?;
        if claimed == 0 {
            return Ok(None);
        }
        let job = tx.query_row(
            &format!("{} WHERE j.id = ?1", JOB_SELECT),
            params![next],
            row_to_job,
        )?;
        tx.commit()?;

        debug!("Claimed evaluation job {}", job.id);
        Ok(Some(job))
    }

    fn set_job_status(
        &self,
        id: &Uuid,
        status: JobStatus,
        status_msg: Option<&str>,
    ) -> EvalResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (current, _) = job_state(&tx, id)?;
        ensure_transition(current, status)?;
        tx.execute(
            "UPDATE dataset_eval_jobs SET status = ?1, status_msg = ?2, updated = ?3 WHERE id = ?4",
            params![status.as_db_str(), status_msg, now(), id.to_string()],
        )?;
        tx.commit()?;
        debug!("Evaluation job {}: {} -> {}", id, current, status);
        Ok(())
    }

    fn set_job_result(&self, id: &Uuid, result: &Value) -> EvalResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (status, has_result) = job_state(&tx, id)?;
        ensure_result_settable(id, status, has_result)?;
        tx.execute(
            "UPDATE dataset_eval_jobs SET result = ?1, updated = ?2 WHERE id = ?3",
            params![result.to_string(), now(), id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn complete_job(&self, id: &Uuid, result: &Value) -> EvalResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (status, has_result) = job_state(&tx, id)?;
        ensure_result_settable(id, status, has_result)?;
        tx.execute(
            "UPDATE dataset_eval_jobs SET result = ?1, status = ?2, status_msg = NULL, updated = ?3
             WHERE id = ?4",
            params![
                result.to_string(),
                JobStatus::Done.as_db_str(),
                now(),
                id.to_string()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete_job(&self, id: &Uuid) -> EvalResult<()> {
        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (status, _) = job_state(&tx, id)?;
        if status != JobStatus::Pending {
            return Err(EvalError::JobNotDeletable { id: *id, status });
        }
        let snapshot_id: String = tx.query_row(
            "SELECT snapshot_id FROM dataset_eval_jobs WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        tx.execute(
            "DELETE FROM dataset_eval_jobs WHERE id = ?1",
            params![id.to_string()],
        )?;
        let snapshot_id = Uuid::parse_str(&snapshot_id).map_err(anyhow::Error::from)?;
        snapshot::delete_snapshot(&tx, &snapshot_id)?;
        tx.commit()?;

        info!("Deleted evaluation job {} and snapshot {}", id, snapshot_id);
        Ok(())
    }

    fn add_sets_to_job(&self, id: &Uuid, sets: &EvalSets) -> EvalResult<()> {
        let train = serde_json::to_string(&sets.train).map_err(anyhow::Error::from)?;
        let test = serde_json::to_string(&sets.test).map_err(anyhow::Error::from)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction()?;
        job_state(&tx, id)?;
        let existing: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM dataset_eval_sets WHERE job_id = ?1)",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        if existing {
            return Err(EvalError::Validation(format!(
                "Train and test sets of job {} are already stored",
                id
            )));
        }
        tx.execute(
            "INSERT INTO dataset_eval_sets (job_id, train, test) VALUES (?1, ?2, ?3)",
            params![id.to_string(), train, test],
        )?;
        tx.commit()?;
        Ok(())
    }
}
