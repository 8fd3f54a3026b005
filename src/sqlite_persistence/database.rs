//! Shared SQLite handle for the dataset and evaluation stores.
//!
//! A single [`Database`] is opened by the process entry point and cloned into
//! every store that needs it. All stores share one connection guarded by a
//! mutex, so a transaction opened by one store is never interleaved with
//! writes from another store in the same process.

use super::versioned_schema::{VersionedSchema, BASE_DB_VERSION};
use crate::dataset::schema::{
    DATASET_CLASS_MEMBER_TABLE_V0, DATASET_CLASS_TABLE_V0, DATASET_SNAPSHOT_TABLE_V0,
    DATASET_TABLE_V0,
};
use crate::dataset_eval::schema::{
    create_eval_sets_table, DATASET_EVAL_JOBS_TABLE_V0, DATASET_EVAL_SETS_TABLE_V1,
};
use crate::lowlevel::schema::LOWLEVEL_TABLE_V0;
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::types::Type;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// How long a writer waits for a lock held by another process (web layer,
/// second worker) before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub const EVAL_DB_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            DATASET_TABLE_V0,
            DATASET_CLASS_TABLE_V0,
            DATASET_CLASS_MEMBER_TABLE_V0,
            DATASET_SNAPSHOT_TABLE_V0,
            DATASET_EVAL_JOBS_TABLE_V0,
            LOWLEVEL_TABLE_V0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            DATASET_TABLE_V0,
            DATASET_CLASS_TABLE_V0,
            DATASET_CLASS_MEMBER_TABLE_V0,
            DATASET_SNAPSHOT_TABLE_V0,
            DATASET_EVAL_JOBS_TABLE_V0,
            LOWLEVEL_TABLE_V0,
            DATASET_EVAL_SETS_TABLE_V1,
        ],
        migration: Some(create_eval_sets_table),
    },
];

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `db_path`.
    ///
    /// A new file gets the latest schema. An existing file is validated
    /// against the schema of its recorded version and then migrated forward.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = if db_path.exists() {
            Connection::open(db_path)
                .with_context(|| format!("Failed to open database at {:?}", db_path))?
        } else {
            let conn = Connection::open(db_path)
                .with_context(|| format!("Failed to create database at {:?}", db_path))?;
            EVAL_DB_VERSIONED_SCHEMAS
                .last()
                .context("No schemas defined")?
                .create(&conn)?;
            info!("Created new evaluation database at {:?}", db_path);
            conn
        };

        conn.execute("PRAGMA foreign_keys = ON;", [])?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let db_version = conn
            .query_row("PRAGMA user_version;", [], |row| row.get::<usize, i64>(0))
            .context("Failed to read database version")?
            - BASE_DB_VERSION as i64;
        if db_version < 0 {
            bail!(
                "Database version {} is too old, does not contain base db version {}",
                db_version,
                BASE_DB_VERSION
            );
        }
        let version = db_version as usize;
        if version >= EVAL_DB_VERSIONED_SCHEMAS.len() {
            bail!(
                "Database version {} is too new (max supported: {})",
                version,
                EVAL_DB_VERSIONED_SCHEMAS.len() - 1
            );
        }

        EVAL_DB_VERSIONED_SCHEMAS
            .get(version)
            .context("Failed to get schema")?
            .validate(&conn)?;
        Self::migrate_if_needed(&conn, version)?;

        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Fresh database at the latest schema, kept in memory.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        EVAL_DB_VERSIONED_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Database {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate_if_needed(conn: &Connection, current_version: usize) -> Result<()> {
        let target_version = EVAL_DB_VERSIONED_SCHEMAS.len() - 1;
        if current_version >= target_version {
            return Ok(());
        }

        info!(
            "Migrating evaluation database from version {} to {}",
            current_version, target_version
        );
        for schema in EVAL_DB_VERSIONED_SCHEMAS.iter().skip(current_version + 1) {
            if let Some(migration_fn) = schema.migration {
                info!("Running migration to version {}", schema.version);
                migration_fn(conn)?;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + target_version),
            [],
        )?;
        Ok(())
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Database connection mutex poisoned"))
    }
}

/// Current time in unix seconds.
pub fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Read a TEXT column holding a hyphenated UUID.
pub fn parse_uuid_column(row: &rusqlite::Row, column: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| {
        let index = row.as_ref().column_index(column).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })
}
