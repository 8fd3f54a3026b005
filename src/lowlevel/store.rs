//! Low-level document storage.

use crate::sqlite_persistence::{now, Database};
use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use tracing::debug;

/// Read/write access to per-recording low-level analysis documents.
pub trait LowLevelStore: Send + Sync {
    /// Number of submissions stored for a recording.
    fn count_lowlevel(&self, mbid: &str) -> Result<i64>;

    /// Load one submission. Offset 0 is the first submission.
    fn load_low_level(&self, mbid: &str, offset: i64) -> Result<Option<Value>>;

    /// Store a new submission and return its offset.
    fn submit_low_level(&self, mbid: &str, data: &Value) -> Result<i64>;

    /// First MusicBrainz artist id tagged in the recording's first submission.
    fn artist_for_recording(&self, mbid: &str) -> Result<Option<String>>;
}

pub struct SqliteLowLevelStore {
    db: Database,
}

impl SqliteLowLevelStore {
    pub fn new(db: Database) -> Self {
        SqliteLowLevelStore { db }
    }
}

impl LowLevelStore for SqliteLowLevelStore {
    fn count_lowlevel(&self, mbid: &str) -> Result<i64> {
        let conn = self.db.lock()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM lowlevel WHERE gid = ?1",
            params![mbid.to_lowercase()],
            |row| row.get(0),
        )?)
    }

    fn load_low_level(&self, mbid: &str, offset: i64) -> Result<Option<Value>> {
        let conn = self.db.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM lowlevel WHERE gid = ?1 AND submission_offset = ?2",
                params![mbid.to_lowercase(), offset],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|data| {
            serde_json::from_str(&data)
                .with_context(|| format!("Corrupted low-level data for recording {}", mbid))
        })
        .transpose()
    }

    fn submit_low_level(&self, mbid: &str, data: &Value) -> Result<i64> {
        let gid = mbid.to_lowercase();
        let json = serde_json::to_string(data)?;

        let mut conn = self.db.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let offset: i64 = tx.query_row(
            "SELECT COALESCE(MAX(submission_offset) + 1, 0) FROM lowlevel WHERE gid = ?1",
            params![gid],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO lowlevel (gid, submission_offset, data, submitted) VALUES (?1, ?2, ?3, ?4)",
            params![gid, offset, json, now()],
        )?;
        tx.commit()?;

        debug!("Stored low-level submission {} for {}", offset, gid);
        Ok(offset)
    }

    fn artist_for_recording(&self, mbid: &str) -> Result<Option<String>> {
        let conn = self.db.lock()?;
        let artist: Option<Option<String>> = conn
            .query_row(
                "SELECT json_extract(data, '$.metadata.tags.musicbrainz_artistid[0]')
                 FROM lowlevel WHERE gid = ?1 ORDER BY submission_offset LIMIT 1",
                params![mbid.to_lowercase()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(artist.flatten().filter(|a| !a.is_empty()))
    }
}
