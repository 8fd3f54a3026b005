//! Test environment: a file-backed database, the stores built on it and
//! scratch directories for the evaluator.

use super::constants::*;
use acousticbrainz_dataset_eval::config::EvaluatorSettings;
use acousticbrainz_dataset_eval::dataset::{ClassInput, DatasetInput};
use acousticbrainz_dataset_eval::{
    Database, DatasetEvaluator, DatasetStore, LowLevelStore, ModelTrainer, SqliteDatasetStore,
    SqliteEvalJobStore, SqliteLowLevelStore,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestEnv {
    // Keeps the database and working directories alive
    pub dir: TempDir,
    pub db: Database,
    pub datasets: Arc<SqliteDatasetStore>,
    pub jobs: Arc<SqliteEvalJobStore>,
    pub lowlevel: Arc<SqliteLowLevelStore>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("eval.db")).unwrap();
        let lowlevel = Arc::new(SqliteLowLevelStore::new(db.clone()));
        TestEnv {
            datasets: Arc::new(SqliteDatasetStore::new(db.clone())),
            jobs: Arc::new(SqliteEvalJobStore::new(db.clone(), lowlevel.clone())),
            lowlevel,
            db,
            dir,
        }
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.dir.path().join("datasets")
    }

    pub fn file_storage_dir(&self) -> PathBuf {
        self.dir.path().join("files")
    }

    pub fn settings(&self) -> EvaluatorSettings {
        EvaluatorSettings {
            dataset_dir: self.dataset_dir(),
            file_storage_dir: self.file_storage_dir(),
            poll_interval_secs: 1,
        }
    }

    pub fn evaluator(&self, trainer: Arc<dyn ModelTrainer>) -> DatasetEvaluator {
        DatasetEvaluator::new(
            self.datasets.clone(),
            self.jobs.clone(),
            self.lowlevel.clone(),
            trainer,
            self.settings(),
        )
    }

    /// Store one low-level submission tagged with `artist`.
    pub fn submit_lowlevel(&self, mbid: &str, artist: &str) {
        self.lowlevel
            .submit_low_level(
                mbid,
                &json!({
                    "metadata": {
                        "tags": {"musicbrainz_artistid": [artist]},
                        "audio_properties": {"sample_rate": 44100, "lossless": false, "length": 211.4}
                    },
                    "lowlevel": {"average_loudness": 0.87},
                    "rhythm": {"bpm": 121.5}
                }),
            )
            .unwrap();
    }

    /// Two classes of two recordings, all with low-level data.
    pub fn create_complete_dataset(&self, name: &str) -> Uuid {
        for mbid in HAPPY_RECORDINGS.iter().chain(SAD_RECORDINGS.iter()) {
            if self.lowlevel.count_lowlevel(mbid).unwrap() == 0 {
                self.submit_lowlevel(mbid, TEST_ARTIST);
            }
        }
        self.datasets
            .create(
                &DatasetInput {
                    name: name.to_string(),
                    description: Some("Mood of the recording".to_string()),
                    public: true,
                    classes: vec![
                        class("happy", &HAPPY_RECORDINGS),
                        class("sad", &SAD_RECORDINGS),
                    ],
                },
                TEST_AUTHOR,
            )
            .unwrap()
    }

    /// Number of entries left in the dataset directory.
    pub fn project_dirs(&self) -> usize {
        match std::fs::read_dir(self.dataset_dir()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

pub fn class(name: &str, recordings: &[&str]) -> ClassInput {
    ClassInput {
        name: name.to_string(),
        description: None,
        recordings: recordings.iter().map(|r| r.to_string()).collect(),
    }
}
