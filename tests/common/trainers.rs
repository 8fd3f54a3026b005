//! In-process stand-ins for the external trainer.

use super::constants::MOCK_RESULT;
use acousticbrainz_dataset_eval::dataset_eval::{EvalJobStore, JobStatus};
use acousticbrainz_dataset_eval::evaluator::{TrainerError, TrainingOutcome, TrainingRequest};
use acousticbrainz_dataset_eval::ModelTrainer;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// What the trainer found in the project directory.
#[derive(Debug, Clone)]
pub struct SeenProject {
    pub request: TrainingRequest,
    pub groundtruth: serde_yaml::Value,
    pub filelist: BTreeMap<String, PathBuf>,
    /// Status of the observed job while training, if one was observed.
    pub job_status: Option<JobStatus>,
}

/// Returns a fixed outcome after reading back the generated project files.
pub struct MockTrainer {
    outcome: serde_json::Value,
    write_history: bool,
    observed_job: Option<(Arc<dyn EvalJobStore>, Uuid)>,
    seen: Mutex<Vec<SeenProject>>,
}

impl MockTrainer {
    pub fn succeeding() -> Self {
        MockTrainer {
            outcome: serde_json::from_str(MOCK_RESULT).unwrap(),
            write_history: false,
            observed_job: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Also write a history file into the project directory and report it.
    pub fn with_history(mut self) -> Self {
        self.write_history = true;
        self
    }

    /// Record the status of `job_id` at the time training runs.
    pub fn observing(mut self, jobs: Arc<dyn EvalJobStore>, job_id: Uuid) -> Self {
        self.observed_job = Some((jobs, job_id));
        self
    }

    pub fn seen(&self) -> Vec<SeenProject> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelTrainer for MockTrainer {
    async fn train(&self, request: &TrainingRequest) -> Result<TrainingOutcome, TrainerError> {
        let groundtruth =
            serde_yaml::from_str(&std::fs::read_to_string(&request.groundtruth_path)?)
                .map_err(|e| TrainerError::InvalidOutput(e.to_string()))?;
        let filelist = serde_yaml::from_str(&std::fs::read_to_string(&request.filelist_path)?)
            .map_err(|e| TrainerError::InvalidOutput(e.to_string()))?;
        let job_status = self.observed_job.as_ref().map(|(jobs, id)| {
            jobs.get_job(id)
                .unwrap()
                .expect("observed job exists")
                .status
        });
        self.seen.lock().unwrap().push(SeenProject {
            request: request.clone(),
            groundtruth,
            filelist,
            job_status,
        });

        let mut outcome: TrainingOutcome = serde_json::from_value(self.outcome.clone())
            .map_err(|e| TrainerError::InvalidOutput(e.to_string()))?;
        if self.write_history {
            let path = request.project_dir.join("model.history");
            std::fs::write(&path, "iteration 1: 0.5\niteration 2: 1.0\n")?;
            outcome.history_path = Some(path);
        }
        Ok(outcome)
    }
}

/// Always fails as if the trainer process had crashed.
pub struct FailingTrainer {
    pub project_dirs: Mutex<Vec<PathBuf>>,
}

impl FailingTrainer {
    pub fn new() -> Self {
        FailingTrainer {
            project_dirs: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ModelTrainer for FailingTrainer {
    async fn train(&self, request: &TrainingRequest) -> Result<TrainingOutcome, TrainerError> {
        assert!(request.project_dir.is_dir());
        self.project_dirs
            .lock()
            .unwrap()
            .push(request.project_dir.clone());
        Err(TrainerError::Failed {
            status: "exit status: 139".to_string(),
            stderr: "segmentation fault".to_string(),
        })
    }
}
