//! Background worker that runs local evaluation jobs one at a time.
//!
//! Each iteration claims the oldest pending local job, materialises its
//! project directory, runs the trainer and records the outcome. Any error
//! after the claim fails the job; the worker itself keeps running.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::history::save_history_file;
use super::project::EvalProject;
use super::trainer::{ModelTrainer, TrainingOutcome, TrainingRequest};
use crate::config::EvaluatorSettings;
use crate::dataset::DatasetStore;
use crate::dataset_eval::artist_filter::split_sets;
use crate::dataset_eval::{EvalJob, EvalJobStore, JobStatus};
use crate::lowlevel::LowLevelStore;

pub struct DatasetEvaluator {
    datasets: Arc<dyn DatasetStore>,
    jobs: Arc<dyn EvalJobStore>,
    lowlevel: Arc<dyn LowLevelStore>,
    trainer: Arc<dyn ModelTrainer>,
    settings: EvaluatorSettings,
}

impl DatasetEvaluator {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        jobs: Arc<dyn EvalJobStore>,
        lowlevel: Arc<dyn LowLevelStore>,
        trainer: Arc<dyn ModelTrainer>,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            datasets,
            jobs,
            lowlevel,
            trainer,
            settings,
        }
    }

    /// Main processing loop. Returns once `shutdown` is cancelled; a job
    /// that is being trained at that point is finished first.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting dataset evaluator...");
        info!("Dataset dir path: {:?}", self.settings.dataset_dir);
        info!(
            "Storage dir path: {:?}",
            self.settings.file_storage_dir.join("history")
        );

        while !shutdown.is_cancelled() {
            let processed = match self.process_next().await {
                Ok(processed) => processed,
                Err(e) => {
                    error!("Failed to process evaluation queue: {:#}", e);
                    None
                }
            };
            if processed.is_some() {
                continue;
            }

            info!(
                "No pending jobs. Sleeping {} seconds.",
                self.settings.poll_interval_secs
            );
            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval()) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        info!("Dataset evaluator stopped");
    }

    /// Claim and run the next pending local job.
    ///
    /// Returns the job id and its final status, or `None` when the queue is
    /// empty. An error is returned only when the queue itself can't be
    /// read or the job can't be marked failed.
    pub async fn process_next(&self) -> Result<Option<(Uuid, JobStatus)>> {
        let Some(job) = self.jobs.claim_next_pending_job()? else {
            return Ok(None);
        };
        info!("Processing job {}...", job.id);

        let outcome = match self.evaluate(&job).await {
            Ok(result) => self
                .jobs
                .complete_job(&job.id, &result)
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                info!("Evaluation job {} has been completed.", job.id);
                Ok(Some((job.id, JobStatus::Done)))
            }
            Err(e) => {
                let message = format!("{:#}", e);
                warn!("Evaluation job {} has failed: {}", job.id, message);
                self.jobs
                    .set_job_status(&job.id, JobStatus::Failed, Some(&message))
                    .with_context(|| format!("Failed to mark job {} as failed", job.id))?;
                Ok(Some((job.id, JobStatus::Failed)))
            }
        }
    }

    async fn evaluate(&self, job: &EvalJob) -> Result<Value> {
        // Dropping the project removes its directory, so it lives until the
        // history file has been copied out
        let (project, request) = self.prepare(job)?;

        info!("Training model for job {}...", job.id);
        let outcome = self.trainer.train(&request).await?;

        info!("Saving results...");
        let history_path = outcome
            .history_path
            .as_deref()
            .map(|path| {
                save_history_file(&self.settings.file_storage_dir, path, &job.id)
            })
            .transpose()?;
        drop(project);

        Ok(result_json(&outcome, history_path.as_deref()))
    }

    fn prepare(&self, job: &EvalJob) -> Result<(EvalProject, TrainingRequest)> {
        let snapshot = self.datasets.get_snapshot(&job.snapshot_id)?;

        let sets = split_sets(
            &snapshot.data,
            &job.options,
            self.lowlevel.as_ref(),
            &mut rand::rng(),
        )?;
        self.jobs.add_sets_to_job(&job.id, &sets)?;

        let project = EvalProject::create(&self.settings.dataset_dir, &job.id)?;
        info!("Generating filelist.yaml and copying low-level data for evaluation...");
        let files = project.dump_lowlevel(sets.train.keys(), self.lowlevel.as_ref())?;
        let filelist_path = project.write_filelist(&files)?;

        info!("Generating groundtruth.yaml...");
        let groundtruth_path = project.write_groundtruth(&snapshot.data.name, &sets.train)?;

        let request = TrainingRequest {
            project_dir: project.path().to_path_buf(),
            groundtruth_path,
            filelist_path,
            c_values: job.options.c_values.clone(),
            gamma_values: job.options.gamma_values.clone(),
            preprocessing_values: job.options.preprocessing_values.clone(),
        };
        Ok((project, request))
    }
}

fn result_json(outcome: &TrainingOutcome, history_path: Option<&Path>) -> Value {
    let mut result = json!({
        "accuracy": outcome.accuracy,
        "parameters": outcome.parameters,
        "confusion_matrix": outcome.confusion_matrix,
    });
    if let (Some(path), Some(object)) = (history_path, result.as_object_mut()) {
        object.insert(
            "history_path".to_string(),
            Value::String(path.to_string_lossy().to_string()),
        );
    }
    result
}
