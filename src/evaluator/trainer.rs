//! External model trainer.
//!
//! The trainer receives the project directory, the groundtruth file and the
//! filelist, trains a classifier and reports the best model it found.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Number, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("Failed to start trainer: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Trainer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("Invalid trainer output: {0}")]
    InvalidOutput(String),

    #[error("Trainer timed out after {0} seconds")]
    TimedOut(u64),
}

/// Everything the trainer needs for one job.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub project_dir: PathBuf,
    pub groundtruth_path: PathBuf,
    pub filelist_path: PathBuf,
    pub c_values: Vec<i64>,
    pub gamma_values: Vec<i64>,
    pub preprocessing_values: Vec<String>,
}

/// The trainer's report on the best model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainingOutcome {
    pub accuracy: Number,
    pub parameters: Value,
    pub confusion_matrix: Value,
    /// Training history written by the trainer, if any.
    #[serde(default)]
    pub history_path: Option<PathBuf>,
}

#[async_trait]
pub trait ModelTrainer: Send + Sync {
    async fn train(&self, request: &TrainingRequest) -> Result<TrainingOutcome, TrainerError>;
}

/// Runs an executable as
/// `<program> <args..> <project_dir> <groundtruth> <filelist>`
/// and reads a JSON [`TrainingOutcome`] from its stdout.
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandTrainer {
    pub fn new(program: String, args: Vec<String>, timeout: Option<Duration>) -> Self {
        CommandTrainer {
            program,
            args,
            timeout,
        }
    }

    /// Split a shell-style command line into program and arguments.
    pub fn from_command_line(command_line: &str, timeout: Option<Duration>) -> Result<Self> {
        let Some(mut parts) = shlex::split(command_line) else {
            bail!("Can't parse trainer command: {}", command_line);
        };
        if parts.is_empty() {
            bail!("Trainer command is empty");
        }
        let program = parts.remove(0);
        Ok(CommandTrainer::new(program, parts, timeout))
    }

    /// Arguments placed after the ones from the command line.
    pub fn append_args(&mut self, args: impl IntoIterator<Item = String>) {
        self.args.extend(args);
    }

    fn command(&self, request: &TrainingRequest) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&request.project_dir)
            .arg(&request.groundtruth_path)
            .arg(&request.filelist_path)
            .env("TRAINER_C_VALUES", join(&request.c_values))
            .env("TRAINER_GAMMA_VALUES", join(&request.gamma_values))
            .env(
                "TRAINER_PREPROCESSING_VALUES",
                request.preprocessing_values.join(","),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

fn join(values: &[i64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The whole of stdout, or failing that its last non-empty line, so that
/// trainers may log progress before printing the result.
fn parse_outcome(stdout: &str) -> Result<TrainingOutcome, TrainerError> {
    if let Ok(outcome) = serde_json::from_str(stdout) {
        return Ok(outcome);
    }
    let last_line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| TrainerError::InvalidOutput("no output".to_string()))?;
    serde_json::from_str(last_line).map_err(|e| TrainerError::InvalidOutput(e.to_string()))
}

#[async_trait]
impl ModelTrainer for CommandTrainer {
    async fn train(&self, request: &TrainingRequest) -> Result<TrainingOutcome, TrainerError> {
        debug!(
            "Running trainer {} for project {:?}",
            self.program, request.project_dir
        );
        let child = self.command(request).output();
        let output = match self.timeout {
            // Dropping the future kills the child
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| TrainerError::TimedOut(limit.as_secs()))??,
            None => child.await?,
        };

        if !output.status.success() {
            return Err(TrainerError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_outcome(&String::from_utf8_lossy(&output.stdout))
    }
}
