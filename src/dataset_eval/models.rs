//! Data models for dataset evaluation jobs.

use super::error::EvalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Maximum number of entries in each SVM parameter list.
pub const MAX_NUMBER_PARAMETERS: usize = 10;

/// Status of an evaluation job.
///
/// ```text
/// pending -> running -> done
///                    -> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,   // terminal
    Failed, // terminal
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed)
    }

    /// Whether `self -> next` is an edge of the job state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Done)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::from_db_str(s).ok_or_else(|| EvalError::IncorrectJobStatus(s.to_string()))
    }
}

/// Who drives a job. Local jobs are run by the evaluator worker; remote jobs
/// are fetched and run by an external client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalLocation {
    Local,
    Remote,
}

impl EvalLocation {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EvalLocation::Local => "local",
            EvalLocation::Remote => "remote",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "local" => Some(EvalLocation::Local),
            "remote" => Some(EvalLocation::Remote),
            _ => None,
        }
    }
}

impl std::str::FromStr for EvalLocation {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EvalLocation::from_db_str(s).ok_or_else(|| {
            EvalError::Validation(format!(
                "Unknown evaluation location \"{}\": must be one of local, remote",
                s
            ))
        })
    }
}

/// Filters applied when splitting a snapshot into train and test sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    /// At most one recording per artist and class in the train set.
    Artist,
}

impl std::str::FromStr for FilterType {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "artist" => Ok(FilterType::Artist),
            _ => Err(EvalError::Validation(format!(
                "Unknown filter type \"{}\": must be one of artist",
                s
            ))),
        }
    }
}

/// Options stored with a job and handed to the trainer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    pub normalize: bool,
    pub filter_type: Option<FilterType>,
    // SVM grid search parameters; an empty list leaves the trainer's default
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub c_values: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gamma_values: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preprocessing_values: Vec<String>,
}

impl JobOptions {
    pub fn validate(&self) -> Result<(), EvalError> {
        let too_long = [
            ("c_values", self.c_values.len()),
            ("gamma_values", self.gamma_values.len()),
            ("preprocessing_values", self.preprocessing_values.len()),
        ]
        .into_iter()
        .find(|(_, len)| *len > MAX_NUMBER_PARAMETERS);
        match too_long {
            Some((field, _)) => Err(EvalError::Validation(format!(
                "{} cannot have more than {} elements",
                field, MAX_NUMBER_PARAMETERS
            ))),
            None => Ok(()),
        }
    }
}

/// A persisted evaluation job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalJob {
    pub id: Uuid,
    pub snapshot_id: Uuid,
    /// Dataset the snapshot was taken from.
    pub dataset_id: Uuid,
    pub status: JobStatus,
    /// Additional information about the status, e.g. the failure reason.
    pub status_msg: Option<String>,
    pub options: JobOptions,
    pub eval_location: EvalLocation,
    /// Trainer output, set once when the job completes.
    pub result: Option<serde_json::Value>,
    /// Unix timestamp (seconds)
    pub created: i64,
    /// Unix timestamp (seconds)
    pub updated: i64,
}

/// Mapping of recording MBID to class name.
pub type ClassMapping = BTreeMap<String, String>;

/// Train and test split computed for a job before training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalSets {
    pub train: ClassMapping,
    pub test: ClassMapping,
}
