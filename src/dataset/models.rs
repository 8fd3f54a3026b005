//! Data models for datasets, their classes and snapshots.

use super::error::DatasetError;
use crate::dataset_eval::JobStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the user owning a dataset.
pub type UserId = i64;

/// A user-authored dataset as currently stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub public: bool,
    pub author: UserId,
    /// Unix timestamp (seconds)
    pub created: i64,
    /// Unix timestamp (seconds), touched by every mutation
    pub last_edited: i64,
    pub classes: Vec<DatasetClass>,
}

impl Dataset {
    pub fn class(&self, name: &str) -> Option<&DatasetClass> {
        self.classes.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetClass {
    pub id: i64,
    pub name: String,
    pub description: String,
    /// Recording MBIDs, de-duplicated, in insertion order.
    pub recordings: Vec<String>,
}

/// Dataset content as submitted for creation or full replacement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatasetInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub classes: Vec<ClassInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recordings: Vec<String>,
}

/// Recordings to add to (or remove from) a named class.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassRecordings {
    pub class_name: String,
    pub recordings: Vec<String>,
}

/// Rename or re-describe an existing class.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassUpdate {
    pub name: String,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Partial update of the dataset's own fields. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetMetaUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub public: Option<bool>,
}

impl DatasetMetaUpdate {
    pub fn from_json(value: &serde_json::Value) -> Result<Self, DatasetError> {
        serde_json::from_value(value.clone())
            .map_err(|e| DatasetError::Validation(format!("Invalid dataset metadata: {}", e)))
    }
}

/// Immutable point-in-time copy of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub dataset_id: Uuid,
    pub created: i64,
    pub data: SnapshotData,
}

/// The serialized content of a snapshot. `public` is not part of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotData {
    pub name: String,
    pub description: String,
    pub classes: Vec<SnapshotClass>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotClass {
    pub name: String,
    pub description: String,
    pub recordings: Vec<String>,
}

impl From<&Dataset> for SnapshotData {
    fn from(dataset: &Dataset) -> Self {
        SnapshotData {
            name: dataset.name.clone(),
            description: dataset.description.clone(),
            classes: dataset
                .classes
                .iter()
                .map(|c| SnapshotClass {
                    name: c.name.clone(),
                    description: c.description.clone(),
                    recordings: c.recordings.clone(),
                })
                .collect(),
        }
    }
}

impl SnapshotData {
    /// Distinct recordings across all classes, in first-seen order.
    pub fn recordings(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.classes
            .iter()
            .flat_map(|c| c.recordings.iter())
            .filter(|r| seen.insert(r.as_str()))
            .cloned()
            .collect()
    }
}

/// A public dataset together with the status of its latest evaluation job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublicDataset {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub author: UserId,
    pub created: i64,
    pub status: JobStatus,
    pub job_created: i64,
}

/// Status filter accepted by the public dataset listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicStatusFilter {
    All,
    Status(JobStatus),
}

impl std::str::FromStr for PublicStatusFilter {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(PublicStatusFilter::All);
        }
        JobStatus::from_db_str(s)
            .map(PublicStatusFilter::Status)
            .ok_or_else(|| DatasetError::Validation(format!("Unknown job status: {}", s)))
    }
}
