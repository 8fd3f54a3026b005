//! Working directory handed to the trainer.
//!
//! ```text
//! <dataset_dir>/<job_id>-XXXXXX/
//!     groundtruth.yaml
//!     filelist.yaml
//!     temp/<mbid>.yaml
//! ```
//!
//! The directory is removed when the [`EvalProject`] is dropped.

use crate::dataset::slugify;
use crate::dataset_eval::ClassMapping;
use crate::lowlevel::{clean_for_export, LowLevelStore};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

const GROUNDTRUTH_FILE: &str = "groundtruth.yaml";
const FILELIST_FILE: &str = "filelist.yaml";
const LOWLEVEL_DIR: &str = "temp";

#[derive(Debug, Serialize)]
struct GroundTruth<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    version: f64,
    #[serde(rename = "className")]
    class_name: String,
    #[serde(rename = "groundTruth")]
    ground_truth: &'a ClassMapping,
}

pub struct EvalProject {
    dir: TempDir,
}

impl EvalProject {
    pub fn create(dataset_dir: &Path, job_id: &Uuid) -> Result<Self> {
        fs::create_dir_all(dataset_dir)
            .with_context(|| format!("Failed to create dataset directory {:?}", dataset_dir))?;
        // The trainer is given absolute paths
        let dataset_dir = dataset_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {:?}", dataset_dir))?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(&dataset_dir)
            .context("Failed to create project directory")?;
        fs::create_dir(dir.path().join(LOWLEVEL_DIR))?;
        debug!("Created project directory {:?}", dir.path());
        Ok(EvalProject { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn groundtruth_path(&self) -> PathBuf {
        self.path().join(GROUNDTRUTH_FILE)
    }

    pub fn filelist_path(&self) -> PathBuf {
        self.path().join(FILELIST_FILE)
    }

    /// Write the first low-level submission of each recording as
    /// `temp/<mbid>.yaml` and return the written paths by MBID.
    pub fn dump_lowlevel<'a>(
        &self,
        recordings: impl IntoIterator<Item = &'a String>,
        lowlevel: &dyn LowLevelStore,
    ) -> Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        for mbid in recordings {
            if files.contains_key(mbid) {
                continue;
            }
            let mut data = lowlevel
                .load_low_level(mbid, 0)?
                .ok_or_else(|| anyhow!("Can't find low-level data for recording: {}", mbid))?;
            clean_for_export(&mut data);

            let path = self.path().join(LOWLEVEL_DIR).join(format!("{}.yaml", mbid));
            write_yaml(&path, &data)?;
            files.insert(mbid.clone(), path);
        }
        debug!("Dumped {} low-level files", files.len());
        Ok(files)
    }

    pub fn write_filelist(&self, files: &BTreeMap<String, PathBuf>) -> Result<PathBuf> {
        let path = self.filelist_path();
        write_yaml(&path, files)?;
        Ok(path)
    }

    pub fn write_groundtruth(&self, dataset_name: &str, train: &ClassMapping) -> Result<PathBuf> {
        let path = self.groundtruth_path();
        let groundtruth = GroundTruth {
            kind: "unknown",
            version: 1.0,
            class_name: slugify(dataset_name),
            ground_truth: train,
        };
        write_yaml(&path, &groundtruth)?;
        Ok(path)
    }
}

fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(value)?;
    fs::write(path, yaml).with_context(|| format!("Failed to write {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lowlevel::SqliteLowLevelStore;
    use crate::sqlite_persistence::Database;
    use serde_json::json;

    const MBID_A: &str = "0dad432b-16cc-4bf0-8961-fd31d124b01b";
    const MBID_B: &str = "19e698e7-71df-48a9-930e-d4b1a2026c82";

    fn lowlevel_with(mbids: &[&str]) -> SqliteLowLevelStore {
        let store = SqliteLowLevelStore::new(Database::in_memory().unwrap());
        for mbid in mbids {
            store
                .submit_low_level(
                    mbid,
                    &json!({
                        "metadata": {
                            "tags": {"musicbrainz_artistid": ["x"]},
                            "audio_properties": {"sample_rate": 44100, "length": 3.5}
                        },
                        "rhythm": {"bpm": 120}
                    }),
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn test_project_dir_is_named_after_job_and_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let job_id = Uuid::new_v4();
        let project = EvalProject::create(&root.path().join("datasets"), &job_id).unwrap();
        let path = project.path().to_path_buf();

        assert!(path.is_absolute());
        assert!(path.join("temp").is_dir());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(&format!("{}-", job_id)));

        drop(project);
        assert!(!path.exists());
    }

    #[test]
    fn test_dump_lowlevel_writes_cleaned_yaml() {
        let root = TempDir::new().unwrap();
        let project = EvalProject::create(root.path(), &Uuid::new_v4()).unwrap();
        let recordings = vec![MBID_A.to_string(), MBID_B.to_string(), MBID_A.to_string()];

        let files = project
            .dump_lowlevel(&recordings, &lowlevel_with(&[MBID_A, MBID_B]))
            .unwrap();
        assert_eq!(files.len(), 2);

        let written: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(&files[MBID_A]).unwrap()).unwrap();
        assert!(written["metadata"].get("tags").is_none());
        assert!(written["metadata"]["audio_properties"]
            .get("sample_rate")
            .is_none());
        assert_eq!(written["rhythm"]["bpm"], serde_yaml::Value::from(120));
    }

    #[test]
    fn test_dump_lowlevel_missing_recording() {
        let root = TempDir::new().unwrap();
        let project = EvalProject::create(root.path(), &Uuid::new_v4()).unwrap();
        let recordings = vec![MBID_A.to_string(), MBID_B.to_string()];

        let err = project
            .dump_lowlevel(&recordings, &lowlevel_with(&[MBID_A]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Can't find low-level data for recording: {}", MBID_B)
        );
    }

    #[test]
    fn test_groundtruth_and_filelist() {
        let root = TempDir::new().unwrap();
        let project = EvalProject::create(root.path(), &Uuid::new_v4()).unwrap();
        let train: ClassMapping = [
            (MBID_A.to_string(), "Happy".to_string()),
            (MBID_B.to_string(), "Sad".to_string()),
        ]
        .into();

        let path = project.write_groundtruth("Mood Dataset", &train).unwrap();
        let groundtruth: serde_yaml::Value =
            serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(groundtruth["type"], serde_yaml::Value::from("unknown"));
        assert_eq!(groundtruth["version"], serde_yaml::Value::from(1.0));
        assert_eq!(
            groundtruth["className"],
            serde_yaml::Value::from("mood_dataset")
        );
        assert_eq!(
            groundtruth["groundTruth"][MBID_B],
            serde_yaml::Value::from("Sad")
        );

        let files: BTreeMap<String, PathBuf> =
            [(MBID_A.to_string(), project.path().join("temp/a.yaml"))].into();
        let path = project.write_filelist(&files).unwrap();
        let filelist: BTreeMap<String, PathBuf> =
            serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(filelist, files);
    }
}
