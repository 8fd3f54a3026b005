//! Permanent storage for training history files.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// `<storage_dir>/history/<id[0:1]>/<id[0:2]>/<id>.history`
pub fn history_file_path(storage_dir: &Path, job_id: &Uuid) -> PathBuf {
    let id = job_id.to_string();
    storage_dir
        .join("history")
        .join(&id[0..1])
        .join(&id[0..2])
        .join(format!("{}.history", id))
}

/// Copy the history file written by the trainer out of the project
/// directory before it gets removed.
pub fn save_history_file(storage_dir: &Path, history_path: &Path, job_id: &Uuid) -> Result<PathBuf> {
    let destination = history_file_path(storage_dir, job_id);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create history directory {:?}", parent))?;
    }
    fs::copy(history_path, &destination)
        .with_context(|| format!("Failed to copy history file {:?}", history_path))?;
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_history_file_path() {
        let job_id = Uuid::parse_str("3ea5b3f2-8f8c-4e8f-b2a1-7a0f0fb8c2d1").unwrap();
        assert_eq!(
            history_file_path(Path::new("/files"), &job_id),
            PathBuf::from("/files/history/3/3e/3ea5b3f2-8f8c-4e8f-b2a1-7a0f0fb8c2d1.history")
        );
    }

    #[test]
    fn test_save_history_file() {
        let storage = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let source = project.path().join("model.history");
        fs::write(&source, "epoch 1").unwrap();
        let job_id = Uuid::new_v4();

        let saved = save_history_file(storage.path(), &source, &job_id).unwrap();
        assert_eq!(saved, history_file_path(storage.path(), &job_id));
        assert_eq!(fs::read_to_string(saved).unwrap(), "epoch 1");
    }

    #[test]
    fn test_missing_history_file() {
        let storage = TempDir::new().unwrap();
        let result = save_history_file(
            storage.path(),
            &storage.path().join("missing.history"),
            &Uuid::new_v4(),
        );
        assert!(result.is_err());
    }
}
