//! Completeness checks a dataset must pass before it can be evaluated.

use super::error::EvalError;
use crate::dataset::SnapshotData;
use crate::lowlevel::LowLevelStore;
use std::collections::HashSet;

pub const MIN_CLASSES: usize = 2;
pub const MIN_RECORDINGS_PER_CLASS: usize = 2;

/// Check class and recording counts, then that every recording has
/// low-level data on file.
pub fn validate_complete(
    dataset: &SnapshotData,
    lowlevel: &dyn LowLevelStore,
) -> Result<(), EvalError> {
    check_structure(dataset)?;

    let mut checked = HashSet::new();
    for recording in dataset.classes.iter().flat_map(|c| c.recordings.iter()) {
        if !checked.insert(recording.as_str()) {
            continue;
        }
        if lowlevel.count_lowlevel(recording)? == 0 {
            return Err(EvalError::IncompleteDataset(format!(
                "Can't find low-level data for recording: {}",
                recording
            )));
        }
    }
    Ok(())
}

fn check_structure(dataset: &SnapshotData) -> Result<(), EvalError> {
    if dataset.classes.len() < MIN_CLASSES {
        return Err(EvalError::IncompleteDataset(format!(
            "Dataset needs to have at least {} classes.",
            MIN_CLASSES
        )));
    }
    for class in &dataset.classes {
        if class.recordings.len() < MIN_RECORDINGS_PER_CLASS {
            return Err(EvalError::IncompleteDataset(format!(
                "There are not enough recordings in a class ({}). At least {} are required in each class.",
                class.name, MIN_RECORDINGS_PER_CLASS
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SnapshotClass;
    use anyhow::Result;
    use serde_json::Value;
    use std::sync::Mutex;

    /// Reports data for every recording except the listed ones.
    struct FakeLowLevel {
        missing: Vec<&'static str>,
        lookups: Mutex<Vec<String>>,
    }

    impl LowLevelStore for FakeLowLevel {
        fn count_lowlevel(&self, mbid: &str) -> Result<i64> {
            self.lookups.lock().unwrap().push(mbid.to_string());
            Ok(if self.missing.iter().any(|m| *m == mbid) { 0 } else { 1 })
        }
        fn load_low_level(&self, _mbid: &str, _offset: i64) -> Result<Option<Value>> {
            Ok(None)
        }
        fn submit_low_level(&self, _mbid: &str, _data: &Value) -> Result<i64> {
            Ok(0)
        }
        fn artist_for_recording(&self, _mbid: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn fake(missing: Vec<&'static str>) -> FakeLowLevel {
        FakeLowLevel {
            missing,
            lookups: Mutex::new(Vec::new()),
        }
    }

    fn dataset(classes: &[(&str, &[&str])]) -> SnapshotData {
        SnapshotData {
            name: "ds".to_string(),
            description: String::new(),
            classes: classes
                .iter()
                .map(|(name, recordings)| SnapshotClass {
                    name: name.to_string(),
                    description: String::new(),
                    recordings: recordings.iter().map(|r| r.to_string()).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_class_is_incomplete() {
        let err = validate_complete(&dataset(&[("a", &["r1", "r2"])]), &fake(vec![])).unwrap_err();
        assert!(matches!(err, EvalError::IncompleteDataset(_)));
        assert!(err.to_string().contains("at least 2 classes"));
    }

    #[test]
    fn test_small_class_is_named() {
        let err = validate_complete(
            &dataset(&[("a", &["r1", "r2"]), ("tiny", &["r3"])]),
            &fake(vec![]),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "There are not enough recordings in a class (tiny). At least 2 are required in each class."
        );
    }

    #[test]
    fn test_missing_lowlevel_is_named() {
        let err = validate_complete(
            &dataset(&[("a", &["r1", "r2"]), ("b", &["r3", "r4"])]),
            &fake(vec!["r3"]),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Can't find low-level data for recording: r3");
    }

    #[test]
    fn test_complete_dataset_checks_each_recording_once() {
        let lowlevel = fake(vec![]);
        validate_complete(
            &dataset(&[("a", &["r1", "r2"]), ("b", &["r2", "r3"])]),
            &lowlevel,
        )
        .unwrap();
        assert_eq!(*lowlevel.lookups.lock().unwrap(), vec!["r1", "r2", "r3"]);
    }
}
