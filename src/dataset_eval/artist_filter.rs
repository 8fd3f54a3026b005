//! Train/test split of a snapshot before training.
//!
//! Without options every recording goes to the train set. The artist filter
//! keeps a single recording per artist and class in the train set and moves
//! the others to the test set. Normalization cuts every class in the train
//! set to the same size.

use super::models::{ClassMapping, EvalSets, FilterType, JobOptions};
use crate::dataset::SnapshotData;
use crate::lowlevel::LowLevelStore;
use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::info;

/// Number of recordings kept per class when normalizing.
pub const NORMALIZED_CLASS_SIZE: usize = 450;

/// Recording to class mapping. A recording listed in several classes ends up
/// in the last one.
pub fn class_mapping(snapshot: &SnapshotData) -> ClassMapping {
    let mut mapping = ClassMapping::new();
    for class in &snapshot.classes {
        for recording in &class.recordings {
            mapping.insert(recording.clone(), class.name.clone());
        }
    }
    mapping
}

pub fn split_sets<R: Rng + ?Sized>(
    snapshot: &SnapshotData,
    options: &JobOptions,
    lowlevel: &dyn LowLevelStore,
    rng: &mut R,
) -> Result<EvalSets> {
    let mapping = class_mapping(snapshot);

    let (mut train, mut test) = match options.filter_type {
        Some(FilterType::Artist) => {
            info!("Filtering by artist");
            let mut artists = HashMap::new();
            for recording in mapping.keys() {
                if let Some(artist) = lowlevel.artist_for_recording(recording)? {
                    artists.insert(recording.clone(), artist);
                }
            }
            split_by_artist(&mapping, &artists, &mut *rng)
        }
        None => (mapping, ClassMapping::new()),
    };

    if options.normalize {
        info!("Normalising classes to {} recordings", NORMALIZED_CLASS_SIZE);
        let (normalized, remaining) = normalize(&train, NORMALIZED_CLASS_SIZE, &mut *rng);
        train = normalized;
        test.extend(remaining);
    }

    Ok(EvalSets { train, test })
}

/// Walk the recordings in random order. The first recording of an artist in
/// a class goes to train, later ones go to test. Recordings without a known
/// artist are left out.
fn split_by_artist<R: Rng + ?Sized>(
    mapping: &ClassMapping,
    artists: &HashMap<String, String>,
    rng: &mut R,
) -> (ClassMapping, ClassMapping) {
    let mut recordings: Vec<&String> = mapping.keys().collect();
    recordings.shuffle(rng);

    let mut seen: HashMap<&str, HashSet<&str>> = HashMap::new();
    let mut train = ClassMapping::new();
    let mut test = ClassMapping::new();
    for recording in recordings {
        let class = &mapping[recording];
        let Some(artist) = artists.get(recording) else {
            continue;
        };
        let target = if seen
            .entry(class.as_str())
            .or_default()
            .insert(artist.as_str())
        {
            &mut train
        } else {
            &mut test
        };
        target.insert(recording.clone(), class.clone());
    }
    (train, test)
}

/// Cut every class to `cut_to` randomly chosen recordings. Classes with
/// `cut_to` or fewer recordings are dropped. Returns the kept mapping and
/// the recordings that were cut off.
fn normalize<R: Rng + ?Sized>(
    mapping: &ClassMapping,
    cut_to: usize,
    rng: &mut R,
) -> (ClassMapping, ClassMapping) {
    let mut by_class: BTreeMap<&str, Vec<&String>> = BTreeMap::new();
    for (recording, class) in mapping {
        by_class.entry(class.as_str()).or_default().push(recording);
    }

    let mut kept = ClassMapping::new();
    let mut remaining = ClassMapping::new();
    for (class, mut recordings) in by_class {
        if recordings.len() <= cut_to {
            continue;
        }
        recordings.shuffle(&mut *rng);
        let (sample, rest) = recordings.split_at(cut_to);
        kept.extend(sample.iter().map(|r| ((*r).clone(), class.to_string())));
        remaining.extend(rest.iter().map(|r| ((*r).clone(), class.to_string())));
    }
    (kept, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SnapshotClass;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::Value;

    struct ArtistLookup(HashMap<String, String>);

    impl LowLevelStore for ArtistLookup {
        fn count_lowlevel(&self, _mbid: &str) -> Result<i64> {
            Ok(1)
        }
        fn load_low_level(&self, _mbid: &str, _offset: i64) -> Result<Option<Value>> {
            Ok(None)
        }
        fn submit_low_level(&self, _mbid: &str, _data: &Value) -> Result<i64> {
            Ok(0)
        }
        fn artist_for_recording(&self, mbid: &str) -> Result<Option<String>> {
            Ok(self.0.get(mbid).cloned())
        }
    }

    fn snapshot(classes: Vec<(&str, Vec<String>)>) -> SnapshotData {
        SnapshotData {
            name: "ds".to_string(),
            description: String::new(),
            classes: classes
                .into_iter()
                .map(|(name, recordings)| SnapshotClass {
                    name: name.to_string(),
                    description: String::new(),
                    recordings,
                })
                .collect(),
        }
    }

    fn names(prefix: &str, count: usize) -> Vec<String> {
        (0..count).map(|i| format!("{}{}", prefix, i)).collect()
    }

    #[test]
    fn test_no_options_trains_on_everything() {
        let data = snapshot(vec![("a", names("a", 3)), ("b", names("b", 2))]);
        let sets = split_sets(
            &data,
            &JobOptions::default(),
            &ArtistLookup(HashMap::new()),
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert_eq!(sets.train.len(), 5);
        assert!(sets.test.is_empty());
        assert_eq!(sets.train["a2"], "a");
    }

    #[test]
    fn test_artist_filter_keeps_one_recording_per_artist_and_class() {
        let data = snapshot(vec![
            ("a", vec!["r1".into(), "r2".into(), "r3".into()]),
            ("b", vec!["r4".into(), "r5".into(), "r6".into()]),
        ]);
        let artists: HashMap<String, String> = [
            ("r1", "x"),
            ("r2", "x"),
            ("r3", "y"),
            ("r4", "x"),
            ("r5", "x"),
        ]
        .into_iter()
        .map(|(r, a)| (r.to_string(), a.to_string()))
        .collect();

        let options = JobOptions {
            filter_type: Some(FilterType::Artist),
            ..Default::default()
        };
        for seed in 0..10 {
            let sets = split_sets(
                &data,
                &options,
                &ArtistLookup(artists.clone()),
                &mut StdRng::seed_from_u64(seed),
            )
            .unwrap();

            // one of r1/r2 plus r3 in class a, one of r4/r5 in class b
            assert_eq!(sets.train.len(), 3);
            assert_eq!(sets.test.len(), 2);
            assert!(sets.train.contains_key("r3"));
            assert!(sets.train.contains_key("r1") ^ sets.train.contains_key("r2"));
            assert!(sets.train.contains_key("r4") ^ sets.train.contains_key("r5"));
            // r6 has no known artist
            assert!(!sets.train.contains_key("r6") && !sets.test.contains_key("r6"));
        }
    }

    #[test]
    fn test_normalize_cuts_large_classes_and_drops_small_ones() {
        let data = snapshot(vec![
            ("big", names("big", NORMALIZED_CLASS_SIZE + 30)),
            ("small", names("small", 10)),
        ]);
        let options = JobOptions {
            normalize: true,
            ..Default::default()
        };
        let sets = split_sets(
            &data,
            &options,
            &ArtistLookup(HashMap::new()),
            &mut StdRng::seed_from_u64(7),
        )
        .unwrap();

        assert_eq!(sets.train.len(), NORMALIZED_CLASS_SIZE);
        assert!(sets.train.values().all(|c| c == "big"));
        assert_eq!(sets.test.len(), 30);
        assert!(sets.train.keys().all(|r| !sets.test.contains_key(r)));
    }
}
