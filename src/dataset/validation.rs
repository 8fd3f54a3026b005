//! Structural checks applied to dataset input before anything is written.

use super::error::DatasetError;
use super::models::{ClassInput, DatasetInput};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

pub const MIN_NAME_LENGTH: usize = 1;
pub const MAX_NAME_LENGTH: usize = 100;

lazy_static! {
    static ref MBID_RE: Regex = Regex::new(
        r"^[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}$"
    )
    .expect("static MBID regex is valid");
}

pub fn is_valid_mbid(mbid: &str) -> bool {
    MBID_RE.is_match(mbid)
}

/// Canonical form under which a recording MBID is stored and compared.
pub fn normalize_mbid(mbid: &str) -> String {
    mbid.to_ascii_lowercase()
}

pub fn validate_name(what: &str, name: &str) -> Result<(), DatasetError> {
    let length = name.chars().count();
    if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&length) {
        return Err(DatasetError::Validation(format!(
            "{} name must be between {} and {} characters long.",
            what, MIN_NAME_LENGTH, MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_recordings(recordings: &[String]) -> Result<(), DatasetError> {
    match recordings.iter().find(|r| !is_valid_mbid(r)) {
        Some(bad) => Err(DatasetError::Validation(format!(
            "\"{}\" is not a valid recording MBID.",
            bad
        ))),
        None => Ok(()),
    }
}

pub fn validate_class(class: &ClassInput) -> Result<(), DatasetError> {
    validate_name("Class", &class.name)?;
    validate_recordings(&class.recordings)
}

pub fn validate_dataset(dataset: &DatasetInput) -> Result<(), DatasetError> {
    validate_name("Dataset", &dataset.name)?;
    let mut names = HashSet::new();
    for class in &dataset.classes {
        validate_class(class)?;
        if !names.insert(class.name.as_str()) {
            return Err(DatasetError::Validation(format!(
                "Class names must be unique within a dataset: \"{}\" appears more than once.",
                class.name
            )));
        }
    }
    Ok(())
}

/// Lower-case, ASCII-only, underscore separated form of a name, as expected
/// by the trainer for the groundtruth class name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_separator = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == '_' || c == '-' || c.is_whitespace() {
            pending_separator = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mbid_format() {
        assert!(is_valid_mbid("0dad432b-16cc-4bf0-8961-fd31d124b01b"));
        assert!(is_valid_mbid("0DAD432B-16CC-4BF0-8961-FD31D124B01B"));
        assert!(!is_valid_mbid("0dad432b16cc4bf08961fd31d124b01b"));
        assert!(!is_valid_mbid("0dad432b-16cc-4bf0-8961-fd31d124b01"));
        assert!(!is_valid_mbid(" 0dad432b-16cc-4bf0-8961-fd31d124b01b"));
    }

    #[test]
    fn test_name_length_bounds() {
        assert!(validate_name("Dataset", "").is_err());
        assert!(validate_name("Dataset", &"x".repeat(100)).is_ok());
        assert!(validate_name("Dataset", &"x".repeat(101)).is_err());
    }

    #[test]
    fn test_duplicate_class_names_rejected() {
        let input = DatasetInput {
            name: "ds".to_string(),
            classes: vec![
                ClassInput {
                    name: "a".to_string(),
                    ..Default::default()
                },
                ClassInput {
                    name: "a".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let err = validate_dataset(&input).unwrap_err().to_string();
        assert!(err.contains("unique"));
    }

    #[test]
    fn test_invalid_recording_rejected() {
        let input = DatasetInput {
            name: "ds".to_string(),
            classes: vec![ClassInput {
                name: "a".to_string(),
                recordings: vec!["not-an-mbid".to_string()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let err = validate_dataset(&input).unwrap_err().to_string();
        assert!(err.contains("not-an-mbid"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Happy vs Sad"), "happy_vs_sad");
        assert_eq!(slugify("  Genre: Rock/Pop!  "), "genre_rockpop");
        assert_eq!(slugify("mood-electronic__2"), "mood_electronic_2");
    }
}
