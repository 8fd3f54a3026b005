//! Dataset import from CSV files of `<mbid>,<class name>` rows.

use super::error::DatasetError;
use super::models::ClassInput;
use std::io::Read;

/// Group the rows of a headerless CSV into classes, in order of first
/// appearance. Every row must have exactly two fields.
pub fn classes_from_csv<R: Read>(reader: R) -> Result<Vec<ClassInput>, DatasetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut classes: Vec<ClassInput> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| DatasetError::Validation(e.to_string()))?;
        if record.len() != 2 {
            return Err(DatasetError::Validation(
                "Bad dataset! Each row must contain one <MBID, class name> pair.".to_string(),
            ));
        }
        let (mbid, class_name) = (&record[0], &record[1]);
        match classes.iter_mut().find(|c| c.name == class_name) {
            Some(class) => class.recordings.push(mbid.to_string()),
            None => classes.push(ClassInput {
                name: class_name.to_string(),
                description: None,
                recordings: vec![mbid.to_string()],
            }),
        }
    }
    Ok(classes)
}
