//! Per-recording low-level analysis documents.
//!
//! The evaluation core only reads these: it checks that every recording of a
//! dataset has at least one submission, and exports the first submission of
//! each recording for the trainer.

pub(crate) mod schema;
mod store;

pub use store::{LowLevelStore, SqliteLowLevelStore};

use serde_json::Value;

/// Remove descriptors whose layout varies between submissions and would make
/// the trainer reject the merged dataset.
pub fn clean_for_export(data: &mut Value) {
    let Some(metadata) = data.get_mut("metadata").and_then(Value::as_object_mut) else {
        return;
    };
    metadata.remove("tags");
    if let Some(audio) = metadata
        .get_mut("audio_properties")
        .and_then(Value::as_object_mut)
    {
        audio.remove("sample_rate");
        audio.remove("lossless");
    }
}
