//! Shared constants for end-to-end tests

/// Author of the datasets created by the fixtures
pub const TEST_AUTHOR: i64 = 1;

/// Recordings of the "happy" class
pub const HAPPY_RECORDINGS: [&str; 2] = [
    "0dad432b-16cc-4bf0-8961-fd31d124b01b",
    "19e698e7-71df-48a9-930e-d4b1a2026c82",
];

/// Recordings of the "sad" class
pub const SAD_RECORDINGS: [&str; 2] = [
    "fd528ddb-411c-47bc-a383-1f8a222ed213",
    "e8afe383-1478-497e-90b1-7885c7f37f6e",
];

/// Artist tagged on every recording the fixtures submit
pub const TEST_ARTIST: &str = "a74b1b7f-71a5-4011-9441-d0b5e4122711";

/// Trainer output used by the successful mock trainer
pub const MOCK_RESULT: &str = r#"{"accuracy":1,"parameters":{},"confusion_matrix":{}}"#;
