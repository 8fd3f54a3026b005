//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{MockTrainer, TestEnv};
//!
//! #[tokio::test]
//! async fn test_evaluate() {
//!     let env = TestEnv::new();
//!     let dataset_id = env.create_complete_dataset("Mood");
//!     let evaluator = env.evaluator(std::sync::Arc::new(MockTrainer::succeeding()));
//! }
//! ```

mod constants;
mod fixtures;
mod trainers;

// Public API - this is what tests import
#[allow(unused_imports)]
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{class, TestEnv};
#[allow(unused_imports)]
pub use trainers::{FailingTrainer, MockTrainer, SeenProject};
