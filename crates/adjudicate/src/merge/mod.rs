//! The merge engine.

mod engine;

pub use engine::{
    BulkTally, MergeConfig, MergeEngine, MergeMessage, MergeOutcome, MergeResult,
};
