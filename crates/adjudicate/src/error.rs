//! Error types for the Adjudicate library.

use std::path::PathBuf;
use thiserror::Error;

use crate::document::AnnotationId;

/// Main error type for Adjudicate operations.
#[derive(Debug, Error)]
pub enum AdjudicateError {
    /// The target document already holds an equivalent annotation.
    ///
    /// Not a failure in the usual sense; callers treat it as a skip signal.
    #[error("annotation {address} is already present in the target document")]
    AlreadyMerged { address: AnnotationId },

    /// Ambiguous stacking prevents a safe merge.
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    /// A referenced span or slot target does not yet exist in the target document.
    #[error("unfulfilled prerequisites: {0}")]
    UnfulfilledPrerequisites(String),

    /// A feature value was rejected by the schema (e.g. not in a closed tagset).
    #[error("illegal value for feature '{feature}' on layer '{layer}': {value}")]
    IllegalFeatureValue {
        layer: String,
        feature: String,
        value: String,
    },

    /// The stored document changed under the caller since it was last read.
    #[error(
        "document '{document}' of user '{user}' was modified concurrently \
         (expected version {expected}, found {actual}){detail}"
    )]
    ConcurrentModification {
        document: String,
        user: String,
        expected: u64,
        actual: u64,
        detail: String,
    },

    /// No stored document exists at the given location.
    #[error("no stored document at '{path}'")]
    NotFound { path: PathBuf },

    /// A stored document could not be decoded.
    #[error("corrupt document at '{path}': {message}")]
    Corrupt { path: PathBuf, message: String },

    /// A layer, annotation or feature the operation relies on is missing.
    #[error("schema error: {0}")]
    Schema(String),

    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdjudicateError {
    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AdjudicateError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for the normal "nothing to do" skip signal.
    pub fn is_already_merged(&self) -> bool {
        matches!(self, AdjudicateError::AlreadyMerged { .. })
    }
}

/// Result type alias for Adjudicate operations.
pub type Result<T> = std::result::Result<T, AdjudicateError>;
