//! Adjudicate: an annotation adjudication engine.
//!
//! Several independent annotators mark up the same source text; Adjudicate
//! reconciles their annotation sets into one curated result. A diff pass
//! classifies every position as agreeing, differing or incomplete, a merge
//! engine materializes the curated document from that classification, and a
//! file-backed storage driver persists each document safely under
//! multi-writer access.
//!
//! # Core Principles
//!
//! - **Deterministic**: re-running a merge with the same inputs produces the
//!   same curated content, down to the bytes.
//! - **Never lossy by accident**: anything that cannot be merged safely is
//!   skipped and reported, not dropped silently.
//! - **Crash-safe storage**: a failed write always leaves the previously
//!   stored content intact.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use adjudicate::{
//!     compute_diff, AnnotatorDocument, ComparisonMode, MergeEngine,
//!     SchemaRegistry, CURATION_USER,
//! };
//!
//! # fn example(registry: SchemaRegistry, documents: BTreeMap<String, AnnotatorDocument>) {
//! let diff = compute_diff(&registry, ComparisonMode::RoleAsLabel, &documents, None).unwrap();
//! let mut curated = AnnotatorDocument::new("proj", "doc-1", CURATION_USER, "...");
//! let messages = MergeEngine::new(&registry).remerge(&diff, &documents, &mut curated);
//! for message in &messages {
//!     println!("skipped: {}", message);
//! }
//! # }
//! ```

pub mod diff;
pub mod document;
pub mod error;
pub mod merge;
pub mod schema;
pub mod storage;

pub use diff::{
    annotation_states, compute_diff, AnnotationState, ComparisonMode, Configuration,
    ConfigurationSet, DiffResult, Position,
};
pub use document::{
    Annotation, AnnotationBody, AnnotationId, AnnotatorDocument, FeatureValue, SlotLink,
    CURATION_USER,
};
pub use error::{AdjudicateError, Result};
pub use merge::{BulkTally, MergeConfig, MergeEngine, MergeMessage, MergeOutcome, MergeResult};
pub use schema::{FeatureDef, LayerDef, LayerKind, SchemaRegistry};
pub use storage::{
    AccessLog, CasMetadata, DocumentStorage, StorageObserver, StorageOptions, StoredDocument,
};
