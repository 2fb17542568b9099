//! Annotation documents and the instances they contain.

mod annotation;
mod document;

pub use annotation::{Annotation, AnnotationBody, AnnotationId, FeatureValue, SlotLink};
pub use document::{AnnotatorDocument, CURATION_USER};
