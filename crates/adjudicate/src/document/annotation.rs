//! Annotation instances: spans, relations, and slot links.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of an annotation, unique within its owning document.
pub type AnnotationId = u64;

/// A single feature value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FeatureValue {
    /// String form used in diagnostics and closed-tagset checks.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Bool(v) => write!(f, "{}", v),
            FeatureValue::Int(v) => write!(f, "{}", v),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Str(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        FeatureValue::Str(v)
    }
}

impl From<i64> for FeatureValue {
    fn from(v: i64) -> Self {
        FeatureValue::Int(v)
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        FeatureValue::Bool(v)
    }
}

/// One entry of a slot-valued link feature: a role plus the span it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLink {
    pub role: String,
    pub target: AnnotationId,
}

impl SlotLink {
    pub fn new(role: impl Into<String>, target: AnnotationId) -> Self {
        Self {
            role: role.into(),
            target,
        }
    }
}

/// The structural part of an annotation.
///
/// A closed set of variants; the schema registry decides which variant a
/// layer produces, so there is no runtime type lookup by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnnotationBody {
    /// A character range over the document text.
    Span { begin: usize, end: usize },
    /// A directed arc between two span annotations.
    Relation {
        source: AnnotationId,
        target: AnnotationId,
    },
}

/// One concrete annotation within a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Address within the owning document.
    pub id: AnnotationId,
    /// Name of the layer this annotation belongs to.
    pub layer: String,
    /// Span or relation structure.
    pub body: AnnotationBody,
    /// Plain feature values, keyed by feature name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub features: BTreeMap<String, FeatureValue>,
    /// Slot-valued link features, keyed by feature name. Order is meaningful.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub slots: BTreeMap<String, Vec<SlotLink>>,
}

impl Annotation {
    /// The character range, for span annotations.
    pub fn span_range(&self) -> Option<(usize, usize)> {
        match self.body {
            AnnotationBody::Span { begin, end } => Some((begin, end)),
            AnnotationBody::Relation { .. } => None,
        }
    }

    /// The endpoint addresses, for relation annotations.
    pub fn endpoints(&self) -> Option<(AnnotationId, AnnotationId)> {
        match self.body {
            AnnotationBody::Relation { source, target } => Some((source, target)),
            AnnotationBody::Span { .. } => None,
        }
    }

    pub fn is_span(&self) -> bool {
        matches!(self.body, AnnotationBody::Span { .. })
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.body, AnnotationBody::Relation { .. })
    }

    /// Get a feature value by name.
    pub fn feature(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }

    /// The slot list for a link feature, empty if the feature is unset.
    pub fn slot_links(&self, feature: &str) -> &[SlotLink] {
        self.slots.get(feature).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(id: AnnotationId, begin: usize, end: usize) -> Annotation {
        Annotation {
            id,
            layer: "entity".to_string(),
            body: AnnotationBody::Span { begin, end },
            features: BTreeMap::new(),
            slots: BTreeMap::new(),
        }
    }

    #[test]
    fn test_span_range() {
        let ann = span(1, 0, 5);
        assert_eq!(ann.span_range(), Some((0, 5)));
        assert!(ann.is_span());
        assert!(!ann.is_relation());
        assert_eq!(ann.endpoints(), None);
    }

    #[test]
    fn test_feature_value_display() {
        assert_eq!(FeatureValue::from("PER").to_string(), "PER");
        assert_eq!(FeatureValue::Int(3).to_string(), "3");
        assert_eq!(FeatureValue::Bool(true).to_string(), "true");
    }

    #[test]
    fn test_feature_value_untagged_serde() {
        let v: FeatureValue = serde_json::from_str("\"PER\"").unwrap();
        assert_eq!(v, FeatureValue::Str("PER".to_string()));
        let v: FeatureValue = serde_json::from_str("42").unwrap();
        assert_eq!(v, FeatureValue::Int(42));
    }

    #[test]
    fn test_slot_links_default_empty() {
        let ann = span(1, 0, 5);
        assert!(ann.slot_links("arguments").is_empty());
    }
}
