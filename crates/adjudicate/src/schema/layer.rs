//! Annotation layer definitions.

use serde::{Deserialize, Serialize};

/// Structural kind of an annotation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Character-range annotations.
    Span,
    /// Arcs between two span annotations.
    Relation,
    /// Coreference-style chains. Recognized but not mergeable.
    Chain,
}

impl LayerKind {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            LayerKind::Span => "span",
            LayerKind::Relation => "relation",
            LayerKind::Chain => "chain",
        }
    }
}

/// Definition of one feature of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDef {
    /// Feature name.
    pub name: String,
    /// Whether the feature participates in equivalence comparison.
    ///
    /// Internal bookkeeping features are simply registered with
    /// `comparable: false`; the merge engine never inspects feature names.
    pub comparable: bool,
    /// Closed set of admissible string values, if the tagset is closed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_set: Option<Vec<String>>,
    /// Whether this is a slot-valued link feature.
    #[serde(default)]
    pub slot: bool,
}

impl FeatureDef {
    /// A comparable plain feature.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparable: true,
            value_set: None,
            slot: false,
        }
    }

    /// A slot-valued link feature.
    pub fn slot(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparable: true,
            value_set: None,
            slot: true,
        }
    }

    /// Restrict the feature to a closed set of values.
    pub fn with_value_set(mut self, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.value_set = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Exclude the feature from equivalence comparison.
    pub fn hidden(mut self) -> Self {
        self.comparable = false;
        self
    }
}

/// Definition of an annotation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDef {
    /// Layer name, unique within a schema.
    pub name: String,
    /// Structural kind.
    pub kind: LayerKind,
    /// Feature definitions.
    #[serde(default)]
    pub features: Vec<FeatureDef>,
    /// True for token/sentence base layers that are copied verbatim during
    /// a batch re-merge instead of being reconciled.
    #[serde(default)]
    pub segmentation: bool,
    /// For relation layers whose endpoints must ride on spans of another
    /// layer (e.g. dependencies attaching to tokens), the base layer name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_to: Option<String>,
}

impl LayerDef {
    /// Create a span layer.
    pub fn span(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Span,
            features: Vec::new(),
            segmentation: false,
            attach_to: None,
        }
    }

    /// Create a relation layer.
    pub fn relation(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Relation,
            features: Vec::new(),
            segmentation: false,
            attach_to: None,
        }
    }

    /// Create a chain layer.
    pub fn chain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::Chain,
            features: Vec::new(),
            segmentation: false,
            attach_to: None,
        }
    }

    /// Add a feature definition.
    pub fn with_feature(mut self, feature: FeatureDef) -> Self {
        self.features.push(feature);
        self
    }

    /// Mark the layer as a segmentation base layer (tokens, sentences).
    pub fn segmentation(mut self) -> Self {
        self.segmentation = true;
        self
    }

    /// Require relation endpoints to be covered by spans of `layer`.
    pub fn attach_to(mut self, layer: impl Into<String>) -> Self {
        self.attach_to = Some(layer.into());
        self
    }

    /// Look up a feature definition by name.
    pub fn feature(&self, name: &str) -> Option<&FeatureDef> {
        self.features.iter().find(|f| f.name == name)
    }

    /// Features that participate in equivalence comparison (slots excluded;
    /// slot agreement is decided per sub-position, not per host).
    pub fn comparable_features(&self) -> impl Iterator<Item = &FeatureDef> {
        self.features.iter().filter(|f| f.comparable && !f.slot)
    }

    /// Slot-valued link features.
    pub fn slot_features(&self) -> impl Iterator<Item = &FeatureDef> {
        self.features.iter().filter(|f| f.slot)
    }
}
