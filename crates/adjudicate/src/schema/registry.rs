//! The schema registry: layer lookup, equivalence, and feature copying.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::document::{Annotation, AnnotationId, AnnotatorDocument, FeatureValue};
use crate::error::{AdjudicateError, Result};

use super::layer::{FeatureDef, LayerDef, LayerKind};

/// All layer definitions of one annotation project.
///
/// Registration order is preserved and doubles as the deterministic layer
/// processing order of the merge engine. The registry serializes into stored
/// document files so a file reconstructs without external schema lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    layers: IndexMap<String, LayerDef>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer definition, replacing any previous one of that name.
    pub fn register(&mut self, layer: LayerDef) {
        self.layers.insert(layer.name.clone(), layer);
    }

    /// Register a layer definition, builder style.
    pub fn with_layer(mut self, layer: LayerDef) -> Self {
        self.register(layer);
        self
    }

    /// Look up a layer by name.
    pub fn get(&self, name: &str) -> Option<&LayerDef> {
        self.layers.get(name)
    }

    /// Look up a layer by name, failing if it is not registered.
    pub fn require(&self, name: &str) -> Result<&LayerDef> {
        self.get(name)
            .ok_or_else(|| AdjudicateError::Schema(format!("layer '{}' is not registered", name)))
    }

    /// All layers, in registration order.
    pub fn layers(&self) -> impl Iterator<Item = &LayerDef> {
        self.layers.values()
    }

    /// Check a feature value against the layer's closed tagset, if any.
    pub fn validate_value(
        &self,
        layer: &LayerDef,
        feature: &FeatureDef,
        value: &FeatureValue,
    ) -> Result<()> {
        if let Some(ref admissible) = feature.value_set {
            let ok = value
                .as_str()
                .map(|s| admissible.iter().any(|v| v == s))
                .unwrap_or(false);
            if !ok {
                return Err(AdjudicateError::IllegalFeatureValue {
                    layer: layer.name.clone(),
                    feature: feature.name.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether two annotations of the same layer agree on every comparable
    /// plain feature. Begin/end and slot lists are not consulted here.
    pub fn features_equal(&self, layer: &LayerDef, a: &Annotation, b: &Annotation) -> bool {
        layer
            .comparable_features()
            .all(|f| a.feature(&f.name) == b.feature(&f.name))
    }

    /// Whether two annotations (possibly from different documents) are
    /// equivalent: same layer, same structure, comparable features equal.
    ///
    /// Spans compare by character range; relations compare by the ranges of
    /// their endpoint spans, so equivalence holds across documents whose
    /// addresses differ.
    pub fn equivalent(
        &self,
        doc_a: &AnnotatorDocument,
        a: AnnotationId,
        doc_b: &AnnotatorDocument,
        b: AnnotationId,
    ) -> Result<bool> {
        let ann_a = doc_a.require(a)?;
        let ann_b = doc_b.require(b)?;
        if ann_a.layer != ann_b.layer {
            return Ok(false);
        }
        let layer = self.require(&ann_a.layer)?;
        let structure_matches = match (layer.kind, ann_a.span_range(), ann_b.span_range()) {
            (LayerKind::Span, Some(ra), Some(rb)) => ra == rb,
            (LayerKind::Relation, None, None) => {
                endpoint_ranges(doc_a, ann_a)? == endpoint_ranges(doc_b, ann_b)?
            }
            _ => false,
        };
        Ok(structure_matches && self.features_equal(layer, ann_a, ann_b))
    }

    /// Mirror all comparable plain features of a source annotation onto a
    /// target annotation, validating every value first so a rejected value
    /// never leaves the target half-updated. Values the source leaves unset
    /// are removed from the target, so after the copy the two annotations
    /// are feature-equal.
    pub fn copy_features(
        &self,
        source: &Annotation,
        target_doc: &mut AnnotatorDocument,
        target: AnnotationId,
    ) -> Result<()> {
        let layer = self.require(&source.layer)?;
        let mut pending = Vec::new();
        let mut stale = Vec::new();
        for feature in layer.comparable_features() {
            match source.feature(&feature.name) {
                Some(value) => {
                    self.validate_value(layer, feature, value)?;
                    pending.push((feature.name.clone(), value.clone()));
                }
                None => stale.push(feature.name.clone()),
            }
        }
        for (name, value) in pending {
            target_doc.set_feature(target, name, value)?;
        }
        for name in stale {
            target_doc.remove_feature(target, &name)?;
        }
        Ok(())
    }
}

/// The (source range, target range) pair of a relation's endpoints.
pub(crate) fn endpoint_ranges(
    doc: &AnnotatorDocument,
    relation: &Annotation,
) -> Result<((usize, usize), (usize, usize))> {
    let (source, target) = relation.endpoints().ok_or_else(|| {
        AdjudicateError::Schema(format!("annotation {} is not a relation", relation.id))
    })?;
    let source_range = doc.require(source)?.span_range().ok_or_else(|| {
        AdjudicateError::Schema(format!("relation endpoint {} is not a span", source))
    })?;
    let target_range = doc.require(target)?.span_range().ok_or_else(|| {
        AdjudicateError::Schema(format!("relation endpoint {} is not a span", target))
    })?;
    Ok((source_range, target_range))
}
