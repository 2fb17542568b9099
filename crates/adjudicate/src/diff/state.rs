//! Derived per-annotation classification labels.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::{Annotation, AnnotationId, AnnotatorDocument, CURATION_USER};
use crate::error::Result;
use crate::schema::{LayerKind, SchemaRegistry};

use super::compute::DiffResult;
use super::position::Position;

/// Classification of one annotator's annotation relative to the diff and
/// the curated document. Derived for presentation and bulk actions, never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationState {
    /// All annotators agree at this position.
    Agree,
    /// Annotators disagree and the curator adopted this annotation.
    Use,
    /// Annotators disagree and the curator has not decided yet.
    Disagree,
    /// Annotators disagree and the curator adopted a different annotation.
    DoNotUse,
    /// The layer kind cannot be adjudicated (chains).
    NotSupported,
}

impl AnnotationState {
    /// Get a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            AnnotationState::Agree => "AGREE",
            AnnotationState::Use => "USE",
            AnnotationState::Disagree => "DISAGREE",
            AnnotationState::DoNotUse => "DO_NOT_USE",
            AnnotationState::NotSupported => "NOT_SUPPORTED",
        }
    }
}

/// Derive one state per (annotator, address) from the base (non-slot)
/// positions of a diff. Slot sub-positions never override the state of
/// their host annotation.
pub fn annotation_states(
    diff: &DiffResult,
    registry: &SchemaRegistry,
    documents: &BTreeMap<String, AnnotatorDocument>,
    curated: &AnnotatorDocument,
) -> Result<BTreeMap<(String, AnnotationId), AnnotationState>> {
    let mut states = BTreeMap::new();

    for set in diff.sets() {
        if set.position.is_link() {
            continue;
        }
        let layer = registry.require(&set.position.layer)?;

        for config in &set.configurations {
            if config.annotator == CURATION_USER {
                continue;
            }
            let state = if layer.kind == LayerKind::Chain {
                AnnotationState::NotSupported
            } else if set.complete && set.agreeing {
                AnnotationState::Agree
            } else {
                let adopted = curated_at_position(registry, curated, &set.position)?;
                if adopted.is_empty() {
                    AnnotationState::Disagree
                } else {
                    let own = config.resolve(documents);
                    let used = match own {
                        Some(own) => adopted
                            .iter()
                            .any(|c| registry.features_equal(layer, own, c)),
                        None => false,
                    };
                    if used {
                        AnnotationState::Use
                    } else {
                        AnnotationState::DoNotUse
                    }
                }
            };
            states.insert((config.annotator.clone(), config.address), state);
        }
    }

    Ok(states)
}

/// Annotations of the curated document occupying a base position.
fn curated_at_position<'a>(
    registry: &SchemaRegistry,
    curated: &'a AnnotatorDocument,
    position: &Position,
) -> Result<Vec<&'a Annotation>> {
    let layer = registry.require(&position.layer)?;
    let found = match layer.kind {
        LayerKind::Span | LayerKind::Chain => {
            curated.spans_at(&position.layer, position.begin, position.end)
        }
        LayerKind::Relation => curated
            .annotations_in_layer(&position.layer)
            .filter(|a| {
                crate::schema::endpoint_ranges(curated, a)
                    .map(|(s, t)| {
                        Some(s) == position.source_range && Some(t) == position.target_range
                    })
                    .unwrap_or(false)
            })
            .collect(),
    };
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{compute_diff, ComparisonMode};
    use crate::schema::{FeatureDef, LayerDef};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new().with_layer(
            LayerDef::span("entity").with_feature(FeatureDef::new("value")),
        )
    }

    fn annotated(user: &str, value: &str) -> AnnotatorDocument {
        let mut d = AnnotatorDocument::new("p", "d", user, "0123456789");
        let id = d.create_span("entity", 0, 5).unwrap();
        d.set_feature(id, "value", value.into()).unwrap();
        d
    }

    #[test]
    fn test_agreeing_annotations_are_agree() {
        let documents: BTreeMap<_, _> = [
            ("anna".to_string(), annotated("anna", "PER")),
            ("ben".to_string(), annotated("ben", "PER")),
        ]
        .into();
        let reg = registry();
        let diff = compute_diff(&reg, ComparisonMode::RoleAsLabel, &documents, None).unwrap();
        let curated = AnnotatorDocument::new("p", "d", CURATION_USER, "0123456789");

        let states = annotation_states(&diff, &reg, &documents, &curated).unwrap();
        assert!(states.values().all(|s| *s == AnnotationState::Agree));
        assert_eq!(states.len(), 2);
    }

    #[test]
    fn test_disagreement_tracks_curator_choice() {
        let documents: BTreeMap<_, _> = [
            ("anna".to_string(), annotated("anna", "PER")),
            ("ben".to_string(), annotated("ben", "ORG")),
        ]
        .into();
        let reg = registry();
        let diff = compute_diff(&reg, ComparisonMode::RoleAsLabel, &documents, None).unwrap();

        // Curator undecided: both sides are DISAGREE.
        let empty = AnnotatorDocument::new("p", "d", CURATION_USER, "0123456789");
        let states = annotation_states(&diff, &reg, &documents, &empty).unwrap();
        assert!(states.values().all(|s| *s == AnnotationState::Disagree));

        // Curator adopted anna's label: anna is USE, ben is DO_NOT_USE.
        let curated = annotated(CURATION_USER, "PER");
        let states = annotation_states(&diff, &reg, &documents, &curated).unwrap();
        assert_eq!(
            states.get(&("anna".to_string(), 1)),
            Some(&AnnotationState::Use)
        );
        assert_eq!(
            states.get(&("ben".to_string(), 1)),
            Some(&AnnotationState::DoNotUse)
        );
    }

    #[test]
    fn test_chain_layers_are_not_supported() {
        let reg = SchemaRegistry::new().with_layer(LayerDef::chain("coreference"));
        let mut d = AnnotatorDocument::new("p", "d", "anna", "0123456789");
        d.create_span("coreference", 0, 5).unwrap();
        let documents: BTreeMap<_, _> = [("anna".to_string(), d)].into();
        let diff = compute_diff(&reg, ComparisonMode::RoleAsLabel, &documents, None).unwrap();
        let curated = AnnotatorDocument::new("p", "d", CURATION_USER, "0123456789");

        let states = annotation_states(&diff, &reg, &documents, &curated).unwrap();
        assert_eq!(
            states.get(&("anna".to_string(), 1)),
            Some(&AnnotationState::NotSupported)
        );
    }
}
