//! Diff computation: grouping annotations into configuration sets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::document::{Annotation, AnnotatorDocument, CURATION_USER};
use crate::error::Result;
use crate::schema::{LayerKind, SchemaRegistry};

use super::configuration::{Configuration, ConfigurationSet};
use super::position::Position;

/// How slot roles participate in position identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    /// The role is part of the slot sub-position; two links to the same
    /// target with different roles occupy different positions.
    #[default]
    RoleAsLabel,
    /// Only the link target identifies the sub-position; role differences
    /// surface as disagreement instead.
    TargetOnly,
}

/// The complete partition of all configuration sets for a document,
/// indexed by position.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffResult {
    /// Active annotators (the curator does not count toward completeness).
    pub annotators: Vec<String>,
    /// Comparison mode the diff was computed under.
    pub mode: ComparisonMode,
    sets: BTreeMap<Position, ConfigurationSet>,
}

impl DiffResult {
    /// All configuration sets, in position order.
    pub fn sets(&self) -> impl Iterator<Item = &ConfigurationSet> {
        self.sets.values()
    }

    /// Look up the configuration set at a position.
    pub fn get(&self, position: &Position) -> Option<&ConfigurationSet> {
        self.sets.get(position)
    }

    /// All positions, in order.
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.sets.keys()
    }

    /// Positions where every annotator contributed exactly one configuration
    /// and all of them agree.
    pub fn agreeing_positions(&self) -> impl Iterator<Item = &Position> {
        self.sets
            .values()
            .filter(|s| s.complete && s.agreeing)
            .map(|s| &s.position)
    }

    /// Complete positions where annotators disagree.
    pub fn differing_positions(&self) -> impl Iterator<Item = &Position> {
        self.sets
            .values()
            .filter(|s| s.complete && !s.agreeing)
            .map(|s| &s.position)
    }

    /// Positions lacking exactly one configuration from some annotator,
    /// stacked positions included.
    pub fn incomplete_positions(&self) -> impl Iterator<Item = &Position> {
        self.sets
            .values()
            .filter(|s| !s.complete)
            .map(|s| &s.position)
    }

    /// Number of configuration sets.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Group every annotation of every supplied document into configuration
/// sets and classify each set.
///
/// `documents` is keyed by annotator; the curator's document (if present)
/// contributes configurations but does not count toward completeness.
/// When `range` is given only positions overlapping that character window
/// are considered.
pub fn compute_diff(
    registry: &SchemaRegistry,
    mode: ComparisonMode,
    documents: &BTreeMap<String, AnnotatorDocument>,
    range: Option<(usize, usize)>,
) -> Result<DiffResult> {
    let annotators: Vec<String> = documents
        .keys()
        .filter(|u| u.as_str() != CURATION_USER)
        .cloned()
        .collect();

    let mut sets: BTreeMap<Position, ConfigurationSet> = BTreeMap::new();
    for (annotator, document) in documents {
        for annotation in document.annotations() {
            for position in positions_of(registry, mode, document, annotation)? {
                if let Some((begin, end)) = range {
                    if !position.overlaps(begin, end) {
                        continue;
                    }
                }
                sets.entry(position.clone())
                    .or_insert_with(|| ConfigurationSet::new(position))
                    .configurations
                    .push(Configuration::new(annotator.clone(), annotation.id));
            }
        }
    }

    for set in sets.values_mut() {
        set.configurations.sort();
        set.stacked = set.compute_stacked();
        set.complete = set.compute_complete(&annotators);
        set.agreeing = compute_agreement(registry, documents, set)?;
    }

    Ok(DiffResult {
        annotators,
        mode,
        sets,
    })
}

/// All positions one annotation occupies: its base position plus one
/// sub-position per slot entry.
fn positions_of(
    registry: &SchemaRegistry,
    mode: ComparisonMode,
    document: &AnnotatorDocument,
    annotation: &Annotation,
) -> Result<Vec<Position>> {
    let Some(layer) = registry.get(&annotation.layer) else {
        warn!(layer = %annotation.layer, "skipping annotation of unregistered layer");
        return Ok(Vec::new());
    };

    let mut positions = Vec::new();
    match layer.kind {
        LayerKind::Span | LayerKind::Chain => {
            let Some((begin, end)) = annotation.span_range() else {
                warn!(layer = %layer.name, address = annotation.id, "span layer holds a non-span annotation");
                return Ok(Vec::new());
            };
            positions.push(Position::span(&layer.name, begin, end));
            for feature in layer.slot_features() {
                for link in annotation.slot_links(&feature.name) {
                    let Some(target_range) =
                        document.get(link.target).and_then(|t| t.span_range())
                    else {
                        warn!(address = link.target, "slot link points at a missing span");
                        continue;
                    };
                    let role = match mode {
                        ComparisonMode::RoleAsLabel => Some(link.role.clone()),
                        ComparisonMode::TargetOnly => None,
                    };
                    positions.push(Position::slot(
                        &layer.name,
                        (begin, end),
                        &feature.name,
                        role,
                        target_range,
                    ));
                }
            }
        }
        LayerKind::Relation => {
            let (source_range, target_range) =
                crate::schema::endpoint_ranges(document, annotation)?;
            positions.push(Position::relation(&layer.name, source_range, target_range));
        }
    }
    Ok(positions)
}

/// Whether all configurations of a set agree under the layer's equivalence
/// rule. Ranges are already equal by construction of the position key, so
/// only comparable features (and, for slot sub-positions under
/// [`ComparisonMode::TargetOnly`], the roles) are consulted.
fn compute_agreement(
    registry: &SchemaRegistry,
    documents: &BTreeMap<String, AnnotatorDocument>,
    set: &ConfigurationSet,
) -> Result<bool> {
    let layer = registry.require(&set.position.layer)?;

    if set.position.is_link() {
        let feature = set.position.link_feature.as_deref().unwrap_or_default();
        let target_range = set.position.link_target;
        // When the role is part of the position key, the representative link
        // must match it too; list order within the host is irrelevant.
        let wanted_role = set.position.link_role.as_ref();
        let mut roles = set.configurations.iter().filter_map(|config| {
            let document = documents.get(&config.annotator)?;
            let host = document.get(config.address)?;
            host.slot_links(feature)
                .iter()
                .find(|l| {
                    document.get(l.target).and_then(|t| t.span_range()) == target_range
                        && wanted_role.map_or(true, |r| *r == l.role)
                })
                .map(|l| l.role.clone())
        });
        let Some(first) = roles.next() else {
            return Ok(false);
        };
        return Ok(roles.all(|r| r == first));
    }

    let mut resolved = set.configurations.iter().filter_map(|c| c.resolve(documents));
    let Some(first) = resolved.next() else {
        return Ok(false);
    };
    Ok(resolved.all(|other| registry.features_equal(layer, first, other)))
}
