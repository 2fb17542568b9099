//! The merge engine: batch re-merge and incremental merge operations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diff::{ComparisonMode, ConfigurationSet, DiffResult, Position};
use crate::document::{
    Annotation, AnnotationId, AnnotatorDocument, SlotLink, CURATION_USER,
};
use crate::error::{AdjudicateError, Result};
use crate::schema::{LayerKind, SchemaRegistry};

/// Policy knobs for batch re-merging.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeConfig {
    /// Merge positions some annotators have not marked, as long as the
    /// present ones agree.
    pub merge_incomplete: bool,
}

impl MergeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable merging of incomplete but agreeing positions.
    pub fn with_merge_incomplete(mut self, yes: bool) -> Self {
        self.merge_incomplete = yes;
        self
    }
}

/// What a single merge operation did to the target document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// A new annotation was created in the target.
    Created,
    /// An existing annotation in the target was updated in place.
    Updated,
}

/// Outcome of one merge operation plus the resulting target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub outcome: MergeOutcome,
    pub address: AnnotationId,
}

/// A per-position diagnostic recorded during a batch re-merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeMessage {
    pub position: Position,
    pub detail: String,
}

impl fmt::Display for MergeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.detail)
    }
}

/// Counts accumulated by [`MergeEngine::accept_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkTally {
    pub created: usize,
    pub updated: usize,
    pub already_merged: usize,
    pub conflicts: usize,
    pub failed: usize,
}

impl BulkTally {
    /// Total number of annotations visited.
    pub fn total(&self) -> usize {
        self.created + self.updated + self.already_merged + self.conflicts + self.failed
    }

    fn record(&mut self, result: &Result<MergeResult>) {
        match result {
            Ok(r) if r.outcome == MergeOutcome::Created => self.created += 1,
            Ok(_) => self.updated += 1,
            Err(AdjudicateError::AlreadyMerged { .. }) => self.already_merged += 1,
            Err(AdjudicateError::MergeConflict(_))
            | Err(AdjudicateError::UnfulfilledPrerequisites(_)) => self.conflicts += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Derives or updates a curated document from annotators' documents.
///
/// The engine holds no locks and mutates only the target document handed to
/// it; callers publish the target after the call returns.
pub struct MergeEngine<'a> {
    registry: &'a SchemaRegistry,
    config: MergeConfig,
}

impl<'a> MergeEngine<'a> {
    /// Create an engine with default policy.
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self::with_config(registry, MergeConfig::default())
    }

    /// Create an engine with an explicit policy.
    pub fn with_config(registry: &'a SchemaRegistry, config: MergeConfig) -> Self {
        Self { registry, config }
    }

    // ------------------------------------------------------------------
    // Batch re-merge
    // ------------------------------------------------------------------

    /// Rebuild the curated target document from scratch.
    ///
    /// Clears all annotation content (text, language and identity are kept),
    /// copies segmentation layers from the first source document carrying
    /// them, then merges span positions, slot sub-positions and finally
    /// relation positions. A position merges iff it is not stacked, is
    /// complete (or the merge-incomplete policy is on) and all its
    /// configurations agree. Every skipped position and every per-position
    /// failure becomes a diagnostic message; nothing aborts the batch.
    ///
    /// Calling this twice with the same inputs yields identical content.
    pub fn remerge(
        &self,
        diff: &DiffResult,
        documents: &BTreeMap<String, AnnotatorDocument>,
        target: &mut AnnotatorDocument,
    ) -> Vec<MergeMessage> {
        let mut messages = Vec::new();
        target.silence_events(true);
        target.clear_annotations();

        self.copy_segmentation(documents, target, &mut messages);

        // Spans first, then slots on the now-existing spans, then relations
        // whose endpoints must already be present.
        self.merge_pass(diff, documents, target, PassKind::Spans, &mut messages);
        self.merge_pass(diff, documents, target, PassKind::Slots, &mut messages);
        self.merge_pass(diff, documents, target, PassKind::Relations, &mut messages);

        target.silence_events(false);
        debug!(
            document = %target.document_id,
            annotations = target.len(),
            diagnostics = messages.len(),
            "re-merge finished"
        );
        messages
    }

    /// Copy token/sentence base layers verbatim from the first (by annotator
    /// name) source document that carries them.
    fn copy_segmentation(
        &self,
        documents: &BTreeMap<String, AnnotatorDocument>,
        target: &mut AnnotatorDocument,
        messages: &mut Vec<MergeMessage>,
    ) {
        for layer in self.registry.layers().filter(|l| l.segmentation) {
            let source = documents
                .iter()
                .filter(|(user, _)| user.as_str() != CURATION_USER)
                .map(|(_, doc)| doc)
                .find(|doc| doc.annotations_in_layer(&layer.name).next().is_some());
            let Some(source) = source else { continue };

            let spans: Vec<Annotation> = source
                .annotations_in_layer(&layer.name)
                .cloned()
                .collect();
            for span in spans {
                let Some((begin, end)) = span.span_range() else { continue };
                let outcome = target
                    .create_span(&layer.name, begin, end)
                    .and_then(|id| self.registry.copy_features(&span, target, id));
                if let Err(e) = outcome {
                    messages.push(MergeMessage {
                        position: Position::span(&layer.name, begin, end),
                        detail: format!("failed to copy segmentation: {}", e),
                    });
                }
            }
        }
    }

    fn merge_pass(
        &self,
        diff: &DiffResult,
        documents: &BTreeMap<String, AnnotatorDocument>,
        target: &mut AnnotatorDocument,
        pass: PassKind,
        messages: &mut Vec<MergeMessage>,
    ) {
        for set in diff.sets() {
            match self.classify_pass(set) {
                PassClass::Merge(kind) if kind == pass => {}
                PassClass::Merge(_) | PassClass::Silent => continue,
                PassClass::Report(detail) => {
                    // Report layer problems once, during the span pass.
                    if pass == PassKind::Spans {
                        messages.push(MergeMessage {
                            position: set.position.clone(),
                            detail,
                        });
                    }
                    continue;
                }
            }

            if let Some(detail) = self.skip_reason(set) {
                messages.push(MergeMessage {
                    position: set.position.clone(),
                    detail,
                });
                continue;
            }

            if let Err(e) = self.merge_position(diff.mode, set, documents, target) {
                if !e.is_already_merged() {
                    messages.push(MergeMessage {
                        position: set.position.clone(),
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    /// Which pass a configuration set belongs to, or why it never merges.
    fn classify_pass(&self, set: &ConfigurationSet) -> PassClass {
        let Some(layer) = self.registry.get(&set.position.layer) else {
            return PassClass::Report(format!(
                "layer '{}' is not registered",
                set.position.layer
            ));
        };
        if layer.segmentation {
            // Copied verbatim before the passes run.
            return PassClass::Silent;
        }
        match layer.kind {
            LayerKind::Chain => PassClass::Report(format!(
                "chain layer '{}' is not supported by adjudication",
                layer.name
            )),
            LayerKind::Span if set.position.is_link() => PassClass::Merge(PassKind::Slots),
            LayerKind::Span => PassClass::Merge(PassKind::Spans),
            LayerKind::Relation => PassClass::Merge(PassKind::Relations),
        }
    }

    /// Why a set must be skipped, if it must.
    fn skip_reason(&self, set: &ConfigurationSet) -> Option<String> {
        if set.stacked {
            return Some("stacked annotations prevent automatic merging".to_string());
        }
        if !set.complete && !self.config.merge_incomplete {
            return Some("not all annotators have marked this position".to_string());
        }
        if !set.agreeing {
            return Some("annotators disagree at this position".to_string());
        }
        None
    }

    /// Merge the representative of one mergeable set into the target.
    fn merge_position(
        &self,
        mode: ComparisonMode,
        set: &ConfigurationSet,
        documents: &BTreeMap<String, AnnotatorDocument>,
        target: &mut AnnotatorDocument,
    ) -> Result<MergeResult> {
        let representative = set.representative().ok_or_else(|| {
            AdjudicateError::Schema(format!("empty configuration set at {}", set.position))
        })?;
        let source_doc = documents.get(&representative.annotator).ok_or_else(|| {
            AdjudicateError::Schema(format!(
                "no document for annotator '{}'",
                representative.annotator
            ))
        })?;

        if let Some(ref feature) = set.position.link_feature {
            let host = source_doc.require(representative.address)?;
            let index = self
                .find_slot_index(mode, &set.position, source_doc, host, feature)
                .ok_or_else(|| {
                    AdjudicateError::Schema(format!(
                        "slot entry vanished from representative at {}",
                        set.position
                    ))
                })?;
            self.merge_slot(target, source_doc, representative.address, feature, index)
        } else if set.position.is_relation() {
            self.merge_relation(target, source_doc, representative.address, false)
        } else {
            self.merge_span(target, source_doc, representative.address, false)
        }
    }

    /// Index of the slot entry a sub-position refers to within its host.
    fn find_slot_index(
        &self,
        mode: ComparisonMode,
        position: &Position,
        source_doc: &AnnotatorDocument,
        host: &Annotation,
        feature: &str,
    ) -> Option<usize> {
        host.slot_links(feature).iter().position(|link| {
            let target_range = source_doc.get(link.target).and_then(|t| t.span_range());
            let target_matches = target_range == position.link_target;
            let role_matches = match mode {
                ComparisonMode::RoleAsLabel => Some(&link.role) == position.link_role.as_ref(),
                ComparisonMode::TargetOnly => true,
            };
            target_matches && role_matches
        })
    }

    // ------------------------------------------------------------------
    // Incremental operations
    // ------------------------------------------------------------------

    /// Merge one span annotation from a source document into the target.
    ///
    /// Fails with [`AdjudicateError::AlreadyMerged`] if an attribute-
    /// equivalent span already occupies the same range. Otherwise creates a
    /// new span (rolling back on a failed feature copy). When exactly one
    /// other span occupies the range and stacking is off, that span is
    /// updated in place.
    pub fn merge_span(
        &self,
        target: &mut AnnotatorDocument,
        source_doc: &AnnotatorDocument,
        source_id: AnnotationId,
        allow_stacking: bool,
    ) -> Result<MergeResult> {
        let source = source_doc.require(source_id)?.clone();
        let layer = self.registry.require(&source.layer)?;
        if layer.kind != LayerKind::Span {
            return Err(AdjudicateError::Schema(format!(
                "merge_span called for {} layer '{}'",
                layer.kind.label(),
                layer.name
            )));
        }
        let (begin, end) = source.span_range().ok_or_else(|| {
            AdjudicateError::Schema(format!("annotation {} is not a span", source_id))
        })?;

        let occupants: Vec<Annotation> = target
            .spans_at(&source.layer, begin, end)
            .into_iter()
            .cloned()
            .collect();
        if let Some(dup) = occupants
            .iter()
            .find(|o| self.registry.features_equal(layer, &source, o))
        {
            return Err(AdjudicateError::AlreadyMerged { address: dup.id });
        }

        if occupants.is_empty() || allow_stacking {
            let id = target.create_span(&source.layer, begin, end)?;
            match self.registry.copy_features(&source, target, id) {
                Ok(()) => Ok(MergeResult {
                    outcome: MergeOutcome::Created,
                    address: id,
                }),
                Err(e) => {
                    // Never leave a partially copied annotation behind.
                    target.remove(id);
                    Err(e)
                }
            }
        } else if occupants.len() == 1 {
            let id = occupants[0].id;
            self.registry.copy_features(&source, target, id)?;
            Ok(MergeResult {
                outcome: MergeOutcome::Updated,
                address: id,
            })
        } else {
            Err(AdjudicateError::MergeConflict(format!(
                "multiple '{}' spans already occupy [{}, {})",
                source.layer, begin, end
            )))
        }
    }

    /// Merge one relation annotation from a source document into the target.
    ///
    /// Both endpoint spans must already have exactly one equivalent
    /// counterpart in the target. For layers attaching to a base layer, a
    /// covering base span must exist as well.
    pub fn merge_relation(
        &self,
        target: &mut AnnotatorDocument,
        source_doc: &AnnotatorDocument,
        source_id: AnnotationId,
        allow_stacking: bool,
    ) -> Result<MergeResult> {
        let source = source_doc.require(source_id)?.clone();
        let layer = self.registry.require(&source.layer)?.clone();
        if layer.kind != LayerKind::Relation {
            return Err(AdjudicateError::Schema(format!(
                "merge_relation called for {} layer '{}'",
                layer.kind.label(),
                layer.name
            )));
        }
        let (ep_source, ep_target) = source.endpoints().ok_or_else(|| {
            AdjudicateError::Schema(format!("annotation {} is not a relation", source_id))
        })?;

        let resolved_source = self.resolve_endpoint(target, source_doc, ep_source)?;
        let resolved_target = self.resolve_endpoint(target, source_doc, ep_target)?;

        if let Some(ref base) = layer.attach_to {
            for endpoint in [resolved_source, resolved_target] {
                let (begin, end) = target
                    .require(endpoint)?
                    .span_range()
                    .unwrap_or((0, 0));
                if target.spans_covering(base, begin, end).is_empty() {
                    return Err(AdjudicateError::UnfulfilledPrerequisites(format!(
                        "no covering '{}' span for relation endpoint [{}, {})",
                        base, begin, end
                    )));
                }
            }
        }

        let existing: Vec<Annotation> = target
            .annotations_in_layer(&source.layer)
            .filter(|a| a.endpoints() == Some((resolved_source, resolved_target)))
            .cloned()
            .collect();
        if let Some(dup) = existing
            .iter()
            .find(|e| self.registry.features_equal(&layer, &source, e))
        {
            return Err(AdjudicateError::AlreadyMerged { address: dup.id });
        }

        if existing.is_empty() || allow_stacking {
            let id = target.create_relation(&source.layer, resolved_source, resolved_target)?;
            match self.registry.copy_features(&source, target, id) {
                Ok(()) => Ok(MergeResult {
                    outcome: MergeOutcome::Created,
                    address: id,
                }),
                Err(e) => {
                    target.remove(id);
                    Err(e)
                }
            }
        } else if existing.len() == 1 {
            let id = existing[0].id;
            self.registry.copy_features(&source, target, id)?;
            Ok(MergeResult {
                outcome: MergeOutcome::Updated,
                address: id,
            })
        } else {
            Err(AdjudicateError::MergeConflict(format!(
                "multiple '{}' relations already connect the resolved endpoints",
                source.layer
            )))
        }
    }

    /// Merge one slot entry of a link feature into the target.
    ///
    /// The host span must resolve to exactly one counterpart in the target
    /// and the slot's target span to exactly one equivalent span. The
    /// (role, target) pair replaces an existing link to the same resolved
    /// target, so one host never links the same span twice under one
    /// feature.
    pub fn merge_slot(
        &self,
        target: &mut AnnotatorDocument,
        source_doc: &AnnotatorDocument,
        host_id: AnnotationId,
        feature: &str,
        index: usize,
    ) -> Result<MergeResult> {
        let host_source = source_doc.require(host_id)?.clone();
        let layer = self.registry.require(&host_source.layer)?;
        let Some(feature_def) = layer.feature(feature) else {
            return Err(AdjudicateError::Schema(format!(
                "layer '{}' has no feature '{}'",
                layer.name, feature
            )));
        };
        if !feature_def.slot {
            return Err(AdjudicateError::Schema(format!(
                "feature '{}' of layer '{}' is not slot-valued",
                feature, layer.name
            )));
        }
        let link = host_source
            .slot_links(feature)
            .get(index)
            .cloned()
            .ok_or_else(|| {
                AdjudicateError::Schema(format!(
                    "annotation {} has no slot {} under feature '{}'",
                    host_id, index, feature
                ))
            })?;

        let host = match self.equivalent_spans(target, source_doc, host_id)?.as_slice() {
            [] => {
                return Err(AdjudicateError::UnfulfilledPrerequisites(format!(
                    "host span for slot '{}' does not yet exist in the target",
                    feature
                )))
            }
            [host] => *host,
            _ => {
                return Err(AdjudicateError::MergeConflict(format!(
                    "multiple candidate host spans for slot '{}'",
                    feature
                )))
            }
        };

        let candidates = self.equivalent_spans(target, source_doc, link.target)?;
        let resolved_target = match candidates.as_slice() {
            [only] => *only,
            [] => {
                return Err(AdjudicateError::UnfulfilledPrerequisites(
                    "slot target span does not yet exist in the target".to_string(),
                ))
            }
            _ => {
                return Err(AdjudicateError::UnfulfilledPrerequisites(
                    "slot target span is ambiguous in the target".to_string(),
                ))
            }
        };

        let mut links = target.require(host)?.slot_links(feature).to_vec();
        if let Some(existing) = links.iter_mut().find(|l| l.target == resolved_target) {
            existing.role = link.role;
        } else {
            links.push(SlotLink::new(link.role, resolved_target));
        }
        target.set_slot_links(host, feature, links)?;

        Ok(MergeResult {
            outcome: MergeOutcome::Updated,
            address: host,
        })
    }

    /// Merge every annotation of one layer from one annotator's document,
    /// tallying outcomes. A failing instance never aborts the rest.
    pub fn accept_all(
        &self,
        target: &mut AnnotatorDocument,
        source_doc: &AnnotatorDocument,
        layer: &str,
        allow_stacking: bool,
    ) -> BulkTally {
        let mut tally = BulkTally::default();
        let ids: Vec<AnnotationId> = source_doc
            .annotations_in_layer(layer)
            .map(|a| a.id)
            .collect();

        // Spans first so relations of mixed layers find their endpoints.
        for &id in &ids {
            if source_doc.get(id).map(|a| a.is_span()).unwrap_or(false) {
                tally.record(&self.merge_span(target, source_doc, id, allow_stacking));
            }
        }
        for &id in &ids {
            if source_doc.get(id).map(|a| a.is_relation()).unwrap_or(false) {
                tally.record(&self.merge_relation(target, source_doc, id, allow_stacking));
            }
        }
        debug!(%layer, total = tally.total(), created = tally.created, "bulk accept finished");
        tally
    }

    /// Target spans equivalent to a source span (same layer, range and
    /// comparable features).
    fn equivalent_spans(
        &self,
        target: &AnnotatorDocument,
        source_doc: &AnnotatorDocument,
        span_id: AnnotationId,
    ) -> Result<Vec<AnnotationId>> {
        let span = source_doc.require(span_id)?;
        let mut found = Vec::new();
        for candidate in target.annotations_in_layer(&span.layer) {
            if self
                .registry
                .equivalent(source_doc, span_id, target, candidate.id)?
            {
                found.push(candidate.id);
            }
        }
        Ok(found)
    }

    /// Resolve a relation endpoint to its unique counterpart in the target.
    fn resolve_endpoint(
        &self,
        target: &AnnotatorDocument,
        source_doc: &AnnotatorDocument,
        endpoint: AnnotationId,
    ) -> Result<AnnotationId> {
        match self.equivalent_spans(target, source_doc, endpoint)?.as_slice() {
            [only] => Ok(*only),
            [] => Err(AdjudicateError::UnfulfilledPrerequisites(format!(
                "relation endpoint {} has no counterpart in the target",
                endpoint
            ))),
            _ => Err(AdjudicateError::MergeConflict(format!(
                "relation endpoint {} is ambiguous in the target (stacked spans)",
                endpoint
            ))),
        }
    }
}

/// The three merge passes of a batch re-merge, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    Spans,
    Slots,
    Relations,
}

/// How a configuration set participates in the batch passes.
enum PassClass {
    /// Merge during the given pass.
    Merge(PassKind),
    /// Handled outside the passes (segmentation layers).
    Silent,
    /// Never merges; record the reason once.
    Report(String),
}
