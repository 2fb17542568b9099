//! The per-annotator annotation document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{AdjudicateError, Result};

use super::annotation::{Annotation, AnnotationBody, AnnotationId, FeatureValue, SlotLink};

/// Reserved user name for the curator pseudo-annotator.
pub const CURATION_USER: &str = "CURATION_USER";

/// The complete annotation content one user holds over one source document.
///
/// Exactly one of these exists per (source document, user) pair. The text is
/// immutable; annotation content is mutated through the merge engine or
/// direct edits and persisted through the storage driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorDocument {
    /// Project the source document belongs to.
    pub project: String,
    /// Identifier of the source document within the project.
    pub document_id: String,
    /// Owning annotator (or [`CURATION_USER`]).
    pub user: String,
    /// The source text.
    pub text: String,
    /// Language tag, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// All annotations, keyed by address.
    annotations: BTreeMap<AnnotationId, Annotation>,
    /// Next address to allocate.
    next_id: AnnotationId,
    /// When true, per-mutation trace events are suppressed (bulk operations).
    #[serde(skip)]
    events_silenced: bool,
}

impl AnnotatorDocument {
    /// Create an empty document over the given text.
    pub fn new(
        project: impl Into<String>,
        document_id: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            document_id: document_id.into(),
            user: user.into(),
            text: text.into(),
            language: None,
            annotations: BTreeMap::new(),
            next_id: 1,
            events_silenced: false,
        }
    }

    /// Set the language tag.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Whether this is the curator's document.
    pub fn is_curation(&self) -> bool {
        self.user == CURATION_USER
    }

    /// Suppress or re-enable per-mutation trace events.
    pub fn silence_events(&mut self, silenced: bool) {
        self.events_silenced = silenced;
    }

    fn emit(&self, action: &str, id: AnnotationId, layer: &str) {
        if !self.events_silenced {
            trace!(
                document = %self.document_id,
                user = %self.user,
                %action,
                address = id,
                %layer,
                "annotation change"
            );
        }
    }

    /// Number of annotations in the document.
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Get an annotation by address.
    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(&id)
    }

    /// Get an annotation by address, failing if it is absent.
    pub fn require(&self, id: AnnotationId) -> Result<&Annotation> {
        self.get(id).ok_or_else(|| {
            AdjudicateError::Schema(format!(
                "annotation {} not found in document '{}' of user '{}'",
                id, self.document_id, self.user
            ))
        })
    }

    /// All annotations, in address order.
    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.values()
    }

    /// All annotations of one layer, in address order.
    pub fn annotations_in_layer<'a>(
        &'a self,
        layer: &str,
    ) -> impl Iterator<Item = &'a Annotation> {
        self.annotations.values().filter(move |a| a.layer == layer)
    }

    /// Span annotations of a layer occupying exactly the given range.
    pub fn spans_at(&self, layer: &str, begin: usize, end: usize) -> Vec<&Annotation> {
        self.annotations_in_layer(layer)
            .filter(|a| a.span_range() == Some((begin, end)))
            .collect()
    }

    /// Span annotations of a layer whose range covers the given range.
    pub fn spans_covering(&self, layer: &str, begin: usize, end: usize) -> Vec<&Annotation> {
        self.annotations_in_layer(layer)
            .filter(|a| match a.span_range() {
                Some((b, e)) => b <= begin && end <= e,
                None => false,
            })
            .collect()
    }

    /// Create a span annotation. The range must lie within the text.
    pub fn create_span(
        &mut self,
        layer: impl Into<String>,
        begin: usize,
        end: usize,
    ) -> Result<AnnotationId> {
        if begin > end || end > self.text.len() {
            return Err(AdjudicateError::Schema(format!(
                "span range [{}, {}) outside document text of length {}",
                begin,
                end,
                self.text.len()
            )));
        }
        let layer = layer.into();
        let id = self.allocate();
        self.annotations.insert(
            id,
            Annotation {
                id,
                layer: layer.clone(),
                body: AnnotationBody::Span { begin, end },
                features: BTreeMap::new(),
                slots: BTreeMap::new(),
            },
        );
        self.emit("create", id, &layer);
        Ok(id)
    }

    /// Create a relation annotation. Both endpoints must be existing spans.
    pub fn create_relation(
        &mut self,
        layer: impl Into<String>,
        source: AnnotationId,
        target: AnnotationId,
    ) -> Result<AnnotationId> {
        for endpoint in [source, target] {
            if !self.require(endpoint)?.is_span() {
                return Err(AdjudicateError::Schema(format!(
                    "relation endpoint {} is not a span annotation",
                    endpoint
                )));
            }
        }
        let layer = layer.into();
        let id = self.allocate();
        self.annotations.insert(
            id,
            Annotation {
                id,
                layer: layer.clone(),
                body: AnnotationBody::Relation { source, target },
                features: BTreeMap::new(),
                slots: BTreeMap::new(),
            },
        );
        self.emit("create", id, &layer);
        Ok(id)
    }

    /// Set a plain feature value on an annotation.
    pub fn set_feature(
        &mut self,
        id: AnnotationId,
        feature: impl Into<String>,
        value: FeatureValue,
    ) -> Result<()> {
        let ann = self.annotations.get_mut(&id).ok_or_else(|| {
            AdjudicateError::Schema(format!("annotation {} not found", id))
        })?;
        ann.features.insert(feature.into(), value);
        let layer = ann.layer.clone();
        self.emit("update", id, &layer);
        Ok(())
    }

    /// Remove a plain feature value from an annotation, if set.
    pub fn remove_feature(&mut self, id: AnnotationId, feature: &str) -> Result<()> {
        let ann = self.annotations.get_mut(&id).ok_or_else(|| {
            AdjudicateError::Schema(format!("annotation {} not found", id))
        })?;
        if ann.features.remove(feature).is_some() {
            let layer = ann.layer.clone();
            self.emit("update", id, &layer);
        }
        Ok(())
    }

    /// Append a slot link to a host annotation's slot list for one feature.
    pub fn add_slot_link(
        &mut self,
        host: AnnotationId,
        feature: impl Into<String>,
        link: SlotLink,
    ) -> Result<()> {
        if self.require(link.target)?.is_span() {
            let ann = self.annotations.get_mut(&host).ok_or_else(|| {
                AdjudicateError::Schema(format!("annotation {} not found", host))
            })?;
            ann.slots.entry(feature.into()).or_default().push(link);
            let layer = ann.layer.clone();
            self.emit("update", host, &layer);
            Ok(())
        } else {
            Err(AdjudicateError::Schema(format!(
                "slot target {} is not a span annotation",
                link.target
            )))
        }
    }

    /// Replace the whole slot list of one link feature.
    pub fn set_slot_links(
        &mut self,
        host: AnnotationId,
        feature: impl Into<String>,
        links: Vec<SlotLink>,
    ) -> Result<()> {
        let ann = self.annotations.get_mut(&host).ok_or_else(|| {
            AdjudicateError::Schema(format!("annotation {} not found", host))
        })?;
        ann.slots.insert(feature.into(), links);
        let layer = ann.layer.clone();
        self.emit("update", host, &layer);
        Ok(())
    }

    /// Remove an annotation.
    ///
    /// Removing a span cascades: relations with the span as an endpoint and
    /// slot links pointing at it are removed as well.
    pub fn remove(&mut self, id: AnnotationId) -> bool {
        let Some(removed) = self.annotations.remove(&id) else {
            return false;
        };
        self.emit("delete", id, &removed.layer);
        if removed.is_span() {
            let dangling: Vec<AnnotationId> = self
                .annotations
                .values()
                .filter(|a| matches!(a.endpoints(), Some((s, t)) if s == id || t == id))
                .map(|a| a.id)
                .collect();
            for rel in dangling {
                self.remove(rel);
            }
            for ann in self.annotations.values_mut() {
                for links in ann.slots.values_mut() {
                    links.retain(|l| l.target != id);
                }
            }
        }
        true
    }

    /// Drop all annotation content, keeping text, language and identity.
    pub fn clear_annotations(&mut self) {
        self.annotations.clear();
        self.next_id = 1;
    }

    fn allocate(&mut self) -> AnnotationId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
