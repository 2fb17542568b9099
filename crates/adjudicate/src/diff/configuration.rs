//! Configurations: per-annotator occurrences at a position.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::document::{Annotation, AnnotationId, AnnotatorDocument};

use super::position::Position;

/// One annotator's annotation occupying a position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Configuration {
    /// Owning annotator.
    pub annotator: String,
    /// Address of the annotation within that annotator's document.
    pub address: AnnotationId,
}

impl Configuration {
    pub fn new(annotator: impl Into<String>, address: AnnotationId) -> Self {
        Self {
            annotator: annotator.into(),
            address,
        }
    }

    /// Resolve to the representative annotation within the supplied documents.
    pub fn resolve<'a>(
        &self,
        documents: &'a BTreeMap<String, AnnotatorDocument>,
    ) -> Option<&'a Annotation> {
        documents.get(&self.annotator)?.get(self.address)
    }
}

/// All configurations (across annotators, curator included) sharing one
/// position, together with the classification flags computed by the diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationSet {
    pub position: Position,
    /// Ordered by (annotator, address); the first entry is the merge
    /// representative.
    pub configurations: Vec<Configuration>,
    /// More than one configuration from the same annotator.
    pub stacked: bool,
    /// Every active annotator contributed exactly one configuration.
    pub complete: bool,
    /// All configurations agree under the layer's equivalence rule.
    pub agreeing: bool,
}

impl ConfigurationSet {
    /// Create an unclassified set; flags are filled in by `compute_diff`.
    pub fn new(position: Position) -> Self {
        Self {
            position,
            configurations: Vec::new(),
            stacked: false,
            complete: false,
            agreeing: false,
        }
    }

    /// Annotators contributing to this set.
    pub fn annotators(&self) -> BTreeSet<&str> {
        self.configurations
            .iter()
            .map(|c| c.annotator.as_str())
            .collect()
    }

    /// Configurations contributed by one annotator.
    pub fn configurations_of<'a>(
        &'a self,
        annotator: &'a str,
    ) -> impl Iterator<Item = &'a Configuration> {
        self.configurations
            .iter()
            .filter(move |c| c.annotator == annotator)
    }

    /// The deterministic merge representative: the first configuration in
    /// (annotator, address) order.
    pub fn representative(&self) -> Option<&Configuration> {
        self.configurations.first()
    }

    /// Recompute the stacked flag from the configurations.
    pub(crate) fn compute_stacked(&self) -> bool {
        let mut per_annotator: BTreeMap<&str, usize> = BTreeMap::new();
        for config in &self.configurations {
            *per_annotator.entry(config.annotator.as_str()).or_insert(0) += 1;
        }
        per_annotator.values().any(|&n| n > 1)
    }

    /// Recompute the complete flag against the active annotator list.
    pub(crate) fn compute_complete(&self, annotators: &[String]) -> bool {
        annotators
            .iter()
            .all(|a| self.configurations_of(a).count() == 1)
    }
}
