//! Canonical positions used to align annotations across annotators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A comparable location descriptor.
///
/// Two annotations are "at the same position" iff their positions are equal,
/// independent of which document holds them. Span positions carry only the
/// character range. Relation positions additionally carry both endpoint
/// ranges (begin/end hold the envelope, keeping the ordering well-defined).
/// Slot sub-positions carry the host range plus the link feature name, the
/// link target range and, depending on the comparison mode, the role.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Position {
    /// Layer name.
    pub layer: String,
    /// Character begin (for relations, the envelope begin).
    pub begin: usize,
    /// Character end (for relations, the envelope end).
    pub end: usize,
    /// Range of the relation's source endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_range: Option<(usize, usize)>,
    /// Range of the relation's target endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_range: Option<(usize, usize)>,
    /// Link feature name, present only for slot sub-positions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_feature: Option<String>,
    /// Link role, present when the comparison mode treats roles as labels.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_role: Option<String>,
    /// Range of the span the slot points at.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<(usize, usize)>,
}

impl Position {
    /// Position of a span annotation.
    pub fn span(layer: impl Into<String>, begin: usize, end: usize) -> Self {
        Self {
            layer: layer.into(),
            begin,
            end,
            source_range: None,
            target_range: None,
            link_feature: None,
            link_role: None,
            link_target: None,
        }
    }

    /// Position of a relation annotation, identified by its endpoint ranges.
    pub fn relation(
        layer: impl Into<String>,
        source_range: (usize, usize),
        target_range: (usize, usize),
    ) -> Self {
        Self {
            layer: layer.into(),
            begin: source_range.0.min(target_range.0),
            end: source_range.1.max(target_range.1),
            source_range: Some(source_range),
            target_range: Some(target_range),
            link_feature: None,
            link_role: None,
            link_target: None,
        }
    }

    /// Sub-position of one slot entry under a host span.
    pub fn slot(
        layer: impl Into<String>,
        host_range: (usize, usize),
        feature: impl Into<String>,
        role: Option<String>,
        target_range: (usize, usize),
    ) -> Self {
        Self {
            layer: layer.into(),
            begin: host_range.0,
            end: host_range.1,
            source_range: None,
            target_range: None,
            link_feature: Some(feature.into()),
            link_role: role,
            link_target: Some(target_range),
        }
    }

    /// Whether this is a slot sub-position.
    pub fn is_link(&self) -> bool {
        self.link_feature.is_some()
    }

    /// Whether this is a relation position.
    pub fn is_relation(&self) -> bool {
        self.source_range.is_some()
    }

    /// Whether the position overlaps a character window.
    pub fn overlaps(&self, begin: usize, end: usize) -> bool {
        self.begin < end && begin < self.end
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..{}]", self.layer, self.begin, self.end)?;
        if let (Some(s), Some(t)) = (self.source_range, self.target_range) {
            write!(f, " {}..{}->{}..{}", s.0, s.1, t.0, t.1)?;
        }
        if let Some(ref feature) = self.link_feature {
            write!(f, " @{}", feature)?;
            if let Some(ref role) = self.link_role {
                write!(f, ":{}", role)?;
            }
            if let Some(t) = self.link_target {
                write!(f, "->{}..{}", t.0, t.1)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_position_equality() {
        assert_eq!(Position::span("entity", 0, 5), Position::span("entity", 0, 5));
        assert_ne!(Position::span("entity", 0, 5), Position::span("event", 0, 5));
        assert_ne!(Position::span("entity", 0, 5), Position::span("entity", 0, 6));
    }

    #[test]
    fn test_relation_position_envelope() {
        let pos = Position::relation("dependency", (10, 13), (0, 5));
        assert_eq!(pos.begin, 0);
        assert_eq!(pos.end, 13);
        assert!(pos.is_relation());
        // Direction matters.
        assert_ne!(pos, Position::relation("dependency", (0, 5), (10, 13)));
    }

    #[test]
    fn test_slot_position_distinct_from_host() {
        let host = Position::span("event", 0, 5);
        let slot = Position::slot("event", (0, 5), "arguments", None, (10, 13));
        assert_ne!(host, slot);
        assert!(slot.is_link());
    }

    #[test]
    fn test_ordering_is_total_and_stable() {
        let mut positions = vec![
            Position::span("entity", 10, 15),
            Position::span("entity", 0, 5),
            Position::slot("entity", (0, 5), "arguments", None, (10, 15)),
        ];
        positions.sort();
        assert_eq!(positions[0], Position::span("entity", 0, 5));
    }

    #[test]
    fn test_overlaps() {
        let pos = Position::span("entity", 5, 10);
        assert!(pos.overlaps(0, 6));
        assert!(pos.overlaps(9, 20));
        assert!(!pos.overlaps(10, 20));
    }
}
