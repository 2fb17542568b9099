//! Property-based tests for the diff and merge engine.
//!
//! These tests use proptest to generate random annotator documents and
//! verify that diffing and merging maintain their invariants under all
//! conditions:
//!
//! 1. **No panics**: diff and merge never crash on any input
//! 2. **Determinism**: same input always produces same output
//! 3. **Partition**: every position is agreeing, differing or incomplete,
//!    never more than one
//! 4. **No accidental stacking**: a curated document never holds two
//!    equivalent spans at one position

use std::collections::BTreeMap;

use proptest::prelude::*;

use adjudicate::{
    compute_diff, AdjudicateError, AnnotatorDocument, ComparisonMode, DiffResult, FeatureDef,
    LayerDef, MergeEngine, SchemaRegistry, CURATION_USER,
};

const TEXT: &str = "abcdefghijklmnopqrstuvwxyz";

fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_layer(LayerDef::span("entity").with_feature(FeatureDef::new("value")))
}

// =============================================================================
// Test Strategies
// =============================================================================

/// One span as (begin, length, label).
fn span() -> impl Strategy<Value = (usize, usize, String)> {
    (0usize..20, 1usize..6, "[A-Z]{3}")
}

/// Up to eight spans for one annotator.
fn span_set() -> impl Strategy<Value = Vec<(usize, usize, String)>> {
    prop::collection::vec(span(), 0..8)
}

fn doc_from(user: &str, spans: &[(usize, usize, String)]) -> AnnotatorDocument {
    let mut doc = AnnotatorDocument::new("proj", "doc-1", user, TEXT);
    for (begin, len, label) in spans {
        let id = doc.create_span("entity", *begin, begin + len).unwrap();
        doc.set_feature(id, "value", label.as_str().into()).unwrap();
    }
    doc
}

fn documents(
    anna: &[(usize, usize, String)],
    ben: &[(usize, usize, String)],
) -> BTreeMap<String, AnnotatorDocument> {
    [
        ("anna".to_string(), doc_from("anna", anna)),
        ("ben".to_string(), doc_from("ben", ben)),
    ]
    .into()
}

fn diff_of(reg: &SchemaRegistry, docs: &BTreeMap<String, AnnotatorDocument>) -> DiffResult {
    compute_diff(reg, ComparisonMode::RoleAsLabel, docs, None).unwrap()
}

// =============================================================================
// Diff Properties
// =============================================================================

mod diff_properties {
    use super::*;

    proptest! {
        /// Diffing never panics on any pair of annotator documents.
        #[test]
        fn never_panics(anna in span_set(), ben in span_set()) {
            let reg = registry();
            let _ = diff_of(&reg, &documents(&anna, &ben));
        }

        /// Diffing is deterministic.
        #[test]
        fn diff_is_deterministic(anna in span_set(), ben in span_set()) {
            let reg = registry();
            let docs = documents(&anna, &ben);
            let first = diff_of(&reg, &docs);
            let second = diff_of(&reg, &docs);

            prop_assert_eq!(format!("{:?}", first.sets().collect::<Vec<_>>()),
                            format!("{:?}", second.sets().collect::<Vec<_>>()));
        }

        /// Every position falls into exactly one partition bucket.
        #[test]
        fn partition_is_exhaustive_and_disjoint(anna in span_set(), ben in span_set()) {
            let reg = registry();
            let diff = diff_of(&reg, &documents(&anna, &ben));

            let agreeing = diff.agreeing_positions().count();
            let differing = diff.differing_positions().count();
            let incomplete = diff.incomplete_positions().count();
            prop_assert_eq!(agreeing + differing + incomplete, diff.len());
        }

        /// Identical documents agree everywhere.
        #[test]
        fn identical_documents_fully_agree(spans in span_set()) {
            let reg = registry();
            let diff = diff_of(&reg, &documents(&spans, &spans));

            prop_assert_eq!(diff.differing_positions().count(), 0);
            // Duplicate spans in the input stack and count as incomplete,
            // so only agreement is asserted, not completeness.
            for set in diff.sets() {
                if set.complete {
                    prop_assert!(set.agreeing);
                }
            }
        }
    }
}

// =============================================================================
// Merge Properties
// =============================================================================

mod merge_properties {
    use super::*;

    proptest! {
        /// Re-merging never panics and never errors out of the batch.
        #[test]
        fn remerge_never_panics(anna in span_set(), ben in span_set()) {
            let reg = registry();
            let docs = documents(&anna, &ben);
            let diff = diff_of(&reg, &docs);
            let mut curated = AnnotatorDocument::new("proj", "doc-1", CURATION_USER, TEXT);
            let _ = MergeEngine::new(&reg).remerge(&diff, &docs, &mut curated);
        }

        /// Re-merging the same inputs twice yields identical content.
        #[test]
        fn remerge_is_deterministic(anna in span_set(), ben in span_set()) {
            let reg = registry();
            let docs = documents(&anna, &ben);
            let diff = diff_of(&reg, &docs);
            let engine = MergeEngine::new(&reg);

            let mut first = AnnotatorDocument::new("proj", "doc-1", CURATION_USER, TEXT);
            engine.remerge(&diff, &docs, &mut first);
            let mut second = first.clone();
            engine.remerge(&diff, &docs, &mut second);

            prop_assert_eq!(first, second);
        }

        /// A curated document never holds two equivalent spans at one range.
        #[test]
        fn curated_document_is_never_stacked(anna in span_set(), ben in span_set()) {
            let reg = registry();
            let docs = documents(&anna, &ben);
            let diff = diff_of(&reg, &docs);
            let mut curated = AnnotatorDocument::new("proj", "doc-1", CURATION_USER, TEXT);
            MergeEngine::new(&reg).remerge(&diff, &docs, &mut curated);

            let mut seen = std::collections::BTreeSet::new();
            for ann in curated.annotations_in_layer("entity") {
                let key = (ann.span_range(), format!("{:?}", ann.feature("value")));
                prop_assert!(seen.insert(key), "duplicate curated span: {:?}", ann);
            }
        }

        /// Merging the same source span twice reports it as already merged.
        #[test]
        fn double_merge_is_already_merged((begin, len, label) in span()) {
            let reg = registry();
            let engine = MergeEngine::new(&reg);
            let source = doc_from("anna", &[(begin, len, label)]);
            let mut curated = AnnotatorDocument::new("proj", "doc-1", CURATION_USER, TEXT);

            engine.merge_span(&mut curated, &source, 1, false).unwrap();
            let second = engine.merge_span(&mut curated, &source, 1, false);
            prop_assert!(
                matches!(&second, Err(AdjudicateError::AlreadyMerged { .. })),
                "expected AlreadyMerged, got {:?}",
                second
            );
            prop_assert_eq!(curated.annotations_in_layer("entity").count(), 1);
        }
    }
}
