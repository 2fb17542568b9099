//! Integration tests for the file-backed storage driver.

use std::thread::sleep;
use std::time::Duration;

use tempfile::TempDir;

use adjudicate::{
    AdjudicateError, AnnotatorDocument, DocumentStorage, FeatureDef, LayerDef, SchemaRegistry,
    StorageOptions,
};

fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_layer(LayerDef::span("entity").with_feature(FeatureDef::new("value")))
}

fn sample_doc(user: &str) -> AnnotatorDocument {
    let mut doc = AnnotatorDocument::new("proj", "doc-1", user, "Alice met Bob.");
    let id = doc.create_span("entity", 0, 5).unwrap();
    doc.set_feature(id, "value", "PER".into()).unwrap();
    doc
}

#[test]
fn test_write_read_roundtrip() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::new(root.path());
    let doc = sample_doc("anna");

    storage.write(&doc, &registry()).unwrap();
    let stored = storage.read("proj", "doc-1", "anna").unwrap();

    assert_eq!(stored.document, doc);
    assert_eq!(stored.schema, registry());
    // Plain JSON when compression is off.
    let bytes = storage.export("proj", "doc-1", "anna").unwrap();
    assert_eq!(bytes.first(), Some(&b'{'));
}

#[test]
fn test_compressed_roundtrip() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::with_options(
        root.path(),
        StorageOptions::new().with_compression(true),
    );
    let doc = sample_doc("anna");

    storage.write(&doc, &registry()).unwrap();
    let bytes = storage.export("proj", "doc-1", "anna").unwrap();
    assert_eq!(&bytes[..2], &[0x1f, 0x8b]);

    // A driver without compression still reads the file.
    let plain = DocumentStorage::new(root.path());
    let stored = plain.read("proj", "doc-1", "anna").unwrap();
    assert_eq!(stored.document, doc);
}

#[test]
fn test_read_missing_is_not_found() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::new(root.path());

    let result = storage.read("proj", "doc-1", "anna");
    assert!(matches!(result, Err(AdjudicateError::NotFound { .. })));
}

#[test]
fn test_read_garbage_is_corrupt() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::new(root.path());
    storage
        .import("proj", "doc-1", "anna", b"this is not a document")
        .unwrap();

    let result = storage.read("proj", "doc-1", "anna");
    assert!(matches!(result, Err(AdjudicateError::Corrupt { .. })));
}

#[test]
fn test_unsupported_format_version_is_corrupt() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::new(root.path());

    let value = serde_json::json!({
        "format_version": 99,
        "saved_at": "2025-01-01T00:00:00Z",
        "schema": registry(),
        "document": sample_doc("anna"),
    });
    let bytes = serde_json::to_vec(&value).unwrap();
    storage.import("proj", "doc-1", "anna", &bytes).unwrap();

    let result = storage.read("proj", "doc-1", "anna");
    assert!(matches!(result, Err(AdjudicateError::Corrupt { .. })));
}

#[test]
fn test_interleaved_writers_are_detected() {
    let root = TempDir::new().unwrap();
    let reg = registry();
    let alice = DocumentStorage::new(root.path());
    let bob = DocumentStorage::new(root.path());

    alice.write(&sample_doc("anna"), &reg).unwrap();
    sleep(Duration::from_millis(50));

    // Bob's driver has never seen the file, so its first write proceeds.
    bob.write(&sample_doc("anna"), &reg).unwrap();
    sleep(Duration::from_millis(50));

    // Alice's driver still holds the token of its own write.
    let result = alice.write(&sample_doc("anna"), &reg);
    assert!(matches!(
        result,
        Err(AdjudicateError::ConcurrentModification { .. })
    ));

    // A fresh read re-arms the driver.
    alice.read("proj", "doc-1", "anna").unwrap();
    alice.write(&sample_doc("anna"), &reg).unwrap();
}

#[test]
fn test_single_driver_instance_is_one_holder() {
    let root = TempDir::new().unwrap();
    let reg = registry();
    let storage = DocumentStorage::new(root.path());

    // Repeated writes through one instance refresh its own token; detection
    // only applies between separate instances.
    storage.write(&sample_doc("anna"), &reg).unwrap();
    sleep(Duration::from_millis(50));
    storage.write(&sample_doc("anna"), &reg).unwrap();
    sleep(Duration::from_millis(50));
    storage.write(&sample_doc("anna"), &reg).unwrap();
}

#[test]
fn test_timestamp_tolerance_absorbs_small_drift() {
    let root = TempDir::new().unwrap();
    let reg = registry();
    let tolerant = DocumentStorage::with_options(
        root.path(),
        StorageOptions::new().with_timestamp_tolerance(Duration::from_secs(60)),
    );
    let other = DocumentStorage::new(root.path());

    tolerant.write(&sample_doc("anna"), &reg).unwrap();
    sleep(Duration::from_millis(50));
    other.write(&sample_doc("anna"), &reg).unwrap();
    sleep(Duration::from_millis(50));

    // Within tolerance, the foreign write is not flagged.
    tolerant.write(&sample_doc("anna"), &reg).unwrap();
}

#[test]
fn test_verify_timestamp_against_explicit_token() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::new(root.path());
    storage.write(&sample_doc("anna"), &registry()).unwrap();

    let token = storage.current_token("proj", "doc-1", "anna").unwrap();
    assert_eq!(
        storage
            .verify_timestamp("proj", "doc-1", "anna", token)
            .unwrap(),
        token
    );

    let stale = token - 10_000;
    let result = storage.verify_timestamp("proj", "doc-1", "anna", stale);
    match result {
        Err(AdjudicateError::ConcurrentModification {
            expected, actual, ..
        }) => {
            assert_eq!(expected, stale);
            assert_eq!(actual, token);
        }
        other => panic!("expected concurrent modification, got {:?}", other),
    }
}

#[test]
fn test_failed_paranoid_write_keeps_previous_content() {
    let root = TempDir::new().unwrap();
    let reg = registry();
    let storage = DocumentStorage::with_options(
        root.path(),
        StorageOptions::new().with_paranoid_checks(true),
    );
    let doc = sample_doc("anna");
    storage.write(&doc, &reg).unwrap();

    let result = storage.import("proj", "doc-1", "anna", b"garbage bytes");
    assert!(matches!(result, Err(AdjudicateError::Corrupt { .. })));

    // Previous content survives the failed write.
    let stored = storage.read("proj", "doc-1", "anna").unwrap();
    assert_eq!(stored.document, doc);
    // The rejected bytes are preserved for diagnosis.
    let dump = root.path().join("proj").join("doc-1").join("anna.ann.dump");
    assert_eq!(std::fs::read(&dump).unwrap(), b"garbage bytes");
    // No stale working files are left behind.
    let old = root.path().join("proj").join("doc-1").join("anna.ann.old");
    assert!(!old.exists());
}

#[test]
fn test_export_import_between_roots() {
    let source_root = TempDir::new().unwrap();
    let target_root = TempDir::new().unwrap();
    let reg = registry();
    let source = DocumentStorage::new(source_root.path());
    let target = DocumentStorage::new(target_root.path());
    let doc = sample_doc("anna");

    source.write(&doc, &reg).unwrap();
    let bytes = source.export("proj", "doc-1", "anna").unwrap();
    target.import("proj", "doc-1", "anna", &bytes).unwrap();

    let stored = target.read("proj", "doc-1", "anna").unwrap();
    assert_eq!(stored.document, doc);
}

#[test]
fn test_metadata_reports_size_and_digest() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::new(root.path());
    storage.write(&sample_doc("anna"), &registry()).unwrap();

    let bytes = storage.export("proj", "doc-1", "anna").unwrap();
    let meta = storage.metadata("proj", "doc-1", "anna").unwrap();
    assert_eq!(meta.size, bytes.len() as u64);
    assert_eq!(meta.sha256.len(), 64);
    assert!(meta.modified_ms > 0);

    // Distinct content yields a distinct digest.
    storage.write(&sample_doc("ben"), &registry()).unwrap();
    let other = storage.metadata("proj", "doc-1", "ben").unwrap();
    assert_ne!(meta.sha256, other.sha256);
}

#[test]
fn test_list_users_only_sees_current_documents() {
    let root = TempDir::new().unwrap();
    let reg = registry();
    let storage = DocumentStorage::new(root.path());
    storage.write(&sample_doc("ben"), &reg).unwrap();
    storage.write(&sample_doc("anna"), &reg).unwrap();

    // Snapshot and scratch siblings must not show up.
    let dir = root.path().join("proj").join("doc-1");
    std::fs::write(dir.join("anna.20250101-000000.bak"), b"x").unwrap();

    assert_eq!(
        storage.list_users("proj", "doc-1").unwrap(),
        vec!["anna".to_string(), "ben".to_string()]
    );
    assert!(storage.list_users("proj", "other").unwrap().is_empty());
}

#[test]
fn test_history_snapshot_follows_interval() {
    let root = TempDir::new().unwrap();
    let reg = registry();
    let storage = DocumentStorage::with_options(
        root.path(),
        StorageOptions::new().with_backup_interval(Duration::from_secs(3600)),
    );

    storage.write(&sample_doc("anna"), &reg).unwrap();
    let snapshots = storage.list_snapshots("proj", "doc-1", "anna").unwrap();
    assert_eq!(snapshots.len(), 1);

    // Within the interval no second snapshot is taken.
    storage.read("proj", "doc-1", "anna").unwrap();
    storage.write(&sample_doc("anna"), &reg).unwrap();
    let snapshots = storage.list_snapshots("proj", "doc-1", "anna").unwrap();
    assert_eq!(snapshots.len(), 1);
}

#[test]
fn test_observer_sees_reads_and_writes() {
    use std::sync::Arc;

    use adjudicate::AccessLog;

    let root = TempDir::new().unwrap();
    let log = Arc::new(AccessLog::new());
    let storage = DocumentStorage::new(root.path()).with_observer(Arc::clone(&log));

    storage.write(&sample_doc("anna"), &registry()).unwrap();
    let record = log.record("proj", "doc-1", "anna").unwrap();
    assert!(record.last_write.is_some());
    assert!(record.last_read.is_none());

    storage.read("proj", "doc-1", "anna").unwrap();
    let record = log.record("proj", "doc-1", "anna").unwrap();
    assert!(record.last_read.is_some());
}

#[test]
fn test_history_disabled_by_default() {
    let root = TempDir::new().unwrap();
    let storage = DocumentStorage::new(root.path());
    storage.write(&sample_doc("anna"), &registry()).unwrap();

    assert!(storage
        .list_snapshots("proj", "doc-1", "anna")
        .unwrap()
        .is_empty());
}
