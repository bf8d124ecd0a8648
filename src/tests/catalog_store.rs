//! Catalog persistence across restarts.

use std::sync::Arc;

use crate::recognition::{
    find_matches, Catalog, CatalogEntry, CatalogError, EmbeddingVector, MatchOptions,
    StoredEmbedding,
};
use crate::storage::{BackendLocal, StorageManager};

fn vector(values: &[f32]) -> EmbeddingVector {
    EmbeddingVector::new(values.to_vec()).unwrap()
}

fn open(dir: &std::path::Path) -> Catalog {
    Catalog::open(Arc::new(BackendLocal::new(dir).unwrap())).unwrap()
}

#[test]
fn test_reopen_restores_entries_and_counters() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let catalog = open(tmp.path());
        catalog.create_group("pond", "ranger", Some("abc".into())).unwrap();
        catalog
            .add_entry("pond", "shelly", "p/s/1.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();
        catalog
            .add_entry("pond", "shelly", "p/s/2.webp".into(), vector(&[0.0, 1.0]))
            .unwrap();
        catalog.remove_entry("pond", "shelly", 2).unwrap();
    }

    let catalog = open(tmp.path());
    let groups = catalog.groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].owner, "ranger");
    assert_eq!(groups[0].model.as_deref(), Some("abc"));

    let entries = catalog.list_entries("pond").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].slot, 1);
    assert_eq!(entries[0].embedding, StoredEmbedding::Vector(vector(&[1.0, 0.0])));

    // slot 2 was used before the restart and must not come back
    let next = catalog
        .add_entry("pond", "shelly", "p/s/3.webp".into(), vector(&[1.0, 1.0]))
        .unwrap();
    assert_eq!(next.slot, 3);
}

#[test]
fn test_document_layout() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = open(tmp.path());
    catalog.create_group("pond", "ranger", None).unwrap();
    catalog
        .add_entry("pond", "shelly", "p/s/1.webp".into(), vector(&[0.5, 0.25]))
        .unwrap();

    let store = BackendLocal::new(tmp.path()).unwrap();

    let group: serde_json::Value =
        serde_json::from_slice(&store.read("groups/pond.json").unwrap()).unwrap();
    assert_eq!(group["members"], serde_json::json!(["shelly"]));
    assert_eq!(group["owner"], "ranger");

    let doc: serde_json::Value =
        serde_json::from_slice(&store.read("entries/pond/shelly.json").unwrap()).unwrap();
    assert_eq!(doc["nextSlot"], 2);
    assert_eq!(doc["slots"]["1"]["image"], "p/s/1.webp");
    assert_eq!(doc["slots"]["1"]["embedding"], "[0.5,0.25]");
    assert!(doc["slots"]["1"]["uploadedAt"].is_string());
}

#[test]
fn test_corrupt_entry_excluded_from_matching() {
    let tmp = tempfile::tempdir().unwrap();
    let store = BackendLocal::new(tmp.path()).unwrap();

    store
        .write(
            "groups/pond.json",
            br#"{"name": "pond", "owner": "ranger", "createdAt": "2024-05-01T10:00:00Z", "members": ["shelly", "crush", "squirt"]}"#,
        )
        .unwrap();
    store
        .write(
            "entries/pond/shelly.json",
            br#"{"nextSlot": 2, "slots": {"1": {"image": "s.webp", "embedding": "[0.6, 0.8]", "uploadedAt": "2024-05-01T10:00:00Z"}}}"#,
        )
        .unwrap();
    store
        .write(
            "entries/pond/crush.json",
            br#"{"nextSlot": 3, "slots": {
                "1": {"image": "c1.webp", "embedding": "[0.1, {oops", "uploadedAt": "2024-05-01T10:00:00Z"},
                "2": {"image": "c2.webp", "embedding": null, "uploadedAt": "2024-05-01T10:00:00Z"}
            }}"#,
        )
        .unwrap();
    store
        .write(
            "entries/pond/squirt.json",
            br#"{"nextSlot": 2, "slots": {"1": {"image": "q.webp", "embedding": "[1.0, 0.0]", "uploadedAt": "2024-05-01T10:00:00Z"}}}"#,
        )
        .unwrap();

    let catalog = open(tmp.path());
    let entries = catalog.list_entries("pond").unwrap();
    assert_eq!(entries.len(), 4);

    let query = vector(&[1.0, 0.0]);
    let matches = find_matches::<Arc<CatalogEntry>, _>(
        Some(&query),
        &entries,
        MatchOptions::default(),
    )
    .unwrap();

    let ids: Vec<_> = matches.iter().map(|m| m.identity.as_str()).collect();
    assert_eq!(ids, vec!["squirt", "shelly"]);
    assert!((matches[1].score - 0.6).abs() < 1e-6);

    // the corrupt identity still gets fresh slots
    let entry = catalog
        .add_entry("pond", "crush", "c3.webp".into(), vector(&[0.0, 1.0]))
        .unwrap();
    assert_eq!(entry.slot, 3);
}

#[test]
fn test_unknown_group_after_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog = open(tmp.path());
    assert!(matches!(
        catalog.list_entries("pond"),
        Err(CatalogError::GroupNotFound(_))
    ));
}

#[test]
fn test_dimension_after_remove_all_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();

    {
        let catalog = open(tmp.path());
        catalog.create_group("pond", "ranger", None).unwrap();
        catalog
            .add_entry("pond", "shelly", "p/s/1.webp".into(), vector(&[1.0, 0.0]))
            .unwrap();
        catalog.remove_entry("pond", "shelly", 1).unwrap();

        let entry = catalog
            .add_entry("pond", "shelly", "p/s/2.webp".into(), vector(&[1.0, 0.0, 0.0]))
            .unwrap();
        assert_eq!(entry.slot, 2);
        catalog.remove_entry("pond", "shelly", 2).unwrap();
    }

    let catalog = open(tmp.path());
    let entry = catalog
        .add_entry("pond", "shelly", "p/s/3.webp".into(), vector(&[0.0, 1.0]))
        .unwrap();
    assert_eq!(entry.slot, 3);

    let result = catalog.add_entry("pond", "crush", "p/c/1.webp".into(), vector(&[1.0, 0.0, 0.0]));
    assert!(matches!(
        result,
        Err(CatalogError::DimensionMismatch { expected: 2, got: 3 })
    ));
}

#[test]
fn test_stray_dimension_excluded_on_load() {
    let tmp = tempfile::tempdir().unwrap();
    let store = BackendLocal::new(tmp.path()).unwrap();

    store
        .write(
            "groups/pond.json",
            br#"{"name": "pond", "owner": "ranger", "createdAt": "2024-05-01T10:00:00Z", "members": ["odd", "shelly", "squirt"]}"#,
        )
        .unwrap();
    store
        .write(
            "entries/pond/odd.json",
            br#"{"nextSlot": 2, "slots": {"1": {"image": "o.webp", "embedding": "[1.0, 0.0, 0.0]", "uploadedAt": "2024-05-01T10:00:00Z"}}}"#,
        )
        .unwrap();
    store
        .write(
            "entries/pond/shelly.json",
            br#"{"nextSlot": 2, "slots": {"1": {"image": "s.webp", "embedding": "[0.6, 0.8]", "uploadedAt": "2024-05-01T10:00:00Z"}}}"#,
        )
        .unwrap();
    store
        .write(
            "entries/pond/squirt.json",
            br#"{"nextSlot": 2, "slots": {"1": {"image": "q.webp", "embedding": "[1.0, 0.0]", "uploadedAt": "2024-05-01T10:00:00Z"}}}"#,
        )
        .unwrap();

    let catalog = open(tmp.path());
    let entries = catalog.list_entries("pond").unwrap();
    let odd = entries.iter().find(|entry| entry.identity == "odd").unwrap();
    assert!(matches!(
        odd.embedding,
        StoredEmbedding::Mismatched { expected: 2, .. }
    ));

    let query = vector(&[1.0, 0.0]);
    let matches = find_matches::<Arc<CatalogEntry>, _>(
        Some(&query),
        &entries,
        MatchOptions::default(),
    )
    .unwrap();
    let ids: Vec<_> = matches.iter().map(|m| m.identity.as_str()).collect();
    assert_eq!(ids, vec!["squirt", "shelly"]);

    // the excluded vector is persisted unchanged on the next write
    catalog
        .add_entry("pond", "odd", "o2.webp".into(), vector(&[0.0, 1.0]))
        .unwrap();
    let doc: serde_json::Value =
        serde_json::from_slice(&store.read("entries/pond/odd.json").unwrap()).unwrap();
    assert_eq!(doc["slots"]["1"]["embedding"], "[1.0,0.0,0.0]");
}
