//! Document store integration tests.

use std::sync::Arc;

use serde_json::{json, Value};

use vframe_models::{Document, FieldKind, FieldType};
use vframe_store::{DocumentStore, Filter, IndexSpec, MemoryStore, MergeSpec, SchemaCatalog, Stage};

fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("not an object")
}

async fn frames_store() -> Arc<dyn DocumentStore> {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    store
        .create_index("src.frames", IndexSpec::new(["_sample_id", "frame_number"]).unique())
        .await
        .expect("Failed to create index");
    store
        .insert_many(
            "src.frames",
            vec![
                doc(json!({"_id": "f1", "_sample_id": "v", "frame_number": 1, "gt": "cat", "note": "a"})),
                doc(json!({"_id": "f2", "_sample_id": "v", "frame_number": 2, "gt": "dog"})),
            ],
        )
        .await
        .expect("Failed to seed frames");
    store
}

#[tokio::test]
async fn test_projected_merge_writes_only_projected_fields() {
    let store = frames_store().await;
    store
        .insert_many(
            "derived",
            vec![
                doc(json!({"_id": "f1", "_sample_id": "v", "frame_number": 1, "gt": "bird", "note": "b"})),
                doc(json!({"_id": "x9", "_sample_id": "v", "frame_number": 9, "gt": "fish"})),
            ],
        )
        .await
        .unwrap();

    let pipeline = [
        Stage::Project(vec![
            "gt".into(),
            "_id".into(),
            "_sample_id".into(),
            "frame_number".into(),
        ]),
        Stage::Merge(MergeSpec::upsert_merge("src.frames", ["_sample_id", "frame_number"])),
    ];
    store.aggregate("derived", &pipeline).await.unwrap();

    let frames = store.find("src.frames", &Filter::all()).await.unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["gt"], json!("bird"));
    assert_eq!(frames[0]["note"], json!("a"));
    assert_eq!(frames[1]["gt"], json!("dog"));
}

#[tokio::test]
async fn test_failed_merge_leaves_target_untouched() {
    let store = frames_store().await;
    store
        .create_index("src.frames", IndexSpec::new(["gt"]).unique())
        .await
        .unwrap();
    store
        .insert_many(
            "derived",
            vec![doc(json!({"_sample_id": "v", "frame_number": 2, "gt": "cat"}))],
        )
        .await
        .unwrap();

    let pipeline = [Stage::Merge(MergeSpec::upsert_merge(
        "src.frames",
        ["_sample_id", "frame_number"],
    ))];
    let err = store.aggregate("derived", &pipeline).await.unwrap_err();
    assert!(err.is_duplicate_key());

    let frame = store
        .find("src.frames", &Filter::by_id("f2"))
        .await
        .unwrap()
        .remove(0);
    assert_eq!(frame["gt"], json!("dog"));
}

#[tokio::test]
async fn test_catalog_tracks_schemas_per_collection() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let catalog = SchemaCatalog::new(store.clone());

    let float = FieldType::new(FieldKind::Float);
    assert!(catalog.add_field("a.frames", "score", &float).await.unwrap());
    assert!(catalog.add_field("b.frames", "score", &float).await.unwrap());
    assert!(!catalog.add_field("a.frames", "score", &float).await.unwrap());

    catalog.drop("a.frames").await.unwrap();
    assert!(catalog.load("a.frames").await.unwrap().is_empty());
    assert!(catalog.load("b.frames").await.unwrap().contains("score"));
}
