use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::{json, Value};

use super::support::{stored_vector, FailingStore, StubCatalog};
use crate::catalog::{CatalogSource, FileCatalogSource, HttpCatalogSource, RecordError};
use crate::embedding::EmbeddingService;
use crate::index::product_schema;
use crate::store::{LocalStore, MemoryStore, VectorStore};
use crate::sync::{RecordErrorPolicy, SyncError, SyncOutcome, SyncService, SyncSummary};

const DIMS: usize = 8;

fn embedder() -> Arc<EmbeddingService> {
    Arc::new(EmbeddingService::fallback_only(DIMS))
}

fn service(store: Arc<dyn VectorStore>, source: Box<dyn CatalogSource>) -> SyncService {
    SyncService::new(
        store,
        source,
        embedder(),
        product_schema("products_idx", "product:", DIMS),
    )
}

fn two_products() -> Value {
    json!([
        {"id": "p1", "name": "Hydra Serum", "brand": "Acme", "category": "serum",
         "effects": ["hydrating", "soothing"], "price": 19.9},
        {"product_id": "p2", "name": "Clay Mask", "effects": ["oil control"]}
    ])
}

fn completed(outcome: SyncOutcome) -> SyncSummary {
    match outcome {
        SyncOutcome::Completed(summary) => summary,
        other => panic!("expected a completed sync, got {other:?}"),
    }
}

#[test]
fn test_sync_into_empty_store() {
    let store = Arc::new(MemoryStore::new());
    let sync = service(store.clone(), Box::new(StubCatalog::new(two_products())));

    let summary = completed(sync.sync(false).unwrap());

    assert_eq!(summary.new_count, 2);
    assert_eq!(summary.skipped_count, 0);
    assert_eq!(summary.total_count, 2);
    assert!(summary.failures.is_empty());

    let p1 = store.get_json("product:p1").unwrap().unwrap();
    assert_eq!(p1["name"], "Hydra Serum");
    assert_eq!(p1["price"], 19.9);

    let p2 = store.get_json("product:p2").unwrap().unwrap();
    assert_eq!(p2["brand"], "");
    assert_eq!(p2["category"], "");
    assert_eq!(p2["price"], 0.0);
    assert_eq!(p2["ingredients"], json!([]));

    let expected = EmbeddingService::fallback_only(DIMS)
        .embed_effects(&["hydrating", "soothing"])
        .vector;
    assert_eq!(stored_vector(&*store, "product:p1"), expected);
}

#[test]
fn test_existing_product_is_skipped() {
    let store = Arc::new(MemoryStore::new());
    let original = json!({"product_id": "p1", "name": "Old", "effect_vector": vec![1.0f32; DIMS]});
    store.set_json("product:p1", &original).unwrap();

    let sync = service(store.clone(), Box::new(StubCatalog::new(two_products())));
    let summary = completed(sync.sync(false).unwrap());

    assert_eq!(summary.new_count, 1);
    assert_eq!(summary.skipped_count, 1);
    assert_eq!(summary.total_count, 1);
    assert_eq!(store.get_json("product:p1").unwrap(), Some(original));
    assert!(store.get_json("product:p2").unwrap().is_some());
}

#[test]
fn test_second_sync_does_not_contact_source() {
    let store = Arc::new(MemoryStore::new());
    let catalog = StubCatalog::new(two_products());
    let fetches = catalog.fetch_counter();
    let sync = service(store.clone(), Box::new(catalog));

    completed(sync.sync(false).unwrap());
    let before = store.get_json("product:p1").unwrap();

    assert_eq!(sync.sync(false).unwrap(), SyncOutcome::AlreadyPresent);
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_json("product:p1").unwrap(), before);
}

#[test]
fn test_forced_sync_never_overwrites() {
    let store = Arc::new(MemoryStore::new());
    let sync = service(store.clone(), Box::new(StubCatalog::new(two_products())));
    completed(sync.sync(false).unwrap());

    let sentinel = json!({"product_id": "p1", "name": "Edited", "effect_vector": vec![0.5f32; DIMS]});
    store.set_json("product:p1", &sentinel).unwrap();

    let summary = completed(sync.sync(true).unwrap());

    assert_eq!(summary.new_count, 0);
    assert_eq!(summary.skipped_count, 2);
    assert_eq!(summary.total_count, 0);
    assert_eq!(store.get_json("product:p1").unwrap(), Some(sentinel));
}

#[test]
fn test_forced_sync_adds_new_products() {
    let store = Arc::new(MemoryStore::new());
    service(store.clone(), Box::new(StubCatalog::new(json!([{"id": "p1"}]))))
        .sync(false)
        .unwrap();

    let sync = service(store.clone(), Box::new(StubCatalog::new(two_products())));
    assert_eq!(sync.sync(false).unwrap(), SyncOutcome::AlreadyPresent);

    let summary = completed(sync.sync(true).unwrap());
    assert_eq!(summary.new_count, 1);
    assert_eq!(summary.skipped_count, 1);
    assert!(store.get_json("product:p2").unwrap().is_some());
}

fn three_products() -> Value {
    json!({"products": [
        {"id": "p1", "effects": ["a"]},
        {"id": "p2", "effects": ["b"]},
        {"id": "p3", "effects": ["c"]}
    ]})
}

#[test]
fn test_storage_failure_aborts_and_keeps_earlier_writes() {
    let store = Arc::new(FailingStore::new("product:p2"));
    let sync = service(store.clone(), Box::new(StubCatalog::new(three_products())));

    let err = sync.sync(false).unwrap_err();

    match err {
        SyncError::RecordStorage { product_id, .. } => assert_eq!(product_id, "p2"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.get_json("product:p1").unwrap().is_some());
    assert!(store.get_json("product:p3").unwrap().is_none());
}

#[test]
fn test_storage_failure_with_continue_policy() {
    let store = Arc::new(FailingStore::new("product:p2"));
    let sync = service(store.clone(), Box::new(StubCatalog::new(three_products())))
        .with_policy(RecordErrorPolicy::Continue);

    let summary = completed(sync.sync(false).unwrap());

    assert_eq!(summary.new_count, 2);
    assert_eq!(summary.total_count, 2);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].product_id.as_deref(), Some("p2"));
    assert!(store.get_json("product:p3").unwrap().is_some());
}

#[test]
fn test_record_without_identifier() {
    let payload = json!([{"name": "Nameless", "effects": ["x"]}, {"id": 42}]);

    let store = Arc::new(MemoryStore::new());
    let sync = service(store.clone(), Box::new(StubCatalog::new(payload.clone())));
    assert!(matches!(
        sync.sync(false),
        Err(SyncError::InvalidRecord(RecordError::MissingIdentifier { .. }))
    ));
    assert!(store.is_empty());

    let store = Arc::new(MemoryStore::new());
    let sync = service(store.clone(), Box::new(StubCatalog::new(payload)))
        .with_policy(RecordErrorPolicy::Continue);
    let summary = completed(sync.sync(false).unwrap());

    assert_eq!(summary.new_count, 1);
    assert_eq!(summary.failures[0].product_id, None);
    assert_eq!(summary.failures[0].name, "Nameless");
    assert!(store.get_json("product:42").unwrap().is_some());
}

#[test]
fn test_missing_source_address_is_configuration_error() {
    let store = Arc::new(MemoryStore::new());
    let sync = service(
        store.clone(),
        Box::new(HttpCatalogSource::new(None, std::time::Duration::from_secs(1))),
    );

    assert!(matches!(sync.sync(false), Err(SyncError::Configuration(_))));
    assert!(store.is_empty());
}

#[test]
fn test_existing_data_skips_unconfigured_source() {
    let store = Arc::new(MemoryStore::new());
    completed(
        service(store.clone(), Box::new(StubCatalog::new(two_products())))
            .sync(false)
            .unwrap(),
    );

    let sync = service(
        store.clone(),
        Box::new(HttpCatalogSource::new(None, std::time::Duration::from_secs(1))),
    );
    assert_eq!(sync.sync(false).unwrap(), SyncOutcome::AlreadyPresent);
}

#[test]
fn test_status() {
    let store = Arc::new(MemoryStore::new());
    let sync = service(store.clone(), Box::new(StubCatalog::new(two_products())));

    let status = sync.status().unwrap();
    assert_eq!(status.products_count, 0);
    assert!(!status.data_exists);
    assert_eq!(status.last_sync, None);

    completed(sync.sync(false).unwrap());

    let status = sync.status().unwrap();
    assert_eq!(status.products_count, 2);
    assert!(status.data_exists);
    let last_sync = status.last_sync.expect("sync time recorded");
    assert!(chrono::DateTime::parse_from_rfc3339(&last_sync).is_ok());
}

#[test]
fn test_file_catalog_into_local_store() {
    let tmp = tempfile::tempdir().unwrap();
    let catalog_path = tmp.path().join("catalog.json");
    std::fs::write(&catalog_path, three_products().to_string()).unwrap();

    let store = Arc::new(LocalStore::open(tmp.path().join("store")).unwrap());
    let sync = service(store, Box::new(FileCatalogSource::new(&catalog_path)));
    let summary = completed(sync.sync(false).unwrap());
    assert_eq!(summary.new_count, 3);

    let reopened: Arc<dyn VectorStore> =
        Arc::new(LocalStore::open(tmp.path().join("store")).unwrap());
    assert_eq!(reopened.count("products_idx").unwrap(), 3);

    let sync = service(reopened, Box::new(FileCatalogSource::new(&catalog_path)));
    assert_eq!(sync.sync(false).unwrap(), SyncOutcome::AlreadyPresent);
}

#[test]
fn test_mistyped_record_goes_through_policy() {
    let payload = json!([
        {"id": "p1", "effects": ["hydrating"]},
        {"id": "p2", "effects": "soothing", "brand": 42},
        {"id": "p3", "effects": {"not": "a list"}},
        {"id": "p4", "effects": ["calming"]}
    ]);

    let store = Arc::new(MemoryStore::new());
    let sync = service(store.clone(), Box::new(StubCatalog::new(payload.clone())))
        .with_policy(RecordErrorPolicy::Continue);
    let summary = completed(sync.sync(false).unwrap());

    assert_eq!(summary.new_count, 3);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].product_id.as_deref(), Some("p3"));

    let p2 = store.get_json("product:p2").unwrap().unwrap();
    assert_eq!(p2["effects"], json!(["soothing"]));
    assert_eq!(p2["brand"], "42");
    assert_eq!(
        stored_vector(&*store, "product:p2"),
        EmbeddingService::fallback_only(DIMS)
            .embed("soothing")
            .vector
    );

    let store = Arc::new(MemoryStore::new());
    let sync = service(store.clone(), Box::new(StubCatalog::new(payload)));
    assert!(matches!(
        sync.sync(false),
        Err(SyncError::InvalidRecord(RecordError::InvalidField { field: "effects", .. }))
    ));
    assert!(store.get_json("product:p2").unwrap().is_some());
    assert!(store.get_json("product:p4").unwrap().is_none());
}

#[test]
fn test_long_identifier_into_local_store() {
    let tmp = tempfile::tempdir().unwrap();
    let long_id = "a".repeat(300);
    let payload = json!([
        {"id": long_id, "name": "Long", "effects": ["hydrating"]},
        {"id": "p2", "effects": ["calming"]}
    ]);

    let store: Arc<dyn VectorStore> = Arc::new(LocalStore::open(tmp.path()).unwrap());
    let sync = service(store.clone(), Box::new(StubCatalog::new(payload)));
    let summary = completed(sync.sync(false).unwrap());

    assert_eq!(summary.new_count, 2);
    assert!(summary.failures.is_empty());
    assert_eq!(store.count("products_idx").unwrap(), 2);

    let doc = store.get_json(&format!("product:{long_id}")).unwrap().unwrap();
    assert_eq!(doc["product_id"], json!(long_id));
    assert_eq!(doc["name"], "Long");
}
