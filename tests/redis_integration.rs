//! Redis engine integration tests.
//!
//! Runs the store, retrieve, update and delete flow against a Redis Stack
//! server (RediSearch required). Set `THREADSTORE_TEST_REDIS_URL` to enable:
//!
//! ```bash
//! export THREADSTORE_TEST_REDIS_URL="redis://localhost:6379"
//! cargo test --features redis redis_integration
//! ```

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::panic,
    clippy::print_stderr
)]
#![cfg(feature = "redis")]

use serde_json::json;
use std::env;
use threadstore::engine::RedisConnector;
use threadstore::{
    DeletionStatus, EmbeddingSource, Properties, Query, RetrievalOptions, StoreStatus,
    ThreadStore, UpdateStatus,
};

/// Environment variable for the Redis test connection URL.
const REDIS_URL_ENV: &str = "THREADSTORE_TEST_REDIS_URL";

/// Skips the test when Redis is not configured.
macro_rules! require_redis {
    () => {
        match env::var(REDIS_URL_ENV).ok() {
            Some(url) => url,
            None => {
                eprintln!("Skipping test: {REDIS_URL_ENV} not set.");
                return;
            },
        }
    };
}

fn unique_collection() -> String {
    format!("test_threads_{}", uuid::Uuid::new_v4().simple())
}

fn thread(thread_ts: &str, head: &str) -> Properties {
    let value = json!({ "thread_ts": thread_ts, "channel_id": "C1", "head": head });
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[test]
fn test_store_retrieve_update_delete() {
    let url = require_redis!();
    let store = ThreadStore::connect(RedisConnector::new(url), None).expect("connect failed");
    let collection = unique_collection();

    let records = vec![
        thread("1718000000.000100", "rotate the api key"),
        thread("1718000000.000200", "deploy failed"),
        thread("1719999999.000100", "migration stuck"),
    ];
    let vectors = vec![
        vec![1.0, 0.0, 0.0],
        vec![0.0, 1.0, 0.0],
        vec![0.0, 0.0, 1.0],
    ];
    let StoreStatus::Stored { ids, count } = store
        .store(&records, &collection, EmbeddingSource::External(&vectors))
        .expect("store failed")
    else {
        panic!("store failed");
    };
    assert_eq!(count, 3);
    assert!(
        store
            .list_collection_names()
            .expect("list failed")
            .contains(&collection)
    );

    let hits = store
        .retrieve(
            Query::Vector(&[0.0, 0.99, 0.05]),
            &collection,
            RetrievalOptions::new().with_limit(1).with_certainty_floor(0.9),
        )
        .expect("retrieve failed")
        .expect("expected a hit");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits.best().record.uuid, ids[1]);
    assert_eq!(hits.best().record.properties, records[1]);

    let viewed = store
        .view_contents(&collection)
        .expect("view failed")
        .expect("records present");
    assert_eq!(viewed.len(), 3);

    let deleted = store
        .delete(&collection, None, Some("1718000000"))
        .expect("delete failed");
    assert_eq!(deleted, DeletionStatus::Deleted { count: 2 });

    let remaining = store
        .find_record(&collection, &ids[2])
        .expect("lookup failed")
        .expect("record present");

    // Without an embedder, updates need a text model and are rejected.
    assert!(
        store
            .update(&collection, &remaining, "fixed", "responses")
            .is_err()
    );

    let deleted = store
        .delete(&collection, Some(&ids[2]), None)
        .expect("delete failed");
    assert_eq!(deleted.deleted(), 1);
    assert!(store.view_contents(&collection).expect("view failed").is_none());
}

#[test]
fn test_update_with_embedder() {
    use std::sync::Arc;
    use threadstore::embedding::{EmbeddingModelId, FastEmbedEmbedder};

    let url = require_redis!();
    let embedder = Arc::new(FastEmbedEmbedder::new(EmbeddingModelId::default()));
    let store =
        ThreadStore::connect(RedisConnector::new(url), Some(embedder)).expect("connect failed");
    let collection = unique_collection();

    let StoreStatus::Stored { ids, .. } = store
        .store(
            &[thread("1718000000.000100", "how do I rotate the api key")],
            &collection,
            EmbeddingSource::TextField("head"),
        )
        .expect("store failed")
    else {
        panic!("store failed");
    };
    let original = store
        .find_record(&collection, &ids[0])
        .expect("lookup failed")
        .expect("record present");

    let status = store
        .update(&collection, &original, "Use the vault CLI.", "responses")
        .expect("update failed");
    let UpdateStatus::Updated(replacement) = status else {
        panic!("expected Updated, got {status:?}");
    };
    assert_ne!(replacement.uuid, original.uuid);
    assert!(
        store
            .find_record(&collection, &original.uuid)
            .expect("lookup failed")
            .is_none()
    );

    store
        .delete(&collection, Some(&replacement.uuid), None)
        .expect("cleanup failed");
}
