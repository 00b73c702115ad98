mod helpers;

use std::sync::Arc;

use helpers::{test_service, KeywordEmbedder};
use mnemos::error::StoreError;
use serde_json::json;

#[tokio::test]
async fn every_value_type_round_trips() {
    let svc = test_service(None);
    let values = [
        json!("plain text"),
        json!("42"),
        json!(42),
        json!(-3.25),
        json!(true),
        json!(null),
        json!([1, "two", {"three": 3}]),
        json!({"nested": {"list": [true, null]}, "n": 1.5}),
    ];

    for (i, value) in values.iter().enumerate() {
        let key = format!("k{i}");
        svc.store("types", &key, value.clone()).await.unwrap();
        let item = svc.retrieve("types", &key).await.unwrap().unwrap();
        assert_eq!(&item.value, value, "value type changed for {key}");
    }
}

#[tokio::test]
async fn store_update_conflict_scenario() {
    let svc = test_service(None);

    let first = svc.store("ns", "k", json!("v1")).await.unwrap();
    assert!(first.created);

    let err = svc.store("ns", "k", json!("v2")).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    assert_eq!(svc.retrieve("ns", "k").await.unwrap().unwrap().value, json!("v1"));

    let updated = svc.update("ns", "k", json!("v3")).await.unwrap();
    assert!(!updated.created);
    assert_eq!(updated.item.created_at, first.item.created_at);

    let err = svc.update("ns", "absent", json!("v4")).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    assert!(svc.retrieve("ns", "absent").await.unwrap().is_none());
}

#[tokio::test]
async fn put_inserts_then_overwrites() {
    let svc = test_service(None);
    assert!(svc.put("ns", "k", json!(1)).await.unwrap().created);
    assert!(!svc.put("ns", "k", json!(2)).await.unwrap().created);
    assert_eq!(svc.retrieve("ns", "k").await.unwrap().unwrap().value, json!(2));
}

#[tokio::test]
async fn namespace_creation_is_idempotent() {
    let svc = test_service(None);
    assert!(svc.create_namespace("alpha").await.unwrap());
    assert!(!svc.create_namespace("alpha").await.unwrap());
    assert_eq!(svc.list_namespaces().await.unwrap(), vec!["alpha"]);
}

#[tokio::test]
async fn store_creates_namespace_implicitly() {
    let svc = test_service(None);
    svc.store("beta", "k", json!("x")).await.unwrap();
    svc.store("alpha", "k", json!("x")).await.unwrap();
    assert_eq!(svc.list_namespaces().await.unwrap(), vec!["alpha", "beta"]);
}

#[tokio::test]
async fn deleting_a_namespace_cascades() {
    let svc = test_service(Some(Arc::new(KeywordEmbedder::default())));
    svc.store("pets", "a", json!("a cat")).await.unwrap();
    svc.store("pets", "b", json!("a dog")).await.unwrap();
    svc.store("drinks", "c", json!("coffee")).await.unwrap();

    assert!(svc.delete_namespace("pets").await.unwrap());
    assert!(!svc.delete_namespace("pets").await.unwrap());

    assert!(svc.retrieve("pets", "a").await.unwrap().is_none());
    assert!(svc.list_keys("pets").await.unwrap().is_empty());
    assert!(svc.semantic_search("pets", "cat", None, None).await.unwrap().is_empty());

    let stats = svc.stats().await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].namespace, "drinks");
    assert_eq!(stats[0].chunks, 1);
}

#[tokio::test]
async fn delete_item_reports_existence() {
    let svc = test_service(Some(Arc::new(KeywordEmbedder::default())));
    svc.store("ns", "k", json!("rain")).await.unwrap();
    assert!(svc.delete("ns", "k").await.unwrap());
    assert!(!svc.delete("ns", "k").await.unwrap());
    assert_eq!(svc.stats().await.unwrap()[0].chunks, 0);
}

#[tokio::test]
async fn keys_list_in_order_with_timestamps() {
    let svc = test_service(None);
    for key in ["zeta", "alpha", "mid"] {
        svc.store("ns", key, json!(key)).await.unwrap();
    }
    let keys = svc.list_keys("ns").await.unwrap();
    let names: Vec<&str> = keys.iter().map(|k| k.key.as_str()).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    assert!(keys.iter().all(|k| !k.created_at.is_empty() && k.created_at == k.updated_at));
}

#[tokio::test]
async fn blank_names_are_rejected() {
    let svc = test_service(None);
    assert!(matches!(svc.store("", "k", json!(1)).await, Err(StoreError::Validation(_))));
    assert!(matches!(svc.store("ns", "  ", json!(1)).await, Err(StoreError::Validation(_))));
    assert!(matches!(svc.create_namespace("").await, Err(StoreError::Validation(_))));
    assert!(svc.list_namespaces().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_creates_of_one_key_admit_exactly_one() {
    let svc = Arc::new(test_service(None));
    let mut handles = Vec::new();
    for i in 0..8 {
        let svc = Arc::clone(&svc);
        handles.push(tokio::spawn(async move { svc.store("race", "k", json!(i)).await }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(StoreError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((created, conflicts), (1, 7));
}
