//! MemoryStore tests. The in-process `RemoteStore` is the reference
//! collaborator for every synchronizer test.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use livedoc::error::{StoreError, StoreErrorKind};
use livedoc::store::{MemoryStore, RemoteStore, StoreCall, StoreOp, Unsubscribe};
use livedoc::types::{Fields, Record};

fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("fixture must be an object"),
    }
}

type Seen = Arc<Mutex<Vec<Vec<String>>>>;

/// Subscribe to `collection`, collecting every delivered snapshot as a list
/// of ids.
fn watch(store: &MemoryStore, collection: &str) -> (Seen, Unsubscribe) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let unsub = store
        .subscribe(
            collection,
            Arc::new(move |records: Vec<Record>| {
                sink.lock().push(records.into_iter().map(|r| r.id).collect());
            }),
            Arc::new(|_: StoreError| {}),
        )
        .unwrap();
    (seen, unsub)
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn subscribe_delivers_initial_snapshot_synchronously() {
    let store = MemoryStore::new();
    store.put("notes", Record::from_json("a", json!({ "content": "x" })));

    let (seen, _unsub) = watch(&store, "notes");

    assert_eq!(*seen.lock(), vec![vec!["a".to_string()]]);
    assert_eq!(store.listener_count("notes"), 1);
}

#[tokio::test]
async fn every_mutation_fans_out_a_full_snapshot() {
    let store = MemoryStore::sequential("n");
    let (seen, _unsub) = watch(&store, "notes");

    let id = store
        .create_record("notes", fields(json!({ "content": "one" })))
        .await
        .unwrap();
    assert_eq!(id, "n1");
    store
        .create_record("notes", fields(json!({ "content": "two" })))
        .await
        .unwrap();
    store.delete_record("notes", "n1").await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            vec![],
            vec!["n1".to_string()],
            vec!["n1".to_string(), "n2".to_string()],
            vec!["n2".to_string()],
        ]
    );
}

#[tokio::test]
async fn external_writes_reach_listeners_without_being_logged() {
    let store = MemoryStore::new();
    let (seen, _unsub) = watch(&store, "todos");

    store.put("todos", Record::from_json("t1", json!({ "text": "a", "completed": false })));
    store.remove("todos", "t1");

    assert_eq!(seen.lock().len(), 3);
    assert_eq!(store.call_count(StoreOp::Create), 0);
    assert_eq!(store.call_count(StoreOp::Subscribe), 1);
}

#[tokio::test]
async fn unsubscribe_detaches_listener() {
    let store = MemoryStore::new();
    let (seen, unsub) = watch(&store, "notes");
    unsub();

    store.put("notes", Record::from_json("a", json!({ "content": "x" })));

    assert_eq!(seen.lock().len(), 1, "only the initial snapshot");
    assert_eq!(store.listener_count("notes"), 0);
}

#[tokio::test]
async fn document_subscription_reports_missing_record_as_none() {
    let store = MemoryStore::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let _unsub = store
        .subscribe_doc(
            "plans",
            "p1",
            Arc::new(move |record: Option<Record>| sink.lock().push(record.map(|r| r.id))),
            Arc::new(|_: StoreError| {}),
        )
        .unwrap();
    store.put("plans", Record::from_json("p1", json!({ "title": "t", "content": "" })));
    store.remove("plans", "p1");

    assert_eq!(*seen.lock(), vec![None, Some("p1".to_string()), None]);
    assert_eq!(store.doc_listener_count("plans", "p1"), 1);
}

#[tokio::test]
async fn denied_collection_refuses_subscription() {
    let store = MemoryStore::new();
    store.deny("notes");

    let err = store
        .subscribe("notes", Arc::new(|_: Vec<Record>| {}), Arc::new(|_: StoreError| {}))
        .err()
        .unwrap();

    assert_eq!(err.kind, StoreErrorKind::PermissionDenied);
}

#[tokio::test]
async fn drop_subscriptions_reports_error_and_detaches() {
    let store = MemoryStore::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _unsub = store
        .subscribe(
            "notes",
            Arc::new(|_: Vec<Record>| {}),
            Arc::new(move |e: StoreError| sink.lock().push(e.kind)),
        )
        .unwrap();

    store.drop_subscriptions("notes", StoreError::unavailable("connection reset"));

    assert_eq!(*errors.lock(), vec![StoreErrorKind::Unavailable]);
    assert_eq!(store.listener_count("notes"), 0);
}

#[tokio::test]
async fn drop_subscriptions_also_drops_document_streams() {
    let store = MemoryStore::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _unsub = store
        .subscribe_doc(
            "plans",
            "p1",
            Arc::new(|_: Option<Record>| {}),
            Arc::new(move |e: StoreError| sink.lock().push(e.kind)),
        )
        .unwrap();

    store.drop_subscriptions("plans", StoreError::unavailable("connection reset"));

    assert_eq!(*errors.lock(), vec![StoreErrorKind::Unavailable]);
    assert_eq!(store.doc_listener_count("plans", "p1"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_writes_deliver_latest_snapshot_last() {
    for round in 0..20 {
        let store = Arc::new(MemoryStore::new());
        let (seen, _unsub) = watch(&store, "notes");

        let writers: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move {
                    store.put("notes", Record::from_json(format!("n{i}"), json!({ "content": "x" })));
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        let last = seen.lock().last().cloned().unwrap_or_default();
        assert_eq!(last.len(), 64, "round {round}");
    }
}

#[tokio::test]
async fn writes_from_a_listener_are_delivered_after_the_current_round() {
    let store = Arc::new(MemoryStore::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let writer = Arc::clone(&store);
    let log = Arc::clone(&order);
    let _unsub = store
        .subscribe(
            "notes",
            Arc::new(move |records: Vec<Record>| {
                log.lock().push(records.len());
                if records.len() == 1 {
                    writer.put("notes", Record::from_json("b", json!({ "content": "y" })));
                }
            }),
            Arc::new(|_: StoreError| {}),
        )
        .unwrap();

    store.put("notes", Record::from_json("a", json!({ "content": "x" })));

    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

// ============================================================================
// Mutations
// ============================================================================

#[tokio::test]
async fn update_merges_shallowly() {
    let store = MemoryStore::new();
    store.put("todos", Record::from_json("t1", json!({ "text": "a", "completed": false })));

    store
        .update_record("todos", "t1", fields(json!({ "completed": true })))
        .await
        .unwrap();

    let record = store.record("todos", "t1").unwrap();
    assert_eq!(record.get("text"), Some(&json!("a")));
    assert_eq!(record.get("completed"), Some(&json!(true)));
}

#[tokio::test]
async fn update_of_missing_record_is_not_found() {
    let store = MemoryStore::new();
    let err = store
        .update_record("todos", "nope", fields(json!({ "completed": true })))
        .await
        .unwrap_err();
    assert_eq!(err.kind, StoreErrorKind::NotFound);
}

#[tokio::test]
async fn delete_of_missing_record_is_ok() {
    let store = MemoryStore::new();
    assert!(store.delete_record("todos", "nope").await.is_ok());
}

#[tokio::test]
async fn calls_are_logged_in_order() {
    let store = MemoryStore::sequential("t");
    store
        .create_record("todos", fields(json!({ "text": "a", "completed": false })))
        .await
        .unwrap();
    store.get_record("todos", "t1").await.unwrap();
    store.delete_record("todos", "t1").await.unwrap();

    let calls = store.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[0], StoreCall::Create { collection, .. } if collection == "todos"));
    assert!(matches!(&calls[1], StoreCall::Get { id, .. } if id == "t1"));
    assert!(matches!(&calls[2], StoreCall::Delete { id, .. } if id == "t1"));
}

#[tokio::test]
async fn uuid_ids_are_unique() {
    let store = MemoryStore::new();
    let a = store.create_record("notes", Fields::new()).await.unwrap();
    let b = store.create_record("notes", Fields::new()).await.unwrap();
    assert_ne!(a, b);
    assert_eq!(a.len(), 32);
}

// ============================================================================
// Failure injection
// ============================================================================

#[tokio::test]
async fn fail_next_is_consumed_once() {
    let store = MemoryStore::new();
    store.fail_next(StoreOp::Create, StoreError::rejected("quota"));

    let first = store.create_record("notes", Fields::new()).await;
    let second = store.create_record("notes", Fields::new()).await;

    assert_eq!(first.unwrap_err().kind, StoreErrorKind::Rejected);
    assert!(second.is_ok());
    assert_eq!(store.records("notes").len(), 1);
}

#[tokio::test]
async fn offline_store_fails_every_call() {
    let store = MemoryStore::new();
    store.set_offline(true);

    assert_eq!(
        store.get_record("notes", "a").await.unwrap_err().kind,
        StoreErrorKind::Unavailable
    );
    assert!(store
        .subscribe("notes", Arc::new(|_: Vec<Record>| {}), Arc::new(|_: StoreError| {}))
        .is_err());

    store.set_offline(false);
    assert!(store.get_record("notes", "a").await.is_ok());
}

#[tokio::test]
async fn pause_holds_mutations_until_resume() {
    let store = Arc::new(MemoryStore::sequential("n"));
    store.pause();

    let task = {
        let store = Arc::clone(&store);
        tokio::spawn(async move { store.create_record("notes", Fields::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!task.is_finished());
    assert_eq!(store.call_count(StoreOp::Create), 1, "the call is logged on issue");
    assert!(store.records("notes").is_empty());

    store.resume();
    assert_eq!(task.await.unwrap().unwrap(), "n1");
    assert_eq!(store.records("notes").len(), 1);
}
