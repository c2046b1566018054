//! End-to-end flows through the plan editor.

use std::sync::Arc;

use serde_json::json;

use livedoc::collection::{Plan, Todo};
use livedoc::config::{FixedClock, SyncOptions};
use livedoc::store::{MemoryStore, StoreOp};
use livedoc::sync::{CollectionSynchronizer, DocumentPhase, DocumentSynchronizer, SaveStatus};
use livedoc::types::Record;

const NOW: &str = "2024-03-01T09:00:00.000Z";

fn options() -> SyncOptions {
    SyncOptions::default().with_clock(FixedClock::new(NOW))
}

#[tokio::test]
async fn opening_a_missing_plan() {
    let store = Arc::new(MemoryStore::new());
    let editor: DocumentSynchronizer<Plan> = DocumentSynchronizer::new(store.clone(), options());

    let opened = editor.open("missing");

    assert!(opened.is_ok(), "a missing plan is not an error");
    assert!(matches!(editor.phase(), DocumentPhase::NavigateAway(_)));
    assert_eq!(editor.status(), SaveStatus::Idle);
}

#[tokio::test]
async fn editing_a_plan_while_the_list_watches() {
    let store = Arc::new(MemoryStore::sequential("p"));
    let list: CollectionSynchronizer<Plan> = CollectionSynchronizer::new(store.clone(), options());
    list.mount().unwrap();

    list.begin_create().unwrap();
    list.set_field("title", "Q3 roadmap").unwrap();
    list.commit().unwrap().outcome().await.unwrap();
    let id = list.records()[0].id.clone();

    let editor: DocumentSynchronizer<Plan> = DocumentSynchronizer::new(store.clone(), options());
    editor.open(&id).unwrap();
    assert_eq!(editor.buffer().get("content"), Some(&json!("")));

    editor.content_changed("content", "<h1>Ship</h1>").unwrap();
    editor.save().unwrap().outcome().await.unwrap();

    let listed = &list.records()[0];
    assert_eq!(listed.data.content, "<h1>Ship</h1>");
    assert_eq!(listed.data.updated_at.as_deref(), Some(NOW));

    list.request_delete(&id).unwrap();
    list.confirm_delete().unwrap().outcome().await.unwrap();

    assert!(matches!(editor.phase(), DocumentPhase::NavigateAway(_)));
}

#[tokio::test]
async fn offline_store_leaves_empty_views_with_errors() {
    let store = Arc::new(MemoryStore::new());
    store.set_offline(true);

    let list: CollectionSynchronizer<Todo> = CollectionSynchronizer::new(store.clone(), options());
    assert!(list.mount().is_err());
    assert!(list.records().is_empty());
    assert!(list.subscription_error().is_some());

    let editor: DocumentSynchronizer<Plan> = DocumentSynchronizer::new(store.clone(), options());
    assert!(editor.open("p1").is_err());
    assert!(matches!(editor.phase(), DocumentPhase::Failed(_)));

    store.set_offline(false);
    store.put("todos", Record::from_json("t1", json!({ "text": "a", "completed": false })));
    list.mount().unwrap();
    assert_eq!(list.records().len(), 1);
    assert!(list.subscription_error().is_none());
    assert_eq!(store.call_count(StoreOp::Subscribe), 2);
}
