//! SubscriptionManager tests.
//!
//! Uses a scripted store that keeps every callback it was given, even after
//! unsubscribe, so late deliveries can be simulated.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use livedoc::error::{StoreError, SubscriptionError};
use livedoc::store::{
    CollectionCallback, DocumentCallback, RemoteStore, StoreErrorCallback, Unsubscribe,
};
use livedoc::sync::SubscriptionManager;
use livedoc::types::{Fields, Record, Selector, Snapshot};

// ============================================================================
// Scripted store
// ============================================================================

#[derive(Default)]
struct ScriptedInner {
    collection_callbacks: Vec<(CollectionCallback, StoreErrorCallback)>,
    doc_callbacks: Vec<DocumentCallback>,
    refuse: Option<StoreError>,
}

#[derive(Default)]
struct ScriptedStore {
    inner: Mutex<ScriptedInner>,
    unsubscribed: Arc<AtomicUsize>,
}

impl ScriptedStore {
    /// Deliver to every callback ever registered, closed or not.
    fn emit(&self, records: Vec<Record>) {
        let callbacks: Vec<_> = self
            .inner
            .lock()
            .collection_callbacks
            .iter()
            .map(|(cb, _)| Arc::clone(cb))
            .collect();
        for cb in callbacks {
            cb(records.clone());
        }
    }

    fn emit_doc(&self, record: Option<Record>) {
        let callbacks = self.inner.lock().doc_callbacks.clone();
        for cb in callbacks {
            cb(record.clone());
        }
    }

    fn fail(&self, error: StoreError) {
        let callbacks: Vec<_> = self
            .inner
            .lock()
            .collection_callbacks
            .iter()
            .map(|(_, e)| Arc::clone(e))
            .collect();
        for cb in callbacks {
            cb(error.clone());
        }
    }

    fn unsubscribed(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteStore for ScriptedStore {
    fn subscribe(
        &self,
        _collection: &str,
        on_snapshot: CollectionCallback,
        on_error: StoreErrorCallback,
    ) -> Result<Unsubscribe, StoreError> {
        let mut inner = self.inner.lock();
        if let Some(err) = inner.refuse.clone() {
            return Err(err);
        }
        inner.collection_callbacks.push((on_snapshot, on_error));
        let count = Arc::clone(&self.unsubscribed);
        Ok(Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn subscribe_doc(
        &self,
        _collection: &str,
        _id: &str,
        on_snapshot: DocumentCallback,
        _on_error: StoreErrorCallback,
    ) -> Result<Unsubscribe, StoreError> {
        self.inner.lock().doc_callbacks.push(on_snapshot);
        let count = Arc::clone(&self.unsubscribed);
        Ok(Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        }))
    }

    async fn get_record(&self, _: &str, _: &str) -> Result<Option<Record>, StoreError> {
        Ok(None)
    }

    async fn create_record(&self, _: &str, _: Fields) -> Result<String, StoreError> {
        Err(StoreError::rejected("read-only"))
    }

    async fn update_record(&self, _: &str, _: &str, _: Fields) -> Result<(), StoreError> {
        Err(StoreError::rejected("read-only"))
    }

    async fn delete_record(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::rejected("read-only"))
    }
}

// ============================================================================
// Helpers
// ============================================================================

type Log = Arc<Mutex<Vec<Snapshot>>>;
type Errors = Arc<Mutex<Vec<SubscriptionError>>>;

fn open(manager: &SubscriptionManager, selector: Selector) -> (Log, Errors) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let (l, e) = (Arc::clone(&log), Arc::clone(&errors));
    manager
        .open(
            selector,
            Arc::new(move |s: Snapshot| l.lock().push(s)),
            Arc::new(move |err: SubscriptionError| e.lock().push(err)),
        )
        .unwrap();
    (log, errors)
}

fn note(id: &str) -> Record {
    Record::from_json(id, json!({ "content": id }))
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn snapshots_flow_while_open() {
    let store = Arc::new(ScriptedStore::default());
    let manager = SubscriptionManager::new(store.clone());
    let (log, _) = open(&manager, Selector::collection("notes"));

    store.emit(vec![note("a")]);
    store.emit(vec![note("a"), note("b")]);

    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert_eq!(log[1], Snapshot::Collection(vec![note("a"), note("b")]));
    assert!(manager.is_open());
}

#[test]
fn close_discards_late_snapshots() {
    let store = Arc::new(ScriptedStore::default());
    let manager = SubscriptionManager::new(store.clone());
    let (log, _) = open(&manager, Selector::collection("notes"));

    assert!(manager.close());
    store.emit(vec![note("late")]);

    assert!(log.lock().is_empty());
    assert_eq!(store.unsubscribed(), 1);
    assert!(!manager.is_open());
    assert!(!manager.close(), "second close is a no-op");
}

#[test]
fn reopening_closes_previous_stream() {
    let store = Arc::new(ScriptedStore::default());
    let manager = SubscriptionManager::new(store.clone());
    let (first, _) = open(&manager, Selector::collection("notes"));
    let first_generation = manager.generation().unwrap();
    let (second, _) = open(&manager, Selector::collection("notes"));

    assert_eq!(store.unsubscribed(), 1);
    assert!(manager.generation().unwrap() > first_generation);

    store.emit(vec![note("a")]);

    assert!(first.lock().is_empty(), "old stream must not deliver");
    assert_eq!(second.lock().len(), 1);
}

#[test]
fn document_selector_delivers_document_snapshots() {
    let store = Arc::new(ScriptedStore::default());
    let manager = SubscriptionManager::new(store.clone());
    let (log, _) = open(&manager, Selector::document("plans", "p1"));

    store.emit_doc(None);

    assert_eq!(*log.lock(), vec![Snapshot::Document(None)]);
}

#[test]
fn refused_subscription_is_returned_not_signalled() {
    let store = Arc::new(ScriptedStore::default());
    store.inner.lock().refuse = Some(StoreError::permission_denied("no"));
    let manager = SubscriptionManager::new(store.clone());

    let errors: Errors = Arc::new(Mutex::new(Vec::new()));
    let e = Arc::clone(&errors);
    let result = manager.open(
        Selector::collection("notes"),
        Arc::new(|_: Snapshot| {}),
        Arc::new(move |err: SubscriptionError| e.lock().push(err)),
    );

    match result {
        Err(SubscriptionError::Open { target, .. }) => assert_eq!(target, "notes"),
        other => panic!("expected open error, got {other:?}"),
    }
    assert!(errors.lock().is_empty());
    assert!(!manager.is_open());
}

#[test]
fn stream_error_is_signalled_once_and_stops_delivery() {
    let store = Arc::new(ScriptedStore::default());
    let manager = SubscriptionManager::new(store.clone());
    let (log, errors) = open(&manager, Selector::collection("notes"));

    store.fail(StoreError::unavailable("reset"));
    store.fail(StoreError::unavailable("reset again"));
    store.emit(vec![note("a")]);

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(matches!(&errors[0], SubscriptionError::Dropped { .. }));
    assert!(log.lock().is_empty());
    assert!(!manager.is_open());
}

#[test]
fn drop_closes_the_stream() {
    let store = Arc::new(ScriptedStore::default());
    {
        let manager = SubscriptionManager::new(store.clone());
        let _ = open(&manager, Selector::collection("notes"));
    }
    assert_eq!(store.unsubscribed(), 1);
}

#[test]
fn sink_may_close_its_own_stream() {
    let store = Arc::new(ScriptedStore::default());
    let manager = Arc::new(SubscriptionManager::new(store.clone()));
    let weak = Arc::downgrade(&manager);
    let seen = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&seen);

    manager
        .open(
            Selector::collection("notes"),
            Arc::new(move |_: Snapshot| {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(manager) = weak.upgrade() {
                    manager.close();
                }
            }),
            Arc::new(|_: SubscriptionError| {}),
        )
        .unwrap();

    store.emit(vec![note("a")]);
    store.emit(vec![note("b")]);

    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert!(!manager.is_open());
    assert_eq!(store.unsubscribed(), 1);
}
