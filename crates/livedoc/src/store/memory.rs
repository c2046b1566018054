//! `MemoryStore`: an in-process [`RemoteStore`].
//!
//! Collections keep records in arrival order. Every mutation queues a fresh
//! snapshot for the listeners of the touched collection and document while
//! the state lock is held, so the outbox is always in mutation order. One
//! thread at a time drains it; a mutation returns after its snapshot was
//! delivered, unless another thread is already draining, in which case that
//! thread delivers it. No lock is held while listeners run.
//!
//! The store doubles as a controllable test collaborator: calls are logged,
//! failures can be queued per operation, the whole store can be taken
//! offline, and mutation calls can be held pending behind a pause gate.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::StoreError;
use crate::types::{Fields, Record};

use super::listeners::{ListenerId, Listeners};
use super::traits::{
    CollectionCallback, DocumentCallback, RemoteStore, StoreErrorCallback, Unsubscribe,
};

// ============================================================================
// Call log / failure injection types
// ============================================================================

/// Store operations that can be logged or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Subscribe,
    SubscribeDoc,
    Get,
    Create,
    Update,
    Delete,
}

/// A logged call against the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Subscribe {
        collection: String,
    },
    SubscribeDoc {
        collection: String,
        id: String,
    },
    Get {
        collection: String,
        id: String,
    },
    Create {
        collection: String,
        fields: Fields,
    },
    Update {
        collection: String,
        id: String,
        fields: Fields,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// How the store assigns record ids.
#[derive(Debug, Clone)]
pub enum IdStrategy {
    /// Random UUID v4 (simple form).
    Uuid,
    /// `prefix` followed by a counter starting at 1: `n1`, `n2`, ...
    Sequential { prefix: String },
}

// ============================================================================
// Internal state
// ============================================================================

type DocKey = (String, String);

/// A queued listener call, run outside the state lock.
type Delivery = Box<dyn FnOnce() + Send>;

struct MemoryState {
    collections: HashMap<String, Vec<Record>>,
    collection_listeners: HashMap<String, Arc<Listeners<Vec<Record>>>>,
    doc_listeners: HashMap<DocKey, Arc<Listeners<Option<Record>>>>,
    /// Error callbacks per collection listener, used by `drop_subscriptions`.
    error_callbacks: HashMap<String, Vec<(ListenerId, StoreErrorCallback)>>,
    doc_error_callbacks: HashMap<DocKey, Vec<(ListenerId, StoreErrorCallback)>>,
    outbox: VecDeque<Delivery>,
    /// A thread is running deliveries from `outbox`.
    draining: bool,
    calls: Vec<StoreCall>,
    failures: HashMap<StoreOp, VecDeque<StoreError>>,
    denied: Vec<String>,
    offline: bool,
    id_strategy: IdStrategy,
    next_seq: u64,
}

impl MemoryState {
    fn take_failure(&mut self, op: StoreOp) -> Option<StoreError> {
        if self.offline {
            return Some(StoreError::unavailable("store is offline"));
        }
        self.failures.get_mut(&op).and_then(|q| q.pop_front())
    }

    fn next_id(&mut self) -> String {
        match &self.id_strategy {
            IdStrategy::Uuid => uuid::Uuid::new_v4().simple().to_string(),
            IdStrategy::Sequential { prefix } => {
                self.next_seq += 1;
                format!("{prefix}{}", self.next_seq)
            }
        }
    }

    fn find(&self, collection: &str, id: &str) -> Option<Record> {
        self.collections
            .get(collection)
            .and_then(|recs| recs.iter().find(|r| r.id == id))
            .cloned()
    }

    /// Queue the current snapshots of `collection` and `id` for their
    /// listeners.
    fn post_fanout(&mut self, collection: &str, id: &str) {
        if let Some(listeners) = self.collection_listeners.get(collection).cloned() {
            let records = self.collections.get(collection).cloned().unwrap_or_default();
            self.outbox.push_back(Box::new(move || {
                listeners.deliver(&records);
            }));
        }
        let key = (collection.to_string(), id.to_string());
        if let Some(listeners) = self.doc_listeners.get(&key).cloned() {
            let record = self.find(collection, id);
            self.outbox.push_back(Box::new(move || {
                listeners.deliver(&record);
            }));
        }
    }

    fn begin_drain(&mut self) -> bool {
        !std::mem::replace(&mut self.draining, true)
    }

    fn next_delivery(&mut self) -> Option<Delivery> {
        let next = self.outbox.pop_front();
        if next.is_none() {
            self.draining = false;
        }
        next
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    paused: watch::Sender<bool>,
}

impl MemoryStore {
    /// Empty store assigning UUID ids.
    pub fn new() -> Self {
        Self::with_ids(IdStrategy::Uuid)
    }

    /// Empty store assigning `prefix1`, `prefix2`, ...
    pub fn sequential(prefix: impl Into<String>) -> Self {
        Self::with_ids(IdStrategy::Sequential {
            prefix: prefix.into(),
        })
    }

    pub fn with_ids(id_strategy: IdStrategy) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                collections: HashMap::new(),
                collection_listeners: HashMap::new(),
                doc_listeners: HashMap::new(),
                error_callbacks: HashMap::new(),
                doc_error_callbacks: HashMap::new(),
                outbox: VecDeque::new(),
                draining: false,
                calls: Vec::new(),
                failures: HashMap::new(),
                denied: Vec::new(),
                offline: false,
                id_strategy,
                next_seq: 0,
            })),
            paused,
        }
    }

    // -----------------------------------------------------------------------
    // Direct writes (another client writing to the store)
    // -----------------------------------------------------------------------

    /// Insert or replace a record as an external writer would, notifying
    /// listeners. Not logged as a client call.
    pub fn put(&self, collection: &str, record: Record) {
        {
            let mut st = self.state.lock();
            let id = record.id.clone();
            let recs = st.collections.entry(collection.to_string()).or_default();
            match recs.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record,
                None => recs.push(record),
            }
            st.post_fanout(collection, &id);
        }
        self.flush();
    }

    /// Remove a record as an external writer would.
    pub fn remove(&self, collection: &str, id: &str) {
        {
            let mut st = self.state.lock();
            if let Some(recs) = st.collections.get_mut(collection) {
                recs.retain(|r| r.id != id);
            }
            st.post_fanout(collection, id);
        }
        self.flush();
    }

    /// Current records of a collection, in arrival order.
    pub fn records(&self, collection: &str) -> Vec<Record> {
        self.state
            .lock()
            .collections
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn record(&self, collection: &str, id: &str) -> Option<Record> {
        self.state.lock().find(collection, id)
    }

    // -----------------------------------------------------------------------
    // Test controls
    // -----------------------------------------------------------------------

    /// Every client call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state.lock().calls.clone()
    }

    /// Number of logged calls of one operation kind.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| call_op(c) == op)
            .count()
    }

    /// Make the next call of `op` fail with `error`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: StoreOp, error: StoreError) {
        self.state
            .lock()
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Refuse subscriptions to `collection` with a permission error.
    pub fn deny(&self, collection: &str) {
        self.state.lock().denied.push(collection.to_string());
    }

    /// While offline every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Hold create/update/delete calls pending until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// Simulate the store dropping every live stream on `collection`,
    /// document streams included. Listeners receive `error` and are detached.
    pub fn drop_subscriptions(&self, collection: &str, error: StoreError) {
        {
            let mut st = self.state.lock();
            if let Some(listeners) = st.collection_listeners.remove(collection) {
                listeners.clear();
            }
            let mut callbacks = st.error_callbacks.remove(collection).unwrap_or_default();

            let doc_keys: Vec<DocKey> = st
                .doc_listeners
                .keys()
                .filter(|(c, _)| c == collection)
                .cloned()
                .collect();
            for key in doc_keys {
                if let Some(listeners) = st.doc_listeners.remove(&key) {
                    listeners.clear();
                }
                callbacks.extend(st.doc_error_callbacks.remove(&key).unwrap_or_default());
            }

            for (_, cb) in callbacks {
                let error = error.clone();
                st.outbox.push_back(Box::new(move || cb(error)));
            }
        }
        self.flush();
    }

    /// Number of live listeners on a collection (document listeners not
    /// included).
    pub fn listener_count(&self, collection: &str) -> usize {
        self.state
            .lock()
            .collection_listeners
            .get(collection)
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Number of live listeners on one document.
    pub fn doc_listener_count(&self, collection: &str, id: &str) -> usize {
        self.state
            .lock()
            .doc_listeners
            .get(&(collection.to_string(), id.to_string()))
            .map(|l| l.len())
            .unwrap_or(0)
    }

    /// Run queued deliveries until the outbox is empty. Returns at once if
    /// another call is already draining; that call picks up what we queued.
    fn flush(&self) {
        if !self.state.lock().begin_drain() {
            return;
        }
        loop {
            let next = self.state.lock().next_delivery();
            match next {
                Some(delivery) => delivery(),
                None => return,
            }
        }
    }

    async fn wait_unpaused(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives as long as `self`, so this only fails on drop.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn call_op(call: &StoreCall) -> StoreOp {
    match call {
        StoreCall::Subscribe { .. } => StoreOp::Subscribe,
        StoreCall::SubscribeDoc { .. } => StoreOp::SubscribeDoc,
        StoreCall::Get { .. } => StoreOp::Get,
        StoreCall::Create { .. } => StoreOp::Create,
        StoreCall::Update { .. } => StoreOp::Update,
        StoreCall::Delete { .. } => StoreOp::Delete,
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn subscribe(
        &self,
        collection: &str,
        on_snapshot: CollectionCallback,
        on_error: StoreErrorCallback,
    ) -> Result<Unsubscribe, StoreError> {
        let (listeners, listener_id) = {
            let mut st = self.state.lock();
            st.calls.push(StoreCall::Subscribe {
                collection: collection.to_string(),
            });
            if st.denied.iter().any(|c| c == collection) {
                return Err(StoreError::permission_denied(format!(
                    "read access to \"{collection}\" denied"
                )));
            }
            if let Some(err) = st.take_failure(StoreOp::Subscribe) {
                return Err(err);
            }
            let listeners = Arc::clone(
                st.collection_listeners
                    .entry(collection.to_string())
                    .or_default(),
            );
            let listener_id = listeners.add(move |records: &Vec<Record>| {
                on_snapshot(records.clone());
            });
            st.error_callbacks
                .entry(collection.to_string())
                .or_default()
                .push((listener_id, on_error));
            let initial = st.collections.get(collection).cloned().unwrap_or_default();
            let target = Arc::clone(&listeners);
            st.outbox.push_back(Box::new(move || {
                target.deliver_to(listener_id, &initial);
            }));
            (listeners, listener_id)
        };
        self.flush();

        let state = Arc::clone(&self.state);
        let collection = collection.to_string();
        Ok(Box::new(move || {
            listeners.remove(listener_id);
            let mut st = state.lock();
            if let Some(cbs) = st.error_callbacks.get_mut(&collection) {
                cbs.retain(|(id, _)| *id != listener_id);
            }
        }))
    }

    fn subscribe_doc(
        &self,
        collection: &str,
        id: &str,
        on_snapshot: DocumentCallback,
        on_error: StoreErrorCallback,
    ) -> Result<Unsubscribe, StoreError> {
        let key: DocKey = (collection.to_string(), id.to_string());
        let (listeners, listener_id) = {
            let mut st = self.state.lock();
            st.calls.push(StoreCall::SubscribeDoc {
                collection: collection.to_string(),
                id: id.to_string(),
            });
            if st.denied.iter().any(|c| c == collection) {
                return Err(StoreError::permission_denied(format!(
                    "read access to \"{collection}/{id}\" denied"
                )));
            }
            if let Some(err) = st.take_failure(StoreOp::SubscribeDoc) {
                return Err(err);
            }
            let listeners = Arc::clone(st.doc_listeners.entry(key.clone()).or_default());
            let listener_id = listeners.add(move |record: &Option<Record>| {
                on_snapshot(record.clone());
            });
            st.doc_error_callbacks
                .entry(key.clone())
                .or_default()
                .push((listener_id, on_error));
            let initial = st.find(collection, id);
            let target = Arc::clone(&listeners);
            st.outbox.push_back(Box::new(move || {
                target.deliver_to(listener_id, &initial);
            }));
            (listeners, listener_id)
        };
        self.flush();

        let state = Arc::clone(&self.state);
        Ok(Box::new(move || {
            listeners.remove(listener_id);
            let mut st = state.lock();
            if let Some(cbs) = st.doc_error_callbacks.get_mut(&key) {
                cbs.retain(|(id, _)| *id != listener_id);
            }
        }))
    }

    async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError> {
        let mut st = self.state.lock();
        st.calls.push(StoreCall::Get {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        if let Some(err) = st.take_failure(StoreOp::Get) {
            return Err(err);
        }
        Ok(st.find(collection, id))
    }

    async fn create_record(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.state.lock().calls.push(StoreCall::Create {
            collection: collection.to_string(),
            fields: fields.clone(),
        });
        self.wait_unpaused().await;

        let id = {
            let mut st = self.state.lock();
            if let Some(err) = st.take_failure(StoreOp::Create) {
                return Err(err);
            }
            let id = st.next_id();
            st.collections
                .entry(collection.to_string())
                .or_default()
                .push(Record::new(id.clone(), fields));
            st.post_fanout(collection, &id);
            id
        };
        self.flush();
        Ok(id)
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError> {
        self.state.lock().calls.push(StoreCall::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            fields: fields.clone(),
        });
        self.wait_unpaused().await;

        {
            let mut st = self.state.lock();
            if let Some(err) = st.take_failure(StoreOp::Update) {
                return Err(err);
            }
            let record = st
                .collections
                .get_mut(collection)
                .and_then(|recs| recs.iter_mut().find(|r| r.id == id))
                .ok_or_else(|| StoreError::not_found(collection, id))?;
            for (k, v) in fields {
                record.fields.insert(k, v);
            }
            st.post_fanout(collection, id);
        }
        self.flush();
        Ok(())
    }

    async fn delete_record(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.state.lock().calls.push(StoreCall::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        });
        self.wait_unpaused().await;

        {
            let mut st = self.state.lock();
            if let Some(err) = st.take_failure(StoreOp::Delete) {
                return Err(err);
            }
            if let Some(recs) = st.collections.get_mut(collection) {
                recs.retain(|r| r.id != id);
            }
            st.post_fanout(collection, id);
        }
        self.flush();
        Ok(())
    }
}
