//! DocumentSynchronizer is the editor view over a single record.
//!
//! Phases:
//!
//! - `Closed` until `open` / `load`.
//! - `Loading` until the first snapshot.
//! - `Ready` while the record exists; the editor buffer holds its fields.
//! - `NavigateAway` when the record is missing or gets deleted. This is not
//!   an error and shows no error modal.
//! - `Failed` when the stream could not be opened, was dropped, or the record
//!   could not be decoded.
//!
//! The buffer is dirty between a local edit and the acknowledgement of the
//! save that carries it. Snapshots refresh the buffer only while it is clean,
//! so in-progress typing is never overwritten by the stream.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::collection::{Doc, Model};
use crate::config::SyncOptions;
use crate::error::{IntentError, LiveDocError, MutationOp, NotFoundError, Result, SubscriptionError};
use crate::store::RemoteStore;
use crate::types::{Fields, Record, Selector, Snapshot};

use super::gateway::{current_runtime, dispatch, MutationGateway, PendingMutation};
use super::status::{SaveStatus, StatusLine};
use super::subscription::SubscriptionManager;

#[derive(Debug, Clone)]
pub enum DocumentPhase {
    Closed,
    Loading,
    Ready,
    /// The record does not exist (any more).
    NavigateAway(NotFoundError),
    Failed(LiveDocError),
}

impl DocumentPhase {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

struct DocState<M> {
    phase: DocumentPhase,
    record_id: Option<String>,
    /// Bumped by `open`, `load` and `close`. Late results of an older
    /// session are ignored.
    session: u64,
    current: Option<Doc<M>>,
    buffer: Fields,
    /// Fields edited since the last acknowledged save.
    dirty: BTreeSet<String>,
    /// Bumped by every `content_changed`.
    edits: u64,
    autosave: Option<JoinHandle<()>>,
}

impl<M> DocState<M> {
    fn cancel_autosave(&mut self) {
        if let Some(task) = self.autosave.take() {
            task.abort();
        }
    }
}

struct Inner<M: Model> {
    store: Arc<dyn RemoteStore>,
    subscription: SubscriptionManager,
    gateway: MutationGateway,
    status: StatusLine,
    autosave_after: Option<Duration>,
    state: Mutex<DocState<M>>,
}

pub struct DocumentSynchronizer<M: Model> {
    inner: Arc<Inner<M>>,
}

impl<M: Model> DocumentSynchronizer<M> {
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        let options = options.resolve();
        Self {
            inner: Arc::new(Inner {
                subscription: SubscriptionManager::new(Arc::clone(&store)),
                gateway: MutationGateway::new(Arc::clone(&store), options.clock),
                store,
                status: StatusLine::new(options.status_clear_after),
                autosave_after: options.autosave_after,
                state: Mutex::new(DocState {
                    phase: DocumentPhase::Closed,
                    record_id: None,
                    session: 0,
                    current: None,
                    buffer: Fields::new(),
                    dirty: BTreeSet::new(),
                    edits: 0,
                    autosave: None,
                }),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Follow record `id` live.
    pub fn open(&self, id: &str) -> Result<(), LiveDocError> {
        let session = self.inner.begin_session(id);

        let weak = Arc::downgrade(&self.inner);
        let on_snapshot = {
            let weak = Weak::clone(&weak);
            Arc::new(move |snapshot: Snapshot| {
                if let Some(inner) = weak.upgrade() {
                    if let Snapshot::Document(record) = snapshot {
                        inner.apply(session, record);
                    }
                }
            })
        };
        let on_error = Arc::new(move |err: SubscriptionError| {
            if let Some(inner) = weak.upgrade() {
                inner.fail(session, LiveDocError::Subscription(err));
            }
        });

        self.inner
            .subscription
            .open(Selector::document(&M::def().name, id), on_snapshot, on_error)
            .map(|_| ())
            .map_err(|e| {
                let e = LiveDocError::Subscription(e);
                self.inner.fail(session, e.clone());
                e
            })
    }

    /// Read record `id` once, without following later changes.
    pub async fn load(&self, id: &str) -> Result<DocumentPhase, LiveDocError> {
        let session = self.inner.begin_session(id);
        match self.inner.store.get_record(&M::def().name, id).await {
            Ok(record) => {
                self.inner.apply(session, record);
                Ok(self.phase())
            }
            Err(e) => {
                let e = LiveDocError::Store(e);
                self.inner.fail(session, e.clone());
                Err(e)
            }
        }
    }

    /// Stop following the record and drop the buffer and any pending
    /// autosave.
    pub fn close(&self) {
        self.inner.subscription.close();
        self.inner.status.reset();
        let mut st = self.inner.state.lock();
        st.session += 1;
        st.cancel_autosave();
        st.phase = DocumentPhase::Closed;
        st.record_id = None;
        st.current = None;
        st.buffer.clear();
        st.dirty.clear();
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn phase(&self) -> DocumentPhase {
        self.inner.state.lock().phase.clone()
    }

    pub fn record_id(&self) -> Option<String> {
        self.inner.state.lock().record_id.clone()
    }

    /// The record as last delivered by the store.
    pub fn current(&self) -> Option<Doc<M>> {
        self.inner.state.lock().current.clone()
    }

    /// The editor's field values.
    pub fn buffer(&self) -> Fields {
        self.inner.state.lock().buffer.clone()
    }

    pub fn is_dirty(&self) -> bool {
        !self.inner.state.lock().dirty.is_empty()
    }

    pub fn status(&self) -> SaveStatus {
        self.inner.status.get()
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// The editor reported new content for `field`.
    ///
    /// Outside a tokio runtime the edit is kept but autosave is not armed;
    /// an explicit [`save`](Self::save) then reports the missing runtime.
    pub fn content_changed(&self, field: &str, value: impl Into<Value>) -> Result<(), IntentError> {
        let def = M::def();
        if !def.is_user_field(field) {
            return Err(IntentError::UnknownField {
                collection: def.name.clone(),
                field: field.to_string(),
            });
        }

        let mut st = self.inner.state.lock();
        if !st.phase.is_ready() {
            return Err(IntentError::NotReady);
        }
        st.buffer.insert(field.to_string(), value.into());
        st.dirty.insert(field.to_string());
        st.edits += 1;

        if let Some(after) = self.inner.autosave_after {
            st.cancel_autosave();
            let Ok(runtime) = Handle::try_current() else {
                tracing::warn!(collection = %def.name, "no tokio runtime, autosave not armed");
                return Ok(());
            };
            let weak = Arc::downgrade(&self.inner);
            let edits = st.edits;
            st.autosave = Some(runtime.spawn(async move {
                tokio::time::sleep(after).await;
                let Some(inner) = weak.upgrade() else { return };
                if inner.state.lock().edits != edits {
                    return;
                }
                if let Err(e) = inner.save() {
                    tracing::warn!(collection = %M::def().name, error = %e, "autosave not issued");
                }
            }));
        }
        Ok(())
    }

    /// Send the edited fields (every field when nothing was edited).
    pub fn save(&self) -> Result<PendingMutation<()>> {
        self.inner.save()
    }
}

impl<M: Model> Drop for DocumentSynchronizer<M> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<M: Model> Inner<M> {
    /// Reset to `Loading` for `id` and return the new session.
    fn begin_session(&self, id: &str) -> u64 {
        self.subscription.close();
        self.status.reset();
        let mut st = self.state.lock();
        st.session += 1;
        st.cancel_autosave();
        st.phase = DocumentPhase::Loading;
        st.record_id = Some(id.to_string());
        st.current = None;
        st.buffer.clear();
        st.dirty.clear();
        st.session
    }

    fn apply(&self, session: u64, record: Option<Record>) {
        let mut st = self.state.lock();
        if st.session != session {
            return;
        }
        let Some(record) = record else {
            let missing = NotFoundError {
                collection: M::def().name.clone(),
                id: st.record_id.clone().unwrap_or_default(),
            };
            tracing::debug!(error = %missing, "navigating away");
            st.cancel_autosave();
            st.phase = DocumentPhase::NavigateAway(missing);
            st.current = None;
            st.dirty.clear();
            return;
        };

        match Doc::<M>::decode(&record) {
            Ok(doc) => {
                if st.dirty.is_empty() {
                    st.buffer = doc.user_fields();
                }
                st.current = Some(doc);
                st.phase = DocumentPhase::Ready;
            }
            Err(e) => {
                tracing::warn!(collection = %M::def().name, id = %record.id, error = %e, "record could not be decoded");
                st.phase = DocumentPhase::Failed(e);
            }
        }
    }

    fn fail(&self, session: u64, error: LiveDocError) {
        let mut st = self.state.lock();
        if st.session != session {
            return;
        }
        st.cancel_autosave();
        st.phase = DocumentPhase::Failed(error);
    }

    fn save(self: &Arc<Self>) -> Result<PendingMutation<()>> {
        let def = M::def();
        let (id, payload, edits, session, runtime) = {
            let st = self.state.lock();
            if !st.phase.is_ready() {
                return Err(IntentError::NotReady.into());
            }
            let id = st.record_id.clone().ok_or(IntentError::NotReady)?;
            let fields: Fields = if st.dirty.is_empty() {
                st.buffer.clone()
            } else {
                st.buffer
                    .iter()
                    .filter(|(k, _)| st.dirty.contains(*k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            };
            let payload = self.gateway.prepare_update(def, fields)?;
            let runtime = current_runtime(MutationOp::Update, &def.name)?;
            (id, payload, st.edits, st.session, runtime)
        };

        let epoch = self.status.epoch();
        self.status.show(epoch, SaveStatus::Saving);

        let inner = Arc::downgrade(self);
        let gateway = self.gateway.clone();
        let collection = def.name.clone();
        Ok(dispatch(&runtime, MutationOp::Update, &def.name, async move {
            let result = gateway.send_update(&collection, &id, payload).await;
            if let Some(inner) = inner.upgrade() {
                match &result {
                    Ok(()) => {
                        {
                            let mut st = inner.state.lock();
                            if st.session == session && st.edits == edits {
                                st.dirty.clear();
                            }
                        }
                        inner.status.show(epoch, SaveStatus::Synced);
                    }
                    Err(e) => {
                        inner.status.show(epoch, SaveStatus::Failed(e.to_string()));
                    }
                }
            }
            result
        }))
    }
}
