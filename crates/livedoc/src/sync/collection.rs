//! CollectionSynchronizer is a live list view over one collection.
//!
//! Wires the four primitives together: the subscription feeds the
//! projection, UI triggers go through the intent controller, and commits and
//! deletes leave through the mutation gateway. Local writes never touch the
//! projection; the change stream brings them back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::collection::{Doc, Model};
use crate::config::SyncOptions;
use crate::error::{IntentError, MutationError, MutationOp, Result, SubscriptionError};
use crate::schema::SchemaNode;
use crate::store::{ListenerId, RemoteStore};
use crate::types::{Fields, Selector, Snapshot};

use super::gateway::{current_runtime, dispatch, MutationGateway, PendingMutation};
use super::intent::{DraftTarget, IntentController, IntentState};
use super::projection::{Projection, ProjectionStore};
use super::status::{SaveStatus, StatusLine};
use super::subscription::SubscriptionManager;

/// What a committed draft turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Created(String),
    Updated,
}

pub struct CollectionSynchronizer<M: Model> {
    subscription: SubscriptionManager,
    projection: Arc<ProjectionStore<M>>,
    intent: Mutex<IntentController>,
    gateway: MutationGateway,
    status: StatusLine,
    subscription_error: Arc<Mutex<Option<SubscriptionError>>>,
    mounted: AtomicBool,
}

impl<M: Model> CollectionSynchronizer<M> {
    pub fn new(store: Arc<dyn RemoteStore>, options: SyncOptions) -> Self {
        let options = options.resolve();
        Self {
            subscription: SubscriptionManager::new(Arc::clone(&store)),
            projection: Arc::new(ProjectionStore::new()),
            intent: Mutex::new(IntentController::new(M::def())),
            gateway: MutationGateway::new(store, options.clock),
            status: StatusLine::new(options.status_clear_after),
            subscription_error: Arc::new(Mutex::new(None)),
            mounted: AtomicBool::new(false),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start streaming the collection into the projection.
    ///
    /// A failed subscription is also kept in
    /// [`subscription_error`](Self::subscription_error); the view stays
    /// mounted with whatever the projection last held.
    pub fn mount(&self) -> Result<(), SubscriptionError> {
        self.mounted.store(true, Ordering::SeqCst);
        *self.subscription_error.lock() = None;

        let projection = Arc::clone(&self.projection);
        let error_slot = Arc::clone(&self.subscription_error);
        let opened = self.subscription.open(
            Selector::collection(&M::def().name),
            Arc::new(move |snapshot: Snapshot| {
                projection.replace(snapshot);
            }),
            Arc::new(move |err: SubscriptionError| {
                *error_slot.lock() = Some(err);
            }),
        );

        match opened {
            Ok(_) => Ok(()),
            Err(e) => {
                *self.subscription_error.lock() = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Close the stream and drop any intent. Mutations still in flight
    /// complete, but their outcome no longer reaches the status line.
    pub fn unmount(&self) {
        if !self.mounted.swap(false, Ordering::SeqCst) {
            return;
        }
        self.subscription.close();
        self.intent.lock().reset();
        self.status.reset();
        tracing::debug!(collection = %M::def().name, "view unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Records of the last snapshot.
    pub fn records(&self) -> Vec<Doc<M>> {
        self.projection.read().records.clone()
    }

    pub fn projection(&self) -> Arc<Projection<M>> {
        self.projection.read()
    }

    /// Render hook, called after every snapshot.
    pub fn on_change(
        &self,
        callback: impl Fn(&Arc<Projection<M>>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.projection.on_change(callback)
    }

    pub fn off_change(&self, id: ListenerId) -> bool {
        self.projection.off(id)
    }

    pub fn intent(&self) -> IntentState {
        self.intent.lock().state().clone()
    }

    pub fn status(&self) -> SaveStatus {
        self.status.get()
    }

    /// Set while the stream is down; cleared by the next `mount`.
    pub fn subscription_error(&self) -> Option<SubscriptionError> {
        self.subscription_error.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Compose
    // -----------------------------------------------------------------------

    pub fn begin_create(&self) -> Result<(), IntentError> {
        self.require_mounted()?;
        self.intent.lock().begin_create()
    }

    /// Open the edit draft for a record currently in the projection.
    pub fn begin_edit(&self, id: &str) -> Result<(), IntentError> {
        self.require_mounted()?;
        let doc = self.find(id)?;
        self.intent.lock().begin_edit(id, doc.user_fields())
    }

    pub fn set_field(&self, name: &str, value: impl Into<Value>) -> Result<(), IntentError> {
        self.intent.lock().set_field(name, value.into())
    }

    pub fn can_commit(&self) -> bool {
        self.intent.lock().can_commit()
    }

    pub fn cancel(&self) -> Result<(), IntentError> {
        self.intent.lock().cancel()
    }

    /// Send the draft and return to `Idle` straight away.
    ///
    /// A blank primary field, an invalid payload or a missing runtime is
    /// rejected here, nothing is sent and the draft stays open.
    pub fn commit(&self) -> Result<PendingMutation<CommitOutcome>> {
        self.require_mounted()?;
        let def = M::def();

        let (target, payload, runtime) = {
            let mut intent = self.intent.lock();
            let draft = intent.check_commit()?;
            let (op, payload) = match &draft.target {
                DraftTarget::New => (
                    MutationOp::Create,
                    self.gateway.prepare_create(def, draft.fields.clone())?,
                ),
                DraftTarget::Existing(_) => (
                    MutationOp::Update,
                    self.gateway.prepare_update(def, draft.fields.clone())?,
                ),
            };
            let runtime = current_runtime(op, &def.name)?;
            let draft = intent.take_commit()?;
            (draft.target, payload, runtime)
        };

        let gateway = self.gateway.clone();
        let collection = def.name.clone();
        Ok(match target {
            DraftTarget::New => self.track(&runtime, MutationOp::Create, async move {
                gateway
                    .send_create(&collection, payload)
                    .await
                    .map(CommitOutcome::Created)
            }),
            DraftTarget::Existing(id) => self.track(&runtime, MutationOp::Update, async move {
                gateway
                    .send_update(&collection, &id, payload)
                    .await
                    .map(|()| CommitOutcome::Updated)
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    pub fn request_delete(&self, id: &str) -> Result<(), IntentError> {
        self.require_mounted()?;
        self.intent.lock().request_delete(id)
    }

    pub fn cancel_delete(&self) -> Result<(), IntentError> {
        self.intent.lock().cancel_delete()
    }

    /// Delete the record awaiting confirmation and return to `Idle` straight
    /// away.
    pub fn confirm_delete(&self) -> Result<PendingMutation<()>> {
        self.require_mounted()?;
        let collection = M::def().name.clone();
        let (id, runtime) = {
            let mut intent = self.intent.lock();
            if !intent.state().is_confirming_delete() {
                return Err(IntentError::NotConfirming.into());
            }
            let runtime = current_runtime(MutationOp::Delete, &collection)?;
            (intent.take_delete()?, runtime)
        };
        let gateway = self.gateway.clone();
        Ok(self.track(&runtime, MutationOp::Delete, async move {
            gateway.send_delete(&collection, &id).await
        }))
    }

    // -----------------------------------------------------------------------
    // Direct card actions
    // -----------------------------------------------------------------------

    /// Update fields of one record without going through a draft.
    pub fn update_fields(&self, id: &str, fields: Fields) -> Result<PendingMutation<()>> {
        self.require_mounted()?;
        let payload = self.gateway.prepare_update(M::def(), fields)?;
        let runtime = current_runtime(MutationOp::Update, &M::def().name)?;
        let gateway = self.gateway.clone();
        let collection = M::def().name.clone();
        let id = id.to_string();
        Ok(self.track(&runtime, MutationOp::Update, async move {
            gateway.send_update(&collection, &id, payload).await
        }))
    }

    /// Flip a boolean field, reading its current value from the projection.
    pub fn toggle(&self, id: &str, field: &str) -> Result<PendingMutation<()>> {
        self.require_mounted()?;
        let def = M::def();
        if !matches!(def.field(field), Some(SchemaNode::Boolean)) {
            return Err(IntentError::UnknownField {
                collection: def.name.clone(),
                field: field.to_string(),
            }
            .into());
        }
        let doc = self.find(id)?;
        let current = doc
            .user_fields()
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut fields = Fields::new();
        fields.insert(field.to_string(), Value::Bool(!current));
        self.update_fields(id, fields)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn require_mounted(&self) -> Result<(), IntentError> {
        if self.is_mounted() {
            Ok(())
        } else {
            Err(IntentError::NotMounted)
        }
    }

    fn find(&self, id: &str) -> Result<Doc<M>, IntentError> {
        self.projection.find(id).ok_or_else(|| IntentError::UnknownRecord {
            id: id.to_string(),
        })
    }

    /// Spawn `call`, reporting its progress on the status line of the
    /// current mount.
    fn track<T, F>(&self, runtime: &Handle, op: MutationOp, call: F) -> PendingMutation<T>
    where
        T: Send + 'static,
        F: std::future::Future<Output = Result<T, MutationError>> + Send + 'static,
    {
        let status = self.status.clone();
        let epoch = status.epoch();
        status.show(epoch, SaveStatus::Saving);
        dispatch(runtime, op, &M::def().name, async move {
            let result = call.await;
            let shown = match &result {
                Ok(_) => SaveStatus::Synced,
                Err(e) => SaveStatus::Failed(e.to_string()),
            };
            if !status.show(epoch, shown) {
                tracing::debug!(op = %op, "outcome dropped for unmounted view");
            }
            result
        })
    }
}

impl<M: Model> Drop for CollectionSynchronizer<M> {
    fn drop(&mut self) {
        self.unmount();
    }
}
