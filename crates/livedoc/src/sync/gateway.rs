//! MutationGateway: create / update / delete against the remote store.
//!
//! Payloads are stamped and validated synchronously, so a bad payload is
//! reported to the caller before anything is sent. The store call itself is
//! either awaited directly ([`MutationGateway::create`] and friends) or
//! spawned and handed back as a [`PendingMutation`] that the caller may await
//! or drop. Spawning needs a running tokio runtime; without one the call is
//! refused with [`MutationError::NoRuntime`].

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::collection::{CollectionDef, CREATED_AT, UPDATED_AT};
use crate::config::Clock;
use crate::error::{MutationError, MutationOp, StoreError};
use crate::schema::{validate_fields, FieldCoverage};
use crate::store::RemoteStore;
use crate::types::Fields;

#[derive(Clone)]
pub struct MutationGateway {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Payload preparation
    // -----------------------------------------------------------------------

    /// Stamp `createdAt` when the collection asks for it and check that every
    /// required field is present and well typed.
    pub fn prepare_create(
        &self,
        def: &CollectionDef,
        mut fields: Fields,
    ) -> Result<Fields, MutationError> {
        if def.stamp_created {
            fields.insert(CREATED_AT.to_string(), Value::String(self.clock.now_iso()));
        }
        validate_fields(def, &fields, FieldCoverage::Full).map_err(|source| {
            MutationError::Invalid {
                op: MutationOp::Create,
                collection: def.name.clone(),
                source,
            }
        })?;
        Ok(fields)
    }

    /// Stamp `updatedAt` when the collection asks for it and check the fields
    /// that are present.
    pub fn prepare_update(
        &self,
        def: &CollectionDef,
        mut fields: Fields,
    ) -> Result<Fields, MutationError> {
        if def.stamp_updated {
            fields.insert(UPDATED_AT.to_string(), Value::String(self.clock.now_iso()));
        }
        validate_fields(def, &fields, FieldCoverage::Partial).map_err(|source| {
            MutationError::Invalid {
                op: MutationOp::Update,
                collection: def.name.clone(),
                source,
            }
        })?;
        Ok(fields)
    }

    // -----------------------------------------------------------------------
    // Awaited calls
    // -----------------------------------------------------------------------

    /// Create a record and return the id the store assigned to it.
    pub async fn create(&self, def: &CollectionDef, fields: Fields) -> Result<String, MutationError> {
        let payload = self.prepare_create(def, fields)?;
        self.send_create(&def.name, payload).await
    }

    pub async fn update(
        &self,
        def: &CollectionDef,
        id: &str,
        fields: Fields,
    ) -> Result<(), MutationError> {
        let payload = self.prepare_update(def, fields)?;
        self.send_update(&def.name, id, payload).await
    }

    pub async fn delete(&self, def: &CollectionDef, id: &str) -> Result<(), MutationError> {
        self.send_delete(&def.name, id).await
    }

    /// Send an already prepared create payload.
    pub async fn send_create(&self, collection: &str, payload: Fields) -> Result<String, MutationError> {
        tracing::debug!(collection = %collection, "issuing create");
        match self.store.create_record(collection, payload).await {
            Ok(id) => {
                tracing::debug!(collection = %collection, id = %id, "create acknowledged");
                Ok(id)
            }
            Err(source) => Err(failed(MutationOp::Create, collection, None, source)),
        }
    }

    /// Send an already prepared update payload.
    pub async fn send_update(
        &self,
        collection: &str,
        id: &str,
        payload: Fields,
    ) -> Result<(), MutationError> {
        tracing::debug!(collection = %collection, id = %id, "issuing update");
        self.store
            .update_record(collection, id, payload)
            .await
            .map_err(|source| failed(MutationOp::Update, collection, Some(id), source))
    }

    pub async fn send_delete(&self, collection: &str, id: &str) -> Result<(), MutationError> {
        tracing::debug!(collection = %collection, id = %id, "issuing delete");
        self.store
            .delete_record(collection, id)
            .await
            .map_err(|source| failed(MutationOp::Delete, collection, Some(id), source))
    }

    // -----------------------------------------------------------------------
    // Fire-and-forget
    // -----------------------------------------------------------------------

    /// Validate now, send in the background.
    pub fn spawn_create(
        &self,
        def: &CollectionDef,
        fields: Fields,
    ) -> Result<PendingMutation<String>, MutationError> {
        let payload = self.prepare_create(def, fields)?;
        let runtime = current_runtime(MutationOp::Create, &def.name)?;
        let gateway = self.clone();
        let collection = def.name.clone();
        Ok(dispatch(&runtime, MutationOp::Create, &def.name, async move {
            gateway.send_create(&collection, payload).await
        }))
    }

    pub fn spawn_update(
        &self,
        def: &CollectionDef,
        id: &str,
        fields: Fields,
    ) -> Result<PendingMutation<()>, MutationError> {
        let payload = self.prepare_update(def, fields)?;
        let runtime = current_runtime(MutationOp::Update, &def.name)?;
        let gateway = self.clone();
        let collection = def.name.clone();
        let id = id.to_string();
        Ok(dispatch(&runtime, MutationOp::Update, &def.name, async move {
            gateway.send_update(&collection, &id, payload).await
        }))
    }

    pub fn spawn_delete(
        &self,
        def: &CollectionDef,
        id: &str,
    ) -> Result<PendingMutation<()>, MutationError> {
        let runtime = current_runtime(MutationOp::Delete, &def.name)?;
        let gateway = self.clone();
        let collection = def.name.clone();
        let id = id.to_string();
        Ok(dispatch(&runtime, MutationOp::Delete, &def.name, async move {
            gateway.send_delete(&collection, &id).await
        }))
    }
}

fn failed(op: MutationOp, collection: &str, id: Option<&str>, source: StoreError) -> MutationError {
    tracing::warn!(
        op = %op,
        collection = %collection,
        id = id.unwrap_or(""),
        error = %source,
        "mutation failed"
    );
    MutationError::Store {
        op,
        collection: collection.to_string(),
        id: id.map(str::to_string),
        source,
    }
}

// ============================================================================
// PendingMutation
// ============================================================================

/// A mutation running on the tokio runtime.
///
/// Dropping the handle does not cancel the call.
#[derive(Debug)]
pub struct PendingMutation<T> {
    op: MutationOp,
    collection: String,
    handle: JoinHandle<Result<T, MutationError>>,
}

impl<T: Send + 'static> PendingMutation<T> {
    pub fn op(&self) -> MutationOp {
        self.op
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the store to answer.
    pub async fn outcome(self) -> Result<T, MutationError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(op = %self.op, collection = %self.collection, error = %e, "mutation task ended early");
                Err(MutationError::Abandoned {
                    op: self.op,
                    collection: self.collection,
                })
            }
        }
    }
}

/// The runtime mutations are spawned on.
pub(crate) fn current_runtime(op: MutationOp, collection: &str) -> Result<Handle, MutationError> {
    Handle::try_current().map_err(|_| {
        tracing::warn!(op = %op, collection = %collection, "no tokio runtime, mutation not issued");
        MutationError::NoRuntime {
            op,
            collection: collection.to_string(),
        }
    })
}

/// Spawn `call` on `runtime` as a [`PendingMutation`].
pub(crate) fn dispatch<T, F>(
    runtime: &Handle,
    op: MutationOp,
    collection: &str,
    call: F,
) -> PendingMutation<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, MutationError>> + Send + 'static,
{
    PendingMutation {
        op,
        collection: collection.to_string(),
        handle: runtime.spawn(call),
    }
}
