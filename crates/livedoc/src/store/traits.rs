//! The remote document store contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Fields, Record};

/// An owned one-shot closure that detaches a listener when called.
pub type Unsubscribe = Box<dyn FnOnce() + Send + Sync>;

/// Receives the full current record list of a collection.
pub type CollectionCallback = Arc<dyn Fn(Vec<Record>) + Send + Sync>;

/// Receives the current record of a document subscription, `None` when the
/// record does not exist.
pub type DocumentCallback = Arc<dyn Fn(Option<Record>) + Send + Sync>;

/// Receives a stream failure after the subscription was established.
pub type StoreErrorCallback = Arc<dyn Fn(StoreError) + Send + Sync>;

/// A remote document store with live change streams.
///
/// Implementations must deliver a full snapshot to each listener after every
/// mutation matching its target, whoever made it, and should deliver an
/// initial snapshot once the listener is attached. Snapshot callbacks may run
/// on any thread and may run before the `subscribe` call returns.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Attach a listener to every record of `collection`.
    fn subscribe(
        &self,
        collection: &str,
        on_snapshot: CollectionCallback,
        on_error: StoreErrorCallback,
    ) -> Result<Unsubscribe, StoreError>;

    /// Attach a listener to a single record.
    fn subscribe_doc(
        &self,
        collection: &str,
        id: &str,
        on_snapshot: DocumentCallback,
        on_error: StoreErrorCallback,
    ) -> Result<Unsubscribe, StoreError>;

    /// One-shot read of a single record.
    async fn get_record(&self, collection: &str, id: &str) -> Result<Option<Record>, StoreError>;

    /// Add a record; the store assigns and returns its id.
    async fn create_record(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Shallow-merge `fields` into an existing record.
    async fn update_record(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), StoreError>;

    /// Remove a record. Removing a missing record is not an error.
    async fn delete_record(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}
