//! ProjectionStore is the render-visible copy of remote data.
//!
//! Every snapshot replaces the whole projection; nothing is patched in place
//! and local writes never touch it. Readers get an `Arc` of the current
//! projection, so a render pass sees one consistent snapshot even if a new
//! one lands while it runs.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::collection::{Doc, Model};
use crate::error::LiveDocError;
use crate::store::{ListenerId, Listeners};
use crate::types::Snapshot;

/// One materialized snapshot.
#[derive(Debug, Clone)]
pub struct Projection<M> {
    /// Decoded records, in the order the snapshot listed them.
    pub records: Vec<Doc<M>>,
    /// Records that could not be decoded into `M`.
    pub errors: Vec<LiveDocError>,
    /// Number of snapshots applied so far; `0` before the first one.
    pub revision: u64,
}

impl<M> Projection<M> {
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            errors: Vec::new(),
            revision: 0,
        }
    }

    pub fn find(&self, id: &str) -> Option<&Doc<M>> {
        self.records.iter().find(|d| d.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

pub struct ProjectionStore<M> {
    current: Mutex<Arc<Projection<M>>>,
    listeners: Listeners<Arc<Projection<M>>>,
}

impl<M: Model> ProjectionStore<M> {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(Projection::empty())),
            listeners: Listeners::new(),
        }
    }

    /// Overwrite the projection with `snapshot` and notify render listeners.
    /// Returns the new revision.
    pub fn replace(&self, snapshot: Snapshot) -> u64 {
        let mut records = Vec::new();
        let mut errors = Vec::new();
        for record in snapshot.into_records() {
            match Doc::<M>::decode(&record) {
                Ok(doc) => records.push(doc),
                Err(e) => {
                    tracing::warn!(
                        collection = %M::def().name,
                        id = %record.id,
                        error = %e,
                        "record left out of projection"
                    );
                    errors.push(e);
                }
            }
        }

        let next = {
            let mut current = self.current.lock();
            let next = Arc::new(Projection {
                records,
                errors,
                revision: current.revision + 1,
            });
            *current = Arc::clone(&next);
            next
        };
        self.listeners.deliver(&next);
        next.revision
    }

    /// The current projection.
    pub fn read(&self) -> Arc<Projection<M>> {
        Arc::clone(&*self.current.lock())
    }

    pub fn revision(&self) -> u64 {
        self.current.lock().revision
    }

    pub fn find(&self, id: &str) -> Option<Doc<M>> {
        self.current.lock().find(id).cloned()
    }

    /// Call `callback` after every replace with the new projection.
    pub fn on_change(
        &self,
        callback: impl Fn(&Arc<Projection<M>>) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.add(callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

impl<M: Model> Default for ProjectionStore<M> {
    fn default() -> Self {
        Self::new()
    }
}
