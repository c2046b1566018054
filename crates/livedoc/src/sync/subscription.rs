//! SubscriptionManager, one live change stream per view.
//!
//! # Generations
//!
//! Every `open` allocates a new generation number and publishes it as the
//! view's current generation. The callbacks handed to the store are tagged
//! with the generation they were opened under and drop anything delivered
//! once the current generation has moved on (after `close`, a re-`open`, or a
//! dropped stream). A misbehaving store that keeps calling a detached
//! callback therefore cannot reach the view's projection.
//!
//! The generation check and the hand-off to the sink run under a delivery
//! lock that `close` also takes, so once `close` returns no snapshot reaches
//! the sink. The lock is reentrant: a sink may close or re-open its own view.
//!
//! No internal lock is held while calling into the store, so stores may
//! deliver the initial snapshot synchronously from inside `subscribe`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};

use crate::error::{StoreError, SubscriptionError};
use crate::store::{RemoteStore, Unsubscribe};
use crate::types::{Record, Selector, Snapshot};

/// Receives every accepted snapshot.
pub type SnapshotSink = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Receives the one error a subscription can report after it was opened.
pub type SubscriptionErrorSink = Arc<dyn Fn(SubscriptionError) + Send + Sync>;

/// No subscription is live.
const CLOSED: u64 = 0;

struct Active {
    selector: Selector,
    generation: u64,
    unsubscribe: Option<Unsubscribe>,
}

pub struct SubscriptionManager {
    store: Arc<dyn RemoteStore>,
    active: Mutex<Option<Active>>,
    /// Generation of the live subscription, or `CLOSED`.
    current: Arc<AtomicU64>,
    next_generation: AtomicU64,
    /// Held while a callback checks its generation and hands over.
    delivery: Arc<ReentrantMutex<()>>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            active: Mutex::new(None),
            current: Arc::new(AtomicU64::new(CLOSED)),
            next_generation: AtomicU64::new(1),
            delivery: Arc::new(ReentrantMutex::new(())),
        }
    }

    /// Open a stream on `selector`, closing any previous one first.
    ///
    /// Returns the generation of the new subscription. If the store refuses
    /// the subscription the error is returned here and `on_error` is not
    /// called; afterwards `on_error` fires at most once, when the stream is
    /// dropped, and no snapshot is accepted after that.
    pub fn open(
        &self,
        selector: Selector,
        on_snapshot: SnapshotSink,
        on_error: SubscriptionErrorSink,
    ) -> Result<u64, SubscriptionError> {
        self.close();

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.current.store(generation, Ordering::SeqCst);

        let errored = Arc::new(AtomicBool::new(false));
        let error_cb = {
            let current = Arc::clone(&self.current);
            let delivery = Arc::clone(&self.delivery);
            let target = selector.to_string();
            Arc::new(move |source: StoreError| {
                let _delivering = delivery.lock();
                if current.load(Ordering::SeqCst) != generation {
                    return;
                }
                if errored.swap(true, Ordering::SeqCst) {
                    return;
                }
                // The stream is dead: refuse anything it might still send.
                let _ = current.compare_exchange(
                    generation,
                    CLOSED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                tracing::warn!(selector = %target, generation, error = %source, "subscription dropped");
                on_error(SubscriptionError::Dropped {
                    target: target.clone(),
                    source,
                });
            })
        };

        let subscribed = match &selector {
            Selector::Collection(name) => {
                let accept = self.gate(generation, &selector, on_snapshot);
                self.store.subscribe(
                    name,
                    Arc::new(move |records: Vec<Record>| accept(Snapshot::Collection(records))),
                    error_cb,
                )
            }
            Selector::Document { collection, id } => {
                let accept = self.gate(generation, &selector, on_snapshot);
                self.store.subscribe_doc(
                    collection,
                    id,
                    Arc::new(move |record: Option<Record>| accept(Snapshot::Document(record))),
                    error_cb,
                )
            }
        };

        match subscribed {
            Ok(unsubscribe) => {
                tracing::debug!(selector = %selector, generation, "subscription opened");
                let previous = self.active.lock().replace(Active {
                    selector,
                    generation,
                    unsubscribe: Some(unsubscribe),
                });
                // Only reachable if a callback re-opened this view while the
                // store was still inside `subscribe`.
                if let Some(mut stale) = previous {
                    if let Some(unsub) = stale.unsubscribe.take() {
                        unsub();
                    }
                }
                Ok(generation)
            }
            Err(source) => {
                let _ = self.current.compare_exchange(
                    generation,
                    CLOSED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                tracing::warn!(selector = %selector, error = %source, "subscription could not be opened");
                Err(SubscriptionError::Open {
                    target: selector.to_string(),
                    source,
                })
            }
        }
    }

    /// Close the live stream, if any. Snapshots arriving afterwards are
    /// discarded. Returns `false` when nothing was open.
    pub fn close(&self) -> bool {
        self.current.store(CLOSED, Ordering::SeqCst);
        // Wait out a delivery that passed its generation check before the
        // store above; later ones see CLOSED.
        drop(self.delivery.lock());

        let active = self.active.lock().take();
        match active {
            Some(mut active) => {
                if let Some(unsubscribe) = active.unsubscribe.take() {
                    unsubscribe();
                }
                tracing::debug!(
                    selector = %active.selector,
                    generation = active.generation,
                    "subscription closed"
                );
                true
            }
            None => false,
        }
    }

    /// Whether a stream is open and has not been dropped by the store.
    pub fn is_open(&self) -> bool {
        let current = self.current.load(Ordering::SeqCst);
        current != CLOSED
            && self
                .active
                .lock()
                .as_ref()
                .is_some_and(|a| a.generation == current)
    }

    /// Generation of the live stream, `None` when closed.
    pub fn generation(&self) -> Option<u64> {
        match self.current.load(Ordering::SeqCst) {
            CLOSED => None,
            g => Some(g),
        }
    }

    /// Wrap `sink` so it only accepts snapshots while `generation` is live.
    fn gate(
        &self,
        generation: u64,
        selector: &Selector,
        sink: SnapshotSink,
    ) -> impl Fn(Snapshot) + Send + Sync + 'static {
        let current = Arc::clone(&self.current);
        let delivery = Arc::clone(&self.delivery);
        let target = selector.to_string();
        move |snapshot: Snapshot| {
            let _delivering = delivery.lock();
            if current.load(Ordering::SeqCst) == generation {
                sink(snapshot);
            } else {
                tracing::trace!(selector = %target, generation, "discarding snapshot for closed subscription");
            }
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.close();
    }
}
