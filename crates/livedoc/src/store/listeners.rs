//! `Listeners<T>` is a typed, reentrant callback registry.
//!
//! Callbacks are stored as `Arc<dyn Fn(&T)>` so a delivery round can work from
//! a cheap copy of the list:
//!   - a listener removed during delivery still sees that round;
//!   - a listener added during delivery waits for the next one.
//!
//! The internal `parking_lot::Mutex` is never held while a callback runs, so
//! callbacks may register or remove listeners, or trigger further deliveries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Handle returned by [`Listeners::add`], accepted by [`Listeners::remove`].
pub type ListenerId = u64;

/// Closure type for listeners.
pub type ListenerFn<T> = dyn Fn(&T) + Send + Sync;

pub struct Listeners<T> {
    entries: Mutex<Vec<(ListenerId, Arc<ListenerFn<T>>)>>,
    next_id: AtomicU64,
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback`, returning the id to remove it with.
    pub fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> ListenerId {
        let callback: Arc<ListenerFn<T>> = Arc::new(callback);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, callback));
        id
    }

    /// Remove a listener. Returns `false` if it was already gone.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(lid, _)| *lid != id);
        entries.len() != before
    }

    /// Deliver `value` to every listener registered when the call started.
    /// Returns how many listeners were called.
    pub fn deliver(&self, value: &T) -> usize {
        let round: Vec<Arc<ListenerFn<T>>> = {
            let entries = self.entries.lock();
            entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for cb in &round {
            cb(value);
        }
        round.len()
    }

    /// Deliver to a single listener, if it is still registered.
    pub fn deliver_to(&self, id: ListenerId, value: &T) -> bool {
        let cb = {
            let entries = self.entries.lock();
            entries
                .iter()
                .find(|(lid, _)| *lid == id)
                .map(|(_, cb)| Arc::clone(cb))
        };
        match cb {
            Some(cb) => {
                cb(value);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}
