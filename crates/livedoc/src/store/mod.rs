//! Remote store contract and the in-process implementation.
//!
//! - [`traits`]: [`RemoteStore`] and callback types.
//! - [`listeners`]: [`Listeners<T>`], the reentrant callback registry.
//! - [`memory`]: [`MemoryStore`].

pub mod listeners;
pub mod memory;
pub mod traits;

pub use listeners::{ListenerId, Listeners};
pub use memory::{IdStrategy, MemoryStore, StoreCall, StoreOp};
pub use traits::{
    CollectionCallback, DocumentCallback, RemoteStore, StoreErrorCallback, Unsubscribe,
};
