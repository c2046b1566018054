//! View-level synchronization.
//!
//! - [`subscription`]: one live change stream per view.
//! - [`projection`]: render-visible copy of the last snapshot.
//! - [`intent`]: create / edit / delete intent state machine.
//! - [`gateway`]: validated create / update / delete calls.
//! - [`status`]: the save indicator.
//! - [`collection`] / [`document`]: the two synchronizers built on top.

pub mod collection;
pub mod document;
pub mod gateway;
pub mod intent;
pub mod projection;
pub mod status;
pub mod subscription;

pub use collection::{CollectionSynchronizer, CommitOutcome};
pub use document::{DocumentPhase, DocumentSynchronizer};
pub use gateway::{MutationGateway, PendingMutation};
pub use intent::{Draft, DraftTarget, IntentController, IntentState};
pub use projection::{Projection, ProjectionStore};
pub use status::{SaveStatus, StatusLine};
pub use subscription::{SnapshotSink, SubscriptionErrorSink, SubscriptionManager};
