//! Live synchronization between remote document collections and local views.

pub mod config;
pub mod error;
pub mod types;

pub mod collection;
pub mod schema;
pub mod store;
pub mod sync;
