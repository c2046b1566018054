//! Declared collections: schema definitions and typed models.

pub mod builder;
pub mod model;

pub use builder::{collection, CollectionBuilder, CollectionDef, CREATED_AT, UPDATED_AT};
pub use model::{user_fields_of, Doc, Model, Note, Plan, Todo};
