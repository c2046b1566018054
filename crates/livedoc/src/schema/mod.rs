//! Field schemas for declared collections.
//!
//! - [`node`]: [`SchemaNode`] and the `t` builder helpers.
//! - [`validate`]: payload validation against a collection's fields.

pub mod node;
pub mod validate;

pub use node::{t, SchemaNode};
pub use validate::{validate, validate_fields, FieldCoverage};
