//! Collection builder with a fluent API for field schemas.
//!
//! Stamp fields (`createdAt`, `updatedAt`) are added by the timestamp policy,
//! never declared by users. `id` is owned by the store and never part of a
//! schema.

use std::sync::OnceLock;

use crate::schema::node::{is_text_node, SchemaNode};

// ============================================================================
// Regex
// ============================================================================

static NAME_REGEX: OnceLock<regex::Regex> = OnceLock::new();

fn name_regex() -> &'static regex::Regex {
    NAME_REGEX.get_or_init(|| {
        regex::Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("name regex is valid")
    })
}

/// Reserved field names that users cannot declare.
pub(crate) const RESERVED_FIELDS: &[&str] = &["id", "createdAt", "updatedAt"];

pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

// ============================================================================
// CollectionDef
// ============================================================================

/// Complete collection definition produced by `build()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDef {
    pub name: String,
    /// User fields in declaration order. Stamps are not included.
    pub fields: Vec<(String, SchemaNode)>,
    /// Text field that must be non-blank for a draft to be committed.
    pub primary: String,
    /// `create` writes `createdAt`.
    pub stamp_created: bool,
    /// `update` writes `updatedAt`.
    pub stamp_updated: bool,
}

impl CollectionDef {
    /// Look up a writable field, including stamps enabled by the timestamp
    /// policy.
    pub fn field(&self, name: &str) -> Option<&SchemaNode> {
        static CREATED: SchemaNode = SchemaNode::CreatedAt;
        static UPDATED: SchemaNode = SchemaNode::UpdatedAt;

        if let Some((_, node)) = self.fields.iter().find(|(n, _)| n == name) {
            return Some(node);
        }
        match name {
            CREATED_AT if self.stamp_created => Some(&CREATED),
            UPDATED_AT if self.stamp_updated => Some(&UPDATED),
            _ => None,
        }
    }

    /// User fields in declaration order.
    pub fn user_fields(&self) -> impl Iterator<Item = (&String, &SchemaNode)> {
        self.fields.iter().map(|(n, s)| (n, s))
    }

    pub fn is_user_field(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Collection builder. Obtain one with [`collection`].
pub struct CollectionBuilder {
    name: String,
    fields: Vec<(String, SchemaNode)>,
    primary: Option<String>,
    stamp_created: bool,
    stamp_updated: bool,
}

impl CollectionBuilder {
    /// Declare a field. Panics on reserved, invalid or duplicate names.
    pub fn field(mut self, name: &str, schema: SchemaNode) -> Self {
        if RESERVED_FIELDS.contains(&name) {
            panic!(
                "Field \"{name}\" is reserved in collection \"{}\". \
                 id is store-assigned; createdAt/updatedAt come from the timestamp policy.",
                self.name
            );
        }
        if !name_regex().is_match(name) {
            panic!(
                "Field name \"{name}\" in collection \"{}\" contains invalid characters. \
                 Field names must start with a letter or underscore and contain only \
                 alphanumeric characters and underscores.",
                self.name
            );
        }
        if self.fields.iter().any(|(n, _)| n == name) {
            panic!("Field \"{name}\" already declared on collection \"{}\"", self.name);
        }
        self.fields.push((name.to_string(), schema));
        self
    }

    /// Mark the text field guarded against blank commits.
    pub fn primary(mut self, name: &str) -> Self {
        self.primary = Some(name.to_string());
        self
    }

    /// Stamp `createdAt` on create and `updatedAt` on update.
    pub fn timestamps(mut self) -> Self {
        self.stamp_created = true;
        self.stamp_updated = true;
        self
    }

    /// Finalize the definition. Panics when the primary field is missing or
    /// is not a text field.
    pub fn build(self) -> CollectionDef {
        let primary = self.primary.unwrap_or_else(|| {
            panic!("Collection \"{}\" has no primary text field", self.name)
        });
        let node = self
            .fields
            .iter()
            .find(|(n, _)| *n == primary)
            .map(|(_, s)| s)
            .unwrap_or_else(|| {
                panic!(
                    "Primary field \"{primary}\" is not declared on collection \"{}\"",
                    self.name
                )
            });
        if !is_text_node(node) {
            panic!(
                "Primary field \"{primary}\" on collection \"{}\" must be a text field",
                self.name
            );
        }

        CollectionDef {
            name: self.name,
            fields: self.fields,
            primary,
            stamp_created: self.stamp_created,
            stamp_updated: self.stamp_updated,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Create a new collection builder.
/// Panics if name is empty or contains invalid characters.
pub fn collection(name: &str) -> CollectionBuilder {
    if name.trim().is_empty() {
        panic!("Collection name cannot be empty");
    }
    if !name_regex().is_match(name) {
        panic!(
            "Collection name \"{name}\" contains invalid characters. \
             Collection names must start with a letter or underscore and contain \
             only alphanumeric characters and underscores."
        );
    }
    CollectionBuilder {
        name: name.to_string(),
        fields: Vec::new(),
        primary: None,
        stamp_created: false,
        stamp_updated: false,
    }
}
