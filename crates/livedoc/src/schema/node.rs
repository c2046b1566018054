// ============================================================================
// SchemaNode Types
// ============================================================================

/// Shape and type constraint of a single record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaNode {
    /// Free text.
    String,
    /// Boolean flag.
    Boolean,
    /// ISO-8601 timestamp string.
    Date,
    /// Rich text serialized to a string by the editor widget. Opaque to this
    /// crate: any string is accepted, including the empty one.
    RichText,
    /// The wrapped type, or `null` / absent.
    Optional(Box<SchemaNode>),
    /// Stamp: creation time, written by the gateway on `create`.
    CreatedAt,
    /// Stamp: last-modified time, written by the gateway on `update`.
    UpdatedAt,
}

impl SchemaNode {
    /// Human-readable name used in validation messages.
    pub fn expected(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Date | Self::CreatedAt | Self::UpdatedAt => "ISO date string".to_string(),
            Self::RichText => "rich text string".to_string(),
            Self::Optional(inner) => format!("{} or null", inner.expected()),
        }
    }
}

// ============================================================================
// Schema Builder API (`t` module)
// ============================================================================

/// Schema builder helpers. Usage: `t::string()`, `t::optional(t::date())`, etc.
pub mod t {
    use super::SchemaNode;

    pub fn string() -> SchemaNode {
        SchemaNode::String
    }

    pub fn boolean() -> SchemaNode {
        SchemaNode::Boolean
    }

    pub fn date() -> SchemaNode {
        SchemaNode::Date
    }

    pub fn rich_text() -> SchemaNode {
        SchemaNode::RichText
    }

    pub fn optional(inner: SchemaNode) -> SchemaNode {
        SchemaNode::Optional(Box::new(inner))
    }
}

// ============================================================================
// Predicate Helpers
// ============================================================================

/// Returns true for CreatedAt and UpdatedAt: stamps written by the gateway.
pub fn is_timestamp_field(node: &SchemaNode) -> bool {
    matches!(node, SchemaNode::CreatedAt | SchemaNode::UpdatedAt)
}

/// Returns true for nodes whose values are text and can act as a primary
/// field for the blank-commit guard.
pub fn is_text_node(node: &SchemaNode) -> bool {
    match node {
        SchemaNode::String | SchemaNode::RichText => true,
        SchemaNode::Optional(inner) => is_text_node(inner),
        _ => false,
    }
}
