//! Typed models for declared collections.
//!
//! A [`Model`] ties a serde struct to its [`CollectionDef`]. Synchronizers are
//! generic over `Model`, so field access is checked at compile time while the
//! wire payload stays a plain JSON object.

use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LiveDocError;
use crate::schema::node::t;
use crate::types::{Fields, Record};

use super::builder::{collection, CollectionDef};

/// A record type stored in one declared collection.
pub trait Model: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// The collection this model is stored in.
    fn def() -> &'static CollectionDef;
}

/// A decoded record: store-assigned id plus typed data.
#[derive(Debug, Clone, PartialEq)]
pub struct Doc<M> {
    pub id: String,
    pub data: M,
}

impl<M: Model> Doc<M> {
    /// Decode a raw record into the model.
    pub fn decode(record: &Record) -> Result<Self, LiveDocError> {
        let data = serde_json::from_value(Value::Object(record.fields.clone())).map_err(|e| {
            LiveDocError::Decode {
                collection: M::def().name.clone(),
                id: record.id.clone(),
                message: e.to_string(),
            }
        })?;
        Ok(Self {
            id: record.id.clone(),
            data,
        })
    }

    /// The model's user fields as a JSON object, without stamps.
    pub fn user_fields(&self) -> Fields {
        user_fields_of(&self.data)
    }
}

/// Serialize a model and keep only the fields its schema declares.
pub fn user_fields_of<M: Model>(data: &M) -> Fields {
    let def = M::def();
    match serde_json::to_value(data) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter(|(k, _)| def.is_user_field(k))
            .collect(),
        _ => Fields::new(),
    }
}

// ============================================================================
// Builtin collections
// ============================================================================

/// A free-text note (`notes` collection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Model for Note {
    fn def() -> &'static CollectionDef {
        static DEF: OnceLock<CollectionDef> = OnceLock::new();
        DEF.get_or_init(|| {
            collection("notes")
                .field("content", t::string())
                .primary("content")
                .timestamps()
                .build()
        })
    }
}

/// A to-do item (`todos` collection). Todos carry no timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl Model for Todo {
    fn def() -> &'static CollectionDef {
        static DEF: OnceLock<CollectionDef> = OnceLock::new();
        DEF.get_or_init(|| {
            collection("todos")
                .field("text", t::string())
                .field("completed", t::boolean())
                .primary("text")
                .build()
        })
    }
}

/// A rich-text plan (`plans` collection). `content` is the editor's
/// serialized document and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Model for Plan {
    fn def() -> &'static CollectionDef {
        static DEF: OnceLock<CollectionDef> = OnceLock::new();
        DEF.get_or_init(|| {
            collection("plans")
                .field("title", t::string())
                .field("content", t::rich_text())
                .primary("title")
                .timestamps()
                .build()
        })
    }
}
