use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field payload of a record: a flat JSON object keyed by field name.
pub type Fields = Map<String, Value>;

/// A document as delivered by the remote store.
///
/// `id` is assigned by the store and never changes. `fields` holds every
/// stored field, including timestamp stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a record from a `json!({...})` object. Non-object values yield
    /// an empty field map.
    pub fn from_json(id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// What a subscription is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Every record in the named collection.
    Collection(String),
    /// One record, addressed by collection and id.
    Document { collection: String, id: String },
}

impl Selector {
    pub fn collection(name: impl Into<String>) -> Self {
        Self::Collection(name.into())
    }

    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Document {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection(name) => f.write_str(name),
            Self::Document { collection, id } => write!(f, "{collection}/{id}"),
        }
    }
}

/// The complete current state behind a selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    /// All current records of a collection, in arrival order.
    Collection(Vec<Record>),
    /// The addressed record, or `None` when it does not exist.
    Document(Option<Record>),
}

impl Snapshot {
    /// Flatten to the list of records present in the snapshot.
    pub fn into_records(self) -> Vec<Record> {
        match self {
            Self::Collection(records) => records,
            Self::Document(record) => record.into_iter().collect(),
        }
    }
}
