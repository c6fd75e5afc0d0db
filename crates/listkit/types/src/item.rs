//! Stored items.
//!
//! The engine never assumes more structure than "has an id, has named fields".
//! Relationship fields hold foreign keys: a string id (or null) for to-one
//! relations and an array of string ids for to-many relations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::ItemId;

/// Field path → value mapping.
pub type FieldMap = serde_json::Map<String, Value>;

/// A stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl Item {
    /// Create an item from an id and its fields.
    pub fn new(id: impl Into<ItemId>, fields: FieldMap) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Value of a field; `id` resolves to the item id.
    pub fn get(&self, path: &str) -> Option<Value> {
        if path == "id" {
            return Some(Value::from(&self.id));
        }
        self.fields.get(path).cloned()
    }

    /// Borrow a stored field value.
    pub fn field(&self, path: &str) -> Option<&Value> {
        self.fields.get(path)
    }

    /// Foreign key held by a to-one relationship field.
    pub fn ref_id(&self, path: &str) -> Option<ItemId> {
        self.fields.get(path).and_then(value_as_id)
    }

    /// Foreign keys held by a to-many relationship field.
    pub fn ref_ids(&self, path: &str) -> Vec<ItemId> {
        self.fields.get(path).map(value_as_ids).unwrap_or_default()
    }
}

/// Read a foreign key out of a JSON value.
///
/// Accepts a bare string or an `{ "id": "..." }` object.
pub fn value_as_id(value: &Value) -> Option<ItemId> {
    match value {
        Value::String(s) => Some(ItemId::new(s.clone())),
        Value::Object(map) => map.get("id").and_then(value_as_id),
        _ => None,
    }
}

/// Read foreign keys out of a JSON value: an array of ids, or a single id.
pub fn value_as_ids(value: &Value) -> Vec<ItemId> {
    match value {
        Value::Array(values) => values.iter().filter_map(value_as_id).collect(),
        value => value_as_id(value).into_iter().collect(),
    }
}

/// Encode a list of foreign keys as a JSON array.
pub fn ids_to_value(ids: &[ItemId]) -> Value {
    Value::Array(ids.iter().map(Value::from).collect())
}
