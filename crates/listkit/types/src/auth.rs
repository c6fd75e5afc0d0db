use serde::{Deserialize, Serialize};

use crate::item::Item;

/// The authenticated caller of a request: an item of some list.
///
/// Produced by the authentication collaborator; the engine only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthedItem {
    pub list_key: String,
    pub item: Item,
}

impl AuthedItem {
    pub fn new(list_key: impl Into<String>, item: Item) -> Self {
        Self {
            list_key: list_key.into(),
            item,
        }
    }

    /// Log-safe identity string, `List:id`.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.list_key, self.item.id)
    }
}
