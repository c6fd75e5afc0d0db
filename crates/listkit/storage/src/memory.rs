//! In-memory reference implementation of [`ListAdapter`].
//!
//! This adapter is deterministic and test-friendly: items keep insertion order
//! unless a query asks for an ordering. Production deployments plug a real
//! backend in behind the same trait.

use crate::traits::ListAdapter;
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use listkit_types::{FieldMap, Item, ItemId, QueryArgs, QueryMeta, SortDirection, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredItem {
    sequence: u64,
    item: Item,
}

#[derive(Debug, Default)]
struct Table {
    next_sequence: u64,
    rows: HashMap<ItemId, StoredItem>,
}

/// In-memory list adapter.
#[derive(Debug, Default)]
pub struct InMemoryListAdapter {
    list_key: String,
    table: RwLock<Table>,
}

impl InMemoryListAdapter {
    pub fn new(list_key: impl Into<String>) -> Self {
        Self {
            list_key: list_key.into(),
            table: RwLock::new(Table::default()),
        }
    }

    pub fn list_key(&self) -> &str {
        &self.list_key
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.table.read().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_poisoned(&self) -> StorageError {
        StorageError::Backend(format!("{} table lock poisoned", self.list_key))
    }

    fn matching(&self, args: &QueryArgs) -> StorageResult<Vec<Item>> {
        let guard = self.table.read().map_err(|_| self.lock_poisoned())?;
        let mut rows = guard
            .rows
            .values()
            .filter(|row| args.where_.matches(&row.item))
            .filter(|row| matches_search(&row.item, args.search.as_deref()))
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by_key(|row| row.sequence);

        if let Some(order_by) = &args.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.item.get(&order_by.field).as_ref(),
                    b.item.get(&order_by.field).as_ref(),
                );
                match order_by.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        Ok(rows.into_iter().map(|row| row.item).collect())
    }
}

#[async_trait]
impl ListAdapter for InMemoryListAdapter {
    async fn find_by_id(&self, id: &ItemId) -> StorageResult<Option<Item>> {
        let guard = self.table.read().map_err(|_| self.lock_poisoned())?;
        Ok(guard.rows.get(id).map(|row| row.item.clone()))
    }

    async fn items_query(&self, args: &QueryArgs) -> StorageResult<Vec<Item>> {
        let items = self.matching(args)?;
        let paged = items
            .into_iter()
            .skip(args.skip)
            .take(args.first.unwrap_or(usize::MAX))
            .collect::<Vec<_>>();
        debug!(list = %self.list_key, returned = paged.len(), "items query");
        Ok(paged)
    }

    async fn items_query_meta(&self, args: &QueryArgs) -> StorageResult<QueryMeta> {
        Ok(QueryMeta {
            count: self.matching(args)?.len(),
        })
    }

    async fn create(&self, mut data: FieldMap) -> StorageResult<Item> {
        let id = match data.remove("id") {
            Some(Value::String(id)) => ItemId::new(id),
            Some(Value::Null) | None => ItemId::new(Uuid::new_v4().to_string()),
            Some(other) => {
                return Err(StorageError::InvalidInput(format!(
                    "id must be a string, got {other}"
                )))
            }
        };

        let mut guard = self.table.write().map_err(|_| self.lock_poisoned())?;
        if guard.rows.contains_key(&id) {
            return Err(StorageError::Conflict(format!(
                "{} item {} already exists",
                self.list_key, id
            )));
        }

        let sequence = guard.next_sequence;
        guard.next_sequence += 1;
        let item = Item::new(id.clone(), data);
        guard.rows.insert(
            id,
            StoredItem {
                sequence,
                item: item.clone(),
            },
        );
        Ok(item)
    }

    async fn update(&self, id: &ItemId, mut data: FieldMap) -> StorageResult<Option<Item>> {
        data.remove("id");
        let mut guard = self.table.write().map_err(|_| self.lock_poisoned())?;
        let Some(row) = guard.rows.get_mut(id) else {
            return Ok(None);
        };
        for (path, value) in data {
            row.item.fields.insert(path, value);
        }
        Ok(Some(row.item.clone()))
    }

    async fn delete(&self, id: &ItemId) -> StorageResult<Option<Item>> {
        let mut guard = self.table.write().map_err(|_| self.lock_poisoned())?;
        Ok(guard.rows.remove(id).map(|row| row.item))
    }
}

fn matches_search(item: &Item, search: Option<&str>) -> bool {
    let Some(needle) = search.map(str::to_lowercase) else {
        return true;
    };
    item.fields.values().any(|value| match value {
        Value::String(s) => s.to_lowercase().contains(&needle),
        _ => false,
    })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}
