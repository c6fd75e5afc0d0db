use async_trait::async_trait;
use listkit_types::{FieldMap, Item, ItemId, QueryArgs, QueryMeta};

use crate::StorageResult;

/// Storage primitive backing one list.
///
/// Implementations are shared between concurrently executing branches of a
/// mutation and must serialize conflicting writes to the same record.
#[async_trait]
pub trait ListAdapter: Send + Sync {
    /// Fetch one item by id.
    async fn find_by_id(&self, id: &ItemId) -> StorageResult<Option<Item>>;

    /// Items matching `args.where_`, searched, ordered and paged.
    async fn items_query(&self, args: &QueryArgs) -> StorageResult<Vec<Item>>;

    /// Count of items `items_query` would match, ignoring paging.
    async fn items_query_meta(&self, args: &QueryArgs) -> StorageResult<QueryMeta>;

    /// Insert a new item and return it with its allocated id.
    async fn create(&self, data: FieldMap) -> StorageResult<Item>;

    /// Merge `data` into an existing item. `None` if it is absent.
    async fn update(&self, id: &ItemId, data: FieldMap) -> StorageResult<Option<Item>>;

    /// Remove an item, returning what was removed. `None` if it is absent.
    async fn delete(&self, id: &ItemId) -> StorageResult<Option<Item>>;
}
