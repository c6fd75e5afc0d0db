//! Reads: list queries, counts and single-item lookups.
//!
//! List access is merged into the caller's where-clause. Field read access is
//! checked per returned item; a denied field comes back as `null` with an
//! entry in the response's `errors`, the rest of the item is still returned.

use std::sync::Arc;

use futures::future::try_join_all;
use listkit_access::{get_access_controlled_item, ListAccessArgs};
use listkit_types::{FieldMap, Item, ItemId, Operation, QueryArgs, QueryMeta, Value};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::context::RequestContext;
use crate::engine::{Engine, RegisteredList};
use crate::error::{EngineError, EngineResult, PublicError};
use crate::guard;

/// An item as the caller may see it: declared fields only, unreadable ones
/// nulled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemView {
    pub id: ItemId,
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// A field withheld from a read result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldAccessDenial {
    pub item_id: ItemId,
    pub field: String,
    pub error: PublicError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub items: Vec<ItemView>,
    pub errors: Vec<FieldAccessDenial>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: ItemView,
    pub errors: Vec<FieldAccessDenial>,
}

/// Read operations on one list for one request.
#[derive(Debug, Clone)]
pub struct ListQuery {
    engine: Engine,
    list: Arc<RegisteredList>,
    context: RequestContext,
}

impl ListQuery {
    pub fn new(engine: Engine, list: Arc<RegisteredList>, context: RequestContext) -> Self {
        Self {
            engine,
            list,
            context,
        }
    }

    /// Effective result limit: the stricter of the list's and the engine's.
    pub fn max_results(&self) -> Option<usize> {
        let global = self.engine.config().query_limits.max_results;
        match (self.list.definition.max_results, global) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[instrument(skip_all, fields(list = %self.list.key()))]
    pub async fn list_query(&self, args: QueryArgs) -> EngineResult<QueryResponse> {
        let mut query = self.restrict(args).await?;
        let max = self.max_results();
        if let Some(max) = max {
            let cap = max.saturating_add(1);
            query.first = Some(query.first.map_or(cap, |first| first.min(cap)));
        }

        let items = self.list.adapter.items_query(&query).await?;
        if let Some(max) = max {
            if items.len() > max {
                return Err(EngineError::LimitsExceeded(format!(
                    "{} query returned more than {max} results",
                    self.list.key()
                )));
            }
        }
        debug!(returned = items.len(), "List query");
        self.present_all(items).await
    }

    #[instrument(skip_all, fields(list = %self.list.key()))]
    pub async fn list_query_meta(&self, args: QueryArgs) -> EngineResult<QueryMeta> {
        let query = self.restrict(args).await?;
        Ok(self.list.adapter.items_query_meta(&query).await?)
    }

    #[instrument(skip_all, fields(list = %self.list.key(), item_id = %id))]
    pub async fn item_query(&self, id: &ItemId) -> EngineResult<ItemResponse> {
        let args = ListAccessArgs::new(
            self.list.key(),
            Operation::Read,
            self.context.authentication().cloned(),
        )
        .with_item_id(id.clone());
        let access = guard::list_access(&self.list, &self.context, args, false).await?;
        let denied = guard::denial(&self.list, &self.context, Operation::Read, false);
        let item = get_access_controlled_item(self.list.adapter.as_ref(), id, &access, denied).await?;

        let (item, errors) = self.present(item).await?;
        Ok(ItemResponse { item, errors })
    }

    /// Merge list read access into the caller's where-clause.
    async fn restrict(&self, args: QueryArgs) -> EngineResult<QueryArgs> {
        let access_args = ListAccessArgs::new(
            self.list.key(),
            Operation::Read,
            self.context.authentication().cloned(),
        );
        let access = guard::list_access(&self.list, &self.context, access_args, true).await?;
        let where_ = access
            .merge_into(args.where_.clone())
            .ok_or_else(|| guard::denial(&self.list, &self.context, Operation::Read, true))?;
        Ok(QueryArgs { where_, ..args })
    }

    async fn present_all(&self, items: Vec<Item>) -> EngineResult<QueryResponse> {
        let presented = try_join_all(items.into_iter().map(|item| self.present(item))).await?;
        let mut response = QueryResponse::default();
        for (view, errors) in presented {
            response.items.push(view);
            response.errors.extend(errors);
        }
        Ok(response)
    }

    async fn present(&self, item: Item) -> EngineResult<(ItemView, Vec<FieldAccessDenial>)> {
        let denied = guard::field_read_denials(&self.list, &self.context, &item).await?;

        let mut fields = FieldMap::new();
        let mut errors = Vec::new();
        for field in &self.list.definition.fields {
            if denied.contains(&field.path) {
                fields.insert(field.path.clone(), Value::Null);
                let error = guard::denial(&self.list, &self.context, Operation::Read, false)
                    .with_item(item.id.clone())
                    .with_field(field.path.clone());
                errors.push(FieldAccessDenial {
                    item_id: item.id.clone(),
                    field: field.path.clone(),
                    error: EngineError::from(error).to_public(),
                });
            } else {
                let value = item.field(&field.path).cloned().unwrap_or(Value::Null);
                fields.insert(field.path.clone(), value);
            }
        }

        Ok((ItemView { id: item.id, fields }, errors))
    }
}
