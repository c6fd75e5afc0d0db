//! Access-checked item lookups.
//!
//! Both lookups narrow the requested id(s) against the id restrictions carried
//! by a `FilterClause` before touching storage. A singular lookup that comes
//! back empty fails with the caller-supplied [`AccessDeniedError`] whether the
//! item is missing or filtered out; the batch lookup returns what it found.

use listkit_storage::ListAdapter;
use listkit_types::{AccessResult, Filter, Item, ItemId, QueryArgs};
use tracing::debug;

use crate::error::{AccessDeniedError, AccessOutcome};

/// Fetch one item the caller may access, or fail with `denied`.
pub async fn get_access_controlled_item(
    adapter: &dyn ListAdapter,
    id: &ItemId,
    access: &AccessResult,
    denied: AccessDeniedError,
) -> AccessOutcome<Item> {
    let found = match access {
        AccessResult::Deny => None,
        AccessResult::Allow => adapter.find_by_id(id).await?,
        AccessResult::FilterClause(filter) => {
            if !filter.id_constraint().admits(id) {
                debug!(item_id = %id, "Requested id excluded by access filter");
                None
            } else {
                let args = QueryArgs::new()
                    .with_where(filter.clone().and(Filter::Id(id.clone())))
                    .with_first(1);
                adapter.items_query(&args).await?.into_iter().next()
            }
        }
    };

    found.ok_or_else(|| denied.with_item(id.clone()).into())
}

/// Fetch the accessible subset of `ids`.
///
/// Duplicates are collapsed. An empty intersection with the filter's id sets
/// returns without a storage call.
pub async fn get_access_controlled_items(
    adapter: &dyn ListAdapter,
    ids: &[ItemId],
    access: &AccessResult,
) -> AccessOutcome<Vec<Item>> {
    let narrowed = access.id_constraint().narrow(ids);
    if narrowed.is_empty() {
        debug!(requested = ids.len(), "No requested ids survive access narrowing");
        return Ok(Vec::new());
    }

    let Some(where_) = access.merge_into(Filter::IdIn(narrowed.iter().cloned().collect())) else {
        return Ok(Vec::new());
    };
    let items = adapter.items_query(&QueryArgs::new().with_where(where_)).await?;
    debug!(
        requested = ids.len(),
        narrowed = narrowed.len(),
        returned = items.len(),
        "Access-controlled batch lookup"
    );
    Ok(items)
}
