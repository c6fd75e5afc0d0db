//! Create, update and delete for one list.
//!
//! Every write runs the same stage sequence:
//!
//! ```text
//! AccessCheck → (Lookup) → FieldAccess → NestedMutation {
//!     RelationshipResolve → InputResolve → Validate → BeforeHook
//!     → Persist → BacklinkFlush → AfterChangeEnqueue
//! }
//! ```
//!
//! List access is decided before any storage call. Updates and deletes fetch
//! their targets through the access-checked lookups, so a missing item and a
//! hidden one fail identically. Batch updates and deletes silently skip ids
//! the caller cannot reach.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use listkit_access::{get_access_controlled_item, get_access_controlled_items, ListAccessArgs};
use listkit_types::{FieldMap, Item, ItemId, Operation};
use tracing::{debug, info, instrument};

use crate::context::{Actions, RequestContext};
use crate::coordinator::NestedMutationCoordinator;
use crate::deferred::{deferred_item, DeferredItemHandle};
use crate::engine::{Engine, RegisteredList};
use crate::error::{EngineError, EngineResult};
use crate::guard;
use crate::hook_runner::HookRunner;
use crate::hooks::{HookArgs, HookPhase, ValidationCollector};
use crate::mutation_state::{FlushMode, MutationState};
use crate::relationship::{plan_delete_backlinks, RelationshipResolver};

/// Write operations on one list for one request.
#[derive(Debug, Clone)]
pub struct MutationPipeline {
    engine: Engine,
    list: Arc<RegisteredList>,
    context: RequestContext,
}

impl MutationPipeline {
    pub fn new(engine: Engine, list: Arc<RegisteredList>, context: RequestContext) -> Self {
        Self {
            engine,
            list,
            context,
        }
    }

    pub fn list_key(&self) -> &str {
        self.list.key()
    }

    pub fn list(&self) -> &Arc<RegisteredList> {
        &self.list
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    /// The same request, writing to another list.
    pub fn for_list(&self, list: Arc<RegisteredList>) -> Self {
        Self {
            engine: self.engine.clone(),
            list,
            context: self.context.clone(),
        }
    }

    #[instrument(skip_all, fields(list = %self.list_key()))]
    pub async fn create_one(&self, data: FieldMap) -> EngineResult<Item> {
        self.create_single(data, None).await
    }

    /// Create inside an enclosing mutation; used for nested `create` input.
    pub fn create_nested(
        &self,
        data: FieldMap,
        state: Arc<MutationState>,
    ) -> BoxFuture<'static, EngineResult<Item>> {
        let pipeline = self.clone();
        async move { pipeline.create_single(data, Some(state)).await }.boxed()
    }

    async fn create_single(
        &self,
        data: FieldMap,
        state: Option<Arc<MutationState>>,
    ) -> EngineResult<Item> {
        let args = self.access_args(Operation::Create).with_input(data.clone());
        guard::list_access(&self.list, &self.context, args, false).await?;
        guard::field_write_access(&self.list, &self.context, Operation::Create, &[(None, &data)], false)
            .await?;

        let coordinator = NestedMutationCoordinator::enter(state);
        let result = self.create_in(data, coordinator.state().clone()).await;
        coordinator.finish(&self.engine, result).await
    }

    #[instrument(skip_all, fields(list = %self.list_key(), count = data.len()))]
    pub async fn create_many(&self, data: Vec<FieldMap>) -> EngineResult<Vec<Item>> {
        self.check_batch_size(data.len())?;
        guard::list_access(&self.list, &self.context, self.access_args(Operation::Create), true).await?;
        let writes: Vec<(Option<&Item>, &FieldMap)> = data.iter().map(|d| (None, d)).collect();
        guard::field_write_access(&self.list, &self.context, Operation::Create, &writes, true).await?;

        let coordinator = NestedMutationCoordinator::enter(None);
        let state = coordinator.state().clone();
        let result = try_join_all(data.into_iter().map(|d| self.create_in(d, state.clone()))).await;
        coordinator.finish(&self.engine, result).await
    }

    #[instrument(skip_all, fields(list = %self.list_key(), item_id = %id))]
    pub async fn update_one(&self, id: &ItemId, data: FieldMap) -> EngineResult<Item> {
        self.update_single(id.clone(), data, None).await
    }

    /// Update inside an enclosing mutation; used for nested `update` input.
    pub fn update_nested(
        &self,
        id: ItemId,
        data: FieldMap,
        state: Arc<MutationState>,
    ) -> BoxFuture<'static, EngineResult<Item>> {
        let pipeline = self.clone();
        async move { pipeline.update_single(id, data, Some(state)).await }.boxed()
    }

    async fn update_single(
        &self,
        id: ItemId,
        data: FieldMap,
        state: Option<Arc<MutationState>>,
    ) -> EngineResult<Item> {
        let args = self
            .access_args(Operation::Update)
            .with_input(data.clone())
            .with_item_id(id.clone());
        let access = guard::list_access(&self.list, &self.context, args, false).await?;
        let denied = guard::denial(&self.list, &self.context, Operation::Update, false);
        let existing = get_access_controlled_item(self.list.adapter.as_ref(), &id, &access, denied).await?;
        guard::field_write_access(
            &self.list,
            &self.context,
            Operation::Update,
            &[(Some(&existing), &data)],
            false,
        )
        .await?;

        let coordinator = NestedMutationCoordinator::enter(state);
        let result = self
            .update_in(existing, data, coordinator.state().clone(), false)
            .await;
        coordinator.finish(&self.engine, result).await
    }

    /// Update every reachable item in `updates`. Unreachable ids are skipped.
    /// When an id repeats, its first update wins.
    #[instrument(skip_all, fields(list = %self.list_key(), count = updates.len()))]
    pub async fn update_many(&self, updates: Vec<(ItemId, FieldMap)>) -> EngineResult<Vec<Item>> {
        self.check_batch_size(updates.len())?;
        let ids: Vec<ItemId> = updates.iter().map(|(id, _)| id.clone()).collect();
        let args = self.access_args(Operation::Update).with_item_ids(ids.clone());
        let access = guard::list_access(&self.list, &self.context, args, true).await?;
        let existing = get_access_controlled_items(self.list.adapter.as_ref(), &ids, &access).await?;

        let mut by_id: HashMap<ItemId, FieldMap> = HashMap::new();
        for (id, data) in updates {
            by_id.entry(id).or_insert(data);
        }
        let pairs: Vec<(Item, FieldMap)> = existing
            .into_iter()
            .filter_map(|item| by_id.remove(&item.id).map(|data| (item, data)))
            .collect();
        if pairs.len() < ids.len() {
            debug!(requested = ids.len(), reachable = pairs.len(), "Skipping unreachable ids");
        }

        let writes: Vec<(Option<&Item>, &FieldMap)> =
            pairs.iter().map(|(item, data)| (Some(item), data)).collect();
        guard::field_write_access(&self.list, &self.context, Operation::Update, &writes, true).await?;

        let coordinator = NestedMutationCoordinator::enter(None);
        let state = coordinator.state().clone();
        let result = try_join_all(
            pairs
                .into_iter()
                .map(|(item, data)| self.update_in(item, data, state.clone(), true)),
        )
        .await;
        coordinator.finish(&self.engine, result).await
    }

    #[instrument(skip_all, fields(list = %self.list_key(), item_id = %id))]
    pub async fn delete_one(&self, id: &ItemId) -> EngineResult<Item> {
        let args = self.access_args(Operation::Delete).with_item_id(id.clone());
        let access = guard::list_access(&self.list, &self.context, args, false).await?;
        let denied = guard::denial(&self.list, &self.context, Operation::Delete, false);
        let existing = get_access_controlled_item(self.list.adapter.as_ref(), id, &access, denied).await?;

        let coordinator = NestedMutationCoordinator::enter(None);
        let result = self.delete_in(existing, coordinator.state().clone(), false).await;
        coordinator.finish(&self.engine, result).await
    }

    /// Delete every reachable item in `ids`. Unreachable ids are skipped.
    #[instrument(skip_all, fields(list = %self.list_key(), count = ids.len()))]
    pub async fn delete_many(&self, ids: &[ItemId]) -> EngineResult<Vec<Item>> {
        self.check_batch_size(ids.len())?;
        let args = self.access_args(Operation::Delete).with_item_ids(ids.to_vec());
        let access = guard::list_access(&self.list, &self.context, args, true).await?;
        let existing = get_access_controlled_items(self.list.adapter.as_ref(), ids, &access).await?;

        let coordinator = NestedMutationCoordinator::enter(None);
        let state = coordinator.state().clone();
        let result = try_join_all(
            existing
                .into_iter()
                .map(|item| self.delete_in(item, state.clone(), true)),
        )
        .await;
        coordinator.finish(&self.engine, result).await
    }

    async fn create_in(&self, data: FieldMap, state: Arc<MutationState>) -> EngineResult<Item> {
        let slot = state.reserve_after_change().await;
        let (resolver, handle) = deferred_item(self.list_key());

        let with_defaults = self.apply_defaults(data.clone());
        let relationships = RelationshipResolver::new(self, &state);
        let resolved = relationships.resolve(with_defaults, None).await?;
        relationships.register_backlinks(resolved.backlinks, &handle).await;

        let runner = HookRunner::new(self.list.clone());
        let args = self.hook_args(Operation::Create, resolved.data, None, data);
        let resolved_data = runner.resolve_input(args.clone()).await?;
        let args = HookArgs {
            resolved_data: resolved_data.clone(),
            ..args
        };
        runner.validate_input(args.clone()).await?;
        runner.before_change(args.clone()).await?;

        let item = match self.list.adapter.create(resolved_data).await {
            Ok(item) => item,
            Err(e) => {
                resolver.reject(e.to_string());
                return Err(e.into());
            }
        };
        resolver.resolve(item.clone());
        info!(list = %self.list_key(), item_id = %item.id, "Item created");

        state.flush_backlinks(&self.engine, FlushMode::Ready).await?;
        let after = HookArgs {
            updated_item: Some(item.clone()),
            ..args
        };
        state
            .fill_after_change(slot, async move { runner.after_change(after).await }.boxed())
            .await;
        Ok(item)
    }

    async fn update_in(
        &self,
        existing: Item,
        data: FieldMap,
        state: Arc<MutationState>,
        many: bool,
    ) -> EngineResult<Item> {
        let slot = state.reserve_after_change().await;
        // Pending until the update persists. Error paths drop the resolver,
        // which discards the backlinks queued against it.
        let (resolver, handle) = deferred_item(self.list_key());

        let relationships = RelationshipResolver::new(self, &state);
        let resolved = relationships.resolve(data.clone(), Some(&existing)).await?;
        relationships.register_backlinks(resolved.backlinks, &handle).await;

        let runner = HookRunner::new(self.list.clone());
        let id = existing.id.clone();
        let args = self.hook_args(Operation::Update, resolved.data, Some(existing), data);
        let resolved_data = runner.resolve_input(args.clone()).await?;
        let args = HookArgs {
            resolved_data: resolved_data.clone(),
            ..args
        };
        runner.validate_input(args.clone()).await?;
        runner.before_change(args.clone()).await?;

        let item = match self.list.adapter.update(&id, resolved_data).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                resolver.reject(format!("{id} no longer exists"));
                let denied = guard::denial(&self.list, &self.context, Operation::Update, many);
                return Err(denied.with_item(id).into());
            }
            Err(e) => {
                resolver.reject(e.to_string());
                return Err(e.into());
            }
        };
        resolver.resolve(item.clone());
        info!(list = %self.list_key(), item_id = %item.id, "Item updated");

        state.flush_backlinks(&self.engine, FlushMode::Ready).await?;
        let after = HookArgs {
            updated_item: Some(item.clone()),
            ..args
        };
        state
            .fill_after_change(slot, async move { runner.after_change(after).await }.boxed())
            .await;
        Ok(item)
    }

    async fn delete_in(
        &self,
        existing: Item,
        state: Arc<MutationState>,
        many: bool,
    ) -> EngineResult<Item> {
        let slot = state.reserve_after_change().await;
        let id = existing.id.clone();

        let runner = HookRunner::new(self.list.clone());
        let args = self.hook_args(Operation::Delete, FieldMap::new(), Some(existing.clone()), FieldMap::new());
        runner.validate_delete(args.clone()).await?;
        runner.before_delete(args.clone()).await?;

        let Some(item) = self.list.adapter.delete(&id).await? else {
            let denied = guard::denial(&self.list, &self.context, Operation::Delete, many);
            return Err(denied.with_item(id).into());
        };
        info!(list = %self.list_key(), item_id = %item.id, "Item deleted");

        let planned = plan_delete_backlinks(&self.engine, &self.list, &existing)?;
        let handle = DeferredItemHandle::resolved(self.list_key(), existing);
        RelationshipResolver::new(self, &state)
            .register_backlinks(planned, &handle)
            .await;
        state.flush_backlinks(&self.engine, FlushMode::Ready).await?;

        state
            .fill_after_change(slot, async move { runner.after_delete(args).await }.boxed())
            .await;
        Ok(item)
    }

    fn access_args(&self, operation: Operation) -> ListAccessArgs {
        ListAccessArgs::new(
            self.list_key(),
            operation,
            self.context.authentication().cloned(),
        )
    }

    fn hook_args(
        &self,
        operation: Operation,
        resolved_data: FieldMap,
        existing_item: Option<Item>,
        original_input: FieldMap,
    ) -> HookArgs {
        HookArgs {
            list_key: self.list_key().to_string(),
            field_path: None,
            operation,
            phase: HookPhase::ResolveInput,
            resolved_data,
            existing_item,
            original_input,
            updated_item: None,
            errors: ValidationCollector::new(),
            actions: Actions::new(self.engine.clone(), self.context.clone()),
        }
    }

    /// Fill omitted fields that declare a default.
    fn apply_defaults(&self, mut data: FieldMap) -> FieldMap {
        for field in &self.list.definition.fields {
            if let Some(default) = &field.default_value {
                if !data.contains_key(&field.path) {
                    data.insert(field.path.clone(), default.value(&self.context));
                }
            }
        }
        data
    }

    fn check_batch_size(&self, size: usize) -> EngineResult<()> {
        match self.engine.config().mutations.max_batch_size {
            Some(max) if size > max => Err(EngineError::LimitsExceeded(format!(
                "{} batch of {size} exceeds the limit of {max}",
                self.list_key()
            ))),
            _ => Ok(()),
        }
    }
}
