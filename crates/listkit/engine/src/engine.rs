//! List registry and request entry points.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use listkit_storage::ListAdapter;
use listkit_types::{AuthedItem, FieldMap, Item, ItemId, QueryArgs, QueryMeta};
use tracing::info;

use crate::config::EngineConfig;
use crate::context::RequestContext;
use crate::error::{EngineError, EngineResult};
use crate::list::ListDefinition;
use crate::pipeline::MutationPipeline;
use crate::query::{ItemResponse, ListQuery, QueryResponse};

/// A list definition bound to its storage.
pub struct RegisteredList {
    pub definition: ListDefinition,
    pub adapter: Arc<dyn ListAdapter>,
}

impl RegisteredList {
    pub fn key(&self) -> &str {
        &self.definition.key
    }
}

impl fmt::Debug for RegisteredList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredList")
            .field("key", &self.definition.key)
            .field("fields", &self.definition.fields.len())
            .finish()
    }
}

struct EngineInner {
    lists: HashMap<String, Arc<RegisteredList>>,
    config: EngineConfig,
}

/// The execution engine.
///
/// Cheap to clone; clones share the registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.inner.lists.keys().collect();
        keys.sort();
        f.debug_struct("Engine").field("lists", &keys).finish()
    }
}

/// Collects list registrations and validates them as a whole.
pub struct EngineBuilder {
    config: EngineConfig,
    lists: Vec<(ListDefinition, Arc<dyn ListAdapter>)>,
}

impl EngineBuilder {
    pub fn list(mut self, definition: ListDefinition, adapter: Arc<dyn ListAdapter>) -> Self {
        self.lists.push((definition, adapter));
        self
    }

    /// Validate every definition against the others and build the engine.
    pub fn build(self) -> EngineResult<Engine> {
        let mut lists = HashMap::new();
        for (definition, adapter) in self.lists {
            let key = definition.key.clone();
            let registered = Arc::new(RegisteredList { definition, adapter });
            if lists.insert(key.clone(), registered).is_some() {
                return Err(EngineError::Definition(format!("list {key} registered twice")));
            }
        }

        for list in lists.values() {
            validate_list(&list.definition, &lists)?;
        }

        info!(lists = lists.len(), "Engine built");
        Ok(Engine {
            inner: Arc::new(EngineInner {
                lists,
                config: self.config,
            }),
        })
    }
}

fn validate_list(
    definition: &ListDefinition,
    lists: &HashMap<String, Arc<RegisteredList>>,
) -> EngineResult<()> {
    let key = &definition.key;
    definition
        .access
        .validate(key)
        .map_err(|e| EngineError::Definition(e.to_string()))?;

    let mut seen = HashSet::new();
    for field in &definition.fields {
        if field.path == "id" {
            return Err(EngineError::Definition(format!("{key}.id is reserved")));
        }
        if !seen.insert(field.path.as_str()) {
            return Err(EngineError::Definition(format!(
                "{key}.{} declared twice",
                field.path
            )));
        }
    }

    for (field, spec) in definition.relationship_fields() {
        let target = lists.get(&spec.target_list).ok_or_else(|| {
            EngineError::Definition(format!(
                "{key}.{} refers to unknown list {}",
                field.path, spec.target_list
            ))
        })?;

        if let Some(inverse) = &spec.inverse_field {
            let mirrored = target
                .definition
                .get_field(inverse)
                .and_then(|f| f.relationship_spec())
                .ok_or_else(|| {
                    EngineError::Definition(format!(
                        "{key}.{} mirrors {}.{inverse}, which is not a relationship",
                        field.path, spec.target_list
                    ))
                })?;
            if mirrored.target_list != *key {
                return Err(EngineError::Definition(format!(
                    "{key}.{} mirrors {}.{inverse}, which points at {}",
                    field.path, spec.target_list, mirrored.target_list
                )));
            }
        }
    }
    Ok(())
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            lists: Vec::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn list(&self, key: &str) -> EngineResult<Arc<RegisteredList>> {
        self.inner
            .lists
            .get(key)
            .cloned()
            .ok_or_else(|| EngineError::UnknownList(key.to_string()))
    }

    /// Request context evaluating declared rules with the configured
    /// fallbacks.
    pub fn context(&self, authentication: Option<AuthedItem>) -> RequestContext {
        RequestContext::declared(authentication, self.inner.config.access_defaults())
    }

    /// Request context with every access check bypassed.
    pub fn sudo_context(&self) -> RequestContext {
        self.context(None).sudo()
    }

    pub fn mutations(&self, list_key: &str, context: &RequestContext) -> EngineResult<MutationPipeline> {
        Ok(MutationPipeline::new(
            self.clone(),
            self.list(list_key)?,
            context.clone(),
        ))
    }

    fn queries(&self, list_key: &str, context: &RequestContext) -> EngineResult<ListQuery> {
        Ok(ListQuery::new(self.clone(), self.list(list_key)?, context.clone()))
    }

    pub async fn create_item(
        &self,
        list_key: &str,
        data: FieldMap,
        context: &RequestContext,
    ) -> EngineResult<Item> {
        self.mutations(list_key, context)?.create_one(data).await
    }

    pub async fn create_items(
        &self,
        list_key: &str,
        data: Vec<FieldMap>,
        context: &RequestContext,
    ) -> EngineResult<Vec<Item>> {
        self.mutations(list_key, context)?.create_many(data).await
    }

    pub async fn update_item(
        &self,
        list_key: &str,
        id: &ItemId,
        data: FieldMap,
        context: &RequestContext,
    ) -> EngineResult<Item> {
        self.mutations(list_key, context)?.update_one(id, data).await
    }

    pub async fn update_items(
        &self,
        list_key: &str,
        updates: Vec<(ItemId, FieldMap)>,
        context: &RequestContext,
    ) -> EngineResult<Vec<Item>> {
        self.mutations(list_key, context)?.update_many(updates).await
    }

    pub async fn delete_item(
        &self,
        list_key: &str,
        id: &ItemId,
        context: &RequestContext,
    ) -> EngineResult<Item> {
        self.mutations(list_key, context)?.delete_one(id).await
    }

    pub async fn delete_items(
        &self,
        list_key: &str,
        ids: &[ItemId],
        context: &RequestContext,
    ) -> EngineResult<Vec<Item>> {
        self.mutations(list_key, context)?.delete_many(ids).await
    }

    pub async fn list_query(
        &self,
        list_key: &str,
        args: QueryArgs,
        context: &RequestContext,
    ) -> EngineResult<QueryResponse> {
        self.queries(list_key, context)?.list_query(args).await
    }

    pub async fn list_query_meta(
        &self,
        list_key: &str,
        args: QueryArgs,
        context: &RequestContext,
    ) -> EngineResult<QueryMeta> {
        self.queries(list_key, context)?.list_query_meta(args).await
    }

    pub async fn item_query(
        &self,
        list_key: &str,
        id: &ItemId,
        context: &RequestContext,
    ) -> EngineResult<ItemResponse> {
        self.queries(list_key, context)?.item_query(id).await
    }
}
