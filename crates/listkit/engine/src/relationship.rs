//! Relationship field resolution.
//!
//! Relationship input is a set of nested operations rather than a stored
//! value:
//!
//! ```json
//! { "author": { "connect": { "id": "u1" } },
//!   "tags": { "disconnectAll": true, "create": [{ "name": "rust" }] } }
//! ```
//!
//! Operations apply in the order `disconnectAll`, `disconnect`, `create`,
//! `connect`/`update`. Connected ids must be readable by the caller; nested
//! creates and updates run through the related list's own pipeline inside the
//! current mutation, and an updated item stays linked. When
//! the relationship is mirrored on the related list, the resulting additions
//! and removals are queued as backlinks against the item being written.

use std::sync::Arc;

use futures::future::try_join_all;
use listkit_access::{get_access_controlled_item, ListAccessArgs};
use listkit_types::{ids_to_value, value_as_id, FieldMap, Item, ItemId, Operation, Value};
use tracing::debug;

use crate::deferred::DeferredItemHandle;
use crate::engine::{Engine, RegisteredList};
use crate::error::{EngineError, EngineResult};
use crate::guard;
use crate::list::{FieldDefinition, RelationshipSpec};
use crate::mutation_state::{BacklinkAction, BacklinkTask, MutationState};
use crate::pipeline::MutationPipeline;

/// Parsed nested operations for one relationship field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedOperations {
    pub create: Vec<FieldMap>,
    pub connect: Vec<ItemId>,
    /// `{ "id": .., "data": {..} }` entries: update a related item and link it
    pub update: Vec<(ItemId, FieldMap)>,
    pub disconnect: Vec<ItemId>,
    pub disconnect_all: bool,
}

impl NestedOperations {
    /// Parse the input of relationship field `path` on `list_key`.
    ///
    /// `null` disconnects everything. To-one fields accept a single create or
    /// connect, not both.
    pub fn parse(list_key: &str, path: &str, many: bool, value: &Value) -> EngineResult<Self> {
        let invalid = |reason: String| EngineError::invalid_input(list_key, format!("{path}: {reason}"));
        let map = match value {
            Value::Null => {
                return Ok(Self {
                    disconnect_all: true,
                    ..Self::default()
                })
            }
            Value::Object(map) => map,
            _ => return Err(invalid("expected nested operations".into())),
        };

        let mut ops = Self::default();
        for (key, value) in map {
            match key.as_str() {
                "create" => {
                    ops.create = entries(value)
                        .map(|v| v.as_object().cloned().ok_or_else(|| invalid("create expects objects".into())))
                        .collect::<EngineResult<_>>()?;
                }
                "connect" => ops.connect = parse_ids(value).map_err(|_| invalid("connect expects ids".into()))?,
                "update" => {
                    ops.update = entries(value)
                        .map(|v| parse_update(v).ok_or_else(|| invalid("update expects { id, data } objects".into())))
                        .collect::<EngineResult<_>>()?;
                }
                "disconnect" => {
                    ops.disconnect = parse_ids(value).map_err(|_| invalid("disconnect expects ids".into()))?
                }
                "disconnectAll" => {
                    ops.disconnect_all = value
                        .as_bool()
                        .ok_or_else(|| invalid("disconnectAll expects a boolean".into()))?
                }
                other => return Err(invalid(format!("unknown nested operation {other}"))),
            }
        }

        if !many && ops.create.len() + ops.connect.len() + ops.update.len() > 1 {
            return Err(invalid("a to-one relationship takes one create, connect or update".into()));
        }
        Ok(ops)
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.connect.is_empty()
            && self.update.is_empty()
            && self.disconnect.is_empty()
            && !self.disconnect_all
    }
}

fn entries(value: &Value) -> impl Iterator<Item = &Value> {
    match value {
        Value::Array(values) => values.iter().collect::<Vec<_>>().into_iter(),
        value => vec![value].into_iter(),
    }
}

fn parse_ids(value: &Value) -> Result<Vec<ItemId>, ()> {
    entries(value).map(|v| value_as_id(v).ok_or(())).collect()
}

fn parse_update(value: &Value) -> Option<(ItemId, FieldMap)> {
    let id = value.get("id").and_then(value_as_id)?;
    let data = value.get("data")?.as_object()?.clone();
    Some((id, data))
}

/// A backlink to queue once the source item's handle is known.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedBacklink {
    pub related_list: String,
    pub related_id: ItemId,
    pub field: String,
    pub many: bool,
    pub action: BacklinkAction,
}

impl PlannedBacklink {
    pub fn into_task(self, source: DeferredItemHandle) -> BacklinkTask {
        BacklinkTask {
            related_list: self.related_list,
            related_id: self.related_id,
            field: self.field,
            many: self.many,
            action: self.action,
            source,
        }
    }
}

/// Input with relationship fields replaced by stored foreign keys.
#[derive(Debug, Clone)]
pub struct ResolvedRelationships {
    pub data: FieldMap,
    pub backlinks: Vec<PlannedBacklink>,
}

pub struct RelationshipResolver<'a> {
    pipeline: &'a MutationPipeline,
    state: &'a Arc<MutationState>,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(pipeline: &'a MutationPipeline, state: &'a Arc<MutationState>) -> Self {
        Self { pipeline, state }
    }

    /// Resolve every relationship field present in `data`, concurrently.
    pub async fn resolve(&self, data: FieldMap, existing: Option<&Item>) -> EngineResult<ResolvedRelationships> {
        let list = self.pipeline.list();
        let fields: Vec<(&FieldDefinition, &RelationshipSpec)> = list
            .definition
            .relationship_fields()
            .filter(|(field, _)| data.contains_key(&field.path))
            .collect();
        if fields.is_empty() {
            return Ok(ResolvedRelationships {
                data,
                backlinks: Vec::new(),
            });
        }

        let resolved = try_join_all(fields.into_iter().map(|(field, spec)| {
            let input = data.get(&field.path).cloned().unwrap_or(Value::Null);
            self.resolve_field(field, spec, input, existing)
        }))
        .await?;

        let mut data = data;
        let mut backlinks = Vec::new();
        for (path, value, planned) in resolved {
            data.insert(path, value);
            backlinks.extend(planned);
        }
        Ok(ResolvedRelationships { data, backlinks })
    }

    /// Queue planned backlinks against the item being written.
    pub async fn register_backlinks(&self, planned: Vec<PlannedBacklink>, source: &DeferredItemHandle) {
        let tasks = planned.into_iter().map(|p| p.into_task(source.clone())).collect();
        self.state.queue_backlinks(tasks).await;
    }

    async fn resolve_field(
        &self,
        field: &FieldDefinition,
        spec: &RelationshipSpec,
        input: Value,
        existing: Option<&Item>,
    ) -> EngineResult<(String, Value, Vec<PlannedBacklink>)> {
        let list = self.pipeline.list();
        let ops = NestedOperations::parse(list.key(), &field.path, spec.many, &input)?;
        let target = self.pipeline.engine().list(&spec.target_list)?;
        let current: Vec<ItemId> = existing.map(|item| item.ref_ids(&field.path)).unwrap_or_default();

        let mut disconnected = if ops.disconnect_all { current.clone() } else { Vec::new() };
        disconnected.extend(ops.disconnect.iter().cloned());

        let nested = self.pipeline.for_list(target.clone());
        let creates = try_join_all(
            ops.create
                .into_iter()
                .map(|data| nested.create_nested(data, self.state.clone())),
        );
        let updates = try_join_all(
            ops.update
                .into_iter()
                .map(|(id, data)| nested.update_nested(id, data, self.state.clone())),
        );
        let (created, connected, updated) =
            futures::try_join!(creates, self.connect(&target, field, &ops.connect), updates)?;
        let created: Vec<ItemId> = created.into_iter().map(|item| item.id).collect();
        let connected: Vec<ItemId> = connected
            .into_iter()
            .chain(updated.into_iter().map(|item| item.id))
            .collect();

        let next: Vec<ItemId> = if spec.many {
            let mut ids: Vec<ItemId> = current.iter().filter(|id| !disconnected.contains(id)).cloned().collect();
            for id in created.iter().chain(connected.iter()) {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            ids
        } else if let Some(id) = created.first().or(connected.first()) {
            vec![id.clone()]
        } else if !disconnected.is_empty() {
            Vec::new()
        } else {
            current.clone()
        };

        debug!(
            list = %list.key(),
            field = %field.path,
            created = created.len(),
            connected = connected.len(),
            disconnected = disconnected.len(),
            "Resolved relationship"
        );

        let value = if spec.many {
            ids_to_value(&next)
        } else {
            next.first().map(Value::from).unwrap_or(Value::Null)
        };
        let backlinks = plan_backlinks(&target, spec, &current, &next);
        Ok((field.path.clone(), value, backlinks))
    }

    /// Look up every id to connect under the caller's read access on the
    /// related list.
    async fn connect(
        &self,
        target: &RegisteredList,
        field: &FieldDefinition,
        ids: &[ItemId],
    ) -> EngineResult<Vec<ItemId>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let context = self.pipeline.context();
        let args = ListAccessArgs::new(target.key(), Operation::Read, context.authentication().cloned())
            .with_item_ids(ids.to_vec());
        let access = guard::list_access(target, context, args, false).await?;
        let denied = guard::denial(target, context, Operation::Read, false)
            .with_field(format!("{}.{}", self.pipeline.list().key(), field.path));

        let items = try_join_all(
            ids.iter()
                .map(|id| get_access_controlled_item(target.adapter.as_ref(), id, &access, denied.clone())),
        )
        .await?;
        Ok(items.into_iter().map(|item| item.id).collect())
    }
}

/// Backlinks needed to move the mirrored field from `before` to `after`.
fn plan_backlinks(
    target: &RegisteredList,
    spec: &RelationshipSpec,
    before: &[ItemId],
    after: &[ItemId],
) -> Vec<PlannedBacklink> {
    let Some(inverse) = &spec.inverse_field else {
        return Vec::new();
    };
    let many = target
        .definition
        .get_field(inverse)
        .and_then(FieldDefinition::relationship_spec)
        .map(|s| s.many)
        .unwrap_or(false);

    let planned = |id: &ItemId, action| PlannedBacklink {
        related_list: target.key().to_string(),
        related_id: id.clone(),
        field: inverse.clone(),
        many,
        action,
    };
    let removed = before.iter().filter(|id| !after.contains(id)).map(|id| planned(id, BacklinkAction::Remove));
    let added = after.iter().filter(|id| !before.contains(id)).map(|id| planned(id, BacklinkAction::Add));
    removed.chain(added).collect()
}

/// Backlinks removing a deleted item from everything it was linked to.
pub(crate) fn plan_delete_backlinks(
    engine: &Engine,
    list: &RegisteredList,
    existing: &Item,
) -> EngineResult<Vec<PlannedBacklink>> {
    let mut planned = Vec::new();
    for (field, spec) in list.definition.relationship_fields() {
        if spec.inverse_field.is_none() {
            continue;
        }
        let target = engine.list(&spec.target_list)?;
        planned.extend(plan_backlinks(&target, spec, &existing.ref_ids(&field.path), &[]));
    }
    Ok(planned)
}
