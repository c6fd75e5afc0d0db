//! Shared state of one top-level mutation.
//!
//! Every nested write spawned by a request shares one [`MutationState`]:
//!
//! - the after-change stack: each write reserves a slot when it starts and
//!   fills it with its deferred after-change work once it has persisted.
//!   The root drains the stack from the top, so work reserved later (nested
//!   writes) runs before the work of the write that spawned it.
//! - the backlink queue: bookkeeping updates to the far side of two-sided
//!   relationships, grouped by related list and applied once the item they
//!   refer to exists.

use std::collections::{BTreeMap, HashMap};

use futures::future::{try_join_all, BoxFuture};
use listkit_types::{ids_to_value, value_as_id, value_as_ids, FieldMap, ItemId, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::deferred::DeferredItemHandle;
use crate::engine::Engine;
use crate::error::EngineResult;

/// Deferred after-change work of one write.
pub type AfterChangeTask = BoxFuture<'static, EngineResult<()>>;

/// Position reserved on the after-change stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfterChangeSlot(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacklinkAction {
    Add,
    Remove,
}

/// One pending update to the far side of a two-sided relationship.
#[derive(Debug, Clone)]
pub struct BacklinkTask {
    pub related_list: String,
    pub related_id: ItemId,
    /// Mirroring field on the related list
    pub field: String,
    pub many: bool,
    pub action: BacklinkAction,
    /// Item whose id is added to or removed from the related item
    pub source: DeferredItemHandle,
}

/// Which queued backlinks a flush applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Only tasks whose source item has settled
    Ready,
    /// Everything; used by the root once every write has finished
    All,
}

#[derive(Default)]
pub struct MutationState {
    after_change: Mutex<Vec<Option<AfterChangeTask>>>,
    backlinks: Mutex<BTreeMap<String, Vec<BacklinkTask>>>,
    /// Held for a whole flush so read-modify-write of a related item never
    /// interleaves with another flush
    flush_lock: Mutex<()>,
}

impl std::fmt::Debug for MutationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationState").finish_non_exhaustive()
    }
}

impl MutationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reserve_after_change(&self) -> AfterChangeSlot {
        let mut stack = self.after_change.lock().await;
        stack.push(None);
        AfterChangeSlot(stack.len() - 1)
    }

    pub async fn fill_after_change(&self, slot: AfterChangeSlot, task: AfterChangeTask) {
        let mut stack = self.after_change.lock().await;
        if let Some(entry) = stack.get_mut(slot.0) {
            *entry = Some(task);
        }
    }

    pub async fn pending_after_change(&self) -> usize {
        self.after_change
            .lock()
            .await
            .iter()
            .filter(|t| t.is_some())
            .count()
    }

    /// Run deferred after-change work, most recently reserved first.
    ///
    /// Stops at the first failure and returns it; work below the failing
    /// entry does not run.
    pub async fn drain_after_change(&self) -> EngineResult<()> {
        loop {
            let next = self.after_change.lock().await.pop();
            match next {
                Some(Some(task)) => task.await?,
                Some(None) => continue,
                None => return Ok(()),
            }
        }
    }

    pub async fn queue_backlinks(&self, tasks: Vec<BacklinkTask>) {
        if tasks.is_empty() {
            return;
        }
        let mut queue = self.backlinks.lock().await;
        for task in tasks {
            queue.entry(task.related_list.clone()).or_default().push(task);
        }
    }

    pub async fn pending_backlinks(&self) -> usize {
        self.backlinks.lock().await.values().map(Vec::len).sum()
    }

    /// Apply queued backlink updates.
    ///
    /// Tasks are grouped by related item so each item receives one update.
    /// Tasks whose source write was rejected are discarded; that write's
    /// failure already propagates to the caller.
    pub async fn flush_backlinks(&self, engine: &Engine, mode: FlushMode) -> EngineResult<()> {
        let _flushing = self.flush_lock.lock().await;
        let tasks = self.take_backlinks(mode).await;
        if tasks.is_empty() {
            return Ok(());
        }

        let mut groups: HashMap<(String, ItemId), Vec<(BacklinkTask, ItemId)>> = HashMap::new();
        for task in tasks {
            let source = match task.source.wait().await {
                Ok(item) => item.id,
                Err(e) => {
                    warn!(list = %task.related_list, error = %e, "Discarding backlink of rejected write");
                    continue;
                }
            };
            groups
                .entry((task.related_list.clone(), task.related_id.clone()))
                .or_default()
                .push((task, source));
        }

        debug!(groups = groups.len(), mode = ?mode, "Flushing backlinks");
        try_join_all(
            groups
                .into_iter()
                .map(|((list_key, id), tasks)| apply_backlinks(engine, list_key, id, tasks)),
        )
        .await?;
        Ok(())
    }

    async fn take_backlinks(&self, mode: FlushMode) -> Vec<BacklinkTask> {
        let mut queue = self.backlinks.lock().await;
        let mut taken = Vec::new();
        for tasks in queue.values_mut() {
            match mode {
                FlushMode::All => taken.append(tasks),
                FlushMode::Ready => {
                    let (ready, pending): (Vec<_>, Vec<_>) =
                        std::mem::take(tasks).into_iter().partition(|t| t.source.is_settled());
                    *tasks = pending;
                    taken.extend(ready);
                }
            }
        }
        queue.retain(|_, tasks| !tasks.is_empty());
        taken
    }
}

/// Apply every backlink change for one related item in a single update.
///
/// Storage is written directly: this is bookkeeping on behalf of a write the
/// caller was already allowed to make. A related item that no longer exists is
/// skipped.
async fn apply_backlinks(
    engine: &Engine,
    list_key: String,
    id: ItemId,
    tasks: Vec<(BacklinkTask, ItemId)>,
) -> EngineResult<()> {
    let list = engine.list(&list_key)?;
    let Some(current) = list.adapter.find_by_id(&id).await? else {
        debug!(list = %list_key, item_id = %id, "Backlink target gone, skipping");
        return Ok(());
    };

    let mut changes = FieldMap::new();
    for (task, source) in tasks {
        let value = match changes.get(&task.field) {
            Some(value) => value.clone(),
            None => current.get(&task.field).unwrap_or(Value::Null),
        };
        changes.insert(task.field.clone(), mirror(value, &task, &source));
    }

    debug!(list = %list_key, item_id = %id, fields = changes.len(), "Applying backlinks");
    list.adapter.update(&id, changes).await?;
    Ok(())
}

fn mirror(current: Value, task: &BacklinkTask, source: &ItemId) -> Value {
    if task.many {
        let mut ids = value_as_ids(&current);
        match task.action {
            BacklinkAction::Add if !ids.contains(source) => ids.push(source.clone()),
            BacklinkAction::Add => {}
            BacklinkAction::Remove => ids.retain(|id| id != source),
        }
        ids_to_value(&ids)
    } else {
        match task.action {
            BacklinkAction::Add => Value::from(source),
            BacklinkAction::Remove if value_as_id(&current).as_ref() == Some(source) => Value::Null,
            BacklinkAction::Remove => current,
        }
    }
}
