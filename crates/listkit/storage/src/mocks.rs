use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use listkit_types::{FieldMap, Item, ItemId, QueryArgs, QueryMeta};

use crate::memory::InMemoryListAdapter;
use crate::traits::ListAdapter;
use crate::{StorageError, StorageResult};

/// One call observed by a [`RecordingAdapter`].
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterCall {
    FindById(ItemId),
    ItemsQuery(QueryArgs),
    ItemsQueryMeta(QueryArgs),
    Create(FieldMap),
    Update(ItemId, FieldMap),
    Delete(ItemId),
}

impl AdapterCall {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            AdapterCall::Create(_) | AdapterCall::Update(..) | AdapterCall::Delete(_)
        )
    }
}

/// Mock adapter for testing.
///
/// Wraps an [`InMemoryListAdapter`], records every call, and can be told to
/// fail creates or updates with a backend error.
#[derive(Debug)]
pub struct RecordingAdapter {
    inner: InMemoryListAdapter,
    calls: Mutex<Vec<AdapterCall>>,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
}

impl RecordingAdapter {
    pub fn new(list_key: impl Into<String>) -> Self {
        Self {
            inner: InMemoryListAdapter::new(list_key),
            calls: Mutex::new(Vec::new()),
            fail_creates: AtomicBool::new(false),
            fail_updates: AtomicBool::new(false),
        }
    }

    /// Insert an item without recording the call.
    pub async fn seed(&self, data: FieldMap) -> StorageResult<Item> {
        self.inner.create(data).await
    }

    /// Read an item without recording the call.
    pub async fn peek(&self, id: &ItemId) -> Option<Item> {
        self.inner.find_by_id(id).await.ok().flatten()
    }

    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Every call recorded so far, in arrival order.
    pub fn calls(&self) -> Vec<AdapterCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn write_calls(&self) -> Vec<AdapterCall> {
        self.calls().into_iter().filter(AdapterCall::is_write).collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    fn record(&self, call: AdapterCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl ListAdapter for RecordingAdapter {
    async fn find_by_id(&self, id: &ItemId) -> StorageResult<Option<Item>> {
        self.record(AdapterCall::FindById(id.clone()));
        self.inner.find_by_id(id).await
    }

    async fn items_query(&self, args: &QueryArgs) -> StorageResult<Vec<Item>> {
        self.record(AdapterCall::ItemsQuery(args.clone()));
        self.inner.items_query(args).await
    }

    async fn items_query_meta(&self, args: &QueryArgs) -> StorageResult<QueryMeta> {
        self.record(AdapterCall::ItemsQueryMeta(args.clone()));
        self.inner.items_query_meta(args).await
    }

    async fn create(&self, data: FieldMap) -> StorageResult<Item> {
        self.record(AdapterCall::Create(data.clone()));
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!(
                "injected create failure on {}",
                self.inner.list_key()
            )));
        }
        self.inner.create(data).await
    }

    async fn update(&self, id: &ItemId, data: FieldMap) -> StorageResult<Option<Item>> {
        self.record(AdapterCall::Update(id.clone(), data.clone()));
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!(
                "injected update failure on {}",
                self.inner.list_key()
            )));
        }
        self.inner.update(id, data).await
    }

    async fn delete(&self, id: &ItemId) -> StorageResult<Option<Item>> {
        self.record(AdapterCall::Delete(id.clone()));
        self.inner.delete(id).await
    }
}
