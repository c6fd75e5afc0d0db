//! Handles to items that are still being written.
//!
//! A create or update hands out a [`DeferredItemHandle`] before it persists so
//! that backlink work queued on its behalf can refer to it and is only applied
//! once the write has landed. The paired
//! [`DeferredResolver`] settles the handle exactly once; dropping the resolver
//! while the handle is pending rejects it.

use listkit_types::Item;
use tokio::sync::watch;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone)]
enum DeferredState {
    Pending,
    Resolved(Item),
    Rejected(String),
}

/// Consumer side of a deferred item.
#[derive(Debug, Clone)]
pub struct DeferredItemHandle {
    list_key: String,
    rx: watch::Receiver<DeferredState>,
}

/// Producer side of a deferred item.
#[derive(Debug)]
pub struct DeferredResolver {
    list_key: String,
    tx: Option<watch::Sender<DeferredState>>,
}

/// A pending handle for an item of `list_key`, and its resolver.
pub fn deferred_item(list_key: impl Into<String>) -> (DeferredResolver, DeferredItemHandle) {
    let list_key = list_key.into();
    let (tx, rx) = watch::channel(DeferredState::Pending);
    (
        DeferredResolver {
            list_key: list_key.clone(),
            tx: Some(tx),
        },
        DeferredItemHandle { list_key, rx },
    )
}

impl DeferredItemHandle {
    /// A handle for an item that already exists.
    pub fn resolved(list_key: impl Into<String>, item: Item) -> Self {
        let (_tx, rx) = watch::channel(DeferredState::Resolved(item));
        Self {
            list_key: list_key.into(),
            rx,
        }
    }

    pub fn list_key(&self) -> &str {
        &self.list_key
    }

    /// True once the handle is resolved or rejected.
    pub fn is_settled(&self) -> bool {
        !matches!(*self.rx.borrow(), DeferredState::Pending)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(*self.rx.borrow(), DeferredState::Rejected(_))
    }

    /// The resolved item, without waiting.
    pub fn try_get(&self) -> Option<Item> {
        match &*self.rx.borrow() {
            DeferredState::Resolved(item) => Some(item.clone()),
            _ => None,
        }
    }

    /// Wait for the item to be persisted.
    pub async fn wait(&self) -> EngineResult<Item> {
        let mut rx = self.rx.clone();
        loop {
            if let Some(result) = self.settled(&rx.borrow_and_update()) {
                return result;
            }
            if rx.changed().await.is_err() {
                return self.settled(&rx.borrow()).unwrap_or_else(|| {
                    Err(self.rejected("resolver dropped while pending".to_string()))
                });
            }
        }
    }

    fn settled(&self, state: &DeferredState) -> Option<EngineResult<Item>> {
        match state {
            DeferredState::Pending => None,
            DeferredState::Resolved(item) => Some(Ok(item.clone())),
            DeferredState::Rejected(reason) => Some(Err(self.rejected(reason.clone()))),
        }
    }

    fn rejected(&self, reason: String) -> EngineError {
        EngineError::DeferredRejected {
            list_key: self.list_key.clone(),
            reason,
        }
    }
}

impl DeferredResolver {
    pub fn resolve(mut self, item: Item) {
        self.settle(DeferredState::Resolved(item));
    }

    pub fn reject(mut self, reason: impl Into<String>) {
        self.settle(DeferredState::Rejected(reason.into()));
    }

    fn settle(&mut self, state: DeferredState) {
        if let Some(tx) = self.tx.take() {
            tx.send_replace(state);
        }
    }
}

impl Drop for DeferredResolver {
    fn drop(&mut self) {
        if self.tx.is_some() {
            let reason = format!("{} write abandoned before persisting", self.list_key);
            self.settle(DeferredState::Rejected(reason));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use listkit_types::FieldMap;

    fn item(id: &str) -> Item {
        Item::new(id, FieldMap::new())
    }

    #[tokio::test]
    async fn waiters_see_the_resolved_item() {
        let (resolver, handle) = deferred_item("Post");
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };

        assert!(!handle.is_settled());
        resolver.resolve(item("p1"));

        let resolved = waiter.await.unwrap().unwrap();
        assert_eq!(resolved.id.as_str(), "p1");
        assert!(handle.is_settled());
        assert_eq!(handle.try_get(), Some(item("p1")));
    }

    #[tokio::test]
    async fn rejection_reaches_waiters() {
        let (resolver, handle) = deferred_item("Post");
        resolver.reject("storage unavailable");

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::DeferredRejected { ref reason, .. } if reason == "storage unavailable"
        ));
        assert!(handle.is_rejected());
    }

    #[tokio::test]
    async fn dropping_the_resolver_rejects() {
        let (resolver, handle) = deferred_item("Post");
        drop(resolver);
        assert!(handle.is_rejected());
        assert!(handle.wait().await.is_err());
    }

    #[tokio::test]
    async fn resolved_handles_are_settled_immediately() {
        let handle = DeferredItemHandle::resolved("User", item("u1"));
        assert!(handle.is_settled());
        assert_eq!(handle.wait().await.unwrap().id.as_str(), "u1");
    }
}
